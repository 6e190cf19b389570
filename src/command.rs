use alloc::boxed::Box;
use alloc::vec::Vec;

use crate::{Result, SubsystemRef};

pub mod button;

/// An action the robot can perform. Runs when admitted by the scheduler,
/// until it is interrupted or it finishes.
///
/// Lifecycle transitions are driven exclusively by the scheduler; a command
/// never mutates its own state outside these callbacks.
pub trait Command {
    /// Subsystems this command must own exclusively while it runs.
    fn requirements(&self) -> &[SubsystemRef];

    /// Called once when the command is admitted.
    fn initialize(&mut self) -> Result {
        Ok(())
    }

    /// Called once per scheduler run while the command is running. Must
    /// return within the tick budget; long-running behavior spans many ticks
    /// via `is_finished`, never by blocking.
    fn execute(&mut self) -> Result {
        Ok(())
    }

    /// Called exactly once per activation, after `is_finished` returns true
    /// or when the command is canceled (`interrupted` is true).
    #[allow(unused_variables)]
    fn end(&mut self, interrupted: bool) -> Result {
        Ok(())
    }

    fn is_finished(&self) -> Result<bool> {
        Ok(false)
    }

    /// Whether the scheduler keeps this command alive while the robot is
    /// disabled.
    fn runs_when_disabled(&self) -> bool {
        false
    }

    fn interruption_behavior(&self) -> InterruptionBehavior {
        InterruptionBehavior::default()
    }

    /// Name used in scheduler logs.
    fn name(&self) -> &str {
        "<command>"
    }
}

/// How the scheduler resolves a conflict over a required subsystem.
/// `CancelIncoming` marks the command non-interruptible: a newcomer that
/// needs one of its subsystems is rejected instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InterruptionBehavior {
    #[default]
    CancelSelf,
    CancelIncoming,
}

/// Per-activation lifecycle state, tracked by the scheduler.
///
/// `Finished` and `Interrupted` are terminal for the activation, but the
/// command object is reusable and may be scheduled again from either.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommandState {
    #[default]
    Idle,
    Initializing,
    Running,
    Finished,
    Interrupted,
}

impl CommandState {
    /// True when the command may be (re)scheduled.
    pub fn is_startable(self) -> bool {
        matches!(self, Self::Idle | Self::Finished | Self::Interrupted)
    }
}

/// Command assembled from closures, for one-off bindings and default
/// commands that don't warrant a named type.
pub struct FunctionalCommand {
    on_init: Box<dyn FnMut() -> Result>,
    on_execute: Box<dyn FnMut() -> Result>,
    on_end: Box<dyn FnMut(bool) -> Result>,
    is_finished: Box<dyn Fn() -> Result<bool>>,
    requirements: Vec<SubsystemRef>,
    name: &'static str,
}

impl FunctionalCommand {
    pub fn new(
        on_init: impl FnMut() -> Result + 'static,
        on_execute: impl FnMut() -> Result + 'static,
        on_end: impl FnMut(bool) -> Result + 'static,
        is_finished: impl Fn() -> Result<bool> + 'static,
        requirements: Vec<SubsystemRef>,
    ) -> Self {
        Self {
            on_init: Box::new(on_init),
            on_execute: Box::new(on_execute),
            on_end: Box::new(on_end),
            is_finished: Box::new(is_finished),
            requirements,
            name: "<functional>",
        }
    }

    /// Runs the action once and finishes on the same tick it first executes.
    pub fn instant(
        action: impl FnMut() -> Result + 'static,
        requirements: Vec<SubsystemRef>,
    ) -> Self {
        Self::new(action, || Ok(()), |_| Ok(()), || Ok(true), requirements)
    }

    /// Runs the action every tick until interrupted.
    pub fn run(action: impl FnMut() -> Result + 'static, requirements: Vec<SubsystemRef>) -> Self {
        Self::new(|| Ok(()), action, |_| Ok(()), || Ok(false), requirements)
    }

    /// Runs `start` once, then `end` when the command is stopped.
    pub fn start_end(
        start: impl FnMut() -> Result + 'static,
        mut end: impl FnMut() -> Result + 'static,
        requirements: Vec<SubsystemRef>,
    ) -> Self {
        Self::new(start, || Ok(()), move |_| end(), || Ok(false), requirements)
    }

    /// Runs `run` every tick, then `end` when the command is stopped.
    pub fn run_end(
        run: impl FnMut() -> Result + 'static,
        mut end: impl FnMut() -> Result + 'static,
        requirements: Vec<SubsystemRef>,
    ) -> Self {
        Self::new(|| Ok(()), run, move |_| end(), || Ok(false), requirements)
    }

    pub fn with_name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }
}

impl Command for FunctionalCommand {
    fn requirements(&self) -> &[SubsystemRef] {
        &self.requirements
    }

    fn initialize(&mut self) -> Result {
        (self.on_init)()
    }

    fn execute(&mut self) -> Result {
        (self.on_execute)()
    }

    fn end(&mut self, interrupted: bool) -> Result {
        (self.on_end)(interrupted)
    }

    fn is_finished(&self) -> Result<bool> {
        (self.is_finished)()
    }

    fn name(&self) -> &str {
        self.name
    }
}
