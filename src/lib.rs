//! Resource-arbitrated cooperative command scheduler for robots driven on a
//! fixed periodic tick.
//!
//! Commands declare the subsystems they require; the scheduler guarantees at
//! most one running command owns a given subsystem at any instant, resolves
//! conflicts by interrupting or rejecting, and hands ownerless subsystems to
//! their default commands within the same tick.
//!
//! The model is single-threaded and cooperative: one `run()` per control
//! period, no blocking anywhere inside a tick.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::{Cell, RefCell};
use core::hash::Hash;
use core::ops::Deref;

use hashbrown::{HashMap, HashSet};
use snafu::Snafu;

use command::{Command, CommandState, InterruptionBehavior};
use event::EventLoop;
use subsystem::Subsystem;

pub mod command;
pub mod control;
pub mod event;
pub mod hardware;
pub mod robot;
pub mod subsystem;

pub use command::FunctionalCommand;

/// Crate-wide fallible result, unit-valued by default.
pub type Result<T = ()> = core::result::Result<T, Error>;

#[derive(Debug, Snafu)]
pub enum Error {
    /// A motor controller or sensor call failed.
    #[snafu(context(false), display("actuator driver fault: {source}"))]
    Driver { source: hardware::DriverError },
    /// A named setpoint fell outside its mechanism's travel range.
    #[snafu(context(false), display("invalid setpoint configuration: {source}"))]
    Preset { source: control::PresetError },
    /// A control period overran its budget. The periodic guarantee is
    /// broken; only the mode host may decide to halt or re-initialize.
    #[snafu(display("control period overran: {elapsed_us}us of {budget_us}us budget"))]
    TickOverrun { elapsed_us: u64, budget_us: u64 },
}

/// Shared handle to a subsystem, compared and hashed by identity.
#[derive(Clone)]
pub struct SubsystemRef(pub Rc<RefCell<dyn Subsystem>>);

impl PartialEq for SubsystemRef {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}
impl Eq for SubsystemRef {}

impl Hash for SubsystemRef {
    fn hash<H: core::hash::Hasher>(&self, state: &mut H) {
        // Hash the data address only; the vtable half of the fat pointer can
        // differ across codegen units, which would break the Hash/Eq
        // contract against the metadata-ignoring `Rc::ptr_eq` above.
        (Rc::as_ptr(&self.0) as *const ()).hash(state);
    }
}

impl core::fmt::Debug for SubsystemRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "SubsystemRef({:p})", Rc::as_ptr(&self.0))
    }
}

impl From<Rc<RefCell<dyn Subsystem>>> for SubsystemRef {
    fn from(subsystem: Rc<RefCell<dyn Subsystem>>) -> Self {
        Self(subsystem)
    }
}

impl<T: Subsystem + 'static> From<T> for SubsystemRef {
    fn from(subsystem: T) -> Self {
        Self(Rc::new(RefCell::new(subsystem)))
    }
}

impl Deref for SubsystemRef {
    type Target = Rc<RefCell<dyn Subsystem>>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Shared handle to a command, compared and hashed by identity.
#[derive(Clone)]
pub struct CommandRef(pub Rc<RefCell<dyn Command>>);

impl PartialEq for CommandRef {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}
impl Eq for CommandRef {}

impl Hash for CommandRef {
    fn hash<H: core::hash::Hasher>(&self, state: &mut H) {
        // Hash the data address only, matching the metadata-ignoring
        // `Rc::ptr_eq` equality above.
        (Rc::as_ptr(&self.0) as *const ()).hash(state);
    }
}

impl core::fmt::Debug for CommandRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "CommandRef({:p})", Rc::as_ptr(&self.0))
    }
}

impl From<Rc<RefCell<dyn Command>>> for CommandRef {
    fn from(command: Rc<RefCell<dyn Command>>) -> Self {
        Self(command)
    }
}

impl<T: Command + 'static> From<T> for CommandRef {
    fn from(command: T) -> Self {
        Self(Rc::new(RefCell::new(command)))
    }
}

impl Deref for CommandRef {
    type Target = Rc<RefCell<dyn Command>>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[derive(Debug, Snafu)]
pub enum SetDefaultCommandError {
    #[snafu(display("default commands must require their subsystem"))]
    MustRequireSubsystem,
    #[snafu(display("cannot set the default command on an unregistered subsystem"))]
    NotRegistered,
}

/// Outcome of a schedule request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleStatus {
    /// Admitted: the command initialized and is running.
    Started,
    /// Already running; nothing changed.
    AlreadyRunning,
    /// Requested mid-run; arbitration happens after the execute pass, in
    /// request order.
    Deferred,
    /// Denied: a required subsystem is owned by a non-interruptible command.
    /// The existing command keeps running; this one never begins.
    Rejected,
}

/// The scheduler. One instance per robot process, created before the first
/// tick and handed to whatever needs to start or cancel commands.
///
/// All entry points take `&self`; state lives behind `RefCell`/`Cell` because
/// the execution model is single-threaded and cooperative. A multi-threaded
/// host must serialize every call through one exclusive section.
pub struct CommandScheduler {
    /// Registered subsystems and their optional default commands.
    subsystems: RefCell<HashMap<SubsystemRef, Option<CommandRef>>>,
    /// Running commands in admission order. Order is part of the contract:
    /// commands admitted earlier execute earlier every tick.
    running: RefCell<Vec<CommandRef>>,
    /// Subsystem -> owning command. The single shared mutable resource;
    /// mutated only here.
    ownership: RefCell<HashMap<SubsystemRef, CommandRef>>,
    /// Last observed lifecycle state per command. Terminal entries are kept
    /// so `Finished`/`Interrupted` stay observable after the fact; the map
    /// grows with the number of distinct commands ever scheduled, which a
    /// robot program fixes at wiring time.
    states: RefCell<HashMap<CommandRef, CommandState>>,
    in_run_loop: Cell<bool>,
    to_schedule: RefCell<Vec<CommandRef>>,
    to_cancel: RefCell<Vec<CommandRef>>,
    /// Commands currently inside their `end` callback, to keep a cancel
    /// issued from `end` from recursing.
    ending: RefCell<Vec<CommandRef>>,
    button_loop: Rc<RefCell<EventLoop>>,
    enabled: Cell<bool>,
}

impl Default for CommandScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandScheduler {
    pub fn new() -> Self {
        Self {
            subsystems: RefCell::new(HashMap::new()),
            running: RefCell::new(Vec::new()),
            ownership: RefCell::new(HashMap::new()),
            states: RefCell::new(HashMap::new()),
            in_run_loop: Cell::new(false),
            to_schedule: RefCell::new(Vec::new()),
            to_cancel: RefCell::new(Vec::new()),
            ending: RefCell::new(Vec::new()),
            button_loop: Rc::default(),
            enabled: Cell::new(true),
        }
    }

    /// Register a subsystem. Only registered subsystems take part in the
    /// periodic pass and default-command arbitration.
    pub fn register<S: Subsystem + 'static>(&self, subsystem: S) -> Rc<RefCell<S>> {
        let subsystem = Rc::new(RefCell::new(subsystem));
        self.subsystems
            .borrow_mut()
            .insert(SubsystemRef(subsystem.clone()), None);
        subsystem
    }

    /// Set the command a subsystem falls back to whenever it is ownerless.
    /// The command must require the subsystem, so the takeover itself goes
    /// through arbitration like anything else.
    pub fn set_default_command<S>(
        &self,
        subsystem: &Rc<RefCell<S>>,
        command: impl Command + 'static,
    ) -> core::result::Result<(), SetDefaultCommandError>
    where
        S: Subsystem + 'static,
    {
        let subsystem = SubsystemRef(subsystem.clone());
        if !requirements_of(&command).contains(&subsystem) {
            return Err(SetDefaultCommandError::MustRequireSubsystem);
        }

        let mut subsystems = self.subsystems.borrow_mut();
        let slot = subsystems
            .get_mut(&subsystem)
            .ok_or(SetDefaultCommandError::NotRegistered)?;
        slot.replace(CommandRef(Rc::new(RefCell::new(command))));
        Ok(())
    }

    pub fn remove_default_command<S>(
        &self,
        subsystem: &Rc<RefCell<S>>,
    ) -> Option<Rc<RefCell<dyn Command>>>
    where
        S: Subsystem + 'static,
    {
        let command = self
            .subsystems
            .borrow_mut()
            .get_mut(&SubsystemRef(subsystem.clone()))?
            .take();
        command.map(|c| c.0)
    }

    pub fn default_command<S>(&self, subsystem: &Rc<RefCell<S>>) -> Option<CommandRef>
    where
        S: Subsystem + 'static,
    {
        self.subsystems
            .borrow()
            .get(&SubsystemRef(subsystem.clone()))?
            .clone()
    }

    /// Request that a command start running.
    ///
    /// Outside the run loop, arbitration happens immediately: interruptible
    /// conflicts are canceled, a non-interruptible conflict rejects the
    /// request, and an admitted command is initialized and running before
    /// this returns. Mid-run requests are deferred to the end of the tick.
    pub fn schedule(&self, command: impl Into<CommandRef>) -> Result<ScheduleStatus> {
        let command = command.into();
        if self.in_run_loop.get() {
            self.to_schedule.borrow_mut().push(command);
            return Ok(ScheduleStatus::Deferred);
        }
        self.schedule_now(command)
    }

    /// Stop a running command, invoking `end(true)`. Legal at any time; a
    /// command that is not running is left untouched.
    pub fn cancel(&self, command: impl Into<CommandRef>) -> Result {
        let command = command.into();
        if self.in_run_loop.get() {
            self.to_cancel.borrow_mut().push(command);
            return Ok(());
        }
        self.cancel_now(&command)
    }

    /// Cancel everything, e.g. on mode exit.
    pub fn cancel_all(&self) -> Result {
        let running = self.running.borrow().clone();
        for command in running {
            self.cancel(command)?;
        }
        Ok(())
    }

    pub fn is_scheduled(&self, command: &CommandRef) -> bool {
        self.running.borrow().contains(command)
    }

    /// Lifecycle state of a command as last observed by the scheduler.
    pub fn command_state(&self, command: &CommandRef) -> CommandState {
        self.states
            .borrow()
            .get(command)
            .copied()
            .unwrap_or_default()
    }

    /// The command currently owning a subsystem, if any.
    pub fn requiring(&self, subsystem: &SubsystemRef) -> Option<CommandRef> {
        self.ownership.borrow().get(subsystem).cloned()
    }

    /// Gate for operating modes: while disabled, commands that don't opt in
    /// via `runs_when_disabled` are canceled and defaults are withheld.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.set(enabled);
    }

    /// Event loop polled once per run, before commands execute. Operator
    /// input bindings live here.
    pub fn button_loop(&self) -> Rc<RefCell<EventLoop>> {
        self.button_loop.clone()
    }

    /// One full scheduling pass. The mode host calls this exactly once per
    /// control period; it never blocks.
    pub fn run(&self) -> Result {
        // Subsystem housekeeping first, so commands observe fresh sensor
        // state and telemetry reflects this tick.
        {
            let subsystems = self.subsystems.borrow();
            for subsystem in subsystems.keys() {
                subsystem.0.borrow_mut().periodic();
            }
        }

        let button_loop = self.button_loop.clone();
        button_loop.borrow_mut().poll();

        self.in_run_loop.set(true);
        let outcome = self.run_commands();
        self.in_run_loop.set(false);
        outcome?;

        // Deferred requests, in call order.
        let to_schedule = self.to_schedule.take();
        for command in to_schedule {
            self.schedule_now(command)?;
        }
        let to_cancel = self.to_cancel.take();
        for command in &to_cancel {
            self.cancel_now(command)?;
        }

        // Idle invariant: a subsystem with a default command is never left
        // ownerless across a tick boundary.
        let defaults: Vec<CommandRef> = self
            .subsystems
            .borrow()
            .iter()
            .filter(|(subsystem, _)| !self.ownership.borrow().contains_key(*subsystem))
            .filter_map(|(_, default)| default.clone())
            .collect();
        for default in defaults {
            if !self.enabled.get() && !default.0.borrow().runs_when_disabled() {
                continue;
            }
            self.schedule_now(default)?;
        }

        Ok(())
    }

    /// Execute/is_finished pass over the running set, in admission order.
    fn run_commands(&self) -> Result {
        let disabled = !self.enabled.get();
        let snapshot = self.running.borrow().clone();

        for command in snapshot {
            let mut inner = command.0.borrow_mut();

            if disabled && !inner.runs_when_disabled() {
                self.to_cancel.borrow_mut().push(command.clone());
                continue;
            }

            inner.execute()?;
            if inner.is_finished()? {
                log::debug!("{} finished", inner.name());
                self.ending.borrow_mut().push(command.clone());
                let res = inner.end(false);
                self.ending.borrow_mut().retain(|c| c != &command);
                res?;

                self.states
                    .borrow_mut()
                    .insert(command.clone(), CommandState::Finished);
                self.running.borrow_mut().retain(|c| c != &command);
                for requirement in inner.requirements() {
                    self.ownership.borrow_mut().remove(requirement);
                }
            }
        }
        Ok(())
    }

    /// Arbitrate and admit. Ownership moves atomically with respect to the
    /// tick: conflicts are interrupted before the newcomer initializes, and
    /// the newcomer is running before this returns.
    fn schedule_now(&self, command: CommandRef) -> Result<ScheduleStatus> {
        if !self.command_state(&command).is_startable() {
            return Ok(ScheduleStatus::AlreadyRunning);
        }

        let requirements = requirements_of(&*command.0.borrow());

        let mut conflicts: Vec<CommandRef> = Vec::new();
        for requirement in &requirements {
            if let Some(owner) = self.requiring(requirement) {
                if !conflicts.contains(&owner) {
                    conflicts.push(owner);
                }
            }
        }

        for conflict in &conflicts {
            if conflict.0.borrow().interruption_behavior() == InterruptionBehavior::CancelIncoming {
                log::debug!(
                    "{} rejected: {} is not interruptible",
                    command.0.borrow().name(),
                    conflict.0.borrow().name()
                );
                return Ok(ScheduleStatus::Rejected);
            }
        }

        for conflict in &conflicts {
            self.cancel_now(conflict)?;
        }

        self.init_command(command, requirements)?;
        Ok(ScheduleStatus::Started)
    }

    fn init_command(&self, command: CommandRef, requirements: HashSet<SubsystemRef>) -> Result {
        self.ownership
            .borrow_mut()
            .extend(requirements.into_iter().map(|r| (r, command.clone())));
        self.running.borrow_mut().push(command.clone());

        self.states
            .borrow_mut()
            .insert(command.clone(), CommandState::Initializing);
        {
            let mut inner = command.0.borrow_mut();
            log::debug!("{} scheduled", inner.name());
            inner.initialize()?;
        }
        self.states
            .borrow_mut()
            .insert(command, CommandState::Running);
        Ok(())
    }

    fn cancel_now(&self, command: &CommandRef) -> Result {
        if self.ending.borrow().contains(command) {
            return Ok(());
        }
        if !self.is_scheduled(command) {
            return Ok(());
        }

        self.ending.borrow_mut().push(command.clone());
        let res = {
            let mut inner = command.0.borrow_mut();
            log::debug!("{} interrupted", inner.name());
            inner.end(true)
        };
        self.ending.borrow_mut().retain(|c| c != command);
        res?;

        self.states
            .borrow_mut()
            .insert(command.clone(), CommandState::Interrupted);
        self.running.borrow_mut().retain(|c| c != command);
        let requirements = requirements_of(&*command.0.borrow());
        for requirement in &requirements {
            self.ownership.borrow_mut().remove(requirement);
        }

        Ok(())
    }
}

fn requirements_of(command: &dyn Command) -> HashSet<SubsystemRef> {
    command.requirements().iter().cloned().collect()
}
