use alloc::rc::Rc;
use alloc::vec;
use core::cell::RefCell;
use core::fmt::Debug;

use crate::command::FunctionalCommand;
use crate::{CommandScheduler, Result, SubsystemRef};

/// One functional actuator group (drivetrain, elevator, ...) owning its
/// controllers and safety interpretation.
///
/// A subsystem never starts or stops a command itself; the scheduler is the
/// only component that acts on ownership. Anything that moves an actuator is
/// reached through a command that requires this subsystem.
pub trait Subsystem: Debug {
    /// Stable name used for logs and telemetry keys.
    fn name(&self) -> &str;

    /// Called once per scheduler run, before any command executes. Concrete
    /// subsystems tick their controllers and publish telemetry here.
    fn periodic(&mut self) {}

    fn register(self, scheduler: &CommandScheduler) -> Rc<RefCell<Self>>
    where
        Self: Sized + 'static,
    {
        scheduler.register(self)
    }
}

/// Command factories that require the subsystem they are built from.
pub trait SubsystemRefExt {
    fn run_once(&self, action: impl FnMut() -> Result + 'static) -> FunctionalCommand;
    fn run(&self, action: impl FnMut() -> Result + 'static) -> FunctionalCommand;
    fn start_end(
        &self,
        start: impl FnMut() -> Result + 'static,
        end: impl FnMut() -> Result + 'static,
    ) -> FunctionalCommand;
    fn run_end(
        &self,
        run: impl FnMut() -> Result + 'static,
        end: impl FnMut() -> Result + 'static,
    ) -> FunctionalCommand;
}

impl<T> SubsystemRefExt for Rc<RefCell<T>>
where
    T: Subsystem + 'static,
{
    fn run_once(&self, action: impl FnMut() -> Result + 'static) -> FunctionalCommand {
        SubsystemRef(self.clone()).run_once(action)
    }

    fn run(&self, action: impl FnMut() -> Result + 'static) -> FunctionalCommand {
        SubsystemRef(self.clone()).run(action)
    }

    fn start_end(
        &self,
        start: impl FnMut() -> Result + 'static,
        end: impl FnMut() -> Result + 'static,
    ) -> FunctionalCommand {
        SubsystemRef(self.clone()).start_end(start, end)
    }

    fn run_end(
        &self,
        run: impl FnMut() -> Result + 'static,
        end: impl FnMut() -> Result + 'static,
    ) -> FunctionalCommand {
        SubsystemRef(self.clone()).run_end(run, end)
    }
}

impl SubsystemRefExt for SubsystemRef {
    fn run_once(&self, action: impl FnMut() -> Result + 'static) -> FunctionalCommand {
        FunctionalCommand::instant(action, vec![self.clone()])
    }

    fn run(&self, action: impl FnMut() -> Result + 'static) -> FunctionalCommand {
        FunctionalCommand::run(action, vec![self.clone()])
    }

    fn start_end(
        &self,
        start: impl FnMut() -> Result + 'static,
        end: impl FnMut() -> Result + 'static,
    ) -> FunctionalCommand {
        FunctionalCommand::start_end(start, end, vec![self.clone()])
    }

    fn run_end(
        &self,
        run: impl FnMut() -> Result + 'static,
        end: impl FnMut() -> Result + 'static,
    ) -> FunctionalCommand {
        FunctionalCommand::run_end(run, end, vec![self.clone()])
    }
}
