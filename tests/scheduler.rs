//! Scheduler arbitration and lifecycle scenarios.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use robot_command::command::{Command, CommandState, InterruptionBehavior};
use robot_command::subsystem::Subsystem;
use robot_command::{
    CommandRef, CommandScheduler, FunctionalCommand, Result, ScheduleStatus, SubsystemRef,
};

#[derive(Debug)]
struct TestSubsystem {
    name: &'static str,
    periodic_count: Rc<Cell<u32>>,
}

impl TestSubsystem {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            periodic_count: Rc::default(),
        }
    }
}

impl Subsystem for TestSubsystem {
    fn name(&self) -> &str {
        self.name
    }

    fn periodic(&mut self) {
        self.periodic_count.set(self.periodic_count.get() + 1);
    }
}

#[derive(Default)]
struct Trace {
    initialized: Cell<u32>,
    executed: Cell<u32>,
    ended: Cell<u32>,
    interrupted: Cell<u32>,
}

struct TracedCommand {
    name: &'static str,
    trace: Rc<Trace>,
    requirements: Vec<SubsystemRef>,
    /// `is_finished` turns true once `execute` has run this many times.
    finish_after: Option<u32>,
    behavior: InterruptionBehavior,
    execution_log: Option<Rc<RefCell<Vec<&'static str>>>>,
}

impl TracedCommand {
    fn new(name: &'static str, requirements: Vec<SubsystemRef>) -> Self {
        Self {
            name,
            trace: Rc::default(),
            requirements,
            finish_after: None,
            behavior: InterruptionBehavior::CancelSelf,
            execution_log: None,
        }
    }

    fn finishing_after(mut self, executes: u32) -> Self {
        self.finish_after = Some(executes);
        self
    }

    fn non_interruptible(mut self) -> Self {
        self.behavior = InterruptionBehavior::CancelIncoming;
        self
    }

    fn logging_to(mut self, log: &Rc<RefCell<Vec<&'static str>>>) -> Self {
        self.execution_log = Some(log.clone());
        self
    }

    fn trace(&self) -> Rc<Trace> {
        self.trace.clone()
    }
}

impl Command for TracedCommand {
    fn requirements(&self) -> &[SubsystemRef] {
        &self.requirements
    }

    fn initialize(&mut self) -> Result {
        self.trace.initialized.set(self.trace.initialized.get() + 1);
        Ok(())
    }

    fn execute(&mut self) -> Result {
        self.trace.executed.set(self.trace.executed.get() + 1);
        if let Some(log) = &self.execution_log {
            log.borrow_mut().push(self.name);
        }
        Ok(())
    }

    fn end(&mut self, interrupted: bool) -> Result {
        if interrupted {
            self.trace.interrupted.set(self.trace.interrupted.get() + 1);
        } else {
            self.trace.ended.set(self.trace.ended.get() + 1);
        }
        Ok(())
    }

    fn is_finished(&self) -> Result<bool> {
        Ok(self
            .finish_after
            .is_some_and(|n| self.trace.executed.get() >= n))
    }

    fn interruption_behavior(&self) -> InterruptionBehavior {
        self.behavior
    }

    fn name(&self) -> &str {
        self.name
    }
}

#[test]
fn command_lifecycle_through_finish_and_default_takeover() {
    let scheduler = CommandScheduler::new();
    let drive = scheduler.register(TestSubsystem::new("drive"));

    let default = TracedCommand::new("drive_idle", vec![SubsystemRef(drive.clone())]);
    let default_trace = default.trace();
    scheduler.set_default_command(&drive, default).unwrap();

    let auto = TracedCommand::new("auto", vec![SubsystemRef(drive.clone())]).finishing_after(4);
    let trace = auto.trace();
    let auto: CommandRef = auto.into();

    assert_eq!(scheduler.command_state(&auto), CommandState::Idle);
    assert_eq!(
        scheduler.schedule(auto.clone()).unwrap(),
        ScheduleStatus::Started
    );
    assert_eq!(trace.initialized.get(), 1);
    assert_eq!(scheduler.command_state(&auto), CommandState::Running);

    for _ in 0..3 {
        scheduler.run().unwrap();
    }
    assert_eq!(trace.executed.get(), 3);
    assert!(scheduler.is_scheduled(&auto));

    // Fourth tick: is_finished turns true, end(false) runs once, and the
    // default command takes the subsystem over within the same tick.
    scheduler.run().unwrap();
    assert_eq!(trace.executed.get(), 4);
    assert_eq!(trace.ended.get(), 1);
    assert_eq!(trace.interrupted.get(), 0);
    assert_eq!(scheduler.command_state(&auto), CommandState::Finished);

    let owner = scheduler.requiring(&SubsystemRef(drive.clone())).unwrap();
    assert_eq!(owner.0.borrow().name(), "drive_idle");
    assert_eq!(default_trace.initialized.get(), 1);

    // Next tick the default actually executes.
    scheduler.run().unwrap();
    assert_eq!(default_trace.executed.get(), 1);
}

#[test]
fn interruptible_owner_is_displaced_by_newcomer() {
    let scheduler = CommandScheduler::new();
    let elevator = scheduler.register(TestSubsystem::new("elevator"));

    let first = TracedCommand::new("first", vec![SubsystemRef(elevator.clone())]);
    let first_trace = first.trace();
    let first: CommandRef = first.into();

    let second = TracedCommand::new("second", vec![SubsystemRef(elevator.clone())]);
    let second: CommandRef = second.into();

    scheduler.schedule(first.clone()).unwrap();
    assert_eq!(
        scheduler.schedule(second.clone()).unwrap(),
        ScheduleStatus::Started
    );

    assert_eq!(first_trace.interrupted.get(), 1);
    assert_eq!(first_trace.ended.get(), 0);
    assert_eq!(scheduler.command_state(&first), CommandState::Interrupted);
    assert!(!scheduler.is_scheduled(&first));

    let owner = scheduler.requiring(&SubsystemRef(elevator.clone())).unwrap();
    assert_eq!(owner, second);
}

#[test]
fn non_interruptible_owner_rejects_newcomer() {
    let scheduler = CommandScheduler::new();
    let elevator = scheduler.register(TestSubsystem::new("elevator"));

    let holder =
        TracedCommand::new("holder", vec![SubsystemRef(elevator.clone())]).non_interruptible();
    let holder: CommandRef = holder.into();

    let newcomer = TracedCommand::new("newcomer", vec![SubsystemRef(elevator.clone())]);
    let newcomer_trace = newcomer.trace();
    let newcomer: CommandRef = newcomer.into();

    scheduler.schedule(holder.clone()).unwrap();
    assert_eq!(
        scheduler.schedule(newcomer.clone()).unwrap(),
        ScheduleStatus::Rejected
    );

    assert!(scheduler.is_scheduled(&holder));
    assert_eq!(scheduler.command_state(&holder), CommandState::Running);
    assert_eq!(scheduler.command_state(&newcomer), CommandState::Idle);
    assert_eq!(newcomer_trace.initialized.get(), 0);
}

#[test]
fn no_subsystem_is_ever_owned_by_two_running_commands() {
    let scheduler = CommandScheduler::new();
    let drive = scheduler.register(TestSubsystem::new("drive"));
    let elevator = scheduler.register(TestSubsystem::new("elevator"));

    // Spans both subsystems, then is displaced by one that needs only drive.
    let both = TracedCommand::new(
        "both",
        vec![SubsystemRef(drive.clone()), SubsystemRef(elevator.clone())],
    );
    let both: CommandRef = both.into();
    let drive_only = TracedCommand::new("drive_only", vec![SubsystemRef(drive.clone())]);
    let drive_only: CommandRef = drive_only.into();

    scheduler.schedule(both.clone()).unwrap();
    scheduler.schedule(drive_only.clone()).unwrap();

    // The spanning command lost all of its subsystems, not just drive.
    assert_eq!(
        scheduler.requiring(&SubsystemRef(drive.clone())),
        Some(drive_only.clone())
    );
    assert_eq!(scheduler.requiring(&SubsystemRef(elevator.clone())), None);
    assert!(!scheduler.is_scheduled(&both));
}

#[test]
fn exactly_one_completion_per_activation_and_commands_are_reusable() {
    let scheduler = CommandScheduler::new();
    let grabber = scheduler.register(TestSubsystem::new("grabber"));

    let command = TracedCommand::new("grab", vec![SubsystemRef(grabber.clone())]);
    let trace = command.trace();
    let command: CommandRef = command.into();

    scheduler.schedule(command.clone()).unwrap();
    scheduler.cancel(command.clone()).unwrap();
    assert_eq!(trace.interrupted.get(), 1);
    assert_eq!(trace.ended.get(), 0);

    // Canceling an idle command is a no-op.
    scheduler.cancel(command.clone()).unwrap();
    assert_eq!(trace.interrupted.get(), 1);

    // Terminal states are restartable.
    assert_eq!(
        scheduler.schedule(command.clone()).unwrap(),
        ScheduleStatus::Started
    );
    assert_eq!(trace.initialized.get(), 2);
    assert_eq!(
        scheduler.schedule(command.clone()).unwrap(),
        ScheduleStatus::AlreadyRunning
    );
    assert_eq!(trace.initialized.get(), 2);
}

#[test]
fn commands_execute_in_admission_order() {
    let scheduler = CommandScheduler::new();
    let drive = scheduler.register(TestSubsystem::new("drive"));
    let elevator = scheduler.register(TestSubsystem::new("elevator"));

    let log = Rc::new(RefCell::new(Vec::new()));
    let first =
        TracedCommand::new("first", vec![SubsystemRef(drive.clone())]).logging_to(&log);
    let second =
        TracedCommand::new("second", vec![SubsystemRef(elevator.clone())]).logging_to(&log);

    scheduler.schedule(CommandRef::from(first)).unwrap();
    scheduler.schedule(CommandRef::from(second)).unwrap();

    scheduler.run().unwrap();
    scheduler.run().unwrap();
    assert_eq!(*log.borrow(), vec!["first", "second", "first", "second"]);
}

#[test]
fn mid_run_requests_are_deferred_to_the_end_of_the_tick() {
    let scheduler = Rc::new(CommandScheduler::new());
    let drive = scheduler.register(TestSubsystem::new("drive"));

    let target = TracedCommand::new("target", vec![SubsystemRef(drive.clone())]);
    let target_trace = target.trace();
    let target: CommandRef = target.into();

    let status = Rc::new(Cell::new(None));
    let starter = {
        let scheduler = scheduler.clone();
        let target = target.clone();
        let status = status.clone();
        FunctionalCommand::run(
            move || {
                status.set(Some(scheduler.schedule(target.clone())?));
                Ok(())
            },
            vec![],
        )
        .with_name("starter")
    };

    scheduler.schedule(CommandRef::from(starter)).unwrap();
    scheduler.run().unwrap();

    assert_eq!(status.get(), Some(ScheduleStatus::Deferred));
    // Admitted after the execute pass, within the same tick.
    assert!(scheduler.is_scheduled(&target));
    assert_eq!(target_trace.initialized.get(), 1);
    assert_eq!(target_trace.executed.get(), 0);
}

#[test]
fn disabled_mode_cancels_commands_and_withholds_defaults() {
    let scheduler = CommandScheduler::new();
    let drive = scheduler.register(TestSubsystem::new("drive"));

    let default = TracedCommand::new("drive_idle", vec![SubsystemRef(drive.clone())]);
    let default_trace = default.trace();
    scheduler.set_default_command(&drive, default).unwrap();

    let teleop = TracedCommand::new("teleop", vec![SubsystemRef(drive.clone())]);
    let teleop_trace = teleop.trace();
    let teleop: CommandRef = teleop.into();
    scheduler.schedule(teleop.clone()).unwrap();

    scheduler.set_enabled(false);
    scheduler.run().unwrap();
    assert_eq!(teleop_trace.interrupted.get(), 1);
    assert!(!scheduler.is_scheduled(&teleop));
    assert_eq!(default_trace.initialized.get(), 0);

    scheduler.set_enabled(true);
    scheduler.run().unwrap();
    assert_eq!(default_trace.initialized.get(), 1);
}

#[test]
fn default_command_must_require_its_subsystem() {
    let scheduler = CommandScheduler::new();
    let drive = scheduler.register(TestSubsystem::new("drive"));

    let unrelated = TracedCommand::new("unrelated", vec![]);
    assert!(scheduler.set_default_command(&drive, unrelated).is_err());
}

#[test]
fn subsystem_periodic_runs_once_per_tick() {
    let scheduler = CommandScheduler::new();
    let subsystem = TestSubsystem::new("drive");
    let count = subsystem.periodic_count.clone();
    let _drive = scheduler.register(subsystem);

    for _ in 0..5 {
        scheduler.run().unwrap();
    }
    assert_eq!(count.get(), 5);
}

#[test]
fn cancel_all_interrupts_everything() {
    let scheduler = CommandScheduler::new();
    let drive = scheduler.register(TestSubsystem::new("drive"));
    let elevator = scheduler.register(TestSubsystem::new("elevator"));

    let a = TracedCommand::new("a", vec![SubsystemRef(drive.clone())]);
    let a_trace = a.trace();
    let b = TracedCommand::new("b", vec![SubsystemRef(elevator.clone())]);
    let b_trace = b.trace();

    scheduler.schedule(CommandRef::from(a)).unwrap();
    scheduler.schedule(CommandRef::from(b)).unwrap();
    scheduler.cancel_all().unwrap();

    assert_eq!(a_trace.interrupted.get(), 1);
    assert_eq!(b_trace.interrupted.get(), 1);
    assert_eq!(scheduler.requiring(&SubsystemRef(drive.clone())), None);
    assert_eq!(scheduler.requiring(&SubsystemRef(elevator.clone())), None);
}
