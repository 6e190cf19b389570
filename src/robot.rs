//! Glue between the mode host's fixed-period callbacks and the scheduler.

use core::time::Duration;

use crate::hardware::Clock;
use crate::{Error, Result};

/// Control period the mode host is expected to hold.
pub const ITERATION_PERIOD: Duration = Duration::from_millis(20);

/// Operating mode reported by the field/competition host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatingMode {
    Disabled,
    Autonomous,
    Teleop,
    Test,
}

/// Per-mode lifecycle hooks. `*_init` runs once on each transition into the
/// mode; `*_periodic` runs every tick while in it; `periodic` runs every
/// tick regardless of mode and is where the scheduler is driven.
pub trait ScheduledRobot {
    fn periodic(&mut self) -> Result {
        Ok(())
    }
    fn disabled_init(&mut self) -> Result {
        Ok(())
    }
    fn disabled_periodic(&mut self) -> Result {
        Ok(())
    }
    fn autonomous_init(&mut self) -> Result {
        Ok(())
    }
    fn autonomous_periodic(&mut self) -> Result {
        Ok(())
    }
    fn teleop_init(&mut self) -> Result {
        Ok(())
    }
    fn teleop_periodic(&mut self) -> Result {
        Ok(())
    }
    fn test_init(&mut self) -> Result {
        Ok(())
    }
    fn test_periodic(&mut self) -> Result {
        Ok(())
    }
}

/// Detects ticks that overrun the control period. Recovery is not attempted
/// here; the overrun is escalated to the caller, which owns the decision to
/// halt or re-initialize.
#[derive(Debug)]
pub struct TickWatchdog {
    budget: Duration,
}

impl TickWatchdog {
    pub fn new(budget: Duration) -> Self {
        Self { budget }
    }

    pub fn check(&self, elapsed: Duration) -> Result {
        if elapsed > self.budget {
            log::error!(
                "tick overran: {}us of {}us budget",
                elapsed.as_micros(),
                self.budget.as_micros()
            );
            return Err(Error::TickOverrun {
                elapsed_us: elapsed.as_micros() as u64,
                budget_us: self.budget.as_micros() as u64,
            });
        }
        Ok(())
    }
}

/// Dispatches the host's per-tick callback to the right robot hooks and
/// watches the tick budget.
pub struct ModeController<R: ScheduledRobot, C: Clock> {
    robot: R,
    clock: C,
    watchdog: TickWatchdog,
    previous_mode: Option<OperatingMode>,
}

impl<R: ScheduledRobot, C: Clock> ModeController<R, C> {
    pub fn new(robot: R, clock: C) -> Self {
        Self {
            robot,
            clock,
            watchdog: TickWatchdog::new(ITERATION_PERIOD),
            previous_mode: None,
        }
    }

    pub fn with_tick_budget(mut self, budget: Duration) -> Self {
        self.watchdog = TickWatchdog::new(budget);
        self
    }

    pub fn robot(&self) -> &R {
        &self.robot
    }

    pub fn robot_mut(&mut self) -> &mut R {
        &mut self.robot
    }

    /// One control period: init hooks on a mode transition, then the mode's
    /// periodic hook, then the mode-independent `periodic`.
    pub fn tick(&mut self, mode: OperatingMode) -> Result {
        let started = self.clock.now();

        if self.previous_mode != Some(mode) {
            log::info!("entering {mode:?}");
            match mode {
                OperatingMode::Disabled => self.robot.disabled_init()?,
                OperatingMode::Autonomous => self.robot.autonomous_init()?,
                OperatingMode::Teleop => self.robot.teleop_init()?,
                OperatingMode::Test => self.robot.test_init()?,
            }
            self.previous_mode = Some(mode);
        }

        match mode {
            OperatingMode::Disabled => self.robot.disabled_periodic()?,
            OperatingMode::Autonomous => self.robot.autonomous_periodic()?,
            OperatingMode::Teleop => self.robot.teleop_periodic()?,
            OperatingMode::Test => self.robot.test_periodic()?,
        }
        self.robot.periodic()?;

        let elapsed = self.clock.now().saturating_sub(started);
        self.watchdog.check(elapsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::mock::MockClock;
    use std::cell::Cell;
    use std::rc::Rc;

    #[derive(Default)]
    struct HookCounts {
        auto_init: Cell<u32>,
        auto_periodic: Cell<u32>,
        teleop_init: Cell<u32>,
        periodic: Cell<u32>,
    }

    struct CountingRobot {
        counts: Rc<HookCounts>,
    }

    impl ScheduledRobot for CountingRobot {
        fn periodic(&mut self) -> Result {
            self.counts.periodic.set(self.counts.periodic.get() + 1);
            Ok(())
        }
        fn autonomous_init(&mut self) -> Result {
            self.counts.auto_init.set(self.counts.auto_init.get() + 1);
            Ok(())
        }
        fn autonomous_periodic(&mut self) -> Result {
            self.counts
                .auto_periodic
                .set(self.counts.auto_periodic.get() + 1);
            Ok(())
        }
        fn teleop_init(&mut self) -> Result {
            self.counts.teleop_init.set(self.counts.teleop_init.get() + 1);
            Ok(())
        }
    }

    #[test]
    fn init_hooks_fire_once_per_transition() {
        let counts = Rc::new(HookCounts::default());
        let robot = CountingRobot {
            counts: counts.clone(),
        };
        let mut controller = ModeController::new(robot, MockClock::default());

        controller.tick(OperatingMode::Autonomous).unwrap();
        controller.tick(OperatingMode::Autonomous).unwrap();
        controller.tick(OperatingMode::Autonomous).unwrap();
        assert_eq!(counts.auto_init.get(), 1);
        assert_eq!(counts.auto_periodic.get(), 3);

        controller.tick(OperatingMode::Teleop).unwrap();
        assert_eq!(counts.teleop_init.get(), 1);
        assert_eq!(counts.periodic.get(), 4);
    }

    struct SlowRobot {
        clock: Rc<MockClock>,
    }

    impl ScheduledRobot for SlowRobot {
        fn periodic(&mut self) -> Result {
            self.clock.advance(Duration::from_millis(50));
            Ok(())
        }
    }

    #[test]
    fn overrunning_the_budget_is_fatal() {
        let clock = Rc::new(MockClock::default());
        let robot = SlowRobot {
            clock: clock.clone(),
        };
        let mut controller = ModeController::new(robot, clock);

        let err = controller.tick(OperatingMode::Teleop).unwrap_err();
        assert!(matches!(err, Error::TickOverrun { .. }));
    }
}
