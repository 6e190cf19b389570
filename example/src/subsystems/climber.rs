use std::fmt::Debug;

use robot_command::control::{ClosedLoopController, ControllerConfig, PidGains};
use robot_command::hardware::ActuatorDriver;
use robot_command::subsystem::Subsystem;
use robot_command::Result;

use super::{SharedSink, DT};

const CLIMB_POWER: f64 = 1.0;

/// End-game winch. Open loop only; the winch ratchet holds the load, so the
/// motor never drives in reverse.
#[derive(Debug)]
pub struct Climber<D: ActuatorDriver + Debug> {
    winch: ClosedLoopController<D>,
    telemetry: SharedSink,
}

impl<D: ActuatorDriver + Debug> Climber<D> {
    pub fn new(winch: D, telemetry: SharedSink) -> Result<Self> {
        let config = ControllerConfig::new(PidGains::default());
        let mut winch = ClosedLoopController::new(winch, config)?;
        winch.set_brake_mode(true)?;
        Ok(Self { winch, telemetry })
    }

    pub fn climb(&mut self) {
        self.winch.drive_at_power(CLIMB_POWER);
    }

    pub fn stop(&mut self) {
        self.winch.drive_at_power(0.0);
    }
}

impl<D: ActuatorDriver + Debug> Subsystem for Climber<D> {
    fn name(&self) -> &str {
        "climber"
    }

    fn periodic(&mut self) {
        if let Err(err) = self.winch.tick(DT) {
            log::warn!("climber tick failed: {err}");
        }

        let mut sink = self.telemetry.0.borrow_mut();
        sink.publish("climber/output", self.winch.output().into());
    }
}
