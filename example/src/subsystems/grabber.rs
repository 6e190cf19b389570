use std::fmt::Debug;

use robot_command::control::{ClosedLoopController, ControllerConfig, PidGains};
use robot_command::hardware::ActuatorDriver;
use robot_command::subsystem::Subsystem;
use robot_command::Result;

use super::{SharedSink, DT};

const INTAKE_POWER: f64 = 0.6;
const EJECT_POWER: f64 = -1.0;

/// Cube intake: a pair of open-loop wheels, one per jaw.
#[derive(Debug)]
pub struct Grabber<D: ActuatorDriver + Debug> {
    left: ClosedLoopController<D>,
    right: ClosedLoopController<D>,
    telemetry: SharedSink,
}

impl<D: ActuatorDriver + Debug> Grabber<D> {
    pub fn new(left: D, right: D, telemetry: SharedSink) -> Result<Self> {
        let config = ControllerConfig::new(PidGains::default());
        Ok(Self {
            left: ClosedLoopController::new(left, config)?,
            right: ClosedLoopController::new(right, config)?,
            telemetry,
        })
    }

    pub fn intake(&mut self) {
        self.set_power(INTAKE_POWER);
    }

    pub fn eject(&mut self) {
        self.set_power(EJECT_POWER);
    }

    pub fn stop(&mut self) {
        self.set_power(0.0);
    }

    /// Positive pulls a cube in, negative pushes it out. The wheels counter-
    /// rotate, so the right side is mirrored.
    pub fn set_power(&mut self, percent: f64) {
        self.left.drive_at_power(percent);
        self.right.drive_at_power(-percent);
    }
}

impl<D: ActuatorDriver + Debug> Subsystem for Grabber<D> {
    fn name(&self) -> &str {
        "grabber"
    }

    fn periodic(&mut self) {
        if let Err(err) = self.left.tick(DT) {
            log::warn!("grabber left tick failed: {err}");
        }
        if let Err(err) = self.right.tick(DT) {
            log::warn!("grabber right tick failed: {err}");
        }

        let mut sink = self.telemetry.0.borrow_mut();
        sink.publish("grabber/output", self.left.output().into());
    }
}
