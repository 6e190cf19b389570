use std::fmt::Debug;

use robot_command::control::{ClosedLoopController, ControllerConfig, PidGains};
use robot_command::hardware::ActuatorDriver;
use robot_command::subsystem::Subsystem;
use robot_command::Result;

use super::{SharedSink, DT};

/// Tank drivetrain: one closed-loop controller per side.
#[derive(Debug)]
pub struct Drivetrain<D: ActuatorDriver + Debug> {
    left: ClosedLoopController<D>,
    right: ClosedLoopController<D>,
    telemetry: SharedSink,
}

impl<D: ActuatorDriver + Debug> Drivetrain<D> {
    pub fn new(left: D, right: D, telemetry: SharedSink) -> Result<Self> {
        let left_config = ControllerConfig::new(PidGains::new(0.0, 0.12, 0.0, 0.0012));
        let right_config = ControllerConfig::new(PidGains::new(0.0, 0.08, 0.0, 0.0));
        Ok(Self {
            left: ClosedLoopController::new(left, left_config)?,
            right: ClosedLoopController::new(right, right_config)?,
            telemetry,
        })
    }

    /// Open-loop tank drive. Inputs are clamped to [-1, 1] downstream.
    pub fn power_drive(&mut self, left: f64, right: f64) {
        self.left.drive_at_power(left);
        self.right.drive_at_power(right);
    }

    /// Closed-loop drive of both sides to the same count target.
    pub fn drive_to_position(&mut self, counts: i64) {
        self.left.drive_to_position(counts);
        self.right.drive_to_position(counts);
    }

    pub fn left_position(&self) -> i64 {
        self.left.position()
    }

    pub fn right_position(&self) -> i64 {
        self.right.position()
    }

    pub fn zero_encoders(&mut self) -> Result {
        self.left.zero()?;
        self.right.zero()
    }

    pub fn set_brake_mode(&mut self, brake: bool) -> Result {
        self.left.set_brake_mode(brake)?;
        self.right.set_brake_mode(brake)
    }
}

impl<D: ActuatorDriver + Debug> Subsystem for Drivetrain<D> {
    fn name(&self) -> &str {
        "drive"
    }

    fn periodic(&mut self) {
        if let Err(err) = self.left.tick(DT) {
            log::warn!("drive left tick failed: {err}");
        }
        if let Err(err) = self.right.tick(DT) {
            log::warn!("drive right tick failed: {err}");
        }

        let mut sink = self.telemetry.0.borrow_mut();
        sink.publish("drive/left_position", self.left.position().into());
        sink.publish("drive/right_position", self.right.position().into());
        sink.publish("drive/left_output", self.left.output().into());
        sink.publish("drive/right_output", self.right.output().into());
    }
}
