use std::fmt::Debug;

use robot_command::control::{
    ClosedLoopController, ControllerConfig, CurrentLimit, PidGains, PresetTable, SoftLimits,
};
use robot_command::hardware::ActuatorDriver;
use robot_command::subsystem::Subsystem;
use robot_command::Result;

use super::{SharedSink, DT};

/// Named carriage heights, in encoder counts below the zeroed top position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElevatorPreset {
    PowerCubePickup,
    PowerCubeLift,
    Exchange,
    Switch,
    LowScale,
    HighScale,
}

const PRESETS: [(ElevatorPreset, &str, i64); 6] = [
    (ElevatorPreset::PowerCubePickup, "POWER_CUBE_PICKUP", -450),
    (ElevatorPreset::PowerCubeLift, "POWER_CUBE_LIFT", -600),
    (ElevatorPreset::Exchange, "EXCHANGE", -1_926),
    (ElevatorPreset::Switch, "SWITCH", -12_000),
    (ElevatorPreset::LowScale, "LOW_SCALE", -25_555),
    (ElevatorPreset::HighScale, "HIGH_SCALE", -33_050),
];

/// Travel range. Zero is the top of travel; all presets sit below it, and the
/// reverse bound leaves margin under the lowest preset.
const TRAVEL: SoftLimits = SoftLimits::new(0, -33_500);

/// Which end of travel the forward limit switch sits at. Explicit per
/// mounting orientation, never inferred from motion direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitOrientation {
    ForwardIsUpper,
    ForwardIsLower,
}

#[derive(Debug)]
pub struct Elevator<D: ActuatorDriver + Debug> {
    controller: ClosedLoopController<D>,
    presets: PresetTable<ElevatorPreset>,
    orientation: LimitOrientation,
    telemetry: SharedSink,
}

impl<D: ActuatorDriver + Debug> Elevator<D> {
    pub fn new(driver: D, telemetry: SharedSink) -> Result<Self> {
        let config = ControllerConfig::new(PidGains::new(0.0, 1.0, 0.0, 0.0))
            .with_current_limit(CurrentLimit::new(19.0, 25.0, 5))
            .with_soft_limits(TRAVEL);
        Ok(Self {
            controller: ClosedLoopController::new(driver, config)?,
            presets: PresetTable::new(PRESETS, &TRAVEL)?,
            orientation: LimitOrientation::ForwardIsUpper,
            telemetry,
        })
    }

    pub fn zero_encoder(&mut self) -> Result {
        self.controller.zero()
    }

    pub fn position(&self) -> i64 {
        self.controller.position()
    }

    pub fn drive_to_preset(&mut self, preset: ElevatorPreset) {
        // Every preset was validated against the travel range at build time.
        if let Some(counts) = self.presets.counts(preset) {
            self.controller.drive_to_position(counts);
        }
    }

    pub fn preset_counts(&self, preset: ElevatorPreset) -> Option<i64> {
        self.presets.counts(preset)
    }

    pub fn drive_to_position(&mut self, counts: i64) {
        self.controller.drive_to_position(counts);
    }

    pub fn drive_at_power(&mut self, percent: f64) {
        self.controller.drive_at_power(percent);
    }

    pub fn is_upper_limit_hit(&self) -> bool {
        match self.orientation {
            LimitOrientation::ForwardIsUpper => self.controller.is_at_forward_limit(),
            LimitOrientation::ForwardIsLower => self.controller.is_at_reverse_limit(),
        }
    }

    pub fn is_lower_limit_hit(&self) -> bool {
        match self.orientation {
            LimitOrientation::ForwardIsUpper => self.controller.is_at_reverse_limit(),
            LimitOrientation::ForwardIsLower => self.controller.is_at_forward_limit(),
        }
    }
}

impl<D: ActuatorDriver + Debug> Subsystem for Elevator<D> {
    fn name(&self) -> &str {
        "elevator"
    }

    fn periodic(&mut self) {
        if let Err(err) = self.controller.tick(DT) {
            log::warn!("elevator tick failed: {err}");
        }

        let mut sink = self.telemetry.0.borrow_mut();
        sink.publish("elevator/position", self.controller.position().into());
        sink.publish("elevator/output", self.controller.output().into());
        sink.publish("elevator/upper_limit", self.is_upper_limit_hit().into());
        sink.publish("elevator/lower_limit", self.is_lower_limit_hit().into());
    }
}
