//! Closed-loop control for a single actuator: setpoint tracking with
//! feed-forward, thermal current limiting and travel-limit clamping.

use core::hash::Hash;
use core::time::Duration;

use hashbrown::HashMap;
use snafu::Snafu;

use crate::hardware::ActuatorDriver;
use crate::Result;

mod pid;

pub use pid::{Pid, PidGains};

fn abs(value: f64) -> f64 {
    if value < 0.0 {
        -value
    } else {
        value
    }
}

/// Thermal protection policy: sustained draw is bounded by `continuous_amps`,
/// and draw at or above `peak_amps` is tolerated for at most `peak_ticks`
/// control periods before output is forced back down.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurrentLimit {
    pub continuous_amps: f64,
    pub peak_amps: f64,
    pub peak_ticks: u32,
}

impl CurrentLimit {
    pub const fn new(continuous_amps: f64, peak_amps: f64, peak_ticks: u32) -> Self {
        Self {
            continuous_amps,
            peak_amps,
            peak_ticks,
        }
    }
}

impl Default for CurrentLimit {
    /// Bounds matching a 40 A breaker circuit.
    fn default() -> Self {
        Self::new(40.0, 60.0, 25)
    }
}

/// Software travel boundaries in encoder counts. Each side is independently
/// enabled; `None` leaves that direction unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SoftLimits {
    pub forward: Option<i64>,
    pub reverse: Option<i64>,
}

impl SoftLimits {
    pub const DISABLED: Self = Self {
        forward: None,
        reverse: None,
    };

    pub const fn new(forward: i64, reverse: i64) -> Self {
        Self {
            forward: Some(forward),
            reverse: Some(reverse),
        }
    }

    /// Clamp a target into the enabled range.
    pub fn clamp(&self, counts: i64) -> i64 {
        let mut counts = counts;
        if let Some(forward) = self.forward {
            counts = counts.min(forward);
        }
        if let Some(reverse) = self.reverse {
            counts = counts.max(reverse);
        }
        counts
    }

    pub fn contains(&self, counts: i64) -> bool {
        self.clamp(counts) == counts
    }
}

/// Construction-time controller configuration. Gains and limits are fixed for
/// the life of the controller; there is no online retuning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControllerConfig {
    pub gains: PidGains,
    /// Closed-loop slot on the motor controller this configuration targets.
    pub loop_index: u8,
    /// Budget for configuration writes to the device.
    pub timeout: Duration,
    pub current_limit: CurrentLimit,
    pub soft_limits: SoftLimits,
}

impl ControllerConfig {
    pub fn new(gains: PidGains) -> Self {
        Self {
            gains,
            loop_index: 0,
            timeout: Duration::from_millis(10),
            current_limit: CurrentLimit::default(),
            soft_limits: SoftLimits::DISABLED,
        }
    }

    pub fn with_loop_index(mut self, loop_index: u8) -> Self {
        self.loop_index = loop_index;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_current_limit(mut self, limit: CurrentLimit) -> Self {
        self.current_limit = limit;
        self
    }

    pub fn with_soft_limits(mut self, limits: SoftLimits) -> Self {
        self.soft_limits = limits;
        self
    }
}

/// What the controller is currently being asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ControlMode {
    #[default]
    Disabled,
    /// Open loop at a fixed fraction of bus voltage.
    PercentOutput,
    /// Closed loop toward a position in encoder counts.
    Position,
}

/// Wraps one [`ActuatorDriver`] and drives it toward a commanded setpoint
/// while enforcing the safety envelope.
///
/// `tick` must be called exactly once per control period; between ticks the
/// commanded mode is changed through `drive_to_position` / `drive_at_power` /
/// `disable`.
#[derive(Debug)]
pub struct ClosedLoopController<D: ActuatorDriver> {
    driver: D,
    config: ControllerConfig,
    pid: Pid,
    mode: ControlMode,
    percent_demand: f64,
    position_setpoint: i64,
    last_position: i64,
    last_output: f64,
    over_peak_ticks: u32,
    current_limited: bool,
}

impl<D: ActuatorDriver> ClosedLoopController<D> {
    pub fn new(mut driver: D, config: ControllerConfig) -> Result<Self> {
        driver.configure(&config)?;
        Ok(Self {
            driver,
            config,
            pid: Pid::new(config.gains),
            mode: ControlMode::Disabled,
            percent_demand: 0.0,
            position_setpoint: 0,
            last_position: 0,
            last_output: 0.0,
            over_peak_ticks: 0,
            current_limited: false,
        })
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn mode(&self) -> ControlMode {
        self.mode
    }

    /// Last good encoder reading, in counts.
    pub fn position(&self) -> i64 {
        self.last_position
    }

    /// Output applied on the most recent tick, in [-1.0, 1.0].
    pub fn output(&self) -> f64 {
        self.last_output
    }

    /// Command a closed-loop move. The target is clamped into the enabled
    /// soft-limit range; out-of-range requests are not an error.
    pub fn drive_to_position(&mut self, counts: i64) {
        let clamped = self.config.soft_limits.clamp(counts);
        if clamped != counts {
            log::debug!("position request {counts} clamped to {clamped} by soft limits");
        }
        if self.mode != ControlMode::Position || self.position_setpoint != clamped {
            self.pid.reset();
        }
        self.position_setpoint = clamped;
        self.mode = ControlMode::Position;
    }

    /// Command an open-loop output. Values outside [-1.0, 1.0] are clamped.
    pub fn drive_at_power(&mut self, percent: f64) {
        self.percent_demand = percent.clamp(-1.0, 1.0);
        self.mode = ControlMode::PercentOutput;
    }

    /// Stop driving. The next tick commands zero output.
    pub fn disable(&mut self) {
        self.mode = ControlMode::Disabled;
    }

    /// Make the current physical position the new zero reference. Must be
    /// called before position setpoints are meaningful; counts are relative.
    pub fn zero(&mut self) -> Result {
        self.driver.set_position(0)?;
        self.last_position = 0;
        self.pid.reset();
        Ok(())
    }

    pub fn is_at_forward_limit(&self) -> bool {
        self.driver.forward_limit().unwrap_or(false)
    }

    pub fn is_at_reverse_limit(&self) -> bool {
        self.driver.reverse_limit().unwrap_or(false)
    }

    pub fn set_brake_mode(&mut self, brake: bool) -> Result {
        self.driver.set_brake_mode(brake)?;
        Ok(())
    }

    /// Run one control period: read sensors, close the loop, enforce the
    /// safety envelope, write the output.
    ///
    /// `dt` is the control period in seconds. A failed sensor read holds the
    /// last commanded output rather than dropping to zero.
    pub fn tick(&mut self, dt: f64) -> Result {
        let position = match self.driver.position() {
            Ok(counts) => {
                self.last_position = counts;
                counts
            }
            Err(err) => {
                log::warn!("encoder read failed, holding last output: {err}");
                return self.apply(self.last_output);
            }
        };

        let (at_forward, at_reverse) =
            match (self.driver.forward_limit(), self.driver.reverse_limit()) {
                (Ok(forward), Ok(reverse)) => (forward, reverse),
                (Err(err), _) | (_, Err(err)) => {
                    log::warn!("limit switch read failed, holding last output: {err}");
                    return self.apply(self.last_output);
                }
            };

        let mut demand = match self.mode {
            ControlMode::Disabled => 0.0,
            ControlMode::PercentOutput => {
                let mut demand = self.percent_demand;
                // Hard limit reached: refuse to push further into it.
                if (at_forward && demand > 0.0) || (at_reverse && demand < 0.0) {
                    demand = 0.0;
                }
                demand
            }
            ControlMode::Position => {
                // A setpoint past an asserted limit switch collapses to the
                // position where the switch tripped, and holds there.
                if (at_forward && self.position_setpoint > position)
                    || (at_reverse && self.position_setpoint < position)
                {
                    log::debug!(
                        "setpoint {} clamped to {position} at hard limit",
                        self.position_setpoint
                    );
                    self.position_setpoint = position;
                }
                self.pid
                    .update(self.position_setpoint as f64, position as f64, dt)
            }
        };

        demand = self.limit_current(demand);
        self.apply(demand)
    }

    /// Thermal protection, enforced unconditionally. Once draw has sat at or
    /// above the peak limit for `peak_ticks` periods, output is scaled so the
    /// draw falls back to the continuous limit; the latch clears when the
    /// unscaled request would stay within the continuous limit on its own.
    fn limit_current(&mut self, demand: f64) -> f64 {
        let limit = self.config.current_limit;
        let drawn = match self.driver.bus_current() {
            Ok(amps) => amps,
            Err(err) => {
                // Blind to the actual draw: never allow more output than the
                // last applied tick, so a latched clamp cannot release.
                log::warn!("bus current read failed, holding last output: {err}");
                let cap = abs(self.last_output);
                return demand.clamp(-cap, cap);
            }
        };

        if drawn >= limit.peak_amps {
            self.over_peak_ticks = self.over_peak_ticks.saturating_add(1);
            if self.over_peak_ticks >= limit.peak_ticks && !self.current_limited {
                self.current_limited = true;
                log::warn!(
                    "current limiting engaged: {drawn:.1}A after {} ticks over peak",
                    self.over_peak_ticks
                );
            }
        } else if drawn <= limit.continuous_amps {
            self.over_peak_ticks = 0;
        }

        if !self.current_limited {
            return demand;
        }

        // Estimate draw per unit output from the last applied tick.
        let applied = abs(self.last_output);
        if applied < 1e-6 || drawn <= 0.0 {
            self.current_limited = false;
            self.over_peak_ticks = 0;
            return demand;
        }
        let amps_per_output = drawn / applied;
        if abs(demand) * amps_per_output <= limit.continuous_amps {
            self.current_limited = false;
            self.over_peak_ticks = 0;
            return demand;
        }
        let cap = limit.continuous_amps / amps_per_output;
        demand.clamp(-cap, cap)
    }

    fn apply(&mut self, demand: f64) -> Result {
        self.driver.set_output(demand)?;
        self.last_output = demand;
        Ok(())
    }
}

#[derive(Debug, Snafu)]
pub enum PresetError {
    /// A named setpoint falls outside the configured travel range.
    #[snafu(display("preset {name} at {counts} counts is outside the soft-limit range"))]
    OutOfRange { name: &'static str, counts: i64 },
}

/// Named setpoints for a subsystem, validated against the travel range when
/// the table is built rather than clamped silently at request time.
#[derive(Debug, Clone)]
pub struct PresetTable<K: Eq + Hash + Copy> {
    entries: HashMap<K, i64>,
}

impl<K: Eq + Hash + Copy> PresetTable<K> {
    pub fn new<I>(presets: I, limits: &SoftLimits) -> core::result::Result<Self, PresetError>
    where
        I: IntoIterator<Item = (K, &'static str, i64)>,
    {
        let mut entries = HashMap::new();
        for (key, name, counts) in presets {
            if !limits.contains(counts) {
                return Err(PresetError::OutOfRange { name, counts });
            }
            entries.insert(key, counts);
        }
        Ok(Self { entries })
    }

    pub fn counts(&self, key: K) -> Option<i64> {
        self.entries.get(&key).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::mock::{ActuatorState, MockActuator};
    use approx::assert_relative_eq;
    use proptest::prelude::*;
    use std::rc::Rc;

    const DT: f64 = 0.02;

    fn position_config() -> ControllerConfig {
        ControllerConfig::new(PidGains::new(0.0, 0.001, 0.0, 0.0))
            .with_soft_limits(SoftLimits::new(0, -30_000))
    }

    #[test]
    fn soft_limits_clamp_position_requests() {
        let state = Rc::new(ActuatorState::default());
        let mut controller =
            ClosedLoopController::new(MockActuator::new(&state), position_config()).unwrap();

        state.set_position(-450);
        controller.drive_to_position(-40_000);
        controller.tick(DT).unwrap();

        // Reverse soft limit at -30000: the effective setpoint is -30000 and
        // the loop drives downward, not toward -40000.
        let expected: f64 = (-30_000.0 - -450.0) * 0.001;
        assert_relative_eq!(state.last_output(), expected.clamp(-1.0, 1.0));
    }

    #[test]
    fn forward_request_past_soft_limit_clamps_to_zero() {
        let state = Rc::new(ActuatorState::default());
        let mut controller =
            ClosedLoopController::new(MockActuator::new(&state), position_config()).unwrap();

        state.set_position(-100);
        controller.drive_to_position(5_000);
        controller.tick(DT).unwrap();

        let expected = (0.0 - -100.0) * 0.001;
        assert_relative_eq!(state.last_output(), expected);
    }

    #[test]
    fn open_loop_power_is_clamped_to_unit_range() {
        let state = Rc::new(ActuatorState::default());
        let mut controller = ClosedLoopController::new(
            MockActuator::new(&state),
            ControllerConfig::new(PidGains::default()),
        )
        .unwrap();

        controller.drive_at_power(3.5);
        controller.tick(DT).unwrap();
        assert_relative_eq!(state.last_output(), 1.0);

        controller.drive_at_power(-2.0);
        controller.tick(DT).unwrap();
        assert_relative_eq!(state.last_output(), -1.0);
    }

    #[test]
    fn limit_switch_blocks_further_travel() {
        let state = Rc::new(ActuatorState::default());
        let mut controller = ClosedLoopController::new(
            MockActuator::new(&state),
            ControllerConfig::new(PidGains::default()),
        )
        .unwrap();

        state.set_forward_limit(true);
        controller.drive_at_power(0.8);
        controller.tick(DT).unwrap();
        assert_relative_eq!(state.last_output(), 0.0);

        // Backing away from the switch is still allowed.
        controller.drive_at_power(-0.4);
        controller.tick(DT).unwrap();
        assert_relative_eq!(state.last_output(), -0.4);
    }

    #[test]
    fn setpoint_past_asserted_limit_holds_current_position() {
        let state = Rc::new(ActuatorState::default());
        let mut controller =
            ClosedLoopController::new(MockActuator::new(&state), position_config()).unwrap();

        state.set_position(-1_000);
        state.set_reverse_limit(true);
        controller.drive_to_position(-20_000);
        controller.tick(DT).unwrap();

        // Setpoint collapsed to the current position: zero error, zero drive.
        assert_relative_eq!(state.last_output(), 0.0);
    }

    #[test]
    fn sustained_over_peak_demand_is_forced_to_continuous_limit() {
        let state = Rc::new(ActuatorState::default());
        state.set_amps_per_output(30.0); // full output stalls at 30 A
        let config = ControllerConfig::new(PidGains::default())
            .with_current_limit(CurrentLimit::new(19.0, 25.0, 5));
        let mut controller = ClosedLoopController::new(MockActuator::new(&state), config).unwrap();

        controller.drive_at_power(1.0);
        for _ in 0..20 {
            controller.tick(DT).unwrap();
        }

        // Output scaled so the modeled draw sits at the continuous limit.
        assert_relative_eq!(state.last_output() * 30.0, 19.0, epsilon = 1e-9);

        // A request that fits within the continuous limit clears the latch.
        controller.drive_at_power(0.5);
        controller.tick(DT).unwrap();
        assert_relative_eq!(state.last_output(), 0.5);
    }

    #[test]
    fn failed_current_read_does_not_release_the_limiter() {
        let state = Rc::new(ActuatorState::default());
        state.set_amps_per_output(30.0);
        let config = ControllerConfig::new(PidGains::default())
            .with_current_limit(CurrentLimit::new(19.0, 25.0, 5));
        let mut controller = ClosedLoopController::new(MockActuator::new(&state), config).unwrap();

        controller.drive_at_power(1.0);
        for _ in 0..20 {
            controller.tick(DT).unwrap();
        }
        assert_relative_eq!(state.last_output() * 30.0, 19.0, epsilon = 1e-9);

        // With the current sense dark, the full-power request must stay
        // clamped at the last applied output, not jump back to 1.0.
        state.fail_current_reads(true);
        for _ in 0..5 {
            controller.tick(DT).unwrap();
        }
        assert_relative_eq!(state.last_output() * 30.0, 19.0, epsilon = 1e-9);
    }

    #[test]
    fn failed_encoder_read_holds_last_output() {
        let state = Rc::new(ActuatorState::default());
        let mut controller = ClosedLoopController::new(
            MockActuator::new(&state),
            ControllerConfig::new(PidGains::default()),
        )
        .unwrap();

        controller.drive_at_power(0.6);
        controller.tick(DT).unwrap();
        assert_relative_eq!(state.last_output(), 0.6);

        state.fail_position_reads(true);
        controller.drive_at_power(0.0);
        controller.tick(DT).unwrap();

        // Not zero, not a crash: the last commanded output is held.
        assert_relative_eq!(state.last_output(), 0.6);
    }

    #[test]
    fn zero_resets_the_position_reference() {
        let state = Rc::new(ActuatorState::default());
        let mut controller =
            ClosedLoopController::new(MockActuator::new(&state), position_config()).unwrap();

        state.set_position(-4_200);
        controller.tick(DT).unwrap();
        assert_eq!(controller.position(), -4_200);

        controller.zero().unwrap();
        assert_eq!(controller.position(), 0);
        assert_eq!(state.position(), 0);
    }

    #[test]
    fn preset_table_rejects_out_of_range_entries() {
        let limits = SoftLimits::new(0, -30_000);
        let err = PresetTable::new([(1u8, "HIGH_SCALE", -33_050i64)], &limits).unwrap_err();
        assert!(matches!(err, PresetError::OutOfRange { counts: -33_050, .. }));

        let table = PresetTable::new([(1u8, "SWITCH", -12_000i64)], &limits).unwrap();
        assert_eq!(table.counts(1), Some(-12_000));
        assert_eq!(table.counts(2), None);
    }

    proptest! {
        #[test]
        fn soft_limit_clamp_matches_min_max(counts in -100_000i64..100_000) {
            let limits = SoftLimits::new(0, -30_000);
            prop_assert_eq!(limits.clamp(counts), counts.clamp(-30_000, 0));
        }

        #[test]
        fn disabled_soft_limits_never_alter_requests(counts in any::<i64>()) {
            prop_assert_eq!(SoftLimits::DISABLED.clamp(counts), counts);
        }
    }
}
