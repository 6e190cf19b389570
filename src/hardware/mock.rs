//! Mock hardware backends for host-side tests and the example robot.

use alloc::rc::Rc;
use alloc::string::String;
use core::cell::{Cell, RefCell};
use core::time::Duration;

use hashbrown::HashMap;

use super::{
    ActuatorDriver, Clock, DriverError, OperatorInput, StaleReadingSnafu, TelemetrySink,
    TelemetryValue,
};
use crate::control::ControllerConfig;

/// Shared state behind a [`MockActuator`]. Tests keep a handle to poke sensor
/// values and observe commanded outputs while the controller owns the driver.
#[derive(Debug, Default)]
pub struct ActuatorState {
    position: Cell<i64>,
    output: Cell<f64>,
    forward_limit: Cell<bool>,
    reverse_limit: Cell<bool>,
    /// Modeled stall draw per unit of output, in amps.
    amps_per_output: Cell<f64>,
    brake: Cell<bool>,
    fail_position: Cell<bool>,
    fail_current: Cell<bool>,
    configured: RefCell<Option<ControllerConfig>>,
}

impl ActuatorState {
    pub fn position(&self) -> i64 {
        self.position.get()
    }

    pub fn set_position(&self, counts: i64) {
        self.position.set(counts);
    }

    pub fn last_output(&self) -> f64 {
        self.output.get()
    }

    pub fn set_forward_limit(&self, asserted: bool) {
        self.forward_limit.set(asserted);
    }

    pub fn set_reverse_limit(&self, asserted: bool) {
        self.reverse_limit.set(asserted);
    }

    pub fn set_amps_per_output(&self, amps: f64) {
        self.amps_per_output.set(amps);
    }

    pub fn fail_position_reads(&self, fail: bool) {
        self.fail_position.set(fail);
    }

    pub fn fail_current_reads(&self, fail: bool) {
        self.fail_current.set(fail);
    }

    pub fn brake_enabled(&self) -> bool {
        self.brake.get()
    }

    pub fn configured(&self) -> Option<ControllerConfig> {
        *self.configured.borrow()
    }
}

/// Motor controller stand-in. Draw is modeled as `|output| * amps_per_output`.
#[derive(Debug)]
pub struct MockActuator {
    state: Rc<ActuatorState>,
}

impl MockActuator {
    pub fn new(state: &Rc<ActuatorState>) -> Self {
        Self {
            state: state.clone(),
        }
    }
}

impl ActuatorDriver for MockActuator {
    fn configure(&mut self, config: &ControllerConfig) -> Result<(), DriverError> {
        *self.state.configured.borrow_mut() = Some(*config);
        Ok(())
    }

    fn set_output(&mut self, percent: f64) -> Result<(), DriverError> {
        self.state.output.set(percent);
        Ok(())
    }

    fn position(&self) -> Result<i64, DriverError> {
        if self.state.fail_position.get() {
            return StaleReadingSnafu { sensor: "encoder" }.fail();
        }
        Ok(self.state.position.get())
    }

    fn set_position(&mut self, counts: i64) -> Result<(), DriverError> {
        self.state.position.set(counts);
        Ok(())
    }

    fn bus_current(&self) -> Result<f64, DriverError> {
        if self.state.fail_current.get() {
            return StaleReadingSnafu {
                sensor: "current sense",
            }
            .fail();
        }
        let output = self.state.output.get();
        let magnitude = if output < 0.0 { -output } else { output };
        Ok(magnitude * self.state.amps_per_output.get())
    }

    fn forward_limit(&self) -> Result<bool, DriverError> {
        Ok(self.state.forward_limit.get())
    }

    fn reverse_limit(&self) -> Result<bool, DriverError> {
        Ok(self.state.reverse_limit.get())
    }

    fn set_brake_mode(&mut self, brake: bool) -> Result<(), DriverError> {
        self.state.brake.set(brake);
        Ok(())
    }
}

/// Telemetry sink that records the latest value per key.
#[derive(Debug, Default)]
pub struct RecordingTelemetry {
    values: HashMap<String, String>,
}

impl RecordingTelemetry {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl TelemetrySink for RecordingTelemetry {
    fn publish(&mut self, key: &str, value: TelemetryValue<'_>) {
        use alloc::string::ToString;
        let rendered = match value {
            TelemetryValue::Number(n) => alloc::format!("{n}"),
            TelemetryValue::Counts(c) => alloc::format!("{c}"),
            TelemetryValue::Flag(f) => alloc::format!("{f}"),
            TelemetryValue::Text(t) => t.to_string(),
        };
        self.values.insert(key.to_string(), rendered);
    }
}

/// Scriptable joystick/button state.
#[derive(Debug, Default)]
pub struct MockOperatorInput {
    axes: RefCell<HashMap<u8, f64>>,
    buttons: RefCell<HashMap<u8, bool>>,
}

impl MockOperatorInput {
    pub fn set_axis(&self, axis: u8, value: f64) {
        self.axes.borrow_mut().insert(axis, value);
    }

    pub fn press(&self, button: u8) {
        self.buttons.borrow_mut().insert(button, true);
    }

    pub fn release(&self, button: u8) {
        self.buttons.borrow_mut().insert(button, false);
    }
}

impl OperatorInput for MockOperatorInput {
    fn axis(&self, axis: u8) -> f64 {
        self.axes.borrow().get(&axis).copied().unwrap_or(0.0)
    }

    fn button(&self, button: u8) -> bool {
        self.buttons.borrow().get(&button).copied().unwrap_or(false)
    }
}

/// Manually advanced clock.
#[derive(Debug, Default)]
pub struct MockClock {
    now: Cell<Duration>,
}

impl MockClock {
    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }
}

impl Clock for MockClock {
    fn now(&self) -> Duration {
        self.now.get()
    }
}
