//! Seams to the hardware the control core drives but does not own: motor
//! controllers, the dashboard, operator input and the clock.
//!
//! Real robots implement these against their vendor stack; tests and the
//! example robot use the [`mock`] backend.

use core::time::Duration;

use snafu::Snafu;

use crate::control::ControllerConfig;

pub mod mock;

#[derive(Debug, Snafu)]
pub enum DriverError {
    /// The controller rejected or never acknowledged a configuration write.
    #[snafu(display("configuration write failed: {reason}"))]
    ConfigRejected { reason: &'static str },
    /// A sensor read came back invalid or timed out.
    #[snafu(display("stale or invalid {sensor} reading"))]
    StaleReading { sensor: &'static str },
    /// The device stopped responding on the bus.
    #[snafu(display("device not responding"))]
    Offline,
}

/// One motor controller with an attached encoder and limit switches.
///
/// All calls are non-blocking register accesses; nothing here may sleep or
/// wait on I/O, since every method runs inside the control period.
pub trait ActuatorDriver {
    /// Push the construction-time configuration down to the device.
    fn configure(&mut self, config: &ControllerConfig) -> Result<(), DriverError>;

    /// Command an open-loop output in [-1.0, 1.0].
    fn set_output(&mut self, percent: f64) -> Result<(), DriverError>;

    /// Encoder position in counts, relative to the last [`set_position`].
    ///
    /// [`set_position`]: ActuatorDriver::set_position
    fn position(&self) -> Result<i64, DriverError>;

    /// Overwrite the encoder's position reference.
    fn set_position(&mut self, counts: i64) -> Result<(), DriverError>;

    /// Present bus current draw in amps.
    fn bus_current(&self) -> Result<f64, DriverError>;

    fn forward_limit(&self) -> Result<bool, DriverError>;
    fn reverse_limit(&self) -> Result<bool, DriverError>;

    fn set_brake_mode(&mut self, brake: bool) -> Result<(), DriverError>;
}

/// Dashboard values a subsystem publishes once per tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TelemetryValue<'a> {
    Number(f64),
    Counts(i64),
    Flag(bool),
    Text(&'a str),
}

impl From<f64> for TelemetryValue<'_> {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i64> for TelemetryValue<'_> {
    fn from(value: i64) -> Self {
        Self::Counts(value)
    }
}

impl From<bool> for TelemetryValue<'_> {
    fn from(value: bool) -> Self {
        Self::Flag(value)
    }
}

impl<'a> From<&'a str> for TelemetryValue<'a> {
    fn from(value: &'a str) -> Self {
        Self::Text(value)
    }
}

/// One-way publish surface. Implementations must swallow their own failures;
/// telemetry is never allowed to affect control-loop correctness.
pub trait TelemetrySink {
    fn publish(&mut self, key: &str, value: TelemetryValue<'_>);
}

/// Sink that drops everything.
#[derive(Debug, Default)]
pub struct NullTelemetry;

impl TelemetrySink for NullTelemetry {
    fn publish(&mut self, _key: &str, _value: TelemetryValue<'_>) {}
}

/// Raw operator device state, polled read-only by commands during `execute`.
pub trait OperatorInput {
    /// Joystick axis in [-1.0, 1.0].
    fn axis(&self, axis: u8) -> f64;
    fn button(&self, button: u8) -> bool;
}

/// Monotonic time source for the tick watchdog.
pub trait Clock {
    fn now(&self) -> Duration;
}

impl<C: Clock> Clock for alloc::rc::Rc<C> {
    fn now(&self) -> Duration {
        (**self).now()
    }
}
