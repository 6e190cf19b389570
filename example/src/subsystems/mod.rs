use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use robot_command::hardware::TelemetrySink;
use robot_command::robot::ITERATION_PERIOD;

pub mod climber;
pub mod drivetrain;
pub mod elevator;
pub mod grabber;

pub use climber::Climber;
pub use drivetrain::Drivetrain;
pub use elevator::{Elevator, ElevatorPreset};
pub use grabber::Grabber;

/// Control period in seconds, fed to every controller tick.
pub const DT: f64 = ITERATION_PERIOD.as_millis() as f64 / 1000.0;

/// Telemetry sink handle shared by all subsystems.
#[derive(Clone)]
pub struct SharedSink(pub Rc<RefCell<dyn TelemetrySink>>);

impl fmt::Debug for SharedSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedSink")
    }
}
