//! Host-side demo: the 2018 power-cube robot running against mock hardware.
//!
//! Drives a short match script through the mode controller: a few disabled
//! ticks, an autonomous drive across the line, then teleop with scripted
//! stick and button input. Motor plants are integrated crudely so the
//! closed loops have something to converge against.

mod commands;
mod robot;
mod subsystems;

use std::cell::RefCell;
use std::rc::Rc;

use robot_command::hardware::mock::{
    ActuatorState, MockActuator, MockClock, MockOperatorInput, RecordingTelemetry,
};
use robot_command::robot::{ModeController, OperatingMode};

use robot::{Motors, Robot};
use subsystems::SharedSink;

/// Counts a motor moves per tick at full output in the toy plant.
const PLANT_COUNTS_PER_TICK: f64 = 500.0;

/// Integrate each motor plant one period forward, then run a control tick.
fn step(
    controller: &mut ModeController<Robot<MockActuator>, Rc<MockClock>>,
    plants: &[Rc<ActuatorState>],
    mode: OperatingMode,
) -> robot_command::Result {
    for plant in plants {
        let moved = (plant.last_output() * PLANT_COUNTS_PER_TICK) as i64;
        plant.set_position(plant.position() + moved);
    }
    controller.tick(mode)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let plants: Vec<Rc<ActuatorState>> = (0..6).map(|_| Rc::new(ActuatorState::default())).collect();
    let motors = Motors {
        drive_left: MockActuator::new(&plants[0]),
        drive_right: MockActuator::new(&plants[1]),
        elevator: MockActuator::new(&plants[2]),
        grabber_left: MockActuator::new(&plants[3]),
        grabber_right: MockActuator::new(&plants[4]),
        winch: MockActuator::new(&plants[5]),
    };

    let input = Rc::new(MockOperatorInput::default());
    let telemetry = Rc::new(RefCell::new(RecordingTelemetry::default()));
    let sink = SharedSink(telemetry.clone());

    let robot = Robot::new(motors, input.clone(), sink)?;
    let clock = Rc::new(MockClock::default());
    let mut controller = ModeController::new(robot, clock);

    for _ in 0..5 {
        step(&mut controller, &plants, OperatingMode::Disabled)?;
    }

    for _ in 0..60 {
        step(&mut controller, &plants, OperatingMode::Autonomous)?;
    }
    let (left, right) = controller.robot().drive_positions();
    println!("after auto: drive at ({left}, {right}) counts");

    // Teleop: gentle forward tank drive, elevator to the switch height.
    input.set_axis(1, 0.3);
    input.set_axis(3, 0.3);
    input.press(3);
    for _ in 0..10 {
        step(&mut controller, &plants, OperatingMode::Teleop)?;
    }
    input.release(3);
    for _ in 0..80 {
        step(&mut controller, &plants, OperatingMode::Teleop)?;
    }

    let robot = controller.robot();
    let (left, right) = robot.drive_positions();
    println!("after teleop: drive at ({left}, {right}) counts");
    println!("elevator at {} counts", robot.elevator_position());

    let telemetry = telemetry.borrow();
    for key in ["drive/left_output", "elevator/position", "elevator/output"] {
        if let Some(value) = telemetry.get(key) {
            println!("{key} = {value}");
        }
    }

    Ok(())
}
