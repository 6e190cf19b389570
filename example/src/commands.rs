//! Named commands for the example robot. Momentary actions (intake, eject,
//! climb) are built inline from closures at binding time instead.

use std::cell::RefCell;
use std::fmt::Debug;
use std::rc::Rc;

use robot_command::command::Command;
use robot_command::hardware::{ActuatorDriver, OperatorInput};
use robot_command::{Result, SubsystemRef};

use crate::subsystems::{Drivetrain, Elevator, ElevatorPreset};

const DRIVE_TOLERANCE: i64 = 50;
const ELEVATOR_TOLERANCE: i64 = 100;

/// Tank drive from the operator sticks. Never finishes; runs as the
/// drivetrain's default command in teleop.
pub struct DriveWithJoystick<D: ActuatorDriver + Debug + 'static> {
    drivetrain: Rc<RefCell<Drivetrain<D>>>,
    input: Rc<dyn OperatorInput>,
    requirements: Vec<SubsystemRef>,
}

impl<D: ActuatorDriver + Debug + 'static> DriveWithJoystick<D> {
    pub fn new(drivetrain: Rc<RefCell<Drivetrain<D>>>, input: Rc<dyn OperatorInput>) -> Self {
        let requirements = vec![SubsystemRef(drivetrain.clone())];
        Self {
            drivetrain,
            input,
            requirements,
        }
    }
}

impl<D: ActuatorDriver + Debug + 'static> Command for DriveWithJoystick<D> {
    fn requirements(&self) -> &[SubsystemRef] {
        &self.requirements
    }

    fn execute(&mut self) -> Result {
        let left = self.input.axis(1);
        let right = self.input.axis(3);
        self.drivetrain.borrow_mut().power_drive(left, right);
        Ok(())
    }

    fn end(&mut self, _interrupted: bool) -> Result {
        self.drivetrain.borrow_mut().power_drive(0.0, 0.0);
        Ok(())
    }

    fn name(&self) -> &str {
        "drive with joystick"
    }
}

/// Closed-loop drive of both sides to a count target, relative to where the
/// robot sits when the command starts. Finishes inside the tolerance band.
pub struct DriveToPosition<D: ActuatorDriver + Debug + 'static> {
    drivetrain: Rc<RefCell<Drivetrain<D>>>,
    target: i64,
    requirements: Vec<SubsystemRef>,
}

impl<D: ActuatorDriver + Debug + 'static> DriveToPosition<D> {
    pub fn new(drivetrain: Rc<RefCell<Drivetrain<D>>>, target: i64) -> Self {
        let requirements = vec![SubsystemRef(drivetrain.clone())];
        Self {
            drivetrain,
            target,
            requirements,
        }
    }
}

impl<D: ActuatorDriver + Debug + 'static> Command for DriveToPosition<D> {
    fn requirements(&self) -> &[SubsystemRef] {
        &self.requirements
    }

    fn initialize(&mut self) -> Result {
        let mut drivetrain = self.drivetrain.borrow_mut();
        drivetrain.zero_encoders()?;
        drivetrain.drive_to_position(self.target);
        Ok(())
    }

    fn is_finished(&self) -> Result<bool> {
        let drivetrain = self.drivetrain.borrow();
        Ok((drivetrain.left_position() - self.target).abs() <= DRIVE_TOLERANCE
            && (drivetrain.right_position() - self.target).abs() <= DRIVE_TOLERANCE)
    }

    fn end(&mut self, _interrupted: bool) -> Result {
        self.drivetrain.borrow_mut().power_drive(0.0, 0.0);
        Ok(())
    }

    fn name(&self) -> &str {
        "drive to position"
    }
}

/// Move the elevator to a named height and finish once it settles there.
pub struct ElevatorToPreset<D: ActuatorDriver + Debug + 'static> {
    elevator: Rc<RefCell<Elevator<D>>>,
    preset: ElevatorPreset,
    requirements: Vec<SubsystemRef>,
}

impl<D: ActuatorDriver + Debug + 'static> ElevatorToPreset<D> {
    pub fn new(elevator: Rc<RefCell<Elevator<D>>>, preset: ElevatorPreset) -> Self {
        let requirements = vec![SubsystemRef(elevator.clone())];
        Self {
            elevator,
            preset,
            requirements,
        }
    }
}

impl<D: ActuatorDriver + Debug + 'static> Command for ElevatorToPreset<D> {
    fn requirements(&self) -> &[SubsystemRef] {
        &self.requirements
    }

    fn initialize(&mut self) -> Result {
        self.elevator.borrow_mut().drive_to_preset(self.preset);
        Ok(())
    }

    fn is_finished(&self) -> Result<bool> {
        let elevator = self.elevator.borrow();
        let Some(target) = elevator.preset_counts(self.preset) else {
            return Ok(true);
        };
        Ok((elevator.position() - target).abs() <= ELEVATOR_TOLERANCE)
    }

    fn name(&self) -> &str {
        "elevator to preset"
    }
}

/// Hold the carriage wherever it sits. Never finishes; runs as the
/// elevator's default command so the load cannot back-drive between moves.
pub struct ElevatorHold<D: ActuatorDriver + Debug + 'static> {
    elevator: Rc<RefCell<Elevator<D>>>,
    requirements: Vec<SubsystemRef>,
}

impl<D: ActuatorDriver + Debug + 'static> ElevatorHold<D> {
    pub fn new(elevator: Rc<RefCell<Elevator<D>>>) -> Self {
        let requirements = vec![SubsystemRef(elevator.clone())];
        Self {
            elevator,
            requirements,
        }
    }
}

impl<D: ActuatorDriver + Debug + 'static> Command for ElevatorHold<D> {
    fn requirements(&self) -> &[SubsystemRef] {
        &self.requirements
    }

    fn initialize(&mut self) -> Result {
        let mut elevator = self.elevator.borrow_mut();
        let here = elevator.position();
        elevator.drive_to_position(here);
        Ok(())
    }

    fn name(&self) -> &str {
        "elevator hold"
    }
}
