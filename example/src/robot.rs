//! Wires the subsystems, default commands and operator bindings together and
//! maps the mode host's callbacks onto the scheduler.

use std::cell::RefCell;
use std::fmt::Debug;
use std::rc::Rc;

use robot_command::command::button::Trigger;
use robot_command::hardware::{ActuatorDriver, OperatorInput};
use robot_command::robot::ScheduledRobot;
use robot_command::subsystem::SubsystemRefExt;
use robot_command::{CommandRef, CommandScheduler, Result};

use crate::commands::{DriveToPosition, DriveWithJoystick, ElevatorHold, ElevatorToPreset};
use crate::subsystems::{Climber, Drivetrain, Elevator, ElevatorPreset, Grabber, SharedSink};

/// Encoder counts to cross the auto line from the starting wall.
const AUTO_LINE_COUNTS: i64 = 3_000;

/// Motors handed to [`Robot::new`], one driver per controller.
pub struct Motors<D> {
    pub drive_left: D,
    pub drive_right: D,
    pub elevator: D,
    pub grabber_left: D,
    pub grabber_right: D,
    pub winch: D,
}

pub struct Robot<D: ActuatorDriver + Debug + 'static> {
    scheduler: Rc<CommandScheduler>,
    drivetrain: Rc<RefCell<Drivetrain<D>>>,
    elevator: Rc<RefCell<Elevator<D>>>,
    auto: CommandRef,
}

impl<D: ActuatorDriver + Debug + 'static> Robot<D> {
    pub fn new(
        motors: Motors<D>,
        input: Rc<dyn OperatorInput>,
        telemetry: SharedSink,
    ) -> Result<Self> {
        let scheduler = Rc::new(CommandScheduler::new());

        let drivetrain = scheduler.register(Drivetrain::new(
            motors.drive_left,
            motors.drive_right,
            telemetry.clone(),
        )?);
        let elevator = scheduler.register(Elevator::new(motors.elevator, telemetry.clone())?);
        let grabber = scheduler.register(Grabber::new(
            motors.grabber_left,
            motors.grabber_right,
            telemetry.clone(),
        )?);
        let climber = scheduler.register(Climber::new(motors.winch, telemetry)?);

        // Both defaults require their own subsystem by construction.
        if let Err(err) = scheduler.set_default_command(
            &drivetrain,
            DriveWithJoystick::new(drivetrain.clone(), input.clone()),
        ) {
            log::error!("drivetrain default rejected: {err}");
        }
        if let Err(err) = scheduler.set_default_command(&elevator, ElevatorHold::new(elevator.clone()))
        {
            log::error!("elevator default rejected: {err}");
        }

        // Operator bindings. Momentary actions hold power while the button is
        // down; preset moves fire once per press.
        {
            let g = grabber.clone();
            let stop = grabber.clone();
            Trigger::button(&scheduler, input.clone(), 1).while_true(
                grabber
                    .start_end(
                        move || {
                            g.borrow_mut().intake();
                            Ok(())
                        },
                        move || {
                            stop.borrow_mut().stop();
                            Ok(())
                        },
                    )
                    .with_name("intake cube"),
            );
        }
        {
            let g = grabber.clone();
            let stop = grabber.clone();
            Trigger::button(&scheduler, input.clone(), 2).while_true(
                grabber
                    .start_end(
                        move || {
                            g.borrow_mut().eject();
                            Ok(())
                        },
                        move || {
                            stop.borrow_mut().stop();
                            Ok(())
                        },
                    )
                    .with_name("eject cube"),
            );
        }

        Trigger::button(&scheduler, input.clone(), 3)
            .on_true(ElevatorToPreset::new(elevator.clone(), ElevatorPreset::Switch));
        Trigger::button(&scheduler, input.clone(), 4).on_true(ElevatorToPreset::new(
            elevator.clone(),
            ElevatorPreset::LowScale,
        ));
        Trigger::button(&scheduler, input.clone(), 5).on_true(ElevatorToPreset::new(
            elevator.clone(),
            ElevatorPreset::HighScale,
        ));
        Trigger::button(&scheduler, input.clone(), 6).on_true(ElevatorToPreset::new(
            elevator.clone(),
            ElevatorPreset::PowerCubePickup,
        ));

        // Climbing takes both bumpers, so a single bumped button cannot start
        // the winch mid-match.
        {
            let c = climber.clone();
            let stop = climber.clone();
            let both = Trigger::button(&scheduler, input.clone(), 7)
                .and(&Trigger::button(&scheduler, input, 8));
            both.while_true(
                climber
                    .start_end(
                        move || {
                            c.borrow_mut().climb();
                            Ok(())
                        },
                        move || {
                            stop.borrow_mut().stop();
                            Ok(())
                        },
                    )
                    .with_name("climb"),
            );
        }

        let auto: CommandRef = DriveToPosition::new(drivetrain.clone(), AUTO_LINE_COUNTS).into();

        Ok(Self {
            scheduler,
            drivetrain,
            elevator,
            auto,
        })
    }

    pub fn scheduler(&self) -> &Rc<CommandScheduler> {
        &self.scheduler
    }

    pub fn elevator_position(&self) -> i64 {
        self.elevator.borrow().position()
    }

    pub fn drive_positions(&self) -> (i64, i64) {
        let drivetrain = self.drivetrain.borrow();
        (drivetrain.left_position(), drivetrain.right_position())
    }
}

impl<D: ActuatorDriver + Debug + 'static> ScheduledRobot for Robot<D> {
    fn periodic(&mut self) -> Result {
        self.scheduler.run()
    }

    fn disabled_init(&mut self) -> Result {
        self.scheduler.set_enabled(false);
        self.drivetrain.borrow_mut().set_brake_mode(false)
    }

    fn autonomous_init(&mut self) -> Result {
        self.scheduler.set_enabled(true);
        self.drivetrain.borrow_mut().set_brake_mode(true)?;
        self.elevator.borrow_mut().zero_encoder()?;
        self.scheduler.schedule(self.auto.clone())?;
        Ok(())
    }

    fn teleop_init(&mut self) -> Result {
        self.scheduler.set_enabled(true);
        self.scheduler.cancel(self.auto.clone())?;
        self.drivetrain.borrow_mut().set_brake_mode(true)
    }
}
