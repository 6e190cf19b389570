use alloc::rc::{Rc, Weak};
use core::cell::RefCell;

use crate::event::EventLoop;
use crate::hardware::OperatorInput;
use crate::{CommandRef, CommandScheduler};

/// Binds a boolean condition, usually an operator button, to command
/// scheduling. Bindings live on the scheduler's event loop and are polled at
/// the top of every run, before any command executes.
///
/// The trigger holds the scheduler weakly; a binding that outlives the
/// scheduler simply stops firing.
pub struct Trigger {
    scheduler: Weak<CommandScheduler>,
    event_loop: Rc<RefCell<EventLoop>>,
    condition: Rc<dyn Fn() -> bool>,
}

impl Trigger {
    pub fn new(scheduler: &Rc<CommandScheduler>, condition: impl Fn() -> bool + 'static) -> Self {
        Self {
            scheduler: Rc::downgrade(scheduler),
            event_loop: scheduler.button_loop(),
            condition: Rc::new(condition),
        }
    }

    /// Trigger on a raw operator button.
    pub fn button(
        scheduler: &Rc<CommandScheduler>,
        input: Rc<dyn OperatorInput>,
        button: u8,
    ) -> Self {
        Self::new(scheduler, move || input.button(button))
    }

    /// Schedule the command on the rising edge.
    pub fn on_true(self, command: impl Into<CommandRef>) -> Self {
        let command = command.into();
        let condition = self.condition.clone();
        let scheduler = self.scheduler.clone();
        let mut pressed_last = condition();
        self.event_loop.borrow_mut().bind(move || {
            let pressed = condition();
            if !pressed_last && pressed {
                schedule(&scheduler, &command);
            }
            pressed_last = pressed;
        });
        self
    }

    /// Schedule the command on the falling edge.
    pub fn on_false(self, command: impl Into<CommandRef>) -> Self {
        let command = command.into();
        let condition = self.condition.clone();
        let scheduler = self.scheduler.clone();
        let mut pressed_last = condition();
        self.event_loop.borrow_mut().bind(move || {
            let pressed = condition();
            if pressed_last && !pressed {
                schedule(&scheduler, &command);
            }
            pressed_last = pressed;
        });
        self
    }

    /// Schedule on the rising edge, cancel on the falling edge.
    pub fn while_true(self, command: impl Into<CommandRef>) -> Self {
        let command = command.into();
        let condition = self.condition.clone();
        let scheduler = self.scheduler.clone();
        let mut pressed_last = condition();
        self.event_loop.borrow_mut().bind(move || {
            let pressed = condition();
            if !pressed_last && pressed {
                schedule(&scheduler, &command);
            } else if pressed_last && !pressed {
                cancel(&scheduler, &command);
            }
            pressed_last = pressed;
        });
        self
    }

    /// Flip the command between scheduled and canceled on each rising edge.
    pub fn toggle_on_true(self, command: impl Into<CommandRef>) -> Self {
        let command = command.into();
        let condition = self.condition.clone();
        let scheduler = self.scheduler.clone();
        let mut pressed_last = condition();
        self.event_loop.borrow_mut().bind(move || {
            let pressed = condition();
            if !pressed_last && pressed {
                if let Some(scheduler) = scheduler.upgrade() {
                    if scheduler.is_scheduled(&command) {
                        cancel(&Rc::downgrade(&scheduler), &command);
                    } else {
                        schedule(&Rc::downgrade(&scheduler), &command);
                    }
                }
            }
            pressed_last = pressed;
        });
        self
    }

    pub fn is_active(&self) -> bool {
        (self.condition)()
    }

    pub fn and(&self, other: &Self) -> Self {
        let condition = self.condition.clone();
        let other_condition = other.condition.clone();
        Self {
            scheduler: self.scheduler.clone(),
            event_loop: self.event_loop.clone(),
            condition: Rc::new(move || condition() && other_condition()),
        }
    }

    pub fn or(&self, other: &Self) -> Self {
        let condition = self.condition.clone();
        let other_condition = other.condition.clone();
        Self {
            scheduler: self.scheduler.clone(),
            event_loop: self.event_loop.clone(),
            condition: Rc::new(move || condition() || other_condition()),
        }
    }

    pub fn negate(&self) -> Self {
        let condition = self.condition.clone();
        Self {
            scheduler: self.scheduler.clone(),
            event_loop: self.event_loop.clone(),
            condition: Rc::new(move || !condition()),
        }
    }
}

fn schedule(scheduler: &Weak<CommandScheduler>, command: &CommandRef) {
    if let Some(scheduler) = scheduler.upgrade() {
        if let Err(err) = scheduler.schedule(command.clone()) {
            log::warn!("trigger failed to schedule command: {err}");
        }
    }
}

fn cancel(scheduler: &Weak<CommandScheduler>, command: &CommandRef) {
    if let Some(scheduler) = scheduler.upgrade() {
        if let Err(err) = scheduler.cancel(command.clone()) {
            log::warn!("trigger failed to cancel command: {err}");
        }
    }
}
