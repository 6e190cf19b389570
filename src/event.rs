use alloc::boxed::Box;
use alloc::vec::Vec;

/// Polled list of input bindings. The scheduler polls its loop once per run,
/// before any command executes, so commands never observe half-applied
/// trigger actions.
#[derive(Default)]
pub struct EventLoop {
    events: Vec<Box<dyn FnMut()>>,
}

impl EventLoop {
    /// Add an event to run when the loop is polled.
    pub fn bind(&mut self, action: impl FnMut() + 'static) {
        self.events.push(Box::new(action));
    }

    pub fn poll(&mut self) {
        for event in self.events.iter_mut() {
            event();
        }
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}
