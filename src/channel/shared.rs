//! Exclusive access window between byte delivery and ticks.
//!
//! Transports deliver bytes from their own task while the control loop ticks
//! the same channel. Every access goes through `critical_section::with`, which
//! on hosted targets is a process-wide lock and on bare-metal targets masks
//! interrupts for the duration of the closure.

use std::cell::RefCell;
use std::sync::Arc;

use critical_section::Mutex;

use super::{Channel, ChannelState};

/// A `Channel` shared between a transport and the tick driver.
#[derive(Clone)]
pub struct SharedChannel {
    inner: Arc<Mutex<RefCell<Channel>>>,
}

impl SharedChannel {
    pub fn new(channel: Channel) -> Self {
        Self {
            inner: Arc::new(Mutex::new(RefCell::new(channel))),
        }
    }

    /// Runs `f` with exclusive access to the channel.
    pub fn with<R>(&self, f: impl FnOnce(&mut Channel) -> R) -> R {
        critical_section::with(|cs| f(&mut self.inner.borrow_ref_mut(cs)))
    }

    pub fn push(&self, bytes: &[u8]) {
        self.with(|ch| ch.push(bytes));
    }

    pub fn end_of_burst(&self) {
        self.with(|ch| ch.end_of_burst());
    }

    pub fn state(&self) -> ChannelState {
        self.with(|ch| ch.state())
    }

    pub fn name(&self) -> String {
        self.with(|ch| ch.name().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelConfig;

    #[test]
    fn test_push_from_another_thread() {
        let shared = SharedChannel::new(Channel::new(0, ChannelConfig::sml("s0")));
        let writer = shared.clone();

        let handle = std::thread::spawn(move || {
            for _ in 0..10 {
                writer.push(&[0x1B; 8]);
            }
            writer.end_of_burst();
        });
        handle.join().unwrap();

        assert_eq!(shared.state(), ChannelState::Validating);
        assert_eq!(shared.with(|ch| ch.len()), 80);
    }
}
