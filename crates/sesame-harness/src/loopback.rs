//! In-memory message channel with explicit request/grant flow control.
//!
//! The loopback channel records what the stack above asks for; the test pump
//! decides when each request is granted and where the produced frame goes.
//! This reproduces the transport contract deterministically, with no I/O and
//! no timing.

use sesame_core::channel::{MessageChannel, MessageWriter};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

struct EndpointState {
    requests: VecDeque<usize>,
    capacity: usize,
    resets: u32,
}

/// Transport endpoint handed to a [`sesame_core::SecuredChannel`].
pub struct LoopbackChannel {
    state: Rc<RefCell<EndpointState>>,
}

/// Test-side handle observing (and granting) one endpoint's requests.
pub struct LoopbackHandle {
    state: Rc<RefCell<EndpointState>>,
}

impl LoopbackChannel {
    /// Create an endpoint with the given advertised capacity, plus the
    /// handle the test uses to drive it.
    pub fn new(capacity: usize) -> (Self, LoopbackHandle) {
        let state = Rc::new(RefCell::new(EndpointState {
            requests: VecDeque::new(),
            capacity,
            resets: 0,
        }));
        (
            Self {
                state: Rc::clone(&state),
            },
            LoopbackHandle { state },
        )
    }
}

impl MessageChannel for LoopbackChannel {
    fn request_send_message(&mut self, size: usize) {
        assert!(size <= self.state.borrow().capacity, "request exceeds capacity");
        self.state.borrow_mut().requests.push_back(size);
    }

    fn max_send_message_size(&self) -> usize {
        self.state.borrow().capacity
    }

    fn reset(&mut self) {
        let mut state = self.state.borrow_mut();
        state.requests.clear();
        state.resets += 1;
    }
}

impl LoopbackHandle {
    /// Pop the oldest ungranted send request, if any.
    pub fn take_request(&self) -> Option<usize> {
        self.state.borrow_mut().requests.pop_front()
    }

    /// Number of ungranted send requests.
    pub fn pending_requests(&self) -> usize {
        self.state.borrow().requests.len()
    }

    /// How many times the endpoint has been reset.
    pub fn reset_count(&self) -> u32 {
        self.state.borrow().resets
    }
}

/// Bounded writer for one granted message slot.
pub struct GrantWriter {
    data: Vec<u8>,
    capacity: usize,
}

impl GrantWriter {
    /// A slot of exactly `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            data: Vec::new(),
            capacity,
        }
    }

    /// The finished frame as it would cross the wire.
    pub fn into_frame(self) -> Vec<u8> {
        self.data
    }
}

impl MessageWriter for GrantWriter {
    fn capacity(&self) -> usize {
        self.capacity - self.data.len()
    }

    fn write(&mut self, bytes: &[u8]) {
        assert!(bytes.len() <= self.capacity(), "write exceeds granted slot");
        self.data.extend_from_slice(bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requests_are_fifo() {
        let (mut channel, handle) = LoopbackChannel::new(256);
        channel.request_send_message(10);
        channel.request_send_message(20);

        assert_eq!(handle.take_request(), Some(10));
        assert_eq!(handle.take_request(), Some(20));
        assert_eq!(handle.take_request(), None);
    }

    #[test]
    fn test_reset_discards_requests() {
        let (mut channel, handle) = LoopbackChannel::new(256);
        channel.request_send_message(10);
        channel.reset();

        assert_eq!(handle.pending_requests(), 0);
        assert_eq!(handle.reset_count(), 1);
    }
}
