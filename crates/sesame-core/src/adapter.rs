//! RPC adapter: binds the RPC engine's stream contract to the secured
//! channel's message contract.
//!
//! The RPC engine above expects to ask for room to send and to be handed
//! plaintext messages; the secured channel below only becomes usable once
//! the transport signals initialization. The adapter bridges the gap by
//! queueing send requests that arrive early and replaying them, in order,
//! when the channel comes up.

use crate::channel::{MessageChannel, MessageWriter};
use crate::secured::SecuredChannel;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use tracing::debug;
use zeroize::Zeroizing;

/// Notified once when the secured channel becomes usable.
pub trait InitializationObserver {
    /// The channel reported `Initialized`; traffic may now flow.
    fn on_channel_initialized(&mut self);
}

/// Shared handle to an initialization observer.
pub type ObserverHandle = Rc<RefCell<dyn InitializationObserver>>;

/// Adapter between a stream-oriented RPC engine and a [`SecuredChannel`].
pub struct EchoAdapter<C: MessageChannel> {
    channel: SecuredChannel<C>,
    initialized: bool,
    /// Send requests deferred until initialization, replayed FIFO.
    deferred: VecDeque<usize>,
    observers: Vec<ObserverHandle>,
}

impl<C: MessageChannel> EchoAdapter<C> {
    /// Wrap a secured channel. The adapter starts uninitialized.
    pub fn new(channel: SecuredChannel<C>) -> Self {
        Self {
            channel,
            initialized: false,
            deferred: VecDeque::new(),
            observers: Vec::new(),
        }
    }

    /// Register an observer for the initialization notification.
    pub fn register_initialization_observer(&mut self, observer: ObserverHandle) {
        self.observers.push(observer);
    }

    /// Whether the channel has signalled initialization.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Request room to send one `size`-byte plaintext message.
    ///
    /// Before initialization the request is queued and replayed once the
    /// channel comes up; afterwards it goes straight down.
    pub fn request_send(&mut self, size: usize) {
        if self.initialized {
            self.channel.request_send_message(size);
        } else {
            debug!(size, "deferring send request until channel initializes");
            self.deferred.push_back(size);
        }
    }

    /// The channel reported `Initialized`: notify observers, then replay
    /// deferred send requests in arrival order.
    pub fn on_initialized(&mut self) {
        self.initialized = true;
        for observer in &self.observers {
            observer.borrow_mut().on_channel_initialized();
        }
        while let Some(size) = self.deferred.pop_front() {
            self.channel.request_send_message(size);
        }
    }

    /// A received transport frame: decrypted plaintext flows up to the RPC
    /// stream processing, forged or malformed frames vanish.
    pub fn on_message_received(&mut self, frame: &[u8]) -> Option<Zeroizing<Vec<u8>>> {
        self.channel.open_received(frame)
    }

    /// Seal one plaintext message into a granted transport slot.
    pub fn seal_send(&mut self, plaintext: &[u8], writer: &mut dyn MessageWriter) {
        self.channel.seal_send(plaintext, writer);
    }

    /// Largest plaintext that fits one secured message.
    pub fn max_call_size(&self) -> usize {
        self.channel.max_send_message_size()
    }

    /// The secured channel, for key installation by a handshake.
    pub fn channel_mut(&mut self) -> &mut SecuredChannel<C> {
        &mut self.channel
    }

    /// Shared read access to the secured channel.
    pub fn channel(&self) -> &SecuredChannel<C> {
        &self.channel
    }

    /// Reset the channel stack. Initialization state is *not* cleared here;
    /// the transport reports `Initialized` again after it comes back up and
    /// the driver forwards that as a fresh `on_initialized`.
    pub fn reset(&mut self) {
        self.channel.reset();
    }
}
