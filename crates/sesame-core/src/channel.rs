//! Message channel abstraction.
//!
//! The secured channel sits on top of a reliable, message-oriented transport
//! with request/grant send flow control: a layer asks for room to send one
//! message of a given size, and the transport later grants it a bounded
//! writer. Incoming messages and the one-time "initialized" notification are
//! pumped into the owning stack by whoever drives the transport.

/// Downward-facing contract of a reliable message channel.
pub trait MessageChannel {
    /// Request room to transmit one message of `size` bytes.
    ///
    /// The transport answers asynchronously by granting a
    /// [`MessageWriter`] of at least `size` bytes to the stack above.
    fn request_send_message(&mut self, size: usize);

    /// The largest message the transport will currently accept.
    fn max_send_message_size(&self) -> usize;

    /// Reset the transport. Pending requests are discarded.
    fn reset(&mut self);
}

/// Write access to one granted outgoing message.
pub trait MessageWriter {
    /// Remaining capacity of this message slot in bytes.
    fn capacity(&self) -> usize;

    /// Append bytes to the outgoing message.
    ///
    /// Writing past the slot's capacity is misuse and asserts.
    fn write(&mut self, bytes: &[u8]);
}

/// Secured-channel configuration.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Local plaintext buffer capacity in bytes; bounds the message size
    /// independent of the transport's advertised capacity.
    pub buffer_capacity: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 1024,
        }
    }
}
