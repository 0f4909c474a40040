//! Secured channel: per-message authenticated encryption over a message
//! channel.
//!
//! Wire framing, bit-exact: `ciphertext(len) || tag(16)`. The final 16 bytes
//! of every received frame are the tag; anything shorter than one tag is
//! discarded as malformed.
//!
//! Each direction carries its own key, IV counter, and cipher context. The
//! IV advances exactly once per successfully completed message in that
//! direction: after the frame is written on send, after the tag verifies on
//! receive. Dropped frames never advance it.

use crate::channel::{ChannelConfig, MessageChannel, MessageWriter};
use crate::material::{increment_iv, KeyMaterial};
use sesame_crypto::traits::{CipherContext, TAG_LEN};
use subtle::ConstantTimeEq;
use tracing::trace;
use zeroize::Zeroizing;

/// Key, IV counter, and cipher context for one traffic direction.
struct DirectionState {
    material: KeyMaterial,
    context: Box<dyn CipherContext>,
}

impl DirectionState {
    fn new(material: KeyMaterial, mut context: Box<dyn CipherContext>) -> Self {
        context.set_key(&material.key);
        Self { material, context }
    }

    fn install(&mut self, material: KeyMaterial) {
        self.context.set_key(&material.key);
        self.material = material;
    }
}

/// Authenticated, encrypted message channel over an unauthenticated one.
///
/// Owns its key material exclusively: handshakes install replacements
/// wholesale via [`SecuredChannel::set_send_key`] /
/// [`SecuredChannel::set_receive_key`], and nothing else may mutate it.
pub struct SecuredChannel<C: MessageChannel> {
    lower: C,
    send: DirectionState,
    recv: DirectionState,
    buffer_capacity: usize,
}

impl<C: MessageChannel> SecuredChannel<C> {
    /// Wrap `lower`, encrypting with `encryptor` and decrypting with
    /// `decryptor` under the given initial key material (pre-shared
    /// configurations pass their loaded pairs; handshake-driven sessions
    /// pass placeholders that a handshake replaces).
    pub fn new(
        lower: C,
        encryptor: Box<dyn CipherContext>,
        decryptor: Box<dyn CipherContext>,
        send: KeyMaterial,
        recv: KeyMaterial,
        config: ChannelConfig,
    ) -> Self {
        Self {
            lower,
            send: DirectionState::new(send, encryptor),
            recv: DirectionState::new(recv, decryptor),
            buffer_capacity: config.buffer_capacity,
        }
    }

    /// Install key material for the send direction.
    ///
    /// Resets the encrypting cipher context; the receive direction is
    /// unaffected. Safe to call at any message boundary.
    pub fn set_send_key(&mut self, material: KeyMaterial) {
        trace!("installing send key material");
        self.send.install(material);
    }

    /// Install key material for the receive direction.
    pub fn set_receive_key(&mut self, material: KeyMaterial) {
        trace!("installing receive key material");
        self.recv.install(material);
    }

    /// Current send-direction material (key and IV counter).
    pub fn send_material(&self) -> &KeyMaterial {
        &self.send.material
    }

    /// Current receive-direction material.
    pub fn receive_material(&self) -> &KeyMaterial {
        &self.recv.material
    }

    /// Encrypt `plaintext` under the current send key/IV and write the
    /// `ciphertext || tag` frame into the granted `writer`, then advance the
    /// send IV.
    pub fn seal_send(&mut self, plaintext: &[u8], writer: &mut dyn MessageWriter) {
        assert!(
            plaintext.len() <= self.max_send_message_size(),
            "plaintext exceeds maximum secured message size"
        );
        assert!(
            writer.capacity() >= plaintext.len() + TAG_LEN,
            "granted slot smaller than requested frame"
        );

        let ctx = &mut self.send.context;
        ctx.start(&self.send.material.iv);
        let mut ciphertext = Vec::with_capacity(plaintext.len());
        ctx.update(plaintext, &mut ciphertext);
        let tag = ctx.finish();

        writer.write(&ciphertext);
        writer.write(&tag);
        increment_iv(&mut self.send.material.iv);
    }

    /// Decrypt and authenticate a received frame.
    ///
    /// Returns the plaintext and advances the receive IV on success. Frames
    /// shorter than one tag and frames whose tag does not verify are
    /// silently discarded with no state change; the MAC is the sole
    /// integrity check at this layer.
    pub fn open_received(&mut self, frame: &[u8]) -> Option<Zeroizing<Vec<u8>>> {
        if frame.len() < TAG_LEN {
            trace!(len = frame.len(), "discarding malformed short frame");
            return None;
        }
        let (ciphertext, received_tag) = frame.split_at(frame.len() - TAG_LEN);

        let ctx = &mut self.recv.context;
        ctx.start(&self.recv.material.iv);
        let mut plaintext = Vec::with_capacity(ciphertext.len());
        ctx.update(ciphertext, &mut plaintext);
        let expected_tag = ctx.finish();

        if !bool::from(expected_tag.ct_eq(received_tag)) {
            trace!(len = frame.len(), "discarding frame with bad tag");
            return None;
        }

        increment_iv(&mut self.recv.material.iv);
        Some(Zeroizing::new(plaintext))
    }

    /// The underlying channel, for transports that expose extra surface.
    pub fn lower(&self) -> &C {
        &self.lower
    }
}

impl<C: MessageChannel> MessageChannel for SecuredChannel<C> {
    /// Request room for `size` plaintext bytes; the transport sees
    /// `size + TAG_LEN`. Requesting more than
    /// [`SecuredChannel::max_send_message_size`] is misuse.
    fn request_send_message(&mut self, size: usize) {
        assert!(
            size <= self.max_send_message_size(),
            "send request exceeds maximum secured message size"
        );
        self.lower.request_send_message(size + TAG_LEN);
    }

    /// Transport capacity bounded by the local buffer, less one tag.
    fn max_send_message_size(&self) -> usize {
        self.lower
            .max_send_message_size()
            .min(self.buffer_capacity)
            .saturating_sub(TAG_LEN)
    }

    /// Forwarded to the underlying channel. Key material is independent of
    /// reset and survives unless explicitly replaced.
    fn reset(&mut self) {
        self.lower.reset();
    }
}
