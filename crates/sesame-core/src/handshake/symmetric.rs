//! Symmetric key-activation handshake.
//!
//! As soon as the channel initializes, this node generates one fresh random
//! key/IV pair and sends it to the peer in an `ActivateKeyMaterial` call.
//! The peer installs the pair as its receive key; this node stages the same
//! pair as its next send key. The staged pair must not encrypt the
//! activation call itself — the peer can only decrypt it under the old key —
//! so it is installed immediately before the first non-handshake send grant
//! instead.
//!
//! Every other sender that asks to transmit while activation is in flight is
//! parked FIFO and drained when the own activation call completes.

use crate::adapter::EchoAdapter;
use crate::call::{CallCodec, HandshakeCall};
use crate::channel::{MessageChannel, MessageWriter};
use crate::handshake::{CallBuffer, PendingSendQueue, SenderHandle};
use crate::material::KeyMaterial;
use sesame_crypto::traits::TAG_LEN;
use std::collections::VecDeque;
use tracing::debug;
use zeroize::Zeroizing;

/// Symmetric handshake states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymmetricState {
    /// Channel has not signalled initialization yet.
    AwaitingInitialization,
    /// Own activation call is requested or in flight.
    Activating,
    /// Activation complete; ordinary RPC traffic flows.
    SteadyState,
}

/// Who receives the next send grant.
enum Grantee {
    Activation,
    App(SenderHandle),
}

/// Pre-shared-key session that rotates to fresh key material on startup.
pub struct SymmetricHandshake<C: MessageChannel> {
    adapter: EchoAdapter<C>,
    codec: Box<dyn CallCodec>,
    state: SymmetricState,
    /// Staged send key, installed before the first non-handshake grant.
    next_send_key: Option<KeyMaterial>,
    /// Own activation call awaiting its grant.
    activation: Option<HandshakeCall>,
    pending: PendingSendQueue,
    grants: VecDeque<Grantee>,
}

impl<C: MessageChannel> SymmetricHandshake<C> {
    /// Create the handshake over an adapter. Activation starts when the
    /// channel initializes.
    pub fn new(adapter: EchoAdapter<C>, codec: Box<dyn CallCodec>) -> Self {
        Self {
            adapter,
            codec,
            state: SymmetricState::AwaitingInitialization,
            next_send_key: None,
            activation: None,
            pending: PendingSendQueue::default(),
            grants: VecDeque::new(),
        }
    }

    /// Current handshake state.
    pub fn state(&self) -> SymmetricState {
        self.state
    }

    /// The adapter beneath this handshake.
    pub fn adapter(&self) -> &EchoAdapter<C> {
        &self.adapter
    }

    /// Mutable access to the adapter beneath this handshake.
    pub fn adapter_mut(&mut self) -> &mut EchoAdapter<C> {
        &mut self.adapter
    }

    /// A service proxy asks to transmit one `size`-byte call.
    ///
    /// Granted in FIFO order once the handshake has completed; parked until
    /// then.
    pub fn request_send(&mut self, sender: SenderHandle, size: usize) {
        if self.state == SymmetricState::SteadyState {
            self.grants.push_back(Grantee::App(sender));
            self.adapter.request_send(size);
        } else {
            self.pending.push(sender, size);
        }
    }

    /// The channel initialized (or re-initialized after a reset): begin
    /// activating fresh key material.
    pub fn on_initialized(&mut self) {
        self.adapter.on_initialized();

        if self.state != SymmetricState::AwaitingInitialization {
            debug!("re-initialization discards in-flight activation");
            self.grants.retain(|g| matches!(g, Grantee::App(_)));
            self.activation = None;
            self.next_send_key = None;
        }

        let material = KeyMaterial::random();
        let call = HandshakeCall::ActivateKeyMaterial {
            key: *material.key,
            iv: material.iv,
        };
        assert!(
            self.next_send_key.is_none(),
            "staged send key not yet consumed"
        );
        self.next_send_key = Some(material);

        let size = self.codec.encoded_len(&call);
        self.activation = Some(call);
        self.state = SymmetricState::Activating;
        self.grants.push_back(Grantee::Activation);
        self.adapter.request_send(size);
        debug!("requested activation send");
    }

    /// The transport granted one send slot.
    pub fn on_send_granted(&mut self, writer: &mut dyn MessageWriter) {
        match self.grants.pop_front().expect("send grant without request") {
            Grantee::Activation => {
                let call = self.activation.take().expect("activation already sent");
                let mut plaintext = Vec::with_capacity(self.codec.encoded_len(&call));
                self.codec.encode(&call, &mut plaintext);
                // Still under the old send key; the staged pair installs on
                // the next non-handshake grant.
                self.adapter.seal_send(&plaintext, writer);
                self.complete_activation();
            }
            Grantee::App(sender) => {
                if let Some(material) = self.next_send_key.take() {
                    debug!("installing activated send key");
                    self.adapter.channel_mut().set_send_key(material);
                }
                let capacity = self
                    .adapter
                    .max_call_size()
                    .min(writer.capacity().saturating_sub(TAG_LEN));
                let mut buffer = CallBuffer::new(capacity);
                sender.borrow_mut().on_send_granted(&mut buffer);
                self.adapter.seal_send(buffer.as_slice(), writer);
            }
        }
    }

    /// A transport frame arrived. Handshake calls are consumed; application
    /// payloads are returned for the RPC engine.
    pub fn on_message_received(&mut self, frame: &[u8]) -> Option<Zeroizing<Vec<u8>>> {
        let plaintext = self.adapter.on_message_received(frame)?;
        match self.codec.decode(&plaintext) {
            Some(HandshakeCall::ActivateKeyMaterial { key, iv }) => {
                debug!("peer activated new receive key");
                self.adapter
                    .channel_mut()
                    .set_receive_key(KeyMaterial::new(key, iv));
                None
            }
            _ => Some(plaintext),
        }
    }

    /// Reset the channel stack beneath the handshake.
    pub fn reset(&mut self) {
        self.adapter.reset();
    }

    fn complete_activation(&mut self) {
        self.state = SymmetricState::SteadyState;
        debug!(queued = self.pending.len(), "activation complete");
        let drained: Vec<(SenderHandle, usize)> = self.pending.drain().collect();
        for (sender, size) in drained {
            self.grants.push_back(Grantee::App(sender));
            self.adapter.request_send(size);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::BinaryCallCodec;
    use crate::channel::ChannelConfig;
    use crate::handshake::ServiceSender;
    use crate::secured::SecuredChannel;
    use sesame_crypto::{EaxDecryptor, EaxEncryptor};
    use std::cell::RefCell;
    use std::rc::Rc;

    struct FakeChannel {
        requests: Rc<RefCell<VecDeque<usize>>>,
    }

    impl MessageChannel for FakeChannel {
        fn request_send_message(&mut self, size: usize) {
            self.requests.borrow_mut().push_back(size);
        }

        fn max_send_message_size(&self) -> usize {
            256
        }

        fn reset(&mut self) {}
    }

    struct VecWriter {
        data: Vec<u8>,
        capacity: usize,
    }

    impl MessageWriter for VecWriter {
        fn capacity(&self) -> usize {
            self.capacity - self.data.len()
        }

        fn write(&mut self, bytes: &[u8]) {
            assert!(bytes.len() <= self.capacity());
            self.data.extend_from_slice(bytes);
        }
    }

    struct TaggedSender {
        tag: u8,
        log: Rc<RefCell<Vec<u8>>>,
    }

    impl ServiceSender for TaggedSender {
        fn on_send_granted(&mut self, call: &mut CallBuffer) {
            self.log.borrow_mut().push(self.tag);
            call.write(&[0x7F, self.tag]);
        }
    }

    fn handshake() -> (
        SymmetricHandshake<FakeChannel>,
        Rc<RefCell<VecDeque<usize>>>,
    ) {
        let requests = Rc::new(RefCell::new(VecDeque::new()));
        let material = KeyMaterial::zeroed();
        let channel = SecuredChannel::new(
            FakeChannel {
                requests: Rc::clone(&requests),
            },
            Box::new(EaxEncryptor::new(&material.key)),
            Box::new(EaxDecryptor::new(&material.key)),
            material.clone(),
            material,
            ChannelConfig::default(),
        );
        (
            SymmetricHandshake::new(EchoAdapter::new(channel), Box::new(BinaryCallCodec)),
            requests,
        )
    }

    #[test]
    fn test_initialization_requests_activation_send() {
        let (mut hs, requests) = handshake();
        assert_eq!(hs.state(), SymmetricState::AwaitingInitialization);

        hs.on_initialized();
        assert_eq!(hs.state(), SymmetricState::Activating);
        // 33-byte activation call plus one tag.
        assert_eq!(requests.borrow_mut().pop_front(), Some(33 + TAG_LEN));
    }

    #[test]
    fn test_senders_queue_until_activation_completes() {
        let (mut hs, requests) = handshake();
        hs.on_initialized();
        requests.borrow_mut().clear();

        let log = Rc::new(RefCell::new(Vec::new()));
        for tag in 1..=3u8 {
            let sender: SenderHandle = Rc::new(RefCell::new(TaggedSender {
                tag,
                log: Rc::clone(&log),
            }));
            hs.request_send(sender, 2);
        }
        assert!(requests.borrow().is_empty(), "queued while activating");

        // Grant the activation call; the queue drains in order.
        let mut writer = VecWriter {
            data: Vec::new(),
            capacity: 256,
        };
        hs.on_send_granted(&mut writer);
        assert_eq!(hs.state(), SymmetricState::SteadyState);
        assert_eq!(requests.borrow().len(), 3);

        for _ in 0..3 {
            let mut writer = VecWriter {
                data: Vec::new(),
                capacity: 256,
            };
            hs.on_send_granted(&mut writer);
        }
        assert_eq!(*log.borrow(), vec![1, 2, 3]);
    }

    #[test]
    fn test_activation_encrypted_under_old_key() {
        let (mut hs, _requests) = handshake();
        hs.on_initialized();

        let mut writer = VecWriter {
            data: Vec::new(),
            capacity: 256,
        };
        hs.on_send_granted(&mut writer);

        // A decryptor still keyed with the original (zeroed) material must
        // accept the activation frame.
        let old = KeyMaterial::zeroed();
        let opened = sesame_crypto::cipher::open(&old.key, &old.iv, &writer.data).unwrap();
        let call = BinaryCallCodec.decode(&opened).unwrap();
        assert!(matches!(call, HandshakeCall::ActivateKeyMaterial { .. }));
    }

    #[test]
    fn test_staged_key_installs_before_first_app_grant() {
        let (mut hs, _requests) = handshake();
        hs.on_initialized();

        // Activation grant first (old key still active afterwards).
        let mut writer = VecWriter {
            data: Vec::new(),
            capacity: 256,
        };
        hs.on_send_granted(&mut writer);
        assert_eq!(*hs.adapter().channel().send_material().key, [0u8; 16]);

        // First application grant installs the staged pair.
        let log = Rc::new(RefCell::new(Vec::new()));
        let sender: SenderHandle = Rc::new(RefCell::new(TaggedSender {
            tag: 9,
            log: Rc::clone(&log),
        }));
        hs.request_send(sender, 2);
        let mut writer = VecWriter {
            data: Vec::new(),
            capacity: 256,
        };
        hs.on_send_granted(&mut writer);
        assert_ne!(*hs.adapter().channel().send_material().key, [0u8; 16]);
    }

    #[test]
    fn test_peer_activation_installs_receive_key() {
        let (mut hs, _requests) = handshake();
        hs.on_initialized();

        // Build the peer's activation frame under the shared initial key.
        let call = HandshakeCall::ActivateKeyMaterial {
            key: [0x5Au8; 16],
            iv: [0xA5u8; 16],
        };
        let mut plaintext = Vec::new();
        BinaryCallCodec.encode(&call, &mut plaintext);
        let old = KeyMaterial::zeroed();
        let frame = sesame_crypto::cipher::seal(&old.key, &old.iv, &plaintext);

        assert!(hs.on_message_received(&frame).is_none(), "consumed");
        assert_eq!(
            *hs.adapter().channel().receive_material().key,
            [0x5Au8; 16]
        );
        assert_eq!(hs.adapter().channel().receive_material().iv, [0xA5u8; 16]);
    }
}
