//! Certificate-authenticated ECDH key-agreement handshake.
//!
//! Protocol, per peer:
//! 1. On channel initialization, generate an ephemeral key-agreement keypair
//!    and send the long-term certificate (`PresentCertificate`).
//! 2. Once the certificate is out, sign the ephemeral public key with the
//!    long-term key and send `ExchangeKeys(public_key, r, s)`.
//! 3. On the peer's certificate, validate it against the root of trust and
//!    keep a verifier for the peer's exchange signature. Validation failure
//!    is deferred to the exchange step.
//! 4. On the peer's exchange, verify the signature, compute the shared
//!    secret, and expand it into two key/IV pairs — one per direction.
//!
//! Which peer sends under which half of the expanded material is settled
//! without an extra message: the peer whose ephemeral public key sorts first
//! in lexicographic byte order takes the low half for sending, the other
//! takes the high half (see [`send_material_offset`]).
//!
//! The derived receive key installs immediately — the peer switches its send
//! key in lockstep with its own transmission. The derived send key installs
//! immediately only if the local exchange call has already gone out;
//! otherwise it is staged so that the exchange call itself still travels
//! under the old key, and installs before the first non-handshake grant.
//!
//! A failed signature or certificate chain leaves the handshake stalled: the
//! wire stays silent, [`EcdheHandshake::has_failed`] and the optional
//! failure observer carry the local signal, and the supervising layer is
//! expected to reset.

use crate::adapter::EchoAdapter;
use crate::call::{CallCodec, HandshakeCall};
use crate::channel::{MessageChannel, MessageWriter};
use crate::error::Result;
use crate::handshake::{
    CallBuffer, CertificateAuthority, FailureObserver, PendingSendQueue, SenderHandle,
};
use crate::material::KeyMaterial;
use sesame_crypto::traits::{
    KeyAgreement, KeyExpander, Signer, Verifier, IV_LEN, KEY_LEN, PUBLIC_KEY_LEN,
    SESSION_MATERIAL_LEN, SIGNATURE_HALF_LEN, TAG_LEN,
};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use tracing::debug;
use zeroize::Zeroizing;

/// Key-agreement handshake states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EcdheState {
    /// Channel has not signalled initialization yet.
    AwaitingInitialization,
    /// Own certificate is requested or in flight.
    AwaitingCertificateExchange,
    /// Certificate sent; exchanging signed ephemeral keys.
    AwaitingKeyExchange,
    /// Keys derived and installed; ordinary RPC traffic flows.
    SteadyState,
}

/// This node's long-term identity: certificate plus the matching signing key.
pub struct EcdheIdentity {
    /// Certificate blob presented to the peer.
    pub certificate: Vec<u8>,
    /// Signs the ephemeral public key during the exchange.
    pub signer: Box<dyn Signer>,
}

/// Byte offset of the send half within the expanded session material.
///
/// Both peers evaluate this with the arguments swapped and land on opposite
/// halves: the public key that sorts first in lexicographic byte order takes
/// offset 0, the other takes the midpoint.
pub fn send_material_offset(
    own_public: &[u8; PUBLIC_KEY_LEN],
    peer_public: &[u8; PUBLIC_KEY_LEN],
) -> usize {
    if own_public.as_slice() < peer_public.as_slice() {
        0
    } else {
        SESSION_MATERIAL_LEN / 2
    }
}

/// Who receives the next send grant.
enum Grantee {
    Certificate,
    Exchange,
    App(SenderHandle),
}

/// Certificate-authenticated key-agreement session.
pub struct EcdheHandshake<C: MessageChannel, K: KeyAgreement> {
    adapter: EchoAdapter<C>,
    codec: Box<dyn CallCodec>,
    identity: EcdheIdentity,
    authority: Box<dyn CertificateAuthority>,
    expander: Box<dyn KeyExpander>,
    state: EcdheState,
    keypair: Option<K>,
    peer_verifier: Option<Box<dyn Verifier>>,
    /// Explicit flag deciding stage-vs-install for the derived send key.
    own_exchange_sent: bool,
    /// Whether session material has been derived from the peer's exchange.
    derived: bool,
    next_send_key: Option<KeyMaterial>,
    outgoing_certificate: Option<HandshakeCall>,
    outgoing_exchange: Option<HandshakeCall>,
    failed: bool,
    failure_observer: Option<Rc<RefCell<dyn FailureObserver>>>,
    pending: PendingSendQueue,
    grants: VecDeque<Grantee>,
}

impl<C: MessageChannel, K: KeyAgreement> EcdheHandshake<C, K> {
    /// Create the handshake over an adapter. Key agreement starts when the
    /// channel initializes.
    pub fn new(
        adapter: EchoAdapter<C>,
        codec: Box<dyn CallCodec>,
        identity: EcdheIdentity,
        authority: Box<dyn CertificateAuthority>,
        expander: Box<dyn KeyExpander>,
    ) -> Self {
        Self {
            adapter,
            codec,
            identity,
            authority,
            expander,
            state: EcdheState::AwaitingInitialization,
            keypair: None,
            peer_verifier: None,
            own_exchange_sent: false,
            derived: false,
            next_send_key: None,
            outgoing_certificate: None,
            outgoing_exchange: None,
            failed: false,
            failure_observer: None,
            pending: PendingSendQueue::default(),
            grants: VecDeque::new(),
        }
    }

    /// Current handshake state.
    pub fn state(&self) -> EcdheState {
        self.state
    }

    /// Whether the in-progress handshake has failed authentication and will
    /// never complete without a reset.
    pub fn has_failed(&self) -> bool {
        self.failed
    }

    /// Register the observer notified on authentication failure.
    pub fn set_failure_observer(&mut self, observer: Rc<RefCell<dyn FailureObserver>>) {
        self.failure_observer = Some(observer);
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
    pub fn request_send(&mut self, sender: SenderHandle, size: usize) {
        if self.state == EcdheState::SteadyState {
            self.grants.push_back(Grantee::App(sender));
            self.adapter.request_send(size);
        } else {
            self.pending.push(sender, size);
        }
    }

    /// The channel initialized (or re-initialized after a reset): discard
    /// any in-flight handshake state and start a fresh key agreement.
    pub fn on_initialized(&mut self) -> Result<()> {
        self.adapter.on_initialized();

        if self.state != EcdheState::AwaitingInitialization {
            debug!("re-initialization discards in-flight key agreement");
            // Cancel this handshake's own outstanding send requests; parked
            // application senders keep their places.
            self.grants.retain(|g| matches!(g, Grantee::App(_)));
        }
        self.outgoing_certificate = None;
        self.outgoing_exchange = None;
        self.peer_verifier = None;
        self.own_exchange_sent = false;
        self.derived = false;
        self.next_send_key = None;
        self.failed = false;

        self.keypair = Some(K::generate()?);
        self.state = EcdheState::AwaitingCertificateExchange;

        let call = HandshakeCall::PresentCertificate {
            certificate: self.identity.certificate.clone(),
        };
        let size = self.codec.encoded_len(&call);
        self.outgoing_certificate = Some(call);
        self.grants.push_back(Grantee::Certificate);
        self.adapter.request_send(size);
        debug!("requested certificate send");
        Ok(())
    }

    /// The transport granted one send slot.
    pub fn on_send_granted(&mut self, writer: &mut dyn MessageWriter) -> Result<()> {
        match self.grants.pop_front().expect("send grant without request") {
            Grantee::Certificate => {
                let call = self
                    .outgoing_certificate
                    .take()
                    .expect("certificate already sent");
                self.seal_call(&call, writer);
                self.state = EcdheState::AwaitingKeyExchange;
                self.request_exchange_send()?;
            }
            Grantee::Exchange => {
                let call = self
                    .outgoing_exchange
                    .take()
                    .expect("exchange already sent");
                // Still under the old send key; any derived pair is staged.
                self.seal_call(&call, writer);
                self.own_exchange_sent = true;
                debug!("own exchange transmitted");
                self.try_complete();
            }
            Grantee::App(sender) => {
                if let Some(material) = self.next_send_key.take() {
                    debug!("installing derived send key");
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
        Ok(())
    }

    /// A transport frame arrived. Handshake calls are consumed; application
    /// payloads are returned for the RPC engine.
    pub fn on_message_received(&mut self, frame: &[u8]) -> Option<Zeroizing<Vec<u8>>> {
        let plaintext = self.adapter.on_message_received(frame)?;
        match self.codec.decode(&plaintext) {
            Some(HandshakeCall::PresentCertificate { certificate }) => {
                // The call completes unconditionally; a rejected chain only
                // surfaces when the exchange signature cannot be checked.
                self.peer_verifier = self.authority.verify_certificate(&certificate);
                if self.peer_verifier.is_none() {
                    debug!("peer certificate rejected; failure deferred to key exchange");
                }
                None
            }
            Some(HandshakeCall::ExchangeKeys {
                public_key,
                signature_r,
                signature_s,
            }) => {
                self.handle_peer_exchange(&public_key, &signature_r, &signature_s);
                None
            }
            _ => Some(plaintext),
        }
    }

    /// Reset the channel stack beneath the handshake.
    pub fn reset(&mut self) {
        self.adapter.reset();
    }

    fn seal_call(&mut self, call: &HandshakeCall, writer: &mut dyn MessageWriter) {
        let mut plaintext = Vec::with_capacity(self.codec.encoded_len(call));
        self.codec.encode(call, &mut plaintext);
        self.adapter.seal_send(&plaintext, writer);
    }

    fn request_exchange_send(&mut self) -> Result<()> {
        let keypair = self.keypair.as_ref().expect("keypair exists before send");
        let public_key = *keypair.public_key();
        let (signature_r, signature_s) = self.identity.signer.sign(&public_key)?;
        let call = HandshakeCall::ExchangeKeys {
            public_key,
            signature_r,
            signature_s,
        };
        let size = self.codec.encoded_len(&call);
        self.outgoing_exchange = Some(call);
        self.grants.push_back(Grantee::Exchange);
        self.adapter.request_send(size);
        debug!("requested exchange send");
        Ok(())
    }

    fn handle_peer_exchange(
        &mut self,
        public_key: &[u8; PUBLIC_KEY_LEN],
        r: &[u8; SIGNATURE_HALF_LEN],
        s: &[u8; SIGNATURE_HALF_LEN],
    ) {
        let Some(verifier) = self.peer_verifier.as_ref() else {
            self.fail("exchange received without a verified certificate");
            return;
        };
        if !verifier.verify(public_key, r, s) {
            self.fail("peer exchange signature invalid");
            return;
        }
        let Some(keypair) = self.keypair.as_ref() else {
            self.fail("exchange received before initialization");
            return;
        };
        let shared = match keypair.shared_secret(public_key) {
            Ok(shared) => shared,
            Err(_) => {
                self.fail("peer public key rejected by key agreement");
                return;
            }
        };

        let mut material = Zeroizing::new([0u8; SESSION_MATERIAL_LEN]);
        if self
            .expander
            .expand(shared.as_ref(), material.as_mut())
            .is_err()
        {
            self.fail("session material expansion failed");
            return;
        }

        let send_offset = send_material_offset(keypair.public_key(), public_key);
        let recv_offset = SESSION_MATERIAL_LEN / 2 - send_offset;
        let send = half_material(&material, send_offset);
        let recv = half_material(&material, recv_offset);

        // The peer switches its send key in lockstep with its own exchange
        // transmission, so the receive side installs now.
        self.adapter.channel_mut().set_receive_key(recv);
        if self.own_exchange_sent {
            debug!("installing derived send key");
            self.adapter.channel_mut().set_send_key(send);
        } else {
            assert!(
                self.next_send_key.is_none(),
                "staged send key not yet consumed"
            );
            self.next_send_key = Some(send);
        }
        self.derived = true;
        self.try_complete();
    }

    fn try_complete(&mut self) {
        if !(self.derived && self.own_exchange_sent) || self.state == EcdheState::SteadyState {
            return;
        }
        self.state = EcdheState::SteadyState;
        debug!(queued = self.pending.len(), "key agreement complete");
        let drained: Vec<(SenderHandle, usize)> = self.pending.drain().collect();
        for (sender, size) in drained {
            self.grants.push_back(Grantee::App(sender));
            self.adapter.request_send(size);
        }
    }

    fn fail(&mut self, reason: &str) {
        debug!(reason, "key agreement failed; session stalled");
        self.failed = true;
        if let Some(observer) = &self.failure_observer {
            observer.borrow_mut().on_handshake_failed();
        }
    }
}

fn half_material(material: &[u8; SESSION_MATERIAL_LEN], offset: usize) -> KeyMaterial {
    KeyMaterial::from_slices(
        &material[offset..offset + KEY_LEN],
        &material[offset + KEY_LEN..offset + KEY_LEN + IV_LEN],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::BinaryCallCodec;
    use crate::channel::ChannelConfig;
    use crate::secured::SecuredChannel;
    use sesame_crypto::{EaxDecryptor, EaxEncryptor};
    use sesame_crypto::{Error as CryptoError, Result as CryptoResult};

    struct FakeChannel {
        requests: Rc<RefCell<VecDeque<usize>>>,
    }

    impl MessageChannel for FakeChannel {
        fn request_send_message(&mut self, size: usize) {
            self.requests.borrow_mut().push_back(size);
        }

        fn max_send_message_size(&self) -> usize {
            512
        }

        fn reset(&mut self) {}
    }

    struct VecWriter {
        data: Vec<u8>,
        capacity: usize,
    }

    impl VecWriter {
        fn new() -> Self {
            Self {
                data: Vec::new(),
                capacity: 512,
            }
        }
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

    /// Key agreement stub: fixed public key, fixed shared secret.
    struct FakeAgreement {
        public: [u8; PUBLIC_KEY_LEN],
    }

    impl KeyAgreement for FakeAgreement {
        fn generate() -> CryptoResult<Self> {
            Ok(Self {
                public: [0x10; PUBLIC_KEY_LEN],
            })
        }

        fn public_key(&self) -> &[u8; PUBLIC_KEY_LEN] {
            &self.public
        }

        fn shared_secret(&self, peer_public: &[u8]) -> CryptoResult<Zeroizing<[u8; 32]>> {
            if peer_public == [0xEE; PUBLIC_KEY_LEN] {
                return Err(CryptoError::InvalidPublicKey("bad point".into()));
            }
            Ok(Zeroizing::new([0x55; 32]))
        }
    }

    struct FakeSigner;
    impl Signer for FakeSigner {
        fn sign(&self, _data: &[u8]) -> CryptoResult<([u8; 32], [u8; 32])> {
            Ok(([0x01; 32], [0x02; 32]))
        }
    }

    struct FakeVerifier {
        accept: bool,
    }
    impl Verifier for FakeVerifier {
        fn verify(&self, _data: &[u8], _r: &[u8; 32], _s: &[u8; 32]) -> bool {
            self.accept
        }
    }

    struct FakeAuthority {
        accept: bool,
        verifier_accepts: bool,
    }
    impl CertificateAuthority for FakeAuthority {
        fn verify_certificate(&self, _certificate: &[u8]) -> Option<Box<dyn Verifier>> {
            self.accept.then(|| {
                Box::new(FakeVerifier {
                    accept: self.verifier_accepts,
                }) as Box<dyn Verifier>
            })
        }
    }

    /// Expander stub: counts up from the seed's first byte.
    struct FakeExpander;
    impl KeyExpander for FakeExpander {
        fn expand(&self, seed: &[u8], out: &mut [u8]) -> CryptoResult<()> {
            for (i, byte) in out.iter_mut().enumerate() {
                *byte = seed[0].wrapping_add(i as u8);
            }
            Ok(())
        }
    }

    struct FailureFlag {
        tripped: Rc<RefCell<bool>>,
    }
    impl FailureObserver for FailureFlag {
        fn on_handshake_failed(&mut self) {
            *self.tripped.borrow_mut() = true;
        }
    }

    fn handshake(
        authority: FakeAuthority,
    ) -> (
        EcdheHandshake<FakeChannel, FakeAgreement>,
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
        let handshake = EcdheHandshake::new(
            EchoAdapter::new(channel),
            Box::new(BinaryCallCodec),
            EcdheIdentity {
                certificate: vec![0xC0; 32],
                signer: Box::new(FakeSigner),
            },
            Box::new(authority),
            Box::new(FakeExpander),
        );
        (handshake, requests)
    }

    fn accepting() -> FakeAuthority {
        FakeAuthority {
            accept: true,
            verifier_accepts: true,
        }
    }

    /// Seal a peer call under the initial zeroed key with the given IV.
    fn peer_frame(call: &HandshakeCall, iv: &[u8; 16]) -> Vec<u8> {
        let mut plaintext = Vec::new();
        BinaryCallCodec.encode(call, &mut plaintext);
        sesame_crypto::cipher::seal(&[0u8; 16], iv, &plaintext)
    }

    fn peer_exchange(public_key: [u8; PUBLIC_KEY_LEN]) -> HandshakeCall {
        HandshakeCall::ExchangeKeys {
            public_key,
            signature_r: [0x0A; 32],
            signature_s: [0x0B; 32],
        }
    }

    #[test]
    fn test_tie_break_is_antisymmetric() {
        let low = [0x01u8; PUBLIC_KEY_LEN];
        let high = [0x02u8; PUBLIC_KEY_LEN];

        assert_eq!(send_material_offset(&low, &high), 0);
        assert_eq!(send_material_offset(&high, &low), SESSION_MATERIAL_LEN / 2);

        // A difference in the last byte alone still decides it.
        let mut almost = low;
        almost[PUBLIC_KEY_LEN - 1] = 0x02;
        assert_eq!(send_material_offset(&low, &almost), 0);
        assert_eq!(send_material_offset(&almost, &low), SESSION_MATERIAL_LEN / 2);
    }

    #[test]
    fn test_certificate_then_exchange_sends() {
        let (mut hs, requests) = handshake(accepting());
        hs.on_initialized().unwrap();
        assert_eq!(hs.state(), EcdheState::AwaitingCertificateExchange);
        // Certificate: 1 + 2 + 32 plaintext plus one tag.
        assert_eq!(requests.borrow_mut().pop_front(), Some(35 + TAG_LEN));

        let mut writer = VecWriter::new();
        hs.on_send_granted(&mut writer).unwrap();
        assert_eq!(hs.state(), EcdheState::AwaitingKeyExchange);
        // Exchange: 1 + 65 + 64 plaintext plus one tag.
        assert_eq!(requests.borrow_mut().pop_front(), Some(130 + TAG_LEN));
    }

    #[test]
    fn test_completes_when_peer_exchange_arrives_first() {
        let (mut hs, _requests) = handshake(accepting());
        hs.on_initialized().unwrap();

        // Peer certificate, then peer exchange, both before our own sends.
        let mut iv = [0u8; 16];
        let frame = peer_frame(
            &HandshakeCall::PresentCertificate {
                certificate: vec![0xC1; 32],
            },
            &iv,
        );
        assert!(hs.on_message_received(&frame).is_none());
        iv[15] = 1;
        let frame = peer_frame(&peer_exchange([0x20; PUBLIC_KEY_LEN]), &iv);
        assert!(hs.on_message_received(&frame).is_none());

        // Derived but not complete: our exchange is still queued.
        assert_eq!(hs.state(), EcdheState::AwaitingCertificateExchange);

        // The receive key installed immediately; our send key is staged, so
        // the channel still sends under the old key.
        assert_ne!(*hs.adapter().channel().receive_material().key, [0u8; 16]);
        assert_eq!(*hs.adapter().channel().send_material().key, [0u8; 16]);

        let mut writer = VecWriter::new();
        hs.on_send_granted(&mut writer).unwrap(); // certificate
        let mut writer = VecWriter::new();
        hs.on_send_granted(&mut writer).unwrap(); // exchange
        assert_eq!(hs.state(), EcdheState::SteadyState);

        // Fake keys: own 0x10.., peer 0x20.. -> we sort first, send offset 0.
        // FakeExpander material counts up from the shared secret's 0x55.
        assert_eq!(hs.adapter().channel().receive_material().key[0], 0x75);

        // The staged send key installs with the first application grant.
        struct Quiet;
        impl crate::handshake::ServiceSender for Quiet {
            fn on_send_granted(&mut self, call: &mut CallBuffer) {
                call.write(&[0x7F]);
            }
        }
        hs.request_send(Rc::new(RefCell::new(Quiet)), 1);
        let mut writer = VecWriter::new();
        hs.on_send_granted(&mut writer).unwrap();
        assert_eq!(hs.adapter().channel().send_material().key[0], 0x55);
    }

    #[test]
    fn test_installs_send_key_directly_when_own_exchange_already_sent() {
        let (mut hs, _requests) = handshake(accepting());
        hs.on_initialized().unwrap();

        let mut writer = VecWriter::new();
        hs.on_send_granted(&mut writer).unwrap(); // certificate
        let mut writer = VecWriter::new();
        hs.on_send_granted(&mut writer).unwrap(); // exchange
        assert_eq!(hs.state(), EcdheState::AwaitingKeyExchange);

        let mut iv = [0u8; 16];
        let frame = peer_frame(
            &HandshakeCall::PresentCertificate {
                certificate: vec![0xC1; 32],
            },
            &iv,
        );
        assert!(hs.on_message_received(&frame).is_none());
        iv[15] = 1;
        let frame = peer_frame(&peer_exchange([0x20; PUBLIC_KEY_LEN]), &iv);
        assert!(hs.on_message_received(&frame).is_none());

        assert_eq!(hs.state(), EcdheState::SteadyState);
        // Send key installed without staging.
        assert_eq!(hs.adapter().channel().send_material().key[0], 0x55);
    }

    #[test]
    fn test_exchange_without_certificate_stalls_and_reports() {
        let (mut hs, _requests) = handshake(accepting());
        hs.on_initialized().unwrap();

        let tripped = Rc::new(RefCell::new(false));
        hs.set_failure_observer(Rc::new(RefCell::new(FailureFlag {
            tripped: Rc::clone(&tripped),
        })));

        let frame = peer_frame(&peer_exchange([0x20; PUBLIC_KEY_LEN]), &[0u8; 16]);
        assert!(hs.on_message_received(&frame).is_none());

        assert!(hs.has_failed());
        assert!(*tripped.borrow());
        assert_ne!(hs.state(), EcdheState::SteadyState);
    }

    #[test]
    fn test_rejected_certificate_defers_failure_to_exchange() {
        let (mut hs, _requests) = handshake(FakeAuthority {
            accept: false,
            verifier_accepts: false,
        });
        hs.on_initialized().unwrap();

        let frame = peer_frame(
            &HandshakeCall::PresentCertificate {
                certificate: vec![0xC1; 32],
            },
            &[0u8; 16],
        );
        assert!(hs.on_message_received(&frame).is_none());
        // Certificate call completes without failing the handshake.
        assert!(!hs.has_failed());

        let mut iv = [0u8; 16];
        iv[15] = 1;
        let frame = peer_frame(&peer_exchange([0x20; PUBLIC_KEY_LEN]), &iv);
        assert!(hs.on_message_received(&frame).is_none());
        assert!(hs.has_failed());
    }

    #[test]
    fn test_bad_signature_stalls() {
        let (mut hs, _requests) = handshake(FakeAuthority {
            accept: true,
            verifier_accepts: false,
        });
        hs.on_initialized().unwrap();

        let mut iv = [0u8; 16];
        let frame = peer_frame(
            &HandshakeCall::PresentCertificate {
                certificate: vec![0xC1; 32],
            },
            &iv,
        );
        assert!(hs.on_message_received(&frame).is_none());
        iv[15] = 1;
        let frame = peer_frame(&peer_exchange([0x20; PUBLIC_KEY_LEN]), &iv);
        assert!(hs.on_message_received(&frame).is_none());

        assert!(hs.has_failed());
        assert_ne!(hs.state(), EcdheState::SteadyState);
    }

    #[test]
    fn test_reinitialization_restarts_cleanly() {
        let (mut hs, requests) = handshake(accepting());
        hs.on_initialized().unwrap();
        requests.borrow_mut().clear();

        // Mid-handshake reset: the transport re-initializes.
        hs.on_initialized().unwrap();
        assert_eq!(hs.state(), EcdheState::AwaitingCertificateExchange);
        assert!(!hs.has_failed());

        // Exactly one fresh certificate request outstanding.
        assert_eq!(requests.borrow().len(), 1);
    }
}
