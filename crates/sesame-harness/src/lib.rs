//! Deterministic in-memory test environment for the sesame session layer.
//!
//! Two protocol stacks are wired back-to-back over [`LoopbackChannel`]s and
//! driven by [`pump_until_idle`], which plays the transport: it grants send
//! requests in order and delivers each produced frame to the peer. Every run
//! is single-threaded and reproducible.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod authority;
pub mod loopback;

pub use authority::{issue_certificate, TestAuthority, CERTIFICATE_LEN};
pub use loopback::{GrantWriter, LoopbackChannel, LoopbackHandle};

use sesame_core::channel::ChannelConfig;
use sesame_core::handshake::CertificateAuthority;
use sesame_core::{
    BinaryCallCodec, EchoAdapter, EcdheHandshake, EcdheIdentity, KeyMaterial, SecuredChannel,
    SymmetricHandshake,
};
use sesame_crypto::traits::KeyAgreement;
use sesame_crypto::{EaxDecryptor, EaxEncryptor, EphemeralKeyPair, SessionKeyExpander};

/// One protocol stack end, as the pump sees it.
pub trait SessionEnd {
    /// The transport granted one send slot.
    fn on_send_granted(&mut self, writer: &mut GrantWriter);

    /// A frame arrived from the peer; application payloads surface.
    fn on_message_received(&mut self, frame: &[u8]) -> Option<Vec<u8>>;
}

impl SessionEnd for SymmetricHandshake<LoopbackChannel> {
    fn on_send_granted(&mut self, writer: &mut GrantWriter) {
        SymmetricHandshake::on_send_granted(self, writer);
    }

    fn on_message_received(&mut self, frame: &[u8]) -> Option<Vec<u8>> {
        SymmetricHandshake::on_message_received(self, frame).map(|payload| payload.to_vec())
    }
}

impl<K: KeyAgreement> SessionEnd for EcdheHandshake<LoopbackChannel, K> {
    fn on_send_granted(&mut self, writer: &mut GrantWriter) {
        EcdheHandshake::on_send_granted(self, writer).expect("handshake send failed");
    }

    fn on_message_received(&mut self, frame: &[u8]) -> Option<Vec<u8>> {
        EcdheHandshake::on_message_received(self, frame).map(|payload| payload.to_vec())
    }
}

/// Build a secured channel over a loopback endpoint with the given
/// pre-shared material.
pub fn secured_channel(
    transport: LoopbackChannel,
    send: KeyMaterial,
    recv: KeyMaterial,
) -> SecuredChannel<LoopbackChannel> {
    SecuredChannel::new(
        transport,
        Box::new(EaxEncryptor::new(&send.key)),
        Box::new(EaxDecryptor::new(&recv.key)),
        send,
        recv,
        ChannelConfig::default(),
    )
}

/// Build a symmetric-handshake session over a fresh loopback endpoint.
pub fn symmetric_session(
    capacity: usize,
    send: KeyMaterial,
    recv: KeyMaterial,
) -> (SymmetricHandshake<LoopbackChannel>, LoopbackHandle) {
    let (transport, handle) = LoopbackChannel::new(capacity);
    let adapter = EchoAdapter::new(secured_channel(transport, send, recv));
    (
        SymmetricHandshake::new(adapter, Box::new(BinaryCallCodec)),
        handle,
    )
}

/// Build a key-agreement session over a fresh loopback endpoint. Key
/// material starts zeroed on both sides; the handshake replaces it.
pub fn ecdhe_session(
    capacity: usize,
    identity: EcdheIdentity,
    authority: Box<dyn CertificateAuthority>,
) -> (
    EcdheHandshake<LoopbackChannel, EphemeralKeyPair>,
    LoopbackHandle,
) {
    let (transport, handle) = LoopbackChannel::new(capacity);
    let adapter = EchoAdapter::new(secured_channel(
        transport,
        KeyMaterial::zeroed(),
        KeyMaterial::zeroed(),
    ));
    (
        EcdheHandshake::new(
            adapter,
            Box::new(BinaryCallCodec),
            identity,
            authority,
            Box::new(SessionKeyExpander),
        ),
        handle,
    )
}

/// Drive both endpoints until neither has an ungranted send request.
///
/// Grants are served in request order; each produced frame is delivered to
/// the peer before the next grant. Returns the application payloads
/// surfaced at each end, in delivery order: `(received_by_a, received_by_b)`.
pub fn pump_until_idle(
    a: &mut dyn SessionEnd,
    a_handle: &LoopbackHandle,
    b: &mut dyn SessionEnd,
    b_handle: &LoopbackHandle,
) -> (Vec<Vec<u8>>, Vec<Vec<u8>>) {
    let mut received_by_a = Vec::new();
    let mut received_by_b = Vec::new();

    loop {
        let mut progressed = false;

        while let Some(size) = a_handle.take_request() {
            progressed = true;
            let mut writer = GrantWriter::new(size);
            a.on_send_granted(&mut writer);
            if let Some(payload) = b.on_message_received(&writer.into_frame()) {
                received_by_b.push(payload);
            }
        }

        while let Some(size) = b_handle.take_request() {
            progressed = true;
            let mut writer = GrantWriter::new(size);
            b.on_send_granted(&mut writer);
            if let Some(payload) = a.on_message_received(&writer.into_frame()) {
                received_by_a.push(payload);
            }
        }

        if !progressed {
            break;
        }
    }

    (received_by_a, received_by_b)
}
