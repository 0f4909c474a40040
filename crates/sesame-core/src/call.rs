//! Handshake call surface and its default wire codec.
//!
//! The handshakes speak three one-way RPC methods over the secured channel.
//! How a method call becomes bytes is the serializer factory's business; the
//! [`CallCodec`] trait is that seam, and [`BinaryCallCodec`] is the default
//! product: one type byte followed by fixed-width fields, with a
//! little-endian `u16` length prefix for the certificate blob. Messages
//! whose leading byte matches no method pass through untouched as
//! application payloads.

use sesame_crypto::traits::{IV_LEN, KEY_LEN, PUBLIC_KEY_LEN, SIGNATURE_HALF_LEN};

/// Type identifier for the key-activation call (0x01).
pub const CALL_ACTIVATE_KEY_MATERIAL: u8 = 0x01;
/// Type identifier for the certificate-presentation call (0x02).
pub const CALL_PRESENT_CERTIFICATE: u8 = 0x02;
/// Type identifier for the signed key-exchange call (0x03).
pub const CALL_EXCHANGE_KEYS: u8 = 0x03;

/// A handshake method call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeCall {
    /// Install fresh key material for the receiving peer's receive
    /// direction (the sender's new send key).
    ActivateKeyMaterial {
        /// Symmetric key.
        key: [u8; KEY_LEN],
        /// Initialization vector.
        iv: [u8; IV_LEN],
    },

    /// Present the sender's long-term certificate.
    PresentCertificate {
        /// Opaque certificate blob, validated by the root of trust.
        certificate: Vec<u8>,
    },

    /// Exchange a signed ephemeral public key.
    ExchangeKeys {
        /// Ephemeral public key, uncompressed SEC 1 point.
        public_key: [u8; PUBLIC_KEY_LEN],
        /// Signature half r over the public key.
        signature_r: [u8; SIGNATURE_HALF_LEN],
        /// Signature half s over the public key.
        signature_s: [u8; SIGNATURE_HALF_LEN],
    },
}

/// Serializer/deserializer for handshake calls.
pub trait CallCodec {
    /// Encoded size of `call` in bytes.
    fn encoded_len(&self, call: &HandshakeCall) -> usize;

    /// Append the encoding of `call` to `out`.
    fn encode(&self, call: &HandshakeCall, out: &mut Vec<u8>);

    /// Decode a received plaintext message.
    ///
    /// Returns `None` when the message is not a (well-formed) handshake
    /// call; such messages belong to the application.
    fn decode(&self, message: &[u8]) -> Option<HandshakeCall>;
}

/// Default length-delimited binary codec.
#[derive(Debug, Default, Clone, Copy)]
pub struct BinaryCallCodec;

impl CallCodec for BinaryCallCodec {
    fn encoded_len(&self, call: &HandshakeCall) -> usize {
        match call {
            HandshakeCall::ActivateKeyMaterial { .. } => 1 + KEY_LEN + IV_LEN,
            HandshakeCall::PresentCertificate { certificate } => 1 + 2 + certificate.len(),
            HandshakeCall::ExchangeKeys { .. } => 1 + PUBLIC_KEY_LEN + 2 * SIGNATURE_HALF_LEN,
        }
    }

    fn encode(&self, call: &HandshakeCall, out: &mut Vec<u8>) {
        match call {
            HandshakeCall::ActivateKeyMaterial { key, iv } => {
                out.push(CALL_ACTIVATE_KEY_MATERIAL);
                out.extend_from_slice(key);
                out.extend_from_slice(iv);
            }
            HandshakeCall::PresentCertificate { certificate } => {
                out.push(CALL_PRESENT_CERTIFICATE);
                let len = u16::try_from(certificate.len())
                    .expect("certificate exceeds u16 length prefix");
                out.extend_from_slice(&len.to_le_bytes());
                out.extend_from_slice(certificate);
            }
            HandshakeCall::ExchangeKeys {
                public_key,
                signature_r,
                signature_s,
            } => {
                out.push(CALL_EXCHANGE_KEYS);
                out.extend_from_slice(public_key);
                out.extend_from_slice(signature_r);
                out.extend_from_slice(signature_s);
            }
        }
    }

    fn decode(&self, message: &[u8]) -> Option<HandshakeCall> {
        let (&kind, body) = message.split_first()?;
        match kind {
            CALL_ACTIVATE_KEY_MATERIAL => {
                if body.len() != KEY_LEN + IV_LEN {
                    return None;
                }
                let mut key = [0u8; KEY_LEN];
                let mut iv = [0u8; IV_LEN];
                key.copy_from_slice(&body[..KEY_LEN]);
                iv.copy_from_slice(&body[KEY_LEN..]);
                Some(HandshakeCall::ActivateKeyMaterial { key, iv })
            }
            CALL_PRESENT_CERTIFICATE => {
                if body.len() < 2 {
                    return None;
                }
                let len = u16::from_le_bytes([body[0], body[1]]) as usize;
                if body.len() != 2 + len {
                    return None;
                }
                Some(HandshakeCall::PresentCertificate {
                    certificate: body[2..].to_vec(),
                })
            }
            CALL_EXCHANGE_KEYS => {
                if body.len() != PUBLIC_KEY_LEN + 2 * SIGNATURE_HALF_LEN {
                    return None;
                }
                let mut public_key = [0u8; PUBLIC_KEY_LEN];
                let mut signature_r = [0u8; SIGNATURE_HALF_LEN];
                let mut signature_s = [0u8; SIGNATURE_HALF_LEN];
                public_key.copy_from_slice(&body[..PUBLIC_KEY_LEN]);
                signature_r.copy_from_slice(
                    &body[PUBLIC_KEY_LEN..PUBLIC_KEY_LEN + SIGNATURE_HALF_LEN],
                );
                signature_s.copy_from_slice(&body[PUBLIC_KEY_LEN + SIGNATURE_HALF_LEN..]);
                Some(HandshakeCall::ExchangeKeys {
                    public_key,
                    signature_r,
                    signature_s,
                })
            }
            _ => None,
        }
    }
}
