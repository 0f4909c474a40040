//! Toy root of trust for tests.
//!
//! A certificate is the subject's uncompressed public key followed by the
//! root key's raw ECDSA signature over it: `subject_pk(65) || r(32) || s(32)`.
//! Real deployments plug their own [`CertificateAuthority`] in here; the
//! session layer only ever sees the trait.

use sesame_core::handshake::CertificateAuthority;
use sesame_crypto::traits::{PUBLIC_KEY_LEN, SIGNATURE_HALF_LEN};
use sesame_crypto::{EcdsaSigner, EcdsaVerifier, Signer, Verifier};

/// Total length of a test certificate.
pub const CERTIFICATE_LEN: usize = PUBLIC_KEY_LEN + 2 * SIGNATURE_HALF_LEN;

/// Root of trust holding the root's public key.
pub struct TestAuthority {
    root: EcdsaVerifier,
}

impl TestAuthority {
    /// Trust certificates signed by `root_public` (uncompressed SEC 1).
    pub fn new(root_public: &[u8]) -> sesame_crypto::Result<Self> {
        Ok(Self {
            root: EcdsaVerifier::from_public_key(root_public)?,
        })
    }
}

impl CertificateAuthority for TestAuthority {
    fn verify_certificate(&self, certificate: &[u8]) -> Option<Box<dyn Verifier>> {
        if certificate.len() != CERTIFICATE_LEN {
            return None;
        }
        let (subject, signature) = certificate.split_at(PUBLIC_KEY_LEN);
        let (r, s) = signature.split_at(SIGNATURE_HALF_LEN);

        let mut r_half = [0u8; SIGNATURE_HALF_LEN];
        let mut s_half = [0u8; SIGNATURE_HALF_LEN];
        r_half.copy_from_slice(r);
        s_half.copy_from_slice(s);

        if !self.root.verify(subject, &r_half, &s_half) {
            return None;
        }
        EcdsaVerifier::from_public_key(subject)
            .ok()
            .map(|verifier| Box::new(verifier) as Box<dyn Verifier>)
    }
}

/// Sign `subject_public` with the root key, producing a certificate blob.
pub fn issue_certificate(root: &EcdsaSigner, subject_public: &[u8; PUBLIC_KEY_LEN]) -> Vec<u8> {
    let (r, s) = root
        .sign(subject_public)
        .expect("root signing cannot fail on fixed-width input");
    let mut certificate = Vec::with_capacity(CERTIFICATE_LEN);
    certificate.extend_from_slice(subject_public);
    certificate.extend_from_slice(&r);
    certificate.extend_from_slice(&s);
    certificate
}
