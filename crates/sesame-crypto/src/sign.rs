//! Digital signatures (deterministic ECDSA over NIST P-256).
//!
//! Signatures travel on the wire as raw 32-byte `r` and `s` halves rather
//! than DER, so the handshake call surface stays fixed-width. Signing uses
//! RFC 6979 deterministic nonces via the `p256` crate.

use crate::error::{Error, Result};
use crate::traits::{Signer, Verifier, PUBLIC_KEY_LEN, SIGNATURE_HALF_LEN};
use p256::ecdsa::signature::{Signer as _, Verifier as _};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::FieldBytes;

/// Long-term ECDSA-P256 signing key.
pub struct EcdsaSigner {
    signing_key: SigningKey,
    /// Public key in uncompressed form, cached.
    public_key_bytes: [u8; PUBLIC_KEY_LEN],
}

impl EcdsaSigner {
    /// Generate a fresh signing key from the system CSPRNG.
    pub fn generate() -> Self {
        Self::from_signing_key(SigningKey::random(&mut rand::rngs::OsRng))
    }

    /// Create a signer from an existing 32-byte private key.
    ///
    /// # Errors
    ///
    /// Returns an error if the scalar is not a valid P-256 private key.
    pub fn from_private(private_key: &[u8]) -> Result<Self> {
        if private_key.len() != 32 {
            return Err(Error::InvalidLength {
                expected: 32,
                actual: private_key.len(),
            });
        }
        let signing_key = SigningKey::from_slice(private_key)
            .map_err(|_| Error::InvalidPrivateKey("invalid P-256 private key".into()))?;
        Ok(Self::from_signing_key(signing_key))
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let verifying_key = VerifyingKey::from(&signing_key);
        let encoded = verifying_key.to_encoded_point(false);
        let mut public_key_bytes = [0u8; PUBLIC_KEY_LEN];
        public_key_bytes.copy_from_slice(encoded.as_bytes());
        Self {
            signing_key,
            public_key_bytes,
        }
    }

    /// The matching public key in uncompressed SEC 1 form.
    pub fn public_key(&self) -> &[u8; PUBLIC_KEY_LEN] {
        &self.public_key_bytes
    }
}

impl Signer for EcdsaSigner {
    fn sign(&self, data: &[u8]) -> Result<([u8; SIGNATURE_HALF_LEN], [u8; SIGNATURE_HALF_LEN])> {
        let signature: Signature = self.signing_key.sign(data);
        let (r, s) = signature.split_bytes();
        Ok((r.into(), s.into()))
    }
}

/// Verifier for signatures made by one specific ECDSA-P256 key.
pub struct EcdsaVerifier {
    verifying_key: VerifyingKey,
}

impl EcdsaVerifier {
    /// Create a verifier from an uncompressed SEC 1 public key.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a valid P-256 point.
    pub fn from_public_key(public_key: &[u8]) -> Result<Self> {
        let verifying_key = VerifyingKey::from_sec1_bytes(public_key)
            .map_err(|_| Error::InvalidPublicKey("invalid P-256 public key".into()))?;
        Ok(Self { verifying_key })
    }
}

impl Verifier for EcdsaVerifier {
    fn verify(
        &self,
        data: &[u8],
        r: &[u8; SIGNATURE_HALF_LEN],
        s: &[u8; SIGNATURE_HALF_LEN],
    ) -> bool {
        let Ok(signature) = Signature::from_scalars(FieldBytes::from(*r), FieldBytes::from(*s))
        else {
            return false;
        };
        self.verifying_key.verify(data, &signature).is_ok()
    }
}
