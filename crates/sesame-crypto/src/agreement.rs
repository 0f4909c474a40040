//! Ephemeral key agreement (ECDH over NIST P-256).
//!
//! Public keys are encoded in uncompressed form (0x04 || x || y) per SEC 1.
//! Private keys and shared secrets are wrapped in `Zeroizing` so they are
//! cleared from memory when dropped.

use crate::error::{Error, Result};
use crate::traits::{KeyAgreement, PUBLIC_KEY_LEN, SHARED_SECRET_LEN};
use p256::ecdh::diffie_hellman;
use p256::elliptic_curve::sec1::{FromEncodedPoint, ToEncodedPoint};
use p256::{EncodedPoint, PublicKey, SecretKey};
use zeroize::Zeroizing;

/// P-256 keypair for elliptic-curve Diffie-Hellman key agreement.
///
/// # Example
///
/// ```
/// use sesame_crypto::traits::KeyAgreement;
/// use sesame_crypto::EphemeralKeyPair;
///
/// # fn example() -> Result<(), sesame_crypto::Error> {
/// let alice = EphemeralKeyPair::generate()?;
/// let bob = EphemeralKeyPair::generate()?;
///
/// let alice_shared = alice.shared_secret(bob.public_key())?;
/// let bob_shared = bob.shared_secret(alice.public_key())?;
/// assert_eq!(*alice_shared, *bob_shared);
/// # Ok(())
/// # }
/// ```
pub struct EphemeralKeyPair {
    /// Secret scalar, zeroed on drop.
    secret_key: SecretKey,
    /// Public key in uncompressed form, cached.
    public_key_bytes: [u8; PUBLIC_KEY_LEN],
}

impl EphemeralKeyPair {
    /// Create a keypair from an existing 32-byte private key.
    ///
    /// Useful for tests with known key material.
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

        let secret_key = SecretKey::from_slice(private_key)
            .map_err(|_| Error::InvalidPrivateKey("invalid P-256 private key".into()))?;

        Ok(Self::from_secret(secret_key))
    }

    fn from_secret(secret_key: SecretKey) -> Self {
        let encoded = secret_key.public_key().to_encoded_point(false);
        let mut public_key_bytes = [0u8; PUBLIC_KEY_LEN];
        public_key_bytes.copy_from_slice(encoded.as_bytes());

        Self {
            secret_key,
            public_key_bytes,
        }
    }

    fn parse_peer_public(peer_public: &[u8]) -> Result<PublicKey> {
        if peer_public.len() != PUBLIC_KEY_LEN {
            return Err(Error::InvalidLength {
                expected: PUBLIC_KEY_LEN,
                actual: peer_public.len(),
            });
        }

        if peer_public[0] != 0x04 {
            return Err(Error::InvalidPublicKey(
                "P-256 public key must use uncompressed format (0x04 prefix)".into(),
            ));
        }

        let encoded = EncodedPoint::from_bytes(peer_public)
            .map_err(|_| Error::InvalidPublicKey("failed to parse P-256 public key".into()))?;

        PublicKey::from_encoded_point(&encoded)
            .into_option()
            .ok_or_else(|| Error::InvalidPublicKey("point is not on the P-256 curve".into()))
    }
}

impl KeyAgreement for EphemeralKeyPair {
    fn generate() -> Result<Self> {
        let secret_key = SecretKey::random(&mut rand::rngs::OsRng);
        Ok(Self::from_secret(secret_key))
    }

    fn public_key(&self) -> &[u8; PUBLIC_KEY_LEN] {
        &self.public_key_bytes
    }

    fn shared_secret(&self, peer_public: &[u8]) -> Result<Zeroizing<[u8; SHARED_SECRET_LEN]>> {
        let peer_public_key = Self::parse_peer_public(peer_public)?;

        let shared = diffie_hellman(
            self.secret_key.to_nonzero_scalar(),
            peer_public_key.as_affine(),
        );

        // x-coordinate of the resulting point
        let mut result = [0u8; SHARED_SECRET_LEN];
        result.copy_from_slice(shared.raw_secret_bytes().as_slice());

        Ok(Zeroizing::new(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test key agreement commutativity: Alice->Bob == Bob->Alice
    #[test]
    fn test_commutativity() {
        let alice = EphemeralKeyPair::generate().unwrap();
        let bob = EphemeralKeyPair::generate().unwrap();

        let alice_shared = alice.shared_secret(bob.public_key()).unwrap();
        let bob_shared = bob.shared_secret(alice.public_key()).unwrap();

        assert_eq!(&*alice_shared, &*bob_shared);
    }

    /// Test generated public keys are uncompressed SEC 1 points
    #[test]
    fn test_generate() {
        let keypair = EphemeralKeyPair::generate().unwrap();

        assert_eq!(keypair.public_key().len(), 65);
        assert_eq!(keypair.public_key()[0], 0x04);
    }

    /// Test deterministic public key from a fixed private key
    #[test]
    fn test_deterministic() {
        let private_key = [0x42u8; 32];

        let keypair1 = EphemeralKeyPair::from_private(&private_key).unwrap();
        let keypair2 = EphemeralKeyPair::from_private(&private_key).unwrap();

        assert_eq!(keypair1.public_key(), keypair2.public_key());
    }

    /// Test rejection of a truncated public key
    #[test]
    fn test_reject_short_public_key() {
        let keypair = EphemeralKeyPair::generate().unwrap();
        assert!(keypair.shared_secret(&[0x04u8; 64]).is_err());
    }

    /// Test rejection of a compressed public key
    #[test]
    fn test_reject_compressed_format() {
        let keypair = EphemeralKeyPair::generate().unwrap();
        let mut compressed = [0u8; 65];
        compressed[0] = 0x02;
        assert!(keypair.shared_secret(&compressed).is_err());
    }

    /// Test distinct keypairs produce distinct public keys and secrets
    #[test]
    fn test_unique_keypairs() {
        let a1 = EphemeralKeyPair::generate().unwrap();
        let b1 = EphemeralKeyPair::generate().unwrap();
        let a2 = EphemeralKeyPair::generate().unwrap();
        let b2 = EphemeralKeyPair::generate().unwrap();

        assert_ne!(a1.public_key(), a2.public_key());
        assert_ne!(
            &*a1.shared_secret(b1.public_key()).unwrap(),
            &*a2.shared_secret(b2.public_key()).unwrap()
        );
    }
}
