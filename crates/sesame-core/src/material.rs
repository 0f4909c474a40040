//! Symmetric key material and per-direction IV counters.

use sesame_crypto::traits::{IV_LEN, KEY_LEN};
use zeroize::Zeroizing;

/// One direction's key and initialization vector.
///
/// Owned exclusively by the secured channel once installed; handshakes hand
/// material over by value and never retain a copy.
#[derive(Clone)]
pub struct KeyMaterial {
    /// Symmetric key, zeroed on drop.
    pub key: Zeroizing<[u8; KEY_LEN]>,
    /// Initialization vector; its low 8 bytes act as a big-endian counter.
    pub iv: [u8; IV_LEN],
}

impl KeyMaterial {
    /// Create key material from explicit bytes.
    pub fn new(key: [u8; KEY_LEN], iv: [u8; IV_LEN]) -> Self {
        Self {
            key: Zeroizing::new(key),
            iv,
        }
    }

    /// Create key material from byte slices. Panics on wrong lengths; call
    /// sites pass fixed-width fields.
    pub fn from_slices(key: &[u8], iv: &[u8]) -> Self {
        let mut k = [0u8; KEY_LEN];
        let mut v = [0u8; IV_LEN];
        k.copy_from_slice(key);
        v.copy_from_slice(iv);
        Self::new(k, v)
    }

    /// All-zero key material, replaced before traffic flows.
    pub fn zeroed() -> Self {
        Self::new([0u8; KEY_LEN], [0u8; IV_LEN])
    }

    /// Fresh random key material from the system CSPRNG.
    pub fn random() -> Self {
        use rand::RngCore;
        let mut key = [0u8; KEY_LEN];
        let mut iv = [0u8; IV_LEN];
        rand::rngs::OsRng.fill_bytes(&mut key);
        rand::rngs::OsRng.fill_bytes(&mut iv);
        Self::new(key, iv)
    }
}

/// Advance an IV by one message: big-endian increment over the low 8 bytes.
///
/// Both peers stay in lockstep only if each side increments exactly once per
/// successfully completed message in that direction.
pub fn increment_iv(iv: &mut [u8; IV_LEN]) {
    for byte in iv[IV_LEN - 8..].iter_mut().rev() {
        *byte = byte.wrapping_add(1);
        if *byte != 0 {
            break;
        }
    }
}
