//! Key derivation (HKDF-SHA256).

use crate::error::{Error, Result};
use crate::traits::KeyExpander;
use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroizing;

/// Info label for session key-material expansion.
const SESSION_MATERIAL_INFO: &[u8] = b"sesame-session-material";

/// Generic HKDF-SHA256 key derivation per RFC 5869.
///
/// # Arguments
/// * `ikm` - Input key material
/// * `salt` - Salt value (empty slice for no salt)
/// * `info` - Context and application-specific information
/// * `output_len` - Length of output key material
///
/// # Returns
/// Derived key material wrapped in `Zeroizing`.
pub fn hkdf_sha256(
    ikm: &[u8],
    salt: &[u8],
    info: &[u8],
    output_len: usize,
) -> Result<Zeroizing<Vec<u8>>> {
    let hk = Hkdf::<Sha256>::new(Some(salt), ikm);

    let mut okm = vec![0u8; output_len];
    hk.expand(info, &mut okm)
        .map_err(|_| Error::KeyDerivation("HKDF expansion failed".into()))?;

    Ok(Zeroizing::new(okm))
}

/// Expands a key-agreement shared secret into directional session material.
///
/// Both peers run the identical expansion over the identical seed, so both
/// arrive at the same output; which half of it each peer uses for which
/// direction is decided above this layer.
#[derive(Debug, Default, Clone, Copy)]
pub struct SessionKeyExpander;

impl KeyExpander for SessionKeyExpander {
    fn expand(&self, seed: &[u8], out: &mut [u8]) -> Result<()> {
        let okm = hkdf_sha256(seed, &[], SESSION_MATERIAL_INFO, out.len())?;
        out.copy_from_slice(&okm);
        Ok(())
    }
}
