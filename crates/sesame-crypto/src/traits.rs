//! Capability interfaces consumed by the session layer.
//!
//! The session layer never touches curve math or cipher internals; it
//! sequences these interfaces. Concrete implementations live in the sibling
//! modules of this crate; tests may substitute their own.

use crate::Result;
use zeroize::Zeroizing;

/// Symmetric key length in bytes.
pub const KEY_LEN: usize = 16;
/// Initialization-vector (nonce) length in bytes.
pub const IV_LEN: usize = 16;
/// Authentication tag length in bytes.
pub const TAG_LEN: usize = 16;
/// Key-agreement public key length: SEC 1 uncompressed point (0x04 || x || y).
pub const PUBLIC_KEY_LEN: usize = 65;
/// Length of each raw signature half (r or s).
pub const SIGNATURE_HALF_LEN: usize = 32;
/// Key-agreement shared secret length in bytes.
pub const SHARED_SECRET_LEN: usize = 32;
/// Expanded session material: two key/IV pairs, one per direction.
pub const SESSION_MATERIAL_LEN: usize = 2 * (KEY_LEN + IV_LEN);

/// An ephemeral key-agreement keypair.
pub trait KeyAgreement: Sized {
    /// Generate a fresh keypair from the system CSPRNG.
    fn generate() -> Result<Self>;

    /// The public key in uncompressed SEC 1 form.
    fn public_key(&self) -> &[u8; PUBLIC_KEY_LEN];

    /// Compute the shared secret with a peer's uncompressed public key.
    fn shared_secret(&self, peer_public: &[u8]) -> Result<Zeroizing<[u8; SHARED_SECRET_LEN]>>;
}

/// Signs data with a long-term identity key.
pub trait Signer {
    /// Sign `data`, returning the raw `(r, s)` signature halves.
    fn sign(&self, data: &[u8]) -> Result<([u8; SIGNATURE_HALF_LEN], [u8; SIGNATURE_HALF_LEN])>;
}

/// Verifies signatures made by one specific identity key.
pub trait Verifier {
    /// Check the raw `(r, s)` signature over `data`.
    fn verify(&self, data: &[u8], r: &[u8; SIGNATURE_HALF_LEN], s: &[u8; SIGNATURE_HALF_LEN])
        -> bool;
}

/// Expands a seed into keying material of the caller's chosen length.
pub trait KeyExpander {
    /// Fill `out` with material derived from `seed`.
    fn expand(&self, seed: &[u8], out: &mut [u8]) -> Result<()>;
}

/// A streaming authenticated cipher context for one traffic direction.
///
/// The context is keyed with [`CipherContext::set_key`], then driven once per
/// message: `start(iv)` → zero or more `update` calls → `finish`, which
/// yields the authentication tag. An encrypting context authenticates its
/// output (the ciphertext); a decrypting context authenticates its input.
/// `start` discards any state left by an unfinished message.
pub trait CipherContext {
    /// Install a key, resetting any in-progress message state.
    fn set_key(&mut self, key: &[u8; KEY_LEN]);

    /// Begin a message under the given IV.
    fn start(&mut self, iv: &[u8; IV_LEN]);

    /// Transform `input`, appending the result to `output`.
    fn update(&mut self, input: &[u8], output: &mut Vec<u8>);

    /// Complete the message and produce its authentication tag.
    fn finish(&mut self) -> [u8; TAG_LEN];
}
