//! Error types for session-layer operations.

use thiserror::Error;

/// Result type alias for session-layer operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Session-layer errors.
///
/// Integrity failures and malformed frames are not errors: they are silently
/// discarded by the secured channel. Misuse (oversized requests, grants
/// without requests, double-staged keys) is a defensive assertion, not a
/// recoverable error.
#[derive(Debug, Error)]
pub enum Error {
    /// Cryptographic error.
    #[error("Crypto error: {0}")]
    Crypto(#[from] sesame_crypto::Error),

    /// Handshake could not make progress.
    #[error("Handshake error: {0}")]
    Handshake(String),
}
