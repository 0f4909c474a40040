//! Cryptographic primitives for the sesame secure session layer.
//!
//! This crate implements the capability interfaces the session layer is built
//! on:
//! - Key agreement (ECDH over NIST P-256)
//! - Digital signatures (deterministic ECDSA-P256-SHA256, raw r/s halves)
//! - Key derivation (HKDF-SHA256)
//! - Streaming authenticated encryption (AES-128-EAX)
//!
//! Security conventions:
//! - No unsafe code
//! - All secrets and derived material use `Zeroizing` wrappers
//! - Authentication-tag comparison is constant-time via the `subtle` crate
//! - No logging of key material

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod agreement;
pub mod cipher;
pub mod error;
pub mod kdf;
pub mod sign;
pub mod traits;

pub use agreement::EphemeralKeyPair;
pub use cipher::{EaxDecryptor, EaxEncryptor};
pub use error::{Error, Result};
pub use kdf::SessionKeyExpander;
pub use sign::{EcdsaSigner, EcdsaVerifier};
pub use traits::{CipherContext, KeyAgreement, KeyExpander, Signer, Verifier};
