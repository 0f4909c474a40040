//! Secure session layer for an RPC transport.
//!
//! This crate turns an unauthenticated message channel into an
//! authenticated, encrypted RPC transport:
//! - Secured channel: per-message authenticated encryption with explicit
//!   key lifecycle and per-direction IV counters
//! - RPC adapter: binds the RPC engine's send/receive contract to the
//!   secured channel and defers traffic until the channel initializes
//! - Two key-establishment handshakes: symmetric key activation and
//!   certificate-authenticated ECDH key agreement
//!
//! The framing transport beneath the channel, the RPC serialization format,
//! and the cryptographic primitive internals are external collaborators,
//! consumed through the traits in [`channel`], [`call`], and the
//! `sesame-crypto` crate.
//!
//! Everything here is single-threaded and event-driven: transport events are
//! pumped in through `on_initialized` / `on_send_granted` /
//! `on_message_received`, and all calls run to completion without blocking.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod adapter;
pub mod call;
pub mod channel;
pub mod error;
pub mod handshake;
pub mod material;
pub mod secured;

pub use adapter::EchoAdapter;
pub use call::{BinaryCallCodec, CallCodec, HandshakeCall};
pub use channel::{ChannelConfig, MessageChannel, MessageWriter};
pub use error::{Error, Result};
pub use handshake::ecdhe::{EcdheHandshake, EcdheIdentity, EcdheState};
pub use handshake::symmetric::{SymmetricHandshake, SymmetricState};
pub use material::KeyMaterial;
pub use secured::SecuredChannel;
