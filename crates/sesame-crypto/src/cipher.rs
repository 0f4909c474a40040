//! Streaming authenticated encryption (AES-128-EAX).
//!
//! EAX composes AES-128-CTR with AES-CMAC (OMAC) under a single 16-byte key:
//!
//! - `N = OMAC⁰(iv)` — also the initial CTR counter block
//! - `H = OMAC¹(ε)` — empty associated data
//! - `C = CTR(N, plaintext)`
//! - `tag = N ⊕ OMAC²(C) ⊕ H`
//!
//! The construction supports the incremental start/update/finish contract the
//! secured channel drives: ciphertext is produced by `update`, the 16-byte
//! tag by `finish`. An encrypting context authenticates its output, a
//! decrypting context its input, so both arrive at the same tag for the same
//! frame.
//!
//! The tweak prefix `OMACᵗ(m) = CMAC(0¹⁵ ‖ t ‖ m)` provides the domain
//! separation between the three MAC uses of the key.

use crate::error::{Error, Result};
use crate::traits::{CipherContext, IV_LEN, KEY_LEN, TAG_LEN};
use aes::cipher::generic_array::GenericArray;
use aes::Aes128;
use cmac::{Cmac, Mac};
use ctr::cipher::{KeyIvInit, StreamCipher};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

type Aes128Ctr = ctr::Ctr128BE<Aes128>;

/// OMAC tweak for the nonce.
const TWEAK_NONCE: u8 = 0;
/// OMAC tweak for the (empty) header.
const TWEAK_HEADER: u8 = 1;
/// OMAC tweak for the ciphertext.
const TWEAK_DATA: u8 = 2;

fn tweak_block(tweak: u8) -> [u8; 16] {
    let mut block = [0u8; 16];
    block[15] = tweak;
    block
}

fn omac(key: &[u8; KEY_LEN], tweak: u8, data: &[u8]) -> [u8; TAG_LEN] {
    let mut mac = Cmac::<Aes128>::new(GenericArray::from_slice(key));
    mac.update(&tweak_block(tweak));
    mac.update(data);
    mac.finalize().into_bytes().into()
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Direction {
    Encrypt,
    Decrypt,
}

/// Per-message state, live between `start` and `finish`.
struct MessageState {
    nonce_mac: [u8; TAG_LEN],
    keystream: Aes128Ctr,
    data_mac: Cmac<Aes128>,
}

struct EaxCore {
    key: Zeroizing<[u8; KEY_LEN]>,
    direction: Direction,
    state: Option<MessageState>,
}

impl EaxCore {
    fn new(key: &[u8; KEY_LEN], direction: Direction) -> Self {
        Self {
            key: Zeroizing::new(*key),
            direction,
            state: None,
        }
    }

    fn set_key(&mut self, key: &[u8; KEY_LEN]) {
        self.key = Zeroizing::new(*key);
        self.state = None;
    }

    fn start(&mut self, iv: &[u8; IV_LEN]) {
        let nonce_mac = omac(&self.key, TWEAK_NONCE, iv);
        let keystream = Aes128Ctr::new(
            GenericArray::from_slice(self.key.as_ref()),
            GenericArray::from_slice(&nonce_mac),
        );
        let mut data_mac = Cmac::<Aes128>::new(GenericArray::from_slice(self.key.as_ref()));
        data_mac.update(&tweak_block(TWEAK_DATA));
        self.state = Some(MessageState {
            nonce_mac,
            keystream,
            data_mac,
        });
    }

    fn update(&mut self, input: &[u8], output: &mut Vec<u8>) {
        let state = self
            .state
            .as_mut()
            .expect("cipher update() before start()");
        let mut buf = input.to_vec();
        match self.direction {
            Direction::Encrypt => {
                state.keystream.apply_keystream(&mut buf);
                state.data_mac.update(&buf);
            }
            Direction::Decrypt => {
                state.data_mac.update(input);
                state.keystream.apply_keystream(&mut buf);
            }
        }
        output.extend_from_slice(&buf);
    }

    fn finish(&mut self) -> [u8; TAG_LEN] {
        let state = self
            .state
            .take()
            .expect("cipher finish() before start()");
        let data_tag: [u8; TAG_LEN] = state.data_mac.finalize().into_bytes().into();
        let header_tag = omac(&self.key, TWEAK_HEADER, &[]);
        let mut tag = [0u8; TAG_LEN];
        for (i, byte) in tag.iter_mut().enumerate() {
            *byte = state.nonce_mac[i] ^ data_tag[i] ^ header_tag[i];
        }
        tag
    }
}

/// Encrypting AES-128-EAX context. Authenticates the ciphertext it produces.
pub struct EaxEncryptor(EaxCore);

impl EaxEncryptor {
    /// Create a context keyed for encryption.
    pub fn new(key: &[u8; KEY_LEN]) -> Self {
        Self(EaxCore::new(key, Direction::Encrypt))
    }
}

impl CipherContext for EaxEncryptor {
    fn set_key(&mut self, key: &[u8; KEY_LEN]) {
        self.0.set_key(key);
    }

    fn start(&mut self, iv: &[u8; IV_LEN]) {
        self.0.start(iv);
    }

    fn update(&mut self, input: &[u8], output: &mut Vec<u8>) {
        self.0.update(input, output);
    }

    fn finish(&mut self) -> [u8; TAG_LEN] {
        self.0.finish()
    }
}

/// Decrypting AES-128-EAX context. Authenticates the ciphertext it consumes.
pub struct EaxDecryptor(EaxCore);

impl EaxDecryptor {
    /// Create a context keyed for decryption.
    pub fn new(key: &[u8; KEY_LEN]) -> Self {
        Self(EaxCore::new(key, Direction::Decrypt))
    }
}

impl CipherContext for EaxDecryptor {
    fn set_key(&mut self, key: &[u8; KEY_LEN]) {
        self.0.set_key(key);
    }

    fn start(&mut self, iv: &[u8; IV_LEN]) {
        self.0.start(iv);
    }

    fn update(&mut self, input: &[u8], output: &mut Vec<u8>) {
        self.0.update(input, output);
    }

    fn finish(&mut self) -> [u8; TAG_LEN] {
        self.0.finish()
    }
}

/// One-shot encryption: returns `ciphertext || tag`.
pub fn seal(key: &[u8; KEY_LEN], iv: &[u8; IV_LEN], plaintext: &[u8]) -> Vec<u8> {
    let mut ctx = EaxEncryptor::new(key);
    let mut frame = Vec::with_capacity(plaintext.len() + TAG_LEN);
    ctx.start(iv);
    ctx.update(plaintext, &mut frame);
    let tag = ctx.finish();
    frame.extend_from_slice(&tag);
    frame
}

/// One-shot decryption of a `ciphertext || tag` frame.
///
/// The tag comparison is constant-time.
///
/// # Errors
///
/// Returns `Error::Decryption` if the frame is shorter than one tag or the
/// tag does not verify.
pub fn open(
    key: &[u8; KEY_LEN],
    iv: &[u8; IV_LEN],
    frame: &[u8],
) -> Result<Zeroizing<Vec<u8>>> {
    if frame.len() < TAG_LEN {
        return Err(Error::Decryption("frame shorter than one tag".into()));
    }
    let (ciphertext, received_tag) = frame.split_at(frame.len() - TAG_LEN);

    let mut ctx = EaxDecryptor::new(key);
    let mut plaintext = Vec::with_capacity(ciphertext.len());
    ctx.start(iv);
    ctx.update(ciphertext, &mut plaintext);
    let expected_tag = ctx.finish();

    if expected_tag.ct_eq(received_tag).into() {
        Ok(Zeroizing::new(plaintext))
    } else {
        Err(Error::Decryption("authentication tag mismatch".into()))
    }
}
