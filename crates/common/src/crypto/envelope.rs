//! Authenticated message envelopes using AES-256-GCM
//!
//! An envelope is the hex encoding of `nonce (12 bytes) || ciphertext || tag (16 bytes)`.
//! A fresh random nonce is drawn for every seal, no associated data is bound.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};

use super::key::ConversationKey;

/// Size of the AES-GCM nonce in bytes
pub const NONCE_SIZE: usize = 12;
/// Size of the AES-GCM authentication tag in bytes
pub const TAG_SIZE: usize = 16;

/// Errors that can occur while sealing or opening an envelope
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("malformed envelope encoding: {0}")]
    Format(#[from] hex::FromHexError),
    #[error("envelope too short: {0} bytes, need at least {NONCE_SIZE}")]
    TooShort(usize),
    #[error("envelope failed authentication")]
    Authentication,
    #[error("plaintext is not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("failed to generate nonce: {0}")]
    Random(getrandom::Error),
    #[error("encrypt error")]
    Seal,
}

fn cipher(key: &ConversationKey) -> Aes256Gcm {
    Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.bytes()))
}

/// Seal `plaintext` under `key`, returning the hex envelope
///
/// # Errors
///
/// Only fails if the system RNG is unavailable.
pub fn seal(plaintext: &[u8], key: &ConversationKey) -> Result<String, EnvelopeError> {
    let mut nonce_bytes = [0u8; NONCE_SIZE];
    getrandom::getrandom(&mut nonce_bytes).map_err(EnvelopeError::Random)?;
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher(key)
        .encrypt(nonce, plaintext)
        .map_err(|_| EnvelopeError::Seal)?;

    let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    out.extend_from_slice(nonce.as_ref());
    out.extend_from_slice(&ciphertext);

    Ok(hex::encode(out))
}

/// Open a hex envelope produced by [`seal`]
///
/// # Errors
///
/// - `Format` if the input is not valid hex (including odd length)
/// - `TooShort` if the decoded bytes cannot hold a nonce
/// - `Authentication` if the tag does not verify: wrong key, tampered data,
///   or an envelope sealed for a different conversation
pub fn open(envelope: &str, key: &ConversationKey) -> Result<Vec<u8>, EnvelopeError> {
    let data = hex::decode(envelope)?;
    if data.len() < NONCE_SIZE {
        return Err(EnvelopeError::TooShort(data.len()));
    }

    let (nonce, ciphertext) = data.split_at(NONCE_SIZE);
    cipher(key)
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| EnvelopeError::Authentication)
}

/// Seal a text message
pub fn seal_text(plaintext: &str, key: &ConversationKey) -> Result<String, EnvelopeError> {
    seal(plaintext.as_bytes(), key)
}

/// Open an envelope that is expected to carry UTF-8 text
pub fn open_text(envelope: &str, key: &ConversationKey) -> Result<String, EnvelopeError> {
    Ok(String::from_utf8(open(envelope, key)?)?)
}
