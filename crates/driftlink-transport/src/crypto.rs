//! AEAD framing for DATA payloads (spec §6): AES-256-GCM with a 12-byte
//! random IV and 16-byte tag, laid out as `IV ‖ ciphertext ‖ tag`. Used for
//! both the v2 framed payload and the v1 raw-blob compatibility path — only
//! the framing around the ciphertext differs between the two.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::RngCore;

use crate::error::DriftlinkError;

const IV_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// A validated 32-byte pre-shared key, ready to build a cipher from.
#[derive(Clone)]
pub struct SecretKey([u8; 32]);

impl SecretKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        SecretKey(bytes)
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.0))
    }
}

/// Encrypt `plaintext`, returning `IV ‖ ciphertext ‖ tag`.
pub fn encrypt(key: &SecretKey, plaintext: &[u8]) -> Result<Vec<u8>, DriftlinkError> {
    let cipher = key.cipher();
    let mut iv = [0u8; IV_LEN];
    rand::rng().fill_bytes(&mut iv);
    let nonce = Nonce::from_slice(&iv);

    let ciphertext_and_tag = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| DriftlinkError::AuthFailure)?;

    let mut out = Vec::with_capacity(IV_LEN + ciphertext_and_tag.len());
    out.extend_from_slice(&iv);
    out.extend_from_slice(&ciphertext_and_tag);
    Ok(out)
}

/// Decrypt a `IV ‖ ciphertext ‖ tag` blob back to plaintext.
pub fn decrypt(key: &SecretKey, framed: &[u8]) -> Result<Vec<u8>, DriftlinkError> {
    if framed.len() < IV_LEN + TAG_LEN {
        return Err(DriftlinkError::AuthFailure);
    }
    let (iv, ciphertext_and_tag) = framed.split_at(IV_LEN);
    let cipher = key.cipher();
    let nonce = Nonce::from_slice(iv);
    cipher
        .decrypt(nonce, ciphertext_and_tag)
        .map_err(|_| DriftlinkError::AuthFailure)
}
