// Passphrase encryption for disclaimer backups
//
// Layout of an encrypted file: salt (16 bytes) | nonce (12 bytes) | ciphertext.
// The AES-256-GCM key is derived from the passphrase with Argon2.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use argon2::Argon2;
use rand::Rng;
use thiserror::Error;

pub const SALT_SIZE: usize = 16;
pub const NONCE_SIZE: usize = 12;
const KEY_SIZE: usize = 32;

#[derive(Debug, Error)]
pub enum EncryptionError {
    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("Encryption failed")]
    Encrypt,

    /// Wrong passphrase or tampered data
    #[error("Decryption failed")]
    Decrypt,

    #[error("Encrypted data is too short")]
    Truncated,
}

fn derive_key(passphrase: &str, salt: &[u8]) -> Result<[u8; KEY_SIZE], EncryptionError> {
    let mut key = [0u8; KEY_SIZE];
    Argon2::default()
        .hash_password_into(passphrase.as_bytes(), salt, &mut key)
        .map_err(|e| EncryptionError::KeyDerivation(e.to_string()))?;
    Ok(key)
}

/// Encrypt `plaintext` with a key derived from `passphrase`
pub fn encrypt(plaintext: &[u8], passphrase: &str) -> Result<Vec<u8>, EncryptionError> {
    let mut rng = rand::thread_rng();
    let salt: [u8; SALT_SIZE] = rng.gen();
    let nonce_bytes: [u8; NONCE_SIZE] = rng.gen();

    let key = derive_key(passphrase, &salt)?;
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
        .map_err(|_| EncryptionError::Encrypt)?;

    let mut out = Vec::with_capacity(SALT_SIZE + NONCE_SIZE + ciphertext.len());
    out.extend_from_slice(&salt);
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Reverse of [`encrypt`]
pub fn decrypt(data: &[u8], passphrase: &str) -> Result<Vec<u8>, EncryptionError> {
    if data.len() < SALT_SIZE + NONCE_SIZE {
        return Err(EncryptionError::Truncated);
    }
    let (salt, rest) = data.split_at(SALT_SIZE);
    let (nonce_bytes, ciphertext) = rest.split_at(NONCE_SIZE);

    let key = derive_key(passphrase, salt)?;
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
    cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| EncryptionError::Decrypt)
}
