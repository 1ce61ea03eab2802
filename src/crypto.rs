//! AES-GCM-256 envelope encryption for `EncryptedData` payloads.
//!
//! The sync core never manages key material itself (spec §6: "AES-GCM-256
//! with external key") — callers pass in a 32-byte key they obtained from
//! whatever key-derivation/key-storage scheme the host app uses.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::RngCore;

use crate::errors::{Result, SyncError};
use crate::message::EncryptedData;

const IV_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Encrypts `plaintext` (a protobuf-encoded `Message`) under `key`,
/// generating a fresh random 12-byte IV.
pub fn encrypt(key: &[u8; 32], plaintext: &[u8]) -> Result<EncryptedData> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));

    let mut iv = [0u8; IV_LEN];
    rand::thread_rng().fill_bytes(&mut iv);
    let nonce = Nonce::from_slice(&iv);

    let sealed = cipher
        .encrypt(nonce, Payload { msg: plaintext, aad: &[] })
        .map_err(|e| SyncError::DecryptFailure(format!("encrypt failed: {e}")))?;

    if sealed.len() < TAG_LEN {
        return Err(SyncError::DecryptFailure(
            "ciphertext shorter than auth tag".to_string(),
        ));
    }
    let (data, auth_tag) = sealed.split_at(sealed.len() - TAG_LEN);

    Ok(EncryptedData {
        iv: iv.to_vec(),
        auth_tag: auth_tag.to_vec(),
        data: data.to_vec(),
    })
}

/// Decrypts an `EncryptedData` payload, verifying its auth tag. A bad tag
/// (tampered ciphertext, wrong key) is a `DecryptFailure`, never a panic.
pub fn decrypt(key: &[u8; 32], envelope: &EncryptedData) -> Result<Vec<u8>> {
    if envelope.iv.len() != IV_LEN {
        return Err(SyncError::DecryptFailure(format!(
            "iv must be {IV_LEN} bytes, got {}",
            envelope.iv.len()
        )));
    }
    if envelope.auth_tag.len() != TAG_LEN {
        return Err(SyncError::DecryptFailure(format!(
            "authTag must be {TAG_LEN} bytes, got {}",
            envelope.auth_tag.len()
        )));
    }

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let nonce = Nonce::from_slice(&envelope.iv);

    let mut sealed = Vec::with_capacity(envelope.data.len() + TAG_LEN);
    sealed.extend_from_slice(&envelope.data);
    sealed.extend_from_slice(&envelope.auth_tag);

    cipher
        .decrypt(nonce, Payload { msg: &sealed, aad: &[] })
        .map_err(|_| SyncError::DecryptFailure("authentication tag mismatch".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; 32] = [7u8; 32];

    #[test]
    fn encrypt_then_decrypt_round_trips() {
        let plaintext = b"hello sync core";
        let envelope = encrypt(&KEY, plaintext).unwrap();
        let decrypted = decrypt(&KEY, &envelope).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn tampered_data_fails_decrypt() {
        let mut envelope = encrypt(&KEY, b"secret value").unwrap();
        envelope.data[0] ^= 0xff;
        assert!(decrypt(&KEY, &envelope).is_err());
    }

    #[test]
    fn wrong_key_fails_decrypt() {
        let envelope = encrypt(&KEY, b"secret value").unwrap();
        let wrong_key = [9u8; 32];
        assert!(decrypt(&wrong_key, &envelope).is_err());
    }

    #[test]
    fn malformed_iv_length_is_rejected_before_crypto() {
        let envelope = EncryptedData {
            iv: vec![0u8; 4],
            auth_tag: vec![0u8; TAG_LEN],
            data: vec![0u8; 8],
        };
        let err = decrypt(&KEY, &envelope).unwrap_err();
        assert!(matches!(err, SyncError::DecryptFailure(_)));
    }
}
