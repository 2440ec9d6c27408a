//! Thin wrappers over the RustCrypto primitives used by the local backend.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

/// Key length in bytes (256 bits for AES-256)
pub const KEY_LENGTH: usize = 32;

/// Nonce length in bytes (96 bits for AES-GCM)
pub const NONCE_LENGTH: usize = 12;

/// Salt length for passphrase derivation
pub const SALT_LENGTH: usize = 16;

type HmacSha256 = Hmac<Sha256>;

pub fn random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

/// HMAC-SHA256 of `data` under `key`, hex encoded.
pub fn mac(key: &[u8; KEY_LENGTH], data: &[u8]) -> Result<String, String> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key)
        .map_err(|e| format!("Failed to create MAC: {}", e))?;
    mac.update(data);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time check of a hex encoded MAC.
pub fn verify_mac(key: &[u8; KEY_LENGTH], data: &[u8], expected_hex: &str) -> bool {
    let Ok(expected) = hex::decode(expected_hex) else {
        return false;
    };
    let Ok(mut mac) = <HmacSha256 as Mac>::new_from_slice(key) else {
        return false;
    };
    mac.update(data);
    mac.verify_slice(&expected).is_ok()
}

/// AES-256-GCM encrypt with a fresh random nonce.
pub fn seal(
    key: &[u8; KEY_LENGTH],
    plaintext: &[u8],
) -> Result<([u8; NONCE_LENGTH], Vec<u8>), String> {
    let nonce_bytes = random_bytes::<NONCE_LENGTH>();
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|e| format!("Failed to create cipher: {}", e))?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
        .map_err(|e| format!("Encryption failed: {}", e))?;
    Ok((nonce_bytes, ciphertext))
}

/// AES-256-GCM decrypt.
pub fn open(key: &[u8; KEY_LENGTH], nonce: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, String> {
    if nonce.len() != NONCE_LENGTH {
        return Err(format!("Invalid nonce length: {}", nonce.len()));
    }
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|e| format!("Failed to create cipher: {}", e))?;
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|e| format!("Decryption failed: {}", e))
}

/// Derive a content key from a passphrase with PBKDF2-HMAC-SHA256.
pub fn derive_key(passphrase: &str, salt: &[u8], rounds: u32) -> [u8; KEY_LENGTH] {
    let mut key = [0u8; KEY_LENGTH];
    pbkdf2::pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), salt, rounds, &mut key);
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> [u8; KEY_LENGTH] {
        let mut key = [0u8; KEY_LENGTH];
        for (i, byte) in key.iter_mut().enumerate() {
            *byte = i as u8;
        }
        key
    }

    #[test]
    fn seal_open_roundtrip() {
        let key = test_key();
        let (nonce, ciphertext) = seal(&key, b"attack at dawn").unwrap();
        assert_ne!(ciphertext, b"attack at dawn");
        assert_eq!(open(&key, &nonce, &ciphertext).unwrap(), b"attack at dawn");
    }

    #[test]
    fn open_with_wrong_key_fails() {
        let key = test_key();
        let (nonce, ciphertext) = seal(&key, b"secret").unwrap();
        let wrong = [9u8; KEY_LENGTH];
        assert!(open(&wrong, &nonce, &ciphertext).is_err());
    }

    #[test]
    fn mac_verifies_only_original_data() {
        let key = test_key();
        let tag = mac(&key, b"payload").unwrap();
        assert!(verify_mac(&key, b"payload", &tag));
        assert!(!verify_mac(&key, b"payl0ad", &tag));
        assert!(!verify_mac(&key, b"payload", "not-hex"));
    }

    #[test]
    fn derived_keys_depend_on_salt() {
        let a = derive_key("hunter2", b"salt-one-16bytes", 1_000);
        let b = derive_key("hunter2", b"salt-two-16bytes", 1_000);
        assert_ne!(a, b);
        assert_eq!(a, derive_key("hunter2", b"salt-one-16bytes", 1_000));
    }
}
