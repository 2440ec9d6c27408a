//! Keys and the protocol families they belong to.
//!
//! A [`Key`] always carries its fingerprint, user id and [`Protocol`]. Secret
//! material is optional: keys handed to a task as signers must be resolvable
//! to a secret by the backend, recipients are looked up by fingerprint.

mod keyring;

pub use keyring::{Keyring, KeyringError};

use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

/// Length of a key secret in bytes (256 bits).
pub const SECRET_LENGTH: usize = 32;

/// Number of hex characters kept from the key digest as fingerprint.
const FINGERPRINT_LENGTH: usize = 40;

/// Cryptographic scheme family governing key interpretation and job selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Protocol {
    #[serde(rename = "openpgp")]
    OpenPgp,
    #[serde(rename = "smime")]
    Smime,
}

impl Protocol {
    /// Human-readable protocol name, also used as the task tag.
    pub fn display_name(&self) -> &'static str {
        match self {
            Protocol::OpenPgp => "OpenPGP",
            Protocol::Smime => "S/MIME",
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Raw secret key material.
#[derive(Clone, PartialEq, Eq)]
pub struct KeySecret([u8; SECRET_LENGTH]);

impl KeySecret {
    pub fn from_bytes(bytes: [u8; SECRET_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Generate fresh random key material.
    pub fn generate() -> Self {
        let mut bytes = [0u8; SECRET_LENGTH];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SECRET_LENGTH] {
        &self.0
    }

    fn fingerprint(&self) -> String {
        let digest = Sha256::new()
            .chain_update(b"file-sealer key v1")
            .chain_update(self.0)
            .finalize();
        let mut fpr = hex::encode_upper(digest);
        fpr.truncate(FINGERPRINT_LENGTH);
        fpr
    }
}

impl std::fmt::Debug for KeySecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("KeySecret(<redacted>)")
    }
}

impl Serialize for KeySecret {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for KeySecret {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        let bytes = hex::decode(encoded.trim()).map_err(serde::de::Error::custom)?;
        let bytes: [u8; SECRET_LENGTH] = bytes.try_into().map_err(|_| {
            serde::de::Error::custom(format!("key secret must be {} bytes", SECRET_LENGTH))
        })?;
        Ok(Self(bytes))
    }
}

/// A signing or encryption key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Key {
    pub fingerprint: String,
    pub user_id: String,
    pub protocol: Protocol,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    secret: Option<KeySecret>,
}

impl Key {
    /// Create a key from secret material. The fingerprint is derived from it.
    pub fn from_secret(user_id: impl Into<String>, protocol: Protocol, secret: KeySecret) -> Self {
        Self {
            fingerprint: secret.fingerprint(),
            user_id: user_id.into(),
            protocol,
            secret: Some(secret),
        }
    }

    /// Create a key reference without secret material.
    pub fn public(
        fingerprint: impl Into<String>,
        user_id: impl Into<String>,
        protocol: Protocol,
    ) -> Self {
        Self {
            fingerprint: fingerprint.into(),
            user_id: user_id.into(),
            protocol,
            secret: None,
        }
    }

    /// Generate a brand new key.
    pub fn generate(user_id: impl Into<String>, protocol: Protocol) -> Self {
        Self::from_secret(user_id, protocol, KeySecret::generate())
    }

    pub fn secret(&self) -> Option<&KeySecret> {
        self.secret.as_ref()
    }

    pub fn has_secret(&self) -> bool {
        self.secret.is_some()
    }

    /// Copy of this key with the secret material stripped.
    pub fn without_secret(&self) -> Key {
        Key {
            secret: None,
            ..self.clone()
        }
    }

    /// Whether `query` names this key, either by user id or by fingerprint
    /// prefix (case-insensitive, at least 8 characters).
    pub fn matches(&self, query: &str) -> bool {
        let query = query.trim();
        if query.is_empty() {
            return false;
        }
        if self.user_id == query {
            return true;
        }
        let query = query.trim_start_matches("0x").to_ascii_uppercase();
        query.len() >= 8 && self.fingerprint.to_ascii_uppercase().starts_with(&query)
    }
}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} <{}> ({})", self.user_id, self.fingerprint, self.protocol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_stable_for_same_secret() {
        let secret = KeySecret::from_bytes([7u8; SECRET_LENGTH]);
        let a = Key::from_secret("alice@example.org", Protocol::OpenPgp, secret.clone());
        let b = Key::from_secret("other", Protocol::Smime, secret);
        assert_eq!(a.fingerprint, b.fingerprint);
        assert_eq!(a.fingerprint.len(), FINGERPRINT_LENGTH);
    }

    #[test]
    fn debug_output_never_contains_secret() {
        let key = Key::from_secret(
            "alice@example.org",
            Protocol::OpenPgp,
            KeySecret::from_bytes([0xab; SECRET_LENGTH]),
        );
        let printed = format!("{:?}", key);
        assert!(printed.contains("<redacted>"));
        assert!(!printed.contains("abababab"));
    }

    #[test]
    fn matches_user_id_and_fingerprint_prefix() {
        let key = Key::generate("bob@example.org", Protocol::OpenPgp);
        assert!(key.matches("bob@example.org"));
        assert!(key.matches(&key.fingerprint[..8].to_lowercase()));
        assert!(key.matches(&format!("0x{}", &key.fingerprint[..12])));
        assert!(!key.matches(&key.fingerprint[..4]));
        assert!(!key.matches(""));
    }

    #[test]
    fn secret_survives_json_roundtrip_as_hex() {
        let key = Key::generate("carol@example.org", Protocol::Smime);
        let json = serde_json::to_string(&key).unwrap();
        assert!(json.contains("\"smime\""));
        let back: Key = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
        assert!(back.has_secret());
        assert!(!back.without_secret().has_secret());
    }

    #[test]
    fn protocol_display_names() {
        assert_eq!(Protocol::OpenPgp.to_string(), "OpenPGP");
        assert_eq!(Protocol::Smime.display_name(), "S/MIME");
    }
}
