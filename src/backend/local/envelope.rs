//! Message format written by the local backend.
//!
//! A message is a JSON [`Envelope`]. Binary fields are base64 encoded, MACs
//! are hex. With armor the JSON is base64 encoded again and wrapped between
//! [`ARMOR_BEGIN`] and [`ARMOR_END`] lines of [`ARMOR_WIDTH`] characters.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};

pub const ARMOR_BEGIN: &str = "-----BEGIN SEALED MESSAGE-----";
pub const ARMOR_END: &str = "-----END SEALED MESSAGE-----";
pub const ARMOR_WIDTH: usize = 64;

/// Current envelope format version
pub const ENVELOPE_VERSION: u8 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Envelope {
    /// Payload plus signatures over it.
    Signed {
        version: u8,
        payload: String,
        signatures: Vec<SignatureBlock>,
    },
    /// Signatures over data kept elsewhere.
    DetachedSignature {
        version: u8,
        signatures: Vec<SignatureBlock>,
    },
    /// Encrypted payload; the plaintext may itself be a signed envelope.
    Encrypted { version: u8, cipher: CipherBlock },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureBlock {
    pub fingerprint: String,
    pub user_id: String,
    pub created: String,
    pub mac: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CipherBlock {
    pub nonce: String,
    pub ciphertext: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recipients: Vec<WrappedKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symmetric: Option<SymmetricParams>,
}

/// Content key encrypted for one recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrappedKey {
    pub fingerprint: String,
    pub nonce: String,
    pub wrapped: String,
}

/// Passphrase derivation parameters for symmetric messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymmetricParams {
    pub salt: String,
    pub rounds: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("Malformed envelope: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Malformed base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Armored message is missing its {0} line")]
    MissingArmorLine(&'static str),

    #[error("Unsupported envelope version {0}")]
    UnsupportedVersion(u8),
}

impl Envelope {
    pub fn version(&self) -> u8 {
        match self {
            Envelope::Signed { version, .. }
            | Envelope::DetachedSignature { version, .. }
            | Envelope::Encrypted { version, .. } => *version,
        }
    }
}

/// Serialize an envelope, optionally armored.
pub fn encode(envelope: &Envelope, armor: bool) -> Result<Vec<u8>, EnvelopeError> {
    let json = serde_json::to_vec(envelope)?;
    if armor {
        Ok(armor_bytes(&json).into_bytes())
    } else {
        Ok(json)
    }
}

/// Parse an envelope, armored or not.
pub fn decode(bytes: &[u8]) -> Result<Envelope, EnvelopeError> {
    let text = String::from_utf8_lossy(bytes);
    let envelope: Envelope = if text.trim_start().starts_with(ARMOR_BEGIN) {
        serde_json::from_slice(&dearmor(&text)?)?
    } else {
        serde_json::from_slice(bytes)?
    };
    if envelope.version() != ENVELOPE_VERSION {
        return Err(EnvelopeError::UnsupportedVersion(envelope.version()));
    }
    Ok(envelope)
}

fn armor_bytes(data: &[u8]) -> String {
    let body = BASE64.encode(data);
    let mut out = String::with_capacity(body.len() + body.len() / ARMOR_WIDTH + 64);
    out.push_str(ARMOR_BEGIN);
    out.push('\n');
    for line in body.as_bytes().chunks(ARMOR_WIDTH) {
        out.push_str(&String::from_utf8_lossy(line));
        out.push('\n');
    }
    out.push_str(ARMOR_END);
    out.push('\n');
    out
}

fn dearmor(text: &str) -> Result<Vec<u8>, EnvelopeError> {
    let mut lines = text.lines().map(str::trim).skip_while(|line| line.is_empty());
    if lines.next() != Some(ARMOR_BEGIN) {
        return Err(EnvelopeError::MissingArmorLine("BEGIN"));
    }
    let mut body = String::new();
    let mut terminated = false;
    for line in lines {
        if line == ARMOR_END {
            terminated = true;
            break;
        }
        body.push_str(line);
    }
    if !terminated {
        return Err(EnvelopeError::MissingArmorLine("END"));
    }
    Ok(BASE64.decode(body)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detached() -> Envelope {
        Envelope::DetachedSignature {
            version: ENVELOPE_VERSION,
            signatures: vec![SignatureBlock {
                fingerprint: "ABCDEF0123456789".to_string(),
                user_id: "alice@example.org".to_string(),
                created: "2026-01-01T00:00:00+00:00".to_string(),
                mac: "00ff".to_string(),
            }],
        }
    }

    #[test]
    fn armored_output_is_wrapped_ascii() {
        let bytes = encode(&detached(), true).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with(ARMOR_BEGIN));
        assert!(text.trim_end().ends_with(ARMOR_END));
        assert!(text.lines().all(|line| line.len() <= ARMOR_WIDTH.max(ARMOR_END.len())));
        assert_eq!(decode(text.as_bytes()).unwrap(), detached());
    }

    #[test]
    fn binary_output_is_plain_json() {
        let bytes = encode(&detached(), false).unwrap();
        assert!(bytes.starts_with(b"{\"kind\":\"detached_signature\""));
        assert_eq!(decode(&bytes).unwrap(), detached());
    }

    #[test]
    fn truncated_armor_is_rejected() {
        let text = format!("{}\nAAAA\n", ARMOR_BEGIN);
        assert!(matches!(
            decode(text.as_bytes()),
            Err(EnvelopeError::MissingArmorLine("END"))
        ));
    }

    #[test]
    fn unknown_versions_are_rejected() {
        let json = br#"{"kind":"detached_signature","version":9,"signatures":[]}"#;
        assert!(matches!(
            decode(json),
            Err(EnvelopeError::UnsupportedVersion(9))
        ));
    }
}
