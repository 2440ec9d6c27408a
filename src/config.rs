//! Configuration management for file-sealer.
//!
//! Configuration can be set via environment variables:
//! - `SEAL_KEYRING_DIR` - Optional. Directory holding key files. Defaults to `$HOME/.file-sealer/keys`.
//! - `SEAL_PASSPHRASE` - Optional. Passphrase for symmetric encryption (no recipients).
//! - `SEAL_PBKDF2_ROUNDS` - Optional. PBKDF2 iterations for passphrase keys, at most `6000000`. Defaults to `600000`.
//! - `SEAL_ASCII_ARMOR` - Optional. Write armored output. Defaults to `true`.
//! - `SEAL_REMOVE_INPUT` - Optional. Delete inputs after success. Defaults to `false`.

use std::path::PathBuf;
use thiserror::Error;

use crate::backend::local::{LocalOptions, DEFAULT_PBKDF2_ROUNDS, MAX_PBKDF2_ROUNDS};
use crate::util::{home_dir, parse_bool};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Sealer configuration.
#[derive(Clone)]
pub struct Config {
    /// Directory of `*.json` key files
    pub keyring_dir: PathBuf,

    /// Passphrase for symmetric encryption
    pub passphrase: Option<String>,

    /// PBKDF2 iteration count
    pub pbkdf2_rounds: u32,

    /// Armor output by default
    pub ascii_armor: bool,

    /// Remove inputs after successful sealing by default
    pub remove_input: bool,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("keyring_dir", &self.keyring_dir)
            .field("passphrase", &self.passphrase.as_ref().map(|_| "<redacted>"))
            .field("pbkdf2_rounds", &self.pbkdf2_rounds)
            .field("ascii_armor", &self.ascii_armor)
            .field("remove_input", &self.remove_input)
            .finish()
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if a set variable cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Load configuration through a variable lookup function.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let keyring_dir = var("SEAL_KEYRING_DIR")
            .filter(|dir| !dir.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(home_dir()).join(".file-sealer").join("keys"));

        let passphrase = var("SEAL_PASSPHRASE").filter(|p| !p.is_empty());

        let pbkdf2_rounds = match var("SEAL_PBKDF2_ROUNDS") {
            Some(value) => value
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|rounds| (1..=MAX_PBKDF2_ROUNDS).contains(rounds))
                .ok_or_else(|| {
                    ConfigError::InvalidValue(
                        "SEAL_PBKDF2_ROUNDS".to_string(),
                        format!("expected 1 to {}, got '{}'", MAX_PBKDF2_ROUNDS, value),
                    )
                })?,
            None => DEFAULT_PBKDF2_ROUNDS,
        };

        let ascii_armor = bool_var(&var, "SEAL_ASCII_ARMOR", true)?;
        let remove_input = bool_var(&var, "SEAL_REMOVE_INPUT", false)?;

        Ok(Self {
            keyring_dir,
            passphrase,
            pbkdf2_rounds,
            ascii_armor,
            remove_input,
        })
    }

    /// Options for the local backend.
    pub fn local_options(&self) -> LocalOptions {
        LocalOptions {
            passphrase: self.passphrase.clone(),
            pbkdf2_rounds: self.pbkdf2_rounds,
        }
    }
}

fn bool_var(
    var: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: bool,
) -> Result<bool, ConfigError> {
    match var(name) {
        Some(value) => parse_bool(&value).ok_or_else(|| {
            ConfigError::InvalidValue(name.to_string(), format!("expected a boolean, got '{}'", value))
        }),
        None => Ok(default),
    }
}
