//! CLI argument definitions.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};

/// Top-level CLI parser for `seal-files`.
#[derive(Debug, Parser)]
#[command(name = "seal-files", version, about = "Sign and encrypt files")]
pub struct Cli {
    /// The command to execute.
    #[command(subcommand)]
    pub command: Command,
}

/// Supported top-level subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Sign and/or encrypt files.
    Seal(SealArgs),
    /// Decrypt and/or verify a sealed file.
    Open(OpenArgs),
    /// Generate a key and store it in the keyring.
    GenKey {
        /// User id of the new key, usually an email address.
        user_id: String,
        /// Tag the key as S/MIME instead of OpenPGP.
        #[arg(long)]
        smime: bool,
    },
    /// List keys in the keyring.
    ListKeys,
}

#[derive(Debug, Args)]
pub struct SealArgs {
    /// Sign with this key (user id or fingerprint). Repeatable.
    #[arg(long = "sign", value_name = "KEY")]
    pub signers: Vec<String>,

    /// Encrypt for this key (user id or fingerprint). Repeatable.
    #[arg(long = "encrypt-to", value_name = "KEY")]
    pub recipients: Vec<String>,

    /// Only sign; requires at least one --sign.
    #[arg(long)]
    pub no_encrypt: bool,

    /// Write a detached signature (sign-only).
    #[arg(long, requires = "no_encrypt")]
    pub detached: bool,

    /// Write binary instead of armored output.
    #[arg(long)]
    pub binary: bool,

    /// Delete each input file once its output has been written.
    #[arg(long)]
    pub remove_input: bool,

    /// Files to seal.
    #[arg(required = true, value_name = "FILE")]
    pub files: Vec<PathBuf>,
}

impl SealArgs {
    pub fn sign(&self) -> bool {
        !self.signers.is_empty()
    }

    pub fn encrypt(&self) -> bool {
        !self.no_encrypt
    }
}

#[derive(Debug, Args)]
pub struct OpenArgs {
    /// Sealed file, or the signed data when --signature is given.
    pub file: PathBuf,

    /// Detached signature to verify against FILE.
    #[arg(long, value_name = "SIG")]
    pub signature: Option<PathBuf>,

    /// Write the recovered plaintext here instead of stdout.
    #[arg(long, short, value_name = "PATH")]
    pub output: Option<PathBuf>,
}

/// Output path for sealing `input`.
///
/// `.sig` for detached signatures, `.asc` for armored output, `.gpg`
/// otherwise.
pub fn output_path_for(input: &Path, detached: bool, armor: bool) -> PathBuf {
    let suffix = if detached {
        "sig"
    } else if armor {
        "asc"
    } else {
        "gpg"
    };
    let mut name = OsString::from(input.as_os_str());
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}
