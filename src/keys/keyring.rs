//! Directory-backed key storage.
//!
//! Every key lives in its own `<fingerprint>.json` file inside the keyring
//! directory. Unreadable files are skipped with a warning so one broken key
//! does not make the whole keyring unusable. On unix the directory is kept
//! at `0o700` and key files at `0o600`.

use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;

use super::{Key, Protocol};

#[derive(Debug, thiserror::Error)]
pub enum KeyringError {
    #[error("Keyring I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize key: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("No key matches '{0}'")]
    NotFound(String),

    #[error("User id cannot be empty")]
    EmptyUserId,
}

/// In-memory view of the keys stored in a directory.
#[derive(Debug, Clone, Default)]
pub struct Keyring {
    dir: Option<PathBuf>,
    keys: Vec<Key>,
}

impl Keyring {
    /// A keyring that is not backed by a directory.
    pub fn from_keys(keys: Vec<Key>) -> Self {
        Self { dir: None, keys }
    }

    /// Load all keys stored in `dir`. A missing directory yields an empty keyring.
    pub async fn load(dir: impl Into<PathBuf>) -> Result<Self, KeyringError> {
        let dir = dir.into();
        let mut keys = Vec::new();

        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No keyring found at {}, starting empty", dir.display());
                return Ok(Self {
                    dir: Some(dir),
                    keys,
                });
            }
            Err(source) => return Err(KeyringError::Io { path: dir, source }),
        };

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|source| KeyringError::Io {
                path: dir.clone(),
                source,
            })?
        {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            match Self::load_key(&path).await {
                Ok(key) => keys.push(key),
                Err(e) => {
                    tracing::warn!("Skipping unreadable key file {}: {}", path.display(), e);
                }
            }
        }

        keys.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        tracing::debug!("Loaded {} key(s) from {}", keys.len(), dir.display());
        Ok(Self {
            dir: Some(dir),
            keys,
        })
    }

    async fn load_key(path: &Path) -> Result<Key, std::io::Error> {
        let contents = tokio::fs::read_to_string(path).await?;
        serde_json::from_str(&contents)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    /// Find a key by user id or fingerprint prefix.
    pub fn find(&self, query: &str) -> Option<&Key> {
        self.keys
            .iter()
            .find(|key| key.user_id == query.trim())
            .or_else(|| self.keys.iter().find(|key| key.matches(query)))
    }

    /// Like [`Keyring::find`] but returns an owned key or `NotFound`.
    pub fn resolve(&self, query: &str) -> Result<Key, KeyringError> {
        self.find(query)
            .cloned()
            .ok_or_else(|| KeyringError::NotFound(query.to_string()))
    }

    /// Find the stored copy of a key by exact fingerprint.
    pub fn by_fingerprint(&self, fingerprint: &str) -> Option<&Key> {
        self.keys
            .iter()
            .find(|key| key.fingerprint.eq_ignore_ascii_case(fingerprint))
    }

    /// Add a key in memory, replacing any key with the same fingerprint.
    pub fn insert(&mut self, key: Key) {
        self.keys
            .retain(|existing| !existing.fingerprint.eq_ignore_ascii_case(&key.fingerprint));
        self.keys.push(key);
    }

    /// Generate a new key, store it on disk (if directory-backed) and add it.
    pub async fn generate(
        &mut self,
        user_id: &str,
        protocol: Protocol,
    ) -> Result<Key, KeyringError> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(KeyringError::EmptyUserId);
        }

        let key = Key::generate(user_id, protocol);
        if let Some(dir) = &self.dir {
            create_private_dir(dir)
                .await
                .map_err(|source| KeyringError::Io {
                    path: dir.clone(),
                    source,
                })?;
            let path = dir.join(format!("{}.json", key.fingerprint));
            let contents = serde_json::to_string_pretty(&key)?;
            write_private_file(&path, contents.as_bytes())
                .await
                .map_err(|source| KeyringError::Io {
                    path: path.clone(),
                    source,
                })?;
            tracing::info!("Stored new key {} in {}", key.fingerprint, path.display());
        }

        self.insert(key.clone());
        Ok(key)
    }
}

async fn create_private_dir(dir: &Path) -> std::io::Result<()> {
    tokio::fs::create_dir_all(dir).await?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700)).await?;
    }
    Ok(())
}

/// Write `contents` to a file only the owner can read.
async fn write_private_file(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);
    let mut file = options.open(path).await?;
    // `mode` only applies on creation.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))
            .await?;
    }
    file.write_all(contents).await?;
    file.flush().await
}
