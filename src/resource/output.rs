use std::path::{Path, PathBuf};

use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use super::{label_for, ResourceError};
use crate::backend::OutputStream;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputState {
    Open,
    Finalized,
    Cancelled,
}

/// A provisional output file.
///
/// Data is written to a hidden `.part` file next to the target. The target
/// only appears once [`Output::finalize`] commits the provisional file:
/// by rename when overwriting, otherwise by hard link, which fails if the
/// target exists.
#[derive(Debug)]
pub struct Output {
    target: PathBuf,
    provisional: PathBuf,
    label: String,
    overwrite: bool,
    writer: Option<File>,
    state: OutputState,
}

impl Output {
    /// Create the provisional file for `path`.
    ///
    /// With `overwrite == false`, finalizing fails if `path` exists by then.
    pub async fn create_from_file(
        path: impl AsRef<Path>,
        overwrite: bool,
    ) -> Result<Self, ResourceError> {
        let target = path.as_ref().to_path_buf();
        if target.as_os_str().is_empty() {
            return Err(ResourceError::EmptyFileName);
        }
        let label = label_for(&target);
        let provisional = target.with_file_name(format!(
            ".{}.{}.part",
            label,
            Uuid::new_v4().simple()
        ));
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&provisional)
            .await
            .map_err(|source| ResourceError::Create {
                path: target.clone(),
                source,
            })?;

        Ok(Self {
            target,
            provisional,
            label,
            overwrite,
            writer: Some(file),
            state: OutputState::Open,
        })
    }

    pub fn path(&self) -> &Path {
        &self.target
    }

    pub fn provisional_path(&self) -> &Path {
        &self.provisional
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Hand the provisional file to a job. Only the first call returns a stream.
    pub fn take_writer(&mut self) -> Option<OutputStream> {
        self.writer
            .take()
            .map(|file| Box::new(file) as OutputStream)
    }

    /// Commit the provisional file to the target path.
    ///
    /// On failure the provisional file is discarded and the output is closed.
    pub async fn finalize(&mut self) -> Result<(), ResourceError> {
        if self.state != OutputState::Open {
            return Err(ResourceError::Closed(self.target.clone()));
        }
        if let Some(mut file) = self.writer.take() {
            if let Err(source) = file.flush().await {
                self.cancel().await;
                return Err(ResourceError::Commit {
                    path: self.target.clone(),
                    source,
                });
            }
        }

        let committed = if self.overwrite {
            tokio::fs::rename(&self.provisional, &self.target).await
        } else {
            tokio::fs::hard_link(&self.provisional, &self.target).await
        };
        match committed {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                self.cancel().await;
                return Err(ResourceError::FileExists(self.target.clone()));
            }
            Err(source) => {
                self.cancel().await;
                return Err(ResourceError::Commit {
                    path: self.target.clone(),
                    source,
                });
            }
        }

        self.state = OutputState::Finalized;
        if !self.overwrite {
            if let Err(e) = tokio::fs::remove_file(&self.provisional).await {
                tracing::warn!(
                    "Failed to remove provisional output {}: {}",
                    self.provisional.display(),
                    e
                );
            }
        }
        tracing::debug!("Committed output {}", self.target.display());
        Ok(())
    }

    /// Discard the provisional file. No-op once finalized or cancelled.
    pub async fn cancel(&mut self) {
        if self.state != OutputState::Open {
            return;
        }
        self.writer = None;
        self.state = OutputState::Cancelled;
        match tokio::fs::remove_file(&self.provisional).await {
            Ok(()) => tracing::debug!("Discarded output {}", self.provisional.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                "Failed to remove provisional output {}: {}",
                self.provisional.display(),
                e
            ),
        }
    }

    pub fn is_finalized(&self) -> bool {
        self.state == OutputState::Finalized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn finalize_moves_data_to_target() {
        let temp = tempfile::tempdir().expect("tempdir");
        let target = temp.path().join("out.gpg");

        let mut output = Output::create_from_file(&target, false).await.unwrap();
        assert!(output.provisional_path().exists());
        assert!(!target.exists());

        let mut writer = output.take_writer().expect("writer");
        writer.write_all(b"sealed").await.unwrap();
        writer.shutdown().await.unwrap();
        drop(writer);

        output.finalize().await.unwrap();
        assert!(output.is_finalized());
        assert_eq!(tokio::fs::read(&target).await.unwrap(), b"sealed");
        assert!(!output.provisional_path().exists());
    }

    #[tokio::test]
    async fn cancel_leaves_no_files_behind() {
        let temp = tempfile::tempdir().expect("tempdir");
        let target = temp.path().join("out.gpg");

        let mut output = Output::create_from_file(&target, false).await.unwrap();
        output.cancel().await;
        assert!(!target.exists());
        assert!(!output.provisional_path().exists());
        assert!(matches!(
            output.finalize().await,
            Err(ResourceError::Closed(_))
        ));
    }

    #[tokio::test]
    async fn finalize_refuses_to_overwrite_existing_target() {
        let temp = tempfile::tempdir().expect("tempdir");
        let target = temp.path().join("out.gpg");
        tokio::fs::write(&target, b"keep me").await.unwrap();

        let mut output = Output::create_from_file(&target, false).await.unwrap();
        let err = output.finalize().await.unwrap_err();
        assert!(matches!(err, ResourceError::FileExists(_)));
        assert_eq!(tokio::fs::read(&target).await.unwrap(), b"keep me");
        assert!(!output.provisional_path().exists());
    }

    #[tokio::test]
    async fn target_created_while_writing_is_kept() {
        let temp = tempfile::tempdir().expect("tempdir");
        let target = temp.path().join("out.gpg");

        let mut output = Output::create_from_file(&target, false).await.unwrap();
        let mut writer = output.take_writer().expect("writer");
        writer.write_all(b"sealed").await.unwrap();
        writer.shutdown().await.unwrap();
        drop(writer);
        tokio::fs::write(&target, b"someone else").await.unwrap();

        let err = output.finalize().await.unwrap_err();
        assert!(matches!(err, ResourceError::FileExists(_)));
        assert_eq!(tokio::fs::read(&target).await.unwrap(), b"someone else");
        assert!(!output.provisional_path().exists());
    }

    #[tokio::test]
    async fn overwrite_replaces_existing_target() {
        let temp = tempfile::tempdir().expect("tempdir");
        let target = temp.path().join("out.gpg");
        tokio::fs::write(&target, b"old").await.unwrap();

        let mut output = Output::create_from_file(&target, true).await.unwrap();
        if let Some(mut writer) = output.take_writer() {
            writer.write_all(b"new").await.unwrap();
            writer.shutdown().await.unwrap();
        }
        output.finalize().await.unwrap();
        assert_eq!(tokio::fs::read(&target).await.unwrap(), b"new");
    }

    #[tokio::test]
    async fn missing_directory_is_a_create_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = Output::create_from_file(temp.path().join("no/such/dir/out"), false)
            .await
            .unwrap_err();
        assert!(matches!(err, ResourceError::Create { .. }));
    }
}
