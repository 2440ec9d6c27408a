use std::path::{Path, PathBuf};

use tokio::fs::File;

use super::{label_for, ResourceError};
use crate::backend::InputStream;

/// A readable file handed to a backend job.
#[derive(Debug)]
pub struct Input {
    path: PathBuf,
    label: String,
    reader: Option<File>,
}

impl Input {
    /// Open `path` for reading.
    pub async fn create_from_file(path: impl AsRef<Path>) -> Result<Self, ResourceError> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(ResourceError::EmptyFileName);
        }
        let file = File::open(path).await.map_err(|source| ResourceError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            label: label_for(path),
            reader: Some(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Hand the open file to a job. Only the first call returns a stream.
    pub fn take_reader(&mut self) -> Option<InputStream> {
        self.reader
            .take()
            .map(|file| Box::new(file) as InputStream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn reads_existing_file_once() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("plain.txt");
        tokio::fs::write(&path, b"hello").await.unwrap();

        let mut input = Input::create_from_file(&path).await.unwrap();
        assert_eq!(input.label(), "plain.txt");

        let mut reader = input.take_reader().expect("reader");
        let mut data = Vec::new();
        reader.read_to_end(&mut data).await.unwrap();
        assert_eq!(data, b"hello");
        assert!(input.take_reader().is_none());
    }

    #[tokio::test]
    async fn missing_file_is_an_open_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = Input::create_from_file(temp.path().join("missing"))
            .await
            .unwrap_err();
        assert!(matches!(err, ResourceError::Open { .. }));
        assert_eq!(err.code(), crate::backend::outcome::codes::ENOENT);
    }

    #[tokio::test]
    async fn empty_name_is_rejected() {
        let err = Input::create_from_file("").await.unwrap_err();
        assert!(matches!(err, ResourceError::EmptyFileName));
    }
}
