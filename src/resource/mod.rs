//! File resources owned by a task.
//!
//! - [`Input`]: the file a task reads.
//! - [`Output`]: a provisional file that becomes the target file only when
//!   [`Output::finalize`] succeeds; [`Output::cancel`] discards it.

mod input;
mod output;

pub use input::Input;
pub use output::Output;

use std::path::{Path, PathBuf};

use crate::backend::outcome::{codes, ErrorSource, OpError};

#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    #[error("File name cannot be empty")]
    EmptyFileName,

    #[error("Failed to open {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create {}: {source}", .path.display())]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Output file {} already exists", .0.display())]
    FileExists(PathBuf),

    #[error("Failed to commit {}: {source}", .path.display())]
    Commit {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Output {} is already closed", .0.display())]
    Closed(PathBuf),
}

impl ResourceError {
    pub fn code(&self) -> u32 {
        match self {
            ResourceError::EmptyFileName => codes::INV_VALUE,
            ResourceError::Open { source, .. }
            | ResourceError::Create { source, .. }
            | ResourceError::Commit { source, .. } => codes::from_io(source),
            ResourceError::FileExists(_) => codes::EEXIST,
            ResourceError::Closed(_) => codes::INTERNAL,
        }
    }

    /// The error as an outcome value, for reporting in a task result.
    pub fn to_op_error(&self) -> OpError {
        OpError::with_source(ErrorSource::Resource, self.code(), self.to_string())
    }
}

/// Display label for a file: its file name, or the whole path if it has none.
pub fn label_for(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
