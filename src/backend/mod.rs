//! Cryptographic backend seam.
//!
//! A [`BackendFactory`](registry::BackendFactory) maps each [`Protocol`] to a
//! [`CryptoBackend`], which hands out single-use jobs. A job reads the input
//! stream, writes the output stream, reports progress through its
//! [`JobContext`] and returns its outcome value(s). Jobs never finalize or
//! discard the output themselves; that is the task's decision.

pub mod events;
pub mod local;
pub mod outcome;
pub mod registry;

#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::keys::{Key, Protocol};
use events::JobEvent;
use outcome::{EncryptionResult, SigningResult};

pub use registry::{BackendFactory, BackendInfo};

/// Readable handle a job consumes.
pub type InputStream = Box<dyn AsyncRead + Send + Unpin>;

/// Writable handle a job produces into.
pub type OutputStream = Box<dyn AsyncWrite + Send + Unpin>;

/// Signature placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignatureMode {
    /// Signature and data in one message.
    #[default]
    Normal,
    /// Output contains only the signature.
    Detached,
}

/// Progress sink and cancellation flag handed to a running job.
#[derive(Debug, Clone)]
pub struct JobContext {
    progress: mpsc::UnboundedSender<JobEvent>,
    cancel: CancellationToken,
}

impl JobContext {
    pub fn new(progress: mpsc::UnboundedSender<JobEvent>, cancel: CancellationToken) -> Self {
        Self { progress, cancel }
    }

    /// Report progress. Dropped silently if nobody listens anymore.
    pub fn progress(&self, message: impl Into<String>, current: u64, total: u64) {
        let _ = self.progress.send(JobEvent::Progress {
            message: message.into(),
            current,
            total,
        });
    }

    /// Whether cancellation has been requested.
    pub fn is_canceled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }
}

#[async_trait]
pub trait SignJob: Send {
    async fn run(
        self: Box<Self>,
        signers: Vec<Key>,
        input: InputStream,
        output: OutputStream,
        mode: SignatureMode,
        ctx: JobContext,
    ) -> SigningResult;
}

#[async_trait]
pub trait EncryptJob: Send {
    async fn run(
        self: Box<Self>,
        recipients: Vec<Key>,
        input: InputStream,
        output: OutputStream,
        ctx: JobContext,
    ) -> EncryptionResult;
}

#[async_trait]
pub trait SignEncryptJob: Send {
    async fn run(
        self: Box<Self>,
        signers: Vec<Key>,
        recipients: Vec<Key>,
        input: InputStream,
        output: OutputStream,
        ctx: JobContext,
    ) -> (SigningResult, EncryptionResult);
}

/// Protocol-specific job producer.
///
/// `armor` requests ASCII-safe output, `text_mode` canonical line endings.
/// `None` means the backend does not support that kind of job.
pub trait CryptoBackend: Send + Sync {
    fn protocol(&self) -> Protocol;
    fn name(&self) -> &str;
    fn sign_job(&self, armor: bool, text_mode: bool) -> Option<Box<dyn SignJob>>;
    fn encrypt_job(&self, armor: bool, text_mode: bool) -> Option<Box<dyn EncryptJob>>;
    fn sign_encrypt_job(&self, armor: bool, text_mode: bool) -> Option<Box<dyn SignEncryptJob>>;
}
