//! Glue between tasks and backend jobs.
//!
//! Looks up the backend for a protocol, asks it for the job kind a task
//! needs and runs the job on the runtime. A spawned job reports zero or more
//! progress events followed by exactly one [`JobEvent::Finished`]. There are
//! no retries at this layer.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::task::TaskError;
use crate::backend::events::{JobEvent, JobOutcome};
use crate::backend::{
    BackendFactory, CryptoBackend, EncryptJob, InputStream, JobContext, OutputStream,
    SignEncryptJob, SignJob, SignatureMode,
};
use crate::keys::{Key, Protocol};

/// Text mode is never used for file operations.
const TEXT_MODE: bool = false;

/// Which operation(s) a job performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Sign,
    Encrypt,
    SignEncrypt,
}

impl JobKind {
    pub fn from_flags(sign: bool, encrypt: bool) -> Option<Self> {
        match (sign, encrypt) {
            (true, true) => Some(JobKind::SignEncrypt),
            (true, false) => Some(JobKind::Sign),
            (false, true) => Some(JobKind::Encrypt),
            (false, false) => None,
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            JobKind::Sign => "sign",
            JobKind::Encrypt => "encrypt",
            JobKind::SignEncrypt => "sign/encrypt",
        })
    }
}

fn backend_for(factory: &BackendFactory, protocol: Protocol) -> Result<Arc<dyn CryptoBackend>, TaskError> {
    factory
        .protocol(protocol)
        .ok_or(TaskError::BackendUnavailable(protocol))
}

pub fn create_sign_job(
    factory: &BackendFactory,
    protocol: Protocol,
    armor: bool,
) -> Result<Box<dyn SignJob>, TaskError> {
    backend_for(factory, protocol)?
        .sign_job(armor, TEXT_MODE)
        .ok_or(TaskError::JobUnavailable {
            protocol,
            kind: JobKind::Sign,
        })
}

pub fn create_encrypt_job(
    factory: &BackendFactory,
    protocol: Protocol,
    armor: bool,
) -> Result<Box<dyn EncryptJob>, TaskError> {
    backend_for(factory, protocol)?
        .encrypt_job(armor, TEXT_MODE)
        .ok_or(TaskError::JobUnavailable {
            protocol,
            kind: JobKind::Encrypt,
        })
}

pub fn create_sign_encrypt_job(
    factory: &BackendFactory,
    protocol: Protocol,
    armor: bool,
) -> Result<Box<dyn SignEncryptJob>, TaskError> {
    backend_for(factory, protocol)?
        .sign_encrypt_job(armor, TEXT_MODE)
        .ok_or(TaskError::JobUnavailable {
            protocol,
            kind: JobKind::SignEncrypt,
        })
}

/// A created job together with the keys it will run with.
pub enum PreparedJob {
    Sign {
        job: Box<dyn SignJob>,
        signers: Vec<Key>,
        mode: SignatureMode,
    },
    Encrypt {
        job: Box<dyn EncryptJob>,
        recipients: Vec<Key>,
    },
    SignEncrypt {
        job: Box<dyn SignEncryptJob>,
        signers: Vec<Key>,
        recipients: Vec<Key>,
    },
}

/// A job running on the runtime.
pub struct JobRun {
    pub events: mpsc::UnboundedReceiver<JobEvent>,
    pub cancel: CancellationToken,
}

impl PreparedJob {
    pub fn kind(&self) -> JobKind {
        match self {
            PreparedJob::Sign { .. } => JobKind::Sign,
            PreparedJob::Encrypt { .. } => JobKind::Encrypt,
            PreparedJob::SignEncrypt { .. } => JobKind::SignEncrypt,
        }
    }

    /// Run the job in the background.
    ///
    /// The event channel closes after `Finished`. It closes without
    /// `Finished` only if the job panicked.
    pub fn spawn(self, input: InputStream, output: OutputStream, cancel: CancellationToken) -> JobRun {
        let (tx, events) = mpsc::unbounded_channel();
        let ctx = JobContext::new(tx.clone(), cancel.clone());
        let kind = self.kind();

        tokio::spawn(async move {
            tracing::debug!("Running {} job", kind);
            let outcome = match self {
                PreparedJob::Sign { job, signers, mode } => {
                    JobOutcome::Signed(job.run(signers, input, output, mode, ctx).await)
                }
                PreparedJob::Encrypt { job, recipients } => {
                    JobOutcome::Encrypted(job.run(recipients, input, output, ctx).await)
                }
                PreparedJob::SignEncrypt {
                    job,
                    signers,
                    recipients,
                } => {
                    let (signing, encryption) =
                        job.run(signers, recipients, input, output, ctx).await;
                    JobOutcome::SignedEncrypted(signing, encryption)
                }
            };
            let _ = tx.send(JobEvent::Finished(outcome));
        });

        JobRun { events, cancel }
    }
}
