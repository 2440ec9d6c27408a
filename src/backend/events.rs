use super::outcome::{EncryptionResult, SigningResult};

/// Events emitted by a running backend job.
///
/// Zero or more `Progress` events are followed by exactly one `Finished`.
#[derive(Debug, Clone)]
pub enum JobEvent {
    /// Work is progressing. `total == 0` means the total is unknown.
    Progress {
        message: String,
        current: u64,
        total: u64,
    },
    /// Terminal event.
    Finished(JobOutcome),
}

/// Terminal value of a job: one outcome per operation the job performed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Signed(SigningResult),
    Encrypted(EncryptionResult),
    SignedEncrypted(SigningResult, EncryptionResult),
}

impl JobOutcome {
    pub fn signing(&self) -> Option<&SigningResult> {
        match self {
            JobOutcome::Signed(s) | JobOutcome::SignedEncrypted(s, _) => Some(s),
            JobOutcome::Encrypted(_) => None,
        }
    }

    pub fn encryption(&self) -> Option<&EncryptionResult> {
        match self {
            JobOutcome::Encrypted(e) | JobOutcome::SignedEncrypted(_, e) => Some(e),
            JobOutcome::Signed(_) => None,
        }
    }

    /// Whether any half of the operation reported an error code.
    pub fn has_error(&self) -> bool {
        self.signing().is_some_and(|s| s.error().is_err())
            || self.encryption().is_some_and(|e| e.error().is_err())
    }

    pub fn is_canceled(&self) -> bool {
        self.signing().is_some_and(|s| s.error().is_canceled())
            || self.encryption().is_some_and(|e| e.error().is_canceled())
    }
}
