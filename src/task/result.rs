//! Immutable task results.
//!
//! A task emits exactly one [`TaskResult`]. Text accessors return rich text
//! (a small HTML subset: `<b>`, `<s>`, entities), escaped where it embeds
//! file names or backend messages.

use super::adapter::JobKind;
use super::classify::{
    encryption_details, encryption_overview, format_io_label, make_overview, signing_details,
    signing_overview,
};
use crate::backend::events::JobOutcome;
use crate::backend::outcome::{EncryptionResult, OpError, SigningResult};

/// Coarse severity used for presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisualCode {
    NeutralSuccess,
    NeutralError,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskResult {
    /// The task failed outside the cryptographic operation.
    Error(ErrorResult),
    SignEncryptFiles(SignEncryptFilesResult),
}

impl TaskResult {
    pub fn overview(&self) -> String {
        match self {
            TaskResult::Error(r) => r.overview(),
            TaskResult::SignEncryptFiles(r) => r.overview(),
        }
    }

    pub fn details(&self) -> String {
        match self {
            TaskResult::Error(r) => r.details(),
            TaskResult::SignEncryptFiles(r) => r.details(),
        }
    }

    /// Encoded error; 0 means success.
    pub fn error_code(&self) -> u32 {
        match self {
            TaskResult::Error(r) => r.error_code(),
            TaskResult::SignEncryptFiles(r) => r.error_code(),
        }
    }

    pub fn error_string(&self) -> String {
        match self {
            TaskResult::Error(r) => r.error_string(),
            TaskResult::SignEncryptFiles(r) => r.error_string(),
        }
    }

    pub fn visual_code(&self) -> VisualCode {
        match self {
            TaskResult::Error(_) => VisualCode::NeutralError,
            TaskResult::SignEncryptFiles(r) => r.visual_code(),
        }
    }

    pub fn has_error(&self) -> bool {
        self.error_code() != 0
    }
}

/// Failure that prevented a regular outcome: a resource could not be
/// opened or the output could not be committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorResult {
    kind: JobKind,
    error: OpError,
    error_string: String,
    input_label: String,
    output_label: String,
}

impl ErrorResult {
    pub fn new(
        kind: JobKind,
        error: OpError,
        error_string: impl Into<String>,
        input_label: impl Into<String>,
        output_label: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            error,
            error_string: error_string.into(),
            input_label: input_label.into(),
            output_label: output_label.into(),
        }
    }

    pub fn error(&self) -> &OpError {
        &self.error
    }

    pub fn overview(&self) -> String {
        // No output survives an error result.
        let label = format_io_label(&self.input_label, &self.output_label, false, true);
        match self.kind {
            JobKind::SignEncrypt if self.error.is_canceled() => {
                format!("{}: <b>Sign/encrypt canceled.</b>", label)
            }
            JobKind::SignEncrypt => format!("{}: Sign/encrypt failed.", label),
            JobKind::Sign => format!("{}: {}", label, make_overview(signing_overview(&self.error))),
            JobKind::Encrypt => format!(
                "{}: {}",
                label,
                make_overview(encryption_overview(&self.error))
            ),
        }
    }

    pub fn details(&self) -> String {
        self.error_string.clone()
    }

    pub fn error_code(&self) -> u32 {
        self.error.encoded()
    }

    pub fn error_string(&self) -> String {
        self.error_string.clone()
    }
}

/// Result of a completed backend operation.
///
/// Holds one outcome per performed half; at least one half is always
/// present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignEncryptFilesResult {
    outcome: JobOutcome,
    input_label: String,
    output_label: String,
    input_removed: bool,
    output_created: bool,
}

impl SignEncryptFilesResult {
    pub fn new(
        outcome: JobOutcome,
        input_label: impl Into<String>,
        output_label: impl Into<String>,
        input_removed: bool,
        output_created: bool,
    ) -> Self {
        Self {
            outcome,
            input_label: input_label.into(),
            output_label: output_label.into(),
            input_removed,
            output_created,
        }
    }

    pub fn signing(&self) -> Option<&SigningResult> {
        self.outcome.signing()
    }

    pub fn encryption(&self) -> Option<&EncryptionResult> {
        self.outcome.encryption()
    }

    pub fn input_removed(&self) -> bool {
        self.input_removed
    }

    pub fn output_created(&self) -> bool {
        self.output_created
    }

    /// Headline; the signing half takes priority when present.
    pub fn overview(&self) -> String {
        let files = format_io_label(
            &self.input_label,
            &self.output_label,
            self.input_removed,
            !self.output_created,
        );
        let headline = match (self.signing(), self.encryption()) {
            (Some(signing), _) => signing_overview(signing.error()),
            (None, Some(encryption)) => encryption_overview(encryption.error()),
            (None, None) => "",
        };
        format!("{}: {}", files, make_overview(headline))
    }

    pub fn details(&self) -> String {
        self.error_string()
    }

    pub fn error_code(&self) -> u32 {
        self.halves()
            .find(|err| err.is_err())
            .map(OpError::encoded)
            .unwrap_or(0)
    }

    pub fn error_string(&self) -> String {
        match &self.outcome {
            JobOutcome::SignedEncrypted(signing, encryption) => {
                if signing.error().is_err() {
                    signing_details(signing)
                } else if encryption.error().is_err() {
                    encryption_details(encryption)
                } else {
                    String::new()
                }
            }
            JobOutcome::Signed(signing) => signing_details(signing),
            JobOutcome::Encrypted(encryption) => encryption_details(encryption),
        }
    }

    pub fn visual_code(&self) -> VisualCode {
        if self.halves().any(OpError::is_canceled) {
            VisualCode::Warning
        } else if self.halves().any(OpError::is_err) {
            VisualCode::NeutralError
        } else {
            VisualCode::NeutralSuccess
        }
    }

    /// Error values of the performed halves, signing first.
    fn halves(&self) -> impl Iterator<Item = &OpError> {
        self.signing()
            .map(SigningResult::error)
            .into_iter()
            .chain(self.encryption().map(EncryptionResult::error))
    }
}
