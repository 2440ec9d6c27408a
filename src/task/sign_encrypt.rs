//! Signing and/or encrypting one file into another.
//!
//! # State machine
//! ```text
//! Pending --start()--> Running --job finished--> Completed
//! ```
//! Setters only succeed while `Pending`. While `Running` the task holds the
//! cancellation token of its single job; the token is dropped on completion.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::adapter::{self, JobKind, PreparedJob};
use super::result::{ErrorResult, SignEncryptFilesResult, TaskResult};
use super::task::{Task, TaskError, TaskEvent, TaskId, TaskRun, TaskStatus};
use crate::backend::events::{JobEvent, JobOutcome};
use crate::backend::outcome::{codes, OpError};
use crate::backend::{BackendFactory, SignatureMode};
use crate::keys::{Key, Protocol};
use crate::resource::{label_for, Input, Output, ResourceError};

#[derive(Debug)]
enum Lifecycle {
    Pending,
    Running { cancel: CancellationToken },
    Completed,
}

impl Lifecycle {
    fn status(&self) -> TaskStatus {
        match self {
            Lifecycle::Pending => TaskStatus::Pending,
            Lifecycle::Running { .. } => TaskStatus::Running,
            Lifecycle::Completed => TaskStatus::Completed,
        }
    }
}

#[derive(Debug, Clone)]
struct Settings {
    input_file_name: Option<PathBuf>,
    output_file_name: Option<PathBuf>,
    signers: Vec<Key>,
    recipients: Vec<Key>,
    sign: bool,
    encrypt: bool,
    ascii_armor: bool,
    detached: bool,
    remove_input_on_success: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            input_file_name: None,
            output_file_name: None,
            signers: Vec::new(),
            recipients: Vec::new(),
            sign: true,
            encrypt: true,
            ascii_armor: true,
            detached: false,
            remove_input_on_success: false,
        }
    }
}

/// Signs and/or encrypts an input file into an output file.
pub struct SignEncryptFilesTask {
    id: TaskId,
    factory: Arc<BackendFactory>,
    settings: Settings,
    lifecycle: Arc<Mutex<Lifecycle>>,
}

impl SignEncryptFilesTask {
    pub fn new(factory: Arc<BackendFactory>) -> Self {
        Self {
            id: TaskId::new(),
            factory,
            settings: Settings::default(),
            lifecycle: Arc::new(Mutex::new(Lifecycle::Pending)),
        }
    }

    fn ensure_pending(&self) -> Result<(), TaskError> {
        match self.status() {
            TaskStatus::Pending => Ok(()),
            _ => Err(TaskError::AlreadyStarted),
        }
    }

    fn set_lifecycle(&self, next: Lifecycle) {
        let mut guard = self.lifecycle.lock().unwrap_or_else(|e| e.into_inner());
        *guard = next;
    }

    pub fn set_input_file_name(&mut self, name: impl AsRef<Path>) -> Result<(), TaskError> {
        self.ensure_pending()?;
        let name = name.as_ref();
        if name.as_os_str().is_empty() {
            return Err(TaskError::EmptyFileName);
        }
        self.settings.input_file_name = Some(name.to_path_buf());
        Ok(())
    }

    pub fn set_output_file_name(&mut self, name: impl AsRef<Path>) -> Result<(), TaskError> {
        self.ensure_pending()?;
        let name = name.as_ref();
        if name.as_os_str().is_empty() {
            return Err(TaskError::EmptyFileName);
        }
        self.settings.output_file_name = Some(name.to_path_buf());
        Ok(())
    }

    pub fn set_signers(&mut self, signers: Vec<Key>) -> Result<(), TaskError> {
        self.ensure_pending()?;
        self.settings.signers = signers;
        Ok(())
    }

    /// Recipients for encryption. Empty means symmetric encryption.
    pub fn set_recipients(&mut self, recipients: Vec<Key>) -> Result<(), TaskError> {
        self.ensure_pending()?;
        self.settings.recipients = recipients;
        Ok(())
    }

    pub fn set_sign(&mut self, sign: bool) -> Result<(), TaskError> {
        self.ensure_pending()?;
        self.settings.sign = sign;
        Ok(())
    }

    pub fn set_encrypt(&mut self, encrypt: bool) -> Result<(), TaskError> {
        self.ensure_pending()?;
        self.settings.encrypt = encrypt;
        Ok(())
    }

    pub fn set_remove_input_file_on_success(&mut self, remove: bool) -> Result<(), TaskError> {
        self.ensure_pending()?;
        self.settings.remove_input_on_success = remove;
        Ok(())
    }

    pub fn set_ascii_armor(&mut self, ascii: bool) -> Result<(), TaskError> {
        self.ensure_pending()?;
        self.settings.ascii_armor = ascii;
        Ok(())
    }

    /// Only affects sign-only tasks.
    pub fn set_detached_signature(&mut self, detached: bool) -> Result<(), TaskError> {
        self.ensure_pending()?;
        self.settings.detached = detached;
        Ok(())
    }

    pub fn input_file_name(&self) -> Option<&Path> {
        self.settings.input_file_name.as_deref()
    }

    pub fn output_file_name(&self) -> Option<&Path> {
        self.settings.output_file_name.as_deref()
    }

    pub fn signers(&self) -> &[Key] {
        &self.settings.signers
    }

    pub fn recipients(&self) -> &[Key] {
        &self.settings.recipients
    }

    pub fn sign(&self) -> bool {
        self.settings.sign
    }

    pub fn encrypt(&self) -> bool {
        self.settings.encrypt
    }

    pub fn ascii_armor(&self) -> bool {
        self.settings.ascii_armor
    }

    pub fn detached_signature(&self) -> bool {
        self.settings.detached
    }

    pub fn remove_input_file_on_success(&self) -> bool {
        self.settings.remove_input_on_success
    }

    fn prepare_job(&self, kind: JobKind, protocol: Protocol) -> Result<PreparedJob, TaskError> {
        let s = &self.settings;
        Ok(match kind {
            JobKind::Sign => PreparedJob::Sign {
                job: adapter::create_sign_job(&self.factory, protocol, s.ascii_armor)?,
                signers: s.signers.clone(),
                mode: if s.detached {
                    SignatureMode::Detached
                } else {
                    SignatureMode::Normal
                },
            },
            JobKind::Encrypt => PreparedJob::Encrypt {
                job: adapter::create_encrypt_job(&self.factory, protocol, s.ascii_armor)?,
                recipients: s.recipients.clone(),
            },
            JobKind::SignEncrypt => PreparedJob::SignEncrypt {
                job: adapter::create_sign_encrypt_job(&self.factory, protocol, s.ascii_armor)?,
                signers: s.signers.clone(),
                recipients: s.recipients.clone(),
            },
        })
    }
}

impl Task for SignEncryptFilesTask {
    fn id(&self) -> TaskId {
        self.id
    }

    fn label(&self) -> String {
        self.settings
            .input_file_name
            .as_deref()
            .map(label_for)
            .unwrap_or_default()
    }

    fn tag(&self) -> String {
        self.protocol()
            .map(|protocol| protocol.display_name().to_string())
            .unwrap_or_default()
    }

    /// First signer's protocol when signing, else first recipient's when
    /// encrypting, else OpenPGP for symmetric encryption.
    fn protocol(&self) -> Result<Protocol, TaskError> {
        let s = &self.settings;
        if s.sign {
            if let Some(signer) = s.signers.first() {
                return Ok(signer.protocol);
            }
        }
        if s.encrypt {
            return Ok(s
                .recipients
                .first()
                .map(|recipient| recipient.protocol)
                .unwrap_or(Protocol::OpenPgp));
        }
        Err(TaskError::UndeterminedProtocol)
    }

    fn status(&self) -> TaskStatus {
        self.lifecycle
            .lock()
            .map(|lifecycle| lifecycle.status())
            .unwrap_or_else(|e| e.into_inner().status())
    }

    /// Must be called from within a Tokio runtime.
    fn start(&mut self) -> Result<TaskRun, TaskError> {
        self.ensure_pending()?;
        let s = &self.settings;
        if s.sign && s.signers.is_empty() {
            return Err(TaskError::NoSigners);
        }
        let kind = JobKind::from_flags(s.sign, s.encrypt).ok_or(TaskError::NothingToDo)?;
        let input_path = s
            .input_file_name
            .clone()
            .ok_or(TaskError::MissingFileName("input"))?;
        let output_path = s
            .output_file_name
            .clone()
            .ok_or(TaskError::MissingFileName("output"))?;
        let protocol = self.protocol()?;
        let job = self.prepare_job(kind, protocol)?;

        let cancel = CancellationToken::new();
        self.set_lifecycle(Lifecycle::Running {
            cancel: cancel.clone(),
        });

        let (events, rx) = mpsc::unbounded_channel();
        let _ = events.send(TaskEvent::Started {
            task_id: self.id,
            label: self.label(),
            tag: protocol.display_name().to_string(),
        });
        tracing::info!(
            "Starting {} task {} for {} ({})",
            kind,
            self.id,
            input_path.display(),
            protocol
        );

        let driver = Driver {
            task_id: self.id,
            kind,
            input_label: label_for(&input_path),
            output_label: label_for(&output_path),
            input_path,
            output_path,
            remove_input: s.remove_input_on_success,
            lifecycle: self.lifecycle.clone(),
            events,
        };
        let handle = tokio::spawn(driver.run(job, cancel));

        Ok(TaskRun { events: rx, handle })
    }

    fn cancel(&self) {
        let guard = self.lifecycle.lock().unwrap_or_else(|e| e.into_inner());
        if let Lifecycle::Running { cancel } = &*guard {
            tracing::debug!("Cancelling task {}", self.id);
            cancel.cancel();
        }
    }
}

/// Owns everything a started task needs after `start` returned.
struct Driver {
    task_id: TaskId,
    kind: JobKind,
    input_path: PathBuf,
    output_path: PathBuf,
    input_label: String,
    output_label: String,
    remove_input: bool,
    lifecycle: Arc<Mutex<Lifecycle>>,
    events: mpsc::UnboundedSender<TaskEvent>,
}

impl Driver {
    async fn run(self, job: PreparedJob, cancel: CancellationToken) {
        let result = self.execute(job, cancel).await;

        if result.has_error() {
            tracing::info!(
                "Task {} finished with error {:#x}: {}",
                self.task_id,
                result.error_code(),
                result.error_string()
            );
        } else {
            tracing::info!("Task {} finished", self.task_id);
        }

        {
            let mut guard = self.lifecycle.lock().unwrap_or_else(|e| e.into_inner());
            *guard = Lifecycle::Completed;
        }
        let _ = self.events.send(TaskEvent::Finished {
            task_id: self.task_id,
            result: Arc::new(result),
        });
    }

    async fn execute(&self, job: PreparedJob, cancel: CancellationToken) -> TaskResult {
        let mut input = match Input::create_from_file(&self.input_path).await {
            Ok(input) => input,
            Err(e) => return self.resource_error(&e),
        };
        let mut output = match Output::create_from_file(&self.output_path, false).await {
            Ok(output) => output,
            Err(e) => return self.resource_error(&e),
        };
        let (Some(reader), Some(writer)) = (input.take_reader(), output.take_writer()) else {
            output.cancel().await;
            return self.internal_error("Resource streams already taken");
        };

        let mut run = job.spawn(reader, writer, cancel);
        while let Some(event) = run.events.recv().await {
            match event {
                JobEvent::Progress {
                    message,
                    current,
                    total,
                } => {
                    let _ = self.events.send(TaskEvent::Progress {
                        task_id: self.task_id,
                        message,
                        current,
                        total,
                    });
                }
                JobEvent::Finished(outcome) => return self.complete(outcome, &mut output).await,
            }
        }

        tracing::warn!("Job of task {} ended without a result", self.task_id);
        output.cancel().await;
        self.internal_error("Backend job ended without a result")
    }

    /// Commit or discard the output according to the outcome.
    async fn complete(&self, outcome: JobOutcome, output: &mut Output) -> TaskResult {
        let mut input_removed = false;
        let mut output_created = false;

        if outcome.has_error() {
            output.cancel().await;
        } else {
            if let Err(e) = output.finalize().await {
                tracing::warn!("Task {}: {}", self.task_id, e);
                return self.resource_error(&e);
            }
            output_created = true;
            if self.remove_input {
                match tokio::fs::remove_file(&self.input_path).await {
                    Ok(()) => input_removed = true,
                    Err(e) => tracing::warn!(
                        "Failed to remove input {}: {}",
                        self.input_path.display(),
                        e
                    ),
                }
            }
        }

        TaskResult::SignEncryptFiles(SignEncryptFilesResult::new(
            outcome,
            self.input_label.clone(),
            self.output_label.clone(),
            input_removed,
            output_created,
        ))
    }

    fn resource_error(&self, error: &ResourceError) -> TaskResult {
        self.error_result(error.to_op_error(), error.to_string())
    }

    fn internal_error(&self, message: &str) -> TaskResult {
        self.error_result(OpError::new(codes::INTERNAL, message), message.to_string())
    }

    fn error_result(&self, error: OpError, error_string: String) -> TaskResult {
        TaskResult::Error(ErrorResult::new(
            self.kind,
            error,
            error_string,
            self.input_label.clone(),
            self.output_label.clone(),
        ))
    }
}
