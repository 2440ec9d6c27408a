//! Core task vocabulary shared by every task kind.
//!
//! # Lifecycle
//! ```text
//! Pending -> Running -> Completed
//! ```
//! There is no restart: a completed task stays completed.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::adapter::JobKind;
use super::result::TaskResult;
use crate::keys::Protocol;

/// Unique identifier for a task.
///
/// # Properties
/// - Globally unique within a process
/// - Immutable once created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Create a new unique task ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Status of a task in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    /// Configurable, not started yet
    Pending,
    /// A backend job is in flight
    Running,
    /// The result has been emitted
    Completed,
}

/// Events emitted by a started task.
///
/// `Started` comes first, `Finished` comes last and exactly once.
#[derive(Debug, Clone)]
pub enum TaskEvent {
    Started {
        task_id: TaskId,
        label: String,
        tag: String,
    },
    /// `total == 0` means the total is unknown.
    Progress {
        task_id: TaskId,
        message: String,
        current: u64,
        total: u64,
    },
    Finished {
        task_id: TaskId,
        result: Arc<TaskResult>,
    },
}

impl TaskEvent {
    pub fn task_id(&self) -> TaskId {
        match self {
            TaskEvent::Started { task_id, .. }
            | TaskEvent::Progress { task_id, .. }
            | TaskEvent::Finished { task_id, .. } => *task_id,
        }
    }
}

/// Handle to a started task.
pub struct TaskRun {
    pub events: mpsc::UnboundedReceiver<TaskEvent>,
    pub handle: JoinHandle<()>,
}

impl TaskRun {
    /// Drain events until the result arrives.
    ///
    /// Returns `None` only if the task driver died without reporting, which
    /// the task itself guards against.
    pub async fn wait(mut self) -> Option<Arc<TaskResult>> {
        while let Some(event) = self.events.recv().await {
            if let TaskEvent::Finished { result, .. } = event {
                return Some(result);
            }
        }
        None
    }
}

/// A unit of user-visible work producing exactly one [`TaskResult`].
pub trait Task: Send {
    fn id(&self) -> TaskId;

    /// Display label, usually the input file name.
    fn label(&self) -> String;

    /// Short category string, the protocol name for crypto tasks.
    fn tag(&self) -> String;

    fn protocol(&self) -> Result<Protocol, TaskError>;

    fn status(&self) -> TaskStatus;

    /// Begin the work without waiting for it.
    ///
    /// # Errors
    /// Returns `Err` for configuration errors; nothing is emitted then.
    fn start(&mut self) -> Result<TaskRun, TaskError>;

    /// Request cancellation. A no-op unless running.
    fn cancel(&self);
}

/// Errors that can occur when configuring or starting a task.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskError {
    #[error("Task has already been started")]
    AlreadyStarted,

    #[error("File name cannot be empty")]
    EmptyFileName,

    #[error("No {0} file set")]
    MissingFileName(&'static str),

    #[error("Signing requested but no signers given")]
    NoSigners,

    #[error("Neither signing nor encryption requested")]
    NothingToDo,

    #[error("Cannot determine protocol for task")]
    UndeterminedProtocol,

    #[error("No {0} backend available")]
    BackendUnavailable(Protocol),

    #[error("{protocol} backend cannot create a {kind} job")]
    JobUnavailable { protocol: Protocol, kind: JobKind },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_ids_are_unique() {
        assert_ne!(TaskId::new(), TaskId::new());
    }

    #[test]
    fn errors_name_the_protocol() {
        let err = TaskError::BackendUnavailable(Protocol::Smime);
        assert_eq!(err.to_string(), "No S/MIME backend available");
        let err = TaskError::JobUnavailable {
            protocol: Protocol::OpenPgp,
            kind: JobKind::SignEncrypt,
        };
        assert_eq!(
            err.to_string(),
            "OpenPGP backend cannot create a sign/encrypt job"
        );
    }
}
