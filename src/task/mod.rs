//! Task module - user-visible units of cryptographic work and their results.
//!
//! - [`SignEncryptFilesTask`]: signs and/or encrypts one file.
//! - [`TaskResult`]: the single immutable result every task emits.
//! - [`TaskCollection`]: runs several tasks and aggregates their reports.

pub mod adapter;
pub mod classify;
pub mod collection;
pub mod result;
pub mod sign_encrypt;
#[allow(clippy::module_inception)]
pub mod task;

pub use adapter::JobKind;
pub use collection::{CollectionEvent, TaskCollection};
pub use result::{ErrorResult, SignEncryptFilesResult, TaskResult, VisualCode};
pub use sign_encrypt::SignEncryptFilesTask;
pub use task::{Task, TaskError, TaskEvent, TaskId, TaskRun, TaskStatus};
