//! # file-sealer
//!
//! Sign and/or encrypt files as cancellable background tasks.
//!
//! ## Architecture
//!
//! ```text
//!   TaskCollection ──► SignEncryptFilesTask ──► adapter ──► CryptoBackend job
//!         ▲                   │                               │
//!         │                   ▼                               ▼
//!     TaskResult ◄──── Input / Output                 progress + outcome
//! ```
//!
//! ## Task Flow
//! 1. Configure a task (files, keys, flags); setters fail once started
//! 2. `start()` resolves the protocol and backend job, then spawns it
//! 3. Progress events stream while the job runs
//! 4. The output is committed or discarded and exactly one result is emitted
//!
//! ## Modules
//! - `task`: tasks, results, error classification, collections
//! - `backend`: job traits, backend factory, the local software backend
//! - `resource`: input files and provisional output files
//! - `keys`: keys, protocols and the on-disk keyring

pub mod backend;
pub mod cli;
pub mod config;
pub mod keys;
pub mod resource;
pub mod task;
pub mod util;

pub use backend::BackendFactory;
pub use config::Config;
pub use keys::{Key, Keyring, Protocol};
pub use task::{SignEncryptFilesTask, Task, TaskCollection, TaskResult, VisualCode};
