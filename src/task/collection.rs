//! Running a batch of tasks and aggregating what they report.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

use super::result::TaskResult;
use super::task::{Task, TaskError, TaskEvent, TaskId, TaskRun, TaskStatus};

/// Events of a whole collection. `Done` comes last, once every started task
/// has reported.
#[derive(Debug, Clone)]
pub enum CollectionEvent {
    Started {
        task_id: TaskId,
        label: String,
        tag: String,
    },
    /// `current`/`total` are summed over all tasks that reported progress.
    Progress {
        task_id: TaskId,
        message: String,
        current: u64,
        total: u64,
    },
    Result {
        task_id: TaskId,
        result: Arc<TaskResult>,
    },
    Done,
}

#[derive(Debug, Default)]
struct Bookkeeping {
    expected: usize,
    completed: usize,
    error_occurred: bool,
    progress: HashMap<TaskId, (u64, u64)>,
    results: Vec<(TaskId, Arc<TaskResult>)>,
}

impl Bookkeeping {
    fn aggregate(&self) -> (u64, u64) {
        self.progress
            .values()
            .fold((0, 0), |(current, total), (c, t)| (current + c, total + t))
    }

    fn all_reported(&self) -> bool {
        self.completed >= self.expected
    }
}

/// Owns a set of tasks and reports on them as one unit.
#[derive(Default)]
pub struct TaskCollection {
    tasks: Vec<Box<dyn Task>>,
    state: Arc<Mutex<Bookkeeping>>,
}

impl TaskCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, task: Box<dyn Task>) {
        self.tasks.push(task);
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn statuses(&self) -> Vec<TaskStatus> {
        self.tasks.iter().map(|task| task.status()).collect()
    }

    /// Start every pending task.
    ///
    /// If a task refuses to start, the tasks started so far are cancelled
    /// and the error is returned; no further tasks are started.
    pub async fn start_all(&mut self) -> Result<mpsc::UnboundedReceiver<CollectionEvent>, TaskError> {
        let mut runs = Vec::with_capacity(self.tasks.len());
        for index in 0..self.tasks.len() {
            let task = &mut self.tasks[index];
            if task.status() != TaskStatus::Pending {
                continue;
            }
            match task.start() {
                Ok(run) => runs.push(run),
                Err(e) => {
                    tracing::warn!("Task {} failed to start: {}", task.label(), e);
                    self.cancel_all();
                    // Cancelled runs still report into the bookkeeping.
                    let (tx, _rx) = mpsc::unbounded_channel();
                    self.track(runs, tx).await;
                    return Err(e);
                }
            }
        }

        let (tx, rx) = mpsc::unbounded_channel();
        self.track(runs, tx).await;
        Ok(rx)
    }

    async fn track(&self, runs: Vec<TaskRun>, tx: mpsc::UnboundedSender<CollectionEvent>) {
        let done = {
            let mut book = self.state.lock().await;
            book.expected += runs.len();
            book.all_reported()
        };
        if done {
            let _ = tx.send(CollectionEvent::Done);
            return;
        }

        tracing::debug!("Started {} task(s)", runs.len());
        for run in runs {
            tokio::spawn(forward(run, self.state.clone(), tx.clone()));
        }
    }

    pub fn cancel_all(&self) {
        for task in &self.tasks {
            task.cancel();
        }
    }

    pub async fn number_of_completed_tasks(&self) -> usize {
        self.state.lock().await.completed
    }

    pub async fn all_tasks_completed(&self) -> bool {
        self.state.lock().await.completed == self.tasks.len()
    }

    /// Whether any task reported a non-zero error code.
    pub async fn error_occurred(&self) -> bool {
        self.state.lock().await.error_occurred
    }

    /// Results in completion order.
    pub async fn results(&self) -> Vec<(TaskId, Arc<TaskResult>)> {
        self.state.lock().await.results.clone()
    }
}

async fn forward(
    mut run: TaskRun,
    state: Arc<Mutex<Bookkeeping>>,
    tx: mpsc::UnboundedSender<CollectionEvent>,
) {
    let mut finished = false;
    while let Some(event) = run.events.recv().await {
        match event {
            TaskEvent::Started {
                task_id,
                label,
                tag,
            } => {
                let _ = tx.send(CollectionEvent::Started {
                    task_id,
                    label,
                    tag,
                });
            }
            TaskEvent::Progress {
                task_id,
                message,
                current,
                total,
            } => {
                let mut book = state.lock().await;
                book.progress.insert(task_id, (current, total));
                let (current, total) = book.aggregate();
                let _ = tx.send(CollectionEvent::Progress {
                    task_id,
                    message,
                    current,
                    total,
                });
            }
            TaskEvent::Finished { task_id, result } => {
                finished = true;
                let mut book = state.lock().await;
                book.completed += 1;
                book.error_occurred |= result.has_error();
                book.results.push((task_id, result.clone()));
                let _ = tx.send(CollectionEvent::Result { task_id, result });
                if book.all_reported() {
                    let _ = tx.send(CollectionEvent::Done);
                }
            }
        }
    }

    if !finished {
        tracing::warn!("Task ended without reporting a result");
        let mut book = state.lock().await;
        book.completed += 1;
        book.error_occurred = true;
        if book.all_reported() {
            let _ = tx.send(CollectionEvent::Done);
        }
    }
}
