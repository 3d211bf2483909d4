mod sqlite;

use std::{path::Path, time::Duration};

use miette::Result;
use tracing::warn;

pub use sqlite::Sqlite;

use crate::progress::{ProgressLevel, ProgressSink};

/// Where a tracked job currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl TaskState {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskState::Pending => "pending",
            TaskState::Processing => "processing",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
            TaskState::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TaskState::Pending),
            "processing" => Some(TaskState::Processing),
            "completed" => Some(TaskState::Completed),
            "failed" => Some(TaskState::Failed),
            "cancelled" => Some(TaskState::Cancelled),
            _ => None,
        }
    }

    /// A terminal task is eligible for stale cleanup.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Failed | TaskState::Cancelled
        )
    }
}

/// One tracked job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRecord {
    pub task_id: String,
    pub state: TaskState,
    pub url: String,
    pub start_time: String,
    pub end_time: String,
    /// Last milestone message, for cheap polling.
    pub progress: Option<String>,
    pub error_message: Option<String>,
    /// Unix seconds, set by the store on first insert.
    pub created_at: i64,
}

impl TaskRecord {
    pub fn new(task_id: impl Into<String>, url: impl Into<String>, start: &str, end: &str) -> Self {
        Self {
            task_id: task_id.into(),
            state: TaskState::Pending,
            url: url.into(),
            start_time: start.to_owned(),
            end_time: end.to_owned(),
            progress: None,
            error_message: None,
            created_at: 0,
        }
    }
}

/// One artifact produced for a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFileRecord {
    pub kind: String,
    pub file_name: String,
    pub file_path: String,
    pub file_size: Option<u64>,
}

/// One log line attached to a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskLogRecord {
    pub level: String,
    pub message: String,
    pub created_at: i64,
}

/// Per-state task counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskStats {
    pub total: usize,
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

/// A place to keep task rows, produced files, and log lines between
/// executions.
///
/// The pipeline itself never touches a store directly; it reports through
/// a [`ProgressSink`]. The surrounding task layer owns the records.
pub trait TaskStore
where
    Self: Sized + Sync,
{
    /// Open the store file at the given path or create it if it does not
    /// exist.
    ///
    /// If the file does exist but does not correspond to a valid store,
    /// an error **should** be returned.
    fn open(path: &Path) -> Result<Self>;

    /// Insert the task, or replace it wholesale if the id already exists.
    ///
    /// `created_at` is owned by the store: the caller's value is ignored
    /// on insert and preserved on replace.
    fn put_task(&self, task: &TaskRecord) -> Result<()>;

    fn get_task(&self, task_id: &str) -> Result<Option<TaskRecord>>;

    /// List tasks, newest first, optionally only those in one state.
    fn list_tasks(&self, filter: Option<TaskState>) -> Result<Vec<TaskRecord>>;

    /// Delete the task along with its file and log rows.
    fn delete_task(&self, task_id: &str) -> Result<()>;

    /// Record one produced artifact. A second record for the same
    /// (task, kind) **must** overwrite the first.
    fn record_file(&self, task_id: &str, kind: &str, path: &Path) -> Result<()>;

    fn files(&self, task_id: &str) -> Result<Vec<TaskFileRecord>>;

    fn append_log(&self, task_id: &str, level: &str, message: &str) -> Result<()>;

    /// Most recent log lines first.
    fn logs(&self, task_id: &str, limit: usize) -> Result<Vec<TaskLogRecord>>;

    fn stats(&self) -> Result<TaskStats>;

    /// Delete terminal tasks older than `age`. Artifact files are owned by
    /// the surrounding cleanup collaborator and are not touched here.
    /// Returns the number of tasks removed.
    fn delete_finished_before(&self, age: Duration) -> Result<usize>;
}

/// Sink that persists every milestone as a log row of one task.
pub struct StoreSink<'a, S: TaskStore> {
    store: &'a S,
    task_id: &'a str,
}

impl<'a, S: TaskStore> StoreSink<'a, S> {
    pub fn new(store: &'a S, task_id: &'a str) -> Self {
        Self { store, task_id }
    }
}

impl<S: TaskStore> ProgressSink for StoreSink<'_, S> {
    fn report(&self, level: ProgressLevel, message: &str) {
        if let Err(err) = self.store.append_log(self.task_id, level.as_str(), message) {
            warn!("Could not persist log line for task {}: {err}", self.task_id);
        }
    }
}
