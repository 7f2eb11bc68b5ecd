use thiserror::Error;

use crate::models::{QueueRecordId, TaskType};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum CoreErrorKind {
    InvalidInput,
    NotFound,
    StorageFailure,
    ExecutionFailure,
    Configuration,
    Internal,
}

#[derive(Clone, Debug, Eq, PartialEq, Error)]
#[error("{kind:?}: {message}")]
pub struct CoreError {
    pub task: Option<TaskType>,
    pub record: Option<QueueRecordId>,
    pub kind: CoreErrorKind,
    pub message: String,
}

impl CoreError {
    pub fn new(kind: CoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            task: None,
            record: None,
            kind,
            message: message.into(),
        }
    }

    pub fn with_task(mut self, task: TaskType) -> Self {
        self.task = self.task.or(Some(task));
        self
    }

    pub fn with_record(mut self, record: QueueRecordId) -> Self {
        self.record = self.record.or(Some(record));
        self
    }
}
