use std::sync::PoisonError;
use thiserror::Error;
use tokio::task::JoinError;

/// Errors reported by a [`Storage`](crate::Storage) backend.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Nothing is available on the queue right now. Workers treat it as
    /// the signal to back off, not as a failure.
    #[error("nothing to pop")]
    EmptyQueue,
    #[error("The shared state of the memory storage became poisoned")]
    PoisonedLock,
    #[error("Storage is not connected, call connect() method first and then perform operations")]
    NotConnected,
    #[cfg(feature = "redis")]
    #[error(transparent)]
    Redis(#[from] redis::RedisError),
}

impl StorageError {
    pub fn is_empty_queue(&self) -> bool {
        matches!(self, StorageError::EmptyQueue)
    }
}

impl<T> From<PoisonError<T>> for StorageError {
    fn from(_: PoisonError<T>) -> Self {
        Self::PoisonedLock
    }
}

/// Errors returned to callers of [`JobManager`](crate::JobManager).
#[derive(Error, Debug)]
pub enum CynarError {
    #[error("failed to find queue for {type_name}")]
    UnregisteredJobType { type_name: &'static str },
    #[error("queue {0} is already registered")]
    QueueAlreadyRegistered(String),
    #[error("{type_name} is already registered for queue {queue}")]
    JobAlreadyRegistered {
        type_name: &'static str,
        queue: String,
    },
    #[error("queue {0} is not registered")]
    UnknownQueue(String),
    #[error("failed to encode job: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to push job to storage: {0}")]
    Storage(#[from] StorageError),
}

/// A fault raised while a job was performing. The dispatch boundary turns it
/// into a log entry and keeps the worker going.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobFault {
    #[error("job panicked: {0}")]
    Panicked(String),
    #[error("job was cancelled before it completed")]
    Cancelled,
}

impl From<JoinError> for JobFault {
    fn from(error: JoinError) -> Self {
        if !error.is_panic() {
            return JobFault::Cancelled;
        }

        let panic = error.into_panic();
        let message = if let Some(message) = panic.downcast_ref::<&str>() {
            message.to_string()
        } else if let Some(message) = panic.downcast_ref::<String>() {
            message.clone()
        } else {
            "Unknown panic".to_string()
        };

        JobFault::Panicked(message)
    }
}
