pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;

pub use memory::MemoryStorage;
#[cfg(feature = "redis")]
pub use self::redis::RedisStorage;

use crate::StorageError;
use async_trait::async_trait;

/// This trait defines the operations a storage backend must provide to hold
/// the payloads of queued jobs. Every queue is an independent FIFO list
/// identified by its name.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Push a payload onto the tail of `queue`, creating the queue if it was never used.
    async fn enqueue(&self, queue: &str, payload: String) -> Result<(), StorageError>;

    /// Pop the payload at the head of `queue`.
    ///
    /// Returns `StorageError::EmptyQueue` when nothing is available. Backends
    /// may wait for a bounded time before giving up.
    async fn dequeue(&self, queue: &str) -> Result<String, StorageError>;

    /// Like `dequeue` but never waits for a payload to show up.
    async fn try_dequeue(&self, queue: &str) -> Result<String, StorageError> {
        self.dequeue(queue).await
    }
}

#[async_trait]
impl<S> Storage for std::sync::Arc<S>
where
    S: Storage + ?Sized,
{
    async fn enqueue(&self, queue: &str, payload: String) -> Result<(), StorageError> {
        (**self).enqueue(queue, payload).await
    }

    async fn dequeue(&self, queue: &str) -> Result<String, StorageError> {
        (**self).dequeue(queue).await
    }

    async fn try_dequeue(&self, queue: &str) -> Result<String, StorageError> {
        (**self).try_dequeue(queue).await
    }
}
