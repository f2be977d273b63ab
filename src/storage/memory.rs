use crate::Storage;
use crate::StorageError;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};

type Payloads = Arc<Mutex<VecDeque<String>>>;

/// Keeps queues in process memory. Nothing survives a restart, which makes it
/// the storage of choice for tests and development.
///
/// `dequeue` never waits: an empty or unknown queue is reported right away.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    queues: RwLock<HashMap<String, Payloads>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of payloads waiting on `queue`.
    pub fn len(&self, queue: &str) -> Result<usize, StorageError> {
        let Some(payloads) = self.find(queue)? else {
            return Ok(0);
        };

        let len = payloads.lock()?.len();
        Ok(len)
    }

    pub fn is_empty(&self, queue: &str) -> Result<bool, StorageError> {
        Ok(self.len(queue)? == 0)
    }

    fn find(&self, queue: &str) -> Result<Option<Payloads>, StorageError> {
        Ok(self.queues.read()?.get(queue).cloned())
    }

    fn find_or_create(&self, queue: &str) -> Result<Payloads, StorageError> {
        if let Some(payloads) = self.find(queue)? {
            return Ok(payloads);
        }

        let mut queues = self.queues.write()?;
        let payloads = queues.entry(queue.to_string()).or_default();

        Ok(payloads.clone())
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn enqueue(&self, queue: &str, payload: String) -> Result<(), StorageError> {
        let payloads = self.find_or_create(queue)?;
        payloads.lock()?.push_back(payload);

        Ok(())
    }

    async fn dequeue(&self, queue: &str) -> Result<String, StorageError> {
        let payloads = self.find(queue)?.ok_or(StorageError::EmptyQueue)?;
        let payload = payloads.lock()?.pop_front();

        payload.ok_or(StorageError::EmptyQueue)
    }
}
