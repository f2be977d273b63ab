use crate::Storage;
use crate::StorageError;
use async_trait::async_trait;
use log::{debug, warn};
use redis::aio::MultiplexedConnection;
use redis::Client;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use typed_builder::TypedBuilder;

pub const DEFAULT_POP_TIMEOUT: Duration = Duration::from_secs(10);

/// Keeps every queue in a Redis list named after it.
///
/// Payloads are appended with `RPUSH` and consumed with `BLPOP`, which waits
/// up to `pop_timeout` for something to show up before reporting an empty
/// queue. `BLPOP` takes whole seconds on every Redis version, so the timeout
/// is rounded up to the next second and never goes below one second: a zero
/// timeout would block forever. A Redis storage has to be connected before use:
///
///    ```rust
///         let mut storage = RedisStorage::builder()
///             .uri("redis://127.0.0.1/")
///             .pop_timeout(Duration::from_secs(5))
///             .build();
///
///         storage.connect().await.unwrap();
///    ```
#[derive(TypedBuilder, Clone)]
pub struct RedisStorage {
    #[builder(setter(into))]
    uri: String,
    #[builder(default = DEFAULT_POP_TIMEOUT)]
    pop_timeout: Duration,
    #[builder(default = None, setter(skip))]
    client: Option<Client>,
    #[builder(default = None, setter(skip))]
    connection: Option<MultiplexedConnection>,
    #[builder(default, setter(skip))]
    pop_connections: Arc<Mutex<HashMap<String, MultiplexedConnection>>>,
}

impl std::fmt::Debug for RedisStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStorage")
            .field("uri", &self.uri)
            .field("pop_timeout", &self.pop_timeout())
            .field("connected", &self.connection.is_some())
            .finish()
    }
}

impl RedisStorage {
    /// Connect to Redis if not connected
    pub async fn connect(&mut self) -> Result<(), StorageError> {
        if self.connection.is_some() {
            return Ok(());
        }

        let client = Client::open(self.uri.as_str())?;
        let connection = client.get_multiplexed_async_connection().await?;

        self.client = Some(client);
        self.connection = Some(connection);

        Ok(())
    }

    /// The timeout every `BLPOP` waits for, in whole seconds.
    pub fn pop_timeout(&self) -> Duration {
        Duration::from_secs(blocking_pop_seconds(self.pop_timeout))
    }

    fn push_connection(&self) -> Result<MultiplexedConnection, StorageError> {
        self.connection.clone().ok_or(StorageError::NotConnected)
    }

    // A pending BLPOP holds its connection until it returns, so blocking pops
    // never share the producers' connection. Each queue keeps one connection
    // for its pops, opened on first use and dropped after a failed command.
    async fn pop_connection(&self, queue: &str) -> Result<MultiplexedConnection, StorageError> {
        let client = self.client.as_ref().ok_or(StorageError::NotConnected)?;

        let cached = self.pop_connections.lock()?.get(queue).cloned();

        if let Some(connection) = cached {
            return Ok(connection);
        }

        let connection = client.get_multiplexed_async_connection().await?;

        let mut connections = self.pop_connections.lock()?;
        let connection = connections.entry(queue.to_string()).or_insert(connection);

        Ok(connection.clone())
    }

    fn forget_pop_connection(&self, queue: &str) -> Result<(), StorageError> {
        self.pop_connections.lock()?.remove(queue);

        Ok(())
    }

    /// Number of queues holding a connection for blocking pops.
    pub fn pop_connection_count(&self) -> Result<usize, StorageError> {
        Ok(self.pop_connections.lock()?.len())
    }

    /// Removes `queue` and everything still waiting on it.
    pub async fn clear(&self, queue: &str) -> Result<(), StorageError> {
        let mut connection = self.push_connection()?;

        let _: i64 = redis::cmd("DEL")
            .arg(queue)
            .query_async(&mut connection)
            .await?;

        Ok(())
    }

    /// Number of payloads waiting on `queue`.
    pub async fn len(&self, queue: &str) -> Result<usize, StorageError> {
        let mut connection = self.push_connection()?;

        let len: usize = redis::cmd("LLEN")
            .arg(queue)
            .query_async(&mut connection)
            .await?;

        Ok(len)
    }
}

#[async_trait]
impl Storage for RedisStorage {
    async fn enqueue(&self, queue: &str, payload: String) -> Result<(), StorageError> {
        let mut connection = self.push_connection()?;

        let _: i64 = redis::cmd("RPUSH")
            .arg(queue)
            .arg(payload)
            .query_async(&mut connection)
            .await?;

        Ok(())
    }

    async fn dequeue(&self, queue: &str) -> Result<String, StorageError> {
        let mut connection = self.pop_connection(queue).await?;

        // BLPOP replies with the key and the value, or nil on timeout
        let result: Result<Option<(String, String)>, redis::RedisError> = redis::cmd("BLPOP")
            .arg(queue)
            .arg(blocking_pop_seconds(self.pop_timeout))
            .query_async(&mut connection)
            .await;

        match result {
            Ok(Some((_key, payload))) => Ok(payload),
            Ok(None) => {
                debug!("redis queue {} is empty after {:?}", queue, self.pop_timeout());
                Err(StorageError::EmptyQueue)
            }
            Err(error) => {
                warn!("dropping pop connection of redis queue {}: {}", queue, error);
                self.forget_pop_connection(queue)?;

                Err(error.into())
            }
        }
    }

    async fn try_dequeue(&self, queue: &str) -> Result<String, StorageError> {
        let mut connection = self.push_connection()?;

        let popped: Option<String> = redis::cmd("LPOP")
            .arg(queue)
            .query_async(&mut connection)
            .await?;

        popped.ok_or(StorageError::EmptyQueue)
    }
}

fn blocking_pop_seconds(timeout: Duration) -> u64 {
    let seconds = timeout.as_secs();

    if timeout.subsec_nanos() > 0 {
        seconds + 1
    } else {
        seconds.max(1)
    }
}
