
use crate::worker::QueueWorker;
use crate::CynarError;
use crate::Job;
use crate::QueueRegistry;
use crate::Storage;
use crate::WorkerConfig;
use log::{error, info};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Publishes jobs to named queues and runs the workers that perform them.
///
/// The job context passed to [`JobManager::new`] is handed to every job's
/// `perform`, so resources like database pools can reach background jobs.
///
/// ```rust
///     let mut manager = JobManager::new(MemoryStorage::new(), db_pool);
///     manager.register_queue::<SendWelcomeEmail>("emails")?;
///
///     manager.enqueue(&SendWelcomeEmail { address }).await?;
///
///     let token = CancellationToken::new();
///     manager.run(token.clone()).await;
/// ```
pub struct JobManager<S, C>
where
    S: Storage + 'static,
    C: Send + Sync + 'static,
{
    storage: Arc<S>,
    context: Arc<C>,
    registry: Arc<QueueRegistry<C>>,
    config: WorkerConfig,
}

impl<S, C> JobManager<S, C>
where
    S: Storage + 'static,
    C: Send + Sync + 'static,
{
    pub fn new(storage: S, context: C) -> Self {
        Self::with_config(storage, context, WorkerConfig::default())
    }

    pub fn with_config(storage: S, context: C, config: WorkerConfig) -> Self {
        JobManager {
            storage: Arc::new(storage),
            context: Arc::new(context),
            registry: Arc::new(QueueRegistry::new()),
            config,
        }
    }

    /// Registers a queue named `name` for jobs of type `J`.
    ///
    /// Queues have to be registered before `run` is called, workers that are
    /// already running do not see later registrations.
    pub fn register_queue<J>(&mut self, name: impl Into<String>) -> Result<(), CynarError>
    where
        J: Job<C> + DeserializeOwned,
    {
        Arc::make_mut(&mut self.registry).register::<J>(name)
    }

    /// Pushes `job` onto the queue registered for its type.
    pub async fn enqueue<J>(&self, job: &J) -> Result<(), CynarError>
    where
        J: Job<C> + Serialize,
    {
        let queue = self.registry.queue_for::<J>()?;
        let payload = serde_json::to_string(job)?;

        self.storage.enqueue(queue, payload).await?;

        Ok(())
    }

    /// Starts a worker for every registered queue and waits until `token`
    /// is cancelled. Returns once all workers have stopped.
    ///
    /// A worker that dies outside of a job (a storage implementation
    /// panicking, for example) is restarted until the token is cancelled.
    pub async fn run(&self, token: CancellationToken) {
        let queues = self.registry.queue_names();

        info!("starting job manager, queues {:?}", queues);

        let mut handles: Vec<JoinHandle<()>> = Vec::with_capacity(queues.len());

        for queue in queues {
            match self.worker(&queue) {
                Ok(worker) => {
                    info!("starting queue {}", queue);
                    handles.push(tokio::spawn(Self::supervise_worker(worker, token.clone())));
                }
                Err(error) => error!("Failed to start queue {}: {}", queue, error),
            }
        }

        token.cancelled().await;

        for handle in handles {
            if let Err(error) = handle.await {
                error!("Worker supervisor failed: {:?}", error);
            }
        }

        info!("job manager stopped");
    }

    /// Restarts the worker of a queue whenever its task dies outside a job.
    /// Restarts back off with the worker's own `SleepParams`, so a storage
    /// that fails on every pop can not spin the supervisor.
    async fn supervise_worker(worker: QueueWorker<S, C>, token: CancellationToken) {
        let mut restarts: u64 = 0;
        let mut restart_sleep = worker.sleep_params.clone();

        loop {
            let mut current = worker.clone();
            let child_token = token.clone();
            let join_handle = tokio::spawn(async move { current.run_tasks(&child_token).await });

            match join_handle.await {
                Ok(()) => break,
                Err(_) if token.is_cancelled() => break,
                Err(error) => {
                    restarts += 1;

                    error!(
                        "Worker for queue {} stopped. Restarting. The number of restarts {}, error {:?}",
                        worker.queue, restarts, error
                    );

                    restart_sleep.maybe_increase_sleep_period();

                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = tokio::time::sleep(restart_sleep.sleep_period) => {}
                    }
                }
            }
        }
    }

    /// Performs the jobs currently waiting on `queue` and returns how many
    /// payloads were popped. Meant for tests, where `run` would never return.
    pub async fn process_queue(
        &self,
        token: &CancellationToken,
        queue: &str,
    ) -> Result<usize, CynarError> {
        let mut worker = self.worker(queue)?;

        Ok(worker.run_tasks_until_none(token).await)
    }

    /// `process_queue` for every registered queue, one queue after another.
    pub async fn process_all(&self, token: &CancellationToken) -> usize {
        let mut popped = 0;

        for queue in self.registry.queue_names() {
            if token.is_cancelled() {
                break;
            }

            match self.process_queue(token, &queue).await {
                Ok(count) => popped += count,
                Err(error) => error!("Failed to process queue {}: {}", queue, error),
            }
        }

        popped
    }

    /// Names of the registered queues, sorted.
    pub fn queues(&self) -> Vec<String> {
        self.registry.queue_names()
    }

    pub fn context(&self) -> &C {
        &self.context
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    fn worker(&self, queue: &str) -> Result<QueueWorker<S, C>, CynarError> {
        let registration = self
            .registry
            .get(queue)
            .ok_or_else(|| CynarError::UnknownQueue(queue.to_string()))?
            .clone();

        Ok(QueueWorker::builder()
            .queue(queue)
            .storage(self.storage.clone())
            .context(self.context.clone())
            .registration(registration)
            .sleep_params(self.config.sleep_params.clone())
            .drain_timeout(self.config.drain_timeout)
            .build())
    }
}
