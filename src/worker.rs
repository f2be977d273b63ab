use crate::registry::Registration;
use crate::JobFault;
use crate::SleepParams;
use crate::Storage;
use crate::DEFAULT_DRAIN_TIMEOUT;
use log::{debug, error, info};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use typed_builder::TypedBuilder;

/// What happened to a single popped payload.
#[derive(Debug)]
pub enum Dispatch {
    /// The job was decoded and performed to completion.
    Performed,
    /// The payload could not be decoded into the queue's job type and was dropped.
    DecodeFailed(serde_json::Error),
    /// The job was decoded but did not complete.
    Faulted(JobFault),
}

/// Consumes one queue: pops payloads, decodes them into the queue's job type
/// and performs them one at a time, in the order they were popped.
#[derive(TypedBuilder)]
pub struct QueueWorker<S, C>
where
    S: Storage + 'static,
    C: Send + Sync + 'static,
{
    #[builder(setter(into))]
    pub queue: String,
    pub storage: Arc<S>,
    pub context: Arc<C>,
    pub registration: Registration<C>,
    #[builder(default, setter(into))]
    pub sleep_params: SleepParams,
    #[builder(default = DEFAULT_DRAIN_TIMEOUT)]
    pub drain_timeout: Duration,
}

impl<S, C> Clone for QueueWorker<S, C>
where
    S: Storage + 'static,
    C: Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        QueueWorker {
            queue: self.queue.clone(),
            storage: self.storage.clone(),
            context: self.context.clone(),
            registration: self.registration.clone(),
            sleep_params: self.sleep_params.clone(),
            drain_timeout: self.drain_timeout,
        }
    }
}

impl<S, C> QueueWorker<S, C>
where
    S: Storage + 'static,
    C: Send + Sync + 'static,
{
    /// Decode `payload` and perform the job.
    ///
    /// The job runs in a task of its own, a panic inside it ends up as
    /// `Dispatch::Faulted` instead of unwinding through the worker.
    pub async fn dispatch(&self, payload: String) -> Dispatch {
        let job = match (self.registration.decoder)(&payload) {
            Ok(job) => job,
            Err(error) => {
                error!(
                    "Failed to decode job JSON, queue {}, error {}, payload {}",
                    self.queue, error, payload
                );

                return Dispatch::DecodeFailed(error);
            }
        };

        let context = self.context.clone();
        let handle = tokio::spawn(async move { job.perform(context.as_ref()).await });

        match handle.await {
            Ok(()) => Dispatch::Performed,
            Err(join_error) => {
                let fault = JobFault::from(join_error);

                error!("Panic in job, queue {}, error {}", self.queue, fault);

                Dispatch::Faulted(fault)
            }
        }
    }

    /// Keep consuming the queue until `token` is cancelled.
    ///
    /// An empty queue or a storage failure puts the worker to sleep for
    /// `sleep_params.sleep_period`, which grows while nothing comes in.
    /// A pop or a job that is already running is allowed to finish.
    pub async fn run_tasks(&mut self, token: &CancellationToken) {
        info!("starting a worker for queue {}", self.queue);

        while !token.is_cancelled() {
            match self.storage.dequeue(&self.queue).await {
                Ok(payload) => {
                    self.sleep_params.maybe_reset_sleep_period();
                    self.dispatch(payload).await;
                }
                Err(error) if error.is_empty_queue() => {
                    self.sleep(token).await;
                }
                Err(error) => {
                    error!("Failed to pop job, queue {}, error {:?}", self.queue, error);

                    self.sleep(token).await;
                }
            }
        }

        info!("worker for queue {} stopped", self.queue);
    }

    /// Perform whatever is queued right now and return the number of
    /// payloads popped.
    ///
    /// Stops at the first empty pop, at a pop that takes longer than
    /// `drain_timeout`, at a storage failure, or when `token` is cancelled.
    pub async fn run_tasks_until_none(&mut self, token: &CancellationToken) -> usize {
        let mut popped = 0;

        while !token.is_cancelled() {
            let pop = tokio::time::timeout(
                self.drain_timeout,
                self.storage.try_dequeue(&self.queue),
            )
            .await;

            match pop {
                Ok(Ok(payload)) => {
                    popped += 1;
                    self.dispatch(payload).await;
                }
                Ok(Err(error)) if error.is_empty_queue() => break,
                Ok(Err(error)) => {
                    error!("Failed to pop job, queue {}, error {:?}", self.queue, error);
                    break;
                }
                Err(_elapsed) => {
                    debug!(
                        "queue {} did not answer within {:?}",
                        self.queue, self.drain_timeout
                    );
                    break;
                }
            }
        }

        popped
    }

    pub async fn sleep(&mut self, token: &CancellationToken) {
        self.sleep_params.maybe_increase_sleep_period();

        tokio::select! {
            _ = token.cancelled() => {}
            _ = tokio::time::sleep(self.sleep_params.sleep_period) => {}
        }
    }
}
