use async_trait::async_trait;

/// Implement this trait to run your custom jobs.
///
/// `C` is the job context handed to [`JobManager::new`](crate::JobManager::new):
/// database handles, clients, anything the jobs need. Every job performed by
/// the manager receives a reference to the same value.
///
/// A job is queued by value, so it also has to implement `serde::Serialize`
/// to be enqueued and `serde::Deserialize` to be registered. The payload
/// stored for a job is the plain JSON of its fields.
///
/// ```rust
/// use cynar::{async_trait, Job};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct SendWelcomeEmail {
///     address: String,
/// }
///
/// #[async_trait]
/// impl Job<Mailer> for SendWelcomeEmail {
///     async fn perform(&self, mailer: &Mailer) {
///         mailer.send(&self.address, "welcome!").await;
///     }
/// }
/// ```
#[async_trait]
pub trait Job<C>: Send + Sync + 'static {
    /// Execute the job. There is no result: a job that can not finish
    /// should panic, the panic is caught and logged by the worker.
    async fn perform(&self, context: &C);
}
