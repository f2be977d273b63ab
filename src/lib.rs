#![doc = include_str!("../README.md")]

use std::time::Duration;
use typed_builder::TypedBuilder;

pub mod error;
pub mod job;
pub mod manager;
pub mod registry;
pub mod storage;
pub mod worker;

pub use error::{CynarError, JobFault, StorageError};
pub use job::Job;
pub use manager::JobManager;
pub use registry::QueueRegistry;
pub use storage::MemoryStorage;
#[cfg(feature = "redis")]
pub use storage::RedisStorage;
pub use storage::Storage;
pub use worker::{Dispatch, QueueWorker};

#[doc(hidden)]
pub use async_trait::async_trait;

pub use tokio_util::sync::CancellationToken;

/// Configuration parameters for putting workers to sleep
/// while their queue has nothing to pop
#[derive(Clone, Debug, TypedBuilder)]
pub struct SleepParams {
    /// the current sleep period
    pub sleep_period: Duration,
    /// the maximum period a worker is allowed to sleep.
    /// After this value is reached, `sleep_period` is not increased anymore
    pub max_sleep_period: Duration,
    /// the initial value of the `sleep_period`
    pub min_sleep_period: Duration,
    /// the step that `sleep_period` is increased by on every iteration
    pub sleep_step: Duration,
}

impl SleepParams {
    /// Reset the `sleep_period` if `sleep_period` > `min_sleep_period`
    pub fn maybe_reset_sleep_period(&mut self) {
        if self.sleep_period != self.min_sleep_period {
            self.sleep_period = self.min_sleep_period;
        }
    }

    /// Increase the `sleep_period` by the `sleep_step` if the `max_sleep_period` is not reached
    pub fn maybe_increase_sleep_period(&mut self) {
        if self.sleep_period < self.max_sleep_period {
            self.sleep_period = (self.sleep_period + self.sleep_step).min(self.max_sleep_period);
        }
    }
}

impl Default for SleepParams {
    fn default() -> Self {
        SleepParams {
            sleep_period: Duration::from_millis(10),
            max_sleep_period: Duration::from_millis(500),
            min_sleep_period: Duration::from_millis(10),
            sleep_step: Duration::from_millis(10),
        }
    }
}

/// Settings shared by every worker a [`JobManager`] starts.
#[derive(Clone, Debug, TypedBuilder)]
pub struct WorkerConfig {
    /// Backoff used by the continuous loop when a queue is empty
    /// or the storage reports a transport failure.
    #[builder(default, setter(into))]
    pub sleep_params: SleepParams,
    /// Upper bound for a single pop during a bounded drain
    /// (`JobManager::process_queue`). A pop that takes longer ends the drain.
    #[builder(default = DEFAULT_DRAIN_TIMEOUT)]
    pub drain_timeout: Duration,
}

pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_millis(50);

impl Default for WorkerConfig {
    fn default() -> Self {
        WorkerConfig::builder().build()
    }
}

#[cfg(test)]
mod sleep_params_tests {
    use super::SleepParams;
    use std::time::Duration;

    #[test]
    fn increases_up_to_max_and_resets() {
        let mut params = SleepParams::builder()
            .sleep_period(Duration::from_millis(10))
            .min_sleep_period(Duration::from_millis(10))
            .max_sleep_period(Duration::from_millis(25))
            .sleep_step(Duration::from_millis(10))
            .build();

        params.maybe_increase_sleep_period();
        assert_eq!(Duration::from_millis(20), params.sleep_period);

        params.maybe_increase_sleep_period();
        assert_eq!(Duration::from_millis(25), params.sleep_period);

        params.maybe_increase_sleep_period();
        assert_eq!(Duration::from_millis(25), params.sleep_period);

        params.maybe_reset_sleep_period();
        assert_eq!(Duration::from_millis(10), params.sleep_period);
    }
}
