use crate::CynarError;
use crate::Job;
use serde::de::DeserializeOwned;
use std::any::{type_name, TypeId};
use std::collections::HashMap;

/// Builds a job of the type registered for a queue out of its payload.
pub type Decoder<C> = fn(&str) -> Result<Box<dyn Job<C>>, serde_json::Error>;

/// What the registry knows about the job type of a queue.
pub struct Registration<C> {
    pub type_name: &'static str,
    pub decoder: Decoder<C>,
}

// derive(Clone) would require `C: Clone`
impl<C> Clone for Registration<C> {
    fn clone(&self) -> Self {
        Registration {
            type_name: self.type_name,
            decoder: self.decoder,
        }
    }
}

/// Two-way mapping between queue names and the job types routed through them.
pub struct QueueRegistry<C> {
    jobs: HashMap<String, Registration<C>>,
    queues: HashMap<TypeId, String>,
}

impl<C> Clone for QueueRegistry<C> {
    fn clone(&self) -> Self {
        QueueRegistry {
            jobs: self.jobs.clone(),
            queues: self.queues.clone(),
        }
    }
}

impl<C> Default for QueueRegistry<C> {
    fn default() -> Self {
        QueueRegistry {
            jobs: HashMap::new(),
            queues: HashMap::new(),
        }
    }
}

impl<C> QueueRegistry<C>
where
    C: Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes jobs of type `J` through the queue `name`.
    ///
    /// A queue carries exactly one job type and a job type belongs to exactly
    /// one queue, so registering either side a second time is an error.
    pub fn register<J>(&mut self, name: impl Into<String>) -> Result<(), CynarError>
    where
        J: Job<C> + DeserializeOwned,
    {
        let name = name.into();
        let type_id = TypeId::of::<J>();

        if self.jobs.contains_key(&name) {
            return Err(CynarError::QueueAlreadyRegistered(name));
        }

        if let Some(queue) = self.queues.get(&type_id) {
            return Err(CynarError::JobAlreadyRegistered {
                type_name: short_type_name::<J>(),
                queue: queue.clone(),
            });
        }

        let registration = Registration {
            type_name: short_type_name::<J>(),
            decoder: decode_job::<C, J>,
        };

        self.jobs.insert(name.clone(), registration);
        self.queues.insert(type_id, name);

        Ok(())
    }

    /// The queue registered for jobs of type `J`.
    pub fn queue_for<J>(&self) -> Result<&str, CynarError>
    where
        J: Job<C>,
    {
        self.queues
            .get(&TypeId::of::<J>())
            .map(String::as_str)
            .ok_or(CynarError::UnregisteredJobType {
                type_name: short_type_name::<J>(),
            })
    }

    pub fn get(&self, queue: &str) -> Option<&Registration<C>> {
        self.jobs.get(queue)
    }

    pub fn contains(&self, queue: &str) -> bool {
        self.jobs.contains_key(queue)
    }

    /// Registered queue names, sorted.
    pub fn queue_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.jobs.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

fn decode_job<C, J>(payload: &str) -> Result<Box<dyn Job<C>>, serde_json::Error>
where
    C: Send + Sync + 'static,
    J: Job<C> + DeserializeOwned,
{
    let job: J = serde_json::from_str(payload)?;
    Ok(Box::new(job))
}

/// `my_app::jobs::Greeting` -> `Greeting`, keeping generic arguments intact.
pub(crate) fn short_type_name<T: ?Sized>() -> &'static str {
    let full = type_name::<T>();
    let path = match full.find('<') {
        Some(generics) => &full[..generics],
        None => full,
    };

    match path.rfind("::") {
        Some(idx) => &full[idx + 2..],
        None => full,
    }
}
