pub mod http_fetcher;
pub mod parallel;

use std::fmt;

use async_trait::async_trait;
use serde_json::Value;

use crate::app::error::NetworkError;
use crate::domain::ItemId;

/// Something the transport can fetch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Resource {
    /// Ranked id list of the current top stories (item API).
    TopStories,
    /// A single story or comment record (item API).
    Item(ItemId),
    /// Front-page hits from the search index.
    FrontPage { hits: usize },
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::TopStories => f.write_str("topstories"),
            Resource::Item(id) => write!(f, "item/{}", id),
            Resource::FrontPage { hits } => write!(f, "front_page?hits={}", hits),
        }
    }
}

#[async_trait]
pub trait Fetcher {
    async fn fetch(&self, resource: &Resource) -> Result<Value, NetworkError>;
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;

    /// Scripted transport for tests: canned responses per resource, an
    /// optional per-resource delay, and counters for calls and peak
    /// concurrency.
    #[derive(Default)]
    pub struct FakeFetcher {
        responses: Mutex<HashMap<Resource, Result<Value, NetworkError>>>,
        delays: Mutex<HashMap<Resource, Duration>>,
        default_delay: Duration,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl FakeFetcher {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_default_delay(delay: Duration) -> Self {
            Self {
                default_delay: delay,
                ..Self::default()
            }
        }

        pub fn respond(&self, resource: Resource, value: Value) {
            self.responses.lock().unwrap().insert(resource, Ok(value));
        }

        pub fn fail(&self, resource: Resource) {
            let err = NetworkError::Status {
                resource: resource.to_string(),
                status: 503,
            };
            self.responses.lock().unwrap().insert(resource, Err(err));
        }

        pub fn delay(&self, resource: Resource, delay: Duration) {
            self.delays.lock().unwrap().insert(resource, delay);
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn peak_concurrency(&self) -> usize {
            self.peak.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Fetcher for FakeFetcher {
        async fn fetch(&self, resource: &Resource) -> Result<Value, NetworkError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            let delay = self
                .delays
                .lock()
                .unwrap()
                .get(resource)
                .copied()
                .unwrap_or(self.default_delay);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let response = self.responses.lock().unwrap().get(resource).cloned();
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            response.unwrap_or_else(|| {
                Err(NetworkError::Status {
                    resource: resource.to_string(),
                    status: 404,
                })
            })
        }
    }
}
