use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::Semaphore;

use crate::app::error::{FetchError, NetworkError};
use crate::domain::{Item, ItemId, RawRecord, SourceKind};
use crate::fetcher::{Fetcher, Resource};
use crate::normalizer::Normalizer;

pub const DEFAULT_WORKERS: usize = 10;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Bounded-concurrency fan-out over a [`Fetcher`].
///
/// Results always line up with the input: slot `i` of the output belongs
/// to resource `i`, whatever order the requests complete in.
pub struct ParallelFetcher {
    fetcher: Arc<dyn Fetcher + Send + Sync>,
    semaphore: Arc<Semaphore>,
    workers: usize,
    normalizer: Normalizer,
    timeout: Duration,
}

impl ParallelFetcher {
    pub fn new(fetcher: Arc<dyn Fetcher + Send + Sync>) -> Self {
        Self::with_workers(fetcher, DEFAULT_WORKERS)
    }

    pub fn with_workers(fetcher: Arc<dyn Fetcher + Send + Sync>, workers: usize) -> Self {
        let workers = workers.max(1);
        Self {
            fetcher,
            semaphore: Arc::new(Semaphore::new(workers)),
            workers,
            normalizer: Normalizer::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn fetcher(&self) -> &Arc<dyn Fetcher + Send + Sync> {
        &self.fetcher
    }

    /// Fetch item records by id and normalize them.
    pub async fn fetch_many(&self, ids: &[ItemId]) -> Vec<Result<Item, FetchError>> {
        let resources = ids.iter().cloned().map(Resource::Item).collect();

        self.fetch_raw(resources)
            .await
            .into_iter()
            .map(|slot| -> Result<Item, FetchError> {
                let value = slot?;
                let raw = RawRecord::decode(SourceKind::Item, value)?;
                Ok(self.normalizer.normalize(raw)?)
            })
            .collect()
    }

    /// Fetch raw JSON for every resource, one outcome per input slot.
    pub async fn fetch_raw(&self, resources: Vec<Resource>) -> Vec<Result<Value, FetchError>> {
        if resources.is_empty() {
            return Vec::new();
        }

        let total = resources.len();
        let mut handles = Vec::with_capacity(total);

        for resource in resources {
            let fetcher = self.fetcher.clone();
            let semaphore = self.semaphore.clone();
            let timeout = self.timeout;

            let handle = tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| FetchError::Aborted(e.to_string()))?;

                match tokio::time::timeout(timeout, fetcher.fetch(&resource)).await {
                    Ok(result) => result.map_err(FetchError::from),
                    Err(_) => Err(FetchError::Network(NetworkError::Timeout {
                        resource: resource.to_string(),
                    })),
                }
            });

            handles.push(handle);
        }

        let mut results = Vec::with_capacity(total);
        for handle in handles {
            match handle.await {
                Ok(result) => results.push(result),
                Err(e) => {
                    tracing::error!("Task join error: {}", e);
                    results.push(Err(FetchError::Aborted(e.to_string())));
                }
            }
        }

        let failed = results.iter().filter(|r| r.is_err()).count();
        tracing::debug!("Fan-out finished: {} ok, {} failed", total - failed, failed);

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::testing::FakeFetcher;
    use serde_json::json;

    fn story(id: u64) -> Value {
        json!({"id": id, "title": format!("Story {}", id), "score": id, "time": 1_600_000_000 + id})
    }

    fn parallel(fake: Arc<FakeFetcher>, workers: usize) -> ParallelFetcher {
        ParallelFetcher::with_workers(fake, workers)
    }

    #[tokio::test]
    async fn test_fetch_many_empty() {
        let fake = Arc::new(FakeFetcher::new());
        let results = parallel(fake.clone(), 4).fetch_many(&[]).await;
        assert!(results.is_empty());
        assert_eq!(fake.calls(), 0);
    }

    #[tokio::test]
    async fn test_middle_failure_keeps_slots() {
        let fake = Arc::new(FakeFetcher::new());
        fake.respond(Resource::Item(1u64.into()), story(1));
        fake.fail(Resource::Item(2u64.into()));
        fake.respond(Resource::Item(3u64.into()), story(3));

        let ids = [ItemId::from(1u64), ItemId::from(2u64), ItemId::from(3u64)];
        let results = parallel(fake, 4).fetch_many(&ids).await;

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap().id, ItemId::from(1u64));
        assert!(matches!(
            results[1],
            Err(FetchError::Network(NetworkError::Status { status: 503, .. }))
        ));
        assert_eq!(results[2].as_ref().unwrap().id, ItemId::from(3u64));
    }

    #[tokio::test]
    async fn test_order_preserved_when_completion_reversed() {
        let fake = Arc::new(FakeFetcher::new());
        for id in 1..=5u64 {
            fake.respond(Resource::Item(id.into()), story(id));
            // Earlier ids finish last.
            fake.delay(Resource::Item(id.into()), Duration::from_millis(60 - id * 10));
        }

        let ids: Vec<ItemId> = (1..=5u64).map(ItemId::from).collect();
        let results = parallel(fake, 5).fetch_many(&ids).await;

        let got: Vec<ItemId> = results.into_iter().map(|r| r.unwrap().id).collect();
        assert_eq!(got, ids);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let fake = Arc::new(FakeFetcher::with_default_delay(Duration::from_millis(10)));
        for id in 0..40u64 {
            fake.respond(Resource::Item(id.into()), story(id));
        }

        let ids: Vec<ItemId> = (0..40u64).map(ItemId::from).collect();
        let results = parallel(fake.clone(), 3).fetch_many(&ids).await;

        assert_eq!(results.len(), 40);
        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(fake.calls(), 40);
        assert!(fake.peak_concurrency() <= 3, "peak was {}", fake.peak_concurrency());
    }

    #[tokio::test]
    async fn test_timeout_fails_only_its_slot() {
        let fake = Arc::new(FakeFetcher::new());
        fake.respond(Resource::Item(1u64.into()), story(1));
        fake.respond(Resource::Item(2u64.into()), story(2));
        fake.delay(Resource::Item(2u64.into()), Duration::from_secs(5));

        let results = parallel(fake, 2)
            .timeout(Duration::from_millis(50))
            .fetch_many(&[ItemId::from(1u64), ItemId::from(2u64)])
            .await;

        assert!(results[0].is_ok());
        assert!(matches!(
            results[1],
            Err(FetchError::Network(NetworkError::Timeout { .. }))
        ));
    }

    #[tokio::test]
    async fn test_all_failed_is_not_escalated() {
        let fake = Arc::new(FakeFetcher::new());
        let ids: Vec<ItemId> = (1..=3u64).map(ItemId::from).collect();
        let results = parallel(fake, 2).fetch_many(&ids).await;

        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| matches!(r, Err(FetchError::Network(_)))));
    }

    #[tokio::test]
    async fn test_null_and_untitled_records_are_schema_errors() {
        let fake = Arc::new(FakeFetcher::new());
        fake.respond(Resource::Item(1u64.into()), Value::Null);
        fake.respond(Resource::Item(2u64.into()), json!({"id": 2}));

        let results = parallel(fake, 2)
            .fetch_many(&[ItemId::from(1u64), ItemId::from(2u64)])
            .await;

        assert!(matches!(results[0], Err(FetchError::Schema(_))));
        assert!(matches!(results[1], Err(FetchError::Schema(_))));
    }

    #[tokio::test]
    async fn test_fetch_raw_passes_values_through() {
        let fake = Arc::new(FakeFetcher::new());
        fake.respond(Resource::TopStories, json!([3, 2, 1]));

        let results = parallel(fake, 1).fetch_raw(vec![Resource::TopStories]).await;
        assert_eq!(results, vec![Ok(json!([3, 2, 1]))]);
    }
}
