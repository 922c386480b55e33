use std::sync::Arc;

use crate::aggregator::Aggregator;
use crate::app::error::Result;
use crate::cache::AggregationCache;
use crate::comments::TreeLimits;
use crate::config::Config;
use crate::fetcher::http_fetcher::HttpFetcher;
use crate::fetcher::parallel::ParallelFetcher;
use crate::fetcher::Fetcher;

pub struct AppContext {
    pub config: Config,
    pub parallel_fetcher: Arc<ParallelFetcher>,
    pub aggregator: Aggregator,
}

impl AppContext {
    pub fn new(config: Config) -> Result<Self> {
        let fetcher: Arc<dyn Fetcher + Send + Sync> =
            Arc::new(HttpFetcher::new(&config.sources, &config.fetcher)?);
        Ok(Self::with_fetcher(config, fetcher))
    }

    /// Wire every component around an already-built transport.
    pub fn with_fetcher(config: Config, fetcher: Arc<dyn Fetcher + Send + Sync>) -> Self {
        let parallel_fetcher = Arc::new(
            ParallelFetcher::with_workers(fetcher, config.fetcher.concurrency)
                .timeout(config.fetcher.timeout()),
        );

        let cache = &config.cache;
        let aggregator = Aggregator::new(
            parallel_fetcher.clone(),
            config.fetcher.effective_story_limit(),
            AggregationCache::new(cache.ttl, cache.failure_backoff).max_stale(cache.max_stale),
            AggregationCache::new(cache.ttl, cache.failure_backoff).max_stale(cache.max_stale),
        );

        Self {
            config,
            parallel_fetcher,
            aggregator,
        }
    }

    pub fn tree_limits(&self) -> TreeLimits {
        TreeLimits {
            max_depth: self.config.comments.max_depth,
            max_nodes: self.config.comments.max_nodes,
        }
    }
}
