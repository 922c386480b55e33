//! Request/response boundary over the fetch → normalize → cache pipeline.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::app::error::{AggregationError, FetchError, SchemaError};
use crate::app::{ConfluenceError, Result};
use crate::cache::{AggregationCache, CacheKey, CacheState, Cached};
use crate::comments::{TreeBuilder, TreeLimits};
use crate::domain::{CommentBody, CommentTree, Item, ItemId, RawRecord, SourceKind};
use crate::fetcher::parallel::ParallelFetcher;
use crate::fetcher::{Fetcher, Resource};
use crate::normalizer::Normalizer;
use crate::query::{self, SortMode};

const TOP_STORIES: &str = "top_stories";
const COMMENTS: &str = "comments";

/// Items for one set of listing parameters, with the cache's view of them.
#[derive(Debug, Clone)]
pub struct Listing {
    pub items: Vec<Item>,
    /// Size of the cached candidate set before filtering.
    pub candidates: usize,
    pub state: CacheState,
    pub fetched_at: DateTime<Utc>,
    pub refresh_error: Option<Arc<ConfluenceError>>,
}

pub struct Aggregator {
    parallel: Arc<ParallelFetcher>,
    normalizer: Normalizer,
    story_limit: usize,
    stories: AggregationCache<Vec<Item>>,
    threads: AggregationCache<CommentTree>,
}

impl Aggregator {
    pub fn new(
        parallel: Arc<ParallelFetcher>,
        story_limit: usize,
        stories: AggregationCache<Vec<Item>>,
        threads: AggregationCache<CommentTree>,
    ) -> Self {
        Self {
            parallel,
            normalizer: Normalizer::new(),
            story_limit,
            stories,
            threads,
        }
    }

    fn stories_key(source: SourceKind) -> CacheKey {
        CacheKey::new(TOP_STORIES, [source.as_str()])
    }

    fn comments_key(story: &ItemId, limits: TreeLimits) -> CacheKey {
        CacheKey::new(
            COMMENTS,
            [
                story.to_string(),
                limits.max_depth.to_string(),
                limits.max_nodes.to_string(),
            ],
        )
    }

    /// Current top stories from `source`, sorted and filtered. The upstream
    /// fetch is cached per source; sorting and filtering run on every call.
    pub async fn top_stories(
        &self,
        source: SourceKind,
        sort: SortMode,
        filter: &str,
    ) -> Result<Listing> {
        let parallel = Arc::clone(&self.parallel);
        let normalizer = self.normalizer.clone();
        let limit = self.story_limit;

        let cached = self
            .stories
            .get(Self::stories_key(source), move || async move {
                load_front_page(&parallel, &normalizer, source, limit).await
            })
            .await?;

        Ok(Listing {
            items: query::select(&cached.value, sort, filter),
            candidates: cached.value.len(),
            state: cached.state,
            fetched_at: cached.fetched_at,
            refresh_error: cached.refresh_error,
        })
    }

    pub async fn top_stories_state(&self, source: SourceKind) -> Option<CacheState> {
        self.stories.state(&Self::stories_key(source)).await
    }

    /// Discussion tree for a story, resolved breadth-first under `limits`.
    pub async fn comments(&self, story: &ItemId, limits: TreeLimits) -> Result<Cached<CommentTree>> {
        let parallel = Arc::clone(&self.parallel);
        let normalizer = self.normalizer.clone();
        let story_id = story.clone();

        self.threads
            .get(Self::comments_key(story, limits), move || async move {
                load_thread(parallel, &normalizer, story_id, limits).await
            })
            .await
    }

    pub async fn comments_state(&self, story: &ItemId, limits: TreeLimits) -> Option<CacheState> {
        self.threads.state(&Self::comments_key(story, limits)).await
    }

    /// The first `limit` top-level comments, without descending into replies.
    pub async fn comment_preview(&self, story: &ItemId, limit: usize) -> Result<CommentTree> {
        let limits = TreeLimits {
            max_depth: 0,
            max_nodes: limit.max(1),
        };
        let cached = self.comments(story, limits).await?;
        let mut preview = CommentTree::clone(&cached.value);
        preview.roots.truncate(limit);
        preview.node_count = preview.roots.len();
        Ok(preview)
    }

    /// Forget everything cached for `source`'s listing.
    pub async fn refresh(&self, source: SourceKind) -> bool {
        self.stories.invalidate(&Self::stories_key(source)).await
    }
}

async fn load_front_page(
    parallel: &ParallelFetcher,
    normalizer: &Normalizer,
    source: SourceKind,
    limit: usize,
) -> Result<Vec<Item>> {
    let fetcher = parallel.fetcher();
    let outcomes: Vec<std::result::Result<Item, FetchError>> = match source {
        SourceKind::Item => {
            let ids = fetch_top_ids(fetcher.as_ref(), limit).await?;
            parallel.fetch_many(&ids).await
        }
        SourceKind::SearchIndex => {
            let page = fetcher.fetch(&Resource::FrontPage { hits: limit }).await?;
            search_hits(page)?
                .into_iter()
                .take(limit)
                .map(|hit| -> std::result::Result<Item, FetchError> {
                    let raw = RawRecord::decode(SourceKind::SearchIndex, hit)?;
                    Ok(normalizer.normalize(raw)?)
                })
                .collect()
        }
    };

    collect_batch(source, outcomes)
}

async fn fetch_top_ids(fetcher: &(dyn Fetcher + Send + Sync), limit: usize) -> Result<Vec<ItemId>> {
    let value = fetcher.fetch(&Resource::TopStories).await?;
    let ids: Vec<u64> = serde_json::from_value(value)
        .map_err(|e| SchemaError::Malformed(format!("top stories list: {}", e)))?;
    Ok(ids.into_iter().take(limit).map(ItemId::Numeric).collect())
}

fn search_hits(mut page: Value) -> Result<Vec<Value>> {
    match page.get_mut("hits").map(Value::take) {
        Some(Value::Array(hits)) => Ok(hits),
        Some(_) => Err(SchemaError::Malformed("`hits` is not an array".into()).into()),
        None => Err(SchemaError::MissingField("hits").into()),
    }
}

/// Keep the successes; only a batch with none becomes an error.
fn collect_batch(
    source: SourceKind,
    outcomes: Vec<std::result::Result<Item, FetchError>>,
) -> Result<Vec<Item>> {
    let total = outcomes.len();
    let (items, failures): (Vec<_>, Vec<_>) = outcomes.into_iter().partition(|r| r.is_ok());
    let items: Vec<Item> = items.into_iter().filter_map(|r| r.ok()).collect();
    let failures: Vec<FetchError> = failures.into_iter().filter_map(|r| r.err()).collect();

    if items.is_empty() && !failures.is_empty() {
        return Err(AggregationError::from_failures(failures.len(), failures).into());
    }
    if !failures.is_empty() {
        tracing::warn!(
            "{} of {} {} stories failed; serving the rest",
            failures.len(),
            total,
            source
        );
    }
    tracing::info!("Loaded {} stories from {}", items.len(), source);
    Ok(items)
}

async fn load_thread(
    parallel: Arc<ParallelFetcher>,
    normalizer: &Normalizer,
    story_id: ItemId,
    limits: TreeLimits,
) -> Result<CommentTree> {
    let value = parallel
        .fetcher()
        .fetch(&Resource::Item(story_id.clone()))
        .await?;
    let story = normalizer.normalize(RawRecord::decode(SourceKind::Item, value)?)?;

    let builder = TreeBuilder::new(parallel);
    let mut tree = builder.build_tree(&story.comment_ids, limits).await;
    tree.story_id = Some(story.id);

    if tree.node_count > 0 && tree.failed_count() == tree.node_count {
        let causes = tree.roots.iter().filter_map(|node| match &node.body {
            CommentBody::Failed { error } => Some(error.clone()),
            _ => None,
        });
        return Err(AggregationError::from_failures(tree.node_count, causes).into());
    }
    Ok(tree)
}
