//! Keyed result cache with staleness, failure backoff and request
//! de-duplication.
//!
//! Every key moves through the same lifecycle:
//!
//! ```text
//! (absent) ──miss──▶ pending ──ok──▶ fresh ──ttl──▶ stale ──refresh──▶ fresh
//!                       │                              │
//!                       └──err──▶ failed ──backoff──▶ (absent)
//! ```
//!
//! Stale values are swept out once they are older than `max_stale`, so a
//! long-running process only keeps keys that are still being asked for.
//!
//! A computation is started at most once per key at a time. It runs on its
//! own tokio task, so it completes and fills the cache even when every caller
//! that was waiting on it has gone away.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::app::{ConfluenceError, Result};

/// Operation name plus its normalized parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub operation: &'static str,
    pub params: Vec<String>,
}

impl CacheKey {
    pub fn new<I, P>(operation: &'static str, params: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: ToString,
    {
        Self {
            operation,
            params: params.into_iter().map(|p| p.to_string()).collect(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.operation, self.params.join(","))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    Pending,
    Fresh,
    Stale,
    Failed,
}

impl fmt::Display for CacheState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CacheState::Pending => "pending",
            CacheState::Fresh => "fresh",
            CacheState::Stale => "stale",
            CacheState::Failed => "failed",
        })
    }
}

/// Read-only view handed to callers.
#[derive(Debug)]
pub struct Cached<V> {
    pub value: Arc<V>,
    pub state: CacheState,
    pub fetched_at: DateTime<Utc>,
    /// Set when the latest background refresh failed and `value` is older
    /// data kept in its place.
    pub refresh_error: Option<Arc<ConfluenceError>>,
}

impl<V> Clone for Cached<V> {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
            state: self.state,
            fetched_at: self.fetched_at,
            refresh_error: self.refresh_error.clone(),
        }
    }
}

struct Resolved<V> {
    value: Arc<V>,
    fetched_at: DateTime<Utc>,
}

impl<V> Clone for Resolved<V> {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
            fetched_at: self.fetched_at,
        }
    }
}

type Outcome<V> = std::result::Result<Resolved<V>, Arc<ConfluenceError>>;
type Inflight<V> = Shared<BoxFuture<'static, Outcome<V>>>;

struct Stored<V> {
    resolved: Resolved<V>,
    stored_at: Instant,
}

struct Failure {
    error: Arc<ConfluenceError>,
    failed_at: Instant,
}

struct Slot<V> {
    value: Option<Stored<V>>,
    inflight: Option<Inflight<V>>,
    failure: Option<Failure>,
}

impl<V> Default for Slot<V> {
    fn default() -> Self {
        Self {
            value: None,
            inflight: None,
            failure: None,
        }
    }
}

type Slots<V> = Arc<Mutex<HashMap<CacheKey, Slot<V>>>>;

pub const DEFAULT_MAX_STALE: Duration = Duration::from_secs(3600);

pub struct AggregationCache<V> {
    slots: Slots<V>,
    ttl: Duration,
    failure_backoff: Duration,
    max_stale: Duration,
}

impl<V: Send + Sync + 'static> AggregationCache<V> {
    pub fn new(ttl: Duration, failure_backoff: Duration) -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
            ttl,
            failure_backoff,
            max_stale: DEFAULT_MAX_STALE,
        }
    }

    /// Age past which a stale value is dropped instead of served. Never
    /// shorter than the TTL.
    pub fn max_stale(mut self, max_stale: Duration) -> Self {
        self.max_stale = max_stale;
        self
    }

    fn is_expired(&self, slot: &Slot<V>, now: Instant) -> bool {
        if slot.inflight.is_some() {
            return false;
        }
        let stale_limit = self.max_stale.max(self.ttl);
        let value_expired = slot
            .value
            .as_ref()
            .map_or(true, |v| now.duration_since(v.stored_at) >= stale_limit);
        let failure_expired = slot
            .failure
            .as_ref()
            .map_or(true, |f| now.duration_since(f.failed_at) >= self.failure_backoff);
        value_expired && failure_expired
    }

    /// Drop every idle slot whose value and failure have both run out.
    fn sweep(&self, slots: &mut HashMap<CacheKey, Slot<V>>, now: Instant) {
        let before = slots.len();
        slots.retain(|_, slot| !self.is_expired(slot, now));
        let evicted = before - slots.len();
        if evicted > 0 {
            tracing::debug!("Evicted {} expired cache entries", evicted);
        }
    }

    /// Return the cached value for `key`, running `compute` only when there
    /// is nothing usable and no computation already in flight.
    pub async fn get<F, Fut>(&self, key: CacheKey, compute: F) -> Result<Cached<V>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        let inflight = {
            let mut slots = self.slots.lock().await;
            let now = Instant::now();
            self.sweep(&mut slots, now);
            let slot = slots.entry(key.clone()).or_default();

            if let Some(stored) = &slot.value {
                let resolved = stored.resolved.clone();
                if now.duration_since(stored.stored_at) < self.ttl {
                    tracing::debug!("Cache hit for {}", key);
                    return Ok(Cached {
                        value: resolved.value,
                        state: CacheState::Fresh,
                        fetched_at: resolved.fetched_at,
                        refresh_error: None,
                    });
                }

                let backing_off = slot
                    .failure
                    .as_ref()
                    .is_some_and(|f| now.duration_since(f.failed_at) < self.failure_backoff);
                if slot.inflight.is_none() && !backing_off {
                    tracing::debug!("Serving stale {} while refreshing", key);
                    slot.failure = None;
                    slot.inflight = Some(self.spawn(key.clone(), compute));
                }

                return Ok(Cached {
                    value: resolved.value,
                    state: CacheState::Stale,
                    fetched_at: resolved.fetched_at,
                    refresh_error: slot.failure.as_ref().map(|f| Arc::clone(&f.error)),
                });
            }

            if let Some(inflight) = &slot.inflight {
                tracing::debug!("Joining pending computation for {}", key);
                inflight.clone()
            } else {
                // Expired failures were swept above.
                if let Some(failure) = &slot.failure {
                    tracing::debug!("Serving cached failure for {}", key);
                    return Err(ConfluenceError::Cached(Arc::clone(&failure.error)));
                }

                tracing::debug!("Cache miss for {}", key);
                let inflight = self.spawn(key.clone(), compute);
                slot.inflight = Some(inflight.clone());
                inflight
            }
        };

        match inflight.await {
            Ok(resolved) => Ok(Cached {
                value: resolved.value,
                state: CacheState::Fresh,
                fetched_at: resolved.fetched_at,
                refresh_error: None,
            }),
            Err(error) => Err(ConfluenceError::Cached(error)),
        }
    }

    /// Start `compute` on its own task. The caller must hold the slot lock
    /// and record the returned future as the slot's in-flight computation;
    /// the task takes the lock again to publish its outcome.
    fn spawn<F, Fut>(&self, key: CacheKey, compute: F) -> Inflight<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        let slots = Arc::clone(&self.slots);
        let work = compute();

        let task = tokio::spawn(async move {
            let outcome: Outcome<V> = match work.await {
                Ok(value) => Ok(Resolved {
                    value: Arc::new(value),
                    fetched_at: Utc::now(),
                }),
                Err(error) => Err(Arc::new(error)),
            };

            let mut slots = slots.lock().await;
            let slot = slots.entry(key.clone()).or_default();
            slot.inflight = None;
            match &outcome {
                Ok(resolved) => {
                    slot.value = Some(Stored {
                        resolved: resolved.clone(),
                        stored_at: Instant::now(),
                    });
                    slot.failure = None;
                }
                Err(error) => {
                    tracing::warn!("Computation for {} failed: {}", key, error);
                    slot.failure = Some(Failure {
                        error: Arc::clone(error),
                        failed_at: Instant::now(),
                    });
                }
            }
            outcome
        });

        async move {
            match task.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!("Cache task join error: {}", e);
                    Err(Arc::new(ConfluenceError::Other(format!(
                        "cache computation aborted: {}",
                        e
                    ))))
                }
            }
        }
        .boxed()
        .shared()
    }

    /// Current lifecycle state of `key`, if the cache knows it.
    pub async fn state(&self, key: &CacheKey) -> Option<CacheState> {
        let slots = self.slots.lock().await;
        let slot = slots.get(key)?;
        let now = Instant::now();

        match (&slot.value, &slot.inflight, &slot.failure) {
            (Some(stored), _, _) if now.duration_since(stored.stored_at) < self.ttl => {
                Some(CacheState::Fresh)
            }
            (Some(_), _, _) => Some(CacheState::Stale),
            (None, Some(_), _) => Some(CacheState::Pending),
            (None, None, Some(_)) => Some(CacheState::Failed),
            (None, None, None) => None,
        }
    }

    /// Drop whatever is stored for `key`. A computation already in flight
    /// still completes and repopulates the key.
    pub async fn invalidate(&self, key: &CacheKey) -> bool {
        self.slots.lock().await.remove(key).is_some()
    }

    pub async fn clear(&self) {
        self.slots.lock().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.slots.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
