//! Per-origin robots.txt cache with a 24 hour expiry

use crate::robots::ParsedRobots;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::OnceCell;

/// Cached robots.txt data for an origin
#[derive(Debug, Clone)]
pub struct CachedRobots {
    pub content: Arc<ParsedRobots>,

    /// When the robots.txt was fetched
    pub fetched_at: DateTime<Utc>,
}

impl CachedRobots {
    pub fn new(content: ParsedRobots) -> Self {
        Self {
            content: Arc::new(content),
            fetched_at: Utc::now(),
        }
    }

    /// Checks if the entry is older than 24 hours
    pub fn is_stale(&self) -> bool {
        self.age() > Duration::hours(24)
    }

    pub fn age(&self) -> Duration {
        Utc::now() - self.fetched_at
    }
}

/// Robots.txt entries shared by all crawl workers
///
/// The map lock only covers looking up or inserting an origin's cell. The
/// fetch runs inside the cell, so each origin's robots.txt is requested at
/// most once per expiry period and a slow origin never blocks the others.
#[derive(Debug, Default)]
pub struct RobotsCache {
    entries: Mutex<HashMap<String, Arc<OnceCell<CachedRobots>>>>,
}

impl RobotsCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<OnceCell<CachedRobots>>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the fresh entry for `origin`, fetching it with `fetch` when
    /// missing or stale
    ///
    /// # Arguments
    ///
    /// * `origin` - Cache key, as produced by [`origin_of`](crate::robots::origin_of)
    /// * `fetch` - Produces the parsed robots.txt; called at most once per
    ///   origin while the entry is fresh, even under concurrent lookups
    pub async fn get_or_fetch<F, Fut>(&self, origin: &str, fetch: F) -> Arc<ParsedRobots>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = ParsedRobots>,
    {
        let cell = {
            let mut entries = self.lock();
            let cell = entries.entry(origin.to_string()).or_default();
            if cell.get().map_or(false, CachedRobots::is_stale) {
                tracing::debug!("robots.txt for {} expired, refetching", origin);
                *cell = Arc::default();
            }
            Arc::clone(cell)
        };

        let cached = cell
            .get_or_init(|| async move { CachedRobots::new(fetch().await) })
            .await;
        Arc::clone(&cached.content)
    }

    /// Inserts an entry directly, replacing any existing one
    pub fn insert(&self, origin: &str, entry: CachedRobots) {
        self.lock()
            .insert(origin.to_string(), Arc::new(OnceCell::new_with(Some(entry))));
    }

    /// Number of origins with a cached or in-flight entry
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
