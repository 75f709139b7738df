use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::models::CommitInfo;

/// Default commit cache TTL: 1 hour.
const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);

/// A cached commit list with its creation time and time-to-live.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub commits: Vec<CommitInfo>,
    pub created_at: DateTime<Utc>,
    pub ttl: Duration,
}

impl CacheEntry {
    fn new(commits: Vec<CommitInfo>, ttl: Duration) -> Self {
        Self {
            commits,
            created_at: Utc::now(),
            ttl,
        }
    }

    /// Staleness is a pure function of `now - created_at > ttl`.
    pub fn is_expired(&self) -> bool {
        let age = Utc::now().signed_duration_since(self.created_at);
        age.to_std().map(|age| age > self.ttl).unwrap_or(false)
    }
}

/// Short-TTL in-memory cache of fetched commit lists, keyed by
/// `(connection, project)`.
///
/// Concurrent fetch tasks read and write entries without external locking.
/// This tier is intentionally separate from the disk project cache; the two
/// differ in durability and expiry by two orders of magnitude.
#[derive(Debug)]
pub struct CommitMemoryCache {
    entries: DashMap<String, CacheEntry>,
    ttl: Duration,
}

impl Default for CommitMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl CommitMemoryCache {
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    fn key(connection_id: &str, project_id: &str) -> String {
        format!("{}_{}", connection_id, project_id)
    }

    /// A hit within TTL returns the cached list; an expired entry is dropped
    /// and reported as a miss.
    pub fn get(&self, connection_id: &str, project_id: &str) -> Option<Vec<CommitInfo>> {
        let key = Self::key(connection_id, project_id);
        if let Some(entry) = self.entries.get(&key) {
            if !entry.is_expired() {
                return Some(entry.commits.clone());
            }
        }
        // Remove outside the read guard to avoid deadlocking the shard
        self.entries.remove_if(&key, |_, entry| entry.is_expired());
        None
    }

    pub fn put(&self, connection_id: &str, project_id: &str, commits: Vec<CommitInfo>) {
        self.entries.insert(
            Self::key(connection_id, project_id),
            CacheEntry::new(commits, self.ttl),
        );
    }

    /// Drop every entry belonging to a connection. Used when the connection's
    /// display name changes, since cached commits carry a denormalized
    /// project display name.
    pub fn invalidate_connection(&self, connection_id: &str) {
        let prefix = format!("{}_", connection_id);
        self.entries.retain(|key, _| !key.starts_with(&prefix));
    }

    /// Manual refresh: drop everything.
    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
