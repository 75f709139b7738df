use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::gitlab::models::GitLabProject;

/// Disk cache expires after 24 hours.
const CACHE_EXPIRY_HOURS: i64 = 24;

/// One cached project record; every record in a file shares the same
/// `cached_at` timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedProject {
    #[serde(flatten)]
    project: GitLabProject,
    cached_at: DateTime<Utc>,
}

/// Persists the project list per connection to local JSON files, avoiding
/// redundant network calls across process restarts.
///
/// A read is a miss when the file is absent, unreadable, or older than the
/// expiry window; a miss returns empty, forcing the caller to repopulate from
/// the API and rewrite the file.
#[derive(Debug, Clone)]
pub struct ProjectDiskCache {
    cache_dir: PathBuf,
}

impl ProjectDiskCache {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    /// Load cached projects for a connection, empty on any kind of miss.
    pub fn load(&self, connection_id: &str) -> Vec<GitLabProject> {
        let cache_file = self.cache_file_path(connection_id);
        if !cache_file.exists() {
            info!(connection_id, "No project cache file");
            return Vec::new();
        }

        let content = match fs::read_to_string(&cache_file) {
            Ok(content) => content,
            Err(e) => {
                error!(connection_id, "Error reading project cache file: {}", e);
                return Vec::new();
            }
        };

        let cached: Vec<CachedProject> = match serde_json::from_str(&content) {
            Ok(cached) => cached,
            Err(e) => {
                error!(connection_id, "Error parsing project cache file: {}", e);
                return Vec::new();
            }
        };

        if is_expired(&cached) {
            info!(connection_id, "Project cache expired");
            return Vec::new();
        }

        let projects: Vec<GitLabProject> = cached.into_iter().map(|c| c.project).collect();
        info!(connection_id, count = projects.len(), "Loaded projects from cache");
        projects
    }

    /// Write the project list for a connection, stamping `cached_at` now.
    pub fn store(&self, connection_id: &str, projects: &[GitLabProject]) {
        if let Err(e) = self.try_store(connection_id, projects) {
            error!(connection_id, "Error writing project cache file: {}", e);
        }
    }

    fn try_store(&self, connection_id: &str, projects: &[GitLabProject]) -> anyhow::Result<()> {
        fs::create_dir_all(&self.cache_dir)?;

        let now = Utc::now();
        let cached: Vec<CachedProject> = projects
            .iter()
            .map(|p| CachedProject {
                project: p.clone(),
                cached_at: now,
            })
            .collect();

        let json = serde_json::to_string_pretty(&cached)?;
        fs::write(self.cache_file_path(connection_id), json)?;
        info!(connection_id, count = projects.len(), "Cached projects");
        Ok(())
    }

    /// Delete the cache file for one connection.
    pub fn clear(&self, connection_id: &str) {
        let cache_file = self.cache_file_path(connection_id);
        if cache_file.exists() {
            if let Err(e) = fs::remove_file(&cache_file) {
                error!(connection_id, "Error clearing project cache: {}", e);
            }
        }
    }

    /// Delete every cache file.
    pub fn clear_all(&self) {
        let entries = match fs::read_dir(&self.cache_dir) {
            Ok(entries) => entries,
            Err(_) => return,
        };
        for entry in entries.flatten() {
            if entry.path().is_file() {
                if let Err(e) = fs::remove_file(entry.path()) {
                    error!("Error deleting cache file {:?}: {}", entry.path(), e);
                }
            }
        }
    }

    /// Filenames derive from the connection id with non `[A-Za-z0-9.-]`
    /// characters replaced.
    fn cache_file_path(&self, connection_id: &str) -> PathBuf {
        let sanitized: String = connection_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.cache_dir.join(format!("{}.json", sanitized))
    }
}

fn is_expired(cached: &[CachedProject]) -> bool {
    let Some(first) = cached.first() else {
        return true;
    };
    Utc::now().signed_duration_since(first.cached_at) > Duration::hours(CACHE_EXPIRY_HOURS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_project(id: &str) -> GitLabProject {
        GitLabProject {
            id: id.into(),
            path_with_namespace: format!("team/app-{}", id),
            name: format!("app-{}", id),
            default_branch: Some("main".into()),
            connection_id: "conn-1".into(),
            connection_name: "Work".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_store_and_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let cache = ProjectDiskCache::new(dir.path().to_path_buf());

        cache.store("conn-1", &[sample_project("1"), sample_project("2")]);
        let loaded = cache.load("conn-1");
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].id, "1");
        assert_eq!(loaded[0].connection_name, "Work");
    }

    #[test]
    fn test_absent_file_is_a_miss() {
        let dir = TempDir::new().unwrap();
        let cache = ProjectDiskCache::new(dir.path().to_path_buf());
        assert!(cache.load("nothing-here").is_empty());
    }

    #[test]
    fn test_stale_file_is_a_miss() {
        let dir = TempDir::new().unwrap();
        let cache = ProjectDiskCache::new(dir.path().to_path_buf());

        let stale = Utc::now() - Duration::hours(CACHE_EXPIRY_HOURS + 1);
        let cached = vec![CachedProject {
            project: sample_project("1"),
            cached_at: stale,
        }];
        fs::create_dir_all(dir.path()).unwrap();
        fs::write(
            dir.path().join("conn-1.json"),
            serde_json::to_string(&cached).unwrap(),
        )
        .unwrap();

        assert!(cache.load("conn-1").is_empty());
    }

    #[test]
    fn test_corrupt_file_is_a_miss() {
        let dir = TempDir::new().unwrap();
        let cache = ProjectDiskCache::new(dir.path().to_path_buf());
        fs::write(dir.path().join("conn-1.json"), "{oops").unwrap();
        assert!(cache.load("conn-1").is_empty());
    }

    #[test]
    fn test_filename_sanitization() {
        let dir = TempDir::new().unwrap();
        let cache = ProjectDiskCache::new(dir.path().to_path_buf());

        cache.store("my conn/№1", &[sample_project("1")]);
        assert!(!cache.load("my conn/№1").is_empty());
        // The written filename contains no separator characters
        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .flatten()
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["my_conn__1.json".to_string()]);
    }

    #[test]
    fn test_clear_removes_file() {
        let dir = TempDir::new().unwrap();
        let cache = ProjectDiskCache::new(dir.path().to_path_buf());
        cache.store("conn-1", &[sample_project("1")]);
        cache.clear("conn-1");
        assert!(cache.load("conn-1").is_empty());
    }
}
