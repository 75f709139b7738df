use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use dashmap::DashMap;
use futures_util::future::join_all;
use tracing::{debug, info, warn};

use crate::config::ConfigManager;
use crate::gitlab::api_client::GitLabApiClient;
use crate::gitlab::commit_cache::CommitMemoryCache;
use crate::gitlab::instance::InstanceRegistry;
use crate::gitlab::mapper;
use crate::gitlab::models::GitLabProject;
use crate::gitlab::project_cache::ProjectDiskCache;
use crate::infrastructure::error::ReporterError;
use crate::models::{CommitInfo, Connection};
use crate::storage::CommitStore;

/// Orchestrates project resolution and concurrent commit retrieval across
/// connections.
///
/// One aggregator is constructed per logical session and handed to whoever
/// needs commit data; it owns the in-memory caches and shares the registry and
/// API client.
pub struct CommitAggregator {
    config: Arc<ConfigManager>,
    registry: Arc<InstanceRegistry>,
    api_client: Arc<GitLabApiClient>,
    project_cache: ProjectDiskCache,
    commit_cache: CommitMemoryCache,
    /// In-memory project lists, keyed by connection id
    projects: DashMap<String, Vec<GitLabProject>>,
}

impl CommitAggregator {
    pub fn new(
        config: Arc<ConfigManager>,
        registry: Arc<InstanceRegistry>,
        api_client: Arc<GitLabApiClient>,
    ) -> Self {
        let project_cache = ProjectDiskCache::new(config.project_cache_dir());
        Self {
            config,
            registry,
            api_client,
            project_cache,
            commit_cache: CommitMemoryCache::new(),
            projects: DashMap::new(),
        }
    }

    /// Same as `new` but with a custom commit cache TTL.
    pub fn with_commit_ttl(
        config: Arc<ConfigManager>,
        registry: Arc<InstanceRegistry>,
        api_client: Arc<GitLabApiClient>,
        ttl: Duration,
    ) -> Self {
        let mut aggregator = Self::new(config, registry, api_client);
        aggregator.commit_cache = CommitMemoryCache::with_ttl(ttl);
        aggregator
    }

    // ==================== Project Management ====================

    /// All projects currently known in memory, across connections.
    pub fn all_projects(&self) -> Vec<GitLabProject> {
        let mut all = Vec::new();
        for entry in self.projects.iter() {
            all.extend(entry.value().iter().cloned());
        }
        all
    }

    pub fn projects_for_connection(&self, connection_id: &str) -> Vec<GitLabProject> {
        self.projects
            .get(connection_id)
            .map(|p| p.value().clone())
            .unwrap_or_default()
    }

    /// Populate the in-memory project lists: disk cache first, API when no
    /// connection had a usable cache file.
    pub async fn ensure_projects_loaded(&self) {
        if !self.projects.is_empty() {
            return;
        }

        let connections = self.registry.connections().await;
        if connections.is_empty() {
            info!("No connections configured, nothing to load");
            return;
        }

        let mut loaded_any = false;
        for connection in &connections {
            let mut cached = self.project_cache.load(&connection.id);
            if !cached.is_empty() {
                self.restore_selected_state(&mut cached);
                self.projects.insert(connection.id.clone(), cached);
                loaded_any = true;
            }
        }

        if !loaded_any {
            info!("No disk cache found for any connection, loading from API");
            self.refresh_all_projects().await;
        }
    }

    /// Projects flagged for aggregation, loading project lists if needed.
    pub async fn selected_projects(&self) -> Vec<GitLabProject> {
        self.ensure_projects_loaded().await;
        self.all_projects()
            .into_iter()
            .filter(|p| p.is_selected)
            .collect()
    }

    /// Replace the selection: clear all flags, set the given ones, persist ids.
    pub async fn set_selected_projects(
        &self,
        selected: &[GitLabProject],
    ) -> Result<(), ReporterError> {
        for mut entry in self.projects.iter_mut() {
            for project in entry.value_mut().iter_mut() {
                project.is_selected = selected
                    .iter()
                    .any(|s| s.connection_id == project.connection_id && s.id == project.id);
            }
        }

        let ids: Vec<String> = self
            .all_projects()
            .into_iter()
            .filter(|p| p.is_selected)
            .map(|p| p.id)
            .collect();
        info!(count = ids.len(), "Saving selected projects");
        self.config.set_selected_project_ids(ids)
    }

    /// Fetch and cache projects for every connection concurrently.
    pub async fn refresh_all_projects(&self) {
        let connections = self.registry.connections().await;
        let refreshes = connections
            .iter()
            .map(|c| self.refresh_projects_for_connection(&c.id));
        join_all(refreshes).await;
    }

    /// Fetch and cache projects for one connection.
    ///
    /// The disk cache is consulted first; a miss falls through to the API and
    /// rewrites the cache file. Per-connection failures are logged and leave
    /// the previous in-memory state untouched.
    pub async fn refresh_projects_for_connection(&self, connection_id: &str) {
        let Some(connection) = self.registry.get(connection_id).await else {
            warn!(connection_id, "Connection not found, skipping project refresh");
            return;
        };

        let mut cached = self.project_cache.load(connection_id);
        if !cached.is_empty() {
            self.restore_selected_state(&mut cached);
            self.projects.insert(connection_id.to_string(), cached);
            return;
        }

        if !connection.is_valid() {
            warn!(connection = %connection.name, "Connection incomplete, skipping project refresh");
            return;
        }

        match self.api_client.fetch_projects(&connection).await {
            Ok(mut projects) => {
                let now = Utc::now().timestamp_millis();
                for project in &mut projects {
                    project.last_accessed = Some(now);
                }
                self.restore_selected_state(&mut projects);
                self.project_cache.store(connection_id, &projects);
                self.projects.insert(connection_id.to_string(), projects);
            }
            Err(e) => {
                warn!(connection = %connection.name, "Project refresh failed: {}", e);
            }
        }
    }

    /// Propagate a connection rename into cached project display names.
    ///
    /// The commit cache for that connection is invalidated because cached
    /// commits carry the denormalized project display name.
    pub fn update_connection_name(&self, connection_id: &str, new_name: &str) {
        if let Some(mut entry) = self.projects.get_mut(connection_id) {
            for project in entry.value_mut().iter_mut() {
                project.connection_name = new_name.to_string();
            }
            self.project_cache.store(connection_id, entry.value());
        }
        self.commit_cache.invalidate_connection(connection_id);
        info!(connection_id, new_name, "Updated connection name in caches");
    }

    /// Drop the in-memory and on-disk project lists (manual refresh path).
    pub fn clear_project_cache(&self) {
        self.projects.clear();
        self.project_cache.clear_all();
    }

    pub fn clear_commit_cache(&self) {
        self.commit_cache.clear();
    }

    pub fn clear_all_caches(&self) {
        self.clear_project_cache();
        self.clear_commit_cache();
    }

    // ==================== Commit Retrieval ====================

    /// Commits from the given projects within an inclusive day range.
    ///
    /// One concurrent fetch per project; a failing project contributes nothing
    /// and never aborts its siblings. The merged result is sorted by timestamp
    /// descending after all fetches have completed (stable, so equal
    /// timestamps keep concatenation order). No author filtering here.
    pub async fn commits_for_week(
        &self,
        week_start: NaiveDate,
        week_end: NaiveDate,
        projects: &[GitLabProject],
    ) -> Vec<CommitInfo> {
        if projects.is_empty() {
            return Vec::new();
        }

        let fetches = projects
            .iter()
            .map(|p| self.commits_for_project(p, week_start, week_end));
        let results = join_all(fetches).await;

        let mut merged = Vec::new();
        for (project, result) in projects.iter().zip(results) {
            match result {
                Ok(commits) => merged.extend(commits),
                Err(e) => {
                    warn!(
                        project = %project.display_name(),
                        "Skipping project after fetch failure: {}", e
                    );
                }
            }
        }

        merged.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        merged
    }

    /// Commits for one project, cache-checked.
    ///
    /// A cache hit within TTL serves from memory (date-filtered); a miss
    /// fetches from the API, maps, and writes through.
    pub async fn commits_for_project(
        &self,
        project: &GitLabProject,
        since: NaiveDate,
        until: NaiveDate,
    ) -> Result<Vec<CommitInfo>, ReporterError> {
        if let Some(cached) = self.commit_cache.get(&project.connection_id, &project.id) {
            debug!(project = %project.display_name(), "Using cached commits");
            return Ok(filter_by_date(cached, since, until));
        }

        let Some(connection) = self.registry.get(&project.connection_id).await else {
            warn!(project = %project.display_name(), "Owning connection not found");
            return Ok(Vec::new());
        };

        let wire_commits = self
            .api_client
            .fetch_commits(&connection, &project.id, since, until)
            .await?;
        let commits = mapper::to_commit_info_list(&wire_commits, project, &connection);

        self.commit_cache
            .put(&project.connection_id, &project.id, commits.clone());
        Ok(commits)
    }

    /// Commits for one project with insertion/deletion counts filled in by
    /// per-commit detail fetches. Slower; detail failures leave zero counts.
    pub async fn commits_with_details(
        &self,
        project: &GitLabProject,
        since: NaiveDate,
        until: NaiveDate,
    ) -> Result<Vec<CommitInfo>, ReporterError> {
        let commits = self.commits_for_project(project, since, until).await?;

        let Some(connection) = self.registry.get(&project.connection_id).await else {
            return Ok(commits);
        };

        let details = join_all(commits.iter().map(|commit| {
            self.api_client
                .fetch_commit_detail(&connection, &project.id, &commit.hash)
        }))
        .await;

        let enriched = commits
            .into_iter()
            .zip(details)
            .map(|(mut commit, detail)| {
                if let Ok(Some(detail)) = detail {
                    if let Some(stats) = detail.stats {
                        commit.insertions = stats.additions;
                        commit.deletions = stats.deletions;
                    }
                }
                commit
            })
            .collect();
        Ok(enriched)
    }

    /// Commits authored by the current user, merge commits excluded.
    ///
    /// A commit matches when its author equals the owning connection's
    /// resolved username OR its email equals the resolved email. Connections
    /// with no resolved identity pass all of their commits through; this
    /// permissive fallback is deliberate, the alternative would silently
    /// produce empty reports until the first connection test.
    pub async fn my_commits_for_week(
        &self,
        week_start: NaiveDate,
        week_end: NaiveDate,
        projects: &[GitLabProject],
    ) -> Vec<CommitInfo> {
        let commits = self.commits_for_week(week_start, week_end, projects).await;
        let connections = self.connections_by_id().await;

        let before = commits.len();
        let filtered: Vec<CommitInfo> = commits
            .into_iter()
            .filter(|c| !c.is_merge && commit_matches_user(c, connections.get(&c.connection_id)))
            .collect();
        info!(before, after = filtered.len(), "Filtered commits by current user");
        filtered
    }

    /// Current-user commits from the persisted commit store only; makes no
    /// network calls. Filters by project-id set and date window.
    pub async fn my_commits_for_week_from_store(
        &self,
        store: &dyn CommitStore,
        week_start: NaiveDate,
        week_end: NaiveDate,
        projects: &[GitLabProject],
    ) -> Result<Vec<CommitInfo>, ReporterError> {
        if projects.is_empty() {
            return Ok(Vec::new());
        }

        let project_ids: HashSet<&str> = projects.iter().map(|p| p.id.as_str()).collect();
        let connections = self.connections_by_id().await;

        let mut commits: Vec<CommitInfo> = store
            .all_commits()
            .await?
            .into_iter()
            .filter(|c| in_date_range(c, week_start, week_end))
            .filter(|c| project_ids.contains(c.project_id.as_str()))
            .filter(|c| !c.is_merge && commit_matches_user(c, connections.get(&c.connection_id)))
            .collect();

        commits.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        info!(count = commits.len(), "Loaded commits from local store");
        Ok(commits)
    }

    /// Re-apply the persisted selection onto a freshly loaded project list.
    fn restore_selected_state(&self, projects: &mut [GitLabProject]) {
        let selected = self.config.selected_project_ids();
        if selected.is_empty() {
            return;
        }
        for project in projects.iter_mut() {
            project.is_selected = selected.contains(&project.id);
        }
    }

    async fn connections_by_id(&self) -> HashMap<String, Connection> {
        self.registry
            .connections()
            .await
            .into_iter()
            .map(|c| (c.id.clone(), c))
            .collect()
    }
}

/// Author predicate: username equality OR email equality against the owning
/// connection's resolved identity. No identity resolved -> pass. Unknown
/// connection -> exclude.
fn commit_matches_user(commit: &CommitInfo, connection: Option<&Connection>) -> bool {
    let Some(connection) = connection else {
        warn!(connection_id = %commit.connection_id, "Connection not found for commit");
        return false;
    };

    let user_name = connection.user_name.as_deref().filter(|s| !s.is_empty());
    let user_email = connection.user_email.as_deref().filter(|s| !s.is_empty());

    if user_name.is_none() && user_email.is_none() {
        warn!(
            connection = %connection.name,
            "No resolved identity, passing all commits through"
        );
        return true;
    }

    user_name.map_or(false, |name| name == commit.author)
        || user_email.map_or(false, |email| email == commit.author_email)
}

fn in_date_range(commit: &CommitInfo, since: NaiveDate, until: NaiveDate) -> bool {
    let date = commit.timestamp.date_naive();
    date >= since && date <= until
}

fn filter_by_date(commits: Vec<CommitInfo>, since: NaiveDate, until: NaiveDate) -> Vec<CommitInfo> {
    commits
        .into_iter()
        .filter(|c| in_date_range(c, since, until))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CommitType;
    use chrono::{TimeZone, Utc};

    fn commit(author: &str, email: &str, connection_id: &str, merge: bool) -> CommitInfo {
        CommitInfo {
            hash: "abcd1234".into(),
            message: "feat: x".into(),
            author: author.into(),
            author_email: email.into(),
            timestamp: Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap(),
            branch: "main".into(),
            insertions: 0,
            deletions: 0,
            commit_type: CommitType::Feature,
            ticket_id: None,
            is_merge: merge,
            connection_id: connection_id.into(),
            project_id: "p1".into(),
            project_name: "Work / team/app".into(),
        }
    }

    fn connection_with_identity(id: &str, user: &str, email: &str) -> Connection {
        Connection {
            id: id.into(),
            name: "Work".into(),
            server_url: "https://gitlab.example.com".into(),
            access_token: "token".into(),
            user_name: Some(user.into()),
            user_email: Some(email.into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_author_filter_or_semantics() {
        let conn = connection_with_identity("c1", "alice", "alice@x.com");

        // Username match with a different email passes
        let by_name = commit("alice", "other@x.com", "c1", false);
        assert!(commit_matches_user(&by_name, Some(&conn)));

        // Email match with a different username passes
        let by_email = commit("bob", "alice@x.com", "c1", false);
        assert!(commit_matches_user(&by_email, Some(&conn)));

        // Neither matches: excluded
        let neither = commit("bob", "bob@x.com", "c1", false);
        assert!(!commit_matches_user(&neither, Some(&conn)));
    }

    #[test]
    fn test_unresolved_identity_passes_everything() {
        let conn = Connection {
            id: "c1".into(),
            name: "Work".into(),
            server_url: "https://gitlab.example.com".into(),
            access_token: "token".into(),
            ..Default::default()
        };
        let anyone = commit("whoever", "whoever@x.com", "c1", false);
        assert!(commit_matches_user(&anyone, Some(&conn)));
    }

    #[test]
    fn test_unknown_connection_excludes() {
        let orphan = commit("alice", "alice@x.com", "ghost", false);
        assert!(!commit_matches_user(&orphan, None));
    }

    #[test]
    fn test_date_range_is_inclusive() {
        let since = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let until = NaiveDate::from_ymd_opt(2026, 3, 8).unwrap();

        let mut early = commit("a", "a@x.com", "c1", false);
        early.timestamp = Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap();
        assert!(in_date_range(&early, since, until));

        let mut late = commit("a", "a@x.com", "c1", false);
        late.timestamp = Utc.with_ymd_and_hms(2026, 3, 8, 23, 59, 59).unwrap();
        assert!(in_date_range(&late, since, until));

        let mut outside = commit("a", "a@x.com", "c1", false);
        outside.timestamp = Utc.with_ymd_and_hms(2026, 3, 9, 0, 0, 0).unwrap();
        assert!(!in_date_range(&outside, since, until));
    }
}
