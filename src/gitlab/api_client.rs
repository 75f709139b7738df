use std::time::Duration;

use chrono::NaiveDate;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::gitlab::models::{GitLabCommit, GitLabProject, GitLabUser};
use crate::infrastructure::error::ReporterError;
use crate::infrastructure::network::{build_client, NetworkConfig};
use crate::models::Connection;

const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 1000;
const PER_PAGE: u32 = 100;

const PRIVATE_TOKEN_HEADER: &str = "PRIVATE-TOKEN";
const RETRY_AFTER_HEADER: &str = "Retry-After";

/// HTTP client for the GitLab REST API.
///
/// Supports both gitlab.com and self-managed instances. Retry/backoff and
/// rate-limit handling are fully contained here; callers never retry.
pub struct GitLabApiClient {
    client: Client,
}

impl GitLabApiClient {
    pub fn new() -> Result<Self, ReporterError> {
        Self::with_config(&NetworkConfig::default())
    }

    pub fn with_config(config: &NetworkConfig) -> Result<Self, ReporterError> {
        Ok(Self {
            client: build_client(config)?,
        })
    }

    // ==================== Authentication ====================

    /// Validate a token and resolve the authenticated user.
    /// `GET /user`. Returns `None` on any non-2xx status.
    pub async fn validate_token(
        &self,
        server_url: &str,
        token: &str,
    ) -> Result<Option<GitLabUser>, ReporterError> {
        let url = format!("{}/api/v4/user", normalize_url(server_url));
        let response = self
            .execute_with_retry(self.client.get(&url).header(PRIVATE_TOKEN_HEADER, token))
            .await?;

        if !response.status().is_success() {
            error!(status = %response.status(), "Token validation failed");
            return Ok(None);
        }

        Ok(parse_body(response).await)
    }

    /// Resolve the authenticated user for a connection.
    pub async fn current_user(
        &self,
        connection: &Connection,
    ) -> Result<Option<GitLabUser>, ReporterError> {
        self.validate_token(&connection.server_url, &connection.access_token)
            .await
    }

    // ==================== Project Operations ====================

    /// Fetch all accessible projects from a connection.
    /// `GET /projects?membership=true&per_page=100`, paginated via the `Link`
    /// response header; pages are concatenated in request order.
    pub async fn fetch_projects(
        &self,
        connection: &Connection,
    ) -> Result<Vec<GitLabProject>, ReporterError> {
        let mut all_projects = Vec::new();
        let mut page = 1u32;

        loop {
            let url = format!(
                "{}/projects?membership=true&per_page={}&page={}&order_by=name&sort=asc",
                connection.api_base_url(),
                PER_PAGE,
                page
            );

            let response = self.authorized_get(connection, &url).await?;
            if !response.status().is_success() {
                error!(status = %response.status(), page, "Failed to fetch projects");
                break;
            }

            let has_next = has_next_page(&response);
            let mut projects: Vec<GitLabProject> = match parse_body(response).await {
                Some(projects) => projects,
                None => break,
            };

            for project in &mut projects {
                project.connection_id = connection.id.clone();
                project.connection_name = connection.name.clone();
            }
            all_projects.extend(projects);

            if !has_next {
                break;
            }
            page += 1;
        }

        info!(
            count = all_projects.len(),
            connection = %connection.name,
            "Fetched projects"
        );
        Ok(all_projects)
    }

    /// Fetch a single project by id. `GET /projects/:id`.
    /// A namespaced id is percent-encoded before being embedded in the path.
    pub async fn fetch_project(
        &self,
        connection: &Connection,
        project_id: &str,
    ) -> Result<Option<GitLabProject>, ReporterError> {
        let url = format!(
            "{}/projects/{}",
            connection.api_base_url(),
            encode_path(project_id)
        );

        let response = self.authorized_get(connection, &url).await?;
        if !response.status().is_success() {
            error!(status = %response.status(), project_id, "Failed to fetch project");
            return Ok(None);
        }

        let project = parse_body::<GitLabProject>(response).await.map(|mut p| {
            p.connection_id = connection.id.clone();
            p.connection_name = connection.name.clone();
            p
        });
        Ok(project)
    }

    // ==================== Commit Operations ====================

    /// Fetch commits for a project within an inclusive day range.
    /// `GET /projects/:id/repository/commits?since=...&until=...&per_page=100`.
    pub async fn fetch_commits(
        &self,
        connection: &Connection,
        project_id: &str,
        since: NaiveDate,
        until: NaiveDate,
    ) -> Result<Vec<GitLabCommit>, ReporterError> {
        let since_str = format_day_start(since);
        let until_str = format_day_end(until);

        let mut all_commits = Vec::new();
        let mut page = 1u32;

        loop {
            let url = format!(
                "{}/projects/{}/repository/commits?since={}&until={}&per_page={}&page={}",
                connection.api_base_url(),
                encode_path(project_id),
                since_str,
                until_str,
                PER_PAGE,
                page
            );

            let response = self.authorized_get(connection, &url).await?;
            if !response.status().is_success() {
                error!(status = %response.status(), project_id, page, "Failed to fetch commits");
                break;
            }

            let has_next = has_next_page(&response);
            let mut commits: Vec<GitLabCommit> = match parse_body(response).await {
                Some(commits) => commits,
                None => break,
            };

            for commit in &mut commits {
                commit.project_id = Some(project_id.to_string());
                commit.connection_id = Some(connection.id.clone());
            }
            all_commits.extend(commits);

            if !has_next {
                break;
            }
            page += 1;
        }

        info!(count = all_commits.len(), project_id, "Fetched commits");
        Ok(all_commits)
    }

    /// Fetch a single commit with diff stats.
    /// `GET /projects/:id/repository/commits/:sha`.
    pub async fn fetch_commit_detail(
        &self,
        connection: &Connection,
        project_id: &str,
        sha: &str,
    ) -> Result<Option<GitLabCommit>, ReporterError> {
        let url = format!(
            "{}/projects/{}/repository/commits/{}",
            connection.api_base_url(),
            encode_path(project_id),
            sha
        );

        let response = self.authorized_get(connection, &url).await?;
        if !response.status().is_success() {
            error!(status = %response.status(), sha, "Failed to fetch commit detail");
            return Ok(None);
        }

        let commit = parse_body::<GitLabCommit>(response).await.map(|mut c| {
            c.project_id = Some(project_id.to_string());
            c.connection_id = Some(connection.id.clone());
            c
        });
        Ok(commit)
    }

    /// Fetch the raw diff for a commit.
    /// `GET /projects/:id/repository/commits/:sha/diff`.
    pub async fn fetch_commit_diff(
        &self,
        connection: &Connection,
        project_id: &str,
        sha: &str,
    ) -> Result<Option<String>, ReporterError> {
        let url = format!(
            "{}/projects/{}/repository/commits/{}/diff",
            connection.api_base_url(),
            encode_path(project_id),
            sha
        );

        let response = self.authorized_get(connection, &url).await?;
        if !response.status().is_success() {
            error!(status = %response.status(), sha, "Failed to fetch commit diff");
            return Ok(None);
        }

        match response.text().await {
            Ok(body) => Ok(Some(body)),
            Err(e) => {
                warn!("Failed to read diff body: {}", e);
                Ok(None)
            }
        }
    }

    // ==================== Helpers ====================

    async fn authorized_get(
        &self,
        connection: &Connection,
        url: &str,
    ) -> Result<Response, ReporterError> {
        self.execute_with_retry(
            self.client
                .get(url)
                .header(PRIVATE_TOKEN_HEADER, &connection.access_token),
        )
        .await
    }

    /// Execute a request with exponential backoff.
    ///
    /// Transport failures are retried up to `MAX_RETRIES` times; exhaustion
    /// surfaces as a network error to the caller. A 429 response does not
    /// consume the attempt budget: the client sleeps for the server-provided
    /// `Retry-After` (or the current backoff), doubles the backoff, and retries
    /// without bound until a non-rate-limited response arrives. The loop has no
    /// upper bound on total elapsed time under sustained throttling.
    async fn execute_with_retry(
        &self,
        request: RequestBuilder,
    ) -> Result<Response, ReporterError> {
        let mut attempt = 0u32;
        let mut backoff = Duration::from_millis(INITIAL_BACKOFF_MS);

        loop {
            let builder = request.try_clone().ok_or_else(|| {
                ReporterError::network("Request body is not cloneable for retry", None)
            })?;

            match builder.send().await {
                Ok(response) if response.status() == StatusCode::TOO_MANY_REQUESTS => {
                    let wait = retry_after(&response).unwrap_or(backoff);
                    warn!(wait_ms = wait.as_millis() as u64, "Rate limited, waiting before retry");
                    sleep(wait).await;
                    backoff *= 2;
                }
                Ok(response) => {
                    debug!(status = %response.status(), "Request completed");
                    return Ok(response);
                }
                Err(e) => {
                    attempt += 1;
                    if attempt >= MAX_RETRIES {
                        return Err(ReporterError::network(
                            format!("Request failed after {} attempts: {}", MAX_RETRIES, e),
                            e.url().map(|u| u.to_string()),
                        ));
                    }
                    warn!(
                        backoff_ms = backoff.as_millis() as u64,
                        "Request failed, retrying: {}", e
                    );
                    sleep(backoff).await;
                    backoff *= 2;
                }
            }
        }
    }
}

/// Server-provided rate-limit wait, in whole seconds.
fn retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(RETRY_AFTER_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Continuation is signaled by a `Link` header carrying `rel="next"`.
fn has_next_page(response: &Response) -> bool {
    response
        .headers()
        .get(reqwest::header::LINK)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("rel=\"next\""))
        .unwrap_or(false)
}

/// Parse a JSON body; malformed responses are logged and treated as empty.
async fn parse_body<T: serde::de::DeserializeOwned>(response: Response) -> Option<T> {
    let body = match response.text().await {
        Ok(body) => body,
        Err(e) => {
            warn!("Failed to read response body: {}", e);
            return None;
        }
    };

    match serde_json::from_str(&body) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            warn!("Failed to parse response body: {}", e);
            None
        }
    }
}

fn normalize_url(url: &str) -> String {
    let mut normalized = url.trim().to_string();
    if normalized.ends_with('/') {
        normalized.pop();
    }
    if !normalized.starts_with("http://") && !normalized.starts_with("https://") {
        normalized = format!("https://{}", normalized);
    }
    normalized
}

/// Percent-encode a path segment (e.g. a namespaced project id).
fn encode_path(path: &str) -> String {
    urlencoding::encode(path).into_owned()
}

fn format_day_start(date: NaiveDate) -> String {
    format!("{}T00:00:00Z", date.format("%Y-%m-%d"))
}

fn format_day_end(date: NaiveDate) -> String {
    format!("{}T23:59:59Z", date.format("%Y-%m-%d"))
}

impl std::fmt::Debug for GitLabApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitLabApiClient").finish()
    }
}
