use serde::{Deserialize, Serialize};

/// A commit as returned by the GitLab REST API.
///
/// The `connection_id` / `project_id` fields are annotated by the client after
/// parsing, they are not part of the wire payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GitLabCommit {
    /// Full SHA
    pub id: String,
    /// Short hash, usually the first 8 characters
    #[serde(default)]
    pub short_id: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub author_name: String,
    #[serde(default)]
    pub author_email: String,
    #[serde(default)]
    pub committer_name: Option<String>,
    #[serde(default)]
    pub committer_email: Option<String>,
    /// ISO 8601 timestamp string from the API
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub authored_date: Option<String>,
    #[serde(default)]
    pub committed_date: Option<String>,
    #[serde(default)]
    pub web_url: Option<String>,
    #[serde(default)]
    pub parent_ids: Vec<String>,
    /// Insertion/deletion counts, only present on the detail endpoint
    #[serde(default)]
    pub stats: Option<GitLabCommitStats>,

    /// Set by the client, not from the API
    #[serde(default)]
    pub project_id: Option<String>,
    /// Set by the client, not from the API
    #[serde(default)]
    pub connection_id: Option<String>,
    /// Branch name, requires an additional API call
    #[serde(default)]
    pub branch: Option<String>,
    /// Explicit merge flag when known
    #[serde(default)]
    pub is_merge: Option<bool>,
}

impl GitLabCommit {
    /// An explicit merge flag wins; otherwise infer from the parent count.
    pub fn is_merge_commit(&self) -> bool {
        match self.is_merge {
            Some(flag) => flag,
            None => self.parent_ids.len() > 1,
        }
    }
}

/// Diff stats block on the commit detail endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GitLabCommitStats {
    #[serde(default)]
    pub additions: u32,
    #[serde(default)]
    pub deletions: u32,
    #[serde(default)]
    pub total: u32,
}

/// A project as returned by the GitLab REST API.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GitLabProject {
    /// Numeric project id, kept as string
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    /// e.g. "group/subgroup/project"
    #[serde(default)]
    pub path_with_namespace: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub web_url: Option<String>,
    #[serde(default)]
    pub ssh_url_to_repo: Option<String>,
    #[serde(default)]
    pub http_url_to_repo: Option<String>,
    /// e.g. "main", "master"
    #[serde(default)]
    pub default_branch: Option<String>,
    #[serde(default)]
    pub archived: bool,

    /// Set by the client, not from the API
    #[serde(default)]
    pub connection_id: String,
    /// Set by the client, not from the API
    #[serde(default)]
    pub connection_name: String,
    /// Whether this project participates in aggregation
    #[serde(default)]
    pub is_selected: bool,
    /// Last access timestamp (unix millis), for caching purposes
    #[serde(default)]
    pub last_accessed: Option<i64>,
}

impl GitLabProject {
    /// Display name including the owning connection.
    pub fn display_name(&self) -> String {
        if self.connection_name.is_empty() {
            self.path_with_namespace.clone()
        } else {
            format!("{} / {}", self.connection_name, self.path_with_namespace)
        }
    }
}

/// Authenticated user returned by `GET /user`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GitLabUser {
    #[serde(default)]
    pub id: u64,
    pub username: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// GitLab sends numeric project ids; cached files may carry them as strings.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;
    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(D::Error::custom(format!(
            "expected string or number for project id, got {}",
            other
        ))),
    }
}
