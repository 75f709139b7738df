use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A configured GitLab server connection.
///
/// Supports both gitlab.com and self-managed instances.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Connection {
    /// Unique identifier, user-defined or a generated UUID
    pub id: String,
    /// Display name, e.g. "Company GitLab"
    pub name: String,
    /// Server URL, e.g. "https://gitlab.com"
    pub server_url: String,
    /// Personal access token
    pub access_token: String,
    /// Whether this connection is the active one
    #[serde(default)]
    pub is_active: bool,
    /// Authenticated username, resolved from `/user`
    #[serde(default)]
    pub user_name: Option<String>,
    /// Authenticated user display name, resolved from `/user`
    #[serde(default)]
    pub user_display_name: Option<String>,
    /// Authenticated user email, resolved from `/user`
    #[serde(default)]
    pub user_email: Option<String>,
}

impl Connection {
    /// A connection is usable only when all identifying fields are present.
    pub fn is_valid(&self) -> bool {
        !self.id.is_empty()
            && !self.name.is_empty()
            && !self.server_url.is_empty()
            && !self.access_token.is_empty()
    }

    /// Normalize the server URL: strip trailing slash, default to https.
    pub fn normalized_url(&self) -> String {
        let mut url = self.server_url.trim().to_string();
        if url.ends_with('/') {
            url.pop();
        }
        if !url.starts_with("http://") && !url.starts_with("https://") {
            url = format!("https://{}", url);
        }
        url
    }

    pub fn api_base_url(&self) -> String {
        format!("{}/api/v4", self.normalized_url())
    }

    pub fn has_resolved_identity(&self) -> bool {
        self.user_name.as_deref().map_or(false, |u| !u.is_empty())
            && self.user_email.as_deref().map_or(false, |e| !e.is_empty())
    }
}

/// Commit classification derived from the commit message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommitType {
    Feature,
    Bugfix,
    Refactor,
    Documentation,
    Test,
    Chore,
    Style,
    Perf,
    Other,
}

impl CommitType {
    /// Conventional-commit prefix for this type.
    pub fn prefix(&self) -> &'static str {
        match self {
            CommitType::Feature => "feat",
            CommitType::Bugfix => "fix",
            CommitType::Refactor => "refactor",
            CommitType::Documentation => "docs",
            CommitType::Test => "test",
            CommitType::Chore => "chore",
            CommitType::Style => "style",
            CommitType::Perf => "perf",
            CommitType::Other => "other",
        }
    }

    const PREFIXED: [CommitType; 8] = [
        CommitType::Feature,
        CommitType::Bugfix,
        CommitType::Refactor,
        CommitType::Documentation,
        CommitType::Test,
        CommitType::Chore,
        CommitType::Style,
        CommitType::Perf,
    ];

    /// Classify a commit message.
    ///
    /// Conventional-commit prefixes (`type:` / `type(`) win; otherwise keyword
    /// heuristics apply in a fixed priority order. The order is load-bearing:
    /// "fix the refactor test" classifies as Bugfix because "fix" is checked
    /// before "refactor" and "test".
    pub fn from_message(message: &str) -> CommitType {
        if message.is_empty() {
            return CommitType::Other;
        }

        let lower = message.to_lowercase();
        let lower = lower.trim();

        for ty in CommitType::PREFIXED {
            let prefix = ty.prefix();
            if lower.starts_with(&format!("{}:", prefix))
                || lower.starts_with(&format!("{}(", prefix))
            {
                return ty;
            }
        }

        if lower.contains("feature") || lower.contains("add ") {
            CommitType::Feature
        } else if lower.contains("fix") || lower.contains("bug") {
            CommitType::Bugfix
        } else if lower.contains("refactor") || lower.contains("rework") {
            CommitType::Refactor
        } else if lower.contains("doc") {
            CommitType::Documentation
        } else if lower.contains("test") {
            CommitType::Test
        } else if lower.contains("performanc") || lower.contains("optimi") {
            CommitType::Perf
        } else if lower.contains("style") || lower.contains("format") {
            CommitType::Style
        } else if lower.contains("chore") || lower.contains("mainten") {
            CommitType::Chore
        } else {
            CommitType::Other
        }
    }
}

/// Normalized commit record.
///
/// `(connection_id, project_id, hash)` identifies a commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitInfo {
    /// Short commit hash
    pub hash: String,
    pub message: String,
    pub author: String,
    pub author_email: String,
    pub timestamp: DateTime<Utc>,
    pub branch: String,
    /// Lines added; 0 until a detail fetch fills it in
    #[serde(default)]
    pub insertions: u32,
    /// Lines deleted; 0 until a detail fetch fills it in
    #[serde(default)]
    pub deletions: u32,
    pub commit_type: CommitType,
    pub ticket_id: Option<String>,
    pub is_merge: bool,
    pub connection_id: String,
    pub project_id: String,
    /// Denormalized project display name, includes the connection name
    pub project_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_validity() {
        let conn = Connection {
            id: "c1".into(),
            name: "work".into(),
            server_url: "https://gitlab.example.com".into(),
            access_token: "glpat-secret".into(),
            ..Default::default()
        };
        assert!(conn.is_valid());

        let missing_token = Connection {
            access_token: String::new(),
            ..conn
        };
        assert!(!missing_token.is_valid());
    }

    #[test]
    fn test_url_normalization() {
        let conn = Connection {
            server_url: "gitlab.example.com/".into(),
            ..Default::default()
        };
        assert_eq!(conn.normalized_url(), "https://gitlab.example.com");
        assert_eq!(conn.api_base_url(), "https://gitlab.example.com/api/v4");
    }

    #[test]
    fn test_conventional_prefix_wins() {
        assert_eq!(CommitType::from_message("feat: add login"), CommitType::Feature);
        assert_eq!(CommitType::from_message("fix(parser): null check"), CommitType::Bugfix);
        assert_eq!(CommitType::from_message("docs: update readme"), CommitType::Documentation);
        assert_eq!(CommitType::from_message("perf: faster merge"), CommitType::Perf);
    }

    #[test]
    fn test_keyword_fallback_priority() {
        // "fix" is checked before "refactor" and "test"
        assert_eq!(
            CommitType::from_message("fix the refactor test"),
            CommitType::Bugfix
        );
        // "feature"/"add " comes first in the fallback chain
        assert_eq!(
            CommitType::from_message("add new fix for tests"),
            CommitType::Feature
        );
        assert_eq!(
            CommitType::from_message("Rework the scheduler"),
            CommitType::Refactor
        );
        assert_eq!(CommitType::from_message("weekly maintenance"), CommitType::Chore);
        assert_eq!(CommitType::from_message("hello world"), CommitType::Other);
        assert_eq!(CommitType::from_message(""), CommitType::Other);
    }

    #[test]
    fn test_implement_message_falls_through() {
        // "Implement" matches no prefix and no keyword
        assert_eq!(
            CommitType::from_message("Implement ABC-42: new caching layer"),
            CommitType::Other
        );
    }
}
