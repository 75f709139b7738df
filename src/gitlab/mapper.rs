use chrono::{DateTime, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

use crate::gitlab::models::{GitLabCommit, GitLabProject};
use crate::models::{CommitInfo, CommitType, Connection};

/// Ticket references like `ABC-123` (Jira, Linear, ...)
static TICKET_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Z]+-\d+").expect("ticket regex must compile"));

/// Timestamp layouts observed in GitLab API responses, tried after RFC 3339.
const TIMESTAMP_FORMATS: [&str; 3] = [
    "%Y-%m-%dT%H:%M:%S%.3fZ",
    "%Y-%m-%dT%H:%M:%SZ",
    "%Y-%m-%dT%H:%M:%S%.f",
];

/// Convert a GitLab wire commit into the internal commit record.
///
/// Pure translation, no I/O. Insertion/deletion counts default to zero when the
/// list endpoint did not include stats.
pub fn to_commit_info(
    commit: &GitLabCommit,
    project: &GitLabProject,
    connection: &Connection,
) -> CommitInfo {
    CommitInfo {
        hash: short_hash(commit),
        message: commit.message.clone(),
        author: commit.author_name.clone(),
        author_email: commit.author_email.clone(),
        timestamp: parse_timestamp(&commit.created_at),
        branch: commit
            .branch
            .clone()
            .or_else(|| project.default_branch.clone())
            .unwrap_or_default(),
        insertions: commit.stats.as_ref().map(|s| s.additions).unwrap_or(0),
        deletions: commit.stats.as_ref().map(|s| s.deletions).unwrap_or(0),
        commit_type: CommitType::from_message(&commit.message),
        ticket_id: extract_ticket_id(&commit.message),
        is_merge: commit.is_merge_commit(),
        connection_id: connection.id.clone(),
        project_id: project.id.clone(),
        project_name: project.display_name(),
    }
}

/// Convert a list of wire commits, skipping nothing; mapping is total.
pub fn to_commit_info_list(
    commits: &[GitLabCommit],
    project: &GitLabProject,
    connection: &Connection,
) -> Vec<CommitInfo> {
    commits
        .iter()
        .map(|c| to_commit_info(c, project, connection))
        .collect()
}

/// Prefer the API-supplied short id, else take the first 8 chars of the SHA.
pub fn short_hash(commit: &GitLabCommit) -> String {
    match &commit.short_id {
        Some(short) if !short.is_empty() => short.clone(),
        _ => commit.id.chars().take(8).collect(),
    }
}

/// First ticket reference in the message, if any.
pub fn extract_ticket_id(message: &str) -> Option<String> {
    if message.is_empty() {
        return None;
    }
    TICKET_PATTERN
        .find(message)
        .map(|m| m.as_str().to_string())
}

/// Parse an ISO 8601 timestamp, trying a small list of layouts.
///
/// Falls back to the current wall-clock time on total failure. The fallback is
/// lossy and corrupts ordering for the affected commit, so it is logged as a
/// warning rather than silently applied.
pub fn parse_timestamp(iso8601: &str) -> DateTime<Utc> {
    if iso8601.is_empty() {
        return Utc::now();
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(iso8601) {
        return parsed.with_timezone(&Utc);
    }

    let normalized = iso8601.trim_end_matches('Z');
    for format in TIMESTAMP_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(iso8601, format) {
            return parsed.and_utc();
        }
        if let Ok(parsed) = NaiveDateTime::parse_from_str(normalized, format) {
            return parsed.and_utc();
        }
    }

    warn!(timestamp = iso8601, "Failed to parse timestamp, falling back to now");
    Utc::now()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_project() -> GitLabProject {
        GitLabProject {
            id: "42".into(),
            path_with_namespace: "team/app".into(),
            name: "app".into(),
            default_branch: Some("main".into()),
            connection_id: "conn-1".into(),
            connection_name: "Work".into(),
            ..Default::default()
        }
    }

    fn sample_connection() -> Connection {
        Connection {
            id: "conn-1".into(),
            name: "Work".into(),
            server_url: "https://gitlab.example.com".into(),
            access_token: "token".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_bugfix_message_without_ticket() {
        let commit = GitLabCommit {
            id: "deadbeefcafe".into(),
            message: "fix: null pointer in parser".into(),
            created_at: "2026-03-02T10:15:30Z".into(),
            ..Default::default()
        };
        let info = to_commit_info(&commit, &sample_project(), &sample_connection());
        assert_eq!(info.commit_type, CommitType::Bugfix);
        assert_eq!(info.ticket_id, None);
        assert_eq!(info.hash, "deadbeef");
        assert_eq!(info.branch, "main");
        assert_eq!(info.insertions, 0);
        assert_eq!(info.deletions, 0);
    }

    #[test]
    fn test_ticket_extraction_with_fallback_type() {
        let commit = GitLabCommit {
            id: "0123456789ab".into(),
            message: "Implement ABC-42: new caching layer".into(),
            created_at: "2026-03-02T10:15:30Z".into(),
            ..Default::default()
        };
        let info = to_commit_info(&commit, &sample_project(), &sample_connection());
        assert_eq!(info.ticket_id.as_deref(), Some("ABC-42"));
        // "implement" matches neither a prefix nor a fallback keyword
        assert_eq!(info.commit_type, CommitType::Other);
    }

    #[test]
    fn test_first_ticket_wins() {
        assert_eq!(
            extract_ticket_id("ABC-1 then DEF-2").as_deref(),
            Some("ABC-1")
        );
        assert_eq!(extract_ticket_id("no ticket here"), None);
        assert_eq!(extract_ticket_id(""), None);
    }

    #[test]
    fn test_timestamp_variants() {
        let expected = Utc.with_ymd_and_hms(2026, 3, 2, 10, 15, 30).unwrap();
        assert_eq!(parse_timestamp("2026-03-02T10:15:30Z"), expected);
        assert_eq!(parse_timestamp("2026-03-02T10:15:30+00:00"), expected);
        assert_eq!(
            parse_timestamp("2026-03-02T10:15:30.000Z"),
            expected
        );
    }

    #[test]
    fn test_timestamp_garbage_falls_back_to_now() {
        let before = Utc::now();
        let parsed = parse_timestamp("not-a-timestamp");
        let after = Utc::now();
        assert!(parsed >= before && parsed <= after);
    }

    #[test]
    fn test_short_hash_preference() {
        let with_short = GitLabCommit {
            id: "0123456789abcdef".into(),
            short_id: Some("01234567".into()),
            ..Default::default()
        };
        assert_eq!(short_hash(&with_short), "01234567");

        let without = GitLabCommit {
            id: "fedcba9876543210".into(),
            ..Default::default()
        };
        assert_eq!(short_hash(&without), "fedcba98");
    }

    #[test]
    fn test_merge_flag_propagates() {
        let commit = GitLabCommit {
            id: "abcdef012345".into(),
            message: "Merge branch 'dev' into 'main'".into(),
            created_at: "2026-03-02T10:15:30Z".into(),
            parent_ids: vec!["p1".into(), "p2".into()],
            ..Default::default()
        };
        let info = to_commit_info(&commit, &sample_project(), &sample_connection());
        assert!(info.is_merge);
    }
}
