//! Commit and mirror records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::ids::{RemoteId, Revision, SourceUrl};

/// An immutable commit record taken from a push event.
///
/// Identity is the revision id alone; two commits with the same revision are
/// the same commit regardless of message or author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub revision: Revision,
    pub message: String,
    pub author_name: String,
    pub author_email: String,
    pub committed_at: DateTime<Utc>,
}

impl Commit {
    /// The first line of the commit message.
    pub fn summary(&self) -> &str {
        self.message.lines().next().unwrap_or("")
    }
}

/// The mirror resource for a source repository, as the remote reports it.
///
/// At most one of these exists per source URL within a project; the
/// reconciler searches before creating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteRepository {
    pub id: RemoteId,

    #[serde(default, deserialize_with = "null_as_empty")]
    pub name: String,

    /// The source repository URL (natural key).
    #[serde(default, deserialize_with = "null_as_empty")]
    pub repository_url: String,

    /// Type tag; always `GIT` for mirrors this engine creates.
    #[serde(rename = "type", default, deserialize_with = "null_as_empty")]
    pub repo_type: String,
}

/// The remote sends `null` for unset text fields.
fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl RemoteRepository {
    /// Returns true if this mirror tracks the given source repository.
    pub fn tracks(&self, source: &SourceUrl) -> bool {
        source.matches(&self.repository_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_repository_deserializes_remote_shape() {
        let json = r#"{
            "id": 17,
            "name": "GitHub-hello",
            "repositoryUrl": "https://github.com/octo/hello.git",
            "type": "GIT",
            "projectId": 68
        }"#;

        let repo: RemoteRepository = serde_json::from_str(json).unwrap();
        assert_eq!(repo.id, RemoteId(17));
        assert_eq!(repo.repo_type, "GIT");
        assert!(repo.tracks(&SourceUrl::new("https://github.com/octo/hello")));
    }

    #[test]
    fn remote_repository_tolerates_missing_optional_fields() {
        let repo: RemoteRepository = serde_json::from_str(r#"{"id": 3}"#).unwrap();
        assert_eq!(repo.id, RemoteId(3));
        assert!(repo.repository_url.is_empty());
        assert!(!repo.tracks(&SourceUrl::new("https://github.com/octo/hello")));
    }

    #[test]
    fn remote_repository_tolerates_null_fields() {
        let json = r#"{ "id": 4, "name": null, "repositoryUrl": null, "type": null }"#;

        let repo: RemoteRepository = serde_json::from_str(json).unwrap();
        assert_eq!(repo.id, RemoteId(4));
        assert!(repo.name.is_empty());
        assert!(repo.repository_url.is_empty());
        assert!(!repo.tracks(&SourceUrl::new("https://github.com/octo/hello")));
    }

    #[test]
    fn commit_summary_is_first_line() {
        let commit = Commit {
            revision: Revision::new("a".repeat(40)),
            message: "Fix the widget\n\nLonger explanation".to_string(),
            author_name: "Octo Cat".to_string(),
            author_email: "octo@example.com".to_string(),
            committed_at: Utc::now(),
        };
        assert_eq!(commit.summary(), "Fix the widget");
    }
}
