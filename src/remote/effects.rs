//! Remote API effect types.
//!
//! These types describe remote operations as data, without executing them.
//! An interpreter ([`RemoteInterpreter`]) executes them: `HttpRemote` against
//! a live instance, and an in-memory fake in tests.
//!
//! Effects are project-scoped: the interpreter is constructed with the target
//! project, so effects don't include it.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Commit, RemoteId, RemoteRepository, SourceUrl, WorkItemId};

use super::error::RemoteApiError;

/// Type tag for every mirror this engine creates.
pub const REPOSITORY_TYPE: &str = "GIT";

/// Statuses after which a work item is no longer transitioned.
const TERMINAL_STATUSES: &[&str] = &["closed", "resolved", "done", "completed"];

/// A remote API effect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RemoteEffect {
    // ─── Mirrors ──────────────────────────────────────────────────────────────
    /// Fetch one page of mirror resources in the project (1-based pages).
    ListRepositories { page: u32, page_size: u32 },

    CreateRepository(NewRepository),

    /// Record the latest sync on the mirror.
    UpdateRepositoryStatus {
        repository: RemoteId,
        status: RepositoryStatus,
    },

    // ─── Commits and branches ─────────────────────────────────────────────────
    /// Create a commit record. Keyed by (repository, revision).
    CreateCommit { repository: RemoteId, commit: Commit },

    CreateBranch { repository: RemoteId, branch: String },

    DeleteBranch { repository: RemoteId, branch: String },

    // ─── Work items ───────────────────────────────────────────────────────────
    GetWorkItem { id: WorkItemId },

    PostComment {
        item: WorkItemId,
        body: String,
        format: CommentFormat,
    },

    UpdateWorkItemStatus { item: WorkItemId, status: String },

    /// Create a new tracker item (used for failure tickets).
    CreateItem(NewItem),
}

impl RemoteEffect {
    /// A short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            RemoteEffect::ListRepositories { .. } => "list_repositories",
            RemoteEffect::CreateRepository(_) => "create_repository",
            RemoteEffect::UpdateRepositoryStatus { .. } => "update_repository_status",
            RemoteEffect::CreateCommit { .. } => "create_commit",
            RemoteEffect::CreateBranch { .. } => "create_branch",
            RemoteEffect::DeleteBranch { .. } => "delete_branch",
            RemoteEffect::GetWorkItem { .. } => "get_work_item",
            RemoteEffect::PostComment { .. } => "post_comment",
            RemoteEffect::UpdateWorkItemStatus { .. } => "update_work_item_status",
            RemoteEffect::CreateItem(_) => "create_item",
        }
    }
}

/// Request body for a new mirror.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRepository {
    pub name: String,
    pub description: String,
    pub repository_url: SourceUrl,
}

/// Latest-sync summary written onto a mirror after a push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryStatus {
    pub branch: String,
    pub commit_count: usize,
    pub synced_at: DateTime<Utc>,
    pub actor: String,
}

/// Markup used for a comment body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommentFormat {
    PlainText,
    Wiki,
}

impl CommentFormat {
    pub fn as_api_str(&self) -> &'static str {
        match self {
            CommentFormat::PlainText => "PlainText",
            CommentFormat::Wiki => "Wiki",
        }
    }
}

/// Request body for a new tracker item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewItem {
    pub name: String,
    pub description: String,
    pub priority: String,
    pub status: String,
}

// ─── Response Types ───────────────────────────────────────────────────────────

/// One page of mirrors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryPage {
    pub items: Vec<RemoteRepository>,

    /// Total across all pages. `None` when a page object omits it; an
    /// unpaged (bare array) listing reports its own length.
    pub total: Option<u64>,
}

/// The parts of a work item the linker reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: WorkItemId,
    pub name: String,
    pub status: Option<String>,
}

impl WorkItem {
    /// Returns true if the item is closed, resolved, done or completed.
    pub fn is_terminal(&self) -> bool {
        self.status
            .as_deref()
            .is_some_and(|s| TERMINAL_STATUSES.contains(&s.trim().to_lowercase().as_str()))
    }
}

/// Response from a remote effect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum RemoteResponse {
    /// Response to `ListRepositories`.
    Repositories(RepositoryPage),

    /// Response to `CreateRepository`.
    Repository(RemoteRepository),

    /// Response to `GetWorkItem`.
    WorkItem(WorkItem),

    /// Response to `CreateItem`.
    ItemCreated(WorkItemId),

    /// Any effect without a meaningful body.
    Ok,
}

/// Builds the error for an interpreter answering with the wrong variant.
pub fn unexpected_response(effect: &'static str, response: &RemoteResponse) -> RemoteApiError {
    RemoteApiError::permanent(format!("unexpected response to {effect}: {response:?}"))
}

/// Interprets remote effects.
///
/// Implementations are constructed with a `RunContext` and a `ProjectId`, so
/// all effects executed through one instance share the endpoint, the
/// authentication and the project scope.
pub trait RemoteInterpreter: Send + Sync {
    fn interpret(
        &self,
        effect: RemoteEffect,
    ) -> impl Future<Output = Result<RemoteResponse, RemoteApiError>> + Send;
}
