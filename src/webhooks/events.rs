//! Typed source-control events.
//!
//! Every delivery the engine acts on becomes one [`SourceEvent`]. The set of
//! variants is closed; dispatch matches on it exhaustively.
//!
//! | Header value   | Variant                                  |
//! |----------------|------------------------------------------|
//! | `push`         | [`SourceEvent::Push`]                    |
//! | `create`       | [`SourceEvent::BranchCreate`] (branches) |
//! | `delete`       | [`SourceEvent::BranchDelete`] (branches) |
//! | `pull_request` | [`SourceEvent::PullRequest`]             |
//! | `ping`         | [`SourceEvent::Ping`]                    |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Commit, SourceUrl};

/// Fields every event carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMeta {
    /// The source repository (clone URL). `None` only for pings from
    /// organisation-level hooks.
    pub repository: Option<SourceUrl>,

    /// Human-readable repository name, when the payload has one.
    pub repository_name: Option<String>,

    /// Login or name of whoever triggered the event.
    pub actor: String,

    /// When the event was received by this process.
    pub received_at: DateTime<Utc>,
}

/// A parsed, read-only source-control event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceEvent {
    Push(PushEvent),
    BranchCreate(BranchEvent),
    BranchDelete(BranchEvent),
    PullRequest(PullRequestEvent),
    Ping(PingEvent),
}

impl SourceEvent {
    pub fn meta(&self) -> &EventMeta {
        match self {
            SourceEvent::Push(e) => &e.meta,
            SourceEvent::BranchCreate(e) | SourceEvent::BranchDelete(e) => &e.meta,
            SourceEvent::PullRequest(e) => &e.meta,
            SourceEvent::Ping(e) => &e.meta,
        }
    }

    /// A short label for logs and failure tickets.
    pub fn kind(&self) -> &'static str {
        match self {
            SourceEvent::Push(_) => "push",
            SourceEvent::BranchCreate(_) => "branch_create",
            SourceEvent::BranchDelete(_) => "branch_delete",
            SourceEvent::PullRequest(_) => "pull_request",
            SourceEvent::Ping(_) => "ping",
        }
    }

    /// The git ref the event concerns, if any.
    pub fn git_ref(&self) -> Option<&str> {
        match self {
            SourceEvent::Push(e) => Some(&e.git_ref),
            SourceEvent::BranchCreate(e) | SourceEvent::BranchDelete(e) => Some(&e.branch),
            SourceEvent::PullRequest(e) => Some(&e.head_ref),
            SourceEvent::Ping(_) => None,
        }
    }
}

/// Commits pushed to a ref.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushEvent {
    pub meta: EventMeta,

    /// Full ref name, e.g. `refs/heads/main`.
    pub git_ref: String,

    /// Commits in delivery order. Order is not relied on downstream.
    pub commits: Vec<Commit>,
}

impl PushEvent {
    /// The branch name with any `refs/heads/` prefix removed.
    pub fn branch(&self) -> &str {
        self.git_ref
            .strip_prefix("refs/heads/")
            .unwrap_or(&self.git_ref)
    }
}

/// A branch was created or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchEvent {
    pub meta: EventMeta,

    /// Short branch name (the source host sends it without `refs/heads/`).
    pub branch: String,
}

/// Action performed on a pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrAction {
    Opened,
    Reopened,
    Edited,
    Synchronize,
    Closed,
    /// Any action the engine has no special handling for.
    Other,
}

impl PrAction {
    pub fn from_api_str(s: &str) -> Self {
        match s {
            "opened" => PrAction::Opened,
            "reopened" => PrAction::Reopened,
            "edited" => PrAction::Edited,
            "synchronize" => PrAction::Synchronize,
            "closed" => PrAction::Closed,
            _ => PrAction::Other,
        }
    }
}

/// A pull request changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestEvent {
    pub meta: EventMeta,
    pub action: PrAction,
    pub number: u64,
    pub title: String,
    pub body: String,
    pub url: Option<String>,
    pub head_ref: String,
    pub base_ref: String,

    /// Only meaningful for `closed`.
    pub merged: bool,
}

impl PullRequestEvent {
    /// Title and body joined, for reference extraction.
    pub fn text(&self) -> String {
        if self.body.is_empty() {
            self.title.clone()
        } else {
            format!("{}\n\n{}", self.title, self.body)
        }
    }
}

/// The hook was configured or tested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingEvent {
    pub meta: EventMeta,
    pub zen: Option<String>,
    pub hook_id: Option<u64>,
}
