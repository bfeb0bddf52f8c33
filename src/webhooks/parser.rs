//! Source-host webhook payload parser.
//!
//! Turns raw JSON payloads into typed [`SourceEvent`] values. The parser is
//! tolerant of unknown fields and unknown event types.
//!
//! # Parsing Strategy
//!
//! 1. The event type comes from the `X-GitHub-Event` header
//! 2. The payload is parsed according to the event type
//! 3. Unknown event types and tag refs return `Ok(None)` (ignored, not error)
//! 4. Malformed payloads return `Err` with details
//!
//! The repository identity is the clone URL, falling back to the HTML URL.
//! Payloads without either leave it unset; the dispatcher then uses the
//! configured source repository.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

use crate::types::{Commit, Revision, SourceUrl};

use super::events::{
    BranchEvent, EventMeta, PingEvent, PrAction, PullRequestEvent, PushEvent, SourceEvent,
};

/// Error type for webhook parsing failures.
#[derive(Debug, Error)]
pub enum ParseError {
    /// JSON deserialization failed (includes missing required fields).
    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Field has an invalid value (e.g. an unparseable timestamp).
    #[error("invalid field value for {field}: {value}")]
    InvalidField { field: &'static str, value: String },
}

/// Parses a webhook payload into a typed event.
///
/// * `Ok(Some(event))` - a known event type
/// * `Ok(None)` - an unknown event type or a tag ref (ignored)
/// * `Err(e)` - malformed payload or missing required fields
///
/// # Examples
///
/// ```
/// use codebeamer_sync::webhooks::{SourceEvent, parse_webhook};
///
/// let payload = br#"{
///     "ref": "refs/heads/main",
///     "commits": [],
///     "repository": { "name": "hello", "clone_url": "https://github.com/octo/hello.git" },
///     "sender": { "login": "octocat" }
/// }"#;
///
/// let event = parse_webhook("push", payload).unwrap().unwrap();
/// assert!(matches!(event, SourceEvent::Push(_)));
/// ```
pub fn parse_webhook(event_type: &str, payload: &[u8]) -> Result<Option<SourceEvent>, ParseError> {
    match event_type {
        "push" => parse_push(payload).map(|e| Some(SourceEvent::Push(e))),
        "create" => parse_branch_ref(payload).map(|opt| opt.map(SourceEvent::BranchCreate)),
        "delete" => parse_branch_ref(payload).map(|opt| opt.map(SourceEvent::BranchDelete)),
        "pull_request" => parse_pull_request(payload).map(|e| Some(SourceEvent::PullRequest(e))),
        "ping" => parse_ping(payload).map(|e| Some(SourceEvent::Ping(e))),
        _ => Ok(None),
    }
}

// ============================================================================
// Shared payload pieces
// ============================================================================

#[derive(Debug, Deserialize)]
struct RawRepository {
    name: Option<String>,
    clone_url: Option<String>,
    html_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawSender {
    login: String,
}

fn meta(repository: Option<RawRepository>, actor: Option<String>) -> EventMeta {
    let (name, url) = match repository {
        Some(repo) => (repo.name, repo.clone_url.or(repo.html_url)),
        None => (None, None),
    };

    EventMeta {
        repository: url.map(SourceUrl::new),
        repository_name: name,
        actor: actor.unwrap_or_else(|| "unknown".to_string()),
        received_at: Utc::now(),
    }
}

fn parse_timestamp(field: &'static str, raw: &str) -> Result<DateTime<Utc>, ParseError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| ParseError::InvalidField {
            field,
            value: raw.to_string(),
        })
}

// ============================================================================
// push event
// ============================================================================

#[derive(Debug, Deserialize)]
struct RawPushPayload {
    #[serde(rename = "ref")]
    git_ref: String,
    #[serde(default)]
    commits: Vec<RawCommit>,
    repository: Option<RawRepository>,
    pusher: Option<RawPusher>,
    sender: Option<RawSender>,
}

#[derive(Debug, Deserialize)]
struct RawPusher {
    name: String,
}

#[derive(Debug, Deserialize)]
struct RawCommit {
    id: String,
    #[serde(default)]
    message: String,
    timestamp: Option<String>,
    author: Option<RawAuthor>,
}

#[derive(Debug, Deserialize)]
struct RawAuthor {
    #[serde(default)]
    name: String,
    #[serde(default)]
    email: String,
}

fn parse_push(payload: &[u8]) -> Result<PushEvent, ParseError> {
    let raw: RawPushPayload = serde_json::from_slice(payload)?;

    let actor = raw
        .sender
        .map(|s| s.login)
        .or_else(|| raw.pusher.map(|p| p.name));
    let meta = meta(raw.repository, actor);

    let commits = raw
        .commits
        .into_iter()
        .map(|c| {
            if c.id.trim().is_empty() {
                return Err(ParseError::InvalidField {
                    field: "commits[].id",
                    value: c.id,
                });
            }
            let committed_at = match c.timestamp.as_deref() {
                Some(ts) => parse_timestamp("commits[].timestamp", ts)?,
                None => meta.received_at,
            };
            let author = c.author.unwrap_or(RawAuthor {
                name: String::new(),
                email: String::new(),
            });
            Ok(Commit {
                revision: Revision::new(c.id),
                message: c.message,
                author_name: author.name,
                author_email: author.email,
                committed_at,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(PushEvent {
        meta,
        git_ref: raw.git_ref,
        commits,
    })
}

// ============================================================================
// create / delete events
// ============================================================================

#[derive(Debug, Deserialize)]
struct RawRefPayload {
    #[serde(rename = "ref")]
    git_ref: String,
    ref_type: String,
    repository: Option<RawRepository>,
    sender: Option<RawSender>,
}

/// Returns `None` for tags; the mirror tracks branches only.
fn parse_branch_ref(payload: &[u8]) -> Result<Option<BranchEvent>, ParseError> {
    let raw: RawRefPayload = serde_json::from_slice(payload)?;

    match raw.ref_type.as_str() {
        "branch" => {}
        "tag" => return Ok(None),
        other => {
            return Err(ParseError::InvalidField {
                field: "ref_type",
                value: other.to_string(),
            });
        }
    }

    let branch = raw
        .git_ref
        .strip_prefix("refs/heads/")
        .unwrap_or(&raw.git_ref)
        .to_string();
    if branch.is_empty() {
        return Err(ParseError::InvalidField {
            field: "ref",
            value: raw.git_ref,
        });
    }

    Ok(Some(BranchEvent {
        meta: meta(raw.repository, raw.sender.map(|s| s.login)),
        branch,
    }))
}

// ============================================================================
// pull_request event
// ============================================================================

#[derive(Debug, Deserialize)]
struct RawPullRequestPayload {
    action: String,
    number: Option<u64>,
    pull_request: RawPullRequest,
    repository: Option<RawRepository>,
    sender: Option<RawSender>,
}

#[derive(Debug, Deserialize)]
struct RawPullRequest {
    number: u64,
    #[serde(default)]
    title: String,
    body: Option<String>,
    html_url: Option<String>,
    merged: Option<bool>,
    head: RawRef,
    base: RawRef,
}

#[derive(Debug, Deserialize)]
struct RawRef {
    #[serde(rename = "ref")]
    ref_name: String,
}

fn parse_pull_request(payload: &[u8]) -> Result<PullRequestEvent, ParseError> {
    let raw: RawPullRequestPayload = serde_json::from_slice(payload)?;
    let pr = raw.pull_request;

    Ok(PullRequestEvent {
        meta: meta(raw.repository, raw.sender.map(|s| s.login)),
        action: PrAction::from_api_str(&raw.action),
        number: raw.number.unwrap_or(pr.number),
        title: pr.title,
        body: pr.body.unwrap_or_default(),
        url: pr.html_url,
        head_ref: pr.head.ref_name,
        base_ref: pr.base.ref_name,
        merged: pr.merged.unwrap_or(false),
    })
}

// ============================================================================
// ping event
// ============================================================================

#[derive(Debug, Deserialize)]
struct RawPingPayload {
    zen: Option<String>,
    hook_id: Option<u64>,
    repository: Option<RawRepository>,
    sender: Option<RawSender>,
}

fn parse_ping(payload: &[u8]) -> Result<PingEvent, ParseError> {
    let raw: RawPingPayload = serde_json::from_slice(payload)?;

    Ok(PingEvent {
        meta: meta(raw.repository, raw.sender.map(|s| s.login)),
        zen: raw.zen,
        hook_id: raw.hook_id,
    })
}
