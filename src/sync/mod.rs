//! Reconciliation of source events onto the remote.
//!
//! [`dispatch`] is the single entry point: it matches exhaustively on the
//! event variant and drives the reconciler, the commit/branch synchronizer
//! and the work-item linker through a [`RemoteInterpreter`].
//!
//! Failure is split in two. A mirror that cannot be resolved stops the event
//! at once, since nothing downstream can run without it; that surfaces as a
//! [`SyncError`]. Everything after that point is a sub-operation whose
//! failure is collected in the [`BatchReport`] and reported once at the end.

use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::config::Config;
use crate::remote::{
    RemoteApiError, RemoteInterpreter, RepositoryStatus, ResolveError, SessionError,
};
use crate::types::{RemoteId, RemoteRepository, SourceUrl};
use crate::webhooks::{PrAction, PullRequestEvent, PushEvent, SourceEvent};

pub mod commits;
pub mod notifier;
pub mod reconciler;
pub mod report;
pub mod work_items;

pub use notifier::{Incident, NotifyOutcome, notify};
pub use reconciler::resolve_mirror;
pub use report::{Applied, BatchReport, OpFailure};

/// Terminal failures of one delivery.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The remote rejected our credentials.
    #[error("authentication failed: {0}")]
    Authentication(#[source] ResolveError),

    /// No API endpoint could be established.
    #[error("remote endpoint unavailable: {0}")]
    EndpointUnavailable(#[source] ResolveError),

    /// The mirror for the source repository could not be found or created.
    #[error("could not resolve mirror for {source_url}: {source}")]
    MirrorUnresolvable {
        source_url: SourceUrl,
        #[source]
        source: RemoteApiError,
    },

    /// Neither the payload nor the configuration names a source repository.
    #[error("event carries no repository and SOURCE_REPO_URL is not set")]
    MissingRepository,

    /// The per-event deadline expired.
    #[error("event processing exceeded the {}s deadline", .0.as_secs())]
    DeadlineExceeded(Duration),
}

impl From<ResolveError> for SyncError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::Authentication { .. }
            | ResolveError::Session(SessionError::Rejected { .. }) => {
                SyncError::Authentication(err)
            }
            _ => SyncError::EndpointUnavailable(err),
        }
    }
}

/// How a delivery ended when it did not fail terminally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// A ping was answered.
    Pong,

    /// The event needs no remote changes.
    Ignored { reason: &'static str },

    /// The event was applied to a mirror; `report` holds any partial failures.
    Synced {
        repository: RemoteId,
        report: BatchReport,
    },
}

impl SyncOutcome {
    /// The batch report, for outcomes that touched the remote.
    pub fn report(&self) -> Option<&BatchReport> {
        match self {
            SyncOutcome::Synced { report, .. } => Some(report),
            SyncOutcome::Pong | SyncOutcome::Ignored { .. } => None,
        }
    }
}

/// Applies one event to the remote.
#[instrument(skip_all, fields(event = event.kind()))]
pub async fn dispatch<R: RemoteInterpreter>(
    remote: &R,
    config: &Config,
    event: &SourceEvent,
) -> Result<SyncOutcome, SyncError> {
    match event {
        SourceEvent::Ping(ping) => {
            debug!(hook_id = ?ping.hook_id, "Ping");
            Ok(SyncOutcome::Pong)
        }
        SourceEvent::Push(push) => sync_push(remote, config, event, push).await,
        SourceEvent::BranchCreate(branch) => {
            let mirror = mirror_for(remote, config, event).await?;
            let report = commits::create_branch(remote, mirror.id, &branch.branch).await;
            Ok(synced(mirror.id, report))
        }
        SourceEvent::BranchDelete(branch) => {
            let mirror = mirror_for(remote, config, event).await?;
            let report = commits::delete_branch(remote, mirror.id, &branch.branch).await;
            Ok(synced(mirror.id, report))
        }
        SourceEvent::PullRequest(pr) => sync_pull_request(remote, config, event, pr).await,
    }
}

/// The source repository an event refers to, falling back to configuration.
pub fn source_of(config: &Config, event: &SourceEvent) -> Result<SourceUrl, SyncError> {
    event
        .meta()
        .repository
        .clone()
        .or_else(|| config.source_repo_url.clone())
        .ok_or(SyncError::MissingRepository)
}

async fn mirror_for<R: RemoteInterpreter>(
    remote: &R,
    config: &Config,
    event: &SourceEvent,
) -> Result<RemoteRepository, SyncError> {
    let source_url = source_of(config, event)?;
    resolve_mirror(remote, &config.mirror_name_prefix, &source_url)
        .await
        .map_err(|source| SyncError::MirrorUnresolvable { source_url, source })
}

async fn sync_push<R: RemoteInterpreter>(
    remote: &R,
    config: &Config,
    event: &SourceEvent,
    push: &PushEvent,
) -> Result<SyncOutcome, SyncError> {
    if push.git_ref.starts_with("refs/tags/") {
        return Ok(SyncOutcome::Ignored {
            reason: "tag push",
        });
    }

    let mirror = mirror_for(remote, config, event).await?;
    let commits::CommitSync {
        mut report,
        created,
    } = commits::sync_commits(remote, mirror.id, &push.commits).await;

    let replayed = !push.commits.is_empty() && created.is_empty() && report.is_clean();

    // Commits already on the mirror were linked when they were first recorded.
    for commit in &created {
        report.merge(work_items::link_commit(remote, &mirror.name, commit).await);
    }

    if replayed {
        debug!(repository = %mirror.id, "Every commit already recorded; status left as is");
    } else {
        let status = RepositoryStatus {
            branch: push.branch().to_string(),
            commit_count: push.commits.len(),
            synced_at: Utc::now(),
            actor: push.meta.actor.clone(),
        };
        report.merge(commits::update_status(remote, mirror.id, status).await);
    }

    info!(
        repository = %mirror.id,
        branch = push.branch(),
        commits = push.commits.len(),
        %report,
        "Push synced"
    );
    Ok(synced(mirror.id, report))
}

async fn sync_pull_request<R: RemoteInterpreter>(
    remote: &R,
    config: &Config,
    event: &SourceEvent,
    pr: &PullRequestEvent,
) -> Result<SyncOutcome, SyncError> {
    let mirror = mirror_for(remote, config, event).await?;

    let merged = pr.action == PrAction::Closed && pr.merged;
    let links = matches!(
        pr.action,
        PrAction::Opened | PrAction::Reopened | PrAction::Edited
    ) || merged;
    if !links {
        debug!(number = pr.number, action = ?pr.action, "Pull request action not linked");
        return Ok(synced(mirror.id, BatchReport::default()));
    }

    let report = work_items::link_pull_request(remote, pr, merged).await;
    info!(number = pr.number, action = ?pr.action, %report, "Pull request linked");
    Ok(synced(mirror.id, report))
}

fn synced(repository: RemoteId, report: BatchReport) -> SyncOutcome {
    SyncOutcome::Synced { repository, report }
}
