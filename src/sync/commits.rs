//! Projects commits and branch events onto a mirror.
//!
//! Every call is keyed on a natural key (revision id, branch name), so a
//! redelivered event replays as a run of conflicts and absent-on-delete
//! answers, all of which count as success. Nothing here is retried.

use tracing::{debug, info, warn};

use crate::remote::{RemoteApiError, RemoteEffect, RemoteInterpreter, RepositoryStatus};
use crate::types::{Commit, RemoteId};

use super::report::{Applied, BatchReport};

/// Submits one commit record. A duplicate is `AlreadyPresent`.
pub async fn create_commit<R: RemoteInterpreter>(
    remote: &R,
    repository: RemoteId,
    commit: &Commit,
) -> Result<Applied, RemoteApiError> {
    let effect = RemoteEffect::CreateCommit {
        repository,
        commit: commit.clone(),
    };
    match remote.interpret(effect).await {
        Ok(_) => Ok(Applied::Created),
        Err(e) if e.is_conflict() => Ok(Applied::AlreadyPresent),
        Err(e) => Err(e),
    }
}

/// Result of submitting a batch of commits.
#[derive(Debug, Default)]
pub struct CommitSync<'a> {
    pub report: BatchReport,
    /// Commits this batch recorded for the first time, in submission order.
    pub created: Vec<&'a Commit>,
}

/// Submits every commit, in the order given.
///
/// A failed commit is recorded and the batch moves on; one bad commit never
/// blocks the rest.
pub async fn sync_commits<'a, R: RemoteInterpreter>(
    remote: &R,
    repository: RemoteId,
    commits: &'a [Commit],
) -> CommitSync<'a> {
    let mut report = BatchReport::default();
    let mut created = Vec::new();
    for commit in commits {
        match create_commit(remote, repository, commit).await {
            Ok(applied) => {
                debug!(
                    revision = %commit.revision.short(),
                    summary = commit.summary(),
                    ?applied,
                    "Commit synced"
                );
                if applied == Applied::Created {
                    created.push(commit);
                }
                report.record(applied);
            }
            Err(e) => {
                warn!(
                    revision = %commit.revision.short(),
                    kind = ?e.kind,
                    error = %e,
                    "Commit sync failed; continuing with the rest of the batch"
                );
                report.record_failure(format!("commit {}", commit.revision.short()), &e);
            }
        }
    }
    info!(%repository, %report, "Commit batch finished");
    CommitSync { report, created }
}

/// Creates a branch on the mirror. An existing branch is `AlreadyPresent`.
pub async fn create_branch<R: RemoteInterpreter>(
    remote: &R,
    repository: RemoteId,
    branch: &str,
) -> BatchReport {
    let effect = RemoteEffect::CreateBranch {
        repository,
        branch: branch.to_string(),
    };
    let result = match remote.interpret(effect).await {
        Ok(_) => Ok(Applied::Created),
        Err(e) if e.is_conflict() => Ok(Applied::AlreadyPresent),
        Err(e) => Err(e),
    };
    single(format!("create branch {branch}"), result)
}

/// Deletes a branch from the mirror. An absent branch is `AlreadyPresent`.
pub async fn delete_branch<R: RemoteInterpreter>(
    remote: &R,
    repository: RemoteId,
    branch: &str,
) -> BatchReport {
    let effect = RemoteEffect::DeleteBranch {
        repository,
        branch: branch.to_string(),
    };
    let result = match remote.interpret(effect).await {
        Ok(_) => Ok(Applied::Created),
        Err(e) if e.is_not_found() => Ok(Applied::AlreadyPresent),
        Err(e) => Err(e),
    };
    single(format!("delete branch {branch}"), result)
}

/// Records the latest sync on the mirror. Best effort.
pub async fn update_status<R: RemoteInterpreter>(
    remote: &R,
    repository: RemoteId,
    status: RepositoryStatus,
) -> BatchReport {
    let effect = RemoteEffect::UpdateRepositoryStatus { repository, status };
    let result = remote.interpret(effect).await.map(|_| Applied::Created);
    single("update repository status".to_string(), result)
}

fn single(operation: String, result: Result<Applied, RemoteApiError>) -> BatchReport {
    let mut report = BatchReport::default();
    match result {
        Ok(applied) => {
            debug!(%operation, ?applied, "Operation applied");
            report.record(applied);
        }
        Err(e) => {
            warn!(%operation, kind = ?e.kind, error = %e, "Operation failed");
            report.record_failure(operation, &e);
        }
    }
    report
}
