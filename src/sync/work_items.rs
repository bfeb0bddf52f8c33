//! Work-item references in commit messages and pull requests.
//!
//! Two grammars are recognised: `#123` and `KEY-123`. Both resolve to the
//! numeric item id. A closing keyword anywhere in the text (`fixes`,
//! `closes`, `resolves`, `completes` and their inflections) also asks for a
//! status transition on every referenced item.
//!
//! The comment and the transition are separate remote calls; either may fail
//! without preventing the other.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info, warn};

use crate::remote::{
    CommentFormat, RemoteApiError, RemoteEffect, RemoteInterpreter, RemoteResponse,
    unexpected_response,
};
use crate::types::{Commit, WorkItemId};
use crate::webhooks::PullRequestEvent;

use super::report::{Applied, BatchReport};

static HASH_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"#(\d+)\b").expect("hash reference pattern is valid"));

static KEY_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Z]+-(\d+)\b").expect("key reference pattern is valid"));

static CLOSING_KEYWORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(fix(?:es|ed)?|close[sd]?|resolve[sd]?|complete[sd]?)\b")
        .expect("closing keyword pattern is valid")
});

/// Status set on items referenced next to `fix`/`close`/`resolve`.
pub const RESOLVED_STATUS: &str = "Resolved";

/// Status set on items referenced next to `complete`.
pub const DONE_STATUS: &str = "Done";

/// All work-item ids referenced in `text`, de-duplicated.
pub fn extract_references(text: &str) -> BTreeSet<WorkItemId> {
    HASH_REF
        .captures_iter(text)
        .chain(KEY_REF.captures_iter(text))
        .filter_map(|c| c.get(1)?.as_str().parse::<u64>().ok())
        .map(WorkItemId)
        .collect()
}

/// The status a closing keyword in `text` asks for, if any.
///
/// The first keyword wins.
pub fn closing_status(text: &str) -> Option<&'static str> {
    let keyword = CLOSING_KEYWORD.captures(text)?.get(1)?.as_str().to_lowercase();
    if keyword.starts_with("complete") {
        Some(DONE_STATUS)
    } else {
        Some(RESOLVED_STATUS)
    }
}

/// The comment posted on an item referenced by a commit.
pub fn commit_comment(repository: &str, commit: &Commit) -> String {
    format!(
        "Commit {} in {} by {} <{}> at {}\n\n{}",
        commit.revision,
        repository,
        commit.author_name,
        commit.author_email,
        commit.committed_at.to_rfc3339(),
        commit.message.trim_end()
    )
}

/// The comment posted on an item referenced by a pull request.
pub fn pull_request_comment(pr: &PullRequestEvent) -> String {
    let mut body = format!(
        "Pull request #{} {} by {}: {}",
        pr.number,
        action_label(pr),
        pr.meta.actor,
        pr.title
    );
    body.push_str(&format!("\nBranch: {} -> {}", pr.head_ref, pr.base_ref));
    if let Some(url) = &pr.url {
        body.push_str(&format!("\n{url}"));
    }
    body
}

fn action_label(pr: &PullRequestEvent) -> &'static str {
    use crate::webhooks::PrAction;
    match pr.action {
        PrAction::Opened => "opened",
        PrAction::Reopened => "reopened",
        PrAction::Edited => "edited",
        PrAction::Synchronize => "updated",
        PrAction::Closed if pr.merged => "merged",
        PrAction::Closed => "closed",
        PrAction::Other => "changed",
    }
}

/// Comments on (and possibly transitions) every item a commit references.
pub async fn link_commit<R: RemoteInterpreter>(
    remote: &R,
    repository: &str,
    commit: &Commit,
) -> BatchReport {
    let references = extract_references(&commit.message);
    if references.is_empty() {
        return BatchReport::default();
    }
    let status = closing_status(&commit.message);
    let body = commit_comment(repository, commit);
    debug!(
        revision = %commit.revision.short(),
        items = references.len(),
        ?status,
        "Linking commit to work items"
    );
    link_all(remote, &references, &body, status).await
}

/// Comments on every item a pull request references.
///
/// Status transitions happen only when `transition` is set (a merged PR).
pub async fn link_pull_request<R: RemoteInterpreter>(
    remote: &R,
    pr: &PullRequestEvent,
    transition: bool,
) -> BatchReport {
    let text = pr.text();
    let references = extract_references(&text);
    if references.is_empty() {
        return BatchReport::default();
    }
    let status = if transition {
        closing_status(&text)
    } else {
        None
    };
    let body = pull_request_comment(pr);
    link_all(remote, &references, &body, status).await
}

async fn link_all<R: RemoteInterpreter>(
    remote: &R,
    references: &BTreeSet<WorkItemId>,
    body: &str,
    status: Option<&str>,
) -> BatchReport {
    let mut report = BatchReport::default();
    for &item in references {
        match post_comment(remote, item, body).await {
            Ok(applied) => report.record(applied),
            Err(e) => {
                warn!(%item, error = %e, "Failed to comment on work item");
                report.record_failure(format!("comment on item {item}"), &e);
            }
        }

        // Attempted even when the comment failed.
        if let Some(status) = status {
            match transition(remote, item, status).await {
                Ok(applied) => report.record(applied),
                Err(e) => {
                    warn!(%item, status, error = %e, "Failed to transition work item");
                    report.record_failure(format!("transition item {item}"), &e);
                }
            }
        }
    }
    report
}

async fn post_comment<R: RemoteInterpreter>(
    remote: &R,
    item: WorkItemId,
    body: &str,
) -> Result<Applied, RemoteApiError> {
    let effect = RemoteEffect::PostComment {
        item,
        body: body.to_string(),
        format: CommentFormat::PlainText,
    };
    remote.interpret(effect).await?;
    Ok(Applied::Created)
}

/// Moves `item` to `status` unless it is already terminal.
pub async fn transition<R: RemoteInterpreter>(
    remote: &R,
    item: WorkItemId,
    status: &str,
) -> Result<Applied, RemoteApiError> {
    let current = match remote.interpret(RemoteEffect::GetWorkItem { id: item }).await? {
        RemoteResponse::WorkItem(current) => current,
        other => return Err(unexpected_response("get_work_item", &other)),
    };
    if current.is_terminal() {
        debug!(%item, current = ?current.status, "Work item already terminal");
        return Ok(Applied::AlreadyPresent);
    }

    let effect = RemoteEffect::UpdateWorkItemStatus {
        item,
        status: status.to_string(),
    };
    remote.interpret(effect).await?;
    info!(%item, status, "Transitioned work item");
    Ok(Applied::Created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;

    use crate::remote::RemoteErrorKind;
    use crate::test_utils::FakeRemote;
    use crate::types::Revision;

    fn ids(ids: &[u64]) -> BTreeSet<WorkItemId> {
        ids.iter().copied().map(WorkItemId).collect()
    }

    fn commit(message: &str) -> Commit {
        Commit {
            revision: Revision::new("0d1a26e67d8f5eaf1f6ba5c57fc3c7d91ac0fd1c"),
            message: message.to_string(),
            author_name: "Octo Cat".to_string(),
            author_email: "octo@example.com".to_string(),
            committed_at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn extracts_both_grammars() {
        assert_eq!(extract_references("Fixes #42 and refs CB-7"), ids(&[42, 7]));
    }

    #[test]
    fn no_references_is_empty() {
        assert!(extract_references("Tidy up the README").is_empty());
    }

    #[test]
    fn duplicates_collapse() {
        assert_eq!(extract_references("#5, #5 and TASK-5"), ids(&[5]));
    }

    #[test]
    fn lowercase_keys_are_not_references() {
        assert!(extract_references("see cb-7").is_empty());
    }

    #[test]
    fn closing_keywords_pick_a_status() {
        assert_eq!(closing_status("Fixes #1"), Some(RESOLVED_STATUS));
        assert_eq!(closing_status("closed CB-2"), Some(RESOLVED_STATUS));
        assert_eq!(closing_status("Completes #3"), Some(DONE_STATUS));
        assert_eq!(closing_status("Refs #4"), None);
        assert_eq!(closing_status("prefix-fixer #4"), None);
    }

    #[test]
    fn first_keyword_wins() {
        assert_eq!(closing_status("Completed #1, fixes #2"), Some(DONE_STATUS));
    }

    #[test]
    fn commit_comment_names_the_commit() {
        let body = commit_comment("GitHub-hello", &commit("Fix widget\n"));
        assert!(body.starts_with(
            "Commit 0d1a26e67d8f5eaf1f6ba5c57fc3c7d91ac0fd1c in GitHub-hello"
        ));
        assert!(body.contains("Octo Cat <octo@example.com>"));
        assert!(body.contains("2024-03-01T12:00:00+00:00"));
        assert!(body.ends_with("Fix widget"));
    }

    #[tokio::test]
    async fn closing_commit_comments_and_transitions() {
        let remote = FakeRemote::new();
        remote.add_work_item(42, "In Progress");
        remote.add_work_item(7, "New");

        let report = link_commit(&remote, "GitHub-hello", &commit("Fixes #42 and refs CB-7")).await;

        assert!(report.is_clean());
        assert_eq!(remote.comments().len(), 2);
        assert_eq!(remote.work_item_status(42).as_deref(), Some("Resolved"));
        assert_eq!(remote.work_item_status(7).as_deref(), Some("Resolved"));
    }

    #[tokio::test]
    async fn terminal_items_are_not_transitioned() {
        let remote = FakeRemote::new();
        remote.add_work_item(42, "Closed");

        let report = link_commit(&remote, "GitHub-hello", &commit("Fixes #42")).await;

        assert!(report.is_clean());
        assert_eq!(report.already_present, 1);
        assert_eq!(remote.count("update_work_item_status"), 0);
        assert_eq!(remote.work_item_status(42).as_deref(), Some("Closed"));
    }

    #[tokio::test]
    async fn failed_comment_does_not_block_transition() {
        let remote = FakeRemote::new();
        remote.add_work_item(42, "New");
        remote.fail_when(RemoteErrorKind::Transient, |e| {
            matches!(e, RemoteEffect::PostComment { .. })
        });

        let report = link_commit(&remote, "GitHub-hello", &commit("Fixes #42")).await;

        assert_eq!(report.failures.len(), 1);
        assert_eq!(remote.work_item_status(42).as_deref(), Some("Resolved"));
    }

    #[tokio::test]
    async fn failed_transition_does_not_block_comment() {
        let remote = FakeRemote::new();
        remote.add_work_item(42, "New");
        remote.fail_when(RemoteErrorKind::Permanent, |e| {
            matches!(e, RemoteEffect::UpdateWorkItemStatus { .. })
        });

        let report = link_commit(&remote, "GitHub-hello", &commit("Fixes #42")).await;

        assert_eq!(report.created, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(remote.comments().len(), 1);
    }

    #[tokio::test]
    async fn unknown_item_is_a_recorded_failure() {
        let remote = FakeRemote::new();

        let report = link_commit(&remote, "GitHub-hello", &commit("refs #9")).await;

        assert_eq!(report.failures_of(RemoteErrorKind::NotFound), 1);
    }

    proptest! {
        #[test]
        fn extraction_never_panics(text in "\\PC{0,200}") {
            let _ = extract_references(&text);
            let _ = closing_status(&text);
        }

        #[test]
        fn hash_references_round_trip(n in 1u64..1_000_000) {
            prop_assert_eq!(extract_references(&format!("see #{n}.")), ids(&[n]));
        }
    }
}
