//! Get-or-create for the mirror of a source repository.
//!
//! The remote enforces nothing locally for us: two deliveries for the same
//! repository can both miss the lookup and both try to create. The loser's
//! create comes back as a conflict, and the reconciler answers it by
//! listing again. No in-process lock is involved.

use tracing::{debug, info, instrument, warn};

use crate::remote::{
    NewRepository, RemoteApiError, RemoteEffect, RemoteInterpreter, RemoteResponse,
    RepositoryPage, unexpected_response,
};
use crate::types::{RemoteRepository, SourceUrl};

/// Page size requested from the remote.
pub const PAGE_SIZE: u32 = 100;

/// Upper bound on pages walked in one lookup.
const MAX_PAGES: u32 = 500;

/// The display name for the mirror of `source`, e.g. `GitHub-hello`.
pub fn mirror_name(prefix: &str, source: &SourceUrl) -> String {
    format!("{prefix}-{}", source.repo_name())
}

/// The description stamped on every mirror this engine creates.
pub fn mirror_description(source: &SourceUrl) -> String {
    format!("Auto-synced from {source}")
}

/// Searches every page of mirrors for one tracking `source`.
pub async fn find_mirror<R: RemoteInterpreter>(
    remote: &R,
    source: &SourceUrl,
) -> Result<Option<RemoteRepository>, RemoteApiError> {
    let mut seen: u64 = 0;
    for page in 1..=MAX_PAGES {
        let RepositoryPage { items, total } = list_page(remote, page).await?;
        let len = items.len();
        if let Some(found) = items.into_iter().find(|r| r.tracks(source)) {
            return Ok(Some(found));
        }
        seen += len as u64;

        // The remote may cap the page size below what was asked for, so a
        // short page only ends the listing when no total is reported.
        let exhausted = match total {
            Some(total) => len == 0 || seen >= total,
            None => len < PAGE_SIZE as usize,
        };
        if exhausted {
            return Ok(None);
        }
    }
    warn!(pages = MAX_PAGES, "Stopped paging mirrors at the page cap");
    Ok(None)
}

async fn list_page<R: RemoteInterpreter>(
    remote: &R,
    page: u32,
) -> Result<RepositoryPage, RemoteApiError> {
    let effect = RemoteEffect::ListRepositories {
        page,
        page_size: PAGE_SIZE,
    };
    match remote.interpret(effect).await? {
        RemoteResponse::Repositories(page) => Ok(page),
        other => Err(unexpected_response("list_repositories", &other)),
    }
}

/// Returns the mirror for `source`, creating it if none exists.
///
/// A conflict on create means another delivery won the race; the mirror is
/// then looked up again and returned. If it still cannot be found the
/// conflict is returned as the error.
#[instrument(skip_all, fields(source = %source))]
pub async fn resolve_mirror<R: RemoteInterpreter>(
    remote: &R,
    prefix: &str,
    source: &SourceUrl,
) -> Result<RemoteRepository, RemoteApiError> {
    if let Some(existing) = find_mirror(remote, source).await? {
        debug!(repository = %existing.id, "Found existing mirror");
        return Ok(existing);
    }

    let request = NewRepository {
        name: mirror_name(prefix, source),
        description: mirror_description(source),
        repository_url: source.clone(),
    };
    match remote.interpret(RemoteEffect::CreateRepository(request)).await {
        Ok(RemoteResponse::Repository(created)) => {
            info!(repository = %created.id, name = %created.name, "Created mirror");
            Ok(created)
        }
        Ok(other) => Err(unexpected_response("create_repository", &other)),
        Err(e) if e.is_conflict() => {
            debug!("Mirror created concurrently; looking it up again");
            match find_mirror(remote, source).await? {
                Some(existing) => Ok(existing),
                None => Err(e),
            }
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::RemoteErrorKind;
    use crate::test_utils::FakeRemote;
    use proptest::prelude::*;

    fn hello() -> SourceUrl {
        SourceUrl::new("https://github.com/octo/hello.git")
    }

    /// Serves listings in pages of at most `cap`, whatever size was asked for.
    struct CappedPages {
        inner: FakeRemote,
        cap: u32,
    }

    impl RemoteInterpreter for CappedPages {
        async fn interpret(&self, effect: RemoteEffect) -> Result<RemoteResponse, RemoteApiError> {
            let effect = match effect {
                RemoteEffect::ListRepositories { page, page_size } => {
                    RemoteEffect::ListRepositories {
                        page,
                        page_size: page_size.min(self.cap),
                    }
                }
                other => other,
            };
            self.inner.interpret(effect).await
        }
    }

    #[test]
    fn name_and_description_derive_from_url() {
        assert_eq!(mirror_name("GitHub", &hello()), "GitHub-hello");
        assert_eq!(
            mirror_description(&hello()),
            "Auto-synced from https://github.com/octo/hello.git"
        );
    }

    #[tokio::test]
    async fn resolve_twice_returns_the_same_mirror() {
        let remote = FakeRemote::new();

        let first = resolve_mirror(&remote, "GitHub", &hello()).await.unwrap();
        let second = resolve_mirror(&remote, "GitHub", &hello()).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(remote.count("create_repository"), 1);
        assert_eq!(remote.repositories().len(), 1);
    }

    #[tokio::test]
    async fn existing_mirror_matches_without_git_suffix() {
        let remote = FakeRemote::new();
        let id = remote.add_repository("GitHub-hello", "https://github.com/octo/hello");

        let found = resolve_mirror(&remote, "GitHub", &hello()).await.unwrap();
        assert_eq!(found.id, id);
        assert_eq!(remote.count("create_repository"), 0);
    }

    #[tokio::test]
    async fn create_race_resolves_to_the_winner() {
        let remote = FakeRemote::new();
        let winner = remote.add_repository("GitHub-hello", hello().as_str());
        // Our lookup misses the mirror the other delivery just created.
        remote.stale_listings(1);

        let resolved = resolve_mirror(&remote, "GitHub", &hello()).await.unwrap();

        assert_eq!(resolved.id, winner);
        assert_eq!(remote.count("create_repository"), 1);
        assert_eq!(remote.repositories().len(), 1);
    }

    #[tokio::test]
    async fn conflict_without_a_match_is_an_error() {
        let remote = FakeRemote::new();
        remote.fail_when(RemoteErrorKind::Conflict, |e| {
            matches!(e, RemoteEffect::CreateRepository(_))
        });

        let err = resolve_mirror(&remote, "GitHub", &hello()).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn lookup_walks_every_page() {
        let remote = FakeRemote::new();
        for i in 0..(PAGE_SIZE + 5) {
            remote.add_repository(&format!("r{i}"), &format!("https://github.com/octo/r{i}"));
        }
        let target = remote.add_repository("GitHub-hello", hello().as_str());

        let found = find_mirror(&remote, &hello()).await.unwrap().unwrap();
        assert_eq!(found.id, target);
        assert_eq!(remote.count("list_repositories"), 2);
    }

    #[tokio::test]
    async fn capped_page_size_still_walks_to_the_total() {
        let inner = FakeRemote::new();
        for i in 0..54 {
            inner.add_repository(&format!("r{i}"), &format!("https://github.com/octo/r{i}"));
        }
        let target = inner.add_repository("GitHub-hello", hello().as_str());
        for i in 55..60 {
            inner.add_repository(&format!("r{i}"), &format!("https://github.com/octo/r{i}"));
        }
        let remote = CappedPages { inner, cap: 25 };

        let resolved = resolve_mirror(&remote, "GitHub", &hello()).await.unwrap();

        assert_eq!(resolved.id, target);
        assert_eq!(remote.inner.count("list_repositories"), 3);
        assert_eq!(remote.inner.count("create_repository"), 0);
        assert_eq!(remote.inner.repositories().len(), 60);
    }

    #[tokio::test]
    async fn listing_failure_is_propagated() {
        let remote = FakeRemote::new();
        remote.fail_when(RemoteErrorKind::Transient, |e| {
            matches!(e, RemoteEffect::ListRepositories { .. })
        });

        let err = resolve_mirror(&remote, "GitHub", &hello()).await.unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::Transient);
        assert_eq!(remote.count("create_repository"), 0);
    }

    proptest! {
        #[test]
        fn mirror_name_uses_last_segment(repo in "[a-z][a-z0-9_-]{0,30}") {
            let source = SourceUrl::new(format!("https://github.com/octo/{repo}.git"));
            prop_assert_eq!(mirror_name("GitHub", &source), format!("GitHub-{repo}"));
        }
    }
}
