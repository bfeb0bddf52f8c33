//! Test utilities.
//!
//! Provides a config builder for tests that talk to a mock server, and an
//! in-memory [`FakeRemote`] that answers remote effects with the same
//! uniqueness rules the real instance applies.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Mutex;

use crate::config::Config;
use crate::remote::{
    NewItem, RemoteApiError, RemoteEffect, RemoteErrorKind, RemoteInterpreter, RemoteResponse,
    RepositoryPage, RepositoryStatus, WorkItem,
};
use crate::types::{RemoteId, RemoteRepository, Revision, WorkItemId};

// ============================================================================
// Config
// ============================================================================

/// A valid config pointing at `uri` (typically a `wiremock` server).
pub fn test_config(uri: &str) -> Config {
    test_config_with(uri, &[])
}

/// Like [`test_config`], with extra variables that override the defaults.
pub fn test_config_with(uri: &str, extra: &[(&str, &str)]) -> Config {
    let mut vars: HashMap<String, String> = [
        ("CODEBEAMER_URL", uri),
        ("CODEBEAMER_USERNAME", "bot"),
        ("CODEBEAMER_PASSWORD", "hunter2"),
        ("CODEBEAMER_PROJECT_ID", "68"),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    for (k, v) in extra {
        vars.insert(k.to_string(), v.to_string());
    }
    Config::from_lookup(|key| vars.get(key).cloned()).expect("test config should be valid")
}

// ============================================================================
// FakeRemote
// ============================================================================

type Predicate = Box<dyn Fn(&RemoteEffect) -> bool + Send>;

struct Fault {
    matches: Predicate,
    kind: RemoteErrorKind,
    /// `None` fails forever.
    remaining: Option<usize>,
}

#[derive(Default)]
struct FakeState {
    repositories: Vec<RemoteRepository>,
    commits: BTreeSet<(RemoteId, Revision)>,
    branches: BTreeSet<(RemoteId, String)>,
    work_items: BTreeMap<WorkItemId, WorkItem>,
    comments: Vec<(WorkItemId, String)>,
    created_items: Vec<(WorkItemId, NewItem)>,
    repository_statuses: Vec<(RemoteId, RepositoryStatus)>,
    faults: Vec<Fault>,
    /// Listings that still return nothing, to simulate a create race.
    stale_listings: usize,
    calls: Vec<RemoteEffect>,
}

/// An in-memory remote.
///
/// Creates are unique on their natural keys and answer a duplicate with a
/// 409 conflict. Every effect is recorded, and faults can be injected by
/// predicate. Each call yields to the scheduler first so concurrent callers
/// interleave the way separate HTTP requests would.
#[derive(Default)]
pub struct FakeRemote {
    state: Mutex<FakeState>,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds an existing mirror.
    pub fn add_repository(&self, name: &str, url: &str) -> RemoteId {
        let mut state = self.lock();
        let id = RemoteId(state.repositories.len() as u64 + 1);
        state.repositories.push(RemoteRepository {
            id,
            name: name.to_string(),
            repository_url: url.to_string(),
            repo_type: "GIT".to_string(),
        });
        id
    }

    /// Seeds a work item with the given status.
    pub fn add_work_item(&self, id: u64, status: &str) {
        let id = WorkItemId(id);
        self.lock().work_items.insert(
            id,
            WorkItem {
                id,
                name: format!("Item {id}"),
                status: Some(status.to_string()),
            },
        );
    }

    /// Fails every effect matching `matches` with an error of `kind`.
    pub fn fail_when(
        &self,
        kind: RemoteErrorKind,
        matches: impl Fn(&RemoteEffect) -> bool + Send + 'static,
    ) {
        self.push_fault(kind, matches, None);
    }

    /// Fails the next `times` effects matching `matches`.
    pub fn fail_times(
        &self,
        times: usize,
        kind: RemoteErrorKind,
        matches: impl Fn(&RemoteEffect) -> bool + Send + 'static,
    ) {
        self.push_fault(kind, matches, Some(times));
    }

    /// Makes the next `n` repository listings come back empty.
    pub fn stale_listings(&self, n: usize) {
        self.lock().stale_listings = n;
    }

    pub fn calls(&self) -> Vec<RemoteEffect> {
        self.lock().calls.clone()
    }

    /// Number of recorded calls with the given effect name.
    pub fn count(&self, name: &str) -> usize {
        self.lock().calls.iter().filter(|c| c.name() == name).count()
    }

    pub fn repositories(&self) -> Vec<RemoteRepository> {
        self.lock().repositories.clone()
    }

    pub fn commits(&self) -> Vec<(RemoteId, Revision)> {
        self.lock().commits.iter().cloned().collect()
    }

    pub fn branches(&self) -> Vec<(RemoteId, String)> {
        self.lock().branches.iter().cloned().collect()
    }

    pub fn comments(&self) -> Vec<(WorkItemId, String)> {
        self.lock().comments.clone()
    }

    pub fn created_items(&self) -> Vec<(WorkItemId, NewItem)> {
        self.lock().created_items.clone()
    }

    pub fn repository_statuses(&self) -> Vec<(RemoteId, RepositoryStatus)> {
        self.lock().repository_statuses.clone()
    }

    pub fn work_item_status(&self, id: u64) -> Option<String> {
        self.lock()
            .work_items
            .get(&WorkItemId(id))
            .and_then(|item| item.status.clone())
    }

    fn push_fault(
        &self,
        kind: RemoteErrorKind,
        matches: impl Fn(&RemoteEffect) -> bool + Send + 'static,
        remaining: Option<usize>,
    ) {
        self.lock().faults.push(Fault {
            matches: Box::new(matches),
            kind,
            remaining,
        });
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().expect("fake remote mutex poisoned")
    }
}

impl FakeState {
    fn take_fault(&mut self, effect: &RemoteEffect) -> Option<RemoteErrorKind> {
        let fault = self.faults.iter_mut().find(|f| {
            (f.matches)(effect) && f.remaining.is_none_or(|remaining| remaining > 0)
        })?;
        if let Some(remaining) = fault.remaining.as_mut() {
            *remaining -= 1;
        }
        Some(fault.kind)
    }

    fn apply(&mut self, effect: RemoteEffect) -> Result<RemoteResponse, RemoteApiError> {
        match effect {
            RemoteEffect::ListRepositories { page, page_size } => {
                if self.stale_listings > 0 {
                    self.stale_listings -= 1;
                    return Ok(RemoteResponse::Repositories(RepositoryPage {
                        items: Vec::new(),
                        total: Some(0),
                    }));
                }
                let size = page_size.max(1) as usize;
                let start = (page.max(1) as usize - 1) * size;
                let items = self
                    .repositories
                    .iter()
                    .skip(start)
                    .take(size)
                    .cloned()
                    .collect();
                Ok(RemoteResponse::Repositories(RepositoryPage {
                    items,
                    total: Some(self.repositories.len() as u64),
                }))
            }

            RemoteEffect::CreateRepository(new) => {
                if self
                    .repositories
                    .iter()
                    .any(|r| new.repository_url.matches(&r.repository_url))
                {
                    return Err(RemoteApiError::from_response(
                        409,
                        "repository already exists",
                    ));
                }
                let repo = RemoteRepository {
                    id: RemoteId(self.repositories.len() as u64 + 1),
                    name: new.name,
                    repository_url: new.repository_url.0,
                    repo_type: "GIT".to_string(),
                };
                self.repositories.push(repo.clone());
                Ok(RemoteResponse::Repository(repo))
            }

            RemoteEffect::UpdateRepositoryStatus { repository, status } => {
                self.require_repository(repository)?;
                self.repository_statuses.push((repository, status));
                Ok(RemoteResponse::Ok)
            }

            RemoteEffect::CreateCommit { repository, commit } => {
                self.require_repository(repository)?;
                if !self.commits.insert((repository, commit.revision)) {
                    return Err(RemoteApiError::from_response(409, "commit already exists"));
                }
                Ok(RemoteResponse::Ok)
            }

            RemoteEffect::CreateBranch { repository, branch } => {
                self.require_repository(repository)?;
                if !self.branches.insert((repository, branch)) {
                    return Err(RemoteApiError::from_response(409, "branch already exists"));
                }
                Ok(RemoteResponse::Ok)
            }

            RemoteEffect::DeleteBranch { repository, branch } => {
                self.require_repository(repository)?;
                if !self.branches.remove(&(repository, branch)) {
                    return Err(RemoteApiError::from_response(404, "branch not found"));
                }
                Ok(RemoteResponse::Ok)
            }

            RemoteEffect::GetWorkItem { id } => self
                .work_items
                .get(&id)
                .cloned()
                .map(RemoteResponse::WorkItem)
                .ok_or_else(|| RemoteApiError::from_response(404, "item not found")),

            RemoteEffect::PostComment { item, body, .. } => {
                if !self.work_items.contains_key(&item) {
                    return Err(RemoteApiError::from_response(404, "item not found"));
                }
                self.comments.push((item, body));
                Ok(RemoteResponse::Ok)
            }

            RemoteEffect::UpdateWorkItemStatus { item, status } => {
                let existing = self
                    .work_items
                    .get_mut(&item)
                    .ok_or_else(|| RemoteApiError::from_response(404, "item not found"))?;
                existing.status = Some(status);
                Ok(RemoteResponse::Ok)
            }

            RemoteEffect::CreateItem(new) => {
                let id = WorkItemId(1000 + self.created_items.len() as u64);
                self.work_items.insert(
                    id,
                    WorkItem {
                        id,
                        name: new.name.clone(),
                        status: Some(new.status.clone()),
                    },
                );
                self.created_items.push((id, new));
                Ok(RemoteResponse::ItemCreated(id))
            }
        }
    }

    fn require_repository(&self, id: RemoteId) -> Result<(), RemoteApiError> {
        if self.repositories.iter().any(|r| r.id == id) {
            Ok(())
        } else {
            Err(RemoteApiError::from_response(404, "repository not found"))
        }
    }
}

fn injected(kind: RemoteErrorKind) -> RemoteApiError {
    match kind {
        RemoteErrorKind::Authentication => RemoteApiError::from_response(401, "unauthorized"),
        RemoteErrorKind::NotFound => RemoteApiError::from_response(404, "not found"),
        RemoteErrorKind::Conflict => RemoteApiError::from_response(409, "already exists"),
        RemoteErrorKind::Transient => RemoteApiError::transient("operation timed out"),
        RemoteErrorKind::Permanent => RemoteApiError::from_response(400, "bad request"),
    }
}

impl RemoteInterpreter for FakeRemote {
    async fn interpret(&self, effect: RemoteEffect) -> Result<RemoteResponse, RemoteApiError> {
        tokio::task::yield_now().await;
        let mut state = self.lock();
        state.calls.push(effect.clone());
        if let Some(kind) = state.take_fault(&effect) {
            return Err(injected(kind));
        }
        state.apply(effect)
    }
}
