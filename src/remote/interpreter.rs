//! Remote effect interpreter over HTTP.
//!
//! Executes [`RemoteEffect`]s against the resolved endpoint. No retries
//! happen here: state-changing calls are attempted once and rely on the
//! remote's uniqueness rules for idempotency.

use reqwest::Method;
use serde::Deserialize;
use serde_json::{Value, json};
use url::Url;

use crate::types::{Commit, ProjectId, RemoteId, RemoteRepository, WorkItemId};

use super::client::RemoteClient;
use super::context::RunContext;
use super::effects::{
    NewItem, NewRepository, REPOSITORY_TYPE, RemoteEffect, RemoteInterpreter, RemoteResponse,
    RepositoryPage, RepositoryStatus, WorkItem,
};
use super::error::RemoteApiError;

/// Executes effects against a live remote instance.
#[derive(Debug, Clone)]
pub struct HttpRemote {
    client: RemoteClient,
    context: RunContext,
    project: ProjectId,
}

impl HttpRemote {
    pub fn new(client: RemoteClient, context: RunContext, project: ProjectId) -> Self {
        Self {
            client,
            context,
            project,
        }
    }

    pub fn context(&self) -> &RunContext {
        &self.context
    }

    fn request(&self, method: Method, url: &str) -> reqwest::RequestBuilder {
        self.client.request(method, url, self.context.session.as_ref())
    }

    fn url(&self, path: &str) -> String {
        self.context.profile.url(path)
    }
}

impl RemoteInterpreter for HttpRemote {
    async fn interpret(&self, effect: RemoteEffect) -> Result<RemoteResponse, RemoteApiError> {
        let name = effect.name();
        let result = execute_effect(self, effect).await;
        if let Err(e) = &result {
            tracing::debug!(effect = name, kind = ?e.kind, error = %e, "Remote call failed");
        }
        result
    }
}

async fn execute_effect(
    remote: &HttpRemote,
    effect: RemoteEffect,
) -> Result<RemoteResponse, RemoteApiError> {
    match effect {
        RemoteEffect::ListRepositories { page, page_size } => {
            list_repositories(remote, page, page_size).await
        }
        RemoteEffect::CreateRepository(new) => create_repository(remote, new).await,
        RemoteEffect::UpdateRepositoryStatus { repository, status } => {
            update_repository_status(remote, repository, status).await
        }
        RemoteEffect::CreateCommit { repository, commit } => {
            create_commit(remote, repository, commit).await
        }
        RemoteEffect::CreateBranch { repository, branch } => {
            create_branch(remote, repository, branch).await
        }
        RemoteEffect::DeleteBranch { repository, branch } => {
            delete_branch(remote, repository, &branch).await
        }
        RemoteEffect::GetWorkItem { id } => get_work_item(remote, id).await,
        RemoteEffect::PostComment { item, body, format } => {
            let payload = json!({
                "comment": body,
                "commentFormat": format.as_api_str(),
            });
            post(remote, &format!("items/{item}/comments"), payload).await
        }
        RemoteEffect::UpdateWorkItemStatus { item, status } => {
            let builder = remote
                .request(Method::PUT, &remote.url(&format!("items/{item}")))
                .json(&json!({ "status": { "name": status } }));
            remote.client.send_discard(builder).await?;
            Ok(RemoteResponse::Ok)
        }
        RemoteEffect::CreateItem(new) => create_item(remote, new).await,
    }
}

async fn post(
    remote: &HttpRemote,
    path: &str,
    payload: Value,
) -> Result<RemoteResponse, RemoteApiError> {
    let builder = remote.request(Method::POST, &remote.url(path)).json(&payload);
    remote.client.send_discard(builder).await?;
    Ok(RemoteResponse::Ok)
}

// ─── Mirrors ──────────────────────────────────────────────────────────────────

/// Repository listings come either as a bare array or as a page object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawRepositoryListing {
    Bare(Vec<RemoteRepository>),
    Paged {
        #[serde(default)]
        items: Vec<RemoteRepository>,
        total: Option<u64>,
    },
}

async fn list_repositories(
    remote: &HttpRemote,
    page: u32,
    page_size: u32,
) -> Result<RemoteResponse, RemoteApiError> {
    let url = remote.url(&format!("projects/{}/scmRepositories", remote.project));
    let builder = remote
        .request(Method::GET, &url)
        .query(&[("page", page), ("pageSize", page_size)]);
    let listing: RawRepositoryListing = remote.client.send_json(builder).await?;

    let page = match listing {
        // An unpaged listing is complete, so its length is the total.
        RawRepositoryListing::Bare(items) => RepositoryPage {
            total: Some(items.len() as u64),
            items,
        },
        RawRepositoryListing::Paged { items, total } => RepositoryPage { items, total },
    };
    Ok(RemoteResponse::Repositories(page))
}

async fn create_repository(
    remote: &HttpRemote,
    new: NewRepository,
) -> Result<RemoteResponse, RemoteApiError> {
    let url = remote.url(&format!("projects/{}/scmRepositories", remote.project));
    let payload = json!({
        "name": new.name,
        "description": new.description,
        "repositoryUrl": new.repository_url.as_str(),
        "type": REPOSITORY_TYPE,
        "projectId": remote.project.0,
    });
    let builder = remote.request(Method::POST, &url).json(&payload);
    let created: RemoteRepository = remote.client.send_json(builder).await?;
    Ok(RemoteResponse::Repository(created))
}

async fn update_repository_status(
    remote: &HttpRemote,
    repository: RemoteId,
    status: RepositoryStatus,
) -> Result<RemoteResponse, RemoteApiError> {
    let payload = json!({
        "lastSyncBranch": status.branch,
        "lastSyncCommitCount": status.commit_count,
        "lastSyncDate": status.synced_at.to_rfc3339(),
        "lastSyncBy": status.actor,
    });
    let builder = remote
        .request(Method::PUT, &remote.url(&format!("scmRepositories/{repository}")))
        .json(&payload);
    remote.client.send_discard(builder).await?;
    Ok(RemoteResponse::Ok)
}

// ─── Commits and branches ─────────────────────────────────────────────────────

async fn create_commit(
    remote: &HttpRemote,
    repository: RemoteId,
    commit: Commit,
) -> Result<RemoteResponse, RemoteApiError> {
    let payload = json!({
        "revision": commit.revision.as_str(),
        "message": commit.message,
        "author": commit.author_name,
        "authorEmail": commit.author_email,
        "date": commit.committed_at.to_rfc3339(),
        "repositoryId": repository.0,
    });
    post(remote, &format!("scmRepositories/{repository}/commits"), payload).await
}

async fn create_branch(
    remote: &HttpRemote,
    repository: RemoteId,
    branch: String,
) -> Result<RemoteResponse, RemoteApiError> {
    let payload = json!({
        "name": branch,
        "repositoryId": repository.0,
    });
    post(remote, &format!("scmRepositories/{repository}/branches"), payload).await
}

async fn delete_branch(
    remote: &HttpRemote,
    repository: RemoteId,
    branch: &str,
) -> Result<RemoteResponse, RemoteApiError> {
    // Branch names contain slashes; push() percent-encodes them as one segment.
    let base = remote.url(&format!("scmRepositories/{repository}/branches"));
    let mut url = Url::parse(&base)
        .map_err(|e| RemoteApiError::permanent(format!("invalid branch URL {base}: {e}")))?;
    url.path_segments_mut()
        .map_err(|()| RemoteApiError::permanent(format!("cannot-be-a-base URL {base}")))?
        .push(branch);

    let builder = remote.request(Method::DELETE, url.as_str());
    remote.client.send_discard(builder).await?;
    Ok(RemoteResponse::Ok)
}

// ─── Work items ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RawWorkItem {
    id: WorkItemId,
    #[serde(default)]
    name: String,
    status: Option<RawNamed>,
}

#[derive(Debug, Deserialize)]
struct RawNamed {
    name: Option<String>,
}

async fn get_work_item(
    remote: &HttpRemote,
    id: WorkItemId,
) -> Result<RemoteResponse, RemoteApiError> {
    let builder = remote.request(Method::GET, &remote.url(&format!("items/{id}")));
    let raw: RawWorkItem = remote.client.send_json(builder).await?;
    Ok(RemoteResponse::WorkItem(WorkItem {
        id: raw.id,
        name: raw.name,
        status: raw.status.and_then(|s| s.name),
    }))
}

#[derive(Debug, Deserialize)]
struct RawCreated {
    id: WorkItemId,
}

async fn create_item(remote: &HttpRemote, new: NewItem) -> Result<RemoteResponse, RemoteApiError> {
    let url = remote.url(&format!("projects/{}/items", remote.project));
    let payload = json!({
        "name": new.name,
        "description": new.description,
        "descriptionFormat": "Wiki",
        "priority": { "name": new.priority },
        "status": { "name": new.status },
    });
    let builder = remote.request(Method::POST, &url).json(&payload);
    let created: RawCreated = remote.client.send_json(builder).await?;
    Ok(RemoteResponse::ItemCreated(created.id))
}
