//! HTTP server for the sync engine.
//!
//! This module implements the HTTP server that:
//! - Accepts webhooks from the source host, validates signatures, and applies
//!   each event to the remote before answering
//! - Provides a health check that also reports the resolved endpoint
//!
//! # Endpoints
//!
//! - `POST /webhook` - Accepts webhook deliveries
//! - `GET /health` - Returns process status as JSON

use std::sync::Arc;

use tokio::sync::OnceCell;

use crate::config::Config;
use crate::remote::{HttpRemote, RemoteApiError, RemoteClient, ResolveError, establish};

pub mod health;
pub mod webhook;

pub use health::health_handler;
pub use webhook::webhook_handler;

/// Shared application state.
///
/// This is passed to all handlers via Axum's `State` extractor. The remote
/// interpreter is created lazily by the first delivery that needs it and
/// then shared for the life of the process.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    client: RemoteClient,

    /// Set once endpoint discovery succeeds. A failed discovery leaves it
    /// empty so the next delivery tries again.
    remote: OnceCell<HttpRemote>,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self, RemoteApiError> {
        let client = RemoteClient::new(&config)?;
        Ok(AppState {
            inner: Arc::new(AppStateInner {
                config,
                client,
                remote: OnceCell::new(),
            }),
        })
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Returns the remote interpreter, establishing the run context first if
    /// this is the first call. Concurrent first callers share one discovery.
    pub async fn remote(&self) -> Result<&HttpRemote, ResolveError> {
        let inner = &self.inner;
        inner
            .remote
            .get_or_try_init(|| async {
                let context = establish(&inner.client, &inner.config).await?;
                Ok(HttpRemote::new(
                    inner.client.clone(),
                    context,
                    inner.config.project_id,
                ))
            })
            .await
    }

    /// The remote interpreter, if the run context has been established.
    pub fn established(&self) -> Option<&HttpRemote> {
        self.inner.remote.get()
    }
}

/// Builds the axum Router with all endpoints.
pub fn build_router(app_state: AppState) -> axum::Router {
    use axum::routing::{get, post};

    axum::Router::new()
        .route("/webhook", post(webhook_handler))
        .route("/health", get(health_handler))
        .with_state(app_state)
}
