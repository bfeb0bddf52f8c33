//! Endpoint discovery.
//!
//! The remote's API base path depends on its deployed version and is not
//! advertised. Each candidate base is probed with `GET {base}/user` and the
//! result is classified:
//!
//! - `Success`: the call returned a JSON object; stop here
//! - `ShapeMismatch`: 404 or a non-JSON page; try the next candidate
//! - `AuthFailure`: 401/403; abort, credentials are the problem
//! - `Transient`: timeout or 5xx after retries; try the next, note as degraded
//!
//! If no token-authenticated candidate answers and the session fallback is
//! enabled, the resolver logs in through the web form and probes the session
//! candidates with the resulting cookies.

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::Config;

use super::client::RemoteClient;
use super::context::{AuthSession, RunContext};
use super::error::{RemoteApiError, RemoteErrorKind};
use super::retry::{RetryConfig, retry_with_backoff};
use super::session::{self, SessionError};

/// Classified result of probing one candidate.
#[derive(Debug)]
pub enum ProbeOutcome {
    Success,
    ShapeMismatch,
    AuthFailure(RemoteApiError),
    Transient(RemoteApiError),
}

/// Errors from establishing a run context.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// Credentials were rejected. Not retried, and no further candidates are
    /// tried.
    #[error("authentication rejected at {base_url}: {source}")]
    Authentication {
        base_url: String,
        #[source]
        source: RemoteApiError,
    },

    /// Every candidate was tried and none answered.
    #[error("no API endpoint available (tried: {}; degraded: {})", tried.join(", "), degraded.join(", "))]
    EndpointUnavailable {
        tried: Vec<String>,
        degraded: Vec<String>,
    },

    #[error("session fallback failed: {0}")]
    Session(#[from] SessionError),
}

/// Probes one base URL.
pub async fn probe(
    client: &RemoteClient,
    base_url: &str,
    session: Option<&AuthSession>,
    retry: RetryConfig,
) -> ProbeOutcome {
    let url = format!("{}/user", base_url.trim_end_matches('/'));
    let url = url.as_str();
    let result = retry_with_backoff(retry, || async move {
        let builder = client.request(reqwest::Method::GET, url, session);
        client.send_json::<Value>(builder).await
    })
    .await
    .into_result();

    match result {
        Ok(Value::Object(_)) => ProbeOutcome::Success,
        Ok(_) => ProbeOutcome::ShapeMismatch,
        Err(e) => match e.kind {
            RemoteErrorKind::Authentication => ProbeOutcome::AuthFailure(e),
            RemoteErrorKind::Transient => ProbeOutcome::Transient(e),
            RemoteErrorKind::NotFound | RemoteErrorKind::Conflict | RemoteErrorKind::Permanent => {
                ProbeOutcome::ShapeMismatch
            }
        },
    }
}

/// Discovers a working endpoint, falling back to a session login.
#[derive(Debug)]
pub struct EndpointResolver<'a> {
    client: &'a RemoteClient,
    config: &'a Config,
    retry: RetryConfig,
}

/// Tracks candidates across both passes.
#[derive(Default)]
struct Attempts {
    tried: Vec<String>,
    degraded: Vec<String>,
}

impl<'a> EndpointResolver<'a> {
    pub fn new(client: &'a RemoteClient, config: &'a Config) -> Self {
        Self {
            client,
            config,
            retry: RetryConfig::PROBE,
        }
    }

    /// Overrides the per-candidate retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub async fn resolve(&self) -> Result<RunContext, ResolveError> {
        let mut attempts = Attempts::default();
        debug!(
            candidates = self.config.api_candidates.len(),
            max_wait_per_candidate = ?self.retry.total_max_wait(),
            "Probing API endpoints"
        );

        if let Some(base_url) = self
            .first_success(&self.config.api_candidates, None, &mut attempts)
            .await?
        {
            info!(%base_url, "Resolved remote API endpoint (token mode)");
            return Ok(RunContext::token(base_url));
        }

        if !self.config.session_fallback {
            debug!("Session fallback disabled");
        } else if self.client.credentials().password().is_none() {
            warn!("Session fallback skipped: no password configured");
        } else {
            info!("No token endpoint answered; trying session login");
            let session = session::login(self.client, self.config).await?;
            if let Some(base_url) = self
                .first_success(&self.config.session_candidates, Some(&session), &mut attempts)
                .await?
            {
                info!(%base_url, "Resolved remote API endpoint (session mode)");
                return Ok(RunContext::session(base_url, session));
            }
        }

        warn!(
            tried = attempts.tried.len(),
            degraded = attempts.degraded.len(),
            "No remote API endpoint available"
        );
        Err(ResolveError::EndpointUnavailable {
            tried: attempts.tried,
            degraded: attempts.degraded,
        })
    }

    /// Probes candidates in order. `Ok(None)` means none succeeded.
    async fn first_success(
        &self,
        candidates: &[String],
        session: Option<&AuthSession>,
        attempts: &mut Attempts,
    ) -> Result<Option<String>, ResolveError> {
        for candidate in candidates {
            let base_url = self.client.root_url(candidate);
            attempts.tried.push(base_url.clone());

            match probe(self.client, &base_url, session, self.retry).await {
                ProbeOutcome::Success => return Ok(Some(base_url)),
                ProbeOutcome::ShapeMismatch => {
                    debug!(%base_url, "Candidate does not expose the API");
                }
                ProbeOutcome::AuthFailure(source) => {
                    warn!(%base_url, error = %source, "Credentials rejected; aborting discovery");
                    return Err(ResolveError::Authentication { base_url, source });
                }
                ProbeOutcome::Transient(e) => {
                    warn!(%base_url, error = %e, "Candidate degraded; trying next");
                    attempts.degraded.push(base_url);
                }
            }
        }
        Ok(None)
    }
}

/// Establishes the run context for `config`.
pub async fn establish(client: &RemoteClient, config: &Config) -> Result<RunContext, ResolveError> {
    EndpointResolver::new(client, config).resolve().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::remote::context::AuthMode;
    use crate::test_utils::test_config_with;

    fn config(server: &MockServer, candidates: &str, fallback: bool) -> Config {
        test_config_with(
            &server.uri(),
            &[
                ("CODEBEAMER_API_CANDIDATES", candidates),
                (
                    "CODEBEAMER_SESSION_FALLBACK",
                    if fallback { "true" } else { "false" },
                ),
            ],
        )
    }

    async fn answer(server: &MockServer, at: &str, status: u16) {
        let template = ResponseTemplate::new(status);
        let template = if status == 200 {
            template.set_body_json(serde_json::json!({ "id": 1, "name": "bot" }))
        } else {
            template
        };
        Mock::given(method("GET"))
            .and(path(at))
            .respond_with(template)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn first_successful_candidate_wins() {
        let server = MockServer::start().await;
        answer(&server, "/a/user", 404).await;
        answer(&server, "/b/user", 200).await;

        let config = config(&server, "/a,/b", false);
        let client = RemoteClient::new(&config).unwrap();
        let ctx = EndpointResolver::new(&client, &config)
            .with_retry(RetryConfig::NONE)
            .resolve()
            .await
            .unwrap();

        assert_eq!(ctx.profile.base_url, format!("{}/b", server.uri()));
        assert_eq!(ctx.profile.auth_mode, AuthMode::Token);
    }

    #[tokio::test]
    async fn auth_failure_aborts_before_later_candidates() {
        let server = MockServer::start().await;
        answer(&server, "/a/user", 404).await;
        answer(&server, "/b/user", 401).await;
        Mock::given(method("GET"))
            .and(path("/c/user"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(0)
            .mount(&server)
            .await;

        let config = config(&server, "/a,/b,/c", true);
        let client = RemoteClient::new(&config).unwrap();
        let err = EndpointResolver::new(&client, &config)
            .with_retry(RetryConfig::NONE)
            .resolve()
            .await
            .unwrap_err();

        match err {
            ResolveError::Authentication { base_url, .. } => {
                assert_eq!(base_url, format!("{}/b", server.uri()));
            }
            other => panic!("expected Authentication, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn transient_candidates_are_skipped_and_recorded() {
        let server = MockServer::start().await;
        answer(&server, "/a/user", 503).await;
        answer(&server, "/b/user", 404).await;

        let config = config(&server, "/a,/b", false);
        let client = RemoteClient::new(&config).unwrap();
        let err = EndpointResolver::new(&client, &config)
            .with_retry(RetryConfig::NONE)
            .resolve()
            .await
            .unwrap_err();

        match err {
            ResolveError::EndpointUnavailable { tried, degraded } => {
                assert_eq!(tried.len(), 2);
                assert_eq!(degraded, vec![format!("{}/a", server.uri())]);
            }
            other => panic!("expected EndpointUnavailable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn transient_probe_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/a/user"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        answer(&server, "/a/user", 200).await;

        let config = config(&server, "/a", false);
        let client = RemoteClient::new(&config).unwrap();
        let retry = RetryConfig::new(
            2,
            std::time::Duration::from_millis(1),
            std::time::Duration::from_millis(5),
            2.0,
        );
        let ctx = EndpointResolver::new(&client, &config)
            .with_retry(retry)
            .resolve()
            .await
            .unwrap();
        assert_eq!(ctx.profile.base_url, format!("{}/a", server.uri()));
    }

    #[tokio::test]
    async fn html_page_is_a_shape_mismatch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/a/user"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>login</html>"))
            .mount(&server)
            .await;

        let config = config(&server, "/a", false);
        let client = RemoteClient::new(&config).unwrap();
        let outcome = probe(
            &client,
            &format!("{}/a", server.uri()),
            None,
            RetryConfig::NONE,
        )
        .await;
        assert!(matches!(outcome, ProbeOutcome::ShapeMismatch));
    }

    #[tokio::test]
    async fn falls_back_to_session_mode() {
        let server = MockServer::start().await;
        answer(&server, "/rest/user", 404).await;
        Mock::given(method("GET"))
            .and(path("/cb/login.spr"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<input type="hidden" name="targetURL" value="">"#,
            ))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/cb/login.spr"))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("set-cookie", "JSESSIONID=s1; Path=/")
                    .insert_header("location", "/cb/user"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/cb/user"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<h1>Home</h1>"))
            .mount(&server)
            .await;
        answer(&server, "/cb/rest/v3/user", 404).await;
        answer(&server, "/cb/api/v3/user", 200).await;

        let config = config(&server, "/rest", true);
        let client = RemoteClient::new(&config).unwrap();
        let ctx = EndpointResolver::new(&client, &config)
            .with_retry(RetryConfig::NONE)
            .resolve()
            .await
            .unwrap();

        assert_eq!(ctx.profile.auth_mode, AuthMode::Session);
        assert_eq!(ctx.profile.base_url, format!("{}/cb/api/v3", server.uri()));
        let session = ctx.session.unwrap();
        assert_eq!(session.cookie_header(), "JSESSIONID=s1");
    }
}
