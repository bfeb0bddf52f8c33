//! reqwest client wrapper for the remote instance.
//!
//! `RemoteClient` owns the HTTP client, the instance root and the configured
//! credentials. It attaches authentication to each request (credential header
//! in token mode, cookie plus anti-forgery header in session mode) and turns
//! non-success responses into classified [`RemoteApiError`]s.

use reqwest::header::{ACCEPT, COOKIE, LOCATION};
use reqwest::redirect::Policy;
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;

use crate::config::{Config, Credentials};

use super::context::AuthSession;
use super::error::{RemoteApiError, RemoteErrorKind};

/// Header carrying the anti-forgery token in session mode.
pub const ANTI_FORGERY_HEADER: &str = "X-CSRF-Token";

const USER_AGENT: &str = concat!("codebeamer-sync/", env!("CARGO_PKG_VERSION"));

/// An HTTP client bound to one remote instance.
#[derive(Clone)]
pub struct RemoteClient {
    http: reqwest::Client,
    root: String,
    credentials: Credentials,
}

impl RemoteClient {
    /// Builds a client from configuration.
    ///
    /// Redirects are never followed automatically; the login flow inspects
    /// them and API calls treat them as failures.
    pub fn new(config: &Config) -> Result<Self, RemoteApiError> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .redirect(Policy::none())
            .user_agent(USER_AGENT)
            .build()
            .map_err(RemoteApiError::from_reqwest)?;

        Ok(Self {
            http,
            root: config.remote_url.as_str().trim_end_matches('/').to_string(),
            credentials: config.credentials.clone(),
        })
    }

    /// Returns the underlying reqwest client.
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Joins a path onto the instance root.
    pub fn root_url(&self, path: &str) -> String {
        format!("{}/{}", self.root, path.trim_start_matches('/'))
    }

    /// Starts an authenticated request.
    pub fn request(
        &self,
        method: Method,
        url: &str,
        session: Option<&AuthSession>,
    ) -> RequestBuilder {
        let builder = self
            .http
            .request(method, url)
            .header(ACCEPT, "application/json");

        match session {
            Some(session) => {
                let builder = builder.header(COOKIE, session.cookie_header());
                match &session.anti_forgery_token {
                    Some(token) => builder.header(ANTI_FORGERY_HEADER, token),
                    None => builder,
                }
            }
            None => match &self.credentials {
                Credentials::Basic { username, password } => {
                    builder.basic_auth(username, Some(password))
                }
                Credentials::Token { token, .. } => builder.bearer_auth(token),
            },
        }
    }

    /// Sends a request and decodes a JSON response body.
    ///
    /// An empty success body decodes as JSON `null`.
    pub async fn send_json<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
    ) -> Result<T, RemoteApiError> {
        let response = self.send_checked(builder).await?;
        let text = response.text().await.map_err(RemoteApiError::from_reqwest)?;
        let body = if text.trim().is_empty() { "null" } else { text.as_str() };

        serde_json::from_str(body).map_err(|e| {
            RemoteApiError::permanent(format!("unexpected response shape: {e}"))
        })
    }

    /// Sends a request and discards any success body.
    pub async fn send_discard(&self, builder: RequestBuilder) -> Result<(), RemoteApiError> {
        self.send_checked(builder).await.map(|_| ())
    }

    async fn send_checked(&self, builder: RequestBuilder) -> Result<Response, RemoteApiError> {
        let response = builder.send().await.map_err(RemoteApiError::from_reqwest)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        // An expired session is answered with a redirect to the login page.
        if status.is_redirection() {
            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            let kind = if location.to_lowercase().contains("login") {
                RemoteErrorKind::Authentication
            } else {
                RemoteErrorKind::Permanent
            };
            return Err(RemoteApiError {
                kind,
                status_code: Some(status.as_u16()),
                message: format!("unexpected redirect to {location:?}"),
                source: None,
            });
        }

        let body = response.text().await.unwrap_or_default();
        Err(RemoteApiError::from_response(status.as_u16(), &body))
    }
}

impl std::fmt::Debug for RemoteClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteClient")
            .field("root", &self.root)
            .field("credentials", &self.credentials)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::test_utils::test_config;

    #[tokio::test]
    async fn basic_credentials_are_attached_without_session() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v3/user"))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": 1})))
            .expect(1)
            .mount(&server)
            .await;

        let client = RemoteClient::new(&test_config(&server.uri())).unwrap();
        let url = client.root_url("/rest/v3/user");
        let value: serde_json::Value = client
            .send_json(client.request(Method::GET, &url, None))
            .await
            .unwrap();
        assert_eq!(value["id"], 1);
    }

    #[tokio::test]
    async fn session_attaches_cookie_and_anti_forgery_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cb/api/v3/user"))
            .and(header("cookie", "JSESSIONID=s1"))
            .and(header(ANTI_FORGERY_HEADER, "t1"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let client = RemoteClient::new(&test_config(&server.uri())).unwrap();
        let session = AuthSession {
            cookies: vec![("JSESSIONID".to_string(), "s1".to_string())],
            anti_forgery_token: Some("t1".to_string()),
        };
        let url = client.root_url("/cb/api/v3/user");
        let value: serde_json::Value = client
            .send_json(client.request(Method::GET, &url, Some(&session)))
            .await
            .unwrap();
        assert!(value.is_null());
    }

    #[tokio::test]
    async fn error_statuses_are_classified() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/dup"))
            .respond_with(ResponseTemplate::new(409).set_body_string("exists"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/expired"))
            .respond_with(ResponseTemplate::new(302).insert_header("location", "/cb/login.spr"))
            .mount(&server)
            .await;

        let client = RemoteClient::new(&test_config(&server.uri())).unwrap();

        let err = client
            .send_discard(client.request(Method::POST, &client.root_url("/dup"), None))
            .await
            .unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::Conflict);
        assert_eq!(err.status_code, Some(409));

        let err = client
            .send_discard(client.request(Method::GET, &client.root_url("/expired"), None))
            .await
            .unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::Authentication);
    }

    #[test]
    fn debug_does_not_leak_password() {
        let client = RemoteClient::new(&test_config("http://localhost:1")).unwrap();
        assert!(!format!("{client:?}").contains("hunter2"));
    }
}
