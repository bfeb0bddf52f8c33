//! The per-run connection context.
//!
//! A [`RunContext`] is established once (endpoint probing plus, if needed, a
//! session login) and then passed by reference to every component that talks
//! to the remote. Nothing about it is mutated after establishment.

use std::fmt;

use serde::Serialize;

/// How outbound calls are authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    /// Static credential header (Basic or Bearer).
    Token,
    /// Cookie plus anti-forgery token from a form login.
    Session,
}

impl fmt::Display for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMode::Token => write!(f, "token"),
            AuthMode::Session => write!(f, "session"),
        }
    }
}

/// The API base that answered the probe, and how it was reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointProfile {
    /// Absolute base URL without a trailing slash, e.g. `https://cb/rest/v3`.
    pub base_url: String,
    pub auth_mode: AuthMode,
}

impl EndpointProfile {
    /// Joins a relative API path onto the base.
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

/// Session credentials captured from a form login.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthSession {
    /// Cookie name/value pairs, in the order they were set.
    pub cookies: Vec<(String, String)>,

    /// Anti-forgery token scraped from the login page, if any.
    pub anti_forgery_token: Option<String>,
}

impl AuthSession {
    /// Renders the cookies as a single `Cookie` request header value.
    pub fn cookie_header(&self) -> String {
        self.cookies
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

impl fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.cookies.iter().map(|(n, _)| n.as_str()).collect();
        f.debug_struct("AuthSession")
            .field("cookies", &names)
            .field(
                "anti_forgery_token",
                &self.anti_forgery_token.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// Everything a run needs to reach the remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    pub profile: EndpointProfile,

    /// Present exactly when `profile.auth_mode` is `Session`.
    pub session: Option<AuthSession>,
}

impl RunContext {
    pub fn token(base_url: impl Into<String>) -> Self {
        Self {
            profile: EndpointProfile {
                base_url: base_url.into(),
                auth_mode: AuthMode::Token,
            },
            session: None,
        }
    }

    pub fn session(base_url: impl Into<String>, session: AuthSession) -> Self {
        Self {
            profile: EndpointProfile {
                base_url: base_url.into(),
                auth_mode: AuthMode::Session,
            },
            session: Some(session),
        }
    }
}
