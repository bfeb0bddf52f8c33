//! Session login for instances without a token-authenticated API.
//!
//! The login response format differs between remote versions, so success is
//! judged from three independent signals:
//!
//! | Signal  | Pass                                  | Fail                         | Unknown                     |
//! |---------|---------------------------------------|------------------------------|-----------------------------|
//! | cookie  | login response issued a session cookie | no session cookie at all     | only the pre-login cookie   |
//! | landing | redirected away from the login page   | redirected back to login     | no redirect                 |
//! | body    | no failure phrase, no password input  | a known failure phrase       | still shows a password box  |
//!
//! Any `Fail` rejects the login. All `Pass` accepts it. Anything else is
//! ambiguous and needs a corroborating request to a protected page.

use reqwest::StatusCode;
use reqwest::header::{COOKIE, LOCATION, REFERER, SET_COOKIE};
use reqwest::{RequestBuilder, Response};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::Config;

use super::client::RemoteClient;
use super::context::AuthSession;
use super::error::RemoteApiError;
use super::login_form::{extract_login_form, has_password_input};

/// Body phrases that mean the credentials were refused.
const FAILURE_PHRASES: &[&str] = &[
    "invalid user",
    "invalid username",
    "invalid password",
    "invalid credentials",
    "incorrect",
    "login failed",
    "wrong password",
    "user not found",
    "access denied",
    "authentication failed",
    "no such group",
];

/// Errors from the session login flow.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session login needs a password, but only a token is configured")]
    NoPassword,

    #[error("could not load login page: {0}")]
    LoginPage(#[source] RemoteApiError),

    #[error("login request failed: {0}")]
    Transport(#[source] RemoteApiError),

    /// At least one signal definitively reported failure.
    #[error("login rejected: {reason}")]
    Rejected { reason: String },

    /// Signals were ambiguous and the follow-up probe did not confirm access.
    #[error("login could not be confirmed: {reason}")]
    Unconfirmed { reason: String },
}

/// One login-success signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Pass,
    Fail,
    Unknown,
}

/// The three signals gathered from a login attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoginSignals {
    pub cookie: Signal,
    pub landing: Signal,
    pub body: Signal,
}

/// Decision derived from [`LoginSignals`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginVerdict {
    Accepted,
    Rejected(String),
    Ambiguous,
}

impl LoginSignals {
    pub fn verdict(&self) -> LoginVerdict {
        let named = [
            ("no session cookie was issued", self.cookie),
            ("redirected back to the login page", self.landing),
            ("response reports a login failure", self.body),
        ];

        let failures: Vec<&str> = named
            .iter()
            .filter(|(_, s)| *s == Signal::Fail)
            .map(|(reason, _)| *reason)
            .collect();
        if !failures.is_empty() {
            return LoginVerdict::Rejected(failures.join("; "));
        }

        if named.iter().all(|(_, s)| *s == Signal::Pass) {
            LoginVerdict::Accepted
        } else {
            LoginVerdict::Ambiguous
        }
    }
}

/// Classifies the session cookies after login against those before it.
pub fn cookie_signal(before: &[(String, String)], after: &[(String, String)]) -> Signal {
    let session_after: Vec<&(String, String)> =
        after.iter().filter(|(n, _)| is_session_cookie(n)).collect();
    if session_after.is_empty() {
        return Signal::Fail;
    }

    let issued_by_login = session_after
        .iter()
        .any(|cookie| !before.iter().any(|b| b == *cookie));
    if issued_by_login {
        Signal::Pass
    } else {
        Signal::Unknown
    }
}

/// Classifies the redirect target of the login post.
pub fn landing_signal(location: Option<&str>, login_path: &str) -> Signal {
    match location {
        None => Signal::Unknown,
        Some(loc) if loc.contains(login_path) || loc.contains("login.spr") => Signal::Fail,
        Some(_) => Signal::Pass,
    }
}

/// Classifies the page shown after login.
pub fn body_signal(body: &str) -> Signal {
    let lower = body.to_lowercase();
    if FAILURE_PHRASES.iter().any(|p| lower.contains(p)) {
        Signal::Fail
    } else if has_password_input(body) {
        Signal::Unknown
    } else {
        Signal::Pass
    }
}

fn is_session_cookie(name: &str) -> bool {
    let lower = name.to_lowercase();
    lower.contains("session") || lower == "sid"
}

/// Performs the form login and returns the captured session.
pub async fn login(client: &RemoteClient, config: &Config) -> Result<AuthSession, SessionError> {
    let password = client
        .credentials()
        .password()
        .ok_or(SessionError::NoPassword)?;
    let login_url = client.root_url(&config.login_path);

    // ─── Fetch the form ───────────────────────────────────────────────────────

    let page = send(client.http().get(&login_url))
        .await
        .map_err(SessionError::LoginPage)?;
    let status = page.status();
    let mut jar = Vec::new();
    merge_cookies(&mut jar, &page);
    let before = jar.clone();
    let html = page
        .text()
        .await
        .map_err(|e| SessionError::LoginPage(RemoteApiError::from_reqwest(e)))?;
    if !status.is_success() {
        return Err(SessionError::LoginPage(RemoteApiError::from_response(
            status.as_u16(),
            &html,
        )));
    }

    let form = extract_login_form(&html);
    debug!(
        hidden_fields = form.hidden_fields.len(),
        has_token = form.anti_forgery_token.is_some(),
        "Parsed login form"
    );

    // ─── Submit credentials ───────────────────────────────────────────────────

    let fields = form.submission(client.credentials().username(), password);
    let response = send(
        with_cookies(client.http().post(&login_url), &jar)
            .header(REFERER, &login_url)
            .form(&fields),
    )
    .await
    .map_err(SessionError::Transport)?;
    merge_cookies(&mut jar, &response);

    let location = redirect_target(&response);
    let landing_body = match &location {
        Some(loc) => {
            // Follow exactly one hop so its cookies land in the jar too.
            let target = absolute(client, loc);
            let landing = send(with_cookies(client.http().get(&target), &jar))
                .await
                .map_err(SessionError::Transport)?;
            merge_cookies(&mut jar, &landing);
            read_body(landing).await?
        }
        None => read_body(response).await?,
    };

    let signals = LoginSignals {
        cookie: cookie_signal(&before, &jar),
        landing: landing_signal(location.as_deref(), &config.login_path),
        body: body_signal(&landing_body),
    };
    debug!(?signals, "Evaluated login signals");

    let session = AuthSession {
        cookies: jar,
        anti_forgery_token: form.anti_forgery_token,
    };

    match signals.verdict() {
        LoginVerdict::Accepted => {
            info!("Session login accepted");
            Ok(session)
        }
        LoginVerdict::Rejected(reason) => {
            warn!(%reason, "Session login rejected");
            Err(SessionError::Rejected { reason })
        }
        LoginVerdict::Ambiguous => {
            corroborate(client, config, &session).await?;
            info!("Session login confirmed by follow-up probe");
            Ok(session)
        }
    }
}

/// Requests a protected page with the new session; it must render without a
/// login form.
async fn corroborate(
    client: &RemoteClient,
    config: &Config,
    session: &AuthSession,
) -> Result<(), SessionError> {
    let prefix = config
        .login_path
        .rsplit_once('/')
        .map(|(dir, _)| dir)
        .unwrap_or("");
    let url = client.root_url(&format!("{prefix}/project/{}", config.project_id));

    let response = send(with_cookies(client.http().get(&url), &session.cookies))
        .await
        .map_err(SessionError::Transport)?;
    let status = response.status();
    if status != StatusCode::OK {
        return Err(SessionError::Unconfirmed {
            reason: format!("protected page returned HTTP {}", status.as_u16()),
        });
    }

    let body = read_body(response).await?;
    if has_password_input(&body) {
        return Err(SessionError::Unconfirmed {
            reason: "protected page still shows a login form".to_string(),
        });
    }
    Ok(())
}

async fn send(builder: RequestBuilder) -> Result<Response, RemoteApiError> {
    builder.send().await.map_err(RemoteApiError::from_reqwest)
}

/// An unreadable body is a transport failure, never an empty page.
async fn read_body(response: Response) -> Result<String, SessionError> {
    response
        .text()
        .await
        .map_err(|e| SessionError::Transport(RemoteApiError::from_reqwest(e)))
}

fn with_cookies(builder: RequestBuilder, jar: &[(String, String)]) -> RequestBuilder {
    if jar.is_empty() {
        return builder;
    }
    let header = jar
        .iter()
        .map(|(n, v)| format!("{n}={v}"))
        .collect::<Vec<_>>()
        .join("; ");
    builder.header(COOKIE, header)
}

fn redirect_target(response: &Response) -> Option<String> {
    if !response.status().is_redirection() {
        return None;
    }
    response
        .headers()
        .get(LOCATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn absolute(client: &RemoteClient, location: &str) -> String {
    if location.starts_with("http://") || location.starts_with("https://") {
        location.to_string()
    } else {
        client.root_url(location)
    }
}

/// Applies `Set-Cookie` headers to the jar, replacing cookies by name.
fn merge_cookies(jar: &mut Vec<(String, String)>, response: &Response) {
    for raw in response.headers().get_all(SET_COOKIE) {
        let Ok(raw) = raw.to_str() else { continue };
        let Some((name, value)) = parse_set_cookie(raw) else {
            continue;
        };
        match jar.iter_mut().find(|(n, _)| *n == name) {
            Some(existing) => existing.1 = value,
            None => jar.push((name, value)),
        }
    }
}

/// Parses the `name=value` pair at the start of a `Set-Cookie` header.
fn parse_set_cookie(raw: &str) -> Option<(String, String)> {
    let pair = raw.split(';').next()?;
    let (name, value) = pair.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), value.trim().to_string()))
}
