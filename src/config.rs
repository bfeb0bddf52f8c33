//! Process configuration loaded from the environment.
//!
//! All variables are read and validated once at startup; the resulting
//! [`Config`] is immutable and shared by every delivery.

use std::env;
use std::fmt;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::types::{ProjectId, SourceUrl, WorkItemId};

const DEFAULT_API_CANDIDATES: &[&str] =
    &["/rest/v3", "/rest/v2", "/cb/rest/v3", "/cb/rest/v2", "/rest/v1"];
const DEFAULT_SESSION_CANDIDATES: &[&str] = &["/cb/rest/v3", "/cb/api/v3"];
const DEFAULT_LOGIN_PATH: &str = "/cb/login.spr";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
const DEFAULT_EVENT_DEADLINE_SECS: u64 = 120;
const DEFAULT_MIRROR_PREFIX: &str = "GitHub";

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required variable is not set (or is empty).
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    /// A variable is set but its value cannot be used.
    #[error("invalid value for {var}: {value}")]
    Invalid { var: &'static str, value: String },
}

/// How the engine authenticates outbound calls before any session exists.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// HTTP Basic with the configured username and password.
    Basic { username: String, password: String },

    /// A static bearer token. The username is still kept for form login
    /// and for ticket assignment.
    Token { username: String, token: String },
}

impl Credentials {
    pub fn username(&self) -> &str {
        match self {
            Credentials::Basic { username, .. } | Credentials::Token { username, .. } => username,
        }
    }

    /// The password to submit on the login form, if one is configured.
    pub fn password(&self) -> Option<&str> {
        match self {
            Credentials::Basic { password, .. } => Some(password),
            Credentials::Token { .. } => None,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Credentials::Token { username, .. } => f
                .debug_struct("Token")
                .field("username", username)
                .field("token", &"<redacted>")
                .finish(),
        }
    }
}

/// Immutable configuration for one server process.
#[derive(Clone)]
pub struct Config {
    /// Root URL of the remote instance (no trailing slash semantics assumed).
    pub remote_url: Url,
    pub credentials: Credentials,
    pub project_id: ProjectId,

    /// Shared webhook secret. `None` means signature verification is skipped.
    pub webhook_secret: Option<Vec<u8>>,
    pub port: u16,

    /// Fallback source identity for payloads that carry no repository URL.
    pub source_repo_url: Option<SourceUrl>,

    /// API base paths probed in order with token credentials.
    pub api_candidates: Vec<String>,

    /// API base paths probed in order after a successful session login.
    pub session_candidates: Vec<String>,
    pub login_path: String,
    pub session_fallback: bool,

    /// Existing item that receives failure comments instead of new tickets.
    pub failure_item_id: Option<WorkItemId>,
    pub mirror_name_prefix: String,
    pub http_timeout: Duration,
    pub event_deadline: Duration,
}

impl Config {
    /// Loads configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Loads configuration through an arbitrary lookup function.
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let require = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let raw_url = require("CODEBEAMER_URL")?;
        let remote_url = Url::parse(raw_url.trim_end_matches('/')).map_err(|_| {
            ConfigError::Invalid {
                var: "CODEBEAMER_URL",
                value: raw_url.clone(),
            }
        })?;

        let username = require("CODEBEAMER_USERNAME")?;
        let credentials = match get("CODEBEAMER_TOKEN") {
            Some(token) => Credentials::Token { username, token },
            None => Credentials::Basic {
                username,
                password: require("CODEBEAMER_PASSWORD")?,
            },
        };

        let raw_project = require("CODEBEAMER_PROJECT_ID")?;
        let project_id = ProjectId(parse_number("CODEBEAMER_PROJECT_ID", &raw_project)?);

        let port = match get("WEBHOOK_PORT") {
            Some(v) => v.trim().parse().map_err(|_| ConfigError::Invalid {
                var: "WEBHOOK_PORT",
                value: v,
            })?,
            None => DEFAULT_PORT,
        };

        let session_fallback = match get("CODEBEAMER_SESSION_FALLBACK") {
            Some(v) => parse_bool("CODEBEAMER_SESSION_FALLBACK", &v)?,
            None => true,
        };

        let failure_item_id = get("CODEBEAMER_FAILURE_ITEM_ID")
            .map(|v| parse_number("CODEBEAMER_FAILURE_ITEM_ID", &v).map(WorkItemId))
            .transpose()?;

        let http_timeout = Duration::from_secs(match get("HTTP_TIMEOUT_SECS") {
            Some(v) => parse_number("HTTP_TIMEOUT_SECS", &v)?,
            None => DEFAULT_HTTP_TIMEOUT_SECS,
        });
        let event_deadline = Duration::from_secs(match get("EVENT_DEADLINE_SECS") {
            Some(v) => parse_number("EVENT_DEADLINE_SECS", &v)?,
            None => DEFAULT_EVENT_DEADLINE_SECS,
        });

        Ok(Config {
            remote_url,
            credentials,
            project_id,
            webhook_secret: get("WEBHOOK_SECRET").map(String::into_bytes),
            port,
            source_repo_url: get("SOURCE_REPO_URL").map(SourceUrl::new),
            api_candidates: parse_paths(get("CODEBEAMER_API_CANDIDATES"), DEFAULT_API_CANDIDATES),
            session_candidates: parse_paths(
                get("CODEBEAMER_SESSION_CANDIDATES"),
                DEFAULT_SESSION_CANDIDATES,
            ),
            login_path: get("CODEBEAMER_LOGIN_PATH")
                .unwrap_or_else(|| DEFAULT_LOGIN_PATH.to_string()),
            session_fallback,
            failure_item_id,
            mirror_name_prefix: get("MIRROR_NAME_PREFIX")
                .unwrap_or_else(|| DEFAULT_MIRROR_PREFIX.to_string()),
            http_timeout,
            event_deadline,
        })
    }

    /// Joins a path (such as `/rest/v3` or `/cb/login.spr`) onto the remote root.
    pub fn remote_path(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.remote_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("remote_url", &self.remote_url.as_str())
            .field("credentials", &self.credentials)
            .field("project_id", &self.project_id)
            .field(
                "webhook_secret",
                &self.webhook_secret.as_ref().map(|_| "<redacted>"),
            )
            .field("port", &self.port)
            .field("api_candidates", &self.api_candidates)
            .field("session_candidates", &self.session_candidates)
            .field("session_fallback", &self.session_fallback)
            .field("failure_item_id", &self.failure_item_id)
            .field("http_timeout", &self.http_timeout)
            .field("event_deadline", &self.event_deadline)
            .finish_non_exhaustive()
    }
}

fn parse_number(var: &'static str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        var,
        value: value.to_string(),
    })
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            var,
            value: value.to_string(),
        }),
    }
}

/// Parses a comma-separated list of base paths, normalising each to a single
/// leading slash and no trailing slash.
fn parse_paths(raw: Option<String>, defaults: &[&str]) -> Vec<String> {
    let paths: Vec<String> = match raw {
        Some(raw) => raw
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| format!("/{}", p.trim_matches('/')))
            .collect(),
        None => Vec::new(),
    };
    if paths.is_empty() {
        defaults.iter().map(|p| (*p).to_string()).collect()
    } else {
        paths
    }
}
