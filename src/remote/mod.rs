//! Outbound access to the remote project-management instance.
//!
//! This module provides:
//! - Classified API errors and probe retries
//! - Endpoint discovery with a session-login fallback
//! - Effects-as-data for every call made once the endpoint is known, and the
//!   HTTP interpreter for them

pub mod client;
pub mod context;
pub mod effects;
pub mod error;
pub mod interpreter;
pub mod login_form;
pub mod resolver;
pub mod retry;
pub mod session;

pub use client::RemoteClient;
pub use context::{AuthMode, AuthSession, EndpointProfile, RunContext};
pub use effects::{
    CommentFormat, NewItem, NewRepository, RemoteEffect, RemoteInterpreter, RemoteResponse,
    RepositoryPage, RepositoryStatus, WorkItem, unexpected_response,
};
pub use error::{RemoteApiError, RemoteErrorKind};
pub use interpreter::HttpRemote;
pub use login_form::{LoginForm, extract_login_form};
pub use resolver::{EndpointResolver, ProbeOutcome, ResolveError, establish};
pub use retry::{RetryConfig, RetryResult, retry_with_backoff};
pub use session::{LoginSignals, LoginVerdict, SessionError, Signal};
