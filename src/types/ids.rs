//! Newtype wrappers for domain identifiers.
//!
//! These types keep remote ids, work-item ids and commit revisions from being
//! mixed up, and give the natural keys used for idempotency a single home.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A commit revision id (an opaque string, typically a 40-char git SHA).
///
/// This is the idempotency key for commit records on the remote mirror.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Revision(pub String);

impl Revision {
    pub fn new(s: impl Into<String>) -> Self {
        Revision(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns a short (8-character) prefix for display.
    pub fn short(&self) -> &str {
        // get() avoids a panic on a non-ASCII boundary for malformed input.
        self.0.get(..8).unwrap_or(&self.0)
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Revision {
    fn from(s: &str) -> Self {
        Revision(s.to_string())
    }
}

impl From<String> for Revision {
    fn from(s: String) -> Self {
        Revision(s)
    }
}

/// The remote id of a mirror (SCM repository) resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteId(pub u64);

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The remote id of a work item (tracker item, ticket).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkItemId(pub u64);

impl fmt::Display for WorkItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for WorkItemId {
    fn from(n: u64) -> Self {
        WorkItemId(n)
    }
}

/// The target project on the remote system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(pub u64);

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A webhook delivery ID, as sent by the source host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeliveryId(pub String);

impl DeliveryId {
    pub fn new(s: impl Into<String>) -> Self {
        DeliveryId(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeliveryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The identity of a source repository: its clone URL.
///
/// Comparison goes through [`SourceUrl::matches`], which ignores a trailing
/// slash, a trailing `.git` and ASCII case, so `https://host/o/r.git` and
/// `https://host/o/r` identify the same mirror.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceUrl(pub String);

impl SourceUrl {
    pub fn new(s: impl Into<String>) -> Self {
        SourceUrl(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn normalized(s: &str) -> String {
        let trimmed = s.trim().trim_end_matches('/');
        let trimmed = trimmed.strip_suffix(".git").unwrap_or(trimmed);
        trimmed.to_ascii_lowercase()
    }

    /// Returns true if `other` names the same source repository.
    pub fn matches(&self, other: &str) -> bool {
        Self::normalized(&self.0) == Self::normalized(other)
    }

    /// Returns the last path segment without a `.git` suffix.
    ///
    /// Falls back to `"unknown"` for URLs with no usable segment.
    pub fn repo_name(&self) -> &str {
        let trimmed = self.0.trim().trim_end_matches('/');
        let last = trimmed.rsplit('/').next().unwrap_or(trimmed);
        let last = last.strip_suffix(".git").unwrap_or(last);
        // "https:" or "" would be a scheme or an empty URL, not a name.
        if last.is_empty() || last.ends_with(':') {
            "unknown"
        } else {
            last
        }
    }
}

impl fmt::Display for SourceUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
