//! Aggregated results of a batch of sub-operations.

use std::fmt;

use crate::remote::{RemoteApiError, RemoteErrorKind};

/// How a successful sub-operation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// The remote state changed.
    Created,
    /// The remote already had it (duplicate, absent-on-delete, terminal status).
    AlreadyPresent,
}

/// One failed sub-operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpFailure {
    /// What was attempted, e.g. `commit 0d1a26e6`.
    pub operation: String,
    pub kind: RemoteErrorKind,
    pub message: String,
}

impl fmt::Display for OpFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?}): {}", self.operation, self.kind, self.message)
    }
}

/// Per-item outcomes for a batch. Failures never abort the batch; they are
/// collected here and reported once at the end.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub created: usize,
    pub already_present: usize,
    pub failures: Vec<OpFailure>,
}

impl BatchReport {
    pub fn record(&mut self, applied: Applied) {
        match applied {
            Applied::Created => self.created += 1,
            Applied::AlreadyPresent => self.already_present += 1,
        }
    }

    pub fn record_failure(&mut self, operation: impl Into<String>, err: &RemoteApiError) {
        self.failures.push(OpFailure {
            operation: operation.into(),
            kind: err.kind,
            message: err.to_string(),
        });
    }

    /// Folds another report into this one.
    pub fn merge(&mut self, other: BatchReport) {
        self.created += other.created;
        self.already_present += other.already_present;
        self.failures.extend(other.failures);
    }

    pub fn succeeded(&self) -> usize {
        self.created + self.already_present
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Number of failures of the given kind.
    pub fn failures_of(&self, kind: RemoteErrorKind) -> usize {
        self.failures.iter().filter(|f| f.kind == kind).count()
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} created, {} already present, {} failed",
            self.created,
            self.already_present,
            self.failures.len()
        )
    }
}
