//! Codebeamer Sync - propagates source-control webhooks into a Codebeamer project.
//!
//! This library provides the webhook boundary, the remote API layer with
//! endpoint discovery and session fallback, and the reconciliation logic that
//! turns each event into idempotent remote calls.

pub mod config;
pub mod remote;
pub mod server;
pub mod sync;
pub mod types;
pub mod webhooks;

#[cfg(test)]
pub mod test_utils;
