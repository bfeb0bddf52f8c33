//! Core domain types for the synchronization engine.
//!
//! Identifiers live in [`ids`]; the commit and mirror records that flow
//! between the webhook boundary and the remote system live in [`records`].

pub mod ids;
pub mod records;

pub use ids::{DeliveryId, ProjectId, RemoteId, Revision, SourceUrl, WorkItemId};
pub use records::{Commit, RemoteRepository};
