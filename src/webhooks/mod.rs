//! Webhook handling for source-host events.
//!
//! This module provides:
//! - Signature verification for webhook payloads (HMAC-SHA256)
//! - Typed event definitions
//! - Payload parsing from raw JSON

pub mod events;
pub mod parser;
pub mod signature;

pub use events::{
    BranchEvent, EventMeta, PingEvent, PrAction, PullRequestEvent, PushEvent, SourceEvent,
};
pub use parser::{ParseError, parse_webhook};
pub use signature::{
    SignatureCheck, check_signature, compute_signature, format_signature_header,
    parse_signature_header, verify_signature,
};
