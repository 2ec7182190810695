//! Webhook ingestion primitives.
//!
//! This module provides:
//! - Signature verification for webhook payloads (HMAC-SHA256)
//! - Push payload parsing and classification (branch create/delete,
//!   force push, changed-file extraction)
//!
//! The HTTP handler in `server::webhook` composes these with the store to
//! implement the synchronous ingestion protocol.

pub mod payload;
pub mod signature;

pub use payload::{PayloadError, PushEvent, PushKind, parse_push};
pub use signature::{compute_signature, format_signature_header, verify_signature};
