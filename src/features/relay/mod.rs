//! # Feature: Relay
//!
//! End-to-end handling of one personality request: fingerprint, coalesced
//! model call, classification, placeholder substitution with a reference
//! token, blackout recording, and delivery.
//!
//! - **Version**: 1.0.0
//! - **Since**: 1.0.0
//! - **Toggleable**: false

pub mod pipeline;
pub mod templates;

pub use pipeline::{GeneratedReply, Relay, RelayOutcome, RelayRequest, ReplyKind};
pub use templates::{new_reference, ErrorTemplates, RenderedError};
