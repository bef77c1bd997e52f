//! # Feature: Sender Identities
//!
//! Creates and reuses the per-channel identity (webhook) that lets replies
//! appear under each personality's own name and avatar.
//!
//! - **Version**: 1.0.0
//! - **Since**: 1.0.0
//! - **Toggleable**: false

pub mod cache;

pub use cache::SenderIdentityCache;
