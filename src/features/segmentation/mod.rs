//! # Feature: Message Segmentation
//!
//! Turns one reply of any length into ordered, platform-legal chunks.
//!
//! - **Version**: 1.1.0
//! - **Since**: 1.0.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 1.1.0: Sentence and word fallbacks, decorations measured before splitting
//! - 1.0.0: Line-aware chunking with UTF-8 safe hard splits

pub mod engine;

pub use engine::{segment, segment_text, Decorations, MessageChunk};
