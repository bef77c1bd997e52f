//! # Feature: Reply Delivery
//!
//! Ordered, paced, duplicate-suppressed delivery of segmented replies
//! through each channel's sender identity.
//!
//! - **Version**: 1.1.0
//! - **Since**: 1.0.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 1.1.0: Status markers via DeliveryOptions, identity invalidation on revoked sends
//! - 1.0.0: Initial release

pub mod orchestrator;
pub mod recent;

pub use orchestrator::{DeliveryError, DeliveryOptions, DeliveryOrchestrator, DeliveryResult};
pub use recent::RecentSends;
