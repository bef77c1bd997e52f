//! # Feature: Profile Info
//!
//! Display names and avatars for personalities that mirror an external
//! profile, cached with a TTL and fetched politely (spacing, backoff,
//! global cooldown). Avatar URLs are validated once per process.
//!
//! - **Version**: 1.0.0
//! - **Since**: 1.0.0
//! - **Toggleable**: true

pub mod avatar;
pub mod cache;
pub mod pacer;

pub use avatar::{AvatarValidationResult, AvatarValidator};
pub use cache::{ProfileCacheEntry, ProfileInfoCache, ProfileLookup};
pub use pacer::Pacer;
