//! # Core Module
//!
//! Shared domain types, configuration, the injected clock, and the
//! collaborator interfaces the pipeline is written against.
//!
//! - **Version**: 1.0.0
//! - **Since**: 1.0.0
//! - **Toggleable**: false

pub mod clock;
pub mod collaborators;
pub mod config;
pub mod types;

// Re-export commonly used items
pub use clock::{Clock, ManualClock, TokioClock};
pub use collaborators::{
    AvatarProbe, ModelClient, ModelError, PlatformClient, PlatformError, ProfileFetchError,
    ProfileFetcher,
};
pub use config::{Config, PipelineConfig, MESSAGE_LIMIT};
pub use types::{
    Personality, ProfileData, RequestContext, SendAck, SendPayload, SenderIdentity,
};
