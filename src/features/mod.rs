//! # Features Module
//!
//! The response-delivery pipeline, one module per concern.
//!
//! | Feature | Module |
//! |---------|--------|
//! | Deduplication & blackout | [`dedup`] |
//! | Message segmentation | [`segmentation`] |
//! | Sender identities | [`identity`] |
//! | Profile info & avatars | [`profiles`] |
//! | Reply delivery | [`delivery`] |
//! | Personalities | [`personas`] |
//! | Relay | [`relay`] |

pub mod dedup;
pub mod delivery;
pub mod identity;
pub mod personas;
pub mod profiles;
pub mod relay;
pub mod segmentation;

// Re-export commonly used items
pub use dedup::{BlackoutPolicy, BlackoutRegistry, DedupManager, RequestFingerprint};
pub use delivery::{DeliveryError, DeliveryOptions, DeliveryOrchestrator, DeliveryResult};
pub use identity::SenderIdentityCache;
pub use personas::PersonaManager;
pub use profiles::{AvatarValidator, ProfileInfoCache, ProfileLookup};
pub use relay::{ErrorTemplates, Relay, RelayOutcome, RelayRequest, ReplyKind};
pub use segmentation::{segment, Decorations, MessageChunk};
