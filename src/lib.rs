// Core layer - shared types, configuration and collaborator traits
pub mod core;

// Features layer - the response-delivery pipeline
pub mod features;

// Adapters - OpenAI, Discord webhooks, profile service
pub mod adapters;

// Application layer
pub mod command_handler;

pub use core::{Config, PipelineConfig};

pub use features::{
    // Dedup
    BlackoutPolicy, DedupManager,
    // Delivery
    DeliveryOptions, DeliveryOrchestrator, DeliveryResult,
    // Identity
    SenderIdentityCache,
    // Personas
    PersonaManager,
    // Profiles
    AvatarValidator, ProfileInfoCache,
    // Relay
    ErrorTemplates, Relay, RelayOutcome, RelayRequest,
    // Segmentation
    segment, Decorations, MessageChunk,
};
