//! # Personas Feature
//!
//! Personality definitions loaded from YAML.
//!
//! - **Version**: 2.0.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 2.0.0: YAML-backed registry with validation
//! - 1.0.0: Initial release

pub mod manager;

pub use manager::{PersonaManager, PersonalityFile, REFERENCE_MARKER};
