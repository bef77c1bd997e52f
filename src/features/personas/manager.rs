//! # Feature: Personality Registry
//!
//! Personalities are loaded from a YAML document at startup. Each one has an
//! id used as its command (`!obi ...`), the display name replies are sent
//! under, a system prompt, and optional avatar, error message and external
//! profile subject.
//!
//! - **Version**: 2.0.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 2.0.0: Personalities loaded from YAML instead of compiled-in prompts
//! - 1.0.0: Initial release

use anyhow::{anyhow, Context, Result};
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::core::Personality;

/// Discord webhook usernames are limited to 80 characters
const MAX_DISPLAY_NAME: usize = 80;

/// Marker replaced with the reference token in a custom error message
pub const REFERENCE_MARKER: &str = "{reference}";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PersonalityFile {
    pub personalities: Vec<Personality>,
}

#[derive(Debug, Clone, Default)]
pub struct PersonaManager {
    personalities: BTreeMap<String, Personality>,
}

impl PersonaManager {
    /// Load and validate personalities from a YAML file
    pub fn load(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read personalities file {path}"))?;
        let manager = Self::from_yaml(&contents)?;
        info!("Loaded {} personalities from {path}", manager.len());
        Ok(manager)
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        let file: PersonalityFile =
            serde_yaml::from_str(contents).context("Invalid personalities document")?;
        Self::from_personalities(file.personalities)
    }

    pub fn from_personalities(personalities: Vec<Personality>) -> Result<Self> {
        validate(&personalities)?;
        Ok(Self {
            personalities: personalities
                .into_iter()
                .map(|p| (p.id.clone(), p))
                .collect(),
        })
    }

    pub fn get_personality(&self, id: &str) -> Option<&Personality> {
        self.personalities.get(&id.to_lowercase())
    }

    /// All personalities, ordered by id
    pub fn list(&self) -> Vec<&Personality> {
        self.personalities.values().collect()
    }

    pub fn len(&self) -> usize {
        self.personalities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.personalities.is_empty()
    }
}

fn validate(personalities: &[Personality]) -> Result<()> {
    let mut seen = HashSet::new();
    for p in personalities {
        // Ids double as commands
        if p.id.is_empty()
            || !p
                .id
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
        {
            return Err(anyhow!(
                "Personality id must be lowercase letters, digits, '_' or '-': {:?}",
                p.id
            ));
        }

        if !seen.insert(p.id.as_str()) {
            return Err(anyhow!("Duplicate personality id: {}", p.id));
        }

        let name_len = p.display_name.trim().chars().count();
        if name_len == 0 || name_len > MAX_DISPLAY_NAME {
            return Err(anyhow!(
                "Personality {} display name must be 1-{MAX_DISPLAY_NAME} characters",
                p.id
            ));
        }

        if p.system_prompt.trim().is_empty() {
            return Err(anyhow!("Personality {} has an empty system prompt", p.id));
        }

        if let Some(ref url) = p.avatar_url {
            if !(url.starts_with("https://") || url.starts_with("http://")) {
                return Err(anyhow!("Personality {} avatar_url must be http(s): {url}", p.id));
            }
        }

        if let Some(ref message) = p.error_message {
            if message.trim().is_empty() {
                return Err(anyhow!("Personality {} has an empty error_message", p.id));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"
personalities:
  - id: obi
    display_name: Obi-Wan
    system_prompt: You are a wise Jedi Master.
    avatar_url: https://cdn.example.test/obi.png
    error_message: "Hmm. The Force is clouded right now. (Reference: {reference})"
  - id: chef
    display_name: Chef
    system_prompt: You are a passionate chef.
    profile_subject: chef-42
"#;

    #[test]
    fn test_load_from_yaml() {
        let manager = PersonaManager::from_yaml(DOC).unwrap();
        assert_eq!(manager.len(), 2);

        let obi = manager.get_personality("obi").unwrap();
        assert_eq!(obi.display_name, "Obi-Wan");
        assert!(obi.error_message.as_deref().unwrap().contains(REFERENCE_MARKER));

        let chef = manager.get_personality("chef").unwrap();
        assert!(chef.avatar_url.is_none());
        assert_eq!(chef.profile_subject.as_deref(), Some("chef-42"));
    }

    #[test]
    fn test_example_file_is_valid() {
        let manager =
            PersonaManager::from_yaml(include_str!("../../../personalities.example.yaml")).unwrap();
        assert!(manager.get_personality("obi").is_some());
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let manager = PersonaManager::from_yaml(DOC).unwrap();
        assert!(manager.get_personality("OBI").is_some());
        assert!(manager.get_personality("yoda").is_none());
    }

    #[test]
    fn test_list_ordered_by_id() {
        let manager = PersonaManager::from_yaml(DOC).unwrap();
        let ids: Vec<_> = manager.list().iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["chef", "obi"]);
    }

    #[test]
    fn test_rejects_duplicate_ids() {
        let doc = r#"
personalities:
  - { id: obi, display_name: A, system_prompt: x }
  - { id: obi, display_name: B, system_prompt: y }
"#;
        let err = PersonaManager::from_yaml(doc).unwrap_err();
        assert!(err.to_string().contains("Duplicate"));
    }

    #[test]
    fn test_rejects_bad_fields() {
        let upper = r#"personalities: [{ id: Obi, display_name: A, system_prompt: x }]"#;
        assert!(PersonaManager::from_yaml(upper).is_err());

        let empty_prompt = r#"personalities: [{ id: obi, display_name: A, system_prompt: "  " }]"#;
        assert!(PersonaManager::from_yaml(empty_prompt).is_err());

        let long_name = format!(
            "personalities: [{{ id: obi, display_name: {}, system_prompt: x }}]",
            "a".repeat(81)
        );
        assert!(PersonaManager::from_yaml(&long_name).is_err());

        let bad_avatar =
            r#"personalities: [{ id: obi, display_name: A, system_prompt: x, avatar_url: "ftp://x" }]"#;
        assert!(PersonaManager::from_yaml(bad_avatar).is_err());
    }
}
