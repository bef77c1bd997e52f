//! User-facing error placeholders with reference tokens.

use uuid::Uuid;

use crate::core::config::MessageSettings;
use crate::core::Personality;
use crate::features::dedup::FailureTier;
use crate::features::personas::REFERENCE_MARKER;

/// Length of the reference token shown to users
const REFERENCE_LEN: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedError {
    pub text: String,
    pub reference: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorTemplates {
    soft: String,
    hard: String,
}

impl ErrorTemplates {
    pub fn new(soft: impl Into<String>, hard: impl Into<String>) -> Self {
        Self {
            soft: soft.into(),
            hard: hard.into(),
        }
    }

    /// Placeholder text for `tier` with a fresh reference token
    pub fn render(&self, tier: FailureTier, personality: Option<&Personality>) -> RenderedError {
        let reference = new_reference();
        let text = self.render_with(tier, personality, &reference);
        RenderedError { text, reference }
    }

    pub fn render_with(
        &self,
        tier: FailureTier,
        personality: Option<&Personality>,
        reference: &str,
    ) -> String {
        let custom = personality
            .and_then(|p| p.error_message.as_deref())
            .filter(|m| !m.trim().is_empty());

        match custom {
            Some(message) if message.contains(REFERENCE_MARKER) => {
                message.replace(REFERENCE_MARKER, reference)
            }
            Some(message) => format!("{message} (Reference: {reference})"),
            None => {
                let base = match tier {
                    FailureTier::Soft => &self.soft,
                    FailureTier::Hard => &self.hard,
                };
                format!("{base} (Reference: {reference})")
            }
        }
    }
}

impl From<&MessageSettings> for ErrorTemplates {
    fn from(settings: &MessageSettings) -> Self {
        Self::new(settings.soft_error.clone(), settings.hard_error.clone())
    }
}

impl Default for ErrorTemplates {
    fn default() -> Self {
        Self::from(&MessageSettings::default())
    }
}

/// Short opaque token, e.g. `3F9A0C21`
pub fn new_reference() -> String {
    Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(REFERENCE_LEN)
        .collect::<String>()
        .to_uppercase()
}
