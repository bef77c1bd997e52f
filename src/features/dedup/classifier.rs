//! Response classification.
//!
//! Decides whether model output is a usable reply, an empty/malformed
//! response, or leaked technical error text, and maps failures to a
//! blackout tier. The heuristic lists live here only so they can change
//! without touching the pipeline.

use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;

use crate::core::config::BlackoutSettings;
use crate::core::ModelError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseClass {
    Valid,
    /// Empty, whitespace-only, or a placeholder value like `undefined`
    Empty,
    /// Looks like a stack trace or exception text rather than a reply
    Technical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureTier {
    Soft,
    Hard,
}

impl ResponseClass {
    pub fn failure_tier(self) -> Option<FailureTier> {
        match self {
            ResponseClass::Valid => None,
            ResponseClass::Empty => Some(FailureTier::Soft),
            ResponseClass::Technical => Some(FailureTier::Hard),
        }
    }
}

/// Values that mean "nothing" when they are the whole response
const EMPTY_MARKERS: &[&str] = &["undefined", "null", "none", "nil", "[object object]", "{}", "[]"];

/// Replies at most this long are checked for a leading error prefix
const SHORT_REPLY_CHARS: usize = 300;

/// Patterns that only appear in stack traces and exception dumps
fn trace_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"Traceback \(most recent call last\)",
            r#"(?m)^\s*File "[^"]+", line \d+"#,
            r"(?m)^\s*[A-Z][A-Za-z]*(?:Error|Exception)(?: \[\w+\])?: ",
            r"(?m)^\s+at [\w.$<>\[\]]+ \(.*:\d+:\d+\)",
            r"'NoneType' object (?:has no attribute|is not)",
            r"\bundefined is not (?:a function|an object)",
            r"Cannot read propert(?:y|ies) of (?:undefined|null)",
            r"(?m)^\s*at .+\.(?:js|ts|py|rs):\d+",
        ]
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
    })
}

/// Patterns that mark a short reply as an error report
fn short_error_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"(?i)^\s*(?:error|exception|fatal)\s*[:\-]",
            r"(?i)\binternal server error\b",
            r"(?i)\bstatus code:? 5\d\d\b",
            r"(?i)^\s*request failed\b",
        ]
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
    })
}

pub fn classify_response(text: &str) -> ResponseClass {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return ResponseClass::Empty;
    }

    let lowered = trimmed.to_lowercase();
    if EMPTY_MARKERS.contains(&lowered.as_str()) {
        return ResponseClass::Empty;
    }

    if trace_patterns().iter().any(|p| p.is_match(trimmed)) {
        return ResponseClass::Technical;
    }

    if trimmed.chars().count() <= SHORT_REPLY_CHARS
        && short_error_patterns().iter().any(|p| p.is_match(trimmed))
    {
        return ResponseClass::Technical;
    }

    ResponseClass::Valid
}

pub fn classify_model_error(error: &ModelError) -> FailureTier {
    match error {
        ModelError::Empty => FailureTier::Soft,
        ModelError::Timeout(_) | ModelError::Api(_) => FailureTier::Hard,
    }
}

/// Blackout duration per failure tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlackoutPolicy {
    pub soft: Duration,
    pub hard: Duration,
}

impl BlackoutPolicy {
    pub fn duration_for(&self, tier: FailureTier) -> Duration {
        match tier {
            FailureTier::Soft => self.soft,
            FailureTier::Hard => self.hard,
        }
    }
}

impl From<&BlackoutSettings> for BlackoutPolicy {
    fn from(settings: &BlackoutSettings) -> Self {
        Self {
            soft: Duration::from_millis(settings.soft_ms),
            hard: Duration::from_millis(settings.hard_ms),
        }
    }
}

impl Default for BlackoutPolicy {
    fn default() -> Self {
        Self::from(&BlackoutSettings::default())
    }
}
