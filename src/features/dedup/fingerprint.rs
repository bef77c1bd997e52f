//! Request fingerprints: deterministic keys identifying one logical request.

use sha2::{Digest, Sha256};
use std::fmt;

use crate::core::RequestContext;

/// Marker used for absent optional fields
const NONE_MARKER: &str = "-";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestFingerprint(String);

impl RequestFingerprint {
    /// Build the fingerprint for a request.
    ///
    /// Field order is fixed: personality, user, channel, message id, content
    /// hash, reference-content hash. Content is hashed rather than embedded so
    /// keys stay small while any single-character change still produces a
    /// different key.
    pub fn compute(personality_id: &str, content: &str, context: &RequestContext) -> Self {
        let reference = context
            .reference_content
            .as_deref()
            .map(content_hash)
            .unwrap_or_else(|| NONE_MARKER.to_string());

        RequestFingerprint(format!(
            "{}:{}:{}:{}:{}:{}",
            escape(personality_id),
            escape(&context.user_id),
            escape(&context.channel_id),
            context.message_id.as_deref().map(escape).unwrap_or_else(|| NONE_MARKER.to_string()),
            content_hash(content),
            reference,
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hex SHA-256 of `text`
pub fn content_hash(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

/// Keep the `:` separator unambiguous inside identifier fields
pub(crate) fn escape(field: &str) -> String {
    field.replace('%', "%25").replace(':', "%3A")
}
