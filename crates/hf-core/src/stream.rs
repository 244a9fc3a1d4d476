//! Stream identifiers: the key under which events are grouped in the
//! Akashic Record (spec.md §3 "Stream", §6 "Vault layout").

use hf_error::HiveForgeError;

/// A validated stream identifier: `[A-Za-z0-9_-]{1,128}`, no path
/// separators, no `..`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(String);

impl StreamId {
    pub fn parse(raw: impl Into<String>) -> Result<Self, HiveForgeError> {
        let raw = raw.into();
        if raw.is_empty() || raw.len() > 128 {
            return Err(HiveForgeError::validation(format!(
                "stream id must be 1-128 characters, got {}",
                raw.len()
            )));
        }
        if !raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(HiveForgeError::validation(format!(
                "stream id {raw:?} contains characters outside [A-Za-z0-9_-]"
            )));
        }
        if raw.contains("..") {
            return Err(HiveForgeError::validation(format!(
                "stream id {raw:?} must not contain '..'"
            )));
        }
        Ok(StreamId(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
