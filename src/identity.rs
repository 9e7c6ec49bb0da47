//! Chat identities normalized to strings at the boundary.
//!
//! Telegram chat ids are 64-bit integers, config files may spell them as
//! strings or numbers. Everything past this module compares the normalized
//! string form only.
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Opaque, normalized identity of a chat participant.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn new(raw: &str) -> Self {
        Identity(raw.trim().to_string())
    }

    pub fn from_chat_id(chat_id: i64) -> Self {
        Identity(chat_id.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identity {
    fn from(raw: &str) -> Self {
        Identity::new(raw)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawIdentity {
    Text(String),
    Signed(i64),
    Unsigned(u64),
}

impl<'de> Deserialize<'de> for Identity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match RawIdentity::deserialize(deserializer)? {
            RawIdentity::Text(text) => Identity::new(&text),
            RawIdentity::Signed(value) => Identity(value.to_string()),
            RawIdentity::Unsigned(value) => Identity(value.to_string()),
        })
    }
}
