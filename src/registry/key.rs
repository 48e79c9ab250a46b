//! Capability keys: a case-sensitive name or the unkeyed default slot.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifies a binding slot in a [`CapabilityRegistry`](super::CapabilityRegistry).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityKey {
    /// The distinguished default slot.
    Default,
    /// A named slot. Names are case-sensitive.
    Named(String),
}

impl CapabilityKey {
    /// Key for a named slot.
    pub fn named(name: impl Into<String>) -> Self {
        CapabilityKey::Named(name.into())
    }

    /// Whether this is the default slot.
    pub fn is_default(&self) -> bool {
        matches!(self, CapabilityKey::Default)
    }

    /// The slot name, `None` for the default slot.
    pub fn name(&self) -> Option<&str> {
        match self {
            CapabilityKey::Default => None,
            CapabilityKey::Named(name) => Some(name),
        }
    }
}

impl fmt::Display for CapabilityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapabilityKey::Default => write!(f, "default capability"),
            CapabilityKey::Named(name) => write!(f, "'{}'", name),
        }
    }
}

impl From<&str> for CapabilityKey {
    fn from(name: &str) -> Self {
        CapabilityKey::Named(name.to_string())
    }
}

impl From<String> for CapabilityKey {
    fn from(name: String) -> Self {
        CapabilityKey::Named(name)
    }
}

impl From<&String> for CapabilityKey {
    fn from(name: &String) -> Self {
        CapabilityKey::Named(name.clone())
    }
}
