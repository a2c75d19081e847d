//! Generic claim map with optional projections.
//!
//! Identity providers nest provider-specific data differently (Keycloak puts
//! realm roles under `realm_access.roles`, others use a flat `roles` or
//! `groups` array). Rather than a fixed schema, claims stay a JSON object and
//! callers project the paths they are configured for.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClaimSet(Map<String, JsonValue>);

impl ClaimSet {
    #[must_use]
    pub fn new(map: Map<String, JsonValue>) -> Self {
        Self(map)
    }

    /// Gets a top-level claim.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.0.get(key)
    }

    /// Gets a top-level string claim.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(JsonValue::as_str)
    }

    /// Gets a top-level numeric claim as seconds since the epoch.
    #[must_use]
    pub fn get_timestamp(&self, key: &str) -> Option<i64> {
        self.0.get(key).and_then(JsonValue::as_i64)
    }

    /// Walks a dotted path (`realm_access.roles`) through nested objects.
    #[must_use]
    pub fn project(&self, path: &str) -> Option<&JsonValue> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        segments.try_fold(self.0.get(first)?, |value, segment| value.get(segment))
    }

    /// String values found at `path`: an array of strings, or a single
    /// space-separated string. Anything else yields nothing.
    #[must_use]
    pub fn roles(&self, path: &str) -> Vec<String> {
        match self.project(path) {
            Some(JsonValue::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect(),
            Some(JsonValue::String(s)) => s.split_whitespace().map(String::from).collect(),
            _ => Vec::new(),
        }
    }

    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.get_str("sub")
    }

    #[must_use]
    pub fn preferred_username(&self) -> Option<&str> {
        self.get_str("preferred_username")
    }

    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.get_str("email")
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.get_str("name")
    }

    /// Best human-facing identifier: username, then display name, then subject.
    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        self.preferred_username()
            .or_else(|| self.name())
            .or_else(|| self.subject())
    }

    #[must_use]
    pub fn as_map(&self) -> &Map<String, JsonValue> {
        &self.0
    }

    #[must_use]
    pub fn into_map(self) -> Map<String, JsonValue> {
        self.0
    }
}

impl From<Map<String, JsonValue>> for ClaimSet {
    fn from(map: Map<String, JsonValue>) -> Self {
        Self(map)
    }
}
