use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Configuration for a [`FlowFactory`](crate::FlowFactory)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FactoryConfig {
    /// Legacy flow key (text form) -> current flow key, tried when a lookup
    /// misses
    pub compat_aliases: HashMap<String, String>,
    /// Coerce literal parameter values to their declared type before
    /// construction
    pub coerce_literals: bool,
    /// Reject resource edges whose source does not provide the parameter's
    /// declared type
    pub check_resource_types: bool,
}

impl Default for FactoryConfig {
    fn default() -> Self {
        Self {
            compat_aliases: HashMap::new(),
            coerce_literals: true,
            check_resource_types: false,
        }
    }
}

impl FactoryConfig {
    pub fn with_alias(mut self, legacy: impl Into<String>, current: impl Into<String>) -> Self {
        self.compat_aliases.insert(legacy.into(), current.into());
        self
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn load(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text).map_err(std::io::Error::other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let config = FactoryConfig::from_json(r#"{"check_resource_types": true}"#).unwrap();
        assert!(config.coerce_literals);
        assert!(config.check_resource_types);
        assert!(config.compat_aliases.is_empty());
    }

    #[test]
    fn aliases_are_read_from_json() {
        let config = FactoryConfig::from_json(
            r#"{"compat_aliases": {"old___$$___llm___$$___v1": "new___$$___llm___$$___v1"}}"#,
        )
        .unwrap();
        assert_eq!(
            config.compat_aliases.get("old___$$___llm___$$___v1").map(String::as_str),
            Some("new___$$___llm___$$___v1")
        );
    }
}
