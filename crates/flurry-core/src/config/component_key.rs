//! Identifier for a configured component.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of a configured component, taken from its key in the YAML map.
#[derive(Debug, Clone, Eq, Hash, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentKey(String);

impl ComponentKey {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }

    /// A variant of the key that is safe to embed in a file or object name.
    ///
    /// ASCII alphanumerics, `-` and `_` are kept; everything else becomes `_`.
    ///
    /// ```
    /// use flurry_core::config::ComponentKey;
    ///
    /// assert_eq!(ComponentKey::new("eu/invoices v2").file_stem(), "eu_invoices_v2");
    /// ```
    pub fn file_stem(&self) -> String {
        self.0
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }
}

impl fmt::Display for ComponentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ComponentKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ComponentKey {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_and_id() {
        let key = ComponentKey::new("invoices");
        assert_eq!(key.id(), "invoices");
        assert_eq!(key.to_string(), "invoices");
    }

    #[test]
    fn test_file_stem_keeps_safe_chars() {
        assert_eq!(ComponentKey::new("a-b_c9").file_stem(), "a-b_c9");
        assert_eq!(ComponentKey::new("../etc").file_stem(), "___etc");
    }

    #[test]
    fn test_serde_transparent() {
        let key: ComponentKey = serde_yaml::from_str("reports").unwrap();
        assert_eq!(key, ComponentKey::new("reports"));
        assert_eq!(serde_json::to_string(&key).unwrap(), "\"reports\"");
    }
}
