//! Poller identifier.

use flurry_core::ComponentKey;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier for a poller: its key under `pollers:` in the config.
///
/// ```
/// use flurry::config::PollerKey;
///
/// let key = PollerKey::new("invoices");
/// assert_eq!(key.id(), "invoices");
/// ```
#[derive(Debug, Clone, Eq, Hash, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PollerKey(ComponentKey);

impl PollerKey {
    pub fn new(id: impl Into<String>) -> Self {
        Self(ComponentKey::new(id))
    }

    pub fn id(&self) -> &str {
        self.0.id()
    }

    /// Name fragment safe for state file names.
    pub fn file_stem(&self) -> String {
        self.0.file_stem()
    }
}

impl fmt::Display for PollerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for PollerKey {
    fn as_ref(&self) -> &str {
        self.0.as_ref()
    }
}
