//! Which remote objects a poller picks up.

use globset::{GlobBuilder, GlobMatcher};
use regex::Regex;

use crate::source::RemoteObjectRef;

/// Eligibility rule applied to object base names, selected once at
/// configuration load.
#[derive(Debug, Clone)]
pub enum FileEligibilityFilter {
    /// No filter configured.
    AcceptAll,
    /// Shell-style pattern; `*` and `?` never cross a `/`.
    Glob(GlobMatcher),
    /// Regex that must match the whole base name.
    Regex(Regex),
}

impl FileEligibilityFilter {
    pub fn glob(pattern: &str) -> Result<Self, globset::Error> {
        let glob = GlobBuilder::new(pattern).literal_separator(true).build()?;
        Ok(Self::Glob(glob.compile_matcher()))
    }

    /// Compile `pattern` anchored at both ends.
    pub fn regex(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self::Regex(Regex::new(&format!("^(?:{pattern})$"))?))
    }

    /// Whether a base name is eligible.
    pub fn matches_name(&self, name: &str) -> bool {
        match self {
            Self::AcceptAll => true,
            Self::Glob(matcher) => matcher.is_match(name),
            Self::Regex(regex) => regex.is_match(name),
        }
    }

    /// Whether `object` is eligible, judged by its key after the last
    /// `separator`.
    pub fn matches(&self, object: &RemoteObjectRef, separator: &str) -> bool {
        self.matches_name(object.basename(separator))
    }
}
