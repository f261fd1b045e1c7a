//! Exclusive resources claimed by components.
//!
//! Two pollers staging into the same local directory would race on temp and
//! final names, so each component declares what it needs and the config
//! validator rejects overlapping claims.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::hash::Hash;

/// A resource that must not be shared between components of one process.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum Resource {
    /// A directory (local staging dir, remote prefix, ...).
    Directory(String),
    /// A single file or object (persisted state, lock file, ...).
    File(String),
}

impl Resource {
    /// Directory resource; trailing separators are ignored.
    ///
    /// ```
    /// use flurry_core::config::Resource;
    ///
    /// assert_eq!(Resource::directory("/var/spool/a/"), Resource::directory("/var/spool/a"));
    /// ```
    pub fn directory(path: &str) -> Self {
        Self::Directory(normalize(path))
    }

    pub fn file(path: &str) -> Self {
        Self::File(normalize(path))
    }

    /// Map each resource claimed by more than one component to the sorted
    /// keys that claim it. An empty map means no conflicts.
    pub fn conflicts<K>(
        components: impl IntoIterator<Item = (K, Vec<Resource>)>,
    ) -> HashMap<Resource, BTreeSet<K>>
    where
        K: Ord + Clone,
    {
        let mut claims: HashMap<Resource, BTreeSet<K>> = HashMap::new();
        for (key, resources) in components {
            for resource in resources {
                claims.entry(resource).or_default().insert(key.clone());
            }
        }
        claims.retain(|_, keys| keys.len() > 1);
        claims
    }

    /// Render conflicts as a single deterministic message.
    pub fn describe_conflicts<K: fmt::Display>(conflicts: &HashMap<Resource, BTreeSet<K>>) -> String {
        let mut lines: Vec<String> = conflicts
            .iter()
            .map(|(resource, keys)| {
                let keys: Vec<String> = keys.iter().map(ToString::to_string).collect();
                format!("{resource} claimed by: {}", keys.join(", "))
            })
            .collect();
        lines.sort();
        lines.join("; ")
    }
}

fn normalize(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() && path.starts_with('/') {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Directory(path) => write!(f, "directory:{path}"),
            Self::File(path) => write!(f, "file:{path}"),
        }
    }
}
