//! Process-wide options that apply to every poller.

use serde::{Deserialize, Serialize};

/// Global configuration shared across all pollers in one process.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct GlobalConfig {
    /// Upper bound, in seconds, of the random delay added to each poller's
    /// start and to every wait between cycles. Zero disables jitter.
    #[serde(default)]
    pub poll_jitter_secs: u64,
}

impl GlobalConfig {
    /// Merge another file's global section. The larger jitter wins.
    pub fn merge_from(&mut self, other: Self) {
        self.poll_jitter_secs = self.poll_jitter_secs.max(other.poll_jitter_secs);
    }
}
