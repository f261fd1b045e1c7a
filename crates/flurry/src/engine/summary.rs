//! Outcome of one poll cycle.

use std::fmt;

/// Where a cycle is in its list → filter → stage → finalize → emit pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CyclePhase {
    #[default]
    Idle,
    Listing,
    Filtering,
    Staging,
    Finalizing,
    Emitting,
}

impl CyclePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            CyclePhase::Idle => "idle",
            CyclePhase::Listing => "listing",
            CyclePhase::Filtering => "filtering",
            CyclePhase::Staging => "staging",
            CyclePhase::Finalizing => "finalizing",
            CyclePhase::Emitting => "emitting",
        }
    }
}

impl fmt::Display for CyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One object that did not make it through a phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectFailure {
    pub key: String,
    pub phase: CyclePhase,
    pub message: String,
}

/// Counts for one poll cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleSummary {
    /// Objects returned by the listing.
    pub listed: usize,
    /// Objects that passed the filter and were not already seen.
    pub eligible: usize,
    /// Transfers started.
    pub attempted: usize,
    /// Transfers that produced a staged file.
    pub staged: usize,
    /// Transfers that failed; their keys are retried next cycle.
    pub failed: usize,
    /// Eligible objects not attempted this cycle (limit, abort or shutdown).
    pub skipped: usize,
    /// Events published.
    pub emitted: usize,
    /// Staged objects whose remote original could not be deleted or moved.
    pub finalize_failed: usize,
    pub failures: Vec<ObjectFailure>,
}

impl CycleSummary {
    pub fn record_failure(
        &mut self,
        key: impl Into<String>,
        phase: CyclePhase,
        error: &impl fmt::Display,
    ) {
        self.failures.push(ObjectFailure {
            key: key.into(),
            phase,
            message: error.to_string(),
        });
    }

    /// Keys of the objects that failed in `phase`.
    pub fn failed_keys(&self, phase: CyclePhase) -> Vec<&str> {
        self.failures
            .iter()
            .filter(|f| f.phase == phase)
            .map(|f| f.key.as_str())
            .collect()
    }
}
