//! Poll triggers: when the next cycle should start.

use chrono::{DateTime, Utc};
use cron::Schedule;
use std::str::FromStr;
use std::time::Duration;

/// Schedule that decides the wait between poll cycles.
#[derive(Debug, Clone)]
pub enum Trigger {
    /// Wait `delay` after each cycle finishes; wait `initial_delay` before
    /// the first one.
    FixedDelay {
        delay: Duration,
        initial_delay: Duration,
    },
    /// Start a cycle at every fire time of a cron schedule (UTC, with a
    /// seconds field). Fire times missed while a cycle ran are skipped.
    Cron {
        expression: String,
        schedule: Box<Schedule>,
    },
}

impl Trigger {
    pub fn fixed_delay(delay: Duration) -> Self {
        Self::FixedDelay {
            delay,
            initial_delay: Duration::ZERO,
        }
    }

    /// Parse a cron expression such as `0 */5 * * * *`.
    pub fn cron(expression: &str) -> Result<Self, cron::error::Error> {
        let schedule = Schedule::from_str(expression)?;
        Ok(Self::Cron {
            expression: expression.to_string(),
            schedule: Box::new(schedule),
        })
    }

    /// Wait before the first cycle.
    pub fn initial_delay(&self, now: DateTime<Utc>) -> Duration {
        match self {
            Self::FixedDelay { initial_delay, .. } => *initial_delay,
            Self::Cron { .. } => self.next_delay(now),
        }
    }

    /// Wait after a cycle that finished at `now`.
    pub fn next_delay(&self, now: DateTime<Utc>) -> Duration {
        match self {
            Self::FixedDelay { delay, .. } => *delay,
            Self::Cron { schedule, .. } => schedule
                .after(&now)
                .next()
                .and_then(|at| (at - now).to_std().ok())
                .unwrap_or(Duration::ZERO),
        }
    }
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FixedDelay { delay, .. } => write!(f, "fixed-delay {}ms", delay.as_millis()),
            Self::Cron { expression, .. } => write!(f, "cron '{expression}'"),
        }
    }
}
