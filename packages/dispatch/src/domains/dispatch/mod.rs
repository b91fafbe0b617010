//! Dispatch domain - drives a booking from submission to a committed helper.

pub mod dispatcher;
pub mod machine;
pub mod stats;

pub use dispatcher::{DispatchOutcome, Dispatcher, SweepReport};
pub use machine::{Planned, ReleaseReason};
pub use stats::DispatchStats;

use anyhow::Result;
use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Re-read/retry budget for transitions that lose a conditional write.
pub const MAX_CONFLICT_RETRIES: u32 = 5;

/// Default time a helper has to answer an offer.
pub const DEFAULT_ACCEPTANCE_TIMEOUT_SECS: i64 = 15;

/// What happens to a booking right after a decline or an expired offer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedispatchPolicy {
    /// Offer it to the next helper inline.
    #[default]
    Immediate,
    /// Leave it `searching` for the next sweep.
    Deferred,
}

impl std::fmt::Display for RedispatchPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RedispatchPolicy::Immediate => write!(f, "immediate"),
            RedispatchPolicy::Deferred => write!(f, "deferred"),
        }
    }
}

impl std::str::FromStr for RedispatchPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "immediate" => Ok(RedispatchPolicy::Immediate),
            "deferred" => Ok(RedispatchPolicy::Deferred),
            other => Err(anyhow::anyhow!("Invalid redispatch policy: {}", other)),
        }
    }
}

/// Engine tuning
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DispatchSettings {
    pub acceptance_timeout: Duration,
    pub redispatch: RedispatchPolicy,
    pub max_conflict_retries: u32,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            acceptance_timeout: Duration::seconds(DEFAULT_ACCEPTANCE_TIMEOUT_SECS),
            redispatch: RedispatchPolicy::default(),
            max_conflict_retries: MAX_CONFLICT_RETRIES,
        }
    }
}
