//! Scheduler Configuration
//!
//! The scheduler has no tunables that change its semantics: every batch is
//! settled completely, and unresolved references are retried forever. The
//! configuration only controls when the scheduler starts warning about
//! behaviour that is legal but usually a symptom of a bug.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Thresholds for diagnostic warnings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Warn once a reference has failed this many resolution attempts.
    /// `None` disables the warning. The reference keeps being retried.
    pub unresolved_warn_after: Option<u32>,

    /// Warn when a single flush has run this many blowback passes.
    /// `None` disables the warning. Passes are never capped.
    pub blowback_warn_after: Option<u32>,
}

impl SchedulerConfig {
    /// Parse a configuration from a JSON document.
    ///
    /// Missing fields take their default values.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            unresolved_warn_after: Some(32),
            blowback_warn_after: Some(16),
        }
    }
}
