//! Scheduler errors.
//!
//! Collaborator failures are not part of this taxonomy: a viewmodel, view or
//! task that fails does so by panicking, and the scheduler recovers its own
//! state while the panic propagates (see `runloop`).

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SchedulerError>;

#[derive(Error, Debug)]
pub enum SchedulerError {
    /// An operation that needs an open batch was called outside of one.
    #[error("no active batch for {operation}: call start() first")]
    NoActiveBatch { operation: &'static str },

    #[error("invalid scheduler configuration: {0}")]
    Config(#[from] serde_json::Error),
}
