//! Error taxonomy.
//!
//! `ConfigError` and `WorkloadLoadError` are fatal and propagate from
//! `configure`/`reset` to the controller. `AllocationFailed` and
//! `InvalidAssignment` are recoverable: the facade folds them into the
//! step's info bag instead of returning an `Err`. `FatalSimulationError`
//! terminates the running episode but does not panic the process.

use thiserror::Error;

/// Errors raised while building or mutating simulation state.
#[derive(Debug, Error)]
pub enum SimError {
    /// Invalid or contradictory configuration. Raised from `configure`/`reset`.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Unreadable or malformed workload trace. Raised from `reset`.
    #[error("workload load error: {0}")]
    WorkloadLoadError(String),

    /// A VM could not be placed on any host.
    #[error("allocation failed for vm {vm_id}: no host can accommodate it")]
    AllocationFailed {
        /// The VM that could not be placed.
        vm_id: u64,
    },

    /// An assignment action referenced an unknown, non-running, or
    /// over-capacity VM, or the waiting queue was empty.
    #[error("invalid assignment: {0}")]
    InvalidAssignment(String),

    /// An unexpected scheduler/handler failure. Terminates the episode.
    #[error("fatal simulation error: {0}")]
    FatalSimulationError(String),
}

impl SimError {
    /// True for the two kinds the step pipeline recovers from by folding
    /// them into reward/info instead of aborting the episode.
    pub fn is_step_recoverable(&self) -> bool {
        matches!(self, SimError::AllocationFailed { .. } | SimError::InvalidAssignment(_))
    }
}
