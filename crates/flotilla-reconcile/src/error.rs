//! Reconciliation error types.

use thiserror::Error;

use flotilla_provider::ProviderError;
use flotilla_state::StateError;

/// Result alias for reconciliation operations.
pub type ReconcileResult<T> = Result<T, ReconcileError>;

/// Errors surfaced by reconciliation operations.
///
/// Not every provider failure becomes one of these: 404s on resources
/// the engine tracks are suppressed at the call site, and per-instance
/// launch failures inside a batch are collected rather than propagated.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    State(#[from] StateError),

    /// Every launch in a creation batch failed.
    #[error("no instances could be provisioned for {group}: {reasons}")]
    ProvisioningFailed { group: String, reasons: String },

    /// An asynchronous provider operation reported terminal failure.
    #[error("work request {id} failed")]
    WorkRequestFailed { id: String },

    /// An asynchronous provider operation never reached a terminal
    /// state within the polling window.
    #[error("work request {id} timed out")]
    WorkRequestTimedOut { id: String },
}
