//! Error types for the state tree.

use crate::action::ActionLabel;
use crate::path::Path;
use thiserror::Error;

/// Main error type for store operations.
///
/// Write failures caused by a missing ancestor are never surfaced to
/// callers: the write path logs them and leaves state untouched, so a
/// single bad write inside a batch cannot abort the rest of the batch.
/// The undo-boundary variants are programmer errors and are returned
/// synchronously.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An intermediate ancestor on the write path is absent or cannot
    /// hold children.
    #[error("{ancestor} is null or undefined (during [{label}] {path})")]
    MissingAncestor {
        /// Path of the offending ancestor.
        ancestor: Path,
        /// Label of the action that failed.
        label: ActionLabel,
        /// Path the write targeted.
        path: Path,
    },

    #[error("Cannot undo")]
    CannotUndo,

    #[error("Cannot redo")]
    CannotRedo,

    #[error("Nothing to drop")]
    NothingToDrop,
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
