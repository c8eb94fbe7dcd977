//! Error types for document operations.

use marginalia_types::PageId;
use thiserror::Error;

/// Errors that can occur while hosting or mutating documents.
#[derive(Error, Debug)]
pub enum DocError {
    /// The document lock could not be acquired within the connection timeout.
    ///
    /// Reads and writes are bounded; a wedged document returns this error
    /// rather than blocking the caller or returning partial text.
    #[error("document lock timed out: {0}")]
    LockTimeout(PageId),

    /// The durable snapshot store failed.
    #[error("snapshot store error: {0}")]
    Snapshot(String),

    /// An incoming sync message could not be decoded.
    #[error("sync message decode failed: {0}")]
    SyncDecode(String),

    /// Underlying CRDT error.
    #[error(transparent)]
    Automerge(#[from] automerge::AutomergeError),
}
