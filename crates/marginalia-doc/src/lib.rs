//! Shared document store: one authoritative CRDT instance per open page.
//!
//! [`DocHost`] owns the map of open documents. Each open page holds an
//! automerge document guarded by an async mutex, an awareness registry, and a
//! broadcast channel carrying change notifications and stateless messages to
//! connected realtime clients.
//!
//! The write path mirrors the open/transact/close discipline of a direct
//! connection: [`DocHost::with_document`] acquires the document (loading it
//! from its durable snapshot if needed), applies a mutation closure, and on
//! success broadcasts the change to every connected peer: write-then-
//! broadcast is automatic, CRDT merge semantics resolve concurrency.
//!
//! Persistence is snapshot-based and opaque: load fetches the latest snapshot
//! from a [`SnapshotStore`] and decodes it (corruption degrades to an empty
//! document, never a fatal error), unload and periodic checkpoints serialize
//! the current state back.

mod awareness;
mod document;
mod error;
mod host;

pub use awareness::Awareness;
pub use document::{
    card_statuses, extract_text, ApprovalCard, CardStatus, CONTENT_KEY,
};
pub use error::DocError;
pub use host::{DocEvent, DocHost, MemorySnapshotStore, OpenDoc, SnapshotStore};
