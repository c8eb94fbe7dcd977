//! Document host: load/unload lifecycle, scoped write access, sync, and
//! broadcast.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use automerge::sync::{self, SyncDoc};
use automerge::AutoCommit;
use dashmap::DashMap;
use marginalia_types::{AwarenessUser, PageId};
use tokio::sync::{broadcast, Mutex, MutexGuard};

use crate::awareness::Awareness;
use crate::document;
use crate::error::DocError;

/// How long a read or write may wait on the document lock before giving up.
const LOCK_TIMEOUT: Duration = Duration::from_secs(10);

/// Persist a snapshot after this many writes, in addition to unload.
const CHECKPOINT_WRITES: u32 = 16;

/// Broadcast channel depth per document.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Durable snapshot persistence. Snapshots are opaque bytes; the engine
/// behind them (relational row, object store) is not this crate's concern.
#[async_trait::async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Latest stored snapshot for a page, `None` for a fresh page.
    async fn fetch(&self, page_id: &PageId) -> Result<Option<Vec<u8>>, DocError>;

    /// Replace the stored snapshot for a page.
    async fn store(&self, page_id: &PageId, snapshot: &[u8]) -> Result<(), DocError>;
}

/// In-memory snapshot store for tests and single-node development.
#[derive(Default)]
pub struct MemorySnapshotStore {
    snapshots: DashMap<PageId, Vec<u8>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn fetch(&self, page_id: &PageId) -> Result<Option<Vec<u8>>, DocError> {
        Ok(self.snapshots.get(page_id).map(|s| s.clone()))
    }

    async fn store(&self, page_id: &PageId, snapshot: &[u8]) -> Result<(), DocError> {
        self.snapshots.insert(*page_id, snapshot.to_vec());
        Ok(())
    }
}

/// Events fanned out to every task attached to an open document.
#[derive(Debug, Clone)]
pub enum DocEvent {
    /// The document changed; peers should exchange sync messages.
    Changed,
    /// Ephemeral JSON for the stateless side-channel.
    Stateless(String),
    /// Awareness states changed; payload is the full current set.
    Awareness(Vec<AwarenessUser>),
}

/// One open page: the authoritative CRDT plus its presence and fan-out state.
pub struct OpenDoc {
    page_id: PageId,
    doc: Mutex<AutoCommit>,
    events: broadcast::Sender<DocEvent>,
    awareness: Awareness,
    writes_since_checkpoint: AtomicU32,
}

impl OpenDoc {
    fn new(page_id: PageId, doc: AutoCommit) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            page_id,
            doc: Mutex::new(doc),
            events,
            awareness: Awareness::new(),
            writes_since_checkpoint: AtomicU32::new(0),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Subscribe to change/stateless/awareness events.
    pub fn subscribe(&self) -> broadcast::Receiver<DocEvent> {
        self.events.subscribe()
    }

    /// Presence registry for this document.
    pub fn awareness(&self) -> &Awareness {
        &self.awareness
    }

    /// Push ephemeral JSON to every connected client.
    pub fn broadcast_stateless(&self, payload: impl Into<String>) {
        let _ = self.events.send(DocEvent::Stateless(payload.into()));
    }

    /// Rebroadcast the full awareness set after a change.
    pub fn broadcast_awareness(&self) {
        let _ = self
            .events
            .send(DocEvent::Awareness(self.awareness.snapshot()));
    }

    async fn lock_doc(&self) -> Result<MutexGuard<'_, AutoCommit>, DocError> {
        tokio::time::timeout(LOCK_TIMEOUT, self.doc.lock())
            .await
            .map_err(|_| DocError::LockTimeout(self.page_id))
    }

    /// Produce the next sync message for a peer, if any.
    pub async fn generate_sync(
        &self,
        state: &mut sync::State,
    ) -> Result<Option<Vec<u8>>, DocError> {
        let mut doc = self.lock_doc().await?;
        Ok(doc
            .sync()
            .generate_sync_message(state)
            .map(|m| m.encode()))
    }

    /// Apply a sync message from a peer. Notifies other peers when the
    /// message carried changes.
    pub async fn receive_sync(&self, state: &mut sync::State, bytes: &[u8]) -> Result<(), DocError> {
        let message =
            sync::Message::decode(bytes).map_err(|e| DocError::SyncDecode(e.to_string()))?;
        {
            let mut doc = self.lock_doc().await?;
            doc.sync().receive_sync_message(state, message)?;
        }
        let _ = self.events.send(DocEvent::Changed);
        Ok(())
    }
}

/// Hosts exactly one authoritative CRDT instance per open page.
pub struct DocHost {
    snapshots: Arc<dyn SnapshotStore>,
    docs: DashMap<PageId, Arc<OpenDoc>>,
    next_conn_id: AtomicU64,
}

impl DocHost {
    pub fn new(snapshots: Arc<dyn SnapshotStore>) -> Self {
        Self {
            snapshots,
            docs: DashMap::new(),
            next_conn_id: AtomicU64::new(1),
        }
    }

    /// Allocate a connection ID for awareness bookkeeping.
    pub fn next_conn_id(&self) -> u64 {
        self.next_conn_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Whether a page is currently loaded.
    pub fn is_open(&self, page_id: &PageId) -> bool {
        self.docs.contains_key(page_id)
    }

    /// The open document for a page, if loaded.
    pub fn get(&self, page_id: &PageId) -> Option<Arc<OpenDoc>> {
        self.docs.get(page_id).map(|d| d.clone())
    }

    /// Load a page (fetching its durable snapshot) or return the already-open
    /// document.
    ///
    /// A corrupt snapshot is logged and replaced by an empty document; CRDT
    /// history can be partially reconstructed from connected peers, so decode
    /// failure is never fatal.
    pub async fn open(&self, page_id: PageId) -> Result<Arc<OpenDoc>, DocError> {
        if let Some(doc) = self.get(&page_id) {
            return Ok(doc);
        }

        let doc = match self.snapshots.fetch(&page_id).await? {
            Some(bytes) => match AutoCommit::load(&bytes) {
                Ok(doc) => doc,
                Err(e) => {
                    tracing::warn!(page = %page_id.short(), error = %e,
                        "snapshot corrupt, starting from empty document");
                    AutoCommit::new()
                }
            },
            None => AutoCommit::new(),
        };

        let open = Arc::new(OpenDoc::new(page_id, doc));
        // A concurrent open may have won the race; keep the first one.
        let entry = self
            .docs
            .entry(page_id)
            .or_insert_with(|| open.clone())
            .clone();
        Ok(entry)
    }

    /// Persist and drop an open page. Called when the last client disconnects.
    pub async fn close(&self, page_id: &PageId) -> Result<(), DocError> {
        let Some((_, open)) = self.docs.remove(page_id) else {
            return Ok(());
        };
        let snapshot = {
            let mut doc = open.lock_doc().await?;
            doc.save()
        };
        self.snapshots.store(page_id, &snapshot).await?;
        tracing::debug!(page = %page_id.short(), bytes = snapshot.len(), "document persisted on unload");
        Ok(())
    }

    /// Persist every open page. Used at graceful shutdown.
    pub async fn persist_all(&self) {
        let pages: Vec<PageId> = self.docs.iter().map(|e| *e.key()).collect();
        for page_id in pages {
            if let Err(e) = self.checkpoint(&page_id).await {
                tracing::warn!(page = %page_id.short(), error = %e, "shutdown persist failed");
            }
        }
    }

    async fn checkpoint(&self, page_id: &PageId) -> Result<(), DocError> {
        let Some(open) = self.get(page_id) else {
            return Ok(());
        };
        let snapshot = {
            let mut doc = open.lock_doc().await?;
            doc.save()
        };
        self.snapshots.store(page_id, &snapshot).await
    }

    /// Scoped document access: open (or reuse) the page, run `f` under the
    /// document lock, broadcast on change, and release on all exit paths.
    ///
    /// The mutation is atomic with respect to concurrent client edits; CRDT
    /// merge semantics resolve concurrency, no application-level locking.
    pub async fn with_document<T>(
        &self,
        page_id: PageId,
        f: impl FnOnce(&mut AutoCommit) -> Result<T, DocError>,
    ) -> Result<T, DocError> {
        let open = self.open(page_id).await?;

        let (result, changed) = {
            let mut doc = open.lock_doc().await?;
            let result = f(&mut doc)?;
            let changed = !doc.save_incremental().is_empty();
            (result, changed)
        };

        if changed {
            let _ = open.events.send(DocEvent::Changed);
            let writes = open
                .writes_since_checkpoint
                .fetch_add(1, Ordering::Relaxed)
                + 1;
            if writes >= CHECKPOINT_WRITES {
                open.writes_since_checkpoint.store(0, Ordering::Relaxed);
                if let Err(e) = self.checkpoint(&page_id).await {
                    tracing::warn!(page = %page_id.short(), error = %e, "checkpoint failed");
                }
            }
        }

        Ok(result)
    }

    /// Current visible text of a page. Bounded by the lock timeout; on
    /// failure returns an error, never partial text.
    pub async fn read_text(&self, page_id: PageId) -> Result<String, DocError> {
        self.with_document(page_id, |doc| document::extract_text(doc))
            .await
    }

    /// Append a paragraph to a page. Propagates to all connected clients via
    /// the sync protocol.
    pub async fn append_paragraph(&self, page_id: PageId, text: &str) -> Result<(), DocError> {
        let text = text.to_string();
        self.with_document(page_id, move |doc| document::append_paragraph(doc, &text))
            .await
    }

    /// Embed an approval card into a page document.
    pub async fn insert_approval_card(
        &self,
        page_id: PageId,
        card: &document::ApprovalCard,
    ) -> Result<(), DocError> {
        let card = card.clone();
        self.with_document(page_id, move |doc| document::insert_card(doc, &card))
            .await
    }

    /// Push ephemeral JSON to a page's connected clients. `false` when the
    /// page is not loaded.
    pub fn broadcast_stateless(&self, page_id: &PageId, payload: &str) -> bool {
        match self.get(page_id) {
            Some(open) => {
                open.broadcast_stateless(payload);
                true
            }
            None => false,
        }
    }

    /// Set or clear agent presence on a page and rebroadcast awareness.
    /// No-op when the page is not loaded, since awareness is ephemeral.
    pub fn set_agent_awareness(&self, page_id: &PageId, state: Option<AwarenessUser>) {
        if let Some(open) = self.get(page_id) {
            open.awareness().set_agent(state);
            open.broadcast_awareness();
        }
    }
}
