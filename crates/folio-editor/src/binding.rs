//! Binding between one editing surface and one document store.
//!
//! ```text
//!            connect()                    record(op)
//! Disconnected ─────────▶ Connected ◀──────────────┐ pending buffer
//!      ▲                      │                    │
//!      └──── disconnect() ────┘  flush_local_changes() ─▶ one store txn
//! ```
//!
//! While connected, text edits on the surface are applied to the tree at
//! once and buffered. A flush replays the buffer against the store in one
//! transaction and produces a [`FlushRecord`] for history.
//!
//! Change batches from the store are handled by origin:
//!
//! - remote: pending edits are flushed first, then the tree is rebuilt from
//!   the store and the selection re-anchored (document start if it no longer
//!   resolves);
//! - local or history: only the touched nodes are reloaded and the selection
//!   is kept.
//!
//! Remote content never goes through [`EditorBinding::record`]: the rebuild
//! replaces the tree wholesale, so nothing remote lands in the buffer. If the
//! flush ahead of a remote batch is rejected, its edits are dropped and the
//! remote batch is applied anyway.

use std::mem;
use std::sync::Arc;

use folio_crdt::{ChangeFeed, DocumentStore, Journal, StoreObserver, TxnOrigin};
use folio_types::BlockId;
use tracing::{debug, info, warn};

use crate::error::{EditorError, Result};
use crate::surface::{EditingSurface, SurfaceOp};
use crate::translator::{
    Point, RelativeSelection, Selection, block_offset, point_at, selection_to_points,
    selection_to_relative,
};
use crate::tree::EditorTree;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BindingState {
    Disconnected,
    Connected,
}

/// Result of handling queued change batches.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncEffect {
    /// Nothing was queued.
    Idle,
    /// Local or history changes patched into the tree.
    Patched { nodes: usize },
    /// Remote changes: the tree was rebuilt. `reanchored` is false when the
    /// selection fell back to the document start.
    Rebuilt { block_count: usize, reanchored: bool },
}

/// One successful flush, ready to become a history item.
#[derive(Debug)]
pub struct FlushRecord {
    pub journal: Journal,
    /// Selection when the first buffered edit was made.
    pub before: Option<RelativeSelection>,
    /// Selection once the flush was applied.
    pub after: Option<RelativeSelection>,
}

pub struct EditorBinding {
    store: Arc<DocumentStore>,
    surface: EditingSurface,
    state: BindingState,
    feed: ChangeFeed,
    observer: Option<StoreObserver>,
    pending: Vec<SurfaceOp>,
    gesture_before: Option<RelativeSelection>,
    remote_selection: Option<RelativeSelection>,
    flushed: Vec<FlushRecord>,
}

impl EditorBinding {
    pub fn new(store: Arc<DocumentStore>) -> Self {
        Self {
            store,
            surface: EditingSurface::default(),
            state: BindingState::Disconnected,
            feed: ChangeFeed::new(),
            observer: None,
            pending: Vec::new(),
            gesture_before: None,
            remote_selection: None,
            flushed: Vec::new(),
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn store(&self) -> &Arc<DocumentStore> {
        &self.store
    }

    pub fn state(&self) -> BindingState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == BindingState::Connected
    }

    pub fn tree(&self) -> &EditorTree {
        self.surface.tree()
    }

    pub fn selection(&self) -> Option<&Selection> {
        self.surface.selection()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub(crate) fn require_connected(&self) -> Result<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(EditorError::NotConnected)
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Build the tree from the store and start observing it.
    pub fn connect(&mut self) -> Result<()> {
        if self.is_connected() {
            return Err(EditorError::AlreadyConnected);
        }
        self.surface.rebuild(&self.store);
        self.observer = Some(self.store.observe(self.feed.clone()));
        self.feed.drain();
        self.state = BindingState::Connected;
        self.revalidate_selection();
        info!(blocks = self.tree().len(), "editor binding connected");
        Ok(())
    }

    /// Flush pending edits and stop observing the store.
    pub fn disconnect(&mut self) -> Result<()> {
        self.require_connected()?;
        let flushed = self.flush_local_changes();
        self.observer = None;
        self.state = BindingState::Disconnected;
        info!("editor binding disconnected");
        flushed
    }

    // =========================================================================
    // Selection
    // =========================================================================

    pub fn select(&mut self, selection: Option<Selection>) {
        self.surface.select(selection);
    }

    /// Collapse the selection onto `offset` in `block`.
    pub fn set_caret(&mut self, block: &BlockId, offset: usize) {
        let point = point_at(self.tree(), block, offset)
            .unwrap_or_else(|| Point::in_block(block.clone(), offset));
        self.surface.select(Some(Selection::collapsed(point)));
    }

    /// The current selection pinned to the store, if it maps.
    pub fn capture_selection(&self) -> Option<RelativeSelection> {
        let selection = self.selection()?;
        match selection_to_relative(self.tree(), &self.store, selection) {
            Ok(relative) => Some(relative),
            Err(err) => {
                debug!(%err, "selection not captured");
                None
            }
        }
    }

    /// Resolve a captured selection against the current tree. Falls back to
    /// the document start; returns whether the captured selection resolved.
    pub fn restore_selection(&mut self, relative: Option<&RelativeSelection>) -> bool {
        let resolved =
            relative.and_then(|r| selection_to_points(self.surface.tree(), &self.store, r));
        let found = resolved.is_some();
        let selection = resolved.or_else(|| self.surface.document_start());
        self.surface.select(selection);
        found
    }

    /// Keep the selection if it still maps into the tree (clamped), else
    /// move it to the document start.
    fn revalidate_selection(&mut self) {
        let tree = self.surface.tree();
        let clamp = |point: &Point| {
            let offset = block_offset(tree, point).ok()?;
            point_at(tree, &point.block, offset)
        };
        let valid = self.surface.selection().and_then(|s| {
            Some(Selection {
                anchor: clamp(&s.anchor)?,
                focus: clamp(&s.focus)?,
            })
        });
        let selection = valid.or_else(|| self.surface.document_start());
        self.surface.select(selection);
    }

    // =========================================================================
    // Local edits
    // =========================================================================

    /// Apply a text edit to the surface and buffer it for the store.
    pub fn record(&mut self, op: SurfaceOp) -> Result<()> {
        self.require_connected()?;
        let block = op.block().clone();
        if !self.tree().contains(&block) {
            return Err(EditorError::PointNotFound {
                block,
                path: Vec::new(),
            });
        }
        if !self.surface.apply(&op) {
            return Err(EditorError::NoTextAncestor(block));
        }
        if let Some((block, offset)) = op.caret_after() {
            self.set_caret(&block, offset);
        }
        if self.pending.is_empty() {
            self.gesture_before = self.capture_selection_before(&op);
        }
        self.pending.push(op);
        Ok(())
    }

    /// Selection at the start of a gesture: where the first edit happened.
    fn capture_selection_before(&self, op: &SurfaceOp) -> Option<RelativeSelection> {
        let offset = match op {
            SurfaceOp::InsertText { offset, .. }
            | SurfaceOp::RemoveText { offset, .. }
            | SurfaceOp::FormatText { offset, .. } => *offset,
        };
        let point = Point::in_block(op.block().clone(), offset);
        selection_to_relative(self.tree(), &self.store, &Selection::collapsed(point)).ok()
    }

    /// Replay buffered edits against the store in one transaction.
    ///
    /// On failure the buffer is dropped and the tree rebuilt from the store,
    /// so the surface never keeps edits the store rejected.
    pub fn flush_local_changes(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let ops = mem::take(&mut self.pending);
        let before = self.gesture_before.take();
        let count = ops.len();
        let result = self
            .store
            .transact("flush_local_changes", TxnOrigin::Local, |txn| {
                for op in &ops {
                    let text = txn.ensure_text(op.block())?;
                    match op {
                        SurfaceOp::InsertText {
                            offset,
                            text: chunk,
                            attributes,
                            ..
                        } => txn.insert_text(&text, *offset, chunk, attributes.clone())?,
                        SurfaceOp::RemoveText { offset, len, .. } => {
                            txn.delete_text(&text, *offset, *len)?
                        }
                        SurfaceOp::FormatText {
                            offset,
                            len,
                            attributes,
                            ..
                        } => txn.format_text(&text, *offset, *len, attributes.clone())?,
                    }
                }
                Ok(())
            });

        match result {
            Ok(applied) => {
                debug!(ops = count, "local changes flushed");
                self.process_changes()?;
                let after = self.capture_selection();
                self.flushed.push(FlushRecord {
                    journal: applied.journal,
                    before,
                    after,
                });
                Ok(())
            }
            Err(err) => {
                warn!(%err, ops = count, "flush rejected; local edits dropped");
                self.feed.drain();
                self.surface.rebuild(&self.store);
                self.revalidate_selection();
                Err(err.into())
            }
        }
    }

    /// Flush ahead of a remote batch. A rejected flush has already dropped
    /// its edits and rebuilt the tree; the remote batch still goes in.
    fn flush_before_remote(&mut self) {
        if let Err(err) = self.flush_local_changes() {
            warn!(%err, "pending edits lost before remote update");
        }
    }

    /// Flush records produced since the last call, oldest first.
    pub fn take_flushed(&mut self) -> Vec<FlushRecord> {
        mem::take(&mut self.flushed)
    }

    // =========================================================================
    // Store changes
    // =========================================================================

    /// Apply an update from another replica. Pending local edits are flushed
    /// first and the selection is pinned before the update lands.
    pub fn apply_remote_update(&mut self, update: &[u8]) -> Result<SyncEffect> {
        if !self.is_connected() {
            self.store.apply_remote_update(update)?;
            return Ok(SyncEffect::Idle);
        }
        self.flush_before_remote();
        self.remote_selection = self.capture_selection();
        self.store.apply_remote_update(update)?;
        self.process_changes()
    }

    /// Handle every change batch queued by the store observer.
    pub fn process_changes(&mut self) -> Result<SyncEffect> {
        self.require_connected()?;
        let batches = self.feed.drain();
        if batches.is_empty() {
            return Ok(SyncEffect::Idle);
        }

        if batches.iter().any(|b| b.origin == TxnOrigin::Remote) {
            // Edits buffered against the old tree go in before the rebuild.
            self.flush_before_remote();
            let relative = self
                .remote_selection
                .take()
                .or_else(|| self.capture_selection());
            self.surface.rebuild(&self.store);
            let reanchored = self.restore_selection(relative.as_ref());
            let block_count = self.tree().len();
            debug!(block_count, reanchored, "remote changes applied");
            return Ok(SyncEffect::Rebuilt {
                block_count,
                reanchored,
            });
        }

        let mut nodes = 0;
        for batch in &batches {
            nodes += self.surface.tree_mut().patch(&self.store, batch);
        }
        self.revalidate_selection();
        Ok(SyncEffect::Patched { nodes })
    }
}
