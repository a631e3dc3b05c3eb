//! The collaborative editor: an editing surface bound to a replicated store,
//! with history.
//!
//! Capabilities are split into two traits so that callers needing only one
//! of them can say so: [`ReplicatedEditor`] for the store binding and
//! [`UndoableEditor`] for history. [`CollabEditor`] implements both by
//! wrapping an [`EditorBinding`] and a [`HistoryManager`].

use std::sync::Arc;

use folio_crdt::{Caret, DocumentStore, Journal};
use folio_types::BlockId;
use tracing::{debug, warn};

use crate::binding::{EditorBinding, SyncEffect};
use crate::config::EditorConfig;
use crate::error::{EditorError, Result};
use crate::history::{HistoryManager, SelectionMeta};
use crate::translator::{Point, Selection, block_offset};
use crate::tree::EditorTree;

/// An editor whose content lives in a replicated document.
pub trait ReplicatedEditor {
    fn connect(&mut self) -> Result<()>;
    fn disconnect(&mut self) -> Result<()>;
    fn is_connected(&self) -> bool;
    fn flush_local_changes(&mut self) -> Result<()>;
    fn apply_remote_update(&mut self, update: &[u8]) -> Result<SyncEffect>;
    fn process_changes(&mut self) -> Result<SyncEffect>;
}

/// An editor with undo and redo.
pub trait UndoableEditor {
    /// Returns false when there was nothing to undo.
    fn undo(&mut self) -> Result<bool>;
    fn redo(&mut self) -> Result<bool>;
    fn can_undo(&self) -> bool;
    fn can_redo(&self) -> bool;
}

pub struct CollabEditor {
    pub(crate) binding: EditorBinding,
    pub(crate) history: HistoryManager,
}

impl CollabEditor {
    pub fn new(store: Arc<DocumentStore>, config: &EditorConfig) -> Self {
        Self {
            binding: EditorBinding::new(store),
            history: HistoryManager::new(config.history_limit),
        }
    }

    /// A connected editor on a fresh document.
    pub fn open_new(config: &EditorConfig) -> Result<Self> {
        let store = Arc::new(DocumentStore::new_document(config.store_options())?);
        let mut editor = Self::new(store, config);
        editor.connect()?;
        Ok(editor)
    }

    pub fn store(&self) -> &Arc<DocumentStore> {
        self.binding.store()
    }

    pub fn tree(&self) -> &EditorTree {
        self.binding.tree()
    }

    pub fn selection(&self) -> Option<&Selection> {
        self.binding.selection()
    }

    pub fn select(&mut self, anchor: Point, focus: Point) {
        self.binding.select(Some(Selection { anchor, focus }));
    }

    pub fn set_caret(&mut self, block: &BlockId, offset: usize) {
        self.binding.set_caret(block, offset);
    }

    /// The collapsed caret as a block offset.
    pub fn caret(&self) -> Option<Caret> {
        let selection = self.selection()?;
        if !selection.is_collapsed() {
            return None;
        }
        let offset = block_offset(self.tree(), &selection.focus).ok()?;
        Some(Caret::new(selection.focus.block.clone(), offset))
    }

    /// Flush records become history items as soon as the binding produces
    /// them.
    pub(crate) fn collect_flushes(&mut self) {
        self.history.absorb(self.binding.take_flushed());
    }

    /// Run one gesture that changes the store directly.
    ///
    /// Pending text edits are flushed first. `f` returns the journal of its
    /// transaction and the caret to place, or `None` for a boundary no-op.
    /// Errors that only abandon the gesture are logged and swallowed.
    pub(crate) fn execute<F>(&mut self, name: &str, f: F) -> Result<()>
    where
        F: FnOnce(&mut Self) -> Result<Option<(Journal, Option<Caret>)>>,
    {
        if !self.binding.is_connected() {
            return Err(EditorError::NotConnected);
        }
        let result = self.run_gesture(f);
        match result {
            Ok(()) => Ok(()),
            Err(err) if err.drops_gesture() => {
                warn!(command = name, %err, "gesture dropped");
                self.binding.process_changes()?;
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    fn run_gesture<F>(&mut self, f: F) -> Result<()>
    where
        F: FnOnce(&mut Self) -> Result<Option<(Journal, Option<Caret>)>>,
    {
        self.binding.flush_local_changes()?;
        self.collect_flushes();
        let before = self.binding.capture_selection();
        let Some((journal, caret)) = f(self)? else {
            return Ok(());
        };
        self.binding.process_changes()?;
        match caret {
            Some(caret) => self.binding.set_caret(&caret.block, caret.offset),
            None => {
                self.binding.restore_selection(None);
            }
        }
        let after = self.binding.capture_selection();
        debug!(label = journal.label(), "gesture applied");
        self.history.push(journal, SelectionMeta { before, after });
        Ok(())
    }
}

impl ReplicatedEditor for CollabEditor {
    fn connect(&mut self) -> Result<()> {
        self.binding.connect()
    }

    fn disconnect(&mut self) -> Result<()> {
        let result = self.binding.disconnect();
        self.collect_flushes();
        result
    }

    fn is_connected(&self) -> bool {
        self.binding.is_connected()
    }

    fn flush_local_changes(&mut self) -> Result<()> {
        let result = self.binding.flush_local_changes();
        self.collect_flushes();
        result
    }

    fn apply_remote_update(&mut self, update: &[u8]) -> Result<SyncEffect> {
        let result = self.binding.apply_remote_update(update);
        self.collect_flushes();
        result
    }

    fn process_changes(&mut self) -> Result<SyncEffect> {
        let result = self.binding.process_changes();
        self.collect_flushes();
        result
    }
}

impl UndoableEditor for CollabEditor {
    fn undo(&mut self) -> Result<bool> {
        self.binding.require_connected()?;
        self.history.undo(&mut self.binding)
    }

    fn redo(&mut self) -> Result<bool> {
        self.binding.require_connected()?;
        self.history.redo(&mut self.binding)
    }

    fn can_undo(&self) -> bool {
        self.history.can_undo() || self.binding.pending_len() > 0
    }

    fn can_redo(&self) -> bool {
        self.history.can_redo()
    }
}
