//! Undo/redo for an editor binding, with the selection on either side of
//! each item.

use folio_crdt::{Journal, UndoStack};
use tracing::debug;

use crate::binding::{EditorBinding, FlushRecord};
use crate::error::Result;
use crate::translator::RelativeSelection;

/// Selections stored with a history item, pinned to the store.
#[derive(Clone, Debug, Default)]
pub struct SelectionMeta {
    pub before: Option<RelativeSelection>,
    pub after: Option<RelativeSelection>,
}

pub struct HistoryManager {
    stack: UndoStack<SelectionMeta>,
}

impl HistoryManager {
    pub fn new(capacity: usize) -> Self {
        Self {
            stack: UndoStack::new(capacity),
        }
    }

    /// Record one committed transaction. Empty journals are skipped.
    pub fn push(&mut self, journal: Journal, meta: SelectionMeta) -> bool {
        let label = journal.label().to_string();
        let pushed = self.stack.push(journal, meta);
        if pushed {
            debug!(label, depth = self.stack.undo_len(), "history item recorded");
        }
        pushed
    }

    /// Turn the binding's completed flushes into history items.
    pub fn absorb(&mut self, records: Vec<FlushRecord>) {
        for record in records {
            self.push(
                record.journal,
                SelectionMeta {
                    before: record.before,
                    after: record.after,
                },
            );
        }
    }

    /// Undo the latest item and put the selection back where it was before
    /// it. Returns false when there was nothing to undo.
    pub fn undo(&mut self, binding: &mut EditorBinding) -> Result<bool> {
        binding.flush_local_changes()?;
        self.absorb(binding.take_flushed());
        let Some(meta) = self.stack.undo(binding.store())? else {
            return Ok(false);
        };
        binding.process_changes()?;
        binding.restore_selection(meta.before.as_ref());
        Ok(true)
    }

    /// Redo the latest undone item and restore the selection it left.
    pub fn redo(&mut self, binding: &mut EditorBinding) -> Result<bool> {
        binding.flush_local_changes()?;
        let records = binding.take_flushed();
        if !records.is_empty() {
            // A fresh edit invalidates the redo history.
            self.absorb(records);
            return Ok(false);
        }
        let Some(meta) = self.stack.redo(binding.store())? else {
            return Ok(false);
        };
        binding.process_changes()?;
        binding.restore_selection(meta.after.as_ref());
        Ok(true)
    }

    pub fn can_undo(&self) -> bool {
        self.stack.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.stack.can_redo()
    }

    pub fn undo_len(&self) -> usize {
        self.stack.undo_len()
    }

    pub fn clear(&mut self) {
        self.stack.clear();
    }
}
