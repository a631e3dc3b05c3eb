//! Bounded undo/redo stacks of transaction journals.
//!
//! Undoing an item reverts its journal under the history origin; the journal
//! of that revert is what redo later reverts, and so on back and forth.

use std::collections::VecDeque;

use tracing::{debug, warn};

use crate::store::DocumentStore;
use crate::txn::Journal;
use crate::Result;

/// One undoable transaction plus caller metadata (selection state, say).
#[derive(Clone, Debug)]
pub struct StackItem<M> {
    journal: Journal,
    pub meta: M,
}

impl<M> StackItem<M> {
    pub fn label(&self) -> &str {
        self.journal.label()
    }
}

pub struct UndoStack<M> {
    undo: VecDeque<StackItem<M>>,
    redo: Vec<StackItem<M>>,
    capacity: usize,
}

impl<M: Clone> UndoStack<M> {
    pub fn new(capacity: usize) -> Self {
        Self {
            undo: VecDeque::new(),
            redo: Vec::new(),
            capacity: capacity.max(1),
        }
    }

    /// Record a committed transaction. Empty journals are ignored. Any redo
    /// history is discarded. Returns whether an item was pushed.
    pub fn push(&mut self, journal: Journal, meta: M) -> bool {
        if journal.is_empty() {
            return false;
        }
        self.redo.clear();
        self.undo.push_back(StackItem { journal, meta });
        while self.undo.len() > self.capacity {
            self.undo.pop_front();
        }
        true
    }

    /// Revert the latest item. Returns its metadata, or `None` when there is
    /// nothing to undo. On failure the item stays on the stack.
    pub fn undo(&mut self, store: &DocumentStore) -> Result<Option<M>> {
        let Some(item) = self.undo.pop_back() else {
            return Ok(None);
        };
        match store.revert(item.journal.clone(), "undo") {
            Ok(journal) => {
                debug!(label = item.label(), "undone");
                let meta = item.meta.clone();
                self.redo.push(StackItem {
                    journal,
                    meta: item.meta,
                });
                Ok(Some(meta))
            }
            Err(err) => {
                warn!(%err, label = item.label(), "undo failed");
                self.undo.push_back(item);
                Err(err)
            }
        }
    }

    /// Re-apply the latest undone item.
    pub fn redo(&mut self, store: &DocumentStore) -> Result<Option<M>> {
        let Some(item) = self.redo.pop() else {
            return Ok(None);
        };
        match store.revert(item.journal.clone(), "redo") {
            Ok(journal) => {
                debug!(label = item.label(), "redone");
                let meta = item.meta.clone();
                self.undo.push_back(StackItem {
                    journal,
                    meta: item.meta,
                });
                Ok(Some(meta))
            }
            Err(err) => {
                warn!(%err, label = item.label(), "redo failed");
                self.redo.push(item);
                Err(err)
            }
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }

    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }
}

#[cfg(test)]
mod tests {
    use folio_types::{Attributes, BlockType};

    use super::*;
    use crate::ops::fixtures::Doc;
    use crate::TxnOrigin;

    fn type_text(doc: &Doc, block: &folio_types::BlockId, at: usize, text: &str) -> Journal {
        doc.store
            .transact("type", TxnOrigin::Local, |txn| {
                txn.insert_text(&block.text_id(), at, text, Attributes::new())
            })
            .unwrap()
            .journal
    }

    #[test]
    fn test_undo_redo_round_trip() {
        let doc = Doc::empty();
        let b = doc.add(&doc.page, BlockType::Paragraph, "");
        let mut stack = UndoStack::new(10);

        assert!(stack.push(type_text(&doc, &b, 0, "one"), 1));
        assert!(stack.push(type_text(&doc, &b, 3, " two"), 2));
        assert_eq!(doc.text(&b), "one two");

        assert_eq!(stack.undo(&doc.store).unwrap(), Some(2));
        assert_eq!(doc.text(&b), "one");
        assert_eq!(stack.undo(&doc.store).unwrap(), Some(1));
        assert_eq!(doc.text(&b), "");
        assert_eq!(stack.undo(&doc.store).unwrap(), None);

        assert_eq!(stack.redo(&doc.store).unwrap(), Some(1));
        assert_eq!(stack.redo(&doc.store).unwrap(), Some(2));
        assert_eq!(doc.text(&b), "one two");
        assert!(!stack.can_redo());
    }

    #[test]
    fn test_push_clears_redo() {
        let doc = Doc::empty();
        let b = doc.add(&doc.page, BlockType::Paragraph, "");
        let mut stack = UndoStack::new(10);
        stack.push(type_text(&doc, &b, 0, "a"), ());
        stack.undo(&doc.store).unwrap();
        assert!(stack.can_redo());

        stack.push(type_text(&doc, &b, 0, "b"), ());
        assert!(!stack.can_redo());
    }

    #[test]
    fn test_capacity_drops_oldest() {
        let doc = Doc::empty();
        let b = doc.add(&doc.page, BlockType::Paragraph, "");
        let mut stack = UndoStack::new(2);
        for (i, ch) in ["a", "b", "c"].into_iter().enumerate() {
            stack.push(type_text(&doc, &b, i, ch), i);
        }
        assert_eq!(stack.undo_len(), 2);
        stack.undo(&doc.store).unwrap();
        stack.undo(&doc.store).unwrap();
        assert_eq!(doc.text(&b), "a");
        assert!(!stack.can_undo());
    }

    #[test]
    fn test_empty_journal_not_pushed() {
        let mut stack: UndoStack<()> = UndoStack::new(4);
        assert!(!stack.push(Journal::default(), ()));
        assert!(!stack.can_undo());
    }

    #[test]
    fn test_undo_structural_operation() {
        let doc = Doc::empty();
        let b = doc.add(&doc.page, BlockType::BulletedList, "Hello World");
        doc.add(&b, BlockType::Paragraph, "child");
        let before = doc.store.outline();
        let mut stack = UndoStack::new(4);

        let applied = doc.store.split_block(&b, 5).unwrap().unwrap();
        stack.push(applied.journal, ());
        let after = doc.store.outline();
        assert_ne!(before, after);

        stack.undo(&doc.store).unwrap();
        assert_eq!(doc.store.outline(), before);
        assert_eq!(doc.texts_of(&b), ["child"]);

        stack.redo(&doc.store).unwrap();
        assert_eq!(doc.store.outline(), after);
    }
}
