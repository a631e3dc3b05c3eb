//! Write transactions and their inverse journal.
//!
//! Every mutator on [`DocTxn`] records how to undo itself. The journal serves
//! two purposes:
//!
//! - rollback: a transaction whose closure fails replays its journal backwards
//!   before committing, so the commit is a no-op;
//! - history: a committed journal is what an undo stack item holds. Applying
//!   it backwards (inside a new transaction) records a fresh journal, which
//!   is the redo.
//!
//! Inverses refer to blocks by id and to text by anchor (sticky index plus
//! creation offset), so they still land in the right place after other
//! replicas edit the same document.

use folio_types::{
    Attributes, BlockData, BlockId, BlockSnapshot, BlockType, DeltaOp, TextDelta, TextId,
    utf16_len,
};
use serde_json::Value;
use tracing::warn;
use yrs::{
    Array, ArrayPrelim, IndexedSequence, Map, MapPrelim, Text, TextPrelim,
    TransactionMut,
};

use crate::position::{Assoc, TextAnchor};
use crate::store::{Roots, keys, read_string};
use crate::text::{apply_delta, read_delta, to_attrs, to_index};
use crate::{CrdtError, Result};

/// How to revert one recorded mutation.
#[derive(Clone, Debug)]
pub(crate) enum Inverse {
    RemoveBlock(BlockId),
    RestoreBlock(Box<DeletedBlock>),
    Detach {
        block: BlockId,
        parent: BlockId,
    },
    Reattach {
        block: BlockId,
        parent: BlockId,
        index: usize,
    },
    SetField {
        block: BlockId,
        key: &'static str,
        value: Option<String>,
    },
    SetPage(Option<String>),
    DeleteText {
        start: TextAnchor,
        end: TextAnchor,
    },
    InsertText {
        at: TextAnchor,
        delta: TextDelta,
    },
    Reformat {
        start: TextAnchor,
        runs: Vec<(usize, Attributes)>,
    },
    RemoveTextEntry(TextId),
    RestoreTextEntry {
        text: TextId,
        delta: TextDelta,
    },
}

/// Everything needed to put a deleted block back under its old id.
#[derive(Clone, Debug)]
pub(crate) struct DeletedBlock {
    snapshot: BlockSnapshot,
    text: Option<(TextId, TextDelta)>,
    slot: Option<(BlockId, usize)>,
}

/// Inverse record of one committed transaction.
#[derive(Clone, Debug, Default)]
pub struct Journal {
    label: String,
    entries: Vec<Inverse>,
}

impl Journal {
    /// Diagnostic label of the transaction that produced this journal.
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A write transaction on one replica.
///
/// Obtained through [`DocumentStore::transact`](crate::DocumentStore::transact).
/// Lookups mirror the store's read API but see this transaction's own
/// uncommitted writes.
pub struct DocTxn<'doc> {
    txn: TransactionMut<'doc>,
    roots: &'doc Roots,
    journal: Vec<Inverse>,
    max_depth: usize,
}

impl<'doc> DocTxn<'doc> {
    pub(crate) fn new(txn: TransactionMut<'doc>, roots: &'doc Roots, max_depth: usize) -> Self {
        Self {
            txn,
            roots,
            journal: Vec::new(),
            max_depth,
        }
    }

    pub(crate) fn finish(self, label: &str) -> Journal {
        Journal {
            label: label.to_string(),
            entries: self.journal,
        }
    }

    pub(crate) fn rollback(mut self) {
        let entries = std::mem::take(&mut self.journal);
        for entry in entries.into_iter().rev() {
            if let Err(err) = self.apply_inverse(entry) {
                warn!(%err, "rollback step failed");
            }
        }
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    pub fn page_id(&self) -> Result<BlockId> {
        self.roots.page_id(&self.txn).ok_or(CrdtError::MissingPage)
    }

    pub fn block(&self, id: &BlockId) -> Option<BlockSnapshot> {
        self.roots.block(&self.txn, id)
    }

    pub fn require_block(&self, id: &BlockId) -> Result<BlockSnapshot> {
        self.block(id)
            .ok_or_else(|| CrdtError::BlockNotFound(id.clone()))
    }

    pub fn children(&self, id: &BlockId) -> Result<Vec<BlockId>> {
        let block = self.require_block(id)?;
        let array = self
            .roots
            .children_array(&self.txn, &block.children_id)
            .ok_or_else(|| CrdtError::ChildrenNotFound(id.clone()))?;
        Ok(self.roots.child_ids(&self.txn, &array))
    }

    /// Every block in the blocks map, attached or not.
    pub fn block_ids(&self) -> Vec<BlockId> {
        self.roots.block_ids(&self.txn)
    }

    /// The parent of `id` and the index of `id` among its children.
    pub fn slot(&self, id: &BlockId) -> Result<(BlockSnapshot, usize)> {
        let block = self.require_block(id)?;
        let parent_id = block
            .parent
            .ok_or_else(|| CrdtError::ParentNotFound(id.clone()))?;
        let parent = self
            .block(&parent_id)
            .ok_or_else(|| CrdtError::ParentNotFound(id.clone()))?;
        let index = self
            .children(&parent_id)?
            .iter()
            .position(|c| c == id)
            .ok_or_else(|| CrdtError::NotAChild {
                child: id.clone(),
                parent: parent_id.clone(),
            })?;
        Ok((parent, index))
    }

    pub fn text_delta(&self, id: &TextId) -> Option<TextDelta> {
        self.roots
            .text(&self.txn, id)
            .map(|text| read_delta(&text, &self.txn))
    }

    pub fn text_len(&self, id: &TextId) -> Option<usize> {
        self.roots
            .text(&self.txn, id)
            .map(|text| text.len(&self.txn) as usize)
    }

    /// Content of a block's text, or its inline `data.delta` when the text
    /// has not been materialized. Empty for blocks without text.
    pub fn block_delta(&self, block: &BlockSnapshot) -> TextDelta {
        block
            .text_id()
            .and_then(|id| self.text_delta(&id))
            .or_else(|| block.data.delta())
            .unwrap_or_default()
    }

    /// Anchor an offset inside a text sequence touched by this transaction.
    pub fn anchor(&mut self, text_id: &TextId, offset: usize, assoc: Assoc) -> TextAnchor {
        let sticky = self
            .roots
            .text(&self.txn, text_id)
            .and_then(|text| text.sticky_index(&mut self.txn, to_index(offset), assoc));
        TextAnchor::new(text_id.clone(), sticky, offset)
    }

    /// Current offset of `anchor`, `None` once its text sequence is gone.
    pub fn resolve(&self, anchor: &TextAnchor) -> Option<usize> {
        let text = self.roots.text(&self.txn, anchor.text_id())?;
        Some(anchor.offset_in(&text, &self.txn))
    }

    // =========================================================================
    // Block primitives
    // =========================================================================

    /// Allocate a block with an empty children sequence and, for text-bearing
    /// types, an empty text sequence. The block is not attached anywhere.
    pub fn create_block(&mut self, ty: BlockType, data: BlockData) -> Result<BlockId> {
        let id = BlockId::new();
        let snapshot = BlockSnapshot {
            id: id.clone(),
            ty,
            parent: None,
            children_id: id.clone(),
            external_id: ty.has_text().then(|| id.text_id()),
            external_type: ty.has_text().then(|| keys::EXTERNAL_TEXT.to_string()),
            data,
        };
        self.write_block(&snapshot);
        self.roots
            .children
            .insert(&mut self.txn, id.as_str(), ArrayPrelim::default());
        if let Some(text_id) = snapshot.text_id() {
            self.roots
                .texts
                .insert(&mut self.txn, text_id.as_str(), TextPrelim::new(""));
        }
        self.journal.push(Inverse::RemoveBlock(id.clone()));
        Ok(id)
    }

    fn write_block(&mut self, snapshot: &BlockSnapshot) {
        let map = self.roots.blocks.insert(
            &mut self.txn,
            snapshot.id.as_str(),
            MapPrelim::default(),
        );
        map.insert(&mut self.txn, keys::ID, snapshot.id.to_string());
        map.insert(&mut self.txn, keys::TY, snapshot.ty.as_str());
        map.insert(
            &mut self.txn,
            keys::CHILDREN,
            snapshot.children_id.to_string(),
        );
        map.insert(&mut self.txn, keys::DATA, snapshot.data.to_json_string());
        if let Some(parent) = &snapshot.parent {
            map.insert(&mut self.txn, keys::PARENT, parent.to_string());
        }
        if let Some(external_id) = &snapshot.external_id {
            map.insert(&mut self.txn, keys::EXTERNAL_ID, external_id.to_string());
        }
        if let Some(external_type) = &snapshot.external_type {
            map.insert(&mut self.txn, keys::EXTERNAL_TYPE, external_type.clone());
        }
    }

    pub(crate) fn set_page(&mut self, page: &BlockId) {
        let previous = read_string(&self.roots.meta, &self.txn, keys::PAGE_ID);
        self.roots
            .meta
            .insert(&mut self.txn, keys::PAGE_ID, page.to_string());
        self.journal.push(Inverse::SetPage(previous));
    }

    /// Set the parent back-reference of `block` and splice it into the
    /// parent's children at `index`, clamped to the sequence length.
    pub fn attach_to_parent(
        &mut self,
        block: &BlockId,
        parent: &BlockId,
        index: usize,
    ) -> Result<()> {
        self.require_block(block)?;
        let parent_block = self.require_block(parent)?;
        self.guard_cycle(block, parent)?;
        let array = self
            .roots
            .children_array(&self.txn, &parent_block.children_id)
            .ok_or_else(|| CrdtError::ChildrenNotFound(parent.clone()))?;

        self.set_field(block, keys::PARENT, Some(parent.to_string()))?;
        let len = array.len(&self.txn) as usize;
        if index >= len {
            array.push_back(&mut self.txn, block.to_string());
        } else {
            array.insert(&mut self.txn, to_index(index), block.to_string());
        }
        self.journal.push(Inverse::Detach {
            block: block.clone(),
            parent: parent.clone(),
        });
        Ok(())
    }

    /// Refuse to attach a block under itself or one of its descendants.
    fn guard_cycle(&self, block: &BlockId, parent: &BlockId) -> Result<()> {
        let mut current = Some(parent.clone());
        let mut steps = 0;
        while let Some(id) = current {
            if &id == block {
                return Err(CrdtError::SelfAttachment {
                    block: block.clone(),
                    parent: parent.clone(),
                });
            }
            steps += 1;
            if steps > self.max_depth {
                return Err(CrdtError::NestingTooDeep {
                    block: parent.clone(),
                    limit: self.max_depth,
                });
            }
            current = self.block(&id).and_then(|b| b.parent);
        }
        Ok(())
    }

    /// Remove `block` from `parent`'s children sequence, if listed there.
    fn detach(&mut self, block: &BlockId, parent: &BlockId) {
        let Some(parent_block) = self.block(parent) else {
            return;
        };
        let Some(array) = self
            .roots
            .children_array(&self.txn, &parent_block.children_id)
        else {
            return;
        };
        let ids = self.roots.child_ids(&self.txn, &array);
        if let Some(index) = ids.iter().position(|c| c == block) {
            array.remove(&mut self.txn, to_index(index));
            self.journal.push(Inverse::Reattach {
                block: block.clone(),
                parent: parent.clone(),
                index,
            });
        }
    }

    fn reattach(&mut self, block: &BlockId, parent: &BlockId, index: usize) {
        let Some(parent_block) = self.block(parent) else {
            return;
        };
        let Some(array) = self
            .roots
            .children_array(&self.txn, &parent_block.children_id)
        else {
            return;
        };
        let index = index.min(array.len(&self.txn) as usize);
        array.insert(&mut self.txn, to_index(index), block.to_string());
        self.journal.push(Inverse::Detach {
            block: block.clone(),
            parent: parent.clone(),
        });
    }

    /// Write (or with `None`, remove) one scalar field of a block.
    fn set_field(&mut self, block: &BlockId, key: &'static str, value: Option<String>) -> Result<()> {
        let map = self
            .roots
            .block_map(&self.txn, block)
            .ok_or_else(|| CrdtError::BlockNotFound(block.clone()))?;
        let previous = read_string(&map, &self.txn, key);
        if previous == value {
            return Ok(());
        }
        match value {
            Some(v) => {
                map.insert(&mut self.txn, key, v);
            }
            None => {
                map.remove(&mut self.txn, key);
            }
        }
        self.journal.push(Inverse::SetField {
            block: block.clone(),
            key,
            value: previous,
        });
        Ok(())
    }

    /// Replace a block's type-specific data.
    pub fn set_block_data(&mut self, block: &BlockId, data: &BlockData) -> Result<()> {
        self.set_field(block, keys::DATA, Some(data.to_json_string()))
    }

    /// Delete a block with its whole subtree: blocks-map entry, children
    /// sequence, text entry, and its id in the parent's children. A no-op if
    /// the block is already gone.
    pub fn delete_block(&mut self, block: &BlockId) -> Result<()> {
        self.delete_subtree(block, 0)
    }

    fn delete_subtree(&mut self, id: &BlockId, depth: usize) -> Result<()> {
        let Some(block) = self.block(id) else {
            return Ok(());
        };
        if depth > self.max_depth {
            return Err(CrdtError::NestingTooDeep {
                block: id.clone(),
                limit: self.max_depth,
            });
        }

        let children = self
            .roots
            .children_array(&self.txn, &block.children_id)
            .map(|array| self.roots.child_ids(&self.txn, &array))
            .unwrap_or_default();
        for child in &children {
            self.delete_subtree(child, depth + 1)?;
        }

        let text = block
            .text_id()
            .and_then(|t| self.text_delta(&t).map(|delta| (t, delta)));
        let slot = block.parent.as_ref().and_then(|parent| {
            let children = self.roots.children(&self.txn, parent)?;
            let index = children.iter().position(|c| c == id)?;
            Some((parent.clone(), index))
        });

        self.roots.blocks.remove(&mut self.txn, id.as_str());
        self.roots
            .children
            .remove(&mut self.txn, block.children_id.as_str());
        if let Some((text_id, _)) = &text {
            self.roots.texts.remove(&mut self.txn, text_id.as_str());
        }
        if let Some((parent, index)) = &slot {
            if let Some(array) = self
                .block(parent)
                .and_then(|p| self.roots.children_array(&self.txn, &p.children_id))
            {
                array.remove(&mut self.txn, to_index(*index));
            }
        }

        self.journal
            .push(Inverse::RestoreBlock(Box::new(DeletedBlock {
                snapshot: block,
                text,
                slot,
            })));
        Ok(())
    }

    fn restore_block(&mut self, deleted: DeletedBlock) {
        let DeletedBlock {
            snapshot,
            text,
            slot,
        } = deleted;
        if self.block(&snapshot.id).is_some() {
            return;
        }
        self.write_block(&snapshot);
        self.roots.children.insert(
            &mut self.txn,
            snapshot.children_id.as_str(),
            ArrayPrelim::default(),
        );
        if let Some((text_id, delta)) = &text {
            self.write_text_entry(text_id, delta);
        }
        if let Some((parent, index)) = slot {
            if let Some(array) = self
                .block(&parent)
                .and_then(|p| self.roots.children_array(&self.txn, &p.children_id))
            {
                let index = index.min(array.len(&self.txn) as usize);
                array.insert(&mut self.txn, to_index(index), snapshot.id.to_string());
            }
        }
        self.journal.push(Inverse::RemoveBlock(snapshot.id));
    }

    // =========================================================================
    // Text primitives
    // =========================================================================

    /// Make sure a text-bearing block has a text entry, creating it from the
    /// block's inline `data.delta` if needed. Returns the text id.
    pub fn ensure_text(&mut self, block: &BlockId) -> Result<TextId> {
        let snapshot = self.require_block(block)?;
        let text_id = snapshot
            .text_id()
            .ok_or_else(|| CrdtError::TextNotFound(block.text_id()))?;
        if self.roots.text(&self.txn, &text_id).is_some() {
            return Ok(text_id);
        }

        let delta = snapshot.data.delta().unwrap_or_default();
        self.write_text_entry(&text_id, &delta);
        self.journal.push(Inverse::RemoveTextEntry(text_id.clone()));
        if snapshot.external_id.is_none() {
            self.set_field(block, keys::EXTERNAL_ID, Some(text_id.to_string()))?;
        }
        if snapshot.external_type.is_none() {
            self.set_field(
                block,
                keys::EXTERNAL_TYPE,
                Some(keys::EXTERNAL_TEXT.to_string()),
            )?;
        }
        Ok(text_id)
    }

    fn write_text_entry(&mut self, text_id: &TextId, delta: &TextDelta) {
        let text = self
            .roots
            .texts
            .insert(&mut self.txn, text_id.as_str(), TextPrelim::new(""));
        apply_delta(&text, &mut self.txn, delta);
    }

    fn remove_text_entry(&mut self, text_id: &TextId) {
        let Some(delta) = self.text_delta(text_id) else {
            return;
        };
        self.roots.texts.remove(&mut self.txn, text_id.as_str());
        self.journal.push(Inverse::RestoreTextEntry {
            text: text_id.clone(),
            delta,
        });
    }

    /// Insert `chunk` at `offset` (clamped to the text length).
    pub fn insert_text(
        &mut self,
        text_id: &TextId,
        offset: usize,
        chunk: &str,
        attributes: Attributes,
    ) -> Result<()> {
        let text = self
            .roots
            .text(&self.txn, text_id)
            .ok_or_else(|| CrdtError::TextNotFound(text_id.clone()))?;
        let len = utf16_len(chunk);
        if len == 0 {
            return Ok(());
        }
        let offset = offset.min(text.len(&self.txn) as usize);
        text.insert_with_attributes(&mut self.txn, to_index(offset), chunk, to_attrs(&attributes));

        let start = self.anchor(text_id, offset, Assoc::After);
        let end = self.anchor(text_id, offset + len, Assoc::Before);
        self.journal.push(Inverse::DeleteText { start, end });
        Ok(())
    }

    /// Delete `len` units starting at `offset`; the range is clamped to the text.
    pub fn delete_text(&mut self, text_id: &TextId, offset: usize, len: usize) -> Result<()> {
        let text = self
            .roots
            .text(&self.txn, text_id)
            .ok_or_else(|| CrdtError::TextNotFound(text_id.clone()))?;
        let total = text.len(&self.txn) as usize;
        let offset = offset.min(total);
        let len = len.min(total - offset);
        if len == 0 {
            return Ok(());
        }
        let removed = read_delta(&text, &self.txn).slice(offset, Some(offset + len));
        // Anchor to the surviving left neighbour, not the deleted run.
        let at = self.anchor(text_id, offset, Assoc::Before);
        text.remove_range(&mut self.txn, to_index(offset), to_index(len));
        self.journal.push(Inverse::InsertText { at, delta: removed });
        Ok(())
    }

    /// Apply `attributes` to `len` units starting at `offset`. A `null`
    /// attribute value removes that attribute.
    pub fn format_text(
        &mut self,
        text_id: &TextId,
        offset: usize,
        len: usize,
        attributes: Attributes,
    ) -> Result<()> {
        let text = self
            .roots
            .text(&self.txn, text_id)
            .ok_or_else(|| CrdtError::TextNotFound(text_id.clone()))?;
        let total = text.len(&self.txn) as usize;
        let offset = offset.min(total);
        let len = len.min(total - offset);
        if len == 0 || attributes.is_empty() {
            return Ok(());
        }
        let previous = read_delta(&text, &self.txn).slice(offset, Some(offset + len));
        let runs = previous
            .ops()
            .iter()
            .map(|op| {
                let old = op.attributes().cloned().unwrap_or_default();
                let restore: Attributes = attributes
                    .keys()
                    .map(|k| (k.clone(), old.get(k).cloned().unwrap_or(Value::Null)))
                    .collect();
                (op.len(), restore)
            })
            .collect();
        let start = self.anchor(text_id, offset, Assoc::After);
        text.format(&mut self.txn, to_index(offset), to_index(len), to_attrs(&attributes));
        self.journal.push(Inverse::Reformat { start, runs });
        Ok(())
    }

    /// Apply a change delta to a text sequence from its start.
    pub fn apply_delta(&mut self, text_id: &TextId, delta: &TextDelta) -> Result<()> {
        if self.roots.text(&self.txn, text_id).is_none() {
            return Err(CrdtError::TextNotFound(text_id.clone()));
        }
        let mut cursor = 0;
        for op in delta.ops() {
            match op {
                DeltaOp::Insert { insert, attributes } => {
                    self.insert_text(text_id, cursor, insert, attributes.clone())?;
                    cursor += op.len();
                }
                DeltaOp::Retain { retain, attributes } => {
                    if !attributes.is_empty() {
                        self.format_text(text_id, cursor, *retain, attributes.clone())?;
                    }
                    cursor += retain;
                }
                DeltaOp::Delete { delete } => {
                    self.delete_text(text_id, cursor, *delete)?;
                }
            }
        }
        Ok(())
    }

    // =========================================================================
    // Inverse application
    // =========================================================================

    pub(crate) fn apply_journal_inverse(&mut self, journal: Journal) {
        for entry in journal.entries.into_iter().rev() {
            if let Err(err) = self.apply_inverse(entry) {
                warn!(%err, "history step skipped");
            }
        }
    }

    /// Revert one recorded mutation. Targets that other replicas removed in
    /// the meantime are skipped.
    fn apply_inverse(&mut self, entry: Inverse) -> Result<()> {
        match entry {
            Inverse::RemoveBlock(id) => self.delete_block(&id)?,
            Inverse::RestoreBlock(deleted) => self.restore_block(*deleted),
            Inverse::Detach { block, parent } => self.detach(&block, &parent),
            Inverse::Reattach {
                block,
                parent,
                index,
            } => self.reattach(&block, &parent, index),
            Inverse::SetField { block, key, value } => {
                if self.block(&block).is_some() {
                    self.set_field(&block, key, value)?;
                }
            }
            Inverse::SetPage(previous) => {
                let current = read_string(&self.roots.meta, &self.txn, keys::PAGE_ID);
                match previous {
                    Some(page) => {
                        self.roots.meta.insert(&mut self.txn, keys::PAGE_ID, page);
                    }
                    None => {
                        self.roots.meta.remove(&mut self.txn, keys::PAGE_ID);
                    }
                }
                self.journal.push(Inverse::SetPage(current));
            }
            Inverse::DeleteText { start, end } => {
                if let (Some(from), Some(to)) = (self.resolve(&start), self.resolve(&end)) {
                    if to > from {
                        self.delete_text(start.text_id(), from, to - from)?;
                    }
                }
            }
            Inverse::InsertText { at, delta } => {
                if let Some(mut cursor) = self.resolve(&at) {
                    for op in delta.ops() {
                        if let DeltaOp::Insert { insert, attributes } = op {
                            self.insert_text(at.text_id(), cursor, insert, attributes.clone())?;
                            cursor += op.len();
                        }
                    }
                }
            }
            Inverse::Reformat { start, runs } => {
                if let Some(mut cursor) = self.resolve(&start) {
                    for (len, attributes) in runs {
                        self.format_text(start.text_id(), cursor, len, attributes)?;
                        cursor += len;
                    }
                }
            }
            Inverse::RemoveTextEntry(text) => self.remove_text_entry(&text),
            Inverse::RestoreTextEntry { text, delta } => {
                if self.roots.text(&self.txn, &text).is_none() {
                    self.write_text_entry(&text, &delta);
                    self.journal.push(Inverse::RemoveTextEntry(text));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{DocumentStore, StoreOptions, TxnOrigin};

    fn test_store() -> (DocumentStore, BlockId) {
        let store = DocumentStore::new_document(StoreOptions::default()).unwrap();
        let para = store.document_order()[0].clone();
        (store, para)
    }

    fn bold() -> Attributes {
        let mut attrs = Attributes::new();
        attrs.insert("bold".into(), json!(true));
        attrs
    }

    #[test]
    fn test_text_edits_revert_in_order() {
        let (store, para) = test_store();
        let text = para.text_id();
        let applied = store
            .transact("edit", TxnOrigin::Local, |txn| {
                txn.insert_text(&text, 0, "Hello World", Attributes::new())?;
                txn.format_text(&text, 6, 5, bold())?;
                txn.delete_text(&text, 0, 6)
            })
            .unwrap();
        assert_eq!(store.text_string(&text).as_deref(), Some("World"));

        let redo = store.revert(applied.journal, "undo").unwrap();
        assert_eq!(store.text_string(&text).as_deref(), Some(""));

        store.revert(redo, "redo").unwrap();
        let delta = store.get_text(&text).unwrap();
        assert_eq!(delta.plain_text(), "World");
        assert_eq!(delta.ops()[0].attributes(), Some(&bold()));
    }

    #[test]
    fn test_undo_insert_after_concurrent_prefix() {
        let (store, para) = test_store();
        let text = para.text_id();
        let applied = store
            .transact("type", TxnOrigin::Local, |txn| {
                txn.insert_text(&text, 0, "world", Attributes::new())
            })
            .unwrap();

        // Another replica's edit lands before ours.
        let peer = DocumentStore::from_update(StoreOptions::default(), &store.encode_state_as_update())
            .unwrap();
        peer.transact("prefix", TxnOrigin::Local, |txn| {
            txn.insert_text(&text, 0, "hello ", Attributes::new())
        })
        .unwrap();
        store
            .apply_remote_update(&peer.encode_diff(&store.state_vector()).unwrap())
            .unwrap();
        assert_eq!(store.text_string(&text).as_deref(), Some("hello world"));

        store.revert(applied.journal, "undo").unwrap();
        assert_eq!(store.text_string(&text).as_deref(), Some("hello "));
    }

    #[test]
    fn test_delete_block_revert_restores_subtree_in_order() {
        let (store, para) = test_store();
        let page = store.page_id().unwrap();
        let (list, kids) = store
            .transact("build", TxnOrigin::Local, |txn| {
                let list = txn.create_block(BlockType::BulletedList, BlockData::new())?;
                txn.attach_to_parent(&list, &page, 1)?;
                let mut kids = Vec::new();
                for word in ["a", "b", "c"] {
                    let kid = txn.create_block(BlockType::Paragraph, BlockData::new())?;
                    txn.insert_text(&kid.text_id(), 0, word, Attributes::new())?;
                    txn.attach_to_parent(&kid, &list, kids.len())?;
                    kids.push(kid);
                }
                Ok((list, kids))
            })
            .unwrap()
            .value;
        let before = store.outline();

        let applied = store
            .transact("delete", TxnOrigin::Local, |txn| txn.delete_block(&list))
            .unwrap();
        assert_eq!(store.document_order(), vec![para]);

        store.revert(applied.journal, "undo").unwrap();
        assert_eq!(store.outline(), before);
        assert_eq!(store.get_children(&list).unwrap(), kids);
    }

    #[test]
    fn test_ensure_text_materializes_inline_delta() {
        let (store, _) = test_store();
        let page = store.page_id().unwrap();
        let legacy = store
            .transact("legacy", TxnOrigin::Local, |txn| {
                let data = BlockData::new().with("delta", json!([{"insert": "old text"}]));
                let id = txn.create_block(BlockType::Paragraph, data)?;
                txn.attach_to_parent(&id, &page, 0)?;
                txn.remove_text_entry(&id.text_id());
                Ok(id)
            })
            .unwrap()
            .value;
        assert!(store.get_text(&legacy.text_id()).is_none());
        assert_eq!(store.block_text(&legacy).as_deref(), Some("old text"));

        let applied = store
            .transact("ensure", TxnOrigin::Local, |txn| txn.ensure_text(&legacy))
            .unwrap();
        assert_eq!(applied.value, legacy.text_id());
        assert_eq!(store.text_string(&legacy.text_id()).as_deref(), Some("old text"));

        // Already materialized: nothing to do, nothing journaled.
        let again = store
            .transact("ensure", TxnOrigin::Local, |txn| txn.ensure_text(&legacy))
            .unwrap();
        assert!(again.journal.is_empty());
    }

    #[test]
    fn test_ensure_text_rejects_divider() {
        let (store, _) = test_store();
        let result = store.transact("divider", TxnOrigin::Local, |txn| {
            let id = txn.create_block(BlockType::Divider, BlockData::new())?;
            txn.ensure_text(&id)
        });
        assert!(matches!(result, Err(CrdtError::TextNotFound(_))));
    }

    #[test]
    fn test_set_block_data_reverts() {
        let (store, para) = test_store();
        let applied = store
            .transact("data", TxnOrigin::Local, |txn| {
                txn.set_block_data(&para, &BlockData::new().with("level", json!(2)))
            })
            .unwrap();
        assert_eq!(store.get_block(&para).unwrap().data.level(), Some(2));
        store.revert(applied.journal, "undo").unwrap();
        assert_eq!(store.get_block(&para).unwrap().data.level(), None);
    }

    #[test]
    fn test_apply_delta_change() {
        let (store, para) = test_store();
        let text = para.text_id();
        store
            .transact("edit", TxnOrigin::Local, |txn| {
                txn.insert_text(&text, 0, "Hello World", Attributes::new())?;
                let change: TextDelta = [
                    DeltaOp::retain(5),
                    DeltaOp::delete(6),
                    DeltaOp::insert("!"),
                ]
                .into_iter()
                .collect();
                txn.apply_delta(&text, &change)
            })
            .unwrap();
        assert_eq!(store.text_string(&text).as_deref(), Some("Hello!"));
    }
}
