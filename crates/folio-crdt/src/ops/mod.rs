//! Block editing operations.
//!
//! Each operation is a method on [`DocumentStore`] that resolves everything it
//! can with plain reads, then performs its mutations in one labeled
//! transaction. The shared subtree helpers live here as [`DocTxn`] methods.
//!
//! | Module      | Operations                                                |
//! |-------------|-----------------------------------------------------------|
//! | `split`     | split a block at an offset                                |
//! | `merge`     | merge two blocks; merge backward / forward from a caret   |
//! | `nesting`   | lift, indent, toggle-heading extension                    |
//! | `turn_into` | change a block's type                                     |
//! | `delete`    | delete a block, delete the whole document, first paragraph |
//! | `range`     | delete a selection spanning several blocks                |
//!
//! Return convention: `Ok(Some(applied))` when the document changed,
//! `Ok(None)` when the gesture hit a document boundary (nothing to merge
//! with, first child cannot be indented), `Err` for structural failures.
//! A failed operation leaves the document as it was.

mod delete;
mod merge;
mod nesting;
mod range;
mod split;
mod turn_into;

use folio_types::{BlockData, BlockId, BlockSnapshot, BlockType, DeltaOp, TextDelta};
use tracing::debug;

use crate::txn::DocTxn;
use crate::{CrdtError, Result};

/// A collapsed cursor: a block and a UTF-16 offset into its text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Caret {
    pub block: BlockId,
    pub offset: usize,
}

impl Caret {
    pub fn new(block: BlockId, offset: usize) -> Self {
        Self { block, offset }
    }

    pub fn start_of(block: BlockId) -> Self {
        Self::new(block, 0)
    }
}

/// Why an operation did nothing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Boundary {
    NoPreviousBlock,
    NoNextBlock,
    TopLevel,
    FirstChild,
    NotAContainer,
    NoText,
    SameBlock,
    PageNotEmpty,
    EmptyRange,
}

impl Boundary {
    /// Log the boundary and produce the no-op result.
    pub(crate) fn hit<T>(self, block: &BlockId, op: &str) -> Result<Option<T>> {
        debug!(block = %block, op, reason = ?self, "no-op at document boundary");
        Ok(None)
    }
}

impl DocTxn<'_> {
    /// Append `delta`'s inserts to the end of a block's text.
    pub(crate) fn append_delta(&mut self, block: &BlockId, delta: &TextDelta) -> Result<()> {
        if delta.is_empty() {
            return Ok(());
        }
        let text = self.ensure_text(block)?;
        let mut cursor = self
            .text_len(&text)
            .ok_or_else(|| CrdtError::TextNotFound(text.clone()))?;
        for op in delta.ops() {
            if let DeltaOp::Insert { insert, attributes } = op {
                self.insert_text(&text, cursor, insert, attributes.clone())?;
                cursor += op.len();
            }
        }
        Ok(())
    }

    /// Copy `source`'s text onto the end of `target`'s. Types without text on
    /// either side copy nothing.
    pub(crate) fn copy_block_text(&mut self, source: &BlockSnapshot, target: &BlockId) -> Result<()> {
        let target_has_text = self.require_block(target)?.ty.has_text();
        if !source.ty.has_text() || !target_has_text {
            return Ok(());
        }
        let delta = self.block_delta(source);
        self.append_delta(target, &delta)
    }

    /// Recreate `source` and its subtree under fresh ids, attached to
    /// `parent` at `index`. Returns the copy's id.
    pub(crate) fn deep_copy_block(
        &mut self,
        source: &BlockId,
        parent: &BlockId,
        index: usize,
    ) -> Result<BlockId> {
        self.copy_subtree(source, parent, index, 0)
    }

    fn copy_subtree(
        &mut self,
        source: &BlockId,
        parent: &BlockId,
        index: usize,
        depth: usize,
    ) -> Result<BlockId> {
        if depth > self.max_depth() {
            return Err(CrdtError::NestingTooDeep {
                block: source.clone(),
                limit: self.max_depth(),
            });
        }
        let block = self.require_block(source)?;
        let mut data = block.data.clone();
        data.remove("delta");

        let copy = self.create_block(block.ty, data)?;
        self.copy_block_text(&block, &copy)?;
        for (i, child) in self.children(source)?.iter().enumerate() {
            self.copy_subtree(child, &copy, i, depth + 1)?;
        }
        self.attach_to_parent(&copy, parent, index)?;
        Ok(copy)
    }

    /// Move `block` by copying its subtree to `parent` at `index` and deleting
    /// the original. Returns the copy's id.
    pub(crate) fn move_block(
        &mut self,
        block: &BlockId,
        parent: &BlockId,
        index: usize,
    ) -> Result<BlockId> {
        let copy = self.deep_copy_block(block, parent, index)?;
        self.delete_block(block)?;
        Ok(copy)
    }

    /// Move all of `source`'s children into `target`, starting at `index` or
    /// appended when `None`, preserving order and nesting.
    pub(crate) fn transfer_children(
        &mut self,
        source: &BlockId,
        target: &BlockId,
        index: Option<usize>,
    ) -> Result<()> {
        let children = self.children(source)?;
        if children.is_empty() {
            return Ok(());
        }
        let start = match index {
            Some(i) => i,
            None => self.children(target)?.len(),
        };
        for (i, child) in children.iter().enumerate() {
            self.deep_copy_block(child, target, start + i)?;
        }
        for child in &children {
            self.delete_block(child)?;
        }
        Ok(())
    }

    /// Move all of `source`'s children into `source`'s own parent, right
    /// after `source`.
    pub(crate) fn lift_children(&mut self, source: &BlockId) -> Result<()> {
        let children = self.children(source)?;
        if children.is_empty() {
            return Ok(());
        }
        let (parent, index) = self.slot(source)?;
        for (i, child) in children.iter().enumerate() {
            self.deep_copy_block(child, &parent.id, index + 1 + i)?;
        }
        for child in &children {
            self.delete_block(child)?;
        }
        Ok(())
    }

    /// Insert a new block with `data` into `parent` at `index`.
    pub(crate) fn insert_block(
        &mut self,
        ty: BlockType,
        data: BlockData,
        parent: &BlockId,
        index: usize,
    ) -> Result<BlockId> {
        let id = self.create_block(ty, data)?;
        self.attach_to_parent(&id, parent, index)?;
        Ok(id)
    }
}


#[cfg(test)]
mod tests {
    use folio_types::BlockType;

    use super::fixtures::Doc;
    use crate::TxnOrigin;

    #[test]
    fn test_deep_copy_gives_fresh_ids_and_same_shape() {
        let doc = Doc::empty();
        let list = doc.add(&doc.page, BlockType::BulletedList, "list");
        let kid = doc.add(&list, BlockType::TodoList, "kid");
        let grandkid = doc.add(&kid, BlockType::Paragraph, "grandkid");

        let copy = doc
            .store
            .transact("copy", TxnOrigin::Local, |txn| {
                txn.deep_copy_block(&list, &doc.page, 1)
            })
            .unwrap()
            .value;

        assert_ne!(copy, list);
        assert_eq!(doc.text(&copy), "list");
        let copied_kid = doc.children(&copy)[0].clone();
        assert_ne!(copied_kid, kid);
        assert_eq!(doc.text(&copied_kid), "kid");
        let copied_grandkid = doc.children(&copied_kid)[0].clone();
        assert_ne!(copied_grandkid, grandkid);
        assert_eq!(doc.text(&copied_grandkid), "grandkid");
        assert_eq!(doc.store.parent_of(&copied_grandkid), Some(copied_kid));
    }

    #[test]
    fn test_transfer_children_preserves_order() {
        let doc = Doc::empty();
        let from = doc.add(&doc.page, BlockType::BulletedList, "from");
        let to = doc.add(&doc.page, BlockType::BulletedList, "to");
        doc.add(&to, BlockType::Paragraph, "existing");
        for word in ["a", "b", "c"] {
            doc.add(&from, BlockType::Paragraph, word);
        }

        doc.store
            .transact("transfer", TxnOrigin::Local, |txn| {
                txn.transfer_children(&from, &to, None)
            })
            .unwrap();

        assert!(doc.children(&from).is_empty());
        assert_eq!(doc.texts_of(&to), ["existing", "a", "b", "c"]);
    }

    #[test]
    fn test_lift_children_lands_after_source() {
        let doc = Doc::empty();
        let source = doc.add(&doc.page, BlockType::Paragraph, "source");
        doc.add(&doc.page, BlockType::Paragraph, "after");
        doc.add(&source, BlockType::Paragraph, "x");
        doc.add(&source, BlockType::Paragraph, "y");

        doc.store
            .transact("lift", TxnOrigin::Local, |txn| txn.lift_children(&source))
            .unwrap();

        assert_eq!(doc.top_texts(), ["source", "x", "y", "after"]);
    }
}
