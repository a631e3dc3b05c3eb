//! Split a block in two at a text offset (Enter).

use folio_types::{BlockData, BlockId, BlockSnapshot, BlockType, TextDelta};

use super::{Boundary, Caret};
use crate::txn::DocTxn;
use crate::{Applied, CrdtError, DocumentStore, Result, TxnOrigin};

impl DocumentStore {
    /// Split `block` at `offset` (clamped to its text length).
    ///
    /// - At offset 0 an empty block is inserted above `block`: another item of
    ///   the same list for list types, a paragraph otherwise. The caret stays
    ///   at the start of `block`.
    /// - Otherwise the text after `offset` moves to a new block placed right
    ///   after `block`, and `block`'s children move with it. An expanded
    ///   toggle or quote keeps its children and takes the new block as its
    ///   first child instead. The caret goes to the start of the new block.
    pub fn split_block(&self, block: &BlockId, offset: usize) -> Result<Option<Applied<Caret>>> {
        let snapshot = self
            .get_block(block)
            .ok_or_else(|| CrdtError::BlockNotFound(block.clone()))?;
        if snapshot.is_page() {
            return Boundary::TopLevel.hit(block, "split");
        }
        if !snapshot.ty.has_text() {
            return Boundary::NoText.hit(block, "split");
        }
        let (parent, index) = self
            .slot_of(block)
            .ok_or_else(|| CrdtError::ParentNotFound(block.clone()))?;
        let content = self.block_delta(block).unwrap_or_default();
        let plan = SplitPlan::new(&snapshot, parent, index, &content, offset);

        let applied = self.transact("split_block", TxnOrigin::Local, |txn| {
            txn.apply_split(block, plan)
        })?;
        Ok(Some(applied))
    }
}

/// Everything a split writes, worked out from a read of the block.
#[derive(Debug)]
pub(crate) struct SplitPlan {
    parent: BlockId,
    index: usize,
    kind: SplitKind,
}

#[derive(Debug)]
enum SplitKind {
    /// Empty block inserted above.
    Above { ty: BlockType, data: BlockData },
    /// `tail` moves out of the block into a new one.
    Tail {
        offset: usize,
        tail: TextDelta,
        ty: BlockType,
        data: BlockData,
        /// The new block goes in as the first child of an open collapsible.
        nested: bool,
    },
}

impl SplitPlan {
    pub(crate) fn new(
        snapshot: &BlockSnapshot,
        parent: BlockId,
        index: usize,
        content: &TextDelta,
        offset: usize,
    ) -> Self {
        let offset = offset.min(content.len());
        let kind = if offset == 0 {
            let (ty, data) = if snapshot.ty.is_list() {
                let mut data = snapshot.data.clone();
                data.remove("delta");
                (snapshot.ty, data)
            } else {
                (BlockType::Paragraph, BlockData::new())
            };
            SplitKind::Above { ty, data }
        } else {
            let ty = snapshot.ty.split_type(&snapshot.data);
            let data = if ty == snapshot.ty {
                snapshot.data.for_split()
            } else {
                BlockData::new()
            };
            SplitKind::Tail {
                offset,
                tail: content.slice(offset, None),
                ty,
                data,
                nested: snapshot.ty.is_collapsible() && snapshot.data.is_open(),
            }
        };
        Self {
            parent,
            index,
            kind,
        }
    }
}

impl DocTxn<'_> {
    /// Split inside a transaction that has already changed the block (enter
    /// over a selection), so the plan is read from the transaction.
    pub(crate) fn split_at(&mut self, block: &BlockId, offset: usize) -> Result<Caret> {
        let snapshot = self.require_block(block)?;
        let (parent, index) = self.slot(block)?;
        let text = self.ensure_text(block)?;
        let content = self
            .text_delta(&text)
            .ok_or_else(|| CrdtError::TextNotFound(text.clone()))?;
        let plan = SplitPlan::new(&snapshot, parent.id, index, &content, offset);
        self.apply_split(block, plan)
    }

    pub(crate) fn apply_split(&mut self, block: &BlockId, plan: SplitPlan) -> Result<Caret> {
        let text = self.ensure_text(block)?;
        match plan.kind {
            SplitKind::Above { ty, data } => {
                self.insert_block(ty, data, &plan.parent, plan.index)?;
                Ok(Caret::start_of(block.clone()))
            }
            SplitKind::Tail {
                offset,
                tail,
                ty,
                data,
                nested,
            } => {
                self.delete_text(&text, offset, tail.len())?;
                let new_block = if nested {
                    self.insert_block(ty, data, block, 0)?
                } else {
                    let new_block = self.insert_block(ty, data, &plan.parent, plan.index + 1)?;
                    self.transfer_children(block, &new_block, None)?;
                    new_block
                };
                self.append_delta(&new_block, &tail)?;
                Ok(Caret::start_of(new_block))
            }
        }
    }
}
