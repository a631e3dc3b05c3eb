//! Join two blocks (Backspace at block start, Delete at block end).

use folio_types::BlockId;

use super::{Boundary, Caret};
use crate::txn::DocTxn;
use crate::{Applied, CrdtError, DocumentStore, Result, TxnOrigin};

impl DocumentStore {
    /// Append `source`'s text to `target`, hand over `source`'s children and
    /// delete `source`. The caret lands in `target` where its old text ended.
    ///
    /// Children go to `target` when it is a container: at `source`'s index if
    /// `source` is one of `target`'s children, otherwise after `target`'s own
    /// children. Either way document order is kept. When `target` cannot hold
    /// children they are lifted into `source`'s parent right after `source`.
    ///
    /// An empty `target` without children is deleted instead and `source`
    /// stays as it is, caret at its start. Backspacing into a blank line thus
    /// keeps the block's type, data and children.
    pub fn merge_blocks(
        &self,
        source: &BlockId,
        target: &BlockId,
    ) -> Result<Option<Applied<Caret>>> {
        if source == target {
            return Boundary::SameBlock.hit(source, "merge");
        }
        let source_block = self
            .get_block(source)
            .ok_or_else(|| CrdtError::BlockNotFound(source.clone()))?;
        if !self.contains_block(target) {
            return Err(CrdtError::BlockNotFound(target.clone()));
        }
        if source_block.is_page() {
            return Boundary::TopLevel.hit(source, "merge");
        }
        if self.block_delta(target).is_none() {
            return Boundary::NoText.hit(target, "merge");
        }
        if self.is_ancestor(source, target) {
            return Err(CrdtError::SelfAttachment {
                block: source.clone(),
                parent: target.clone(),
            });
        }
        let blank_target = self.block_delta(target).is_some_and(|d| d.len() == 0)
            && self.get_children(target).is_some_and(|c| c.is_empty());
        if blank_target && source_block.ty.has_text() {
            let applied = self.transact("merge_blocks", TxnOrigin::Local, |txn| {
                txn.delete_block(target)?;
                Ok(Caret::start_of(source.clone()))
            })?;
            return Ok(Some(applied));
        }
        let applied = self.transact("merge_blocks", TxnOrigin::Local, |txn| {
            let offset = txn.merge_into(source, target)?;
            Ok(Caret::new(target.clone(), offset))
        })?;
        Ok(Some(applied))
    }

    /// Merge `block` into the text block before it in document order.
    /// A no-op at the start of the document.
    pub fn merge_backward(&self, block: &BlockId) -> Result<Option<Applied<Caret>>> {
        match self.previous_text_block(block) {
            Some(target) => self.merge_blocks(block, &target),
            None => Boundary::NoPreviousBlock.hit(block, "merge_backward"),
        }
    }

    /// Merge the text block after `block` in document order into `block`.
    /// A no-op at the end of the document.
    pub fn merge_forward(&self, block: &BlockId) -> Result<Option<Applied<Caret>>> {
        match self.next_text_block(block) {
            Some(source) => self.merge_blocks(&source, block),
            None => Boundary::NoNextBlock.hit(block, "merge_forward"),
        }
    }

    /// True when `ancestor` is `block` or one of its ancestors.
    pub fn is_ancestor(&self, ancestor: &BlockId, block: &BlockId) -> bool {
        let mut current = Some(block.clone());
        let mut steps = 0;
        while let Some(id) = current {
            if &id == ancestor {
                return true;
            }
            steps += 1;
            if steps > self.max_nesting_depth() + 1 {
                return false;
            }
            current = self.parent_of(&id);
        }
        false
    }
}

impl DocTxn<'_> {
    /// Body of [`DocumentStore::merge_blocks`]. Returns the length `target`'s
    /// text had before the merge.
    pub(crate) fn merge_into(&mut self, source: &BlockId, target: &BlockId) -> Result<usize> {
        let source_block = self.require_block(source)?;
        let target_block = self.require_block(target)?;
        let text = self.ensure_text(target)?;
        let offset = self
            .text_len(&text)
            .ok_or_else(|| CrdtError::TextNotFound(text.clone()))?;

        let content = self.block_delta(&source_block);
        self.append_delta(target, &content)?;
        if target_block.ty.is_container() {
            let child_index = match &source_block.parent {
                Some(parent) if parent == target => Some(self.slot(source)?.1),
                _ => None,
            };
            self.transfer_children(source, target, child_index)?;
        } else {
            self.lift_children(source)?;
        }
        self.delete_block(source)?;
        Ok(offset)
    }
}
