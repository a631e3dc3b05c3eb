//! Deleting a selection that spans blocks.

use folio_types::BlockId;

use super::{Boundary, Caret};
use crate::txn::DocTxn;
use crate::{Applied, CrdtError, DocumentStore, Result, TxnOrigin};

/// Blocks affected by a selection, resolved before the transaction.
#[derive(Debug)]
struct RangePlan {
    start: Caret,
    end: Caret,
    /// Blocks strictly between the endpoints in document order, except
    /// ancestors of the end block.
    middle: Vec<BlockId>,
    /// Ancestors of the end block lying inside the selection. Their text is
    /// selected but their later children are not, so they are emptied rather
    /// than deleted.
    cleared: Vec<BlockId>,
}

impl DocumentStore {
    /// Delete everything between `anchor` and `focus` (in either order).
    ///
    /// Within one block this deletes text. Across blocks it cuts the tail of
    /// the start block and the head of the end block, merges the end block
    /// into the start block and deletes the blocks in between. The caret
    /// lands where the selection started.
    pub fn remove_range(&self, anchor: &Caret, focus: &Caret) -> Result<Option<Applied<Caret>>> {
        let Some(plan) = self.plan_range(anchor, focus)? else {
            return Boundary::EmptyRange.hit(&anchor.block, "remove_range");
        };
        let applied = self.transact("remove_range", TxnOrigin::Local, |txn| {
            txn.remove_planned(&plan)
        })?;
        Ok(Some(applied))
    }

    /// Enter over a selection: remove it, then split at the collapsed caret.
    pub fn range_break(&self, anchor: &Caret, focus: &Caret) -> Result<Option<Applied<Caret>>> {
        let plan = self.plan_range(anchor, focus)?;
        let block = self
            .get_block(&anchor.block)
            .ok_or_else(|| CrdtError::BlockNotFound(anchor.block.clone()))?;
        if block.is_page() {
            return Boundary::TopLevel.hit(&anchor.block, "range_break");
        }
        let applied = self.transact("range_break", TxnOrigin::Local, |txn| {
            let caret = match &plan {
                Some(plan) => txn.remove_planned(plan)?,
                None => anchor.clone(),
            };
            txn.split_at(&caret.block, caret.offset)
        })?;
        Ok(Some(applied))
    }

    /// `None` for a collapsed selection.
    fn plan_range(&self, anchor: &Caret, focus: &Caret) -> Result<Option<RangePlan>> {
        for caret in [anchor, focus] {
            let block = self
                .get_block(&caret.block)
                .ok_or_else(|| CrdtError::BlockNotFound(caret.block.clone()))?;
            if !block.ty.has_text() {
                return Err(CrdtError::TextNotFound(caret.block.text_id()));
            }
        }

        if anchor.block == focus.block {
            if anchor.offset == focus.offset {
                return Ok(None);
            }
            let (start, end) = if anchor.offset < focus.offset {
                (anchor, focus)
            } else {
                (focus, anchor)
            };
            return Ok(Some(RangePlan {
                start: start.clone(),
                end: end.clone(),
                middle: Vec::new(),
                cleared: Vec::new(),
            }));
        }

        let order = self.document_order();
        let position = |caret: &Caret| {
            order
                .iter()
                .position(|id| id == &caret.block)
                .ok_or_else(|| CrdtError::ParentNotFound(caret.block.clone()))
        };
        let (a, f) = (position(anchor)?, position(focus)?);
        let (start, end, from, to) = if a < f {
            (anchor, focus, a, f)
        } else {
            (focus, anchor, f, a)
        };

        let (cleared, middle): (Vec<BlockId>, Vec<BlockId>) = order[from + 1..to]
            .iter()
            .cloned()
            .partition(|id| self.is_ancestor(id, &end.block));
        Ok(Some(RangePlan {
            start: start.clone(),
            end: end.clone(),
            middle,
            cleared,
        }))
    }
}

impl DocTxn<'_> {
    fn remove_planned(&mut self, plan: &RangePlan) -> Result<Caret> {
        let start_text = self.ensure_text(&plan.start.block)?;
        let start_len = self
            .text_len(&start_text)
            .ok_or_else(|| CrdtError::TextNotFound(start_text.clone()))?;
        let from = plan.start.offset.min(start_len);

        if plan.start.block == plan.end.block {
            let to = plan.end.offset.min(start_len);
            self.delete_text(&start_text, from, to - from)?;
            return Ok(Caret::new(plan.start.block.clone(), from));
        }

        self.delete_text(&start_text, from, start_len - from)?;
        let end_text = self.ensure_text(&plan.end.block)?;
        self.delete_text(&end_text, 0, plan.end.offset)?;
        for id in &plan.cleared {
            let Some(text) = self.block(id).and_then(|b| b.text_id()) else {
                continue;
            };
            if let Some(len) = self.text_len(&text) {
                self.delete_text(&text, 0, len)?;
            }
        }

        self.merge_into(&plan.end.block, &plan.start.block)?;
        for id in &plan.middle {
            self.delete_block(id)?;
        }
        Ok(Caret::new(plan.start.block.clone(), from))
    }
}
