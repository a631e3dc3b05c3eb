//! Lift (outdent) and indent.

use folio_types::{BlockId, BlockType};

use super::Boundary;
use crate::txn::DocTxn;
use crate::{Applied, CrdtError, DocumentStore, Result, TxnOrigin};

impl DocumentStore {
    /// Move `block` out of its parent, to right after the parent in the
    /// grandparent. Page children cannot be lifted.
    ///
    /// The block is recreated with its subtree under a fresh id, which is
    /// returned so the caller can put the cursor back inside it.
    pub fn lift_block(&self, block: &BlockId) -> Result<Option<Applied<BlockId>>> {
        let depth = self
            .depth(block)
            .ok_or_else(|| CrdtError::BlockNotFound(block.clone()))?;
        if depth < 2 {
            return Boundary::TopLevel.hit(block, "lift");
        }
        let (parent, _) = self
            .slot_of(block)
            .ok_or_else(|| CrdtError::ParentNotFound(block.clone()))?;
        let (grandparent, parent_index) = self
            .slot_of(&parent)
            .ok_or_else(|| CrdtError::ParentNotFound(parent.clone()))?;

        let applied = self.transact("lift_block", TxnOrigin::Local, |txn| {
            txn.move_block(block, &grandparent, parent_index + 1)
        })?;
        Ok(Some(applied))
    }

    /// Make `block` the last child of its previous sibling. A no-op for a
    /// first child or when the previous sibling cannot hold children.
    pub fn indent_block(&self, block: &BlockId) -> Result<Option<Applied<BlockId>>> {
        let (parent, index) = self
            .slot_of(block)
            .ok_or_else(|| CrdtError::ParentNotFound(block.clone()))?;
        if index == 0 {
            return Boundary::FirstChild.hit(block, "indent");
        }
        let siblings = self
            .get_children(&parent)
            .ok_or_else(|| CrdtError::ChildrenNotFound(parent.clone()))?;
        let previous = self
            .get_block(&siblings[index - 1])
            .ok_or_else(|| CrdtError::BlockNotFound(siblings[index - 1].clone()))?;
        if !previous.ty.is_container() {
            return Boundary::NotAContainer.hit(block, "indent");
        }
        if self.depth(&previous.id).unwrap_or_default() + 1 > self.max_nesting_depth() {
            return Err(CrdtError::NestingTooDeep {
                block: block.clone(),
                limit: self.max_nesting_depth(),
            });
        }

        let applied = self.transact("indent_block", TxnOrigin::Local, |txn| {
            let end = txn.children(&previous.id)?.len();
            txn.move_block(block, &previous.id, end)
        })?;
        Ok(Some(applied))
    }
}

impl DocTxn<'_> {
    /// A toggle with a heading level swallows the siblings that follow it,
    /// up to the first one carrying a level of the same rank or higher
    /// (numerically lower or equal).
    pub(crate) fn extend_toggle_heading(&mut self, toggle: &BlockId) -> Result<()> {
        let block = self.require_block(toggle)?;
        if block.ty != BlockType::ToggleList {
            return Ok(());
        }
        let Some(level) = block.data.level() else {
            return Ok(());
        };
        let (parent, index) = self.slot(toggle)?;
        let followers: Vec<BlockId> = self
            .children(&parent.id)?
            .into_iter()
            .skip(index + 1)
            .take_while(|id| {
                self.block(id)
                    .and_then(|b| b.data.level())
                    .is_none_or(|l| l > level)
            })
            .collect();
        for id in &followers {
            let end = self.children(toggle)?.len();
            self.move_block(id, toggle, end)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use folio_types::BlockType;

    use crate::ops::fixtures::Doc;

    #[test]
    fn test_indent_under_toggle() {
        let doc = Doc::empty();
        let toggle = doc.add(&doc.page, BlockType::ToggleList, "toggle");
        doc.add(&doc.page, BlockType::Paragraph, "body");

        let moved = doc.store.indent_block(&doc.children(&doc.page)[1]).unwrap().unwrap().value;

        assert_eq!(doc.children(&doc.page), vec![toggle.clone()]);
        assert_eq!(doc.children(&toggle), vec![moved.clone()]);
        assert_eq!(doc.text(&moved), "body");
    }

    #[test]
    fn test_indent_under_paragraph_is_noop() {
        let doc = Doc::empty();
        doc.add(&doc.page, BlockType::Paragraph, "plain");
        let second = doc.add(&doc.page, BlockType::Paragraph, "body");
        let before = doc.store.outline();
        let ids = doc.children(&doc.page);

        assert!(doc.store.indent_block(&second).unwrap().is_none());
        assert_eq!(doc.store.outline(), before);
        assert_eq!(doc.children(&doc.page), ids);
    }

    #[test]
    fn test_indent_first_child_is_noop() {
        let doc = Doc::empty();
        let first = doc.add(&doc.page, BlockType::Paragraph, "first");
        assert!(doc.store.indent_block(&first).unwrap().is_none());
    }

    #[test]
    fn test_indent_appends_after_existing_children() {
        let doc = Doc::empty();
        let list = doc.add(&doc.page, BlockType::BulletedList, "list");
        doc.add(&list, BlockType::Paragraph, "old");
        let item = doc.add(&doc.page, BlockType::Paragraph, "new");
        doc.add(&item, BlockType::Paragraph, "rider");

        let moved = doc.store.indent_block(&item).unwrap().unwrap().value;

        assert_eq!(doc.texts_of(&list), ["old", "new"]);
        assert_eq!(doc.texts_of(&moved), ["rider"]);
    }

    #[test]
    fn test_lift_top_level_is_noop() {
        let doc = Doc::empty();
        let top = doc.add(&doc.page, BlockType::Paragraph, "top");
        assert!(doc.store.lift_block(&top).unwrap().is_none());
    }

    #[test]
    fn test_lift_places_block_after_parent() {
        let doc = Doc::empty();
        let a = doc.add(&doc.page, BlockType::BulletedList, "A");
        let target = doc.add(&a, BlockType::Paragraph, "target");
        doc.add(&target, BlockType::Paragraph, "carried");
        doc.add(&doc.page, BlockType::Paragraph, "tail");

        let lifted = doc.store.lift_block(&target).unwrap().unwrap().value;

        assert_eq!(doc.top_texts(), ["A", "target", "tail"]);
        assert_eq!(doc.children(&doc.page)[1], lifted);
        assert_eq!(doc.texts_of(&lifted), ["carried"]);
        assert!(doc.children(&a).is_empty());
        assert!(!doc.store.contains_block(&target));
    }

    #[test]
    fn test_lift_from_three_levels_deep() {
        let doc = Doc::empty();
        let a = doc.add(&doc.page, BlockType::BulletedList, "A");
        let b = doc.add(&a, BlockType::BulletedList, "B");
        let target = doc.add(&b, BlockType::Paragraph, "target");

        let once = doc.store.lift_block(&target).unwrap().unwrap().value;
        assert_eq!(doc.children(&a), vec![b.clone(), once.clone()]);
        assert!(doc.children(&b).is_empty());

        let twice = doc.store.lift_block(&once).unwrap().unwrap().value;
        assert_eq!(doc.children(&doc.page), vec![a.clone(), twice.clone()]);
        assert_eq!(doc.text(&twice), "target");
    }

    #[test]
    fn test_indent_undoes_lift_of_last_child() {
        let doc = Doc::empty();
        let list = doc.add(&doc.page, BlockType::BulletedList, "list");
        doc.add(&list, BlockType::Paragraph, "one");
        let last = doc.add(&list, BlockType::Paragraph, "two");
        let before = doc.store.outline();

        let lifted = doc.store.lift_block(&last).unwrap().unwrap().value;
        let back = doc.store.indent_block(&lifted).unwrap().unwrap().value;

        assert_eq!(doc.store.outline(), before);
        assert_eq!(doc.store.slot_of(&back), Some((list, 1)));
    }
}
