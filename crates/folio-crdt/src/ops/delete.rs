use folio_types::{BlockData, BlockId, BlockType};
use tracing::debug;

use super::{Boundary, Caret};
use crate::{Applied, CrdtError, DocumentStore, Result, TxnOrigin};

impl DocumentStore {
    /// Delete `block` and its subtree.
    ///
    /// Returns where the cursor should go: the end of the previous text
    /// block, or `None` for the document start. A page left without children
    /// gets a fresh empty paragraph, which then holds the cursor.
    pub fn remove_block(&self, block: &BlockId) -> Result<Option<Applied<Option<Caret>>>> {
        let snapshot = self
            .get_block(block)
            .ok_or_else(|| CrdtError::BlockNotFound(block.clone()))?;
        if snapshot.is_page() {
            return Boundary::TopLevel.hit(block, "delete_block");
        }
        let page = self.page_id().ok_or(CrdtError::MissingPage)?;
        let caret = self.previous_text_block(block).map(|prev| {
            let len = self.block_delta(&prev).map(|d| d.len()).unwrap_or_default();
            Caret::new(prev, len)
        });

        let applied = self.transact("delete_block", TxnOrigin::Local, |txn| {
            txn.delete_block(block)?;
            if txn.children(&page)?.is_empty() {
                let fresh = txn.insert_block(BlockType::Paragraph, BlockData::new(), &page, 0)?;
                return Ok(Some(Caret::start_of(fresh)));
            }
            Ok(caret)
        })?;
        Ok(Some(applied))
    }

    /// Clear the document: afterwards the page holds exactly one empty
    /// paragraph, whose id is returned. Blocks left unattached in the blocks
    /// map are removed too.
    pub fn delete_document(&self) -> Result<Applied<BlockId>> {
        let page = self.page_id().ok_or(CrdtError::MissingPage)?;
        self.transact("delete_document", TxnOrigin::Local, |txn| {
            let fresh = txn.insert_block(BlockType::Paragraph, BlockData::new(), &page, 0)?;
            for id in txn.block_ids() {
                if id != page && id != fresh {
                    txn.delete_block(&id)?;
                }
            }
            debug!(page = %page, "document cleared");
            Ok(fresh)
        })
    }

    /// Give an empty page its first paragraph. A no-op when the page already
    /// has children.
    pub fn append_first_paragraph(&self) -> Result<Option<Applied<BlockId>>> {
        let page = self.page_id().ok_or(CrdtError::MissingPage)?;
        let children = self
            .get_children(&page)
            .ok_or_else(|| CrdtError::ChildrenNotFound(page.clone()))?;
        if !children.is_empty() {
            return Boundary::PageNotEmpty.hit(&page, "append_first_paragraph");
        }
        let applied = self.transact("append_first_paragraph", TxnOrigin::Local, |txn| {
            txn.insert_block(BlockType::Paragraph, BlockData::new(), &page, 0)
        })?;
        Ok(Some(applied))
    }
}
