//! Turn a block into another type, keeping its text and position.

use folio_types::{BlockData, BlockId, BlockType};

use super::Boundary;
use crate::{Applied, CrdtError, DocumentStore, Result, TxnOrigin};

impl DocumentStore {
    /// Replace `block` with a block of type `ty` carrying `data`, at the same
    /// position and with the same text. Children stay under the new block
    /// when `ty` is a container, otherwise they are lifted to follow it.
    ///
    /// Turning a block into a toggle heading also pulls the following
    /// lower-ranked siblings into the toggle. Returns the new block's id.
    pub fn turn_into(
        &self,
        block: &BlockId,
        ty: BlockType,
        mut data: BlockData,
    ) -> Result<Option<Applied<BlockId>>> {
        let source = self
            .get_block(block)
            .ok_or_else(|| CrdtError::BlockNotFound(block.clone()))?;
        if source.is_page() || ty == BlockType::Page {
            return Boundary::TopLevel.hit(block, "turn_into");
        }
        let (parent, index) = self
            .slot_of(block)
            .ok_or_else(|| CrdtError::ParentNotFound(block.clone()))?;
        data.remove("delta");

        let applied = self.transact("turn_into", TxnOrigin::Local, |txn| {
            let new_block = txn.insert_block(ty, data, &parent, index)?;
            txn.copy_block_text(&source, &new_block)?;
            if ty.is_container() {
                txn.transfer_children(block, &new_block, None)?;
            } else {
                txn.lift_children(block)?;
            }
            txn.delete_block(block)?;
            txn.extend_toggle_heading(&new_block)?;
            Ok(new_block)
        })?;
        Ok(Some(applied))
    }
}
