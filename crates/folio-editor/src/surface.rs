//! The base editing surface: tree, selection, and text edits applied to the
//! tree alone. Knows nothing about replication; the binding wraps it.

use folio_crdt::DocumentStore;
use folio_types::{Attributes, BlockId, TextDelta, utf16_len};

use crate::translator::{Point, Selection};
use crate::tree::EditorTree;

/// A text edit made on the surface, in block-level UTF-16 offsets.
#[derive(Clone, Debug, PartialEq)]
pub enum SurfaceOp {
    InsertText {
        block: BlockId,
        offset: usize,
        text: String,
        attributes: Attributes,
    },
    RemoveText {
        block: BlockId,
        offset: usize,
        len: usize,
    },
    FormatText {
        block: BlockId,
        offset: usize,
        len: usize,
        attributes: Attributes,
    },
}

impl SurfaceOp {
    pub fn block(&self) -> &BlockId {
        match self {
            SurfaceOp::InsertText { block, .. }
            | SurfaceOp::RemoveText { block, .. }
            | SurfaceOp::FormatText { block, .. } => block,
        }
    }

    /// The op as a change delta on its block's text.
    pub fn change(&self) -> TextDelta {
        let mut delta = TextDelta::new();
        match self {
            SurfaceOp::InsertText {
                offset,
                text,
                attributes,
                ..
            } => delta
                .retain(*offset, Attributes::new())
                .insert(text, attributes.clone()),
            SurfaceOp::RemoveText { offset, len, .. } => {
                delta.retain(*offset, Attributes::new()).delete(*len)
            }
            SurfaceOp::FormatText {
                offset,
                len,
                attributes,
                ..
            } => delta
                .retain(*offset, Attributes::new())
                .retain(*len, attributes.clone()),
        };
        delta
    }

    /// Where a collapsed caret ends up after this op, if it moves.
    pub fn caret_after(&self) -> Option<(BlockId, usize)> {
        match self {
            SurfaceOp::InsertText {
                block,
                offset,
                text,
                ..
            } => Some((block.clone(), offset + utf16_len(text))),
            SurfaceOp::RemoveText { block, offset, .. } => Some((block.clone(), *offset)),
            SurfaceOp::FormatText { .. } => None,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct EditingSurface {
    tree: EditorTree,
    selection: Option<Selection>,
}

impl EditingSurface {
    pub fn tree(&self) -> &EditorTree {
        &self.tree
    }

    pub(crate) fn tree_mut(&mut self) -> &mut EditorTree {
        &mut self.tree
    }

    pub fn selection(&self) -> Option<&Selection> {
        self.selection.as_ref()
    }

    pub fn select(&mut self, selection: Option<Selection>) {
        self.selection = selection;
    }

    /// Replace the tree with a fresh copy of the store. The selection is
    /// left for the caller to re-anchor.
    pub(crate) fn rebuild(&mut self, store: &DocumentStore) {
        self.tree = EditorTree::build(store);
    }

    /// Apply a text edit to the tree. Returns false when the block is not in
    /// the tree or has no text.
    pub fn apply(&mut self, op: &SurfaceOp) -> bool {
        self.tree.apply_text_change(op.block(), &op.change())
    }

    /// The collapsed caret at the start of the first text block.
    pub fn document_start(&self) -> Option<Selection> {
        let block = self.tree.first_text_block()?;
        Some(Selection::collapsed(Point::in_block(block, 0)))
    }
}
