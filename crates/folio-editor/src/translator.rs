//! Position translation between the editing tree and the store.
//!
//! An editing [`Point`] names a block, a path through that block's inline
//! nodes down to a text run, and an offset inside the run. A
//! [`RelativePoint`] names the same place as an anchor in the block's text
//! sequence, which keeps its meaning while other replicas edit the document.
//!
//! | Direction                          | Function        |
//! |------------------------------------|-----------------|
//! | editing point → block offset       | [`block_offset`] |
//! | block offset → editing point       | [`point_at`]     |
//! | editing point → relative point     | [`to_relative`]  |
//! | relative point → editing point     | [`to_point`]     |
//!
//! All offsets are UTF-16 code units.

use folio_crdt::{Assoc, DocumentStore, TextAnchor};
use folio_types::BlockId;

use crate::error::{EditorError, Result};
use crate::tree::{EditorTree, Inline};

/// A position in the editing tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Point {
    pub block: BlockId,
    /// Child indices from the block's inline list down to a run. Empty means
    /// `offset` counts from the start of the block's whole text.
    pub path: Vec<usize>,
    pub offset: usize,
}

impl Point {
    pub fn new(block: BlockId, path: Vec<usize>, offset: usize) -> Self {
        Self {
            block,
            path,
            offset,
        }
    }

    /// A point addressed by block-level offset.
    pub fn in_block(block: BlockId, offset: usize) -> Self {
        Self::new(block, Vec::new(), offset)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Selection {
    pub anchor: Point,
    pub focus: Point,
}

impl Selection {
    pub fn collapsed(point: Point) -> Self {
        Self {
            anchor: point.clone(),
            focus: point,
        }
    }

    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.focus
    }
}

/// A point pinned to a text sequence.
#[derive(Clone, Debug)]
pub struct RelativePoint {
    pub block: BlockId,
    pub anchor: TextAnchor,
}

#[derive(Clone, Debug)]
pub struct RelativeSelection {
    pub anchor: RelativePoint,
    pub focus: RelativePoint,
}

/// Offset of `point` from the start of its block's text, clamped to the
/// text length.
pub fn block_offset(tree: &EditorTree, point: &Point) -> Result<usize> {
    let node = tree.node(&point.block).ok_or_else(|| not_found(point))?;
    if !node.owns_text() {
        return Err(EditorError::NoTextAncestor(point.block.clone()));
    }
    let total = node.text_len();
    if point.path.is_empty() {
        return Ok(point.offset.min(total));
    }

    let mut level: &[Inline] = &node.inlines;
    let mut base = 0;
    for (depth, &index) in point.path.iter().enumerate() {
        let child = level.get(index).ok_or_else(|| not_found(point))?;
        base += level[..index].iter().map(Inline::len).sum::<usize>();
        match child {
            Inline::Run(run) if depth + 1 == point.path.len() => {
                return Ok((base + point.offset.min(run.len())).min(total));
            }
            Inline::Link { children, .. } if depth + 1 < point.path.len() => {
                level = children;
            }
            _ => return Err(not_found(point)),
        }
    }
    Err(not_found(point))
}

/// The editing point at `offset` in `block`'s text: the first run whose end
/// reaches the offset, or the end of the last run when the offset is past
/// the text.
pub fn point_at(tree: &EditorTree, block: &BlockId, offset: usize) -> Option<Point> {
    let node = tree.node(block)?;
    if !node.owns_text() {
        return Some(Point::in_block(block.clone(), 0));
    }
    let mut path = Vec::new();
    let mut level: &[Inline] = &node.inlines;
    let mut remaining = offset;
    loop {
        let (index, child) = locate(level, remaining)?;
        remaining -= level[..index].iter().map(Inline::len).sum::<usize>();
        path.push(index);
        match child {
            Inline::Run(run) => {
                return Some(Point::new(block.clone(), path, remaining.min(run.len())));
            }
            Inline::Link { children, .. } => level = children,
        }
    }
}

fn locate(level: &[Inline], offset: usize) -> Option<(usize, &Inline)> {
    let mut acc = 0;
    for (index, child) in level.iter().enumerate() {
        acc += child.len();
        if offset <= acc {
            return Some((index, child));
        }
    }
    level.iter().enumerate().last()
}

/// Pin an editing point to its block's text sequence.
pub fn to_relative(
    tree: &EditorTree,
    store: &DocumentStore,
    point: &Point,
    assoc: Assoc,
) -> Result<RelativePoint> {
    let offset = block_offset(tree, point)?;
    let text_id = tree
        .node(&point.block)
        .and_then(|node| node.text_id.clone())
        .ok_or_else(|| EditorError::NoTextAncestor(point.block.clone()))?;
    Ok(RelativePoint {
        block: point.block.clone(),
        anchor: store.anchor(&text_id, offset, assoc),
    })
}

/// Resolve a relative point against the current store and tree. `None` when
/// the text sequence or the block is gone.
pub fn to_point(tree: &EditorTree, store: &DocumentStore, relative: &RelativePoint) -> Option<Point> {
    let offset = store.resolve_anchor(&relative.anchor)?;
    point_at(tree, &relative.block, offset)
}

pub fn selection_to_relative(
    tree: &EditorTree,
    store: &DocumentStore,
    selection: &Selection,
) -> Result<RelativeSelection> {
    Ok(RelativeSelection {
        anchor: to_relative(tree, store, &selection.anchor, Assoc::After)?,
        focus: to_relative(tree, store, &selection.focus, Assoc::After)?,
    })
}

pub fn selection_to_points(
    tree: &EditorTree,
    store: &DocumentStore,
    relative: &RelativeSelection,
) -> Option<Selection> {
    Some(Selection {
        anchor: to_point(tree, store, &relative.anchor)?,
        focus: to_point(tree, store, &relative.focus)?,
    })
}

fn not_found(point: &Point) -> EditorError {
    EditorError::PointNotFound {
        block: point.block.clone(),
        path: point.path.clone(),
    }
}
