//! Error types for document store operations.

use folio_types::{BlockId, TextId};
use thiserror::Error;

/// Errors that can occur while reading or mutating the document.
///
/// Natural document boundaries (nothing to merge with, first child cannot be
/// indented) are not errors; operations report them as `Ok(None)`.
#[derive(Error, Debug)]
pub enum CrdtError {
    /// Block not found in the blocks map.
    #[error("block not found: {0:?}")]
    BlockNotFound(BlockId),

    /// A block's parent back-reference does not resolve.
    #[error("parent of {0:?} not found")]
    ParentNotFound(BlockId),

    /// A block's children-group id does not resolve in the children map.
    #[error("children of {0:?} not found")]
    ChildrenNotFound(BlockId),

    /// A text-bearing block has no entry in the text map.
    #[error("text not found: {0:?}")]
    TextNotFound(TextId),

    /// A block is not listed in its parent's children.
    #[error("block {child:?} is not a child of {parent:?}")]
    NotAChild { child: BlockId, parent: BlockId },

    /// Attaching would make a block its own ancestor.
    #[error("cannot attach {block:?} under {parent:?}: would create a cycle")]
    SelfAttachment { block: BlockId, parent: BlockId },

    /// Subtree walk exceeded the configured nesting limit.
    #[error("nesting deeper than {limit} levels under {block:?}")]
    NestingTooDeep { block: BlockId, limit: usize },

    /// The document has no page root.
    #[error("document has no page root")]
    MissingPage,

    /// A relative position no longer resolves (its text sequence is gone).
    #[error("relative position in {0:?} cannot be resolved")]
    UnresolvablePosition(TextId),

    /// A replica update could not be decoded or applied.
    #[error("replica update error: {0}")]
    Update(String),
}

impl CrdtError {
    /// True for lookups that failed because the document is not in the
    /// expected shape. These are never retried.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            CrdtError::BlockNotFound(_)
                | CrdtError::ParentNotFound(_)
                | CrdtError::ChildrenNotFound(_)
                | CrdtError::TextNotFound(_)
                | CrdtError::NotAChild { .. }
                | CrdtError::SelfAttachment { .. }
                | CrdtError::NestingTooDeep { .. }
                | CrdtError::MissingPage
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structural_classification() {
        assert!(CrdtError::BlockNotFound(BlockId::from("b")).is_structural());
        assert!(CrdtError::MissingPage.is_structural());
        assert!(!CrdtError::UnresolvablePosition(TextId::from("t")).is_structural());
        assert!(!CrdtError::Update("bad".into()).is_structural());
    }

    #[test]
    fn test_messages_name_the_block() {
        let err = CrdtError::NotAChild {
            child: BlockId::from("child"),
            parent: BlockId::from("parent"),
        };
        assert_eq!(
            err.to_string(),
            "block BlockId(child) is not a child of BlockId(parent)"
        );
    }
}
