//! Error types for the editor binding.

use folio_crdt::CrdtError;
use folio_types::BlockId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EditorError {
    #[error(transparent)]
    Crdt(#[from] CrdtError),

    /// An editing point refers to a block or inline path the tree lacks.
    #[error("editing point not found in {block:?} at {path:?}")]
    PointNotFound { block: BlockId, path: Vec<usize> },

    /// The point's block does not own a text sequence.
    #[error("no text-owning block for point in {0:?}")]
    NoTextAncestor(BlockId),

    /// A command needs a selection and there is none.
    #[error("no selection")]
    NoSelection,

    #[error("editor binding already connected")]
    AlreadyConnected,

    #[error("editor binding not connected")]
    NotConnected,
}

impl EditorError {
    /// Errors that abandon the current gesture without surfacing to the
    /// user: structural store failures and unmappable positions.
    pub fn drops_gesture(&self) -> bool {
        match self {
            EditorError::Crdt(err) => {
                err.is_structural() || matches!(err, CrdtError::UnresolvablePosition(_))
            }
            EditorError::PointNotFound { .. }
            | EditorError::NoTextAncestor(_)
            | EditorError::NoSelection => true,
            EditorError::AlreadyConnected | EditorError::NotConnected => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, EditorError>;
