//! CRDT-stable references into text sequences.

use folio_types::TextId;
use yrs::branch::{Branch, BranchPtr};
use yrs::{ReadTxn, StickyIndex, Text, TextRef};

pub use yrs::Assoc;

/// A position inside one text sequence that survives concurrent edits.
///
/// Wraps the sequence's sticky index together with the absolute index the
/// anchor was created at. Resolution goes through
/// [`DocumentStore::resolve_anchor`](crate::DocumentStore::resolve_anchor):
///
/// - the sticky index is preferred, so inserts and deletes made elsewhere
///   (locally or by other replicas) are accounted for;
/// - when the sequence no longer exists the anchor is unresolvable;
/// - when the sequence was deleted and re-created under the same id (undo of
///   a deletion) the creation index is used, clamped to the current length.
///
/// An anchor taken on a block whose text has not been materialized yet has
/// no sticky index and resolves by index alone.
#[derive(Clone, Debug)]
pub struct TextAnchor {
    text_id: TextId,
    sticky: Option<StickyIndex>,
    index: usize,
}

impl TextAnchor {
    pub(crate) fn new(text_id: TextId, sticky: Option<StickyIndex>, index: usize) -> Self {
        Self {
            text_id,
            sticky,
            index,
        }
    }

    pub fn text_id(&self) -> &TextId {
        &self.text_id
    }

    /// Absolute offset at creation time.
    pub fn created_at(&self) -> usize {
        self.index
    }

    /// Current offset inside `text`, the sequence registered under this
    /// anchor's text id. A sticky index pointing into an older sequence with
    /// the same id (deleted, then restored) is ignored in favour of the
    /// creation index. Clamped to the text length.
    pub(crate) fn offset_in<T: ReadTxn>(&self, text: &TextRef, txn: &T) -> usize {
        let len = text.len(txn) as usize;
        let current = BranchPtr::from(AsRef::<Branch>::as_ref(text));
        self.sticky
            .as_ref()
            .and_then(|sticky| sticky.get_offset(txn))
            .filter(|offset| offset.branch == current)
            .map(|offset| offset.index as usize)
            .unwrap_or(self.index)
            .min(len)
    }
}
