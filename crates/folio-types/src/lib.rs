//! Shared block identity, schema, and rich-text types for Folio.
//!
//! This is the leaf crate of the workspace: no internal dependencies, no CRDT
//! types. Everything here is plain data that the document store, the editor
//! binding, and rendering collaborators agree on.
//!
//! # Key Types
//!
//! |-------------------|-----------------------------------------------|
//! | Type              | Purpose                                       |
//! |-------------------|-----------------------------------------------|
//! | [`BlockId`]       | Block address in the blocks map               |
//! | [`TextId`]        | Text sequence address in the text map         |
//! | [`BlockType`]     | Closed set of block kinds + their predicates  |
//! | [`BlockData`]     | Type-specific JSON payload                    |
//! | [`BlockSnapshot`] | Serializable view of one stored block         |
//! | [`TextDelta`]     | Insert/retain/delete runs with attributes     |
//! |-------------------|-----------------------------------------------|

pub mod block;
pub mod delta;
pub mod ids;

pub use block::{BlockData, BlockSnapshot, BlockType, MAX_NESTING_DEPTH};
pub use delta::{Attributes, DeltaOp, TextDelta, split_at_utf16, utf16_len};
pub use ids::{BlockId, TextId};
