//! Replicated block-tree document store for Folio.
//!
//! A document is one page block whose children form an ordered tree of typed
//! blocks. Every replica holds a full copy in a [`yrs::Doc`]; replicas
//! converge by exchanging binary updates, and the transport is the caller's
//! concern.
//!
//! # Layers
//!
//! |----------------------|-------------------------------------------------|
//! | Item                 | Purpose                                         |
//! |----------------------|-------------------------------------------------|
//! | [`DocumentStore`]    | Reads, transactions, sync, change observation   |
//! | [`DocTxn`]           | Journaled mutation primitives inside one txn    |
//! | [`ops`]              | Block editing: split, merge, lift, indent, ...  |
//! | [`TextAnchor`]       | Offset that survives concurrent edits           |
//! | [`UndoStack`]        | Bounded undo/redo over transaction journals     |
//! |----------------------|-------------------------------------------------|
//!
//! # Transactions
//!
//! All mutation happens inside [`DocumentStore::transact`]. The closure works
//! on a [`DocTxn`] which records an inverse for every primitive it applies.
//! If the closure fails, the inverses are replayed before commit so a failed
//! operation leaves no trace; if it succeeds, they come back as a [`Journal`]
//! that history can later revert.
//!
//! Transactions never nest. Operations that need to compose (enter over a
//! selection, say) share one [`DocTxn`] instead.

mod error;
pub mod ops;
mod position;
mod store;
mod text;
mod txn;
mod undo;

pub use error::CrdtError;
pub use ops::Caret;
pub use position::{Assoc, TextAnchor};
pub use store::{
    Applied, ChangeBatch, ChangeFeed, DocumentStore, StoreObserver, StoreOptions, TxnOrigin,
};
pub use txn::{DocTxn, Journal};
pub use undo::{StackItem, UndoStack};

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, CrdtError>;
