//! Editing surface for Folio documents.
//!
//! The editor keeps a rendered tree of the document, mirrors it into a
//! [`folio_crdt::DocumentStore`] and follows the store when other replicas
//! change it.
//!
//! # Pieces
//!
//! |-------------------------|--------------------------------------------------|
//! | Item                    | Purpose                                          |
//! |-------------------------|--------------------------------------------------|
//! | [`EditorTree`]          | Block nodes with inline runs, built from a store |
//! | [`Point`] / [`Selection`] | Positions as the surface sees them             |
//! | [`translator`]          | Surface points to block offsets and anchors      |
//! | [`EditorBinding`]       | Buffers text edits, flushes them, follows changes|
//! | [`HistoryManager`]      | Undo/redo with selections                        |
//! | [`CollabEditor`]        | All of the above plus the command surface        |
//! |-------------------------|--------------------------------------------------|
//!
//! # Flow
//!
//! Typing is applied to the surface at once and buffered. The buffer goes
//! to the store in one transaction when a structural command runs, when
//! history is used, when a remote update arrives, or on an explicit
//! [`ReplicatedEditor::flush_local_changes`]. Structural commands write to
//! the store directly and the surface is patched from the resulting change
//! batch. Remote batches rebuild the tree and re-anchor the selection.

mod binding;
mod commands;
mod config;
mod editor;
mod error;
mod history;
mod surface;
pub mod translator;
mod tree;

pub use binding::{BindingState, EditorBinding, FlushRecord, SyncEffect};
pub use config::{ConfigError, EditorConfig};
pub use editor::{CollabEditor, ReplicatedEditor, UndoableEditor};
pub use error::{EditorError, Result};
pub use history::{HistoryManager, SelectionMeta};
pub use surface::{EditingSurface, SurfaceOp};
pub use translator::{Point, RelativePoint, RelativeSelection, Selection};
pub use tree::{BlockNode, EditorTree, Inline, TextRun, inlines_from_delta, inlines_to_delta};
