//! RON editing scripts and their replay.
//!
//! ```ron
//! (
//!     replicas: 2,
//!     steps: [
//!         Type(replica: 0, text: "Shopping"),
//!         Enter(replica: 0),
//!         TurnInto(replica: 0, ty: "bulleted_list"),
//!         Type(replica: 0, text: "milk"),
//!         Sync(from: 0, to: 1),
//!         Caret(replica: 1, block: 1, offset: 4),
//!         Type(replica: 1, text: " and eggs"),
//!         Sync(from: 1, to: 0),
//!     ],
//! )
//! ```
//!
//! Blocks are addressed by their index in document order, page excluded.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use folio_crdt::DocumentStore;
use folio_editor::{CollabEditor, EditorConfig, Point, ReplicatedEditor, UndoableEditor};
use folio_types::{Attributes, BlockData, BlockId, BlockType};
use serde::Deserialize;
use tracing::{debug, info};

#[derive(Clone, Debug, Deserialize)]
pub struct Script {
    #[serde(default = "one")]
    pub replicas: usize,
    pub steps: Vec<Step>,
}

fn one() -> usize {
    1
}

#[derive(Clone, Debug, Deserialize)]
pub enum Step {
    Type { replica: usize, text: String },
    Enter { replica: usize },
    Backspace { replica: usize },
    Delete { replica: usize },
    Indent { replica: usize },
    Lift { replica: usize },
    TurnInto {
        replica: usize,
        ty: String,
        #[serde(default)]
        data: BlockData,
    },
    Format { replica: usize, attributes: Attributes },
    Caret { replica: usize, block: usize, offset: usize },
    Select {
        replica: usize,
        anchor: (usize, usize),
        focus: (usize, usize),
    },
    DeleteBlock { replica: usize },
    DeleteDocument { replica: usize },
    Undo { replica: usize },
    Redo { replica: usize },
    Flush { replica: usize },
    Sync { from: usize, to: usize },
}

impl Script {
    pub fn from_ron(text: &str) -> Result<Self> {
        Ok(ron::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading script {}", path.display()))?;
        Self::from_ron(&text).with_context(|| format!("parsing script {}", path.display()))
    }
}

/// A set of editors on replicas of one document.
pub struct Replay {
    editors: Vec<CollabEditor>,
}

impl Replay {
    /// Open `replicas` editors. The first creates the document and the rest
    /// start from its state.
    pub fn open(config: &EditorConfig, replicas: usize) -> Result<Self> {
        if replicas == 0 {
            bail!("a script needs at least one replica");
        }
        let first = CollabEditor::open_new(&replica_config(config, 0))?;
        let update = first.store().encode_state_as_update();
        let mut editors = vec![first];
        for index in 1..replicas {
            let config = replica_config(config, index);
            let store = DocumentStore::from_update(config.store_options(), &update)?;
            let mut editor = CollabEditor::new(Arc::new(store), &config);
            editor.connect()?;
            editors.push(editor);
        }
        info!(replicas, "replicas opened");
        Ok(Self { editors })
    }

    pub fn run(&mut self, steps: &[Step]) -> Result<()> {
        for (index, step) in steps.iter().enumerate() {
            debug!(index, ?step, "step");
            self.step(step)
                .with_context(|| format!("step {index}: {step:?}"))?;
        }
        Ok(())
    }

    fn editor(&mut self, replica: usize) -> Result<&mut CollabEditor> {
        let count = self.editors.len();
        self.editors
            .get_mut(replica)
            .with_context(|| format!("replica {replica} out of range (have {count})"))
    }

    fn step(&mut self, step: &Step) -> Result<()> {
        match step {
            Step::Type { replica, text } => self.editor(*replica)?.insert_text(text)?,
            Step::Enter { replica } => self.editor(*replica)?.insert_break()?,
            Step::Backspace { replica } => self.editor(*replica)?.delete_backward()?,
            Step::Delete { replica } => self.editor(*replica)?.delete_forward()?,
            Step::Indent { replica } => self.editor(*replica)?.indent()?,
            Step::Lift { replica } => self.editor(*replica)?.lift()?,
            Step::TurnInto { replica, ty, data } => {
                let ty = BlockType::from_str(ty)
                    .with_context(|| format!("unknown block type {ty:?}"))?;
                self.editor(*replica)?.turn_into(ty, data.clone())?;
            }
            Step::Format { replica, attributes } => {
                self.editor(*replica)?.format(attributes.clone())?
            }
            Step::Caret {
                replica,
                block,
                offset,
            } => {
                let editor = self.editor(*replica)?;
                let block = block_at(editor, *block)?;
                editor.set_caret(&block, *offset);
            }
            Step::Select {
                replica,
                anchor,
                focus,
            } => {
                let editor = self.editor(*replica)?;
                let anchor = Point::in_block(block_at(editor, anchor.0)?, anchor.1);
                let focus = Point::in_block(block_at(editor, focus.0)?, focus.1);
                editor.select(anchor, focus);
            }
            Step::DeleteBlock { replica } => self.editor(*replica)?.delete_block()?,
            Step::DeleteDocument { replica } => self.editor(*replica)?.delete_document()?,
            Step::Undo { replica } => {
                if !self.editor(*replica)?.undo()? {
                    debug!(replica, "nothing to undo");
                }
            }
            Step::Redo { replica } => {
                if !self.editor(*replica)?.redo()? {
                    debug!(replica, "nothing to redo");
                }
            }
            Step::Flush { replica } => self.editor(*replica)?.flush_local_changes()?,
            Step::Sync { from, to } => self.sync(*from, *to)?,
        }
        Ok(())
    }

    fn sync(&mut self, from: usize, to: usize) -> Result<()> {
        if from == to {
            return Ok(());
        }
        let source = self.editor(from)?;
        source.flush_local_changes()?;
        let store = source.store().clone();
        let target = self.editor(to)?;
        let diff = store.encode_diff(&target.store().state_vector())?;
        let effect = target.apply_remote_update(&diff)?;
        debug!(from, to, bytes = diff.len(), ?effect, "synced");
        Ok(())
    }

    /// Flush every replica and render its outline.
    pub fn outlines(&mut self) -> Result<Vec<String>> {
        self.editors
            .iter_mut()
            .map(|editor| {
                editor.flush_local_changes()?;
                Ok(editor.store().outline())
            })
            .collect()
    }
}

/// Each replica gets its own client id when the config pins one.
fn replica_config(config: &EditorConfig, index: usize) -> EditorConfig {
    EditorConfig {
        replica_id: config.replica_id.map(|id| id + index as u64),
        ..config.clone()
    }
}

fn block_at(editor: &CollabEditor, index: usize) -> Result<BlockId> {
    editor
        .tree()
        .document_order()
        .get(index)
        .cloned()
        .with_context(|| format!("no block at index {index}"))
}
