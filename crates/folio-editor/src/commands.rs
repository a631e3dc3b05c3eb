//! The command surface: keyboard gestures and block commands, each acting on
//! the current selection.
//!
//! | Command              | Collapsed caret                         | Expanded selection       |
//! |----------------------|-----------------------------------------|--------------------------|
//! | `insert_text`        | buffered text insert                    | delete, then insert      |
//! | `insert_break`       | split (empty blocks convert or lift)    | delete, then split       |
//! | `delete_backward`    | previous char, or block-start rules     | delete selection         |
//! | `delete_forward`     | next char, or merge the next block in   | delete selection         |
//! | `indent` / `lift`    | focus block                             | focus block              |
//! | `turn_into`          | focus block                             | focus block              |
//! | `delete_block`       | focus block                             | focus block              |
//! | `format`             | nothing                                 | buffered, per block      |
//!
//! Boundary gestures do nothing. Structural and position failures are
//! logged and the gesture is dropped.

use folio_crdt::{Applied, Caret, CrdtError, DocumentStore, Journal};
use folio_types::{Attributes, BlockData, BlockId, BlockType, split_at_utf16, utf16_len};
use tracing::{debug, warn};

use crate::editor::CollabEditor;
use crate::error::{EditorError, Result};
use crate::surface::SurfaceOp;
use crate::translator::block_offset;

/// Journal and caret of an applied store operation.
type Gesture = Option<(Journal, Option<Caret>)>;

fn with_caret<T>(applied: Option<Applied<T>>, caret: impl FnOnce(&T) -> Caret) -> Gesture {
    applied.map(|a| {
        let caret = caret(&a.value);
        (a.journal, Some(caret))
    })
}

impl CollabEditor {
    // =========================================================================
    // Selection helpers
    // =========================================================================

    fn is_expanded(&self) -> bool {
        self.selection().is_some_and(|s| !s.is_collapsed())
    }

    fn focus_block(&self) -> Result<BlockId> {
        self.selection()
            .map(|s| s.focus.block.clone())
            .ok_or(EditorError::NoSelection)
    }

    fn require_caret(&self) -> Result<Caret> {
        let selection = self.selection().ok_or(EditorError::NoSelection)?;
        let offset = block_offset(self.tree(), &selection.focus)?;
        Ok(Caret::new(selection.focus.block.clone(), offset))
    }

    /// Anchor and focus as block offsets.
    fn selection_carets(&self) -> Result<(Caret, Caret)> {
        let selection = self.selection().ok_or(EditorError::NoSelection)?;
        let anchor = block_offset(self.tree(), &selection.anchor)?;
        let focus = block_offset(self.tree(), &selection.focus)?;
        Ok((
            Caret::new(selection.anchor.block.clone(), anchor),
            Caret::new(selection.focus.block.clone(), focus),
        ))
    }

    /// Offset of the focus in `block`, or 0 when the focus has no text.
    fn focus_offset(&self) -> usize {
        self.selection()
            .and_then(|s| block_offset(self.tree(), &s.focus).ok())
            .unwrap_or(0)
    }

    /// Attributes of the run the caret sits in, minus links.
    fn marks_at_caret(&self) -> Attributes {
        self.selection()
            .and_then(|s| {
                let node = self.tree().node(&s.focus.block)?;
                node.run_at(&s.focus.path).map(|run| run.attributes.clone())
            })
            .unwrap_or_default()
    }

    fn block_text(&self, block: &BlockId) -> String {
        self.tree().node(block).map(|n| n.text()).unwrap_or_default()
    }

    /// Buffer a text edit, dropping the gesture on position errors.
    fn record(&mut self, name: &str, op: SurfaceOp) -> Result<()> {
        match self.binding.record(op) {
            Ok(()) => Ok(()),
            Err(err) if err.drops_gesture() => {
                warn!(command = name, %err, "gesture dropped");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    fn no_selection(name: &str) -> Result<()> {
        debug!(command = name, "no selection");
        Ok(())
    }

    // =========================================================================
    // Typing
    // =========================================================================

    /// Type `text` at the caret, carrying the caret run's formatting.
    pub fn insert_text(&mut self, text: &str) -> Result<()> {
        let attributes = self.marks_at_caret();
        self.insert_formatted(text, attributes)
    }

    /// Type `text` at the caret with exactly `attributes`.
    pub fn insert_formatted(&mut self, text: &str, attributes: Attributes) -> Result<()> {
        if self.is_expanded() {
            self.delete_selection()?;
        }
        let caret = match self.require_caret() {
            Ok(caret) => caret,
            Err(_) => return Self::no_selection("insert_text"),
        };
        self.record(
            "insert_text",
            SurfaceOp::InsertText {
                block: caret.block,
                offset: caret.offset,
                text: text.to_string(),
                attributes,
            },
        )
    }

    /// Apply `attributes` over the selection. A `null` value clears that
    /// attribute.
    pub fn format(&mut self, attributes: Attributes) -> Result<()> {
        if !self.is_expanded() {
            return Ok(());
        }
        let (anchor, focus) = match self.selection_carets() {
            Ok(carets) => carets,
            Err(_) => return Self::no_selection("format"),
        };
        let order = self.tree().document_order();
        let position = |c: &Caret| order.iter().position(|id| id == &c.block);
        let (Some(a), Some(f)) = (position(&anchor), position(&focus)) else {
            return Self::no_selection("format");
        };
        let (start, end, from, to) = if (a, anchor.offset) <= (f, focus.offset) {
            (anchor, focus, a, f)
        } else {
            (focus, anchor, f, a)
        };

        let mut ops = Vec::new();
        for id in &order[from..=to] {
            let Some(node) = self.tree().node(id).filter(|n| n.owns_text()) else {
                continue;
            };
            let lo = if *id == start.block { start.offset } else { 0 };
            let hi = if *id == end.block { end.offset } else { node.text_len() };
            if hi > lo {
                ops.push(SurfaceOp::FormatText {
                    block: id.clone(),
                    offset: lo,
                    len: hi - lo,
                    attributes: attributes.clone(),
                });
            }
        }
        for op in ops {
            self.record("format", op)?;
        }
        Ok(())
    }

    // =========================================================================
    // Deletion
    // =========================================================================

    /// Backspace.
    ///
    /// Inside text this removes the previous character. At the start of a
    /// block:
    /// 1. a toggle heading drops its level and stays a toggle, and any other
    ///    text block that is not a paragraph turns into a paragraph;
    /// 2. a nested paragraph that is its parent's last child, without
    ///    children, is lifted;
    /// 3. otherwise the block merges into the previous text block.
    pub fn delete_backward(&mut self) -> Result<()> {
        if self.is_expanded() {
            return self.delete_selection();
        }
        let caret = match self.require_caret() {
            Ok(caret) => caret,
            Err(_) => return Self::no_selection("delete_backward"),
        };
        if caret.offset > 0 {
            let text = self.block_text(&caret.block);
            let (head, _) = split_at_utf16(&text, caret.offset);
            let len = head.chars().last().map(char::len_utf16).unwrap_or(1);
            return self.record(
                "delete_backward",
                SurfaceOp::RemoveText {
                    block: caret.block,
                    offset: caret.offset - len.min(caret.offset),
                    len,
                },
            );
        }

        let block = caret.block;
        self.execute("delete_backward", move |editor| {
            let store = editor.store().clone();
            let snapshot = store
                .get_block(&block)
                .ok_or_else(|| CrdtError::BlockNotFound(block.clone()))?;
            if snapshot.ty == BlockType::ToggleList && snapshot.data.level().is_some() {
                let mut data = snapshot.data.clone();
                data.remove("level");
                let applied = store.turn_into(&block, BlockType::ToggleList, data)?;
                return Ok(with_caret(applied, |id| Caret::start_of(id.clone())));
            }
            if snapshot.ty != BlockType::Paragraph && snapshot.ty.has_text() && !snapshot.is_page() {
                let applied = store.turn_into(&block, BlockType::Paragraph, BlockData::new())?;
                return Ok(with_caret(applied, |id| Caret::start_of(id.clone())));
            }
            if snapshot.ty == BlockType::Paragraph && is_trailing_leaf(&store, &block) {
                let applied = store.lift_block(&block)?;
                if applied.is_some() {
                    return Ok(with_caret(applied, |id| Caret::start_of(id.clone())));
                }
            }
            Ok(with_caret(store.merge_backward(&block)?, Caret::clone))
        })
    }

    /// Delete key: removes the next character, or pulls the next text block
    /// into this one at the end of the text.
    pub fn delete_forward(&mut self) -> Result<()> {
        if self.is_expanded() {
            return self.delete_selection();
        }
        let caret = match self.require_caret() {
            Ok(caret) => caret,
            Err(_) => return Self::no_selection("delete_forward"),
        };
        let text = self.block_text(&caret.block);
        if caret.offset < utf16_len(&text) {
            let (_, tail) = split_at_utf16(&text, caret.offset);
            let len = tail.chars().next().map(char::len_utf16).unwrap_or(1);
            return self.record(
                "delete_forward",
                SurfaceOp::RemoveText {
                    block: caret.block,
                    offset: caret.offset,
                    len,
                },
            );
        }
        let block = caret.block;
        self.execute("delete_forward", move |editor| {
            let store = editor.store().clone();
            Ok(with_caret(store.merge_forward(&block)?, Caret::clone))
        })
    }

    /// Delete the selected range, across blocks if needed.
    pub fn delete_selection(&mut self) -> Result<()> {
        let (anchor, focus) = match self.selection_carets() {
            Ok(carets) => carets,
            Err(_) => return Self::no_selection("delete_selection"),
        };
        self.execute("delete_selection", move |editor| {
            let store = editor.store().clone();
            Ok(with_caret(store.remove_range(&anchor, &focus)?, Caret::clone))
        })
    }

    /// Delete the focus block and its subtree.
    pub fn delete_block(&mut self) -> Result<()> {
        let block = match self.focus_block() {
            Ok(block) => block,
            Err(_) => return Self::no_selection("delete_block"),
        };
        self.execute("delete_block", move |editor| {
            let store = editor.store().clone();
            Ok(store
                .remove_block(&block)?
                .map(|applied| (applied.journal, applied.value)))
        })
    }

    /// Clear the document down to one empty paragraph.
    pub fn delete_document(&mut self) -> Result<()> {
        self.execute("delete_document", |editor| {
            editor.binding.select(None);
            let store = editor.store().clone();
            let applied = store.delete_document()?;
            Ok(Some((applied.journal, Some(Caret::start_of(applied.value)))))
        })
    }

    // =========================================================================
    // Structure
    // =========================================================================

    /// Enter.
    ///
    /// An empty list item, heading or quote turns into a paragraph. An empty
    /// nested paragraph that is its parent's last child is lifted. Anything
    /// else splits at the caret, and an expanded selection is deleted first.
    /// On a page with no blocks it adds the first paragraph.
    pub fn insert_break(&mut self) -> Result<()> {
        if self.is_expanded() {
            let (anchor, focus) = match self.selection_carets() {
                Ok(carets) => carets,
                Err(_) => return Self::no_selection("insert_break"),
            };
            return self.execute("insert_break", move |editor| {
                let store = editor.store().clone();
                Ok(with_caret(store.range_break(&anchor, &focus)?, Caret::clone))
            });
        }
        let caret = match self.require_caret() {
            Ok(caret) => caret,
            Err(_) => return Self::no_selection("insert_break"),
        };
        let empty = self.block_text(&caret.block).is_empty();
        self.execute("insert_break", move |editor| {
            let store = editor.store().clone();
            let block = caret.block.clone();
            let snapshot = store
                .get_block(&block)
                .ok_or_else(|| CrdtError::BlockNotFound(block.clone()))?;
            if snapshot.is_page() {
                let applied = store.append_first_paragraph()?;
                return Ok(with_caret(applied, |id| Caret::start_of(id.clone())));
            }
            if empty {
                let converts = snapshot.ty.is_list()
                    || matches!(snapshot.ty, BlockType::Heading | BlockType::Quote);
                if converts {
                    let applied =
                        store.turn_into(&block, BlockType::Paragraph, BlockData::new())?;
                    return Ok(with_caret(applied, |id| Caret::start_of(id.clone())));
                }
                if snapshot.ty == BlockType::Paragraph && is_trailing_leaf(&store, &block) {
                    let applied = store.lift_block(&block)?;
                    if applied.is_some() {
                        return Ok(with_caret(applied, |id| Caret::start_of(id.clone())));
                    }
                }
            }
            Ok(with_caret(store.split_block(&block, caret.offset)?, Caret::clone))
        })
    }

    /// Nest the focus block under its previous sibling.
    pub fn indent(&mut self) -> Result<()> {
        let block = match self.focus_block() {
            Ok(block) => block,
            Err(_) => return Self::no_selection("indent"),
        };
        let offset = self.focus_offset();
        self.execute("indent", move |editor| {
            let store = editor.store().clone();
            Ok(with_caret(store.indent_block(&block)?, |id| {
                Caret::new(id.clone(), offset)
            }))
        })
    }

    /// Move the focus block out of its parent, right after it.
    pub fn lift(&mut self) -> Result<()> {
        let block = match self.focus_block() {
            Ok(block) => block,
            Err(_) => return Self::no_selection("lift"),
        };
        let offset = self.focus_offset();
        self.execute("lift", move |editor| {
            let store = editor.store().clone();
            Ok(with_caret(store.lift_block(&block)?, |id| {
                Caret::new(id.clone(), offset)
            }))
        })
    }

    /// Change the focus block's type, keeping its text and the caret offset.
    pub fn turn_into(&mut self, ty: BlockType, data: BlockData) -> Result<()> {
        let block = match self.focus_block() {
            Ok(block) => block,
            Err(_) => return Self::no_selection("turn_into"),
        };
        let offset = self.focus_offset();
        self.execute("turn_into", move |editor| {
            let store = editor.store().clone();
            Ok(with_caret(store.turn_into(&block, ty, data)?, |id| {
                Caret::new(id.clone(), offset)
            }))
        })
    }
}

/// Nested at least two levels, last among its siblings, no children.
fn is_trailing_leaf(store: &DocumentStore, block: &BlockId) -> bool {
    let nested = store.depth(block).is_some_and(|d| d >= 2);
    let leaf = store.get_children(block).is_some_and(|c| c.is_empty());
    let last = store.slot_of(block).is_some_and(|(parent, index)| {
        store
            .get_children(&parent)
            .is_some_and(|siblings| index + 1 == siblings.len())
    });
    nested && leaf && last
}

#[cfg(test)]
mod tests {
    use folio_types::BlockType;
    use serde_json::json;

    use crate::config::EditorConfig;
    use crate::editor::{CollabEditor, ReplicatedEditor, UndoableEditor};

    fn editor() -> CollabEditor {
        CollabEditor::open_new(&EditorConfig::default()).unwrap()
    }

    fn texts(editor: &CollabEditor) -> Vec<String> {
        editor
            .tree()
            .document_order()
            .iter()
            .map(|id| editor.tree().node(id).unwrap().text())
            .collect()
    }

    fn type_line(editor: &mut CollabEditor, text: &str) {
        editor.insert_text(text).unwrap();
        editor.insert_break().unwrap();
    }

    #[test]
    fn test_typing_and_enter() {
        let mut editor = editor();
        editor.insert_text("Hello World").unwrap();
        let block = editor.caret().unwrap().block;
        editor.set_caret(&block, 5);

        editor.insert_break().unwrap();

        assert_eq!(texts(&editor), ["Hello", " World"]);
        let caret = editor.caret().unwrap();
        assert_ne!(caret.block, block);
        assert_eq!(caret.offset, 0);
        assert_eq!(editor.tree().outline(), editor.store().outline());
    }

    #[test]
    fn test_backspace_at_start_merges() {
        let mut editor = editor();
        type_line(&mut editor, "Hi ");
        editor.insert_text("Hello").unwrap();
        let second = editor.caret().unwrap().block;
        editor.set_caret(&second, 0);

        editor.delete_backward().unwrap();

        assert_eq!(texts(&editor), ["Hi Hello"]);
        assert_eq!(editor.caret().unwrap().offset, 3);
    }

    #[test]
    fn test_backspace_in_text_removes_char() {
        let mut editor = editor();
        editor.insert_text("ab😀").unwrap();
        editor.delete_backward().unwrap();
        editor.flush_local_changes().unwrap();
        assert_eq!(texts(&editor), ["ab"]);
        assert_eq!(editor.store().outline(), "- [paragraph] ab\n");
    }

    #[test]
    fn test_backspace_turns_heading_into_paragraph() {
        let mut editor = editor();
        editor.insert_text("Title").unwrap();
        editor
            .turn_into(BlockType::Heading, folio_types::BlockData::new().with("level", json!(1)))
            .unwrap();
        let block = editor.caret().unwrap().block;
        editor.set_caret(&block, 0);

        editor.delete_backward().unwrap();

        let block = editor.caret().unwrap().block;
        assert_eq!(editor.tree().node(&block).unwrap().ty, BlockType::Paragraph);
        assert_eq!(texts(&editor), ["Title"]);
    }

    #[test]
    fn test_backspace_unwinds_toggle_heading_in_two_steps() {
        let mut editor = editor();
        editor.insert_text("Section").unwrap();
        editor
            .turn_into(
                BlockType::ToggleList,
                folio_types::BlockData::new().with("level", json!(2)),
            )
            .unwrap();
        let block = editor.caret().unwrap().block;
        editor.set_caret(&block, 0);

        editor.delete_backward().unwrap();
        let caret = editor.caret().unwrap();
        let node = editor.tree().node(&caret.block).unwrap();
        assert_eq!(node.ty, BlockType::ToggleList);
        assert_eq!(node.data.level(), None);
        assert_eq!(caret.offset, 0);

        editor.delete_backward().unwrap();
        let block = editor.caret().unwrap().block;
        assert_eq!(editor.tree().node(&block).unwrap().ty, BlockType::Paragraph);
        assert_eq!(texts(&editor), ["Section"]);
    }

    #[test]
    fn test_enter_on_empty_list_item_leaves_list() {
        let mut editor = editor();
        editor
            .turn_into(BlockType::BulletedList, folio_types::BlockData::new())
            .unwrap();
        type_line(&mut editor, "item");
        // Now on an empty bulleted item.
        editor.insert_break().unwrap();

        let block = editor.caret().unwrap().block;
        assert_eq!(editor.tree().node(&block).unwrap().ty, BlockType::Paragraph);
        assert_eq!(texts(&editor), ["item", ""]);
    }

    #[test]
    fn test_indent_and_lift_keep_caret_offset() {
        let mut editor = editor();
        editor
            .turn_into(BlockType::ToggleList, folio_types::BlockData::new().with("collapsed", json!(true)))
            .unwrap();
        type_line(&mut editor, "toggle");
        editor
            .turn_into(BlockType::Paragraph, folio_types::BlockData::new())
            .unwrap();
        editor.insert_text("child").unwrap();
        let block = editor.caret().unwrap().block;
        editor.set_caret(&block, 2);

        editor.indent().unwrap();
        let caret = editor.caret().unwrap();
        let page = editor.tree().page().unwrap().clone();
        assert_eq!(editor.tree().node(&page).unwrap().children.len(), 1);
        assert_eq!(caret.offset, 2);

        editor.lift().unwrap();
        assert_eq!(editor.tree().node(&page).unwrap().children.len(), 2);
        assert_eq!(editor.caret().unwrap().offset, 2);
    }

    #[test]
    fn test_selection_delete_across_blocks() {
        let mut editor = editor();
        type_line(&mut editor, "Hello");
        editor.insert_text("World").unwrap();
        editor.flush_local_changes().unwrap();
        let order = editor.tree().document_order();
        let anchor = crate::translator::Point::in_block(order[0].clone(), 2);
        let focus = crate::translator::Point::in_block(order[1].clone(), 3);
        editor.select(anchor, focus);

        editor.delete_backward().unwrap();

        assert_eq!(texts(&editor), ["Held"]);
        assert_eq!(editor.caret().unwrap().offset, 2);
    }

    #[test]
    fn test_format_selection() {
        let mut editor = editor();
        editor.insert_text("make bold").unwrap();
        let block = editor.caret().unwrap().block;
        editor.select(
            crate::translator::Point::in_block(block.clone(), 5),
            crate::translator::Point::in_block(block.clone(), 9),
        );
        let mut bold = folio_types::Attributes::new();
        bold.insert("bold".into(), json!(true));

        editor.format(bold.clone()).unwrap();
        editor.flush_local_changes().unwrap();

        let delta = editor.store().block_delta(&block).unwrap();
        assert_eq!(delta.ops().len(), 2);
        assert_eq!(delta.ops()[1].attributes(), Some(&bold));
    }

    #[test]
    fn test_delete_document_then_undo() {
        let mut editor = editor();
        type_line(&mut editor, "one");
        type_line(&mut editor, "two");
        editor.flush_local_changes().unwrap();
        let before = editor.store().outline();

        editor.delete_document().unwrap();
        assert_eq!(texts(&editor), [""]);

        assert!(editor.undo().unwrap());
        assert_eq!(editor.store().outline(), before);
        assert_eq!(editor.tree().outline(), before);
    }

    #[test]
    fn test_enter_on_empty_page_adds_paragraph() {
        let mut editor = editor();
        let page = editor.tree().page().unwrap().clone();
        let first = editor.tree().document_order()[0].clone();
        editor
            .store()
            .transact("clear", folio_crdt::TxnOrigin::Local, |txn| txn.delete_block(&first))
            .unwrap();
        editor.process_changes().unwrap();
        assert_eq!(editor.caret().unwrap().block, page);

        editor.insert_break().unwrap();

        let caret = editor.caret().unwrap();
        assert_ne!(caret.block, page);
        assert_eq!(editor.tree().outline(), "- [paragraph] \n");
    }

    #[test]
    fn test_boundary_gesture_records_nothing() {
        let mut editor = editor();
        editor.insert_text("only").unwrap();
        let block = editor.caret().unwrap().block;
        editor.set_caret(&block, 0);
        editor.flush_local_changes().unwrap();
        let depth = editor.history.undo_len();

        editor.delete_backward().unwrap();
        editor.indent().unwrap();

        assert_eq!(editor.history.undo_len(), depth);
        assert_eq!(texts(&editor), ["only"]);
    }
}
