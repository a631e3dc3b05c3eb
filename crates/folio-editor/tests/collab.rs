//! Two editors on two replicas of one document, exchanging updates.

use std::sync::Arc;

use folio_crdt::DocumentStore;
use folio_editor::{
    CollabEditor, EditorConfig, ReplicatedEditor, SyncEffect, UndoableEditor,
};
use folio_types::BlockType;

fn config(replica_id: u64) -> EditorConfig {
    EditorConfig {
        replica_id: Some(replica_id),
        ..EditorConfig::default()
    }
}

/// An editor on a new document and a second one on a copy of it.
fn pair() -> (CollabEditor, CollabEditor) {
    let a = CollabEditor::open_new(&config(1)).unwrap();
    let update = a.store().encode_state_as_update();
    let store = DocumentStore::from_update(config(2).store_options(), &update).unwrap();
    let mut b = CollabEditor::new(Arc::new(store), &config(2));
    b.connect().unwrap();
    (a, b)
}

fn sync(from: &mut CollabEditor, to: &mut CollabEditor) -> SyncEffect {
    from.flush_local_changes().unwrap();
    let diff = from.store().encode_diff(&to.store().state_vector()).unwrap();
    to.apply_remote_update(&diff).unwrap()
}

fn sync_both(a: &mut CollabEditor, b: &mut CollabEditor) {
    sync(a, b);
    sync(b, a);
}

fn texts(editor: &CollabEditor) -> Vec<String> {
    editor
        .tree()
        .document_order()
        .iter()
        .map(|id| editor.tree().node(id).unwrap().text())
        .collect()
}

#[test]
fn test_typing_reaches_the_other_editor() {
    let (mut a, mut b) = pair();
    a.insert_text("hello").unwrap();

    let effect = sync(&mut a, &mut b);

    assert!(matches!(effect, SyncEffect::Rebuilt { .. }));
    assert_eq!(texts(&b), ["hello"]);
    assert_eq!(b.tree().outline(), a.store().outline());
}

#[test]
fn test_caret_follows_remote_insert_before_it() {
    let (mut a, mut b) = pair();
    a.insert_text("world").unwrap();
    sync(&mut a, &mut b);

    let block = b.tree().document_order()[0].clone();
    b.set_caret(&block, 0);
    b.insert_text("hello ").unwrap();
    sync(&mut b, &mut a);

    assert_eq!(texts(&a), ["hello world"]);
    let caret = a.caret().unwrap();
    assert_eq!(caret.block, block);
    assert_eq!(caret.offset, 11);
}

#[test]
fn test_concurrent_edits_in_different_blocks() {
    let (mut a, mut b) = pair();
    a.insert_text("first").unwrap();
    a.insert_break().unwrap();
    a.insert_text("second").unwrap();
    sync(&mut a, &mut b);

    let order = b.tree().document_order();
    b.set_caret(&order[1], 6);
    b.insert_text(" line").unwrap();
    let first = a.tree().document_order()[0].clone();
    a.set_caret(&first, 5);
    a.insert_text(" line").unwrap();

    sync_both(&mut a, &mut b);

    assert_eq!(texts(&a), ["first line", "second line"]);
    assert_eq!(a.store().outline(), b.store().outline());
    assert_eq!(a.tree().outline(), b.tree().outline());
}

#[test]
fn test_concurrent_split_and_typing_converge() {
    let (mut a, mut b) = pair();
    a.insert_text("hello world").unwrap();
    sync(&mut a, &mut b);

    let block = a.tree().document_order()[0].clone();
    a.set_caret(&block, 5);
    a.insert_break().unwrap();
    b.insert_text("!").unwrap();

    sync_both(&mut a, &mut b);

    assert_eq!(a.store().outline(), b.store().outline());
    assert_eq!(a.tree().outline(), a.store().outline());
    assert_eq!(b.tree().outline(), b.store().outline());
    assert!(texts(&a).concat().contains('!'));
}

#[test]
fn test_concurrent_indent_and_turn_into_converge() {
    let (mut a, mut b) = pair();
    a.insert_text("one").unwrap();
    a.insert_break().unwrap();
    a.insert_text("two").unwrap();
    sync(&mut a, &mut b);

    a.indent().unwrap();
    let second = b.tree().document_order()[1].clone();
    b.set_caret(&second, 0);
    b.turn_into(BlockType::Quote, folio_types::BlockData::new()).unwrap();

    sync_both(&mut a, &mut b);

    assert_eq!(a.store().outline(), b.store().outline());
    assert_eq!(a.tree().outline(), b.tree().outline());
}

#[test]
fn test_undo_leaves_remote_text_alone() {
    let (mut a, mut b) = pair();
    a.insert_text("abc").unwrap();
    a.flush_local_changes().unwrap();
    sync(&mut a, &mut b);

    let block = b.tree().document_order()[0].clone();
    b.set_caret(&block, 3);
    b.insert_text("!").unwrap();
    sync(&mut b, &mut a);
    assert_eq!(texts(&a), ["abc!"]);

    assert!(a.undo().unwrap());
    assert_eq!(texts(&a), ["!"]);

    sync(&mut a, &mut b);
    assert_eq!(texts(&b), ["!"]);
}

#[test]
fn test_redo_after_remote_edit() {
    let (mut a, mut b) = pair();
    a.insert_text("one").unwrap();
    a.insert_break().unwrap();
    a.insert_text("two").unwrap();
    a.flush_local_changes().unwrap();
    sync(&mut a, &mut b);

    a.delete_document().unwrap();
    assert_eq!(texts(&a), [""]);
    assert!(a.undo().unwrap());
    assert_eq!(texts(&a), ["one", "two"]);

    let first = b.tree().document_order()[0].clone();
    b.set_caret(&first, 0);
    b.insert_text(">").unwrap();
    sync(&mut b, &mut a);

    assert!(a.redo().unwrap());
    assert_eq!(a.tree().outline(), a.store().outline());
    sync(&mut a, &mut b);
    assert_eq!(a.store().outline(), b.store().outline());
}

#[test]
fn test_disconnected_editor_catches_up_on_connect() {
    let (mut a, mut b) = pair();
    b.disconnect().unwrap();
    assert!(!b.is_connected());

    a.insert_text("while away").unwrap();
    let effect = sync(&mut a, &mut b);
    assert_eq!(effect, SyncEffect::Idle);

    b.connect().unwrap();
    assert_eq!(texts(&b), ["while away"]);
    assert!(b.connect().is_err());
}

#[test]
fn test_commands_need_a_connection() {
    let (_, mut b) = pair();
    b.disconnect().unwrap();
    assert!(b.insert_break().is_err());
    assert!(b.undo().is_err());
}
