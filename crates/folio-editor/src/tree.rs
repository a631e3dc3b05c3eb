//! The ephemeral editing tree.
//!
//! A render-side copy of the document: block nodes in an arena keyed by id,
//! each text-bearing node holding its content as inline nodes. Runs carrying
//! the same `link` attribute are grouped under one [`Inline::Link`], so
//! inline content can nest and positions inside it need a path, not just an
//! offset.
//!
//! The tree is never authoritative. It can be rebuilt from the store at any
//! time, and local text edits applied to it are only kept once the binding
//! has flushed them to the store.

use std::collections::HashMap;

use folio_crdt::{ChangeBatch, DocumentStore};
use folio_types::{Attributes, BlockData, BlockId, BlockType, DeltaOp, TextDelta, TextId, utf16_len};
use serde_json::Value;
use tracing::{trace, warn};

/// Attribute key that groups runs into a link element.
const LINK: &str = "link";

// ============================================================================
// Inline content
// ============================================================================

#[derive(Clone, Debug, PartialEq)]
pub struct TextRun {
    pub text: String,
    pub attributes: Attributes,
}

impl TextRun {
    pub fn new(text: impl Into<String>, attributes: Attributes) -> Self {
        Self {
            text: text.into(),
            attributes,
        }
    }

    /// Length in UTF-16 units.
    pub fn len(&self) -> usize {
        utf16_len(&self.text)
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Inline {
    Run(TextRun),
    Link { href: String, children: Vec<Inline> },
}

impl Inline {
    pub fn len(&self) -> usize {
        match self {
            Inline::Run(run) => run.len(),
            Inline::Link { children, .. } => children.iter().map(Inline::len).sum(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push_text(&self, out: &mut String) {
        match self {
            Inline::Run(run) => out.push_str(&run.text),
            Inline::Link { children, .. } => children.iter().for_each(|c| c.push_text(out)),
        }
    }

    fn push_delta(&self, out: &mut TextDelta, link: Option<&str>) {
        match self {
            Inline::Run(run) => {
                let mut attributes = run.attributes.clone();
                if let Some(href) = link {
                    attributes.insert(LINK.to_string(), Value::String(href.to_string()));
                }
                out.insert(&run.text, attributes);
            }
            Inline::Link { href, children } => {
                for child in children {
                    child.push_delta(out, Some(href));
                }
            }
        }
    }
}

/// Inline nodes for a text delta. Never empty: empty text is one empty run.
pub fn inlines_from_delta(delta: &TextDelta) -> Vec<Inline> {
    let mut out: Vec<Inline> = Vec::new();
    for op in delta.ops() {
        let DeltaOp::Insert { insert, attributes } = op else {
            continue;
        };
        let mut attributes = attributes.clone();
        let href = match attributes.remove(LINK) {
            Some(Value::String(href)) => Some(href),
            _ => None,
        };
        let run = Inline::Run(TextRun::new(insert.clone(), attributes));
        match (href, out.last_mut()) {
            (Some(href), Some(Inline::Link { href: last, children })) if *last == href => {
                children.push(run);
            }
            (Some(href), _) => out.push(Inline::Link {
                href,
                children: vec![run],
            }),
            (None, _) => out.push(run),
        }
    }
    if out.is_empty() {
        out.push(Inline::Run(TextRun::new("", Attributes::new())));
    }
    out
}

pub fn inlines_to_delta(inlines: &[Inline]) -> TextDelta {
    let mut delta = TextDelta::new();
    for inline in inlines {
        inline.push_delta(&mut delta, None);
    }
    delta
}

// ============================================================================
// Block nodes
// ============================================================================

#[derive(Clone, Debug)]
pub struct BlockNode {
    pub id: BlockId,
    pub ty: BlockType,
    pub data: BlockData,
    pub parent: Option<BlockId>,
    pub children: Vec<BlockId>,
    /// Set for text-bearing blocks.
    pub text_id: Option<TextId>,
    /// Empty for blocks without text.
    pub inlines: Vec<Inline>,
}

impl BlockNode {
    fn load(store: &DocumentStore, id: &BlockId) -> Option<Self> {
        let block = store.get_block(id)?;
        let children = store.get_children(&block.children_id).unwrap_or_default();
        let text_id = block.text_id();
        let inlines = store
            .block_delta(id)
            .map(|delta| inlines_from_delta(&delta))
            .unwrap_or_default();
        Some(Self {
            id: block.id,
            ty: block.ty,
            data: block.data,
            parent: block.parent,
            children,
            text_id,
            inlines,
        })
    }

    pub fn owns_text(&self) -> bool {
        self.text_id.is_some()
    }

    pub fn text_len(&self) -> usize {
        self.inlines.iter().map(Inline::len).sum()
    }

    pub fn text(&self) -> String {
        let mut out = String::new();
        self.inlines.iter().for_each(|i| i.push_text(&mut out));
        out
    }

    pub fn delta(&self) -> TextDelta {
        inlines_to_delta(&self.inlines)
    }

    /// The run an inline path leads to.
    pub fn run_at(&self, path: &[usize]) -> Option<&TextRun> {
        let (last, parents) = path.split_last()?;
        let mut level: &[Inline] = &self.inlines;
        for &index in parents {
            match level.get(index)? {
                Inline::Link { children, .. } => level = children,
                Inline::Run(_) => return None,
            }
        }
        match level.get(*last)? {
            Inline::Run(run) => Some(run),
            Inline::Link { .. } => None,
        }
    }
}

// ============================================================================
// EditorTree
// ============================================================================

#[derive(Clone, Debug, Default)]
pub struct EditorTree {
    page: Option<BlockId>,
    nodes: HashMap<BlockId, BlockNode>,
    text_owners: HashMap<TextId, BlockId>,
    max_depth: usize,
}

impl EditorTree {
    /// Full copy of the store's current tree.
    pub fn build(store: &DocumentStore) -> Self {
        let mut tree = Self {
            page: store.page_id(),
            nodes: HashMap::new(),
            text_owners: HashMap::new(),
            max_depth: store.max_nesting_depth(),
        };
        let Some(page) = tree.page.clone() else {
            return tree;
        };
        let mut stack = vec![(page, 0)];
        while let Some((id, depth)) = stack.pop() {
            if depth > tree.max_depth {
                warn!(block = %id, depth, "tree nesting exceeds limit; subtree skipped");
                continue;
            }
            let Some(node) = BlockNode::load(store, &id) else {
                warn!(block = %id, "listed child missing from store");
                continue;
            };
            stack.extend(node.children.iter().rev().map(|c| (c.clone(), depth + 1)));
            tree.insert(node);
        }
        tree
    }

    fn insert(&mut self, node: BlockNode) {
        if let Some(text_id) = &node.text_id {
            self.text_owners.insert(text_id.clone(), node.id.clone());
        }
        self.nodes.insert(node.id.clone(), node);
    }

    fn remove(&mut self, id: &BlockId) {
        if let Some(node) = self.nodes.remove(id) {
            if let Some(text_id) = node.text_id {
                self.text_owners.remove(&text_id);
            }
        }
    }

    pub fn page(&self) -> Option<&BlockId> {
        self.page.as_ref()
    }

    pub fn node(&self, id: &BlockId) -> Option<&BlockNode> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &BlockId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Number of nodes, the page included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Blocks below the page in document order, with depth (page children
    /// are depth 1).
    pub fn preorder(&self) -> Vec<(BlockId, usize)> {
        let mut out = Vec::new();
        let Some(page) = self.page.as_ref().and_then(|p| self.nodes.get(p)) else {
            return out;
        };
        let mut stack: Vec<(BlockId, usize)> =
            page.children.iter().rev().map(|c| (c.clone(), 1)).collect();
        while let Some((id, depth)) = stack.pop() {
            let Some(node) = self.nodes.get(&id) else {
                continue;
            };
            if depth <= self.max_depth {
                stack.extend(node.children.iter().rev().map(|c| (c.clone(), depth + 1)));
            }
            out.push((id, depth));
        }
        out
    }

    pub fn document_order(&self) -> Vec<BlockId> {
        self.preorder().into_iter().map(|(id, _)| id).collect()
    }

    /// The first text-bearing block in document order, falling back to the
    /// page itself.
    pub fn first_text_block(&self) -> Option<BlockId> {
        self.document_order()
            .into_iter()
            .find(|id| self.nodes.get(id).is_some_and(BlockNode::owns_text))
            .or_else(|| self.page.clone())
    }

    /// Same rendering as [`DocumentStore::outline`].
    pub fn outline(&self) -> String {
        let mut out = String::new();
        for (id, depth) in self.preorder() {
            if let Some(node) = self.nodes.get(&id) {
                out.push_str(&"  ".repeat(depth - 1));
                out.push_str(&format!("- [{}] {}\n", node.ty, node.text()));
            }
        }
        out
    }

    // =========================================================================
    // Local edits
    // =========================================================================

    /// Compose `change` onto a block's text. Returns false when the block is
    /// unknown or has no text.
    pub fn apply_text_change(&mut self, block: &BlockId, change: &TextDelta) -> bool {
        let Some(node) = self.nodes.get_mut(block) else {
            return false;
        };
        if !node.owns_text() {
            return false;
        }
        let next = node.delta().compose(change);
        node.inlines = inlines_from_delta(&next);
        true
    }

    // =========================================================================
    // Targeted patches
    // =========================================================================

    /// Bring the nodes a change batch touched up to date with the store.
    /// Returns the number of nodes reloaded or dropped.
    pub fn patch(&mut self, store: &DocumentStore, batch: &ChangeBatch) -> usize {
        let mut touched = 0;
        for id in &batch.blocks {
            match BlockNode::load(store, id) {
                Some(node) => self.insert(node),
                None => self.remove(id),
            }
            touched += 1;
        }
        for id in &batch.parents {
            if let Some(node) = self.nodes.get_mut(id) {
                node.children = store.get_children(id).unwrap_or_default();
                touched += 1;
            }
        }
        for text_id in &batch.texts {
            let Some(owner) = self.text_owners.get(text_id).cloned() else {
                continue;
            };
            if let Some(node) = self.nodes.get_mut(&owner) {
                node.inlines = store
                    .block_delta(&owner)
                    .map(|delta| inlines_from_delta(&delta))
                    .unwrap_or_default();
                touched += 1;
            }
        }
        if store.page_id() != self.page {
            self.page = store.page_id();
        }
        trace!(touched, "tree patched");
        touched
    }
}

#[cfg(test)]
mod tests {
    use folio_crdt::{ChangeFeed, StoreOptions, TxnOrigin};
    use serde_json::json;

    use super::*;

    fn link(href: &str) -> Attributes {
        let mut attrs = Attributes::new();
        attrs.insert(LINK.into(), json!(href));
        attrs
    }

    fn store_with(texts: &[&str]) -> (DocumentStore, Vec<BlockId>) {
        let store = DocumentStore::new_document(StoreOptions::default()).unwrap();
        let first = store.document_order()[0].clone();
        let mut ids = vec![first.clone()];
        store
            .transact("seed", TxnOrigin::Local, |txn| {
                txn.insert_text(&first.text_id(), 0, texts[0], Attributes::new())
            })
            .unwrap();
        let page = store.page_id().unwrap();
        for (i, text) in texts.iter().enumerate().skip(1) {
            let id = store
                .transact("seed", TxnOrigin::Local, |txn| {
                    let id = txn.create_block(BlockType::Paragraph, BlockData::new())?;
                    txn.attach_to_parent(&id, &page, i)?;
                    txn.insert_text(&id.text_id(), 0, text, Attributes::new())?;
                    Ok(id)
                })
                .unwrap()
                .value;
            ids.push(id);
        }
        (store, ids)
    }

    #[test]
    fn test_links_group_adjacent_runs() {
        let mut delta = TextDelta::new();
        delta.insert("see ", Attributes::new());
        delta.insert("the ", link("https://a"));
        let mut bold_link = link("https://a");
        bold_link.insert("bold".into(), json!(true));
        delta.insert("docs", bold_link);
        delta.insert(" now", Attributes::new());

        let inlines = inlines_from_delta(&delta);

        assert_eq!(inlines.len(), 3);
        match &inlines[1] {
            Inline::Link { href, children } => {
                assert_eq!(href, "https://a");
                assert_eq!(children.len(), 2);
            }
            other => panic!("expected link, got {other:?}"),
        }
        assert_eq!(inlines_to_delta(&inlines), delta);
    }

    #[test]
    fn test_empty_text_has_one_empty_run() {
        let inlines = inlines_from_delta(&TextDelta::new());
        assert_eq!(inlines, vec![Inline::Run(TextRun::new("", Attributes::new()))]);
    }

    #[test]
    fn test_build_mirrors_store_outline() {
        let (store, _) = store_with(&["one", "two", "three"]);
        let tree = EditorTree::build(&store);
        assert_eq!(tree.outline(), store.outline());
        assert_eq!(tree.len(), 4);
    }

    #[test]
    fn test_local_text_change() {
        let (store, ids) = store_with(&["Hello"]);
        let mut tree = EditorTree::build(&store);
        let mut change = TextDelta::new();
        change.retain(5, Attributes::new()).insert("!", Attributes::new());

        assert!(tree.apply_text_change(&ids[0], &change));
        assert_eq!(tree.node(&ids[0]).unwrap().text(), "Hello!");
        assert!(!tree.apply_text_change(&BlockId::from("nope"), &change));
    }

    #[test]
    fn test_patch_applies_only_touched_nodes() {
        let (store, ids) = store_with(&["one", "two"]);
        let mut tree = EditorTree::build(&store);
        let feed = ChangeFeed::new();
        let _observer = store.observe(feed.clone());

        store.split_block(&ids[0], 1).unwrap();
        for batch in feed.drain() {
            tree.patch(&store, &batch);
        }

        assert_eq!(tree.outline(), store.outline());
        assert_eq!(tree.len(), 4);
    }

    #[test]
    fn test_patch_drops_deleted_nodes() {
        let (store, ids) = store_with(&["one", "two"]);
        let mut tree = EditorTree::build(&store);
        let feed = ChangeFeed::new();
        let _observer = store.observe(feed.clone());

        store.remove_block(&ids[1]).unwrap();
        for batch in feed.drain() {
            tree.patch(&store, &batch);
        }

        assert!(!tree.contains(&ids[1]));
        assert_eq!(tree.outline(), store.outline());
    }
}
