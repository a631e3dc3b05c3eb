//! The replicated block tree.
//!
//! One [`yrs::Doc`] per replica with four root maps:
//!
//! ```text
//! meta          page_id -> String
//! blocks        block_id -> Map { id, ty, parent, children, external_id, external_type, data }
//! children_map  children_id -> Array<String>
//! text_map      text_id -> Text
//! ```
//!
//! Blocks reference each other by id only. Parent back-references live in the
//! block map, document order lives in the children arrays, and a block's index
//! in its parent's array is the only way to find its siblings.
//!
//! All mutation goes through [`DocumentStore::transact`]. Reads open their own
//! short read transaction and never fail on unknown ids; they return `None`
//! and leave fail-fast vs. no-op to the caller.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use folio_types::{BlockData, BlockId, BlockSnapshot, BlockType, TextDelta, TextId};
use indexmap::IndexSet;
use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};
use yrs::types::{Event, PathSegment};
use yrs::updates::decoder::Decode;
use yrs::updates::encoder::Encode;
use yrs::{
    Any, Array, ArrayRef, DeepObservable, Doc, GetString, IndexedSequence, Map, MapRef,
    OffsetKind, Options, Origin, Out, ReadTxn, StateVector, Subscription, Text, TextRef, Transact,
    TransactionMut, Update,
};

use crate::position::{Assoc, TextAnchor};
use crate::text::{read_delta, to_index};
use crate::txn::{DocTxn, Journal};
use crate::{CrdtError, Result};

/// Keys of the document schema. Shared with peers; never rename.
pub(crate) mod keys {
    pub const META: &str = "meta";
    pub const PAGE_ID: &str = "page_id";
    pub const BLOCKS: &str = "blocks";
    pub const CHILDREN_MAP: &str = "children_map";
    pub const TEXT_MAP: &str = "text_map";

    pub const ID: &str = "id";
    pub const TY: &str = "ty";
    pub const PARENT: &str = "parent";
    pub const CHILDREN: &str = "children";
    pub const EXTERNAL_ID: &str = "external_id";
    pub const EXTERNAL_TYPE: &str = "external_type";
    pub const DATA: &str = "data";

    /// `external_type` value of blocks whose external id points into the text map.
    pub const EXTERNAL_TEXT: &str = "text";
}

// ============================================================================
// Origins and change batches
// ============================================================================

/// Who caused a transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TxnOrigin {
    /// An edit made through this replica's editor.
    Local,
    /// An update received from another replica.
    Remote,
    /// An undo or redo applied by this replica.
    History,
}

impl TxnOrigin {
    fn as_str(&self) -> &'static str {
        match self {
            TxnOrigin::Local => "folio.local",
            TxnOrigin::Remote => "folio.remote",
            TxnOrigin::History => "folio.history",
        }
    }

    /// Transactions without a recognizable origin came from outside this
    /// replica's editor and are treated as remote.
    fn from_origin(origin: Option<&Origin>) -> Self {
        let Some(origin) = origin else {
            return TxnOrigin::Remote;
        };
        [TxnOrigin::Local, TxnOrigin::History]
            .into_iter()
            .find(|o| *origin == Origin::from(o.as_str()))
            .unwrap_or(TxnOrigin::Remote)
    }

    /// Local and history transactions are echoes of this replica's own edits.
    pub fn is_local(&self) -> bool {
        !matches!(self, TxnOrigin::Remote)
    }
}

/// What one committed transaction touched, as reported by the deep observers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChangeBatch {
    pub origin: TxnOrigin,
    /// Blocks created, deleted, or with changed fields.
    pub blocks: IndexSet<BlockId>,
    /// Children-group ids whose sequence changed.
    pub parents: IndexSet<BlockId>,
    /// Text sequences created, deleted, or edited.
    pub texts: IndexSet<TextId>,
}

impl ChangeBatch {
    pub fn new(origin: TxnOrigin) -> Self {
        Self {
            origin,
            blocks: IndexSet::new(),
            parents: IndexSet::new(),
            texts: IndexSet::new(),
        }
    }

    /// True when the tree shape or block fields changed, not just text.
    pub fn is_structural(&self) -> bool {
        !self.blocks.is_empty() || !self.parents.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        !self.is_structural() && self.texts.is_empty()
    }

    fn absorb(&mut self, other: ChangeBatch) {
        self.blocks.extend(other.blocks);
        self.parents.extend(other.parents);
        self.texts.extend(other.texts);
    }
}

/// Queue of change batches filled by observer callbacks and drained by the
/// editor binding on its own schedule.
#[derive(Clone, Default)]
pub struct ChangeFeed {
    queue: Arc<Mutex<VecDeque<ChangeBatch>>>,
}

impl ChangeFeed {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, batch: ChangeBatch) {
        if batch.is_empty() {
            return;
        }
        let mut queue = self.queue.lock();
        // One transaction fires one callback per root map; fold them together.
        if let Some(last) = queue.back_mut() {
            if last.origin == batch.origin {
                last.absorb(batch);
                return;
            }
        }
        queue.push_back(batch);
    }

    /// Take every queued batch, oldest first.
    pub fn drain(&self) -> Vec<ChangeBatch> {
        self.queue.lock().drain(..).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}

/// Keeps the deep observers registered. Dropping it unregisters them.
pub struct StoreObserver {
    _subscriptions: Vec<Subscription>,
}

// ============================================================================
// Schema access
// ============================================================================

/// Handles to the four root maps, shared by read transactions and [`DocTxn`].
#[derive(Clone)]
pub(crate) struct Roots {
    pub(crate) meta: MapRef,
    pub(crate) blocks: MapRef,
    pub(crate) children: MapRef,
    pub(crate) texts: MapRef,
}

pub(crate) fn read_string<T: ReadTxn>(map: &MapRef, txn: &T, key: &str) -> Option<String> {
    match map.get(txn, key) {
        Some(Out::Any(Any::String(s))) => Some(s.to_string()),
        _ => None,
    }
}

impl Roots {
    fn new(doc: &Doc) -> Self {
        Self {
            meta: doc.get_or_insert_map(keys::META),
            blocks: doc.get_or_insert_map(keys::BLOCKS),
            children: doc.get_or_insert_map(keys::CHILDREN_MAP),
            texts: doc.get_or_insert_map(keys::TEXT_MAP),
        }
    }

    pub(crate) fn page_id<T: ReadTxn>(&self, txn: &T) -> Option<BlockId> {
        read_string(&self.meta, txn, keys::PAGE_ID).map(BlockId::from)
    }

    pub(crate) fn block_map<T: ReadTxn>(&self, txn: &T, id: &BlockId) -> Option<MapRef> {
        match self.blocks.get(txn, id.as_str()) {
            Some(Out::YMap(map)) => Some(map),
            _ => None,
        }
    }

    pub(crate) fn block<T: ReadTxn>(&self, txn: &T, id: &BlockId) -> Option<BlockSnapshot> {
        let map = self.block_map(txn, id)?;
        let ty = read_string(&map, txn, keys::TY).unwrap_or_default();
        let ty = BlockType::from_str(&ty).unwrap_or_else(|| {
            // Types introduced by newer peers render and edit as paragraphs.
            trace!(block = %id, %ty, "unknown block type");
            BlockType::Paragraph
        });
        Some(BlockSnapshot {
            id: read_string(&map, txn, keys::ID)
                .map(BlockId::from)
                .unwrap_or_else(|| id.clone()),
            ty,
            parent: read_string(&map, txn, keys::PARENT)
                .filter(|p| !p.is_empty())
                .map(BlockId::from),
            children_id: read_string(&map, txn, keys::CHILDREN)
                .map(BlockId::from)
                .unwrap_or_else(|| id.clone()),
            external_id: read_string(&map, txn, keys::EXTERNAL_ID).map(TextId::from),
            external_type: read_string(&map, txn, keys::EXTERNAL_TYPE),
            data: read_string(&map, txn, keys::DATA)
                .map(|s| BlockData::from_json_str(&s))
                .unwrap_or_default(),
        })
    }

    pub(crate) fn children_array<T: ReadTxn>(
        &self,
        txn: &T,
        children_id: &BlockId,
    ) -> Option<ArrayRef> {
        match self.children.get(txn, children_id.as_str()) {
            Some(Out::YArray(array)) => Some(array),
            _ => None,
        }
    }

    pub(crate) fn child_ids<T: ReadTxn>(&self, txn: &T, array: &ArrayRef) -> Vec<BlockId> {
        array
            .iter(txn)
            .filter_map(|out| match out {
                Out::Any(Any::String(s)) => Some(BlockId::from(s.as_ref())),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn children<T: ReadTxn>(&self, txn: &T, id: &BlockId) -> Option<Vec<BlockId>> {
        let block = self.block(txn, id)?;
        let array = self.children_array(txn, &block.children_id)?;
        Some(self.child_ids(txn, &array))
    }

    pub(crate) fn text<T: ReadTxn>(&self, txn: &T, id: &TextId) -> Option<TextRef> {
        match self.texts.get(txn, id.as_str()) {
            Some(Out::YText(text)) => Some(text),
            _ => None,
        }
    }

    pub(crate) fn block_ids<T: ReadTxn>(&self, txn: &T) -> Vec<BlockId> {
        self.blocks
            .iter(txn)
            .map(|(key, _)| BlockId::from(key))
            .collect()
    }

    /// `(parent, index)` of `id` in its parent's children.
    pub(crate) fn slot<T: ReadTxn>(&self, txn: &T, id: &BlockId) -> Option<(BlockId, usize)> {
        let block = self.block(txn, id)?;
        let parent = block.parent?;
        let index = self.children(txn, &parent)?.iter().position(|c| c == id)?;
        Some((parent, index))
    }

    /// Every block under the page in document order, with its depth
    /// (page children are depth 1). Stops descending at `max_depth`.
    pub(crate) fn preorder<T: ReadTxn>(&self, txn: &T, max_depth: usize) -> Vec<(BlockId, usize)> {
        let mut out = Vec::new();
        let Some(page) = self.page_id(txn) else {
            return out;
        };
        let mut stack: Vec<(BlockId, usize)> = self
            .children(txn, &page)
            .unwrap_or_default()
            .into_iter()
            .rev()
            .map(|id| (id, 1))
            .collect();
        while let Some((id, depth)) = stack.pop() {
            if depth > max_depth {
                warn!(block = %id, depth, "document nesting exceeds limit; subtree skipped");
                continue;
            }
            let children = self.children(txn, &id).unwrap_or_default();
            out.push((id, depth));
            stack.extend(children.into_iter().rev().map(|c| (c, depth + 1)));
        }
        out
    }

    /// Text-bearing block adjacent to `id` in document order.
    pub(crate) fn neighbour_text_block<T: ReadTxn>(
        &self,
        txn: &T,
        id: &BlockId,
        forward: bool,
        max_depth: usize,
    ) -> Option<BlockId> {
        let order = self.preorder(txn, max_depth);
        let pos = order.iter().position(|(b, _)| b == id)?;
        let is_text = |b: &BlockId| self.block(txn, b).is_some_and(|s| s.ty.has_text());
        if forward {
            order[pos + 1..].iter().map(|(b, _)| b).find(|b| is_text(b)).cloned()
        } else {
            order[..pos].iter().rev().map(|(b, _)| b).find(|b| is_text(b)).cloned()
        }
    }
}

// ============================================================================
// DocumentStore
// ============================================================================

/// Construction options for a replica.
#[derive(Clone, Debug)]
pub struct StoreOptions {
    /// Fixed CRDT client id. Random when `None`.
    pub client_id: Option<u64>,
    /// Hard limit for recursive subtree walks.
    pub max_nesting_depth: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            client_id: None,
            max_nesting_depth: folio_types::MAX_NESTING_DEPTH,
        }
    }
}

/// Result of a committed transaction: the closure's value plus the journal
/// needed to revert it.
#[derive(Debug)]
pub struct Applied<T> {
    pub value: T,
    pub journal: Journal,
}

/// One replica of a block document.
pub struct DocumentStore {
    doc: Doc,
    roots: Roots,
    max_depth: usize,
}

impl DocumentStore {
    /// An empty replica with no page. Fill it with [`apply_remote_update`](Self::apply_remote_update).
    pub fn new(options: StoreOptions) -> Self {
        let mut doc_options = Options::default();
        if let Some(client_id) = options.client_id {
            doc_options.client_id = client_id;
        }
        // Offsets in UTF-16 code units, the unit every Yjs peer uses.
        doc_options.offset_kind = OffsetKind::Utf16;
        // Keep tombstones so sticky indices held by history and selections
        // always resolve.
        doc_options.skip_gc = true;
        let doc = Doc::with_options(doc_options);
        let roots = Roots::new(&doc);
        Self {
            doc,
            roots,
            max_depth: options.max_nesting_depth,
        }
    }

    /// A fresh document: a page root holding one empty paragraph.
    pub fn new_document(options: StoreOptions) -> Result<Self> {
        let store = Self::new(options);
        store.transact("create_document", TxnOrigin::Local, |txn| {
            let page = txn.create_block(BlockType::Page, BlockData::new())?;
            txn.set_page(&page);
            let first = txn.create_block(BlockType::Paragraph, BlockData::new())?;
            txn.attach_to_parent(&first, &page, 0)
        })?;
        Ok(store)
    }

    /// A replica initialized from another replica's encoded state.
    pub fn from_update(options: StoreOptions, update: &[u8]) -> Result<Self> {
        let store = Self::new(options);
        store.apply_remote_update(update)?;
        Ok(store)
    }

    pub fn client_id(&self) -> u64 {
        self.doc.client_id()
    }

    pub fn max_nesting_depth(&self) -> usize {
        self.max_depth
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    /// Run `f` inside one transaction labeled `label`.
    ///
    /// If `f` returns an error, every mutation it made is reverted inside the
    /// same transaction before it commits, so the store is left as it was.
    /// Transactions never nest; do not call back into the store from `f`.
    pub fn transact<T>(
        &self,
        label: &str,
        origin: TxnOrigin,
        f: impl FnOnce(&mut DocTxn<'_>) -> Result<T>,
    ) -> Result<Applied<T>> {
        let span = tracing::debug_span!("transact", label, ?origin);
        let _enter = span.enter();
        let started = Instant::now();

        let mut txn = DocTxn::new(
            self.doc.transact_mut_with(origin.as_str()),
            &self.roots,
            self.max_depth,
        );
        match f(&mut txn) {
            Ok(value) => {
                let journal = txn.finish(label);
                trace!(
                    elapsed_us = started.elapsed().as_micros() as u64,
                    entries = journal.len(),
                    "committed"
                );
                Ok(Applied { value, journal })
            }
            Err(err) => {
                debug!(%err, "rolling back");
                txn.rollback();
                Err(err)
            }
        }
    }

    /// Apply the inverse of `journal` as a history transaction. Returns the
    /// journal of the reverting transaction, which reverts the revert.
    pub fn revert(&self, journal: Journal, label: &str) -> Result<Journal> {
        let applied = self.transact(label, TxnOrigin::History, |txn| {
            txn.apply_journal_inverse(journal);
            Ok(())
        })?;
        Ok(applied.journal)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub fn page_id(&self) -> Option<BlockId> {
        self.roots.page_id(&self.doc.transact())
    }

    pub fn get_block(&self, id: &BlockId) -> Option<BlockSnapshot> {
        self.roots.block(&self.doc.transact(), id)
    }

    pub fn get_children(&self, id: &BlockId) -> Option<Vec<BlockId>> {
        self.roots.children(&self.doc.transact(), id)
    }

    /// Full content of a text sequence.
    pub fn get_text(&self, id: &TextId) -> Option<TextDelta> {
        let txn = self.doc.transact();
        self.roots.text(&txn, id).map(|text| read_delta(&text, &txn))
    }

    pub fn text_string(&self, id: &TextId) -> Option<String> {
        let txn = self.doc.transact();
        self.roots.text(&txn, id).map(|text| text.get_string(&txn))
    }

    pub fn text_len(&self, id: &TextId) -> Option<usize> {
        let txn = self.doc.transact();
        self.roots.text(&txn, id).map(|text| text.len(&txn) as usize)
    }

    /// Plain text of a block, falling back to inline `data.delta` for blocks
    /// whose text has not been materialized.
    pub fn block_text(&self, id: &BlockId) -> Option<String> {
        let block = self.get_block(id)?;
        let text_id = block.text_id()?;
        self.text_string(&text_id)
            .or_else(|| block.data.delta().map(|d| d.plain_text()))
    }

    /// Rich content of a block: its text sequence, or inline `data.delta`
    /// before the text is materialized. `None` for unknown or text-less blocks.
    pub fn block_delta(&self, id: &BlockId) -> Option<TextDelta> {
        let block = self.get_block(id)?;
        let text_id = block.text_id()?;
        Some(
            self.get_text(&text_id)
                .or_else(|| block.data.delta())
                .unwrap_or_default(),
        )
    }

    pub fn contains_block(&self, id: &BlockId) -> bool {
        self.get_block(id).is_some()
    }

    pub fn block_count(&self) -> usize {
        let txn = self.doc.transact();
        self.roots.blocks.len(&txn) as usize
    }

    pub fn block_ids(&self) -> Vec<BlockId> {
        self.roots.block_ids(&self.doc.transact())
    }

    pub fn parent_of(&self, id: &BlockId) -> Option<BlockId> {
        self.get_block(id)?.parent
    }

    /// `(parent, index)` of a block in its parent's children.
    pub fn slot_of(&self, id: &BlockId) -> Option<(BlockId, usize)> {
        self.roots.slot(&self.doc.transact(), id)
    }

    /// Number of ancestors below the page; page children have depth 1.
    pub fn depth(&self, id: &BlockId) -> Option<usize> {
        let txn = self.doc.transact();
        let page = self.roots.page_id(&txn)?;
        let mut depth = 0;
        let mut current = self.roots.block(&txn, id)?;
        while current.id != page {
            depth += 1;
            if depth > self.max_depth {
                return None;
            }
            current = self.roots.block(&txn, current.parent.as_ref()?)?;
        }
        Some(depth)
    }

    /// Every block under the page in document order.
    pub fn document_order(&self) -> Vec<BlockId> {
        self.roots
            .preorder(&self.doc.transact(), self.max_depth)
            .into_iter()
            .map(|(id, _)| id)
            .collect()
    }

    pub fn previous_text_block(&self, id: &BlockId) -> Option<BlockId> {
        self.roots
            .neighbour_text_block(&self.doc.transact(), id, false, self.max_depth)
    }

    pub fn next_text_block(&self, id: &BlockId) -> Option<BlockId> {
        self.roots
            .neighbour_text_block(&self.doc.transact(), id, true, self.max_depth)
    }

    /// Indented plain-text rendering of the tree, one block per line.
    pub fn outline(&self) -> String {
        let txn = self.doc.transact();
        let mut out = String::new();
        for (id, depth) in self.roots.preorder(&txn, self.max_depth) {
            let Some(block) = self.roots.block(&txn, &id) else {
                continue;
            };
            let text = block
                .text_id()
                .and_then(|t| self.roots.text(&txn, &t))
                .map(|t| t.get_string(&txn))
                .unwrap_or_default();
            out.push_str(&"  ".repeat(depth - 1));
            out.push_str(&format!("- [{}] {}\n", block.ty, text));
        }
        out
    }

    // =========================================================================
    // Relative positions
    // =========================================================================

    /// Anchor `offset` (clamped to the text length) in a text sequence.
    pub fn anchor(&self, text_id: &TextId, offset: usize, assoc: Assoc) -> TextAnchor {
        let mut txn = self.doc.transact_mut_with(TxnOrigin::Local.as_str());
        let Some(text) = self.roots.text(&txn, text_id) else {
            return TextAnchor::new(text_id.clone(), None, offset);
        };
        let offset = offset.min(text.len(&txn) as usize);
        let sticky = text.sticky_index(&mut txn, to_index(offset), assoc);
        TextAnchor::new(text_id.clone(), sticky, offset)
    }

    /// Current absolute offset of an anchor, or `None` if its text sequence
    /// no longer exists.
    pub fn resolve_anchor(&self, anchor: &TextAnchor) -> Option<usize> {
        let txn = self.doc.transact();
        let text = self.roots.text(&txn, anchor.text_id())?;
        Some(anchor.offset_in(&text, &txn))
    }

    // =========================================================================
    // Replica sync (transport is the caller's concern)
    // =========================================================================

    /// Encoded state vector, sent to a peer so it can compute a diff.
    pub fn state_vector(&self) -> Vec<u8> {
        self.doc.transact().state_vector().encode_v1()
    }

    /// Everything this replica knows, as one update.
    pub fn encode_state_as_update(&self) -> Vec<u8> {
        self.doc
            .transact()
            .encode_state_as_update_v1(&StateVector::default())
    }

    /// The update a peer with `state_vector` is missing.
    pub fn encode_diff(&self, state_vector: &[u8]) -> Result<Vec<u8>> {
        let sv = StateVector::decode_v1(state_vector)
            .map_err(|e| CrdtError::Update(format!("bad state vector: {e}")))?;
        Ok(self.doc.transact().encode_diff_v1(&sv))
    }

    /// Apply an update produced by another replica.
    pub fn apply_remote_update(&self, update: &[u8]) -> Result<()> {
        let update =
            Update::decode_v1(update).map_err(|e| CrdtError::Update(format!("decode: {e}")))?;
        let mut txn = self.doc.transact_mut_with(TxnOrigin::Remote.as_str());
        txn.apply_update(update)
            .map_err(|e| CrdtError::Update(format!("apply: {e}")))?;
        debug!("remote update applied");
        Ok(())
    }

    // =========================================================================
    // Observation
    // =========================================================================

    /// Register deep observers on the content maps. Every committed
    /// transaction pushes a [`ChangeBatch`] to `feed` until the returned
    /// observer is dropped.
    pub fn observe(&self, feed: ChangeFeed) -> StoreObserver {
        let blocks = {
            let feed = feed.clone();
            self.roots.blocks.observe_deep(move |txn, events| {
                let mut batch = ChangeBatch::new(TxnOrigin::from_origin(txn.origin()));
                for key in touched_keys(txn, events.iter()) {
                    batch.blocks.insert(BlockId::from(key.as_str()));
                }
                feed.push(batch);
            })
        };
        let children = {
            let feed = feed.clone();
            self.roots.children.observe_deep(move |txn, events| {
                let mut batch = ChangeBatch::new(TxnOrigin::from_origin(txn.origin()));
                for key in touched_keys(txn, events.iter()) {
                    batch.parents.insert(BlockId::from(key.as_str()));
                }
                feed.push(batch);
            })
        };
        let texts = self.roots.texts.observe_deep(move |txn, events| {
            let mut batch = ChangeBatch::new(TxnOrigin::from_origin(txn.origin()));
            for key in touched_keys(txn, events.iter()) {
                batch.texts.insert(TextId::from(key.as_str()));
            }
            feed.push(batch);
        });
        info!("document observers registered");
        StoreObserver {
            _subscriptions: vec![blocks, children, texts],
        }
    }
}

/// Top-level keys of a root map touched by a set of deep events: the first
/// path segment for nested changes, the changed keys for changes to the root
/// map itself.
fn touched_keys<'a>(
    txn: &TransactionMut,
    events: impl Iterator<Item = &'a Event>,
) -> IndexSet<String> {
    let mut keys = IndexSet::new();
    for event in events {
        match event.path().front() {
            Some(PathSegment::Key(key)) => {
                keys.insert(key.to_string());
            }
            Some(PathSegment::Index(_)) => {}
            None => {
                if let Event::Map(map_event) = event {
                    keys.extend(map_event.keys(txn).keys().map(|k| k.to_string()));
                }
            }
        }
    }
    keys
}
