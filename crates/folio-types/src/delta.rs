//! Rich-text deltas: ordered insert/retain/delete runs with attributes.
//!
//! The JSON shape is the one every collaborator speaks:
//!
//! ```json
//! [{"insert": "Hello ", "attributes": {"bold": true}}, {"insert": "World"}]
//! ```
//!
//! A delta made only of inserts describes a whole text ("document delta").
//! A delta with retains and deletes describes a change to one. [`TextDelta::compose`]
//! applies a change to a document delta.
//!
//! All lengths and offsets are UTF-16 code units, the unit the replicated text
//! uses on every peer. For text inside the Basic Multilingual Plane this is the
//! same as a codepoint count.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Formatting attached to a run. A `null` value in a retain removes the key.
pub type Attributes = BTreeMap<String, serde_json::Value>;

/// Length of `s` in UTF-16 code units.
pub fn utf16_len(s: &str) -> usize {
    s.chars().map(char::len_utf16).sum()
}

/// Split `s` at a UTF-16 offset.
///
/// An offset that lands inside a surrogate pair splits after the pair.
/// Offsets past the end return `(s, "")`.
pub fn split_at_utf16(s: &str, offset: usize) -> (&str, &str) {
    let mut units = 0;
    for (byte, ch) in s.char_indices() {
        if units >= offset {
            return s.split_at(byte);
        }
        units += ch.len_utf16();
    }
    (s, "")
}

/// One run of a delta.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DeltaOp {
    Insert {
        insert: String,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        attributes: Attributes,
    },
    Retain {
        retain: usize,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        attributes: Attributes,
    },
    Delete {
        delete: usize,
    },
}

impl DeltaOp {
    pub fn insert(text: impl Into<String>) -> Self {
        DeltaOp::Insert {
            insert: text.into(),
            attributes: Attributes::new(),
        }
    }

    pub fn retain(len: usize) -> Self {
        DeltaOp::Retain {
            retain: len,
            attributes: Attributes::new(),
        }
    }

    pub fn delete(len: usize) -> Self {
        DeltaOp::Delete { delete: len }
    }

    /// Length in UTF-16 code units.
    pub fn len(&self) -> usize {
        match self {
            DeltaOp::Insert { insert, .. } => utf16_len(insert),
            DeltaOp::Retain { retain, .. } => *retain,
            DeltaOp::Delete { delete } => *delete,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn attributes(&self) -> Option<&Attributes> {
        match self {
            DeltaOp::Insert { attributes, .. } | DeltaOp::Retain { attributes, .. } => {
                Some(attributes)
            }
            DeltaOp::Delete { .. } => None,
        }
    }

    /// The sub-run `[start, start + len)` of this op.
    fn sub(&self, start: usize, len: usize) -> DeltaOp {
        match self {
            DeltaOp::Insert { insert, attributes } => {
                let (_, tail) = split_at_utf16(insert, start);
                let (piece, _) = split_at_utf16(tail, len);
                DeltaOp::Insert {
                    insert: piece.to_string(),
                    attributes: attributes.clone(),
                }
            }
            DeltaOp::Retain { attributes, .. } => DeltaOp::Retain {
                retain: len,
                attributes: attributes.clone(),
            },
            DeltaOp::Delete { .. } => DeltaOp::Delete { delete: len },
        }
    }
}

/// An ordered list of [`DeltaOp`] runs, kept in canonical form: no empty runs,
/// adjacent runs of the same kind and attributes merged, inserts before deletes.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TextDelta {
    ops: Vec<DeltaOp>,
}

impl TextDelta {
    pub fn new() -> Self {
        Self::default()
    }

    /// A document delta holding unformatted `text`.
    pub fn from_text(text: &str) -> Self {
        let mut delta = Self::new();
        delta.insert(text, Attributes::new());
        delta
    }

    pub fn ops(&self) -> &[DeltaOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<DeltaOp> {
        self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn insert(&mut self, text: &str, attributes: Attributes) -> &mut Self {
        self.push(DeltaOp::Insert {
            insert: text.to_string(),
            attributes,
        })
    }

    pub fn retain(&mut self, len: usize, attributes: Attributes) -> &mut Self {
        self.push(DeltaOp::Retain {
            retain: len,
            attributes,
        })
    }

    pub fn delete(&mut self, len: usize) -> &mut Self {
        self.push(DeltaOp::Delete { delete: len })
    }

    /// Append one run, merging it into the previous one when possible.
    pub fn push(&mut self, op: DeltaOp) -> &mut Self {
        if op.is_empty() {
            return self;
        }

        let mut index = self.ops.len();
        if let Some(DeltaOp::Delete { delete }) = self.ops.last_mut() {
            if let DeltaOp::Delete { delete: more } = op {
                *delete += more;
                return self;
            }
            // Inserts go before a trailing delete; the result is equivalent
            // and keeps the representation canonical.
            if matches!(op, DeltaOp::Insert { .. }) {
                index -= 1;
                if index == 0 {
                    self.ops.insert(0, op);
                    return self;
                }
            }
        }

        if index > 0 {
            let merged = match (&mut self.ops[index - 1], &op) {
                (
                    DeltaOp::Insert { insert, attributes },
                    DeltaOp::Insert {
                        insert: more,
                        attributes: more_attrs,
                    },
                ) if attributes == more_attrs => {
                    insert.push_str(more);
                    true
                }
                (
                    DeltaOp::Retain { retain, attributes },
                    DeltaOp::Retain {
                        retain: more,
                        attributes: more_attrs,
                    },
                ) if attributes == more_attrs => {
                    *retain += more;
                    true
                }
                _ => false,
            };
            if merged {
                return self;
            }
        }

        self.ops.insert(index, op);
        self
    }

    /// Total length of all runs. For a document delta this is the text length.
    pub fn len(&self) -> usize {
        self.ops.iter().map(DeltaOp::len).sum()
    }

    /// Concatenated insert text, attributes dropped.
    pub fn plain_text(&self) -> String {
        self.ops
            .iter()
            .filter_map(|op| match op {
                DeltaOp::Insert { insert, .. } => Some(insert.as_str()),
                _ => None,
            })
            .collect()
    }

    /// The runs covering `[start, end)`; `None` means "to the end".
    pub fn slice(&self, start: usize, end: Option<usize>) -> TextDelta {
        let end = end.unwrap_or(usize::MAX);
        let mut out = TextDelta::new();
        let mut pos = 0;
        for op in &self.ops {
            if pos >= end {
                break;
            }
            let len = op.len();
            let op_end = pos + len;
            if op_end > start {
                let from = start.saturating_sub(pos);
                let to = end.min(op_end) - pos;
                out.push(op.sub(from, to - from));
            }
            pos = op_end;
        }
        out
    }

    /// `self` followed by `other`.
    pub fn concat(&self, other: &TextDelta) -> TextDelta {
        let mut out = self.clone();
        for op in &other.ops {
            out.push(op.clone());
        }
        out
    }

    /// Apply the change `other` on top of `self`.
    pub fn compose(&self, other: &TextDelta) -> TextDelta {
        let mut a = OpCursor::new(&self.ops);
        let mut b = OpCursor::new(&other.ops);
        let mut out = TextDelta::new();

        while a.has_next() || b.has_next() {
            if matches!(b.peek(), Some(DeltaOp::Insert { .. })) {
                out.push(b.next(usize::MAX));
                continue;
            }
            if matches!(a.peek(), Some(DeltaOp::Delete { .. })) {
                out.push(a.next(usize::MAX));
                continue;
            }

            let len = a.peek_len().min(b.peek_len());
            let a_op = a.next(len);
            let b_op = b.next(len);
            match (a_op, b_op) {
                (
                    DeltaOp::Retain { attributes, .. },
                    DeltaOp::Retain {
                        attributes: change, ..
                    },
                ) => {
                    out.push(DeltaOp::Retain {
                        retain: len,
                        attributes: compose_attributes(&attributes, &change, true),
                    });
                }
                (
                    DeltaOp::Insert { insert, attributes },
                    DeltaOp::Retain {
                        attributes: change, ..
                    },
                ) => {
                    out.push(DeltaOp::Insert {
                        insert,
                        attributes: compose_attributes(&attributes, &change, false),
                    });
                }
                (DeltaOp::Retain { .. }, DeltaOp::Delete { .. }) => {
                    out.push(DeltaOp::Delete { delete: len });
                }
                // Insert followed by delete cancels out.
                _ => {}
            }
        }

        out.chop();
        out
    }

    /// Drop a trailing unformatted retain, which is a no-op.
    fn chop(&mut self) {
        if let Some(DeltaOp::Retain { attributes, .. }) = self.ops.last() {
            if attributes.is_empty() {
                self.ops.pop();
            }
        }
    }
}

impl FromIterator<DeltaOp> for TextDelta {
    fn from_iter<I: IntoIterator<Item = DeltaOp>>(iter: I) -> Self {
        let mut delta = TextDelta::new();
        for op in iter {
            delta.push(op);
        }
        delta
    }
}

fn compose_attributes(base: &Attributes, change: &Attributes, keep_null: bool) -> Attributes {
    let mut out: Attributes = change
        .iter()
        .filter(|(_, v)| keep_null || !v.is_null())
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    for (key, value) in base {
        if !change.contains_key(key) {
            out.insert(key.clone(), value.clone());
        }
    }
    out
}

/// Walks a run list, handing out pieces of at most a requested length.
/// Past the end it yields an endless plain retain.
struct OpCursor<'a> {
    ops: &'a [DeltaOp],
    index: usize,
    offset: usize,
}

impl<'a> OpCursor<'a> {
    fn new(ops: &'a [DeltaOp]) -> Self {
        Self {
            ops,
            index: 0,
            offset: 0,
        }
    }

    fn has_next(&self) -> bool {
        self.index < self.ops.len()
    }

    fn peek(&self) -> Option<&DeltaOp> {
        self.ops.get(self.index)
    }

    fn peek_len(&self) -> usize {
        self.peek()
            .map(|op| op.len() - self.offset)
            .unwrap_or(usize::MAX)
    }

    fn next(&mut self, max: usize) -> DeltaOp {
        let Some(op) = self.ops.get(self.index) else {
            return DeltaOp::retain(max);
        };
        let remaining = op.len() - self.offset;
        let take = remaining.min(max);
        let piece = if self.offset == 0 && take == remaining {
            op.clone()
        } else {
            op.sub(self.offset, take)
        };
        if take == remaining {
            self.index += 1;
            self.offset = 0;
        } else {
            self.offset += take;
        }
        piece
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bold() -> Attributes {
        let mut attrs = Attributes::new();
        attrs.insert("bold".into(), json!(true));
        attrs
    }

    #[test]
    fn test_utf16_lengths() {
        assert_eq!(utf16_len("hello"), 5);
        assert_eq!(utf16_len("héllo"), 5);
        assert_eq!(utf16_len("a😀b"), 4);
        assert_eq!(split_at_utf16("a😀b", 1), ("a", "😀b"));
        assert_eq!(split_at_utf16("a😀b", 3), ("a😀", "b"));
        // Inside the surrogate pair rounds up.
        assert_eq!(split_at_utf16("a😀b", 2), ("a😀", "b"));
        assert_eq!(split_at_utf16("ab", 9), ("ab", ""));
    }

    #[test]
    fn test_push_merges_runs() {
        let mut delta = TextDelta::new();
        delta.insert("Hel", Attributes::new());
        delta.insert("lo", Attributes::new());
        delta.insert(" World", bold());
        assert_eq!(delta.ops().len(), 2);
        assert_eq!(delta.plain_text(), "Hello World");
        assert_eq!(delta.len(), 11);
    }

    #[test]
    fn test_push_puts_insert_before_delete() {
        let mut delta = TextDelta::new();
        delta.retain(2, Attributes::new());
        delta.delete(3);
        delta.insert("x", Attributes::new());
        assert_eq!(
            delta.ops(),
            &[DeltaOp::retain(2), DeltaOp::insert("x"), DeltaOp::delete(3)]
        );
    }

    #[test]
    fn test_slice_across_runs() {
        let mut delta = TextDelta::new();
        delta.insert("Hello", Attributes::new());
        delta.insert(" World", bold());

        let tail = delta.slice(5, None);
        assert_eq!(tail.plain_text(), " World");
        assert_eq!(tail.ops()[0].attributes(), Some(&bold()));

        let middle = delta.slice(3, Some(8));
        assert_eq!(middle.plain_text(), "lo Wo");
        assert_eq!(middle.ops().len(), 2);

        assert!(delta.slice(11, None).is_empty());
    }

    #[test]
    fn test_concat_joins_matching_runs() {
        let a = TextDelta::from_text("Hi ");
        let b = TextDelta::from_text("Hello");
        let joined = a.concat(&b);
        assert_eq!(joined.ops().len(), 1);
        assert_eq!(joined.plain_text(), "Hi Hello");
    }

    #[test]
    fn test_compose_insert_and_delete() {
        let doc = TextDelta::from_text("Hello World");
        let change: TextDelta = [DeltaOp::retain(5), DeltaOp::delete(6), DeltaOp::insert("!")]
            .into_iter()
            .collect();
        assert_eq!(doc.compose(&change).plain_text(), "Hello!");
    }

    #[test]
    fn test_compose_format_and_unformat() {
        let doc = TextDelta::from_text("Hello World");
        let mut change = TextDelta::new();
        change.retain(6, Attributes::new());
        change.retain(5, bold());
        let formatted = doc.compose(&change);
        assert_eq!(formatted.ops().len(), 2);
        assert_eq!(formatted.ops()[1].attributes(), Some(&bold()));

        let mut unbold = Attributes::new();
        unbold.insert("bold".into(), serde_json::Value::Null);
        let mut undo = TextDelta::new();
        undo.retain(6, Attributes::new());
        undo.retain(5, unbold);
        assert_eq!(formatted.compose(&undo), doc);
    }

    #[test]
    fn test_compose_insert_then_delete_cancels() {
        let doc = TextDelta::from_text("ab");
        let change: TextDelta = [DeltaOp::delete(1)].into_iter().collect();
        assert_eq!(doc.compose(&change).plain_text(), "b");
    }

    #[test]
    fn test_json_shape() {
        let mut delta = TextDelta::new();
        delta.insert("Hi", bold());
        delta.insert(" there", Attributes::new());
        let json = serde_json::to_value(&delta).unwrap();
        assert_eq!(
            json,
            json!([{"insert": "Hi", "attributes": {"bold": true}}, {"insert": " there"}])
        );

        let parsed: TextDelta =
            serde_json::from_value(json!([{"retain": 3}, {"delete": 2}, {"insert": "x"}])).unwrap();
        assert_eq!(parsed.ops()[0], DeltaOp::retain(3));
        assert_eq!(parsed.ops()[1], DeltaOp::delete(2));
    }
}
