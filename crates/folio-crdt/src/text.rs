//! Bridging between [`TextDelta`] and the replicated text type.

use std::collections::HashMap;
use std::sync::Arc;

use folio_types::{Attributes, DeltaOp, TextDelta};
use serde_json::Value;
use yrs::types::Attrs;
use yrs::types::text::YChange;
use yrs::{Any, Out, ReadTxn, Text, TextRef, TransactionMut};

/// Placeholder for a non-string embed inside a text sequence. Keeps offsets
/// aligned with the replicated text, where an embed counts as one unit.
const EMBED_PLACEHOLDER: &str = "\u{fffc}";

/// Offsets on the document are `u32`.
pub(crate) fn to_index(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

pub(crate) fn json_to_any(value: &Value) -> Any {
    match value {
        Value::Null => Any::Null,
        Value::Bool(b) => Any::Bool(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) if i.unsigned_abs() < (1 << 53) => Any::Number(i as f64),
            Some(i) => Any::BigInt(i),
            None => Any::Number(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => Any::String(Arc::from(s.as_str())),
        Value::Array(items) => Any::Array(items.iter().map(json_to_any).collect()),
        Value::Object(map) => Any::Map(Arc::new(
            map.iter()
                .map(|(k, v)| (k.clone(), json_to_any(v)))
                .collect::<HashMap<_, _>>(),
        )),
    }
}

pub(crate) fn any_to_json(any: &Any) -> Value {
    match any {
        Any::Null | Any::Undefined => Value::Null,
        Any::Bool(b) => Value::Bool(*b),
        Any::Number(n) if n.fract() == 0.0 && n.abs() < 9.0e15 => Value::from(*n as i64),
        Any::Number(n) => serde_json::Number::from_f64(*n)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Any::BigInt(i) => Value::from(*i),
        Any::String(s) => Value::String(s.to_string()),
        Any::Buffer(bytes) => Value::Array(bytes.iter().map(|b| Value::from(*b)).collect()),
        Any::Array(items) => Value::Array(items.iter().map(any_to_json).collect()),
        Any::Map(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), any_to_json(v)))
                .collect(),
        ),
    }
}

pub(crate) fn to_attrs(attributes: &Attributes) -> Attrs {
    attributes
        .iter()
        .map(|(k, v)| (Arc::from(k.as_str()), json_to_any(v)))
        .collect()
}

pub(crate) fn from_attrs(attrs: &Attrs) -> Attributes {
    attrs
        .iter()
        .map(|(k, v)| (k.to_string(), any_to_json(v)))
        .collect()
}

/// Full content of `text` as a document delta.
pub(crate) fn read_delta<T: ReadTxn>(text: &TextRef, txn: &T) -> TextDelta {
    text.diff(txn, YChange::identity)
        .into_iter()
        .map(|diff| {
            let insert = match diff.insert {
                Out::Any(Any::String(s)) => s.to_string(),
                _ => EMBED_PLACEHOLDER.to_string(),
            };
            let attributes = diff
                .attributes
                .map(|attrs| from_attrs(&attrs))
                .unwrap_or_default();
            DeltaOp::Insert { insert, attributes }
        })
        .collect()
}

/// Apply a change delta at the start of `text`.
///
/// Inserts always carry an explicit attribute set, so a run without
/// attributes does not inherit formatting from its left neighbour.
pub(crate) fn apply_delta(text: &TextRef, txn: &mut TransactionMut, delta: &TextDelta) {
    let mut cursor: u32 = 0;
    for op in delta.ops() {
        match op {
            DeltaOp::Insert { insert, attributes } => {
                text.insert_with_attributes(txn, cursor, insert, to_attrs(attributes));
                cursor += to_index(op.len());
            }
            DeltaOp::Retain { retain, attributes } => {
                let len = to_index(*retain);
                if !attributes.is_empty() {
                    text.format(txn, cursor, len, to_attrs(attributes));
                }
                cursor += len;
            }
            DeltaOp::Delete { delete } => {
                text.remove_range(txn, cursor, to_index(*delete));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use yrs::{Doc, GetString, OffsetKind, Options, Transact};

    fn utf16_doc() -> Doc {
        let mut options = Options::default();
        options.offset_kind = OffsetKind::Utf16;
        Doc::with_options(options)
    }

    #[test]
    fn test_json_any_roundtrip_shapes() {
        let value = json!({"bold": true, "size": 12, "ratio": 0.5, "font": "mono", "list": [1, null]});
        assert_eq!(any_to_json(&json_to_any(&value)), value);
    }

    #[test]
    fn test_apply_then_read_delta() {
        let doc = utf16_doc();
        let text = doc.get_or_insert_text("t");
        let mut bold = Attributes::new();
        bold.insert("bold".into(), json!(true));

        let mut delta = TextDelta::new();
        delta.insert("Hello ", Attributes::new());
        delta.insert("World", bold.clone());
        {
            let mut txn = doc.transact_mut();
            apply_delta(&text, &mut txn, &delta);
        }

        let txn = doc.transact();
        assert_eq!(text.get_string(&txn), "Hello World");
        assert_eq!(read_delta(&text, &txn), delta);
    }

    #[test]
    fn test_unformatted_insert_does_not_inherit() {
        let doc = utf16_doc();
        let text = doc.get_or_insert_text("t");
        let mut bold = Attributes::new();
        bold.insert("bold".into(), json!(true));

        let mut first = TextDelta::new();
        first.insert("ab", bold);
        let mut second = TextDelta::new();
        second.retain(2, Attributes::new());
        second.insert("c", Attributes::new());
        {
            let mut txn = doc.transact_mut();
            apply_delta(&text, &mut txn, &first);
            apply_delta(&text, &mut txn, &second);
        }

        let txn = doc.transact();
        let read = read_delta(&text, &txn);
        assert_eq!(read.ops().len(), 2);
        assert_eq!(read.ops()[1], DeltaOp::insert("c"));
    }

    #[test]
    fn test_delete_and_format_ops() {
        let doc = utf16_doc();
        let text = doc.get_or_insert_text("t");
        {
            let mut txn = doc.transact_mut();
            apply_delta(&text, &mut txn, &TextDelta::from_text("Hello World"));
            let mut change = TextDelta::new();
            change.retain(5, Attributes::new());
            change.delete(6);
            apply_delta(&text, &mut txn, &change);
        }
        let txn = doc.transact();
        assert_eq!(text.get_string(&txn), "Hello");
    }
}
