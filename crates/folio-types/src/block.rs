//! Block schema: the closed set of block types and their data payloads.
//!
//! This is the contract with rendering components. A block's type decides
//! three things the editing algorithms care about:
//!
//! - whether it carries a text sequence ([`BlockType::has_text`]),
//! - whether it may own children ([`BlockType::is_container`]),
//! - whether Enter continues it as the same type ([`BlockType::is_list`]).
//!
//! Type-specific data travels as a JSON object ([`BlockData`]). On the
//! replicated document it is stored serialized as a string, which is how
//! every existing peer writes it.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::EnumString;

use crate::delta::TextDelta;
use crate::ids::{BlockId, TextId};

/// Maximum expected nesting depth of the block tree.
///
/// Subtree walks use this as a circuit breaker. Real documents rarely nest
/// past a dozen levels.
pub const MAX_NESTING_DEPTH: usize = 64;

/// What a block is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum BlockType {
    /// Document root. Exactly one per document.
    Page,
    #[default]
    Paragraph,
    /// `{level}` 1..=6.
    Heading,
    /// `{checked}`.
    TodoList,
    BulletedList,
    NumberedList,
    /// `{collapsed}`, optionally `{level}` when used as a toggle heading.
    ToggleList,
    Code,
    Equation,
    Embed,
    /// `{collapsed}`.
    Quote,
    Callout,
    Divider,
    Media,
    Table,
    Column,
}

impl BlockType {
    /// Parse from string (case-insensitive).
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        <Self as FromStr>::from_str(s).ok()
    }

    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockType::Page => "page",
            BlockType::Paragraph => "paragraph",
            BlockType::Heading => "heading",
            BlockType::TodoList => "todo_list",
            BlockType::BulletedList => "bulleted_list",
            BlockType::NumberedList => "numbered_list",
            BlockType::ToggleList => "toggle_list",
            BlockType::Code => "code",
            BlockType::Equation => "equation",
            BlockType::Embed => "embed",
            BlockType::Quote => "quote",
            BlockType::Callout => "callout",
            BlockType::Divider => "divider",
            BlockType::Media => "media",
            BlockType::Table => "table",
            BlockType::Column => "column",
        }
    }

    /// Types that own a text sequence.
    pub fn has_text(&self) -> bool {
        !matches!(
            self,
            BlockType::Divider
                | BlockType::Embed
                | BlockType::Media
                | BlockType::Table
                | BlockType::Column
        )
    }

    /// Types that may hold child blocks. Indenting under anything else is a
    /// no-op, and merging into anything else lifts the children instead.
    pub fn is_container(&self) -> bool {
        matches!(
            self,
            BlockType::Page
                | BlockType::ToggleList
                | BlockType::TodoList
                | BlockType::BulletedList
                | BlockType::NumberedList
                | BlockType::Quote
                | BlockType::Callout
                | BlockType::Column
        )
    }

    /// List variants: splitting one yields another item of the same list.
    pub fn is_list(&self) -> bool {
        matches!(
            self,
            BlockType::TodoList
                | BlockType::BulletedList
                | BlockType::NumberedList
                | BlockType::ToggleList
        )
    }

    /// Types with an expanded/collapsed state.
    pub fn is_collapsible(&self) -> bool {
        matches!(self, BlockType::ToggleList | BlockType::Quote)
    }

    /// Type of the block created by splitting a block of this type at a
    /// non-zero offset. An open toggle puts the tail inside itself as a
    /// paragraph; a collapsed one continues as a toggle.
    pub fn split_type(&self, data: &BlockData) -> BlockType {
        match self {
            BlockType::ToggleList if data.is_open() => BlockType::Paragraph,
            t if t.is_list() => *t,
            _ => BlockType::Paragraph,
        }
    }
}

impl std::fmt::Display for BlockType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Type-specific block payload, a JSON object.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockData(Map<String, Value>);

impl BlockData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the serialized form stored on the document. Empty or malformed
    /// strings and non-object JSON yield empty data.
    pub fn from_json_str(s: &str) -> Self {
        match serde_json::from_str::<Value>(s) {
            Ok(Value::Object(map)) => Self(map),
            _ => Self::default(),
        }
    }

    pub fn to_json_string(&self) -> String {
        Value::Object(self.0.clone()).to_string()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn set(&mut self, key: &str, value: Value) -> &mut Self {
        self.0.insert(key.to_string(), value);
        self
    }

    pub fn with(mut self, key: &str, value: Value) -> Self {
        self.set(key, value);
        self
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Inline text stored by older clients that predate the text map.
    pub fn delta(&self) -> Option<TextDelta> {
        self.0
            .get("delta")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn checked(&self) -> bool {
        self.0.get("checked").and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn level(&self) -> Option<u64> {
        self.0.get("level").and_then(Value::as_u64)
    }

    pub fn collapsed(&self) -> bool {
        self.0.get("collapsed").and_then(Value::as_bool).unwrap_or(false)
    }

    /// Expanded, i.e. not explicitly collapsed.
    pub fn is_open(&self) -> bool {
        !self.collapsed()
    }

    /// Data for the block created by a split: inline text is never copied
    /// and a todo item starts unchecked.
    pub fn for_split(&self) -> BlockData {
        let mut data = self.clone();
        data.remove("delta");
        if data.0.contains_key("checked") {
            data.set("checked", Value::Bool(false));
        }
        data
    }
}

/// Serializable view of one block as stored on the document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlockSnapshot {
    pub id: BlockId,
    pub ty: BlockType,
    /// Absent only on the page root (or a block not yet attached).
    pub parent: Option<BlockId>,
    /// Key into the children map; conventionally equal to `id`.
    pub children_id: BlockId,
    /// Key into the text map, for text-bearing types.
    pub external_id: Option<TextId>,
    pub external_type: Option<String>,
    pub data: BlockData,
}

impl BlockSnapshot {
    /// The text id this block reads and writes, falling back to its own id
    /// when the block was written without one.
    pub fn text_id(&self) -> Option<TextId> {
        if !self.ty.has_text() {
            return None;
        }
        Some(
            self.external_id
                .clone()
                .unwrap_or_else(|| self.id.text_id()),
        )
    }

    pub fn is_page(&self) -> bool {
        self.ty == BlockType::Page
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_block_type_strings() {
        assert_eq!(BlockType::from_str("todo_list"), Some(BlockType::TodoList));
        assert_eq!(BlockType::from_str("Toggle_List"), Some(BlockType::ToggleList));
        assert_eq!(BlockType::from_str("nope"), None);
        assert_eq!(BlockType::BulletedList.to_string(), "bulleted_list");

        let json = serde_json::to_string(&BlockType::NumberedList).unwrap();
        assert_eq!(json, "\"numbered_list\"");
    }

    #[test]
    fn test_as_str_matches_serde() {
        for ty in [
            BlockType::Page,
            BlockType::Heading,
            BlockType::ToggleList,
            BlockType::Divider,
            BlockType::Column,
        ] {
            let json = serde_json::to_value(ty).unwrap();
            assert_eq!(json, json!(ty.as_str()));
        }
    }

    #[test]
    fn test_type_predicates() {
        assert!(BlockType::ToggleList.is_container());
        assert!(!BlockType::Paragraph.is_container());
        assert!(!BlockType::Heading.is_container());
        assert!(BlockType::TodoList.is_list());
        assert!(!BlockType::Quote.is_list());
        assert!(!BlockType::Divider.has_text());
        assert!(BlockType::Code.has_text());
        assert!(BlockType::Quote.is_collapsible());
    }

    #[test]
    fn test_split_type() {
        let open = BlockData::new();
        let closed = BlockData::new().with("collapsed", json!(true));
        assert_eq!(BlockType::ToggleList.split_type(&open), BlockType::Paragraph);
        assert_eq!(BlockType::ToggleList.split_type(&closed), BlockType::ToggleList);
        assert_eq!(BlockType::TodoList.split_type(&open), BlockType::TodoList);
        assert_eq!(BlockType::Heading.split_type(&open), BlockType::Paragraph);
    }

    #[test]
    fn test_block_data_parse_and_accessors() {
        let data = BlockData::from_json_str(r#"{"checked":true,"level":2,"delta":[{"insert":"hi"}]}"#);
        assert!(data.checked());
        assert_eq!(data.level(), Some(2));
        assert_eq!(data.delta().map(|d| d.plain_text()), Some("hi".to_string()));
        assert!(data.is_open());

        assert!(BlockData::from_json_str("").is_empty());
        assert!(BlockData::from_json_str("[1,2]").is_empty());
    }

    #[test]
    fn test_for_split_resets_item_state() {
        let data = BlockData::new()
            .with("checked", json!(true))
            .with("delta", json!([{"insert": "x"}]));
        let split = data.for_split();
        assert!(!split.checked());
        assert!(split.delta().is_none());

        assert!(BlockData::new().for_split().get("checked").is_none());
    }

    #[test]
    fn test_snapshot_text_id_fallback() {
        let id = BlockId::from("b1");
        let snap = BlockSnapshot {
            id: id.clone(),
            ty: BlockType::Paragraph,
            parent: None,
            children_id: id.clone(),
            external_id: None,
            external_type: None,
            data: BlockData::new(),
        };
        assert_eq!(snap.text_id(), Some(TextId::from("b1")));

        let divider = BlockSnapshot {
            ty: BlockType::Divider,
            ..snap
        };
        assert_eq!(divider.text_id(), None);
    }
}
