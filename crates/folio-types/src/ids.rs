//! String identifiers for blocks and their text sequences.
//!
//! Ids are generated client-side from a UUIDv7 rendered as 32 hex characters,
//! so they are globally unique without coordination and sort roughly by
//! creation time. On the replicated document they are plain strings: peers
//! written in other languages may use any unique string (for instance 8-char
//! nanoids), so parsing never validates the format.
//!
//! A block's children-group id and external text id are conventionally equal
//! to the block id. [`TextId`] is kept as a separate type so that offset-based
//! APIs cannot be handed a block id by accident.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Identifier of a block in the blocks map.
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(Arc<str>);

/// Identifier of a text sequence in the text map.
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TextId(Arc<str>);

// ── Shared behavior ─────────────────────────────────────────────────────────

macro_rules! impl_string_id {
    ($T:ident, $name:literal) => {
        impl $T {
            /// Create a fresh, time-ordered id (UUIDv7 as 32 hex chars).
            pub fn new() -> Self {
                Self(Arc::from(uuid::Uuid::now_v7().as_simple().to_string()))
            }

            /// Wrap an existing id string as found on the replicated document.
            pub fn from_raw(raw: impl Into<Arc<str>>) -> Self {
                Self(raw.into())
            }

            /// The raw id string.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Last 8 characters. For log output only, never used as a lookup key.
            ///
            /// UUIDv7 ids share their timestamp prefix, so the tail is the
            /// distinguishing part.
            pub fn short(&self) -> &str {
                let start = self
                    .0
                    .char_indices()
                    .rev()
                    .nth(7)
                    .map(|(i, _)| i)
                    .unwrap_or(0);
                &self.0[start..]
            }
        }

        impl Default for $T {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<&str> for $T {
            fn from(s: &str) -> Self {
                Self(Arc::from(s))
            }
        }

        impl From<String> for $T {
            fn from(s: String) -> Self {
                Self(Arc::from(s))
            }
        }

        impl AsRef<str> for $T {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl fmt::Debug for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", $name, self.short())
            }
        }
    };
}

impl_string_id!(BlockId, "BlockId");
impl_string_id!(TextId, "TextId");

impl BlockId {
    /// The text id a freshly created block of this id uses.
    pub fn text_id(&self) -> TextId {
        TextId(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_ids_are_unique_hex() {
        let a = BlockId::new();
        let b = BlockId::new();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 32);
        assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_short_is_tail() {
        let id = BlockId::from("0123456789abcdef");
        assert_eq!(id.short(), "89abcdef");

        let tiny = BlockId::from("abc");
        assert_eq!(tiny.short(), "abc");
    }

    #[test]
    fn test_foreign_ids_accepted() {
        let id = BlockId::from("V1StGXR8");
        assert_eq!(id.as_str(), "V1StGXR8");
        assert_eq!(format!("{id:?}"), "BlockId(V1StGXR8)");
    }

    #[test]
    fn test_text_id_mirrors_block_id() {
        let id = BlockId::new();
        assert_eq!(id.text_id().as_str(), id.as_str());
    }

    #[test]
    fn test_serde_transparent() {
        let id = BlockId::from("page");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"page\"");
        let back: BlockId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
