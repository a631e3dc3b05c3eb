//! Editor configuration, read from RON.
//!
//! ```ron
//! (
//!     replica_id: Some(7),
//!     history_limit: 200,
//!     max_nesting_depth: 32,
//!     log_filter: "folio_editor=debug",
//! )
//! ```
//!
//! Every field is optional; missing fields take their defaults.

use std::path::Path;

use folio_crdt::StoreOptions;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Fixed CRDT client id. Random when absent.
    pub replica_id: Option<u64>,
    /// Undo stack capacity.
    pub history_limit: usize,
    /// Hard limit for recursive subtree copies.
    pub max_nesting_depth: usize,
    /// `tracing` filter directive used by the binary.
    pub log_filter: String,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            replica_id: None,
            history_limit: 500,
            max_nesting_depth: folio_types::MAX_NESTING_DEPTH,
            log_filter: "info".to_string(),
        }
    }
}

impl EditorConfig {
    pub fn from_ron(text: &str) -> Result<Self, ConfigError> {
        Ok(ron::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_ron(&text)
    }

    /// Store options for a replica owned by this editor.
    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            client_id: self.replica_id,
            max_nesting_depth: self.max_nesting_depth,
        }
    }
}

/// Errors that can occur while loading the config file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON parse error: {0}")]
    Ron(#[from] ron::error::SpannedError),
}
