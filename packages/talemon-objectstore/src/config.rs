//! Typed configuration for the object-store backend. Kept separate from
//! `talemon-core::config` (which owns the TOML tree) so this crate stays
//! usable without pulling in the CLI-facing config crate.

use serde::{Deserialize, Serialize};

/// The concrete blob backend. Local filesystem for development and
/// integration tests, S3-compatible for production — swappable without
/// touching worker/extractor code since both implement `object_store::ObjectStore`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase", deny_unknown_fields)]
pub enum ObjectStoreBackend {
    Local {
        /// Directory backing the local store; created on first use.
        root: String,
    },
    S3 {
        bucket: String,
        region: String,
        #[serde(default)]
        endpoint: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectStoreConfig {
    // `deny_unknown_fields` cannot be combined with `#[serde(flatten)]`; the
    // tagged enum below already rejects unrecognized variants and fields, so
    // strictness is preserved at the variant level even without it here.
    #[serde(flatten)]
    pub backend: ObjectStoreBackend,
}

impl Default for ObjectStoreConfig {
    fn default() -> Self {
        Self {
            backend: ObjectStoreBackend::Local {
                root: "./data/objectstore".to_string(),
            },
        }
    }
}
