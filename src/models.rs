// src/models.rs

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Annotation key carrying the human readable name of a blob.
pub const ANNOTATION_TITLE: &str = "org.opencontainers.image.title";

/// Content-addressing record for one transferred unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    pub media_type: String,
    pub digest: String,
    /// Declared size in bytes.
    pub size: u64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl Descriptor {
    pub fn new(media_type: impl Into<String>, digest: impl Into<String>, size: u64) -> Self {
        Self {
            media_type: media_type.into(),
            digest: digest.into(),
            size,
            annotations: BTreeMap::new(),
        }
    }

    /// Attaches a title annotation.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.annotations
            .insert(ANNOTATION_TITLE.to_string(), title.into());
        self
    }

    pub fn title(&self) -> Option<&str> {
        self.annotations
            .get(ANNOTATION_TITLE)
            .map(String::as_str)
            .filter(|t| !t.is_empty())
    }

    /// The name shown for this descriptor: its title, or its media type.
    pub fn display_name(&self) -> &str {
        self.title().unwrap_or(&self.media_type)
    }
}

/// Verb labels shown next to a tracked line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompts {
    /// Shown while bytes are flowing.
    pub action: String,
    /// Shown once the transfer completed.
    pub done: String,
    pub exists: String,
    pub skipped: String,
    pub tagged: String,
}

impl Prompts {
    pub fn push() -> Self {
        Self {
            action: "Uploading".to_string(),
            done: "Uploaded".to_string(),
            exists: "Exists".to_string(),
            skipped: "Skipped".to_string(),
            tagged: "Tagged".to_string(),
        }
    }

    pub fn pull() -> Self {
        Self {
            action: "Downloading".to_string(),
            done: "Downloaded".to_string(),
            exists: "Exists".to_string(),
            skipped: "Skipped".to_string(),
            tagged: "Restored".to_string(),
        }
    }
}

impl Default for Prompts {
    fn default() -> Self {
        Self::push()
    }
}
