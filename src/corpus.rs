//! Scripture corpus model and flattening into passages.
//!
//! The on-disk format is the common "bible JSON" layout: an array of books,
//! each with a name and an array of chapters, each chapter an array of verse
//! strings.
//!
//! ```json
//! [{ "name": "Genesis", "chapters": [["In the beginning...", "And the earth was..."]] }]
//! ```

use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};
use tracing::warn;

use crate::{
    error::{Error, Result},
    passage::{Passage, SourceRef},
};

/// Label given to collections whose name is missing or unusable.
pub const UNKNOWN_COLLECTION: &str = "Unknown";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Corpus {
    pub collections: Vec<Collection>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection {
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub abbrev: Option<String>,
    #[serde(default, rename = "chapters", alias = "subdivisions")]
    pub subdivisions: Vec<Subdivision>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Subdivision {
    pub units: Vec<String>,
}

/// Accept any JSON value; keep it only if it is a string.
fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        _ => None,
    })
}

impl Collection {
    pub fn new(name: impl Into<String>, subdivisions: Vec<Vec<String>>) -> Self {
        Self {
            name: Some(name.into()),
            abbrev: None,
            subdivisions: subdivisions
                .into_iter()
                .map(|units| Subdivision { units })
                .collect(),
        }
    }

    fn usable_name(&self) -> Option<&str> {
        [self.name.as_deref(), self.abbrev.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|s| !s.is_empty())
    }

    /// Name used in citations: `name`, then `abbrev`, then the placeholder.
    pub fn display_name(&self) -> &str {
        self.usable_name().unwrap_or(UNKNOWN_COLLECTION)
    }

    pub fn unit_count(&self) -> usize {
        self.subdivisions.iter().map(|s| s.units.len()).sum()
    }
}

impl Corpus {
    /// Parse a corpus from JSON text. A leading UTF-8 BOM is ignored.
    pub fn from_json_str(path: &Path, content: &str) -> Result<Self> {
        let content = content.strip_prefix('\u{feff}').unwrap_or(content);
        serde_json::from_str(content).map_err(|e| Error::CorpusFormat {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Read and parse a corpus file.
    pub fn load(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| Error::CorpusFormat {
                path: path.to_path_buf(),
                reason: format!("unreadable: {e}"),
            })?;
        Self::from_json_str(path, &content)
    }

    pub fn unit_count(&self) -> usize {
        self.collections.iter().map(Collection::unit_count).sum()
    }
}

/// Flatten the corpus into passages in traversal order.
///
/// Chapter and verse indices become 1-based numbers in the citation.
pub fn flatten(corpus: &Corpus) -> Vec<Passage> {
    let mut passages = Vec::with_capacity(corpus.unit_count());

    for (position, collection) in corpus.collections.iter().enumerate() {
        let name = collection.display_name();
        if collection.usable_name().is_none() && collection.unit_count() > 0 {
            warn!(position, "collection has no usable name, using placeholder");
        }

        for (chapter_idx, chapter) in collection.subdivisions.iter().enumerate() {
            for (verse_idx, text) in chapter.units.iter().enumerate() {
                let source_ref = SourceRef::new(
                    name,
                    (chapter_idx + 1) as u32,
                    (verse_idx + 1) as u32,
                );
                passages.push(Passage::new(source_ref, text.as_str()));
            }
        }
    }

    passages
}
