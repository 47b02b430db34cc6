use std::{
    fs::Permissions,
    path::{Path, PathBuf},
};

use redb::{Database, ReadableDatabase, ReadableTableMetadata, TableDefinition};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    embedding::{EmbedderDescriptor, InputPolicy},
    error::{Error, Result},
    passage::{Passage, SourceRef},
};

const META: TableDefinition<&str, &str> = TableDefinition::new("meta");
const PASSAGES: TableDefinition<u64, &[u8]> = TableDefinition::new("passages");
const VECTORS: TableDefinition<u64, &[u8]> = TableDefinition::new("vectors");

const META_FORMAT_VERSION: &str = "format_version";
const META_BINDING: &str = "binding";
const META_PASSAGE_COUNT: &str = "passage_count";

/// Bumped whenever the table layout changes.
pub const FORMAT_VERSION: u32 = 1;

/// Header size: 4 bytes vector dimension.
const HEADER_SIZE: usize = 4;

/// The embedding function and input rule an index was built with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexBinding {
    pub embedder: EmbedderDescriptor,
    pub input: InputPolicy,
}

/// Write a complete index to `dest`, replacing any previous file atomically.
///
/// The database is built in a temporary file next to `dest` and renamed over
/// it only after the final commit, so a failed build leaves the old artifact
/// in place.
///
/// Binary format per vector entry:
/// - 4 bytes: dimension D (u32 LE)
/// - D * 4 bytes: f32 LE values
pub fn write_index(
    dest: &Path,
    binding: &IndexBinding,
    entries: &[(Passage, Vec<f32>)],
) -> Result<()> {
    let persistence = |reason: String| Error::IndexPersistence {
        path: dest.to_path_buf(),
        reason,
    };

    let parent = match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent)
        .map_err(|e| persistence(format!("cannot create {}: {e}", parent.display())))?;

    let tmp = tempfile::Builder::new()
        .prefix(".versebert-index-")
        .suffix(".tmp")
        .tempfile_in(&parent)
        .map_err(|e| persistence(format!("cannot create temporary file: {e}")))?;

    write_tables(tmp.path(), binding, entries)
        .map_err(|e| persistence(e.to_string()))?;

    if let Some(permissions) = artifact_permissions(dest) {
        std::fs::set_permissions(tmp.path(), permissions)
            .map_err(|e| persistence(format!("cannot set permissions: {e}")))?;
    }

    tmp.persist(dest)
        .map_err(|e| persistence(format!("cannot replace artifact: {}", e.error)))?;

    info!(path = %dest.display(), passages = entries.len(), "index written");
    Ok(())
}

/// Mode for the replacement artifact: the previous artifact's, or 0644.
#[cfg(unix)]
fn artifact_permissions(dest: &Path) -> Option<Permissions> {
    use std::os::unix::fs::PermissionsExt;

    Some(
        std::fs::metadata(dest)
            .ok()
            .filter(|m| m.is_file())
            .map_or_else(|| Permissions::from_mode(0o644), |m| m.permissions()),
    )
}

#[cfg(not(unix))]
fn artifact_permissions(dest: &Path) -> Option<Permissions> {
    std::fs::metadata(dest)
        .ok()
        .filter(|m| m.is_file())
        .map(|m| m.permissions())
}

fn write_tables(
    path: &Path,
    binding: &IndexBinding,
    entries: &[(Passage, Vec<f32>)],
) -> Result<()> {
    let binding_json = serde_json::to_string(binding)
        .map_err(|e| Error::Config(format!("cannot serialize binding: {e}")))?;

    let db = Database::create(path)?;
    let txn = db.begin_write()?;
    {
        let mut meta = txn.open_table(META)?;
        meta.insert(META_FORMAT_VERSION, FORMAT_VERSION.to_string().as_str())?;
        meta.insert(META_BINDING, binding_json.as_str())?;
        meta.insert(META_PASSAGE_COUNT, entries.len().to_string().as_str())?;

        let mut passages = txn.open_table(PASSAGES)?;
        let mut vectors = txn.open_table(VECTORS)?;
        for (ordinal, (passage, vector)) in entries.iter().enumerate() {
            if vector.len() != binding.embedder.dimension {
                return Err(Error::InvalidArgument(format!(
                    "{} has a vector of dimension {}, expected {}",
                    passage.citation(),
                    vector.len(),
                    binding.embedder.dimension
                )));
            }

            let key = ordinal as u64;
            let encoded = serde_json::to_vec(passage).map_err(|e| {
                Error::Config(format!("cannot serialize {}: {e}", passage.citation()))
            })?;
            passages.insert(key, encoded.as_slice())?;

            let byte_len = HEADER_SIZE + std::mem::size_of_val(vector.as_slice());
            let mut guard = vectors.insert_reserve(key, byte_len)?;
            let dest = guard.as_mut();
            dest[0..4].copy_from_slice(&(vector.len() as u32).to_le_bytes());
            dest[HEADER_SIZE..].copy_from_slice(bytemuck::cast_slice(vector.as_slice()));
        }
    }
    txn.commit()?;
    Ok(())
}

/// A loaded index: every passage and its vector, held in memory.
///
/// Immutable after [`VerseIndex::load`]; safe to share across threads.
pub struct VerseIndex {
    path: PathBuf,
    binding: IndexBinding,
    passages: Vec<Passage>,
    /// Row-major `[passages.len(), dimension]`.
    vectors: Vec<f32>,
}

impl VerseIndex {
    /// Load an index artifact.
    ///
    /// Fails with [`Error::IndexNotFound`] when the file is missing and
    /// [`Error::IndexFormat`] when it cannot be read as a complete index.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::IndexNotFound(path.to_path_buf()));
        }

        let format_err = |reason: String| Error::IndexFormat {
            path: path.to_path_buf(),
            reason,
        };

        let index = read_tables(path).map_err(|e| match e {
            Error::IndexFormat { .. } => e,
            other => format_err(other.to_string()),
        })?;

        info!(
            path = %path.display(),
            passages = index.passages.len(),
            model = %index.binding.embedder.model_id,
            dimension = index.binding.embedder.dimension,
            "index loaded"
        );
        Ok(index)
    }

    /// Verify that vectors from `descriptor` are comparable with the stored
    /// ones.
    pub fn check_binding(&self, descriptor: &EmbedderDescriptor) -> Result<()> {
        let stored = &self.binding.embedder;
        if stored == descriptor {
            return Ok(());
        }
        Err(Error::IndexFormat {
            path: self.path.clone(),
            reason: format!(
                "built with {} (dimension {}), but the configured embedder is {} (dimension {})",
                stored.model_id, stored.dimension, descriptor.model_id, descriptor.dimension
            ),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn binding(&self) -> &IndexBinding {
        &self.binding
    }

    pub fn dimension(&self) -> usize {
        self.binding.embedder.dimension
    }

    pub fn len(&self) -> usize {
        self.passages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    pub fn passages(&self) -> &[Passage] {
        &self.passages
    }

    pub fn passage(&self, ordinal: usize) -> Option<&Passage> {
        self.passages.get(ordinal)
    }

    /// Look up a passage by its citation (`"John 3:16"`).
    pub fn find(&self, citation: &str) -> Result<&Passage> {
        let wanted = SourceRef::parse_citation(citation).ok_or_else(|| {
            Error::InvalidArgument(format!(
                "'{citation}' is not a citation (expected e.g. \"John 3:16\")"
            ))
        })?;
        self.passages
            .iter()
            .find(|p| p.source_ref == wanted)
            .ok_or_else(|| Error::NotFound {
                kind: "passage",
                name: citation.to_string(),
            })
    }

    /// The stored vector of the passage at `ordinal`.
    pub fn vector(&self, ordinal: usize) -> Option<&[f32]> {
        let d = self.dimension();
        self.vectors.get(ordinal * d..(ordinal + 1) * d)
    }

    /// All vectors as one row-major slice.
    pub fn vectors(&self) -> &[f32] {
        &self.vectors
    }
}

impl std::fmt::Debug for VerseIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerseIndex")
            .field("path", &self.path)
            .field("binding", &self.binding)
            .field("passages", &self.passages.len())
            .finish_non_exhaustive()
    }
}

fn read_tables(path: &Path) -> Result<VerseIndex> {
    let format_err = |reason: String| Error::IndexFormat {
        path: path.to_path_buf(),
        reason,
    };

    let db = Database::open(path)?;
    let txn = db.begin_read()?;

    let meta = txn.open_table(META)?;
    let meta_value = |key: &str| -> Result<String> {
        meta.get(key)?
            .map(|v| v.value().to_string())
            .ok_or_else(|| format_err(format!("missing metadata key '{key}'")))
    };

    let version: u32 = meta_value(META_FORMAT_VERSION)?
        .parse()
        .map_err(|_| format_err("unreadable format version".to_string()))?;
    if version != FORMAT_VERSION {
        return Err(format_err(format!(
            "format version {version} is not supported (expected {FORMAT_VERSION})"
        )));
    }

    let binding: IndexBinding = serde_json::from_str(&meta_value(META_BINDING)?)
        .map_err(|e| format_err(format!("unreadable embedding binding: {e}")))?;
    let expected: usize = meta_value(META_PASSAGE_COUNT)?
        .parse()
        .map_err(|_| format_err("unreadable passage count".to_string()))?;
    let dimension = binding.embedder.dimension;
    if dimension == 0 {
        return Err(format_err("recorded dimension is zero".to_string()));
    }

    let passages_table = txn.open_table(PASSAGES)?;
    let vectors_table = txn.open_table(VECTORS)?;
    let stored_passages = passages_table.len()? as usize;
    let stored_vectors = vectors_table.len()? as usize;
    if stored_passages != expected || stored_vectors != expected {
        return Err(format_err(format!(
            "expected {expected} entries, found {stored_passages} passages and {stored_vectors} vectors"
        )));
    }

    let row_len = dimension
        .checked_mul(4)
        .and_then(|n| n.checked_add(HEADER_SIZE))
        .ok_or_else(|| format_err(format!("recorded dimension {dimension} is out of range")))?;

    // Size every buffer from stored data, never from the metadata alone.
    if expected > 0 {
        let first = vectors_table
            .get(0u64)?
            .ok_or_else(|| format_err("vector 0 is missing".to_string()))?;
        if first.value().len() != row_len {
            return Err(format_err(format!(
                "vector 0 holds {} bytes, but dimension {dimension} needs {row_len}",
                first.value().len()
            )));
        }
    }

    let mut passages = Vec::with_capacity(expected);
    let mut vectors = Vec::with_capacity(expected.saturating_mul(dimension));

    for ordinal in 0..expected as u64 {
        let passage_bytes = passages_table
            .get(ordinal)?
            .ok_or_else(|| format_err(format!("passage {ordinal} is missing")))?;
        let passage: Passage = serde_json::from_slice(passage_bytes.value())
            .map_err(|e| format_err(format!("passage {ordinal} is unreadable: {e}")))?;
        if passage.source_ref.major == 0 || passage.source_ref.minor == 0 {
            return Err(format_err(format!(
                "passage {ordinal} has a zero chapter or verse number"
            )));
        }

        let vector_bytes = vectors_table
            .get(ordinal)?
            .ok_or_else(|| format_err(format!("vector {ordinal} is missing")))?;
        let bytes = vector_bytes.value();
        if bytes.len() < HEADER_SIZE {
            return Err(format_err(format!("vector {ordinal} is truncated")));
        }
        let stored_dim = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        if stored_dim != dimension || bytes.len() != row_len {
            return Err(format_err(format!(
                "vector {ordinal} has dimension {stored_dim}, expected {dimension}"
            )));
        }
        // redb values carry no alignment guarantee, so decode by chunks.
        vectors.extend(
            bytes[HEADER_SIZE..]
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]])),
        );

        passages.push(passage);
    }

    debug!(passages = passages.len(), dimension, "read index tables");
    Ok(VerseIndex {
        path: path.to_path_buf(),
        binding,
        passages,
        vectors,
    })
}
