use std::{cmp::Ordering, path::Path};

use rayon::prelude::*;
use serde::Serialize;
use tracing::debug;

use crate::{
    embedding::Embedder,
    error::{Error, Result},
    index_db::VerseIndex,
    passage::Passage,
};

/// One ranked hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredPassage {
    pub rank: usize,
    pub score: f32,
    #[serde(flatten)]
    pub passage: Passage,
}

impl ScoredPassage {
    pub fn citation(&self) -> String {
        self.passage.citation()
    }
}

/// Query service over one loaded index.
///
/// Built once at startup and shared (`Arc<Retriever>`) by every request
/// handler. Holding a `Retriever` means the index loaded completely and the
/// embedder matches the index's recorded binding.
pub struct Retriever {
    index: VerseIndex,
    embedder: Box<dyn Embedder>,
}

impl Retriever {
    /// Load the index at `path` and bind it to `embedder`.
    pub fn open(path: &Path, embedder: Box<dyn Embedder>) -> Result<Self> {
        let index = VerseIndex::load(path)?;
        Self::new(index, embedder)
    }

    /// Bind an already-loaded index to `embedder`.
    pub fn new(index: VerseIndex, embedder: Box<dyn Embedder>) -> Result<Self> {
        let descriptor = embedder.descriptor()?;
        index.check_binding(&descriptor)?;
        Ok(Self { index, embedder })
    }

    pub fn index(&self) -> &VerseIndex {
        &self.index
    }

    /// Top-`k` passages for `text` by cosine similarity, best first.
    ///
    /// Returns `min(k, index.len())` results. Equal scores keep corpus
    /// order, so identical calls always return identical results.
    pub fn query(&self, text: &str, k: usize) -> Result<Vec<ScoredPassage>> {
        if k == 0 {
            return Err(Error::InvalidArgument(
                "k must be a positive integer".to_string(),
            ));
        }

        let input = self.index.binding().input.prepare(text, "query")?;
        let query = self.embedder.embed(&input)?;
        let dimension = self.index.dimension();
        if query.len() != dimension {
            return Err(Error::provider(
                "query",
                format!(
                    "vector has dimension {}, expected {dimension}",
                    query.len()
                ),
            ));
        }

        let hits = top_k(&query, self.index.vectors(), dimension, k);
        debug!(query = text, k, hits = hits.len(), "query answered");

        Ok(hits
            .into_iter()
            .enumerate()
            .map(|(i, (ordinal, score))| ScoredPassage {
                rank: i + 1,
                score,
                passage: self.index.passages()[ordinal].clone(),
            })
            .collect())
    }

    /// Look up a passage by its citation (`"John 3:16"`).
    pub fn get(&self, citation: &str) -> Result<&Passage> {
        self.index.find(citation)
    }
}

impl std::fmt::Debug for Retriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retriever")
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Descending score, then ascending ordinal.
fn rank_order(a: &(usize, f32), b: &(usize, f32)) -> Ordering {
    b.1.total_cmp(&a.1).then(a.0.cmp(&b.0))
}

/// Exact nearest-neighbour search over a row-major vector matrix.
fn top_k(query: &[f32], vectors: &[f32], dimension: usize, k: usize) -> Vec<(usize, f32)> {
    if dimension == 0 {
        return Vec::new();
    }
    let mut scored: Vec<(usize, f32)> = vectors
        .par_chunks_exact(dimension)
        .enumerate()
        .map(|(ordinal, row)| (ordinal, cosine(query, row)))
        .collect();

    if k < scored.len() {
        scored.select_nth_unstable_by(k - 1, rank_order);
        scored.truncate(k);
    }
    scored.sort_unstable_by(rank_order);
    scored
}

/// Format results for human-readable terminal output.
pub fn format_human(results: &[ScoredPassage]) {
    if results.is_empty() {
        println!("No results found.");
        return;
    }

    for r in results {
        println!("{:>3}. [{:.3}] {}", r.rank, r.score, r.citation());
        println!("     {}", r.passage.text);
    }
    println!("\n{} result(s)", results.len());
}

#[derive(Debug, Serialize)]
struct JsonResponse<'a> {
    query: &'a str,
    result_count: usize,
    results: Vec<JsonResult<'a>>,
}

#[derive(Debug, Serialize)]
struct JsonResult<'a> {
    rank: usize,
    score: f32,
    citation: String,
    collection: &'a str,
    chapter: u32,
    verse: u32,
    text: &'a str,
}

/// Format results as JSON output.
pub fn format_json(results: &[ScoredPassage], query: &str) -> Result<()> {
    let response = JsonResponse {
        query,
        result_count: results.len(),
        results: results
            .iter()
            .map(|r| JsonResult {
                rank: r.rank,
                score: r.score,
                citation: r.citation(),
                collection: &r.passage.source_ref.collection,
                chapter: r.passage.source_ref.major,
                verse: r.passage.source_ref.minor,
                text: &r.passage.text,
            })
            .collect(),
    };
    let json = serde_json::to_string(&response)
        .map_err(|e| Error::Config(format!("cannot serialize results: {e}")))?;
    println!("{json}");
    Ok(())
}
