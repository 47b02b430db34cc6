use std::{
    path::Path,
    sync::Mutex,
    time::{Duration, Instant},
};

use kdam::{BarExt, tqdm};
use rayon::prelude::*;
use tracing::{debug, info};

use crate::{
    corpus::{self, Corpus},
    embedding::{Embedder, InputPolicy},
    error::{Error, Result},
    index_db::{self, IndexBinding},
    passage::Passage,
};

pub const DEFAULT_BATCH_SIZE: usize = 32;

#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub batch_size: usize,
    pub input: InputPolicy,
    pub progress: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            input: InputPolicy::default(),
            progress: false,
        }
    }
}

/// Summary of a finished build.
#[derive(Debug, Clone)]
pub struct IndexStats {
    pub passages: usize,
    pub dimension: usize,
    pub model_id: String,
    pub elapsed: Duration,
}

/// Load, flatten, embed, and persist a corpus file in one go.
pub fn index_corpus_file(
    corpus_path: &Path,
    embedder: &dyn Embedder,
    dest: &Path,
    options: &BuildOptions,
) -> Result<IndexStats> {
    let corpus = Corpus::load(corpus_path)?;
    info!(
        corpus = %corpus_path.display(),
        collections = corpus.collections.len(),
        units = corpus.unit_count(),
        "corpus loaded"
    );
    let passages = corpus::flatten(&corpus);
    build_index(passages, embedder, dest, options)
}

/// Embed every passage and write the index to `dest`.
///
/// Batches are embedded in parallel; vectors are reassembled in passage
/// order before anything is written, so the artifact does not depend on
/// scheduling. Any failure aborts the build without touching `dest`.
pub fn build_index(
    passages: Vec<Passage>,
    embedder: &dyn Embedder,
    dest: &Path,
    options: &BuildOptions,
) -> Result<IndexStats> {
    let started = Instant::now();
    if options.batch_size == 0 {
        return Err(Error::InvalidArgument(
            "batch size must be positive".to_string(),
        ));
    }

    let descriptor = embedder.descriptor()?;
    info!(
        model = %descriptor.model_id,
        dimension = descriptor.dimension,
        passages = passages.len(),
        "embedding passages"
    );

    // Input policy first: a rejected passage should fail before any model work.
    let inputs: Vec<String> = passages
        .iter()
        .map(|p| {
            options
                .input
                .prepare(&p.text, &p.citation())
                .map(|text| text.into_owned())
        })
        .collect::<Result<_>>()?;

    let progress = options.progress.then(|| {
        Mutex::new(tqdm!(
            total = passages.len(),
            desc = "Embedding",
            unit = " verses"
        ))
    });

    let batches: Vec<Vec<Vec<f32>>> = inputs
        .par_chunks(options.batch_size)
        .zip(passages.par_chunks(options.batch_size))
        .map(|(texts, batch)| {
            let vectors = embedder
                .embed_batch(texts)
                .map_err(|e| with_batch_context(e, batch))?;

            if vectors.len() != texts.len() {
                return Err(Error::provider(
                    batch_span(batch),
                    format!("expected {} vectors, got {}", texts.len(), vectors.len()),
                ));
            }
            if let Some((p, v)) = batch
                .iter()
                .zip(&vectors)
                .find(|(_, v)| v.len() != descriptor.dimension)
            {
                return Err(Error::provider(
                    p.citation(),
                    format!(
                        "vector has dimension {}, expected {}",
                        v.len(),
                        descriptor.dimension
                    ),
                ));
            }

            if let Some(bar) = &progress
                && let Ok(mut bar) = bar.lock()
            {
                let _ = bar.update(texts.len());
            }
            debug!(batch = %batch_span(batch), "embedded batch");
            Ok(vectors)
        })
        .collect::<Result<_>>()?;

    if let Some(bar) = progress
        && let Ok(mut bar) = bar.into_inner()
    {
        let _ = bar.refresh();
        eprintln!();
    }

    let count = passages.len();
    let entries: Vec<(Passage, Vec<f32>)> =
        passages.into_iter().zip(batches.into_iter().flatten()).collect();

    let binding = IndexBinding {
        embedder: descriptor.clone(),
        input: options.input,
    };
    index_db::write_index(dest, &binding, &entries)?;

    let stats = IndexStats {
        passages: count,
        dimension: descriptor.dimension,
        model_id: descriptor.model_id,
        elapsed: started.elapsed(),
    };
    info!(
        passages = stats.passages,
        elapsed_ms = stats.elapsed.as_millis() as u64,
        "build complete"
    );
    Ok(stats)
}

/// `"Genesis 1:1..Genesis 1:32"` for diagnostics.
fn batch_span(batch: &[Passage]) -> String {
    match (batch.first(), batch.last()) {
        (Some(first), Some(last)) if batch.len() > 1 => {
            format!("{}..{}", first.citation(), last.citation())
        }
        (Some(only), _) => only.citation(),
        _ => "empty batch".to_string(),
    }
}

fn with_batch_context(e: Error, batch: &[Passage]) -> Error {
    match e {
        Error::EmbeddingProvider { context, reason } => Error::EmbeddingProvider {
            context: format!("{context}; passages {}", batch_span(batch)),
            reason,
        },
        other => other,
    }
}
