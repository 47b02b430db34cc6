use std::sync::{Mutex, OnceLock};

use candle_core::{Device, Tensor};
use pylate_rs::ColBERT;
use tracing::{debug, info};

use crate::{
    embedding::{Embedder, EmbedderDescriptor, l2_normalize},
    error::{Error, Result},
};

pub const DEFAULT_MODEL_ID: &str = "lightonai/GTE-ModernColBERT-v1";
pub const MODEL_ENV_VAR: &str = "VERSEBERT_MODEL";

/// Text used to discover the model's output dimension.
const DIMENSION_SAMPLE: &str = "In the beginning was the Word";

/// Select the best available compute device.
///
/// Uses CUDA when compiled with the `cuda` feature, Metal when compiled with
/// the `metal` feature, and falls back to CPU otherwise.
fn default_device() -> Device {
    #[cfg(feature = "cuda")]
    {
        if let Ok(device) = Device::new_cuda(0) {
            return device;
        }
    }

    #[cfg(feature = "metal")]
    {
        if let Ok(device) = Device::new_metal(0) {
            return device;
        }
    }

    Device::Cpu
}

/// ColBERT-backed sentence embedder, loaded lazily on first use.
///
/// Passages and queries both go through the document-side encoder so the
/// two sides of a comparison come from the same function. Per-token vectors
/// are mean-pooled (padding rows skipped) and L2-normalised into a single
/// vector per text.
pub struct ModelManager {
    model: Mutex<Option<ColBERT>>,
    model_id: String,
    dimension: OnceLock<usize>,
}

impl ModelManager {
    /// Creates a `ModelManager` for `model_id` (HuggingFace id or local
    /// path). See `embedder_spec::resolve_model` for how the id is chosen.
    pub fn with_model_id(model_id: String) -> Self {
        Self {
            model: Mutex::new(None),
            model_id,
            dimension: OnceLock::new(),
        }
    }

    /// Encode texts into per-token embeddings, loading the model on first
    /// call (downloading from HuggingFace Hub if needed).
    fn encode(&self, texts: &[String]) -> Result<Tensor> {
        let mut guard = self.model.lock().map_err(|_| {
            Error::provider(&self.model_id, "model lock poisoned")
        })?;

        if guard.is_none() {
            info!(model = %self.model_id, "loading ColBERT model");
            let builder = ColBERT::from(&self.model_id).with_device(default_device());
            let colbert = ColBERT::try_from(builder)
                .map_err(|e| Error::provider(&self.model_id, e))?;
            *guard = Some(colbert);
        }

        let Some(model) = guard.as_mut() else {
            return Err(Error::provider(&self.model_id, "model not loaded"));
        };
        model
            .encode(texts, false)
            .map_err(|e| Error::provider(&self.model_id, e))
    }
}

/// Mean of the non-padding rows of one `[tokens, dim]` matrix.
fn mean_pool(rows: &[Vec<f32>]) -> Vec<f32> {
    let dimension = rows.first().map_or(0, Vec::len);
    let mut pooled = vec![0.0f32; dimension];
    let mut used = 0usize;

    for row in rows.iter().filter(|r| r.iter().any(|&x| x != 0.0)) {
        for (acc, &x) in pooled.iter_mut().zip(row) {
            *acc += x;
        }
        used += 1;
    }

    if used > 0 {
        for x in &mut pooled {
            *x /= used as f32;
        }
    }
    l2_normalize(&mut pooled);
    pooled
}

impl Embedder for ModelManager {
    fn descriptor(&self) -> Result<EmbedderDescriptor> {
        let dimension = match self.dimension.get() {
            Some(&d) => d,
            None => {
                let sampled = self.embed(DIMENSION_SAMPLE)?.len();
                *self.dimension.get_or_init(|| sampled)
            }
        };
        Ok(EmbedderDescriptor {
            model_id: self.model_id.clone(),
            dimension,
        })
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        // embeddings shape: [batch_size, num_tokens, dimension]
        let embeddings = self.encode(texts)?;
        let per_text: Vec<Vec<Vec<f32>>> = embeddings
            .to_vec3::<f32>()
            .map_err(|e| Error::provider(&self.model_id, e))?;

        if per_text.len() != texts.len() {
            return Err(Error::provider(
                &self.model_id,
                format!("expected {} embeddings, got {}", texts.len(), per_text.len()),
            ));
        }

        debug!(batch = texts.len(), "pooled ColBERT token embeddings");
        Ok(per_text.iter().map(|rows| mean_pool(rows)).collect())
    }
}

impl std::fmt::Debug for ModelManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelManager")
            .field("model_id", &self.model_id)
            .finish_non_exhaustive()
    }
}
