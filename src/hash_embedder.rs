use crate::{
    embedding::{Embedder, EmbedderDescriptor, l2_normalize},
    error::{Error, Result},
};

pub const HASH_MODEL_ID: &str = "fnv1a-hash-v1";
pub const DEFAULT_HASH_DIMENSION: usize = 384;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Feature-hashing embedder.
///
/// Lowercased alphanumeric tokens and adjacent token pairs are hashed with
/// FNV-1a into `dimension` signed buckets, and the result is L2-normalised.
/// Needs no model files and is fully deterministic, which makes it the
/// embedder of choice for tests and offline indexes.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self {
            dimension: DEFAULT_HASH_DIMENSION,
        }
    }
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(Error::InvalidArgument(
                "hash embedder dimension must be positive".to_string(),
            ));
        }
        Ok(Self { dimension })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        let tokens: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
            .collect();

        for token in &tokens {
            self.add_feature(&mut vector, &[token.as_bytes()], 1.0);
        }
        for pair in tokens.windows(2) {
            self.add_feature(
                &mut vector,
                &[pair[0].as_bytes(), b" ", pair[1].as_bytes()],
                0.5,
            );
        }

        l2_normalize(&mut vector);
        vector
    }

    fn add_feature(&self, vector: &mut [f32], parts: &[&[u8]], weight: f32) {
        let hash = fnv1a(parts);
        let bucket = (hash % self.dimension as u64) as usize;
        let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }
}

fn fnv1a(parts: &[&[u8]]) -> u64 {
    let mut hash = FNV_OFFSET;
    for part in parts {
        for &byte in *part {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(FNV_PRIME);
        }
    }
    hash
}

impl Embedder for HashEmbedder {
    fn descriptor(&self) -> Result<EmbedderDescriptor> {
        Ok(EmbedderDescriptor {
            model_id: HASH_MODEL_ID.to_string(),
            dimension: self.dimension,
        })
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}
