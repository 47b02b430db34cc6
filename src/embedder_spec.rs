use std::{fmt, str::FromStr};

use crate::{
    config_db::{ConfigDb, MODEL_SETTING},
    embedding::{Embedder, EmbedderDescriptor},
    error::{Error, Result},
    hash_embedder::{DEFAULT_HASH_DIMENSION, HASH_MODEL_ID, HashEmbedder},
    model_manager::{DEFAULT_MODEL_ID, MODEL_ENV_VAR, ModelManager},
};

/// Which embedder a model string selects.
///
/// `hash` and `hash:<dim>` pick the offline [`HashEmbedder`]; anything else
/// is a ColBERT model id (HuggingFace) or local model path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmbedderSpec {
    Hash { dimension: usize },
    ColBert { model_id: String },
}

impl FromStr for EmbedderSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::Config("model must not be empty".to_string()));
        }
        if s == "hash" {
            return Ok(Self::Hash {
                dimension: DEFAULT_HASH_DIMENSION,
            });
        }
        if let Some(dim) = s.strip_prefix("hash:") {
            let dimension = dim.parse::<usize>().ok().filter(|&d| d > 0).ok_or_else(|| {
                Error::Config(format!(
                    "invalid hash embedder dimension '{dim}' (expected a positive integer)"
                ))
            })?;
            return Ok(Self::Hash { dimension });
        }
        Ok(Self::ColBert {
            model_id: s.to_string(),
        })
    }
}

impl fmt::Display for EmbedderSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hash { dimension } => write!(f, "hash:{dimension}"),
            Self::ColBert { model_id } => f.write_str(model_id),
        }
    }
}

impl EmbedderSpec {
    /// The spec that reproduces the embedder an index was built with.
    pub fn from_descriptor(descriptor: &EmbedderDescriptor) -> Self {
        if descriptor.model_id == HASH_MODEL_ID {
            Self::Hash {
                dimension: descriptor.dimension,
            }
        } else {
            Self::ColBert {
                model_id: descriptor.model_id.clone(),
            }
        }
    }

    /// Construct the embedder. ColBERT weights are loaded on first use.
    pub fn build(&self) -> Result<Box<dyn Embedder>> {
        Ok(match self {
            Self::Hash { dimension } => Box::new(HashEmbedder::new(*dimension)?),
            Self::ColBert { model_id } => {
                Box::new(ModelManager::with_model_id(model_id.clone()))
            }
        })
    }
}

/// Where the resolved model string came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelSource {
    Flag,
    Env,
    Config,
    Default,
}

impl ModelSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Flag => "--model",
            Self::Env => MODEL_ENV_VAR,
            Self::Config => "config",
            Self::Default => "default",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ModelResolution {
    pub spec: EmbedderSpec,
    pub source: ModelSource,
}

/// Resolve the model from, in order of priority:
/// 1. An explicit value (from --model)
/// 2. The VERSEBERT_MODEL environment variable
/// 3. The `model` setting in config.redb
/// 4. The default ColBERT model
pub fn resolve_model(
    explicit: Option<&str>,
    config_db: &ConfigDb,
) -> Result<ModelResolution> {
    let env = std::env::var(MODEL_ENV_VAR).ok();
    resolve_model_from(explicit, env.as_deref(), config_db)
}

fn resolve_model_from(
    explicit: Option<&str>,
    env: Option<&str>,
    config_db: &ConfigDb,
) -> Result<ModelResolution> {
    let (raw, source) = if let Some(value) = explicit {
        (value.to_string(), ModelSource::Flag)
    } else if let Some(value) = env.filter(|v| !v.trim().is_empty()) {
        (value.to_string(), ModelSource::Env)
    } else if let Some(value) = config_db.get_setting(MODEL_SETTING)? {
        (value, ModelSource::Config)
    } else {
        (DEFAULT_MODEL_ID.to_string(), ModelSource::Default)
    };

    Ok(ModelResolution {
        spec: raw.parse()?,
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> (tempfile::TempDir, ConfigDb) {
        let tmp = tempfile::tempdir().unwrap();
        let db = ConfigDb::open(&tmp.path().join("config.redb")).unwrap();
        (tmp, db)
    }

    #[test]
    fn parse_hash_specs() {
        assert_eq!(
            "hash".parse::<EmbedderSpec>().unwrap(),
            EmbedderSpec::Hash {
                dimension: DEFAULT_HASH_DIMENSION
            }
        );
        assert_eq!(
            "hash:768".parse::<EmbedderSpec>().unwrap(),
            EmbedderSpec::Hash { dimension: 768 }
        );
        assert!("hash:0".parse::<EmbedderSpec>().is_err());
        assert!("hash:abc".parse::<EmbedderSpec>().is_err());
        assert!("".parse::<EmbedderSpec>().is_err());
    }

    #[test]
    fn other_strings_are_model_ids() {
        assert_eq!(
            "lightonai/answerai-colbert-small-v1"
                .parse::<EmbedderSpec>()
                .unwrap(),
            EmbedderSpec::ColBert {
                model_id: "lightonai/answerai-colbert-small-v1".to_string()
            }
        );
    }

    #[test]
    fn display_roundtrips() {
        for s in ["hash:64", "some/model"] {
            assert_eq!(s.parse::<EmbedderSpec>().unwrap().to_string(), s);
        }
    }

    #[test]
    fn build_hash_embedder() {
        let embedder = EmbedderSpec::Hash { dimension: 16 }.build().unwrap();
        let descriptor = embedder.descriptor().unwrap();
        assert_eq!(descriptor.dimension, 16);
    }

    #[test]
    fn spec_from_recorded_descriptor() {
        let descriptor = EmbedderDescriptor {
            model_id: HASH_MODEL_ID.to_string(),
            dimension: 96,
        };
        assert_eq!(
            EmbedderSpec::from_descriptor(&descriptor),
            EmbedderSpec::Hash { dimension: 96 }
        );

        let descriptor = EmbedderDescriptor {
            model_id: "some/model".to_string(),
            dimension: 128,
        };
        assert_eq!(
            EmbedderSpec::from_descriptor(&descriptor),
            EmbedderSpec::ColBert {
                model_id: "some/model".to_string()
            }
        );
    }

    #[test]
    fn resolution_priority() {
        let (_tmp, db) = test_db();

        let r = resolve_model_from(None, None, &db).unwrap();
        assert_eq!(r.source, ModelSource::Default);
        assert_eq!(r.spec.to_string(), DEFAULT_MODEL_ID);

        db.set_setting(MODEL_SETTING, "hash:32").unwrap();
        let r = resolve_model_from(None, None, &db).unwrap();
        assert_eq!(r.source, ModelSource::Config);
        assert_eq!(r.spec, EmbedderSpec::Hash { dimension: 32 });

        let r = resolve_model_from(None, Some("hash:48"), &db).unwrap();
        assert_eq!(r.source, ModelSource::Env);
        assert_eq!(r.spec, EmbedderSpec::Hash { dimension: 48 });

        let r = resolve_model_from(Some("hash"), Some("hash:48"), &db).unwrap();
        assert_eq!(r.source, ModelSource::Flag);
        assert_eq!(
            r.spec,
            EmbedderSpec::Hash {
                dimension: DEFAULT_HASH_DIMENSION
            }
        );
    }

    #[test]
    fn blank_env_is_ignored() {
        let (_tmp, db) = test_db();
        let r = resolve_model_from(None, Some("  "), &db).unwrap();
        assert_eq!(r.source, ModelSource::Default);
    }
}
