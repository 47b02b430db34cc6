use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Error, Result};

/// Default cap on embedder input, in characters.
pub const DEFAULT_MAX_INPUT_CHARS: usize = 2048;

/// Identity of an embedding function: which model, and the vector length it
/// produces. Two descriptors must be equal for vectors to be comparable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedderDescriptor {
    pub model_id: String,
    pub dimension: usize,
}

/// A text → vector function.
///
/// Implementations must be deterministic and always return vectors of
/// `descriptor().dimension` elements.
pub trait Embedder: Send + Sync {
    fn descriptor(&self) -> Result<EmbedderDescriptor>;

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])?
            .pop()
            .ok_or_else(|| Error::provider("single text", "provider returned no vector"))
    }
}

impl<E: Embedder + ?Sized> Embedder for Box<E> {
    fn descriptor(&self) -> Result<EmbedderDescriptor> {
        (**self).descriptor()
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        (**self).embed_batch(texts)
    }
}

/// What to do with text longer than [`InputPolicy::max_chars`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlongPolicy {
    /// Keep the first `max_chars` characters.
    #[default]
    Truncate,
    /// Fail with [`Error::InputTooLong`].
    Reject,
}

impl std::str::FromStr for OverlongPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "truncate" => Ok(Self::Truncate),
            "reject" => Ok(Self::Reject),
            other => Err(Error::InvalidArgument(format!(
                "unknown overlong policy '{other}' (expected truncate or reject)"
            ))),
        }
    }
}

impl std::fmt::Display for OverlongPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Truncate => "truncate",
            Self::Reject => "reject",
        })
    }
}

/// Input length rule applied before text reaches the embedder.
///
/// The policy used to build an index is stored with it and reused for every
/// query against that index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputPolicy {
    pub max_chars: usize,
    pub overlong: OverlongPolicy,
}

impl Default for InputPolicy {
    fn default() -> Self {
        Self {
            max_chars: DEFAULT_MAX_INPUT_CHARS,
            overlong: OverlongPolicy::default(),
        }
    }
}

impl InputPolicy {
    /// Apply the policy to `text`. `reference` names the input in
    /// diagnostics (a citation, or `"query"`).
    ///
    /// ```
    /// use versebert::embedding::{InputPolicy, OverlongPolicy};
    ///
    /// let policy = InputPolicy { max_chars: 5, overlong: OverlongPolicy::Truncate };
    /// assert_eq!(policy.prepare("héllo world", "q").unwrap(), "héllo");
    ///
    /// let strict = InputPolicy { max_chars: 5, overlong: OverlongPolicy::Reject };
    /// assert!(strict.prepare("héllo world", "q").is_err());
    /// ```
    pub fn prepare<'a>(&self, text: &'a str, reference: &str) -> Result<Cow<'a, str>> {
        let Some((cut, _)) = text.char_indices().nth(self.max_chars) else {
            return Ok(Cow::Borrowed(text));
        };

        match self.overlong {
            OverlongPolicy::Truncate => {
                warn!(reference, limit = self.max_chars, "truncating overlong input");
                Ok(Cow::Owned(text[..cut].to_string()))
            }
            OverlongPolicy::Reject => Err(Error::InputTooLong {
                reference: reference.to_string(),
                chars: text.chars().count(),
                limit: self.max_chars,
            }),
        }
    }
}

/// Scale `v` to unit length in place. Zero vectors stay zero.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}
