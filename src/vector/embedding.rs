//! Query encoding: text → unit-length vector in the matrix space.
//!
//! The text model is an injected [`EmbeddingGenerator`]. [`QueryEncoder`]
//! owns what happens after the model: L2 normalization, finiteness and
//! dimension checks against the loaded matrix.

use crate::vector::{VectorDimension, VectorError};
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;

/// Trait for generating embeddings from text.
///
/// Implementations of this trait should be thread-safe and
/// capable of handling batch processing efficiently.
pub trait EmbeddingGenerator: Send + Sync {
    /// Generate embeddings for multiple texts.
    ///
    /// # Arguments
    /// * `texts` - Slice of text strings to generate embeddings for
    ///
    /// # Returns
    /// A vector of embeddings, one for each input text, or an error
    fn generate_embeddings(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError>;

    /// Get the dimension of embeddings produced by this generator.
    #[must_use]
    fn dimension(&self) -> VectorDimension;

    /// Human-readable model name, reported by health and info output.
    fn model_name(&self) -> &str;
}

/// Parse a configured model name into a fastembed model.
///
/// Names are matched case-insensitively; both the enum spelling and the
/// upstream repository name are accepted.
pub fn parse_embedding_model(name: &str) -> Result<EmbeddingModel, VectorError> {
    let model = match name.to_ascii_lowercase().as_str() {
        "allminilml6v2" | "sentence-transformers/all-minilm-l6-v2" => {
            EmbeddingModel::AllMiniLML6V2
        }
        "multilinguale5small" | "intfloat/multilingual-e5-small" => {
            EmbeddingModel::MultilingualE5Small
        }
        "multilinguale5base" | "intfloat/multilingual-e5-base" => {
            EmbeddingModel::MultilingualE5Base
        }
        "multilinguale5large" | "intfloat/multilingual-e5-large" => {
            EmbeddingModel::MultilingualE5Large
        }
        "paraphrasemlminilml12v2"
        | "sentence-transformers/paraphrase-multilingual-minilm-l12-v2" => {
            EmbeddingModel::ParaphraseMLMiniLML12V2
        }
        "bgesmallenv15" | "baai/bge-small-en-v1.5" => EmbeddingModel::BGESmallENV15,
        _ => {
            return Err(VectorError::EmbeddingFailed(format!(
                "Unknown embedding model '{name}'. Supported: AllMiniLML6V2, MultilingualE5Small, \
                 MultilingualE5Base, MultilingualE5Large, ParaphraseMLMiniLML12V2, BGESmallENV15"
            )));
        }
    };
    Ok(model)
}

/// FastEmbed implementation of [`EmbeddingGenerator`].
///
/// The model needs exclusive access while embedding, so calls are
/// serialized on an internal mutex.
pub struct FastEmbedGenerator {
    model: Mutex<TextEmbedding>,
    dimension: VectorDimension,
    model_name: String,
}

impl std::fmt::Debug for FastEmbedGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedGenerator")
            .field("model", &"<TextEmbedding>")
            .field("dimension", &self.dimension)
            .field("model_name", &self.model_name)
            .finish()
    }
}

impl FastEmbedGenerator {
    /// Create a generator for the named model.
    ///
    /// # Errors
    /// Returns an error if the name is unknown or the model fails to
    /// initialize or download.
    pub fn new(
        model_name: &str,
        cache_dir: PathBuf,
        show_download_progress: bool,
    ) -> Result<Self, VectorError> {
        let model = parse_embedding_model(model_name)?;

        let mut text_model = TextEmbedding::try_new(
            InitOptions::new(model)
                .with_cache_dir(cache_dir)
                .with_show_download_progress(show_download_progress),
        )
        .map_err(|e| VectorError::EmbeddingFailed(
            format!("Failed to initialize embedding model: {e}. Ensure you have internet connection for first-time model download")
        ))?;

        // Get dimensions by generating a probe embedding
        let probe = text_model
            .embed(vec!["probe"], None)
            .map_err(|e| VectorError::EmbeddingFailed(format!("Model probe failed: {e}")))?;
        let dim = probe.first().map(Vec::len).unwrap_or(0);

        Ok(Self {
            model: Mutex::new(text_model),
            dimension: VectorDimension::new(dim)?,
            model_name: model_name.to_string(),
        })
    }
}

impl EmbeddingGenerator for FastEmbedGenerator {
    fn generate_embeddings(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let embeddings = self
            .model
            .lock()
            .embed(texts.to_vec(), None)
            .map_err(|e| {
                VectorError::EmbeddingFailed(format!("Failed to generate embeddings: {e}"))
            })?;

        for embedding in &embeddings {
            self.dimension.validate_vector(embedding)?;
        }

        Ok(embeddings)
    }

    fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

/// Scale a vector to unit L2 norm.
///
/// A zero vector is returned unchanged instead of dividing by zero.
#[must_use]
pub fn normalize_l2(mut vector: Vec<f32>) -> Vec<f32> {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in &mut vector {
            *value /= norm;
        }
    }
    vector
}

/// Encodes query text into the vector space of the loaded matrix.
#[derive(Clone)]
pub struct QueryEncoder {
    generator: Arc<dyn EmbeddingGenerator>,
    query_prefix: String,
}

impl std::fmt::Debug for QueryEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryEncoder")
            .field("model_name", &self.generator.model_name())
            .field("dimension", &self.generator.dimension())
            .field("query_prefix", &self.query_prefix)
            .finish()
    }
}

impl QueryEncoder {
    pub fn new(generator: Arc<dyn EmbeddingGenerator>) -> Self {
        Self {
            generator,
            query_prefix: String::new(),
        }
    }

    /// Prepend a fixed instruction to every query (e.g. `"query: "` for E5 models).
    pub fn with_query_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.query_prefix = prefix.into();
        self
    }

    /// Encode one query and normalize it to unit length.
    ///
    /// # Errors
    /// - `EmbeddingFailed` if the model errors or returns nothing
    /// - `DimensionMismatch` if the model output is not `dimension()` long
    /// - `NonFinite` if the model output contains NaN or infinity
    pub fn encode(&self, text: &str) -> Result<Vec<f32>, VectorError> {
        let input = if self.query_prefix.is_empty() {
            text.to_string()
        } else {
            format!("{}{text}", self.query_prefix)
        };

        let raw = self
            .generator
            .generate_embeddings(&[input.as_str()])?
            .into_iter()
            .next()
            .ok_or_else(|| {
                VectorError::EmbeddingFailed("Model returned no embedding for query".to_string())
            })?;

        self.generator.dimension().validate_vector(&raw)?;
        if let Some(position) = raw.iter().position(|v| !v.is_finite()) {
            return Err(VectorError::NonFinite {
                context: "query embedding",
                position,
            });
        }

        Ok(normalize_l2(raw))
    }

    /// Check that this encoder produces vectors of the matrix dimension.
    pub fn check_dimension(&self, expected: VectorDimension) -> Result<(), VectorError> {
        let actual = self.generator.dimension();
        if actual != expected {
            return Err(VectorError::DimensionMismatch {
                expected: expected.get(),
                actual: actual.get(),
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn dimension(&self) -> VectorDimension {
        self.generator.dimension()
    }

    #[must_use]
    pub fn model_name(&self) -> &str {
        self.generator.model_name()
    }
}

/// Mock embedding generator for testing.
///
/// Returns fixed vectors keyed by exact text, and a constant fallback
/// vector for anything else.
#[cfg(test)]
pub struct MockEmbeddingGenerator {
    dimension: VectorDimension,
    vectors: std::collections::HashMap<String, Vec<f32>>,
    fallback: Vec<f32>,
}

#[cfg(test)]
impl MockEmbeddingGenerator {
    /// Create a generator with custom dimension for testing.
    #[must_use]
    pub fn with_dimension(dimension: VectorDimension) -> Self {
        Self {
            dimension,
            vectors: std::collections::HashMap::new(),
            fallback: vec![0.0; dimension.get()],
        }
    }

    /// Return `vector` for exactly `text`.
    #[must_use]
    pub fn with_vector(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.vectors.insert(text.to_string(), vector);
        self
    }
}

#[cfg(test)]
impl EmbeddingGenerator for MockEmbeddingGenerator {
    fn generate_embeddings(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError> {
        Ok(texts
            .iter()
            .map(|text| {
                self.vectors
                    .get(*text)
                    .cloned()
                    .unwrap_or_else(|| self.fallback.clone())
            })
            .collect())
    }

    fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}
