use crate::error::RagError;
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;
use url::Url;

const OLLAMA_TIMEOUT_SECONDS: u64 = 60;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 768;
pub const DEFAULT_OLLAMA_MODEL: &str = "nomic-embed-text";
pub const DEFAULT_LOCAL_MODEL: &str = "all-mpnet-base-v2";

#[async_trait]
pub trait Embedder: Send + Sync {
    fn model_name(&self) -> &str;
    fn dimensions(&self) -> usize;
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError>;
}

/// Embeds chunks one vector per chunk, in order.
///
/// An empty batch is rejected before reaching the model, and every returned
/// vector is checked against the embedder's declared dimension.
pub async fn embed_chunks(
    embedder: &dyn Embedder,
    chunks: &[String],
) -> Result<Vec<Vec<f32>>, RagError> {
    if chunks.is_empty() {
        return Err(RagError::Embedding(
            "cannot embed an empty batch".to_string(),
        ));
    }

    let vectors = embedder.embed_batch(chunks).await?;
    if vectors.len() != chunks.len() {
        return Err(RagError::Embedding(format!(
            "{} returned {} vectors for {} chunks",
            embedder.model_name(),
            vectors.len(),
            chunks.len()
        )));
    }

    if let Some(bad) = vectors
        .iter()
        .find(|vector| vector.len() != embedder.dimensions())
    {
        return Err(RagError::Embedding(format!(
            "embedding dimension {} != {}",
            bad.len(),
            embedder.dimensions()
        )));
    }

    debug!(model = embedder.model_name(), count = vectors.len(), "chunks embedded");
    Ok(vectors)
}

pub async fn embed_query(embedder: &dyn Embedder, query: &str) -> Result<Vec<f32>, RagError> {
    let mut vectors = embed_chunks(embedder, &[query.to_string()]).await?;
    vectors
        .pop()
        .ok_or_else(|| RagError::Embedding("query embedding missing".to_string()))
}

/// Embedding backends, selected once from configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "snake_case")]
pub enum EmbeddingProvider {
    CharacterNgram {
        dimensions: usize,
    },
    /// Sentence-embedding model run in-process; weights are fetched on first
    /// use and cached.
    Local {
        model: String,
    },
    Ollama {
        endpoint: String,
        model: String,
        dimensions: usize,
    },
}

impl Default for EmbeddingProvider {
    fn default() -> Self {
        Self::CharacterNgram {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl EmbeddingProvider {
    pub fn dimensions(&self) -> usize {
        match self {
            Self::CharacterNgram { dimensions } | Self::Ollama { dimensions, .. } => *dimensions,
            Self::Local { model } => local_model(model)
                .map(|(_, dimensions)| dimensions)
                .unwrap_or_default(),
        }
    }

    /// Checks the configuration without loading any model.
    pub fn validate(&self) -> Result<(), RagError> {
        if let Self::Local { model } = self {
            local_model(model)?;
        }
        if self.dimensions() == 0 {
            return Err(RagError::Validation(
                "embedding dimension must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn build(&self) -> Result<Arc<dyn Embedder>, RagError> {
        self.validate()?;

        match self {
            Self::CharacterNgram { dimensions } => Ok(Arc::new(CharacterNgramEmbedder {
                dimensions: *dimensions,
            })),
            Self::Ollama {
                endpoint,
                model,
                dimensions,
            } => Ok(Arc::new(OllamaEmbedder::new(endpoint, model, *dimensions)?)),
            Self::Local { model } => Ok(Arc::new(FastembedEmbedder::new(model)?)),
        }
    }
}

/// Offline embedder hashing character trigrams into fixed buckets.
#[derive(Debug, Clone, Copy)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl CharacterNgramEmbedder {
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        if chars.is_empty() {
            return vector;
        }

        for window in chars.windows(3) {
            let token = window.iter().collect::<String>();
            let mut hash = 1469598103934665603u64;
            for byte in token.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        vector
    }
}

#[async_trait]
impl Embedder for CharacterNgramEmbedder {
    fn model_name(&self) -> &str {
        "character-ngram"
    }

    fn dimensions(&self) -> usize {
        self.dimensions.max(1)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }
}

fn local_model(name: &str) -> Result<(EmbeddingModel, usize), RagError> {
    match name.trim().to_ascii_lowercase().as_str() {
        "all-mpnet-base-v2" => Ok((EmbeddingModel::AllMpnetBaseV2, 768)),
        "all-minilm-l6-v2" => Ok((EmbeddingModel::AllMiniLML6V2, 384)),
        "bge-small-en-v1.5" => Ok((EmbeddingModel::BGESmallENV15, 384)),
        "bge-base-en-v1.5" => Ok((EmbeddingModel::BGEBaseENV15, 768)),
        "nomic-embed-text-v1.5" => Ok((EmbeddingModel::NomicEmbedTextV15, 768)),
        other => Err(RagError::Validation(format!(
            "unknown local embedding model '{other}': use all-mpnet-base-v2, all-minilm-l6-v2, \
             bge-small-en-v1.5, bge-base-en-v1.5 or nomic-embed-text-v1.5"
        ))),
    }
}

/// In-process embedder over a fastembed ONNX model, loaded once.
pub struct FastembedEmbedder {
    model_name: String,
    dimensions: usize,
    model: Arc<Mutex<TextEmbedding>>,
}

impl FastembedEmbedder {
    pub fn new(name: &str) -> Result<Self, RagError> {
        let (model, dimensions) = local_model(name)?;
        let text_model = TextEmbedding::try_new(InitOptions::new(model))
            .map_err(|error| RagError::Embedding(format!("cannot load {name}: {error}")))?;

        Ok(Self {
            model_name: name.to_string(),
            dimensions,
            model: Arc::new(Mutex::new(text_model)),
        })
    }
}

#[async_trait]
impl Embedder for FastembedEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        let model = Arc::clone(&self.model);
        let texts = texts.to_vec();

        tokio::task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|_| RagError::Embedding("embedding model lock poisoned".to_string()))?;
            model
                .embed(texts, None)
                .map_err(|error| RagError::Embedding(error.to_string()))
        })
        .await
        .map_err(|error| RagError::Embedding(error.to_string()))?
    }
}

/// Embedder backed by an Ollama server's `/api/embed` endpoint.
pub struct OllamaEmbedder {
    endpoint: String,
    model: String,
    dimensions: usize,
    client: Client,
}

impl OllamaEmbedder {
    pub fn new(
        endpoint: impl AsRef<str>,
        model: impl Into<String>,
        dimensions: usize,
    ) -> Result<Self, RagError> {
        let endpoint = Url::parse(endpoint.as_ref()).map_err(|error| {
            RagError::Validation(format!("invalid ollama endpoint: {error}"))
        })?;
        let client = Client::builder()
            .timeout(Duration::from_secs(OLLAMA_TIMEOUT_SECONDS))
            .build()
            .map_err(|error| RagError::Embedding(error.to_string()))?;

        Ok(Self {
            endpoint: endpoint.as_str().trim_end_matches('/').to_string(),
            model: model.into(),
            dimensions,
            client,
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        let response = self
            .client
            .post(format!("{}/api/embed", self.endpoint))
            .json(&json!({ "model": self.model, "input": texts }))
            .send()
            .await
            .map_err(|error| RagError::Embedding(format!("ollama request failed: {error}")))?;

        if !response.status().is_success() {
            return Err(RagError::Embedding(format!(
                "ollama returned {} for model {}",
                response.status(),
                self.model
            )));
        }

        let parsed: Value = response
            .json()
            .await
            .map_err(|error| RagError::Embedding(format!("ollama payload unreadable: {error}")))?;
        parse_ollama_embeddings(&parsed)
    }
}

fn parse_ollama_embeddings(payload: &Value) -> Result<Vec<Vec<f32>>, RagError> {
    let rows = payload
        .pointer("/embeddings")
        .and_then(Value::as_array)
        .ok_or_else(|| RagError::Embedding("ollama payload has no embeddings".to_string()))?;

    rows.iter()
        .map(|row| -> Result<Vec<f32>, RagError> {
            row.as_array()
                .ok_or_else(|| RagError::Embedding("embedding row is not an array".to_string()))?
                .iter()
                .map(|value| {
                    value.as_f64().map(|number| number as f32).ok_or_else(|| {
                        RagError::Embedding("embedding value is not a number".to_string())
                    })
                })
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ShortEmbedder;

    #[async_trait]
    impl Embedder for ShortEmbedder {
        fn model_name(&self) -> &str {
            "short"
        }

        fn dimensions(&self) -> usize {
            4
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
            Ok(texts.iter().map(|_| vec![0.0; 3]).collect())
        }
    }

    #[test]
    fn embedder_is_deterministic() {
        let embedder = CharacterNgramEmbedder::default();
        let first = embedder.embed_text("Hydraulic pressure and flow");
        let second = embedder.embed_text("Hydraulic pressure and flow");
        assert_eq!(first, second);
    }

    #[test]
    fn embedder_outputs_expected_length() {
        let embedder = CharacterNgramEmbedder { dimensions: 32 };
        let vector = embedder.embed_text("abc");
        assert_eq!(vector.len(), 32);
    }

    #[tokio::test]
    async fn one_vector_per_chunk_with_declared_dimension() -> Result<(), RagError> {
        let embedder = CharacterNgramEmbedder::default();
        let chunks = vec![
            "first chunk of text".to_string(),
            "second chunk of text".to_string(),
            "third".to_string(),
        ];

        let vectors = embed_chunks(&embedder, &chunks).await?;
        assert_eq!(vectors.len(), chunks.len());
        assert!(vectors
            .iter()
            .all(|vector| vector.len() == DEFAULT_EMBEDDING_DIMENSIONS));
        Ok(())
    }

    #[tokio::test]
    async fn empty_batch_is_rejected() {
        let embedder = CharacterNgramEmbedder::default();
        let result = embed_chunks(&embedder, &[]).await;
        assert!(matches!(result, Err(RagError::Embedding(_))));
    }

    #[tokio::test]
    async fn wrong_dimension_is_rejected() {
        let result = embed_chunks(&ShortEmbedder, &["text".to_string()]).await;
        assert!(matches!(result, Err(RagError::Embedding(_))));
    }

    #[tokio::test]
    async fn query_embedding_is_single_vector() -> Result<(), RagError> {
        let embedder = CharacterNgramEmbedder { dimensions: 16 };
        let vector = embed_query(&embedder, "hydraulic pump").await?;
        assert_eq!(vector.len(), 16);
        Ok(())
    }

    #[test]
    fn provider_builds_pinned_embedder() -> Result<(), RagError> {
        let embedder = EmbeddingProvider::default().build()?;
        assert_eq!(embedder.dimensions(), DEFAULT_EMBEDDING_DIMENSIONS);
        assert_eq!(embedder.model_name(), "character-ngram");

        let ollama = EmbeddingProvider::Ollama {
            endpoint: "http://localhost:11434/".to_string(),
            model: DEFAULT_OLLAMA_MODEL.to_string(),
            dimensions: 768,
        }
        .build()?;
        assert_eq!(ollama.model_name(), DEFAULT_OLLAMA_MODEL);
        Ok(())
    }

    #[test]
    fn provider_rejects_bad_configuration() {
        let bad_url = EmbeddingProvider::Ollama {
            endpoint: "not a url".to_string(),
            model: "m".to_string(),
            dimensions: 8,
        };
        assert!(bad_url.build().is_err());

        let zero = EmbeddingProvider::CharacterNgram { dimensions: 0 };
        assert!(matches!(zero.build(), Err(RagError::Validation(_))));
    }

    #[test]
    fn local_models_resolve_to_fixed_dimensions() {
        let default = EmbeddingProvider::Local {
            model: DEFAULT_LOCAL_MODEL.to_string(),
        };
        assert_eq!(default.dimensions(), DEFAULT_EMBEDDING_DIMENSIONS);

        let small = EmbeddingProvider::Local {
            model: "all-MiniLM-L6-v2".to_string(),
        };
        assert_eq!(small.dimensions(), 384);
    }

    #[test]
    fn unknown_local_model_is_rejected_before_loading() {
        let unknown = EmbeddingProvider::Local {
            model: "word2vec".to_string(),
        };
        assert_eq!(unknown.dimensions(), 0);
        assert!(matches!(unknown.build(), Err(RagError::Validation(_))));
    }

    #[test]
    fn ollama_payload_is_parsed() -> Result<(), RagError> {
        let payload = json!({ "model": "m", "embeddings": [[0.5, -1.0], [0.25, 2.0]] });
        let vectors = parse_ollama_embeddings(&payload)?;
        assert_eq!(vectors, vec![vec![0.5, -1.0], vec![0.25, 2.0]]);

        let missing = json!({ "error": "model not found" });
        assert!(parse_ollama_embeddings(&missing).is_err());
        Ok(())
    }
}
