//! Named vector collections and the backends that persist them.
//!
//! Every backend implements [`VectorStore`]. The backend is chosen once from
//! [`StoreConfig`] by [`connect_store`]; a backend that fails to initialise is
//! replaced by [`StoreBackend::Unavailable`] so later calls fail with a
//! descriptive [`RagError::StoreUnavailable`] instead of crashing.

pub mod local;
pub mod qdrant;

pub use local::LocalStore;
pub use qdrant::QdrantStore;

use crate::config::StoreConfig;
use crate::error::RagError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;
use tracing::{error, info};

pub type Metadata = BTreeMap<String, MetadataValue>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// `1 - cosine similarity`.
    #[default]
    Cosine,
    /// Squared Euclidean distance.
    L2,
    /// `1 - dot product`.
    Ip,
}

impl DistanceMetric {
    pub fn distance(&self, left: &[f32], right: &[f32]) -> f32 {
        match self {
            Self::Cosine => 1.0 - cosine_similarity(left, right),
            Self::L2 => left
                .iter()
                .zip(right)
                .map(|(a, b)| (a - b) * (a - b))
                .sum(),
            Self::Ip => 1.0 - left.iter().zip(right).map(|(a, b)| a * b).sum::<f32>(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Cosine => "cosine",
            Self::L2 => "l2",
            Self::Ip => "ip",
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DistanceMetric {
    type Err = RagError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "cosine" => Ok(Self::Cosine),
            "l2" | "euclid" | "euclidean" => Ok(Self::L2),
            "ip" | "dot" => Ok(Self::Ip),
            other => Err(RagError::Validation(format!(
                "unknown distance metric '{other}'"
            ))),
        }
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection {
    pub name: String,
    pub dimension: usize,
    pub metric: DistanceMetric,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub embedding: Vec<f32>,
    pub document: String,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryHit {
    pub id: String,
    pub distance: f32,
    pub document: String,
    pub metadata: Metadata,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Returns the named collection, creating it on first use.
    async fn get_or_create_collection(&self, name: &str) -> Result<Collection, RagError>;

    async fn get_collection(&self, name: &str) -> Result<Option<Collection>, RagError>;

    async fn list_collections(&self) -> Result<Vec<Collection>, RagError>;

    /// Inserts or overwrites records keyed by id.
    async fn upsert(
        &self,
        collection: &Collection,
        ids: &[String],
        embeddings: &[Vec<f32>],
        documents: &[String],
        metadatas: &[Metadata],
    ) -> Result<(), RagError>;

    /// Up to `k` records ordered by ascending distance; empty when the
    /// collection holds no records.
    async fn query(
        &self,
        collection: &Collection,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<QueryHit>, RagError>;

    async fn get_all(&self, collection: &Collection) -> Result<Vec<Record>, RagError>;

    /// Deleting a missing collection is logged and reported as success.
    async fn delete_collection(&self, name: &str) -> Result<(), RagError>;

    async fn delete_all_collections(&self) -> Result<(), RagError>;
}

pub fn validate_collection_name(name: &str) -> Result<(), RagError> {
    let length_ok = (3..=63).contains(&name.len());
    let charset_ok = name
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-' | '.'));
    let edges_ok = name.starts_with(|ch: char| ch.is_ascii_alphanumeric())
        && name.ends_with(|ch: char| ch.is_ascii_alphanumeric());

    if length_ok && charset_ok && edges_ok && !name.contains("..") {
        Ok(())
    } else {
        Err(RagError::Validation(format!(
            "invalid collection name '{name}': use 3-63 characters of [A-Za-z0-9_.-], \
             starting and ending with a letter or digit"
        )))
    }
}

pub fn validate_upsert(
    collection: &Collection,
    ids: &[String],
    embeddings: &[Vec<f32>],
    documents: &[String],
    metadatas: &[Metadata],
) -> Result<(), RagError> {
    if ids.len() != embeddings.len()
        || ids.len() != documents.len()
        || ids.len() != metadatas.len()
    {
        return Err(RagError::Validation(format!(
            "upsert lengths differ: ids={} embeddings={} documents={} metadatas={}",
            ids.len(),
            embeddings.len(),
            documents.len(),
            metadatas.len()
        )));
    }

    let mut seen = HashSet::with_capacity(ids.len());
    for id in ids {
        if id.is_empty() {
            return Err(RagError::Validation("record id must not be empty".to_string()));
        }
        if !seen.insert(id.as_str()) {
            return Err(RagError::Validation(format!("duplicate record id '{id}' in batch")));
        }
    }

    if let Some(bad) = embeddings
        .iter()
        .find(|embedding| embedding.len() != collection.dimension)
    {
        return Err(RagError::Validation(format!(
            "embedding dimension {} != collection '{}' dimension {}",
            bad.len(),
            collection.name,
            collection.dimension
        )));
    }

    Ok(())
}

/// The store selected at start-up.
pub enum StoreBackend {
    Local(LocalStore),
    Qdrant(QdrantStore),
    Unavailable { reason: String },
}

impl StoreBackend {
    pub fn is_available(&self) -> bool {
        !matches!(self, Self::Unavailable { .. })
    }

    fn backend(&self) -> Result<&dyn VectorStore, RagError> {
        match self {
            Self::Local(store) => Ok(store),
            Self::Qdrant(store) => Ok(store),
            Self::Unavailable { reason } => Err(RagError::StoreUnavailable(format!(
                "vector store client is not initialized: {reason}"
            ))),
        }
    }
}

#[async_trait]
impl VectorStore for StoreBackend {
    async fn get_or_create_collection(&self, name: &str) -> Result<Collection, RagError> {
        self.backend()?.get_or_create_collection(name).await
    }

    async fn get_collection(&self, name: &str) -> Result<Option<Collection>, RagError> {
        self.backend()?.get_collection(name).await
    }

    async fn list_collections(&self) -> Result<Vec<Collection>, RagError> {
        self.backend()?.list_collections().await
    }

    async fn upsert(
        &self,
        collection: &Collection,
        ids: &[String],
        embeddings: &[Vec<f32>],
        documents: &[String],
        metadatas: &[Metadata],
    ) -> Result<(), RagError> {
        self.backend()?
            .upsert(collection, ids, embeddings, documents, metadatas)
            .await
    }

    async fn query(
        &self,
        collection: &Collection,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<QueryHit>, RagError> {
        self.backend()?.query(collection, vector, k).await
    }

    async fn get_all(&self, collection: &Collection) -> Result<Vec<Record>, RagError> {
        self.backend()?.get_all(collection).await
    }

    async fn delete_collection(&self, name: &str) -> Result<(), RagError> {
        self.backend()?.delete_collection(name).await
    }

    async fn delete_all_collections(&self) -> Result<(), RagError> {
        self.backend()?.delete_all_collections().await
    }
}

/// Opens the configured backend. Initialisation failures are logged and
/// turned into [`StoreBackend::Unavailable`].
pub async fn connect_store(
    config: &StoreConfig,
    dimension: usize,
    metric: DistanceMetric,
) -> StoreBackend {
    let connected = match config {
        StoreConfig::Local { path } => LocalStore::open(path, dimension, metric)
            .await
            .map(StoreBackend::Local),
        StoreConfig::Remote { url, api_key } => {
            QdrantStore::new(url, dimension, metric).map(|store| match api_key {
                Some(key) => StoreBackend::Qdrant(store.with_api_key(key)),
                None => StoreBackend::Qdrant(store),
            })
        }
    };

    match connected {
        Ok(backend) => {
            info!(store = %config, dimension, metric = %metric, "vector store initialized");
            backend
        }
        Err(error) => {
            error!(store = %config, error = %error, "failed to initialize vector store");
            StoreBackend::Unavailable {
                reason: error.to_string(),
            }
        }
    }
}
