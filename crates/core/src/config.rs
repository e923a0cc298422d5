use crate::chunking::ChunkingStrategy;
use crate::embeddings::EmbeddingProvider;
use crate::error::RagError;
use crate::stores::DistanceMetric;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

pub const DEFAULT_STORE_PATH: &str = "./vector_db";
pub const DEFAULT_STORE_HOST: &str = "localhost";
pub const DEFAULT_STORE_PORT: u16 = 6333;
pub const DEFAULT_SEARCH_TOP_K: usize = 10;

/// Where collections are persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum StoreConfig {
    Local {
        path: PathBuf,
    },
    Remote {
        url: String,
        #[serde(default)]
        api_key: Option<String>,
    },
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::Local {
            path: PathBuf::from(DEFAULT_STORE_PATH),
        }
    }
}

impl StoreConfig {
    /// Picks the local directory or the `http://host:port` server.
    pub fn from_parts(use_local: bool, path: impl Into<PathBuf>, host: &str, port: u16) -> Self {
        if use_local {
            Self::Local { path: path.into() }
        } else {
            Self::Remote {
                url: format!("http://{host}:{port}"),
                api_key: None,
            }
        }
    }
}

impl fmt::Display for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local { path } => write!(f, "local:{}", path.display()),
            Self::Remote { url, .. } => write!(f, "remote:{url}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub store: StoreConfig,
    pub embedding: EmbeddingProvider,
    pub chunking: ChunkingStrategy,
    pub search_top_k: usize,
    pub metric: DistanceMetric,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            embedding: EmbeddingProvider::default(),
            chunking: ChunkingStrategy::default(),
            search_top_k: DEFAULT_SEARCH_TOP_K,
            metric: DistanceMetric::default(),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), RagError> {
        self.chunking.validate()?;
        if self.search_top_k == 0 {
            return Err(RagError::Validation(
                "search_top_k must be greater than zero".to_string(),
            ));
        }
        self.embedding.validate()
    }
}
