use crate::chunking::ChunkingStrategy;
use crate::config::PipelineConfig;
use crate::embeddings::Embedder;
use crate::error::RagError;
use crate::extractor::{LopdfExtractor, PdfExtractor};
use crate::stores::{connect_store, StoreBackend};
use std::sync::Arc;
use tracing::info;

/// Everything an ingestion or retrieval call needs, built once at start-up
/// and shared read-only.
#[derive(Clone)]
pub struct PipelineContext {
    pub embedder: Arc<dyn Embedder>,
    pub store: Arc<StoreBackend>,
    pub extractor: Arc<dyn PdfExtractor>,
    pub chunking: ChunkingStrategy,
    pub search_top_k: usize,
}

impl PipelineContext {
    /// Builds the embedder and opens the store. An unreachable store does not
    /// fail construction; it surfaces later as `StoreUnavailable`.
    pub async fn new(config: &PipelineConfig) -> Result<Self, RagError> {
        config.validate()?;
        let embedder = config.embedding.build()?;
        let store = connect_store(&config.store, embedder.dimensions(), config.metric).await;

        info!(
            model = embedder.model_name(),
            dimension = embedder.dimensions(),
            chunking = %config.chunking,
            store_available = store.is_available(),
            "pipeline context ready"
        );

        Ok(Self::from_parts(
            embedder,
            Arc::new(store),
            Arc::new(LopdfExtractor),
            config.chunking,
            config.search_top_k,
        ))
    }

    pub fn from_parts(
        embedder: Arc<dyn Embedder>,
        store: Arc<StoreBackend>,
        extractor: Arc<dyn PdfExtractor>,
        chunking: ChunkingStrategy,
        search_top_k: usize,
    ) -> Self {
        Self {
            embedder,
            store,
            extractor,
            chunking,
            search_top_k,
        }
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn PdfExtractor>) -> Self {
        self.extractor = extractor;
        self
    }
}
