pub mod chunking;
pub mod config;
pub mod context;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod ingest;
pub mod models;
pub mod normalize;
pub mod retrieval;
pub mod service;
pub mod stores;

pub use chunking::{ChunkingStrategy, MIN_MEANINGFUL_WORDS};
pub use config::{PipelineConfig, StoreConfig};
pub use context::PipelineContext;
pub use embeddings::{
    embed_chunks, embed_query, CharacterNgramEmbedder, Embedder, EmbeddingProvider,
    FastembedEmbedder, OllamaEmbedder, DEFAULT_EMBEDDING_DIMENSIONS,
};
pub use error::{ErrorKind, IngestError, IngestStage, RagError};
pub use extractor::{extract_page_texts, LopdfExtractor, PageText, PdfExtractor};
pub use ingest::{
    discover_pdf_files, ingest_directory, ingest_pdf, ingest_text, ingest_text_with_strategy,
    BatchPolicy, DirectoryOptions,
};
pub use models::{
    BatchIngestResponse, BatchReport, CollectionsResponse, ErrorPayload, FileFailure, IngestItem,
    IngestOutcome, IngestResponse, MessageResponse, RecordsResponse, SearchResponse,
};
pub use normalize::normalize_text;
pub use retrieval::{search, select_closest, SearchHit};
pub use service::RagService;
pub use stores::{
    connect_store, Collection, DistanceMetric, LocalStore, Metadata, MetadataValue, QdrantStore,
    QueryHit, Record, StoreBackend, VectorStore,
};
