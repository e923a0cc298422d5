use crate::chunking::ChunkingStrategy;
use crate::config::PipelineConfig;
use crate::context::PipelineContext;
use crate::ingest::{self, DirectoryOptions};
use crate::models::{
    BatchIngestResponse, CollectionsResponse, ErrorPayload, IngestOutcome, IngestResponse,
    MessageResponse, RecordsResponse, SearchResponse,
};
use crate::retrieval;
use crate::stores::VectorStore;
use std::path::Path;
use tracing::warn;

pub type ServiceResult<T> = Result<T, ErrorPayload>;

/// Front door for callers that want JSON-ready payloads instead of typed
/// errors. Every failure becomes an [`ErrorPayload`].
#[derive(Clone)]
pub struct RagService {
    ctx: PipelineContext,
}

fn ingest_message(outcome: &IngestOutcome) -> String {
    format!(
        "{} items ingested from {}",
        outcome.items.len(),
        outcome.source
    )
}

impl From<IngestOutcome> for IngestResponse {
    fn from(outcome: IngestOutcome) -> Self {
        Self {
            message: ingest_message(&outcome),
            items: outcome.items,
        }
    }
}

impl RagService {
    pub fn new(ctx: PipelineContext) -> Self {
        Self { ctx }
    }

    pub async fn from_config(config: &PipelineConfig) -> ServiceResult<Self> {
        Ok(Self::new(PipelineContext::new(config).await?))
    }

    pub fn context(&self) -> &PipelineContext {
        &self.ctx
    }

    pub async fn ingest_pdf(&self, path: &Path, collection: &str) -> ServiceResult<IngestResponse> {
        Ok(ingest::ingest_pdf(&self.ctx, path, collection).await?.into())
    }

    pub async fn ingest_text(&self, text: &str, collection: &str) -> ServiceResult<IngestResponse> {
        Ok(ingest::ingest_text(&self.ctx, text, collection).await?.into())
    }

    pub async fn ingest_text_with_strategy(
        &self,
        text: &str,
        strategy: ChunkingStrategy,
        collection: &str,
    ) -> ServiceResult<IngestResponse> {
        Ok(
            ingest::ingest_text_with_strategy(&self.ctx, text, strategy, collection)
                .await?
                .into(),
        )
    }

    pub async fn ingest_directory(
        &self,
        dir: &Path,
        collection: &str,
        options: DirectoryOptions,
    ) -> ServiceResult<BatchIngestResponse> {
        let report = ingest::ingest_directory(&self.ctx, dir, collection, options).await?;
        Ok(BatchIngestResponse {
            message: format!(
                "{} items ingested from {} files, {} failed",
                report.item_count(),
                report.outcomes.len(),
                report.failures.len()
            ),
            results: report.outcomes,
            failures: report.failures,
        })
    }

    pub async fn search(&self, query: &str, collection: &str) -> ServiceResult<SearchResponse> {
        let best = retrieval::search(&self.ctx, query, collection).await?;
        Ok(SearchResponse {
            message: "closest document retrieved".to_string(),
            results: best,
        })
    }

    pub async fn delete_collection(&self, collection: &str) -> ServiceResult<MessageResponse> {
        self.ctx.store.delete_collection(collection).await?;
        Ok(MessageResponse {
            message: format!("collection '{collection}' deleted"),
        })
    }

    pub async fn delete_all_collections(&self) -> ServiceResult<MessageResponse> {
        self.ctx.store.delete_all_collections().await?;
        Ok(MessageResponse {
            message: "all collections deleted".to_string(),
        })
    }

    /// Dumps every record of a collection. A collection that does not exist
    /// is reported as empty.
    pub async fn get_all(&self, collection: &str) -> ServiceResult<RecordsResponse> {
        let Some(target) = self.ctx.store.get_collection(collection).await? else {
            warn!(collection, "collection does not exist, nothing to dump");
            return Ok(RecordsResponse {
                results: Vec::new(),
            });
        };
        let results = self.ctx.store.get_all(&target).await?;
        Ok(RecordsResponse { results })
    }

    pub async fn list_collections(&self) -> ServiceResult<CollectionsResponse> {
        let collections = self.ctx.store.list_collections().await?;
        Ok(CollectionsResponse { collections })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::error::ErrorKind;
    use tempfile::tempdir;

    async fn service(dir: &Path) -> ServiceResult<RagService> {
        RagService::from_config(&PipelineConfig {
            store: StoreConfig::Local {
                path: dir.join("db"),
            },
            ..PipelineConfig::default()
        })
        .await
    }

    #[tokio::test]
    async fn deleting_missing_collection_succeeds() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let service = service(dir.path()).await.map_err(|e| e.error)?;

        let response = service
            .delete_collection("never_created")
            .await
            .map_err(|e| e.error)?;
        assert!(response.message.contains("never_created"));
        Ok(())
    }

    #[tokio::test]
    async fn text_then_search_then_dump() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let service = service(dir.path()).await.map_err(|e| e.error)?;

        let ingested = service
            .ingest_text("The quick brown fox.", "vehicle_collection")
            .await
            .map_err(|e| e.error)?;
        assert_eq!(ingested.message, "1 items ingested from text_input");

        let found = service
            .search("quick brown fox", "vehicle_collection")
            .await
            .map_err(|e| e.error)?;
        assert_eq!(found.results.id, "text_input_vec0");

        let dumped = service
            .get_all("vehicle_collection")
            .await
            .map_err(|e| e.error)?;
        assert_eq!(dumped.results.len(), 1);

        let listed = service.list_collections().await.map_err(|e| e.error)?;
        assert_eq!(listed.collections[0].name, "vehicle_collection");
        Ok(())
    }

    #[tokio::test]
    async fn errors_become_payloads() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let service = service(dir.path()).await.map_err(|e| e.error)?;

        let empty = service.search("anything at all", "empty_one").await;
        assert!(matches!(empty, Err(ref payload) if payload.kind == ErrorKind::EmptyResult));

        let bad_dir = service
            .ingest_directory(&dir.path().join("missing"), "docs", DirectoryOptions::default())
            .await;
        assert!(matches!(bad_dir, Err(ref payload) if payload.kind == ErrorKind::Validation));
        Ok(())
    }
}
