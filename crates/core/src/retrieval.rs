use crate::context::PipelineContext;
use crate::embeddings::embed_query;
use crate::error::RagError;
use crate::stores::{QueryHit, VectorStore};
use tracing::{debug, info};

pub type SearchHit = QueryHit;

/// Picks the candidate with the smallest distance. Ties go to the candidate
/// seen first and a NaN distance never wins.
pub fn select_closest(hits: Vec<QueryHit>) -> Option<QueryHit> {
    let mut best: Option<QueryHit> = None;
    for hit in hits {
        let closer = match &best {
            None => !hit.distance.is_nan(),
            Some(current) => hit.distance < current.distance,
        };
        if closer {
            best = Some(hit);
        }
    }
    best
}

/// Returns the single record closest to `query` in `collection`.
///
/// The collection is created on first use, so searching a fresh name reports
/// [`RagError::EmptyResult`] rather than a store failure.
pub async fn search(
    ctx: &PipelineContext,
    query: &str,
    collection: &str,
) -> Result<SearchHit, RagError> {
    if query.trim().is_empty() {
        return Err(RagError::Validation("query is empty".to_string()));
    }

    let vector = embed_query(ctx.embedder.as_ref(), query).await?;
    let target = ctx.store.get_or_create_collection(collection).await?;
    let candidates = ctx.store.query(&target, &vector, ctx.search_top_k).await?;
    debug!(collection, candidates = candidates.len(), "nearest neighbours fetched");

    let best = select_closest(candidates).ok_or_else(|| {
        RagError::EmptyResult(format!("no documents in collection '{collection}'"))
    })?;

    info!(collection, id = %best.id, distance = best.distance, "closest record selected");
    Ok(best)
}
