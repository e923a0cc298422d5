use crate::chunking::ChunkingStrategy;
use crate::context::PipelineContext;
use crate::embeddings::embed_chunks;
use crate::error::{IngestError, IngestStage, RagError};
use crate::models::{BatchReport, FileFailure, IngestItem, IngestOutcome};
use crate::normalize::normalize_text;
use crate::stores::{validate_collection_name, Metadata, MetadataValue, VectorStore};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

pub const TEXT_INPUT_SOURCE: &str = "text_input";
const RAW_TEXT_STRATEGY: &str = "raw_text";

/// What to do when one file of a directory batch fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchPolicy {
    /// Record the failure and move on to the next file.
    #[default]
    ContinueOnError,
    /// Abort the batch and return the first failure.
    FailFast,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryOptions {
    pub recursive: bool,
    pub policy: BatchPolicy,
}

pub fn discover_pdf_files(folder: &Path, recursive: bool) -> Vec<PathBuf> {
    let mut walker = WalkDir::new(folder);
    if !recursive {
        walker = walker.max_depth(1);
    }

    let mut files = Vec::new();
    for entry in walker.into_iter().filter_map(|item| item.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_pdf = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        if is_pdf {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

pub fn digest_file(path: &Path) -> Result<String, RagError> {
    let bytes = fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

fn stage_failure(stage: IngestStage, source_id: &str, cause: RagError) -> IngestError {
    error!(stage = %stage, source = source_id, error = %cause, "ingestion stage failed");
    IngestError::new(stage, source_id, cause)
}

fn check_collection(collection: &str, source_id: &str) -> Result<(), IngestError> {
    validate_collection_name(collection)
        .map_err(|cause| stage_failure(IngestStage::Upsert, source_id, cause))
}

fn chunk_metadata(
    update_time: &str,
    source_id: &str,
    strategy: &str,
    chunk_index: usize,
    checksum: Option<&str>,
) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert("update_time".to_string(), update_time.into());
    metadata.insert("source".to_string(), source_id.into());
    metadata.insert("strategy".to_string(), strategy.into());
    metadata.insert(
        "chunk_index".to_string(),
        MetadataValue::Integer(chunk_index as i64),
    );
    if let Some(checksum) = checksum {
        metadata.insert("checksum".to_string(), checksum.into());
    }
    metadata
}

/// Embeds and upserts already-filtered chunks. Zero chunks is a successful
/// outcome with no embed or upsert call.
async fn store_chunks(
    ctx: &PipelineContext,
    collection: &str,
    source_id: &str,
    ids: Vec<String>,
    chunks: Vec<String>,
    metadatas: Vec<Metadata>,
) -> Result<IngestOutcome, IngestError> {
    if chunks.is_empty() {
        info!(source = source_id, collection, "no meaningful chunks, 0 items ingested");
        return Ok(IngestOutcome::empty(source_id));
    }

    let embeddings = embed_chunks(ctx.embedder.as_ref(), &chunks)
        .await
        .map_err(|cause| stage_failure(IngestStage::Embed, source_id, cause))?;

    let target = ctx
        .store
        .get_or_create_collection(collection)
        .await
        .map_err(|cause| stage_failure(IngestStage::Upsert, source_id, cause))?;
    ctx.store
        .upsert(&target, &ids, &embeddings, &chunks, &metadatas)
        .await
        .map_err(|cause| stage_failure(IngestStage::Upsert, source_id, cause))?;

    info!(source = source_id, collection, items = ids.len(), "ingestion complete");

    let items = ids
        .into_iter()
        .zip(chunks)
        .zip(metadatas)
        .map(|((id, content), metadata)| IngestItem {
            id,
            content,
            metadata,
        })
        .collect();

    Ok(IngestOutcome {
        source: source_id.to_string(),
        items,
    })
}

/// Ingests one PDF: every page is chunked with the context's strategy and
/// records are keyed `{file_stem}_vec{index}` across the whole document.
pub async fn ingest_pdf(
    ctx: &PipelineContext,
    path: &Path,
    collection: &str,
) -> Result<IngestOutcome, IngestError> {
    let source_id = path.display().to_string();
    check_collection(collection, &source_id)?;

    let stem = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .ok_or_else(|| {
            stage_failure(
                IngestStage::Extract,
                &source_id,
                RagError::Validation(format!("path has no file name: {source_id}")),
            )
        })?
        .to_string();

    let extractor = ctx.extractor.clone();
    let owned_path = path.to_path_buf();
    let blocking_source = source_id.clone();
    let (checksum, pages) = tokio::task::spawn_blocking(move || {
        let checksum = digest_file(&owned_path).map_err(|cause| RagError::Extraction {
            source_id: blocking_source,
            details: cause.to_string(),
        })?;
        let pages = extractor.extract_pages(&owned_path)?;
        Ok::<_, RagError>((checksum, pages))
    })
    .await
    .map_err(|join| RagError::Extraction {
        source_id: source_id.clone(),
        details: join.to_string(),
    })
    .and_then(|result| result)
    .map_err(|cause| stage_failure(IngestStage::Extract, &source_id, cause))?;
    debug!(source = %source_id, pages = pages.len(), "extracted pages");

    let chunks: Vec<String> = pages
        .iter()
        .filter(|page| !page.is_blank())
        .flat_map(|page| ctx.chunking.chunk(&page.text))
        .collect();
    debug!(
        source = %source_id,
        chunks = chunks.len(),
        strategy = %ctx.chunking,
        "chunked and filtered"
    );

    let update_time = Utc::now().to_rfc3339();
    let ids = (0..chunks.len())
        .map(|index| format!("{stem}_vec{index}"))
        .collect();
    let metadatas = (0..chunks.len())
        .map(|index| {
            chunk_metadata(
                &update_time,
                &source_id,
                ctx.chunking.name(),
                index,
                Some(&checksum),
            )
        })
        .collect();

    store_chunks(ctx, collection, &source_id, ids, chunks, metadatas).await
}

/// Stores the whole normalized text as the single record `text_input_vec0`.
pub async fn ingest_text(
    ctx: &PipelineContext,
    text: &str,
    collection: &str,
) -> Result<IngestOutcome, IngestError> {
    check_collection(collection, TEXT_INPUT_SOURCE)?;

    let normalized = normalize_text(text);
    if normalized.is_empty() {
        info!(collection, "text is empty after normalization, 0 items ingested");
        return Ok(IngestOutcome::empty(TEXT_INPUT_SOURCE));
    }

    let update_time = Utc::now().to_rfc3339();
    store_chunks(
        ctx,
        collection,
        TEXT_INPUT_SOURCE,
        vec![format!("{TEXT_INPUT_SOURCE}_vec0")],
        vec![normalized],
        vec![chunk_metadata(
            &update_time,
            TEXT_INPUT_SOURCE,
            RAW_TEXT_STRATEGY,
            0,
            None,
        )],
    )
    .await
}

/// Chunks raw text with an explicit strategy; ids are `{strategy}_vec{index}`.
pub async fn ingest_text_with_strategy(
    ctx: &PipelineContext,
    text: &str,
    strategy: ChunkingStrategy,
    collection: &str,
) -> Result<IngestOutcome, IngestError> {
    check_collection(collection, TEXT_INPUT_SOURCE)?;
    strategy
        .validate()
        .map_err(|cause| stage_failure(IngestStage::Chunk, TEXT_INPUT_SOURCE, cause))?;

    let chunks = strategy.chunk(text);
    debug!(strategy = %strategy, chunks = chunks.len(), "chunked and filtered");

    let update_time = Utc::now().to_rfc3339();
    let ids = (0..chunks.len())
        .map(|index| format!("{}_vec{index}", strategy.name()))
        .collect();
    let metadatas = (0..chunks.len())
        .map(|index| {
            chunk_metadata(
                &update_time,
                TEXT_INPUT_SOURCE,
                strategy.name(),
                index,
                None,
            )
        })
        .collect();

    store_chunks(ctx, collection, TEXT_INPUT_SOURCE, ids, chunks, metadatas).await
}

/// Ingests every `*.pdf` under `dir` in path order.
pub async fn ingest_directory(
    ctx: &PipelineContext,
    dir: &Path,
    collection: &str,
    options: DirectoryOptions,
) -> Result<BatchReport, IngestError> {
    let source_id = dir.display().to_string();
    if !dir.is_dir() {
        return Err(stage_failure(
            IngestStage::Extract,
            &source_id,
            RagError::Validation(format!("{source_id} is not a directory")),
        ));
    }
    check_collection(collection, &source_id)?;

    let files = discover_pdf_files(dir, options.recursive);
    if files.is_empty() {
        warn!(dir = %source_id, recursive = options.recursive, "no pdf files found");
    }

    let mut report = BatchReport::default();
    let mut stems: HashMap<String, PathBuf> = HashMap::new();
    for path in files {
        let stem = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        // Record ids derive from the stem, so a second file with the same
        // stem would overwrite the first one's records.
        if let Some(first) = stems.get(&stem) {
            let failure = stage_failure(
                IngestStage::Extract,
                &path.display().to_string(),
                RagError::Validation(format!(
                    "file stem '{stem}' already ingested from {}",
                    first.display()
                )),
            );
            match options.policy {
                BatchPolicy::FailFast => return Err(failure),
                BatchPolicy::ContinueOnError => {
                    report.failures.push(FileFailure::from(&failure));
                    continue;
                }
            }
        }
        stems.insert(stem, path.clone());

        match ingest_pdf(ctx, &path, collection).await {
            Ok(outcome) => report.outcomes.push(outcome),
            Err(failure) => match options.policy {
                BatchPolicy::FailFast => return Err(failure),
                BatchPolicy::ContinueOnError => {
                    warn!(path = %path.display(), stage = %failure.stage, "skipping file");
                    report.failures.push(FileFailure::from(&failure));
                }
            },
        }
    }

    info!(
        dir = %source_id,
        files = report.outcomes.len(),
        failures = report.failures.len(),
        items = report.item_count(),
        "directory ingestion finished"
    );
    Ok(report)
}
