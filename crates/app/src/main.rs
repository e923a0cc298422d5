use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use pdf_rag_core::embeddings::{DEFAULT_LOCAL_MODEL, DEFAULT_OLLAMA_MODEL};
use pdf_rag_core::service::ServiceResult;
use pdf_rag_core::{
    BatchPolicy, ChunkingStrategy, DirectoryOptions, DistanceMetric, EmbeddingProvider,
    PipelineConfig, RagService, StoreConfig, DEFAULT_EMBEDDING_DIMENSIONS,
};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "pdf-rag", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Directory of the local vector store
    #[arg(long, env = "VECTOR_DB_PATH", default_value = "./vector_db")]
    db_path: PathBuf,

    /// Use the local store instead of a Qdrant server
    #[arg(
        long,
        env = "USE_LOCAL_VECTOR_DB",
        default_value_t = true,
        action = clap::ArgAction::Set,
        value_parser = clap::builder::BoolishValueParser::new()
    )]
    use_local: bool,

    /// Qdrant host
    #[arg(long, env = "VECTOR_DB_HOST", default_value = "localhost")]
    db_host: String,

    /// Qdrant port
    #[arg(long, env = "VECTOR_DB_PORT", default_value_t = 6333)]
    db_port: u16,

    #[arg(long, env = "EMBEDDING_PROVIDER", value_enum, default_value_t = Provider::Ngram)]
    embedding_provider: Provider,

    /// Ollama base URL
    #[arg(long, env = "OLLAMA_URL", default_value = "http://localhost:11434")]
    ollama_url: String,

    #[arg(long, env = "EMBEDDING_MODEL", default_value = DEFAULT_OLLAMA_MODEL)]
    embedding_model: String,

    /// In-process model used by the `local` provider
    #[arg(long, env = "LOCAL_EMBEDDING_MODEL", default_value = DEFAULT_LOCAL_MODEL)]
    local_model: String,

    #[arg(long, env = "EMBEDDING_DIMENSIONS", default_value_t = DEFAULT_EMBEDDING_DIMENSIONS)]
    embedding_dimensions: usize,

    /// Chunking strategy as `name[:size]`, e.g. `token_text_split:80`
    #[arg(long, env = "CHUNK_STRATEGY", default_value = "fixed_window_split")]
    chunk_strategy: ChunkingStrategy,

    /// Distance metric for new collections: cosine, l2 or ip
    #[arg(long, default_value = "cosine")]
    metric: DistanceMetric,

    /// Candidates fetched before picking the closest one
    #[arg(long, default_value_t = 10)]
    top_k: usize,

    /// Target collection
    #[arg(long, env = "RAG_COLLECTION", default_value = "documents")]
    collection: String,
}

#[derive(Clone, Copy, ValueEnum)]
enum Provider {
    Ngram,
    Local,
    Ollama,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest a single PDF file.
    IngestPdf { path: PathBuf },
    /// Ingest every PDF in a directory.
    IngestDir {
        dir: PathBuf,
        /// Descend into sub-directories.
        #[arg(long, default_value_t = false)]
        recursive: bool,
        /// Stop at the first file that fails.
        #[arg(long, default_value_t = false)]
        fail_fast: bool,
    },
    /// Ingest raw text, whole or split with a chunking strategy.
    IngestText {
        text: String,
        #[arg(long)]
        strategy: Option<ChunkingStrategy>,
    },
    /// Return the stored chunk closest to a query.
    Search { query: String },
    /// Delete the target collection, or every collection with --all.
    Delete {
        #[arg(long, default_value_t = false)]
        all: bool,
    },
    /// Print every record of the target collection.
    Dump,
    /// List collections.
    Collections,
}

impl Cli {
    fn pipeline_config(&self) -> PipelineConfig {
        let embedding = match self.embedding_provider {
            Provider::Ngram => EmbeddingProvider::CharacterNgram {
                dimensions: self.embedding_dimensions,
            },
            Provider::Local => EmbeddingProvider::Local {
                model: self.local_model.clone(),
            },
            Provider::Ollama => EmbeddingProvider::Ollama {
                endpoint: self.ollama_url.clone(),
                model: self.embedding_model.clone(),
                dimensions: self.embedding_dimensions,
            },
        };

        PipelineConfig {
            store: StoreConfig::from_parts(
                self.use_local,
                &self.db_path,
                &self.db_host,
                self.db_port,
            ),
            embedding,
            chunking: self.chunk_strategy,
            search_top_k: self.top_k,
            metric: self.metric,
        }
    }
}

/// Prints the payload as pretty JSON; returns whether it was a success.
fn emit<T: Serialize>(result: ServiceResult<T>) -> anyhow::Result<bool> {
    let (rendered, ok) = match result {
        Ok(payload) => (serde_json::to_string_pretty(&payload)?, true),
        Err(payload) => (serde_json::to_string_pretty(&payload)?, false),
    };
    println!("{rendered}");
    Ok(ok)
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = cli.pipeline_config();
    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        store = %config.store,
        "pdf-rag boot"
    );

    let service = match RagService::from_config(&config).await {
        Ok(service) => service,
        Err(payload) => {
            emit::<()>(Err(payload))?;
            return Ok(ExitCode::FAILURE);
        }
    };
    let collection = cli.collection.as_str();

    let ok = match cli.command {
        Command::IngestPdf { path } => emit(service.ingest_pdf(&path, collection).await)?,
        Command::IngestDir {
            dir,
            recursive,
            fail_fast,
        } => {
            let options = DirectoryOptions {
                recursive,
                policy: if fail_fast {
                    BatchPolicy::FailFast
                } else {
                    BatchPolicy::ContinueOnError
                },
            };
            emit(service.ingest_directory(&dir, collection, options).await)?
        }
        Command::IngestText { text, strategy } => match strategy {
            Some(strategy) => emit(
                service
                    .ingest_text_with_strategy(&text, strategy, collection)
                    .await,
            )?,
            None => emit(service.ingest_text(&text, collection).await)?,
        },
        Command::Search { query } => emit(service.search(&query, collection).await)?,
        Command::Delete { all: true } => emit(service.delete_all_collections().await)?,
        Command::Delete { all: false } => emit(service.delete_collection(collection).await)?,
        Command::Dump => emit(service.get_all(collection).await)?,
        Command::Collections => emit(service.list_collections().await)?,
    };

    Ok(if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
