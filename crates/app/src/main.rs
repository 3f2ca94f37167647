use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use contract_ingest_core::{
    ChunkType, DocumentRecord, DocumentStatus, EmbeddingOrchestrator, EmbeddingProvider,
    FsObjectStorage, HashEmbedder, IngestionWorker, JobDescriptor, JobQueue, LifecycleTracker,
    MemoryJobQueue, MemoryMetadataStore, MemoryVectorStore, OllamaEmbedder, PipelineConfig,
    ProgressPublisher, QdrantVectorStore, QueryFilters, VectorStore, DEFAULT_EMBEDDING_DIMENSIONS,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "contract-ingest", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Qdrant base URL
    #[arg(long, env = "QDRANT_URL", default_value = "http://localhost:6333")]
    qdrant_url: String,

    /// Vector collection name
    #[arg(long, env = "COLLECTION_NAME", default_value = "contracts")]
    collection: String,

    /// Embedding backend
    #[arg(long, env = "EMBEDDER", value_enum, default_value = "local")]
    embedder: EmbedderKind,

    /// Ollama base URL (for --embedder ollama)
    #[arg(long, env = "OLLAMA_URL", default_value = "http://localhost:11434")]
    ollama_url: String,

    /// Ollama embedding model (for --embedder ollama)
    #[arg(long, env = "OLLAMA_MODEL", default_value = "nomic-embed-text")]
    ollama_model: String,

    /// Embedding vector size
    #[arg(long, env = "EMBEDDING_DIMENSIONS", default_value_t = DEFAULT_EMBEDDING_DIMENSIONS)]
    dimensions: usize,

    /// Keep vectors in process memory instead of Qdrant
    #[arg(long, default_value_t = false)]
    memory_store: bool,

    /// Concurrent ingestion workers
    #[arg(long, env = "WORKER_COUNT", default_value = "2")]
    workers: usize,

    /// Texts per embedding request
    #[arg(long, env = "EMBEDDING_BATCH_SIZE", default_value = "32")]
    batch_size: usize,

    /// Per-document processing budget in seconds
    #[arg(long, env = "JOB_TIMEOUT_SECS", default_value = "300")]
    timeout_secs: u64,
}

#[derive(Clone, Copy, ValueEnum)]
enum EmbedderKind {
    /// Deterministic local hash embedder, no model required.
    Local,
    /// Remote Ollama embedding endpoint.
    Ollama,
}

#[derive(Subcommand)]
enum Command {
    /// Enqueue every document under a folder and run the workers until
    /// the queue drains.
    Ingest {
        /// Folder scanned recursively for .pdf, .txt and .md files.
        #[arg(long)]
        folder: PathBuf,
    },
    /// Similarity search over ingested chunks.
    Search {
        /// Query text
        #[arg(long)]
        query: String,
        /// Number of hits to return.
        #[arg(long, default_value = "10")]
        top_k: usize,
        /// Restrict hits to one document.
        #[arg(long)]
        document_id: Option<String>,
        /// Restrict hits to one chunk type (clause or generic).
        #[arg(long)]
        chunk_type: Option<String>,
        /// Restrict hits to one clause number, e.g. 5.1
        #[arg(long)]
        clause: Option<String>,
    },
}

const INGESTIBLE_EXTENSIONS: [&str; 3] = ["pdf", "txt", "md"];

fn build_provider(cli: &Cli) -> Arc<dyn EmbeddingProvider> {
    match cli.embedder {
        EmbedderKind::Local => Arc::new(HashEmbedder {
            dimensions: cli.dimensions,
        }),
        EmbedderKind::Ollama => Arc::new(OllamaEmbedder::new(
            &cli.ollama_url,
            &cli.ollama_model,
            cli.dimensions,
        )),
    }
}

fn build_store(cli: &Cli) -> Arc<dyn VectorStore> {
    if cli.memory_store {
        Arc::new(MemoryVectorStore::new())
    } else {
        Arc::new(QdrantVectorStore::new(&cli.qdrant_url))
    }
}

fn discover_documents(folder: &Path) -> Vec<PathBuf> {
    let mut found: Vec<PathBuf> = WalkDir::new(folder)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.extension()
                .and_then(|extension| extension.to_str())
                .map(str::to_ascii_lowercase)
                .is_some_and(|extension| INGESTIBLE_EXTENSIONS.contains(&extension.as_str()))
        })
        .collect();
    found.sort();
    found
}

async fn run_ingest(cli: &Cli, folder: &Path) -> anyhow::Result<()> {
    let documents = discover_documents(folder);
    if documents.is_empty() {
        println!("no ingestible files under {}", folder.display());
        return Ok(());
    }
    info!(folder = %folder.display(), count = documents.len(), "documents discovered");

    let queue: Arc<MemoryJobQueue> = Arc::new(MemoryJobQueue::new());
    let publisher = Arc::new(ProgressPublisher::new());
    let lifecycle = Arc::new(LifecycleTracker::new(
        Arc::new(MemoryMetadataStore::new()),
        publisher.clone(),
    ));
    let storage = Arc::new(FsObjectStorage::new(folder));
    let vectors = build_store(cli);
    let provider = build_provider(cli);
    let config = PipelineConfig {
        embedding_batch_size: cli.batch_size,
        job_timeout_secs: cli.timeout_secs,
        ..PipelineConfig::default()
    };

    let mut printers = JoinSet::new();
    let mut document_ids = Vec::new();
    for path in &documents {
        let locator = path
            .strip_prefix(folder)
            .unwrap_or(path)
            .to_string_lossy()
            .to_string();
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| locator.clone());
        let byte_size = tokio::fs::metadata(path).await.map(|meta| meta.len())?;
        let document_id = uuid::Uuid::new_v4().to_string();

        let mut receiver = publisher.subscribe(&document_id);
        let label = filename.clone();
        printers.spawn(async move {
            while let Ok(event) = receiver.recv().await {
                println!(
                    "[{:>3.0}%] {} {} - {}",
                    event.progress * 100.0,
                    label,
                    event.status,
                    event.message
                );
            }
        });

        lifecycle
            .create(DocumentRecord::new(
                &document_id,
                &filename,
                byte_size,
                &cli.collection,
            ))
            .await?;
        queue
            .enqueue(JobDescriptor {
                document_id: document_id.clone(),
                source_locator: locator,
                collection_name: cli.collection.clone(),
                enqueued_at: Utc::now(),
            })
            .await?;
        document_ids.push((document_id, filename));
    }

    let worker = Arc::new(IngestionWorker::new(
        queue.clone(),
        storage,
        EmbeddingOrchestrator::new(provider, cli.batch_size),
        vectors,
        lifecycle.clone(),
        publisher.clone(),
        config,
    ));

    let mut workers = JoinSet::new();
    for _ in 0..cli.workers.max(1) {
        let worker = worker.clone();
        workers.spawn(async move { worker.run_pending().await });
    }

    tokio::select! {
        _ = async {
            while let Some(joined) = workers.join_next().await {
                if let Ok(Err(worker_error)) = joined {
                    warn!(error = %worker_error, "worker stopped with error");
                }
            }
        } => {}
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted; queued documents were not processed");
        }
    }
    // Close any channel left open by an interrupted run so the printer
    // tasks can finish.
    for (document_id, _) in &document_ids {
        publisher.drain(document_id);
    }
    while printers.join_next().await.is_some() {}

    let mut completed = 0usize;
    let mut failed = 0usize;
    for (document_id, filename) in &document_ids {
        let record = lifecycle.get(document_id).await?;
        match record.status {
            DocumentStatus::Completed => {
                completed += 1;
                println!(
                    "{filename}: {} chunks from {} page(s)",
                    record.chunk_count, record.page_count
                );
            }
            status => {
                failed += 1;
                println!(
                    "{filename}: {status}{}",
                    record
                        .error_detail
                        .map(|detail| format!(" ({detail})"))
                        .unwrap_or_default()
                );
            }
        }
    }
    println!(
        "{completed} completed, {failed} not completed at {}",
        Utc::now().to_rfc3339()
    );
    Ok(())
}

async fn run_search(
    cli: &Cli,
    query: &str,
    top_k: usize,
    filters: QueryFilters,
) -> anyhow::Result<()> {
    let provider = build_provider(cli);
    let store = build_store(cli);

    let query_vector = provider
        .embed_batch(&[query.to_string()])
        .await
        .map_err(|error| anyhow::anyhow!(error.to_string()))?
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("embedder returned no vector for the query"))?;

    let hits = store
        .search(&cli.collection, &query_vector, top_k, &filters)
        .await
        .map_err(|error| anyhow::anyhow!(error.to_string()))?;

    println!("query: {query}");
    for hit in hits {
        let clause = hit
            .metadata
            .get("clause_number")
            .and_then(serde_json::Value::as_str);
        match clause {
            Some(number) => println!(
                "score={:.4} document_id={} clause={number}",
                hit.score, hit.document_id
            ),
            None => println!("score={:.4} document_id={}", hit.score, hit.document_id),
        }
        println!("  {}", hit.text.trim());
    }
    Ok(())
}

fn parse_chunk_type(raw: &str) -> anyhow::Result<ChunkType> {
    match raw.to_ascii_lowercase().as_str() {
        "clause" => Ok(ChunkType::Clause),
        "generic" => Ok(ChunkType::Generic),
        other => anyhow::bail!("unknown chunk type: {other} (expected clause or generic)"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    info!(
        version = env!("CARGO_PKG_VERSION"),
        started_at = %Utc::now().to_rfc3339(),
        "contract-ingest boot"
    );

    match &cli.command {
        Command::Ingest { folder } => run_ingest(&cli, folder).await,
        Command::Search {
            query,
            top_k,
            document_id,
            chunk_type,
            clause,
        } => {
            let filters = QueryFilters {
                document_id: document_id.clone(),
                chunk_type: chunk_type
                    .as_deref()
                    .map(parse_chunk_type)
                    .transpose()?,
                clause_number: clause.clone(),
                section_number: None,
            };
            run_search(&cli, query, *top_k, filters).await
        }
    }
}
