use chrono::Utc;
use clap::{Parser, Subcommand};
use docs_qa_core::{
    ChunkingOptions, HnswParams, HttpChatModel, HttpEmbedder, HttpReranker, IngestionPipeline,
    QdrantGateway, QdrantSemanticCache, QueryOptions, QueryPipeline,
};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "docs-qa", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Vector store base URL
    #[arg(long, env = "QDRANT_URL", default_value = "http://localhost:6333")]
    qdrant_url: String,

    /// Vector store collection name
    #[arg(long, env = "QDRANT_COLLECTION", default_value = "kb_chunks")]
    collection: String,

    /// Collection holding the semantic answer cache
    #[arg(long, env = "QDRANT_CACHE_COLLECTION", default_value = "qa_answer_cache")]
    cache_collection: String,

    /// Embeddings endpoint (OpenAI-compatible)
    #[arg(long, default_value = "https://api.openai.com/v1/embeddings")]
    embeddings_url: String,

    /// Embeddings model
    #[arg(long, default_value = "text-embedding-3-small")]
    embeddings_model: String,

    /// Embedding vector dimensions
    #[arg(long, default_value = "1536")]
    embedding_dimensions: usize,

    /// API key for the embeddings and chat endpoints
    #[arg(long, env = "OPENAI_API_KEY")]
    openai_api_key: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest a document folder: load, categorize, chunk, embed, index.
    Ingest {
        /// Folder scanned recursively for .md/.txt/.pdf/.docx files.
        #[arg(long, env = "DATA_DIR", default_value = "data")]
        data_dir: String,

        /// Maximum chunk size in characters.
        #[arg(long, default_value = "900")]
        chunk_size: usize,

        /// Character overlap between consecutive chunks.
        #[arg(long, default_value = "120")]
        chunk_overlap: usize,

        /// HNSW neighbor fan-out.
        #[arg(long, default_value = "16")]
        hnsw_m: usize,

        /// HNSW construction search breadth.
        #[arg(long, default_value = "64")]
        hnsw_ef_construct: usize,
    },
    /// Ask a question and get a grounded answer with cited sources.
    Ask {
        /// The question.
        question: String,

        /// Restrict retrieval to one category (first folder segment).
        #[arg(long)]
        category: Option<String>,

        /// Vector search candidates.
        #[arg(long, env = "RETRIEVAL_K", default_value = "5")]
        top_k: usize,

        /// Candidates kept after reranking.
        #[arg(long, default_value = "3")]
        top_n: usize,

        /// Semantic cache similarity threshold.
        #[arg(long, env = "CACHE_SIMILARITY_THRESHOLD", default_value = "0.98")]
        cache_threshold: f32,

        /// Rerank endpoint (Cohere-compatible)
        #[arg(long, default_value = "https://api.cohere.com/v2/rerank")]
        rerank_url: String,

        /// Rerank model
        #[arg(long, default_value = "rerank-v3.5")]
        rerank_model: String,

        /// API key for the rerank endpoint
        #[arg(long, env = "COHERE_API_KEY")]
        rerank_api_key: Option<String>,

        /// Chat completions endpoint (OpenAI-compatible)
        #[arg(long, default_value = "https://api.openai.com/v1/chat/completions")]
        chat_url: String,

        /// Chat model
        #[arg(long, default_value = "gpt-4o-mini")]
        chat_model: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut embedder = HttpEmbedder::new(
        &cli.embeddings_url,
        &cli.embeddings_model,
        cli.embedding_dimensions,
    );
    if let Some(key) = &cli.openai_api_key {
        embedder = embedder.with_api_key(key);
    }

    let store = QdrantGateway::new(&cli.qdrant_url, &cli.collection, cli.embedding_dimensions);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        started_at = %Utc::now().to_rfc3339(),
        "docs-qa boot"
    );

    match cli.command {
        Command::Ingest {
            data_dir,
            chunk_size,
            chunk_overlap,
            hnsw_m,
            hnsw_ef_construct,
        } => {
            store
                .ensure_collection()
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;

            let pipeline = IngestionPipeline::new(embedder, store)
                .with_chunking(ChunkingOptions {
                    max_chars: chunk_size,
                    overlap_chars: chunk_overlap,
                })
                .with_index_params(HnswParams {
                    m: hnsw_m,
                    ef_construct: hnsw_ef_construct,
                });

            let report = pipeline
                .run(std::path::Path::new(&data_dir))
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;

            for skipped in &report.skipped_files {
                warn!(path = %skipped.path.display(), reason = %skipped.reason, "skipped file");
            }

            println!(
                "{} documents loaded, {} chunks indexed ({} skipped) at {}",
                report.documents_loaded,
                report.chunks_indexed,
                report.skipped_files.len(),
                report.finished_at.to_rfc3339()
            );
        }
        Command::Ask {
            question,
            category,
            top_k,
            top_n,
            cache_threshold,
            rerank_url,
            rerank_model,
            rerank_api_key,
            chat_url,
            chat_model,
        } => {
            let mut reranker = HttpReranker::new(&rerank_url, &rerank_model);
            if let Some(key) = &rerank_api_key {
                reranker = reranker.with_api_key(key);
            }

            let mut chat = HttpChatModel::new(&chat_url, &chat_model);
            if let Some(key) = &cli.openai_api_key {
                chat = chat.with_api_key(key);
            }

            let cache = QdrantSemanticCache::new(
                &cli.qdrant_url,
                &cli.cache_collection,
                cli.embedding_dimensions,
            );
            cache
                .ensure_collection()
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;

            let pipeline = QueryPipeline::new(embedder, store, reranker, chat, cache)
                .with_options(QueryOptions {
                    top_k,
                    rerank_top_n: top_n,
                    cache_threshold,
                });

            let answer = pipeline
                .answer_with_docs(&question, category.as_deref())
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;

            println!("{}", answer.text);
            if !answer.sources.is_empty() {
                println!();
                println!("sources:");
                for source in &answer.sources {
                    println!("  - {source}");
                }
            }
        }
    }

    Ok(())
}
