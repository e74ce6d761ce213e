mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use quarry_index::chunker::ChunkConfig;
use quarry_index::confluence::ConfluenceSource;
use quarry_index::ingest::{IngestConfig, IngestReport, Ingestor};
use quarry_index::qdrant::QdrantIndex;
use quarry_index::source::ContentSource;
use quarry_index::state::StateStore;
use quarry_index::vector_index::VectorIndex;
use quarry_llm::openai::OpenAiProvider;
use quarry_query::retriever::RetrievalConfig;
use quarry_query::{AnswerOutcome, QueryEngine, answer::Assembler};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::Config;

#[derive(Parser)]
#[command(name = "quarry", version, about = "Incremental content ingestion and grounded Q&A")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one ingestion pass, or keep running on an interval.
    Ingest {
        /// Re-run every N seconds until interrupted.
        #[arg(long, value_name = "SECONDS")]
        every: Option<u64>,
    },
    /// Ask a question against the indexed content.
    Query {
        question: String,
        /// Number of sources to retrieve.
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// Show recent ingestion runs.
    History {
        #[arg(long, default_value_t = 10)]
        limit: u32,
    },
}

fn init_subscriber() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn resolve_config_path(arg: Option<PathBuf>) -> PathBuf {
    arg.or_else(|| std::env::var("QUARRY_CONFIG").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("config/default.toml"))
}

fn build_provider(config: &Config) -> OpenAiProvider {
    OpenAiProvider::new(
        config.llm.api_key.clone(),
        config.llm.base_url.clone(),
        config.llm.model.clone(),
        config.llm.embedding_model.clone(),
        config.llm.max_tokens,
    )
    .with_embed_batch_size(config.llm.embed_batch_size)
    .with_max_retries(config.llm.max_retries)
    .with_request_timeout(Duration::from_secs(config.llm.request_timeout_secs))
}

fn build_index(config: &Config) -> anyhow::Result<Arc<dyn VectorIndex>> {
    let index = QdrantIndex::new(&config.index.qdrant_url, config.index.collection.clone())
        .context("failed to connect to the vector index")?;
    Ok(Arc::new(index))
}

async fn open_state(config: &Config) -> anyhow::Result<StateStore> {
    if let Some(parent) = std::path::Path::new(&config.index.state_path).parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).context("failed to create state directory")?;
    }
    StateStore::open(&config.index.state_path)
        .await
        .context("failed to open ingest state")
}

fn print_report(report: &IngestReport) {
    println!(
        "ingest: {} created, {} updated, {} deleted, {} unchanged, {} failed ({} ms)",
        report.created,
        report.updated,
        report.deleted,
        report.unchanged,
        report.failed,
        report.duration_ms
    );
    for error in &report.errors {
        eprintln!("  failed: {error}");
    }
}

async fn run_ingest(config: &Config, every: Option<u64>) -> anyhow::Result<()> {
    let source: Arc<dyn ContentSource> = Arc::new(
        ConfluenceSource::new(
            config.source.base_url.clone(),
            config.source.space_key.clone(),
            config.source.username.clone(),
            config.source.api_token.clone(),
        )
        .with_page_size(config.source.page_size),
    );
    let index = build_index(config)?;
    let state = open_state(config).await?;
    let provider = Arc::new(build_provider(config));

    let ingest_config = IngestConfig {
        chunker: ChunkConfig {
            max_chars: config.index.max_chars,
            overlap_chars: config.index.overlap_chars,
            min_chars: config.index.min_chars,
        },
        embed_batch_size: config.llm.embed_batch_size,
        concurrency: config.index.concurrency,
        stale_labels: config.index.stale_labels.clone(),
        space: config.source.space_key.clone(),
    };
    let ingestor = Ingestor::new(source, index, state, provider, ingest_config)?;

    let Some(secs) = every else {
        let report = ingestor.run().await?;
        print_report(&report);
        return Ok(());
    };

    let mut interval = tokio::time::interval(Duration::from_secs(secs.max(1)));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                match ingestor.run().await {
                    Ok(report) => print_report(&report),
                    Err(e) => tracing::error!(error = %e, "ingestion pass failed"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutting down");
                return Ok(());
            }
        }
    }
}

async fn run_query(config: &Config, question: &str, top_k: Option<usize>) -> anyhow::Result<()> {
    let index = build_index(config)?;
    let provider = Arc::new(build_provider(config));

    let engine = QueryEngine::new(
        provider,
        index,
        RetrievalConfig {
            top_k: config.query.top_k,
            fan_out: config.query.fan_out,
            vector_weight: config.query.vector_weight,
            title_weight: config.query.title_weight,
            content_weight: config.query.content_weight,
            include_stale: config.query.include_stale,
            stale_markers: config.query.stale_markers.clone(),
        },
        Assembler {
            context_budget_chars: config.query.context_budget_chars,
        },
    );

    let result = engine.query(question, top_k).await?;
    println!("{}", result.answer);
    if result.outcome != AnswerOutcome::NotFound && !result.sources.is_empty() {
        println!("\nSources:");
        for source in &result.sources {
            println!("  - {} ({})", source.title, source.url);
        }
    }
    Ok(())
}

async fn run_history(config: &Config, limit: u32) -> anyhow::Result<()> {
    let state = open_state(config).await?;
    let runs = state.recent_runs(limit).await?;
    if runs.is_empty() {
        println!("no ingestion runs recorded yet");
        return Ok(());
    }
    for run in runs {
        println!(
            "{}  +{} ~{} -{} ={} !{}  {} ms",
            run.started_at,
            run.created,
            run.updated,
            run.deleted,
            run.unchanged,
            run.failed,
            run.duration_ms
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_subscriber();

    let cli = Cli::parse();
    let config_path = resolve_config_path(cli.config);
    let config = Config::load(&config_path)?;

    match cli.command {
        Command::Ingest { every } => {
            config.validate()?;
            run_ingest(&config, every).await
        }
        Command::Query { question, top_k } => {
            config.validate()?;
            run_query(&config, &question, top_k).await
        }
        Command::History { limit } => run_history(&config, limit).await,
    }
}
