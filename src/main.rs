//! semcode CLI - Local semantic code search
//!
//! Thin glue around the engine: subcommands for indexing, searching,
//! watching, and the line-delimited JSON tool channel. Logs go to stderr so
//! stdout stays free for tool-call traffic.

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use semcode::{
    format_results, format_results_json, Config, CrossEncoderReranker, EmbeddingProvider,
    FastEmbedder, IndexManager, IndexWatcher, LogFormat, LogLevel, Metrics, ProgressChannel,
    ProgressEvent, RerankProvider, SearchOptions, Searcher, SemanticSearchRequest, SemcodeError,
    ToolErrorResponse, ToolHandler, VectorStore,
};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "semcode")]
#[command(author, version, about = "Local semantic code search for AI developer tools", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Embedding model to use
    #[arg(long, default_value = "nomic", env = "SEMCODE_MODEL", global = true)]
    model: String,

    /// Log level (debug|info|warn|error)
    #[arg(long, default_value = "info", env = "SEMCODE_LOG_LEVEL", global = true)]
    log_level: String,

    /// Log format (text|json)
    #[arg(long, default_value = "text", env = "SEMCODE_LOG_FORMAT", global = true)]
    log_format: String,

    /// Enable verbose logging (shorthand for --log-level debug)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build or refresh the search index
    Index {
        /// Path to index
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Search the index
    Search {
        /// Search query
        query: String,

        /// Path to search in
        #[arg(short = 'p', long, default_value = ".")]
        path: PathBuf,

        /// Maximum number of results
        #[arg(short = 'm', long, default_value = "10")]
        limit: usize,

        /// Restrict results to a path prefix inside the root
        #[arg(long)]
        filter_path: Option<String>,

        /// Restrict results to a file glob, e.g. *.ts
        #[arg(long)]
        file_pattern: Option<String>,

        /// Show content of results
        #[arg(short = 'c', long)]
        content: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,

        /// Disable cross-encoder reranking
        #[arg(long)]
        no_rerank: bool,
    },

    /// Watch for file changes and update the index automatically
    Watch {
        /// Path to watch
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Show index statistics
    Stats {
        /// Path to the indexed tree
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Serve semantic_search over line-delimited JSON on stdin/stdout
    Tool {
        /// Root of the tree to serve
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// List available embedding models
    Models,
}

fn init_logging(level: LogLevel, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_filter()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Embedder stand-in when the model cannot load; every call reports the
/// load failure so the pipeline can fall back to keyword search.
struct UnavailableEmbedder {
    dimension: usize,
    message: String,
}

impl EmbeddingProvider for UnavailableEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed_query(&self, _text: &str) -> semcode::Result<Vec<f32>> {
        Err(SemcodeError::ModelLoad(self.message.clone()))
    }

    fn embed_document(&self, _text: &str) -> semcode::Result<Vec<f32>> {
        Err(SemcodeError::ModelLoad(self.message.clone()))
    }

    fn embed_batch(&self, texts: &[String]) -> semcode::EmbedBatchOutcome {
        semcode::EmbedBatchOutcome {
            vectors: vec![],
            failures: texts
                .iter()
                .enumerate()
                .map(|(i, _)| semcode::embedder::EmbedFailure {
                    index: i,
                    message: self.message.clone(),
                })
                .collect(),
        }
    }
}

/// The assembled engine for one root.
struct Engine {
    manager: Arc<IndexManager>,
    searcher: Searcher,
    progress: ProgressChannel,
}

fn build_engine(config: Config, with_reranker: bool, tolerate_model_failure: bool) -> Result<Engine> {
    let embedder: Arc<dyn EmbeddingProvider> = match FastEmbedder::new(&config) {
        Ok(embedder) => Arc::new(embedder),
        Err(e) if tolerate_model_failure => {
            warn!(error = %e, "embedding model unavailable, keyword fallback only");
            Arc::new(UnavailableEmbedder {
                dimension: config.model.dimension(),
                message: e.to_string(),
            })
        }
        Err(e) => return Err(e.into()),
    };

    let reranker: Option<Arc<dyn RerankProvider>> = if with_reranker {
        match CrossEncoderReranker::new(&config) {
            Ok(reranker) => Some(Arc::new(reranker)),
            Err(e) => {
                warn!(error = %e, "reranker unavailable, using boosted ordering");
                None
            }
        }
    } else {
        None
    };

    let store = Arc::new(VectorStore::open(config.clone(), embedder.dimension())?);
    let metrics = Arc::new(Metrics::new());
    let progress = ProgressChannel::new();

    let manager = Arc::new(IndexManager::new(
        config,
        Arc::clone(&store),
        Arc::clone(&embedder),
        Arc::clone(&metrics),
        progress.clone(),
    ));
    let searcher = Searcher::new(store, embedder, reranker, metrics, progress.clone());

    Ok(Engine {
        manager,
        searcher,
        progress,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        LogLevel::Debug
    } else {
        cli.log_level.parse()?
    };
    init_logging(level, cli.log_format.parse()?);

    let model = cli.model.parse()?;

    match cli.command {
        Commands::Index { path } => cmd_index(path, model).await,
        Commands::Search {
            query,
            path,
            limit,
            filter_path,
            file_pattern,
            content,
            json,
            no_rerank,
        } => {
            cmd_search(
                query,
                path,
                limit,
                filter_path,
                file_pattern,
                content,
                json,
                no_rerank,
                model,
            )
            .await
        }
        Commands::Watch { path } => cmd_watch(path, model).await,
        Commands::Stats { path } => cmd_stats(path).await,
        Commands::Tool { path } => cmd_tool(path, model).await,
        Commands::Models => cmd_models(),
    }
}

async fn cmd_index(path: PathBuf, model: semcode::EmbeddingModel) -> Result<()> {
    let path = path.canonicalize()?;
    eprintln!("{} {:?}", "Indexing".cyan().bold(), path);

    let config = Config::new(path).with_model(model);
    config.save()?;
    let engine = build_engine(config, false, false)?;

    let progress_bar = spawn_progress_bar(engine.progress.clone());
    let report = engine.manager.scan().await?;
    progress_bar.abort();

    eprintln!("\n{} {}", "Done:".green().bold(), report);
    engine.manager.shutdown().await?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn cmd_search(
    query: String,
    path: PathBuf,
    limit: usize,
    filter_path: Option<String>,
    file_pattern: Option<String>,
    content: bool,
    json: bool,
    no_rerank: bool,
    model: semcode::EmbeddingModel,
) -> Result<()> {
    let path = path.canonicalize()?;
    let config = Config::new(path).with_model(model);
    let engine = build_engine(config, !no_rerank, true)?;

    engine.manager.ensure_indexed().await?;

    let options = SearchOptions {
        limit,
        path: filter_path,
        file_pattern,
        use_reranking: !no_rerank,
        ..Default::default()
    };
    let results = engine.searcher.hybrid_search(&query, &options).await?;

    if results.is_empty() {
        println!("No results found for: {}", query.yellow());
    } else if json {
        println!("{}", format_results_json(&results)?);
    } else {
        println!(
            "\n{} results for \"{}\":\n",
            results.len().to_string().green().bold(),
            query.cyan()
        );
        print!("{}", format_results(&results, content));
    }

    engine.manager.shutdown().await?;
    Ok(())
}

async fn cmd_watch(path: PathBuf, model: semcode::EmbeddingModel) -> Result<()> {
    let path = path.canonicalize()?;
    eprintln!("{} {:?}", "Watching".cyan().bold(), path);

    let config = Config::new(path).with_model(model);
    config.save()?;
    let engine = build_engine(config, false, false)?;

    let report = engine.manager.scan().await?;
    eprintln!("Initial sync: {report}");

    let watcher = IndexWatcher::start(Arc::clone(&engine.manager))?;
    eprintln!("  Watching for changes. Press Ctrl+C to stop.\n");

    tokio::signal::ctrl_c().await?;
    eprintln!("Shutting down...");

    watcher.stop().await;
    engine.manager.shutdown().await?;
    Ok(())
}

async fn cmd_stats(path: PathBuf) -> Result<()> {
    let path = path.canonicalize()?;
    let config = Config::load(&path.join(semcode::config::INDEX_DIR))?;
    let dimension = config.model.dimension();
    let model_name = config.model.model_name().to_string();
    let store = VectorStore::open(config, dimension)?;

    let chunks = store.count().await?;
    let files = store.indexed_files().await?.len();
    store.close().await?;

    println!("{}", "Index Statistics".cyan().bold());
    println!("  Files:  {}", files.to_string().green());
    println!("  Chunks: {}", chunks.to_string().green());
    println!("  Model:  {}", model_name.yellow());
    Ok(())
}

/// Serve semantic_search requests: one JSON object per stdin line, one JSON
/// response per stdout line. All logging goes to stderr.
async fn cmd_tool(path: PathBuf, model: semcode::EmbeddingModel) -> Result<()> {
    let path = path.canonicalize()?;
    let config = Config::new(path).with_model(model);
    let engine = build_engine(config, true, true)?;
    let handler = ToolHandler::new(Arc::clone(&engine.manager), engine.searcher);

    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();

    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let output = match serde_json::from_str::<SemanticSearchRequest>(&line) {
            Ok(request) => match handler.semantic_search(request).await {
                Ok(response) => serde_json::to_string(&response)?,
                Err(e) => serde_json::to_string(&ToolErrorResponse::from_error(&e))?,
            },
            Err(e) => serde_json::to_string(&ToolErrorResponse::from_error(
                &SemcodeError::Json(e),
            ))?,
        };

        writeln!(stdout, "{output}")?;
        stdout.flush()?;
    }

    engine.manager.shutdown().await?;
    Ok(())
}

fn cmd_models() -> Result<()> {
    println!("{}", "Available Embedding Models".cyan().bold());
    println!();
    println!("  {} (default)", "nomic".green().bold());
    println!("    Optimized for code and technical content (768 dims, ~90MB)");
    println!();
    println!("  {}", "minilm".green().bold());
    println!("    Fast, lightweight model (384 dims, ~30MB)");
    println!();
    println!("  {}", "bge".green().bold());
    println!("    High quality retrieval model (384 dims, ~90MB)");
    println!();
    println!("  {}", "multilingual".green().bold());
    println!("    Supports 100+ languages (384 dims, ~470MB)");
    println!();
    println!("Usage: {} --model minilm", "semcode index".yellow());
    Ok(())
}

/// Mirror progress events onto an indicatif bar until aborted.
fn spawn_progress_bar(progress: ProgressChannel) -> tokio::task::JoinHandle<()> {
    let mut rx = progress.subscribe();
    tokio::spawn(async move {
        let bar = ProgressBar::hidden();
        while let Ok(event) = rx.recv().await {
            match event {
                ProgressEvent::ScanStarted { total_files } => {
                    bar.set_length(total_files as u64);
                    bar.set_draw_target(indicatif::ProgressDrawTarget::stderr());
                    if let Ok(style) = ProgressStyle::default_bar()
                        .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} files")
                    {
                        bar.set_style(style.progress_chars("=>-"));
                    }
                }
                ProgressEvent::FileIndexed { .. } | ProgressEvent::FileFailed { .. } => {
                    bar.inc(1);
                }
                ProgressEvent::ScanCompleted { .. } => {
                    bar.finish_and_clear();
                }
                ProgressEvent::Note(_) => {}
            }
        }
    })
}
