//! # BidOps CLI (`bidops`)
//!
//! Command-line interface to the tender document pipeline: database
//! initialization, project registration, folder ingestion, semantic
//! search, and LLM-backed extraction.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `bidops init` | Create the SQLite database and run schema migrations |
//! | `bidops project add <name> <folder>` | Register a project folder |
//! | `bidops ingest <project>` | Ingest the project folder |
//! | `bidops search "<query>"` | Semantic search over indexed chunks |
//! | `bidops summary <project>` | Extract the structured project summary |
//! | `bidops checklist <project>` | Generate the requirements checklist |
//! | `bidops classify <document>` | LLM-classify one document |
//! | `bidops ask <project> "<question>"` | Grounded Q&A with citations |
//! | `bidops key-dates <project>` | Extract key dates |
//! | `bidops status <project>` | Per-status/category document counts |

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use bidops::config::{load_config, Config};
use bidops::extract::ExtractionEngine;
use bidops::ingest::IngestOrchestrator;
use bidops::llm::LlmRouter;
use bidops::models::DocumentCategory;
use bidops::parsers::ocr::TesseractOcr;
use bidops::parsers::ParserRegistry;
use bidops::progress::ProgressMode;
use bidops::vector::{MemoryStore, QdrantStore, VectorIndex, VectorStore};
use bidops::{db, embedding, migrate, store};

/// BidOps — a document ingestion and evidence-grounded extraction
/// pipeline for tender management.
#[derive(Parser)]
#[command(
    name = "bidops",
    about = "Tender document ingestion, search, and extraction pipeline",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/bidops.toml")]
    config: PathBuf,

    /// Progress output on stderr: auto, off, human, json.
    #[arg(long, global = true, default_value = "auto")]
    progress: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// Manage projects.
    Project {
        #[command(subcommand)]
        command: ProjectCommands,
    },

    /// Ingest all documents from a project folder.
    Ingest {
        /// Project id.
        project: String,
        /// Override the project's registered folder.
        #[arg(long)]
        folder: Option<PathBuf>,
        /// Reprocess files even when their content hash is unchanged.
        #[arg(long)]
        force: bool,
    },

    /// Semantic search over indexed chunks.
    Search {
        query: String,
        /// Restrict to one project.
        #[arg(long)]
        project: Option<String>,
        /// Restrict to categories (repeatable).
        #[arg(long)]
        category: Vec<String>,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        #[arg(long, default_value_t = 0.5)]
        min_score: f64,
    },

    /// Extract the structured project summary.
    Summary {
        project: String,
        /// Re-extract even if a summary is cached.
        #[arg(long)]
        refresh: bool,
    },

    /// Generate the requirements checklist.
    Checklist {
        project: String,
        #[arg(long)]
        refresh: bool,
    },

    /// Classify one document with the LLM tier.
    Classify { document: String },

    /// Ask a question answered strictly from project documents.
    Ask {
        project: String,
        question: String,
        #[arg(long, default_value_t = 5)]
        top_k: usize,
    },

    /// Extract key dates from project documents.
    KeyDates { project: String },

    /// Show per-status and per-category document counts.
    Status { project: String },
}

#[derive(Subcommand)]
enum ProjectCommands {
    /// Register a project and its document folder.
    Add { name: String, folder: PathBuf },
}

fn build_vector_index(config: &Config) -> Result<Arc<VectorIndex>> {
    let store: Arc<dyn VectorStore> = match config.vector.backend.as_str() {
        "memory" => Arc::new(MemoryStore::new()),
        _ => Arc::new(QdrantStore::new(&config.vector)?),
    };
    let provider: Arc<dyn embedding::EmbeddingProvider> =
        embedding::create_provider(&config.embedding)?.into();
    Ok(Arc::new(VectorIndex::new(store, provider)))
}

fn build_registry(config: &Config) -> Arc<ParserRegistry> {
    let ocr = Arc::new(TesseractOcr::new(config.ocr.clone()));
    Arc::new(ParserRegistry::from_config(config, ocr))
}

fn build_engine(
    config: &Config,
    pool: sqlx::SqlitePool,
    index: Arc<VectorIndex>,
) -> Result<ExtractionEngine> {
    let router = Arc::new(LlmRouter::from_config(&config.llm)?);
    Ok(ExtractionEngine::new(
        pool,
        index,
        router,
        config.extraction.clone(),
    ))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config.display()))?;

    let progress_mode = match cli.progress.as_str() {
        "off" => ProgressMode::Off,
        "human" => ProgressMode::Human,
        "json" => ProgressMode::Json,
        _ => ProgressMode::default_for_tty(),
    };

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&config).await?;
            migrate::run_migrations(&pool).await?;
            pool.close().await;
            println!("database initialized at {}", config.db.path.display());
        }

        Commands::Project { command } => match command {
            ProjectCommands::Add { name, folder } => {
                let pool = db::connect(&config).await?;
                migrate::run_migrations(&pool).await?;
                let folder = folder
                    .canonicalize()
                    .with_context(|| format!("folder not found: {}", folder.display()))?;
                let id = store::create_project(&pool, &name, &folder.display().to_string()).await?;
                pool.close().await;
                println!("project {} registered: {}", name, id);
            }
        },

        Commands::Ingest {
            project,
            folder,
            force,
        } => {
            let pool = db::connect(&config).await?;
            migrate::run_migrations(&pool).await?;
            let index = build_vector_index(&config)?;
            let registry = build_registry(&config);
            let orchestrator = IngestOrchestrator::new(pool.clone(), registry, index, &config)?;

            let reporter = progress_mode.reporter();
            let stats = orchestrator
                .ingest(&project, folder.as_deref(), force, reporter.as_ref())
                .await?;
            pool.close().await;

            println!("ingest {}", project);
            println!("  total files: {}", stats.total_files);
            println!("  processed: {}", stats.processed);
            println!("  indexed: {}", stats.indexed);
            println!("  skipped: {}", stats.skipped);
            println!("  failed: {}", stats.failed);
            for error in &stats.errors {
                println!("  error: {}: {}", error.file, error.error);
            }
            println!("ok");
        }

        Commands::Search {
            query,
            project,
            category,
            limit,
            min_score,
        } => {
            let pool = db::connect(&config).await?;
            let index = build_vector_index(&config)?;
            let registry = build_registry(&config);
            let orchestrator = IngestOrchestrator::new(pool.clone(), registry, index, &config)?;

            let categories: Vec<DocumentCategory> =
                category.iter().map(|c| DocumentCategory::parse(c)).collect();
            let results = orchestrator
                .search(&query, project.as_deref(), &categories, limit, min_score)
                .await?;
            pool.close().await;

            if results.is_empty() {
                println!("No results.");
            } else {
                print_json(&results)?;
            }
        }

        Commands::Summary { project, refresh } => {
            let pool = db::connect(&config).await?;
            let index = build_vector_index(&config)?;
            let engine = build_engine(&config, pool.clone(), index)?;
            let summary = engine.extract_summary(&project, refresh).await?;
            pool.close().await;
            print_json(&summary)?;
        }

        Commands::Checklist { project, refresh } => {
            let pool = db::connect(&config).await?;
            let index = build_vector_index(&config)?;
            let engine = build_engine(&config, pool.clone(), index)?;
            let checklist = engine.generate_checklist(&project, refresh).await?;
            pool.close().await;
            print_json(&checklist)?;
        }

        Commands::Classify { document } => {
            let pool = db::connect(&config).await?;
            let index = build_vector_index(&config)?;
            let engine = build_engine(&config, pool.clone(), index)?;
            let result = engine.classify_document(&document).await?;
            pool.close().await;
            print_json(&result)?;
        }

        Commands::Ask {
            project,
            question,
            top_k,
        } => {
            let pool = db::connect(&config).await?;
            let index = build_vector_index(&config)?;
            let engine = build_engine(&config, pool.clone(), index)?;
            let answer = engine.search_with_context(&question, &project, top_k).await?;
            pool.close().await;
            print_json(&answer)?;
        }

        Commands::KeyDates { project } => {
            let pool = db::connect(&config).await?;
            let index = build_vector_index(&config)?;
            let engine = build_engine(&config, pool.clone(), index)?;
            let dates = engine.extract_key_dates(&project).await?;
            pool.close().await;
            print_json(&dates)?;
        }

        Commands::Status { project } => {
            let pool = db::connect(&config).await?;
            let record = store::get_project(&pool, &project).await?;
            println!("project {} ({})", record.name, record.status);
            println!("  folder: {}", record.folder_path);
            println!("  by status:");
            for (status, n) in store::status_counts(&pool, &project).await? {
                println!("    {}: {}", status, n);
            }
            println!("  by category:");
            for (category, n) in store::category_counts(&pool, &project).await? {
                println!("    {}: {}", category, n);
            }
            pool.close().await;
        }
    }

    Ok(())
}
