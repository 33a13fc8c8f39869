// ============================================================================
// chronicle - build and query hierarchical memory from the command line
// ============================================================================
// Usage:
//   chronicle build --input msgs.json --output chunks.json   Build the chunk hierarchy
//   chronicle retrieve --chunks chunks.json --query "..."    Assemble context for a query
//   chronicle stats                                          Show chunk cache statistics
//   chronicle clear-cache [--dry-run]                        Empty the chunk cache
// ============================================================================

use anyhow::{Context, Result};
use chrono::{TimeZone, Utc};
use clap::{Parser, Subcommand};
use chronicle_core::context_tree::render_context_tree;
use chronicle_core::{
    ChronicleConfig, ChunkDb, EntityCard, Interaction, LlmCollaborator, MemoryBuilder,
    MemoryChunk, MultiStageRetriever, OfflineCollaborator, OpenAiCollaborator, PersonaCard,
    SituationCard,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Hierarchical cross-channel memory tool
#[derive(Parser)]
#[command(name = "chronicle", version, about = "Build and query hierarchical cross-channel memory")]
struct Cli {
    /// Path to the chunk cache (default: ~/.chronicle/chunks.redb)
    #[arg(long, global = true)]
    cache_path: Option<PathBuf>,

    /// JSON config file; CHRONICLE_* environment variables still apply on top
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Use the deterministic offline collaborator instead of the HTTP API
    #[arg(long, global = true)]
    offline: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Summarize interactions into a chunk hierarchy
    Build {
        /// JSON array of interactions
        #[arg(long)]
        input: PathBuf,

        /// Where to write the JSON array of chunks
        #[arg(long)]
        output: PathBuf,

        /// Interactions per level-0 chunk
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Chunks per group above level 0
        #[arg(long)]
        group_size: Option<usize>,
    },

    /// Select chunks for a query and print the assembled context
    Retrieve {
        /// JSON array of chunks produced by `build`
        #[arg(long)]
        chunks: PathBuf,

        #[arg(long)]
        query: String,

        /// Number of chunks to select
        #[arg(short, long, default_value = "5")]
        k: usize,

        /// Entity to focus on, as ID or ID=DESCRIPTION (repeatable)
        #[arg(long = "entity")]
        entities: Vec<String>,

        /// Persona summary text
        #[arg(long)]
        persona: Option<String>,

        /// Situation summary text
        #[arg(long)]
        situation: Option<String>,

        /// Also print the chunk tree
        #[arg(long)]
        tree: bool,
    },

    /// Show chunk cache statistics
    Stats,

    /// Delete every cached chunk
    ClearCache {
        /// Show what would be deleted without deleting
        #[arg(long)]
        dry_run: bool,
    },
}

fn format_timestamp(ts: i64) -> String {
    Utc.timestamp_opt(ts, 0)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| format!("(invalid: {})", ts))
}

fn parse_entity(raw: &str) -> EntityCard {
    match raw.split_once('=') {
        Some((id, description)) => EntityCard::new(id.trim(), id.trim(), description.trim()),
        None => EntityCard::new(raw.trim(), raw.trim(), ""),
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Failed to parse {}", path.display()))
}

fn collaborator(config: &ChronicleConfig, offline: bool) -> Result<Arc<dyn LlmCollaborator>> {
    if offline {
        info!("Using offline collaborator");
        return Ok(Arc::new(OfflineCollaborator::new()));
    }
    let client = OpenAiCollaborator::from_settings(&config.llm)?;
    info!("Using {} at {}", client.chat_model(), client.base_url());
    Ok(Arc::new(client))
}

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        // A missing .env is normal
        if !e.not_found() {
            eprintln!("Warning: Could not load .env file: {}", e);
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("chronicle_core=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = match cli.config.as_deref() {
        Some(path) => ChronicleConfig::load(path)?,
        None => ChronicleConfig::from_env()?,
    };
    if cli.cache_path.is_some() {
        config.cache_path = cli.cache_path.clone();
    }

    match cli.command {
        Commands::Build {
            input,
            output,
            chunk_size,
            group_size,
        } => {
            if let Some(n) = chunk_size {
                config.builder.chunk_size = n;
            }
            if let Some(n) = group_size {
                config.builder.group_size = n;
            }
            cmd_build(&config, cli.offline, &input, &output).await
        }
        Commands::Retrieve {
            chunks,
            query,
            k,
            entities,
            persona,
            situation,
            tree,
        } => {
            let request = RetrieveArgs {
                chunks,
                query,
                k,
                entities,
                persona,
                situation,
                tree,
            };
            cmd_retrieve(&config, cli.offline, request).await
        }
        Commands::Stats => cmd_stats(&open_cache(&config)?),
        Commands::ClearCache { dry_run } => cmd_clear_cache(&open_cache(&config)?, dry_run),
    }
}

fn open_cache(config: &ChronicleConfig) -> Result<ChunkDb> {
    ChunkDb::open(config.cache_path.as_deref())
}

async fn cmd_build(config: &ChronicleConfig, offline: bool, input: &Path, output: &Path) -> Result<()> {
    let interactions: Vec<Interaction> = read_json(input)?;
    let cache = Arc::new(open_cache(config)?);
    let llm = collaborator(config, offline)?;

    let builder = MemoryBuilder::from_config(llm, cache, &config.builder);
    let chunks = builder.build(&interactions).await?;

    let mut per_level: BTreeMap<u32, usize> = BTreeMap::new();
    for chunk in &chunks {
        *per_level.entry(chunk.level).or_default() += 1;
    }

    println!("=== Chronicle Build ===");
    println!("Interactions: {}", interactions.len());
    println!(
        "Chunk size:   {}  Group size: {}",
        config.builder.chunk_size, config.builder.group_size
    );
    for (level, count) in &per_level {
        println!("  level {:<3} {} chunks", level, count);
    }
    println!("Total:        {} chunks", chunks.len());

    std::fs::write(output, serde_json::to_string_pretty(&chunks)?)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!("Wrote {}", output.display());
    Ok(())
}

struct RetrieveArgs {
    chunks: PathBuf,
    query: String,
    k: usize,
    entities: Vec<String>,
    persona: Option<String>,
    situation: Option<String>,
    tree: bool,
}

async fn cmd_retrieve(config: &ChronicleConfig, offline: bool, args: RetrieveArgs) -> Result<()> {
    let chunks: Vec<MemoryChunk> = read_json(&args.chunks)?;
    if chunks.is_empty() {
        warn!("{} holds no chunks", args.chunks.display());
    }

    let llm = collaborator(config, offline)?;
    let retriever = MultiStageRetriever::from_config(llm, config);

    let persona = args.persona.map(|text| PersonaCard::new("Persona", text));
    let situation = args.situation.map(|text| SituationCard::new("Situation", text));
    let entities: Vec<EntityCard> = args.entities.iter().map(|e| parse_entity(e)).collect();

    let retrieval = retriever
        .retrieve(
            &args.query,
            persona.as_ref(),
            &entities,
            situation.as_ref(),
            &chunks,
            args.k,
        )
        .await?;

    println!("{}", retrieval.context);

    if args.tree {
        println!("=== Selected chunks ===");
        print!("{}", render_context_tree(&retrieval.chunks));
        println!();
        println!("=== Full hierarchy ===");
        print!("{}", render_context_tree(&chunks));
    }
    Ok(())
}

fn cmd_stats(db: &ChunkDb) -> Result<()> {
    let stats = db.stats()?;

    println!("=== Chronicle Chunk Cache Stats ===");
    println!("Cache: {}", db.path().display());
    println!();
    println!("Chunks: {} total", stats.total_chunks);
    for (level, count) in &stats.level_counts {
        println!("  level {:<3} {}", level, count);
    }
    println!("Covered interactions: {}", stats.total_covered_interactions);

    if let Some(newest) = db.list_chunks()?.iter().map(|r| r.stored_at).max() {
        println!("Last write: {}", format_timestamp(newest));
    }
    Ok(())
}

fn cmd_clear_cache(db: &ChunkDb, dry_run: bool) -> Result<()> {
    if dry_run {
        println!("=== DRY RUN (no data will be deleted) ===\n");
        let records = db.list_chunks()?;
        println!("Would delete {} cached chunks:", records.len());
        for record in records.iter().take(20) {
            println!(
                "  {}  L{}  {}",
                &record.key[..12.min(record.key.len())],
                record.chunk.level,
                format_timestamp(record.stored_at)
            );
        }
        if records.len() > 20 {
            println!("  ... and {} more", records.len() - 20);
        }
        return Ok(());
    }

    let removed = db.clear()?;
    println!("Deleted {} cached chunks from {}", removed, db.path().display());
    Ok(())
}
