use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use pezzottify_library::config::{AppConfig, CliConfig, FileConfig};
use pezzottify_library::{
    LibraryEngine, ScanEvent, ScanSummary, SearchQuery, SearchType, SqliteLibraryStore, TrackEvent,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
#[clap(version = env!("LIBRARY_INDEXER_VERSION"))]
struct CliArgs {
    /// Path to the SQLite library database file.
    #[clap(long, value_parser = parse_path)]
    pub db: Option<PathBuf>,

    /// Path to a TOML config file. Values in the file override CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Library directory to index. Can be repeated.
    #[clap(long = "dir", value_parser = parse_path)]
    pub directories: Vec<PathBuf>,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan every library directory once.
    Scan {
        /// Reprocess files even if they did not change.
        #[clap(long)]
        force: bool,
    },
    /// Scan on startup (per config) and keep the library in sync until Ctrl-C.
    Watch,
    /// Search the library.
    Search {
        query: String,
        #[clap(long = "type", default_value = "tracks")]
        search_type: SearchType,
        /// Match term prefixes.
        #[clap(long)]
        fuzzy: bool,
        #[clap(long, default_value_t = 20)]
        limit: usize,
    },
    /// Show library totals and slow operation metrics.
    Stats,
    /// List applied schema migrations.
    Migrations,
}

fn print_summary(summary: &ScanSummary) {
    println!(
        "Scanned {} files in {}ms: {} added, {} updated, {} skipped, {} removed, {} errors{}",
        summary.total_files,
        summary.duration_ms,
        summary.added,
        summary.updated,
        summary.skipped,
        summary.removed,
        summary.errors.len(),
        if summary.cancelled { " (cancelled)" } else { "" }
    );
    for file_error in summary.errors.iter().take(20) {
        println!("  {}: {}", file_error.path, file_error.message);
    }
    if summary.errors.len() > 20 {
        println!("  ... and {} more", summary.errors.len() - 20);
    }
}

/// Drive a progress bar from scan events until the scan completes.
fn spawn_progress_bar(engine: &LibraryEngine) -> tokio::task::JoinHandle<()> {
    let mut events = engine.events().subscribe_scan();
    tokio::spawn(async move {
        let pb = ProgressBar::new(0);
        if let Ok(style) =
            ProgressStyle::default_bar().template("[{elapsed_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7} {msg}")
        {
            pb.set_style(style.progress_chars("##-"));
        }
        loop {
            match events.recv().await {
                Ok(ScanEvent::Progress(progress)) => {
                    pb.set_length(progress.total as u64);
                    pb.set_position(progress.processed as u64);
                    pb.set_message(progress.operation);
                }
                Ok(ScanEvent::Completed(_)) | Ok(ScanEvent::Error { .. }) => break,
                Ok(ScanEvent::Started { .. }) => {}
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            }
        }
        pb.finish_and_clear();
    })
}

async fn run_scan(engine: &LibraryEngine, force: bool) -> Result<()> {
    let progress = spawn_progress_bar(engine);
    let summary = engine.rescan(force).await.context("Library scan failed")?;
    let _ = progress.await;
    print_summary(&summary);
    Ok(())
}

async fn run_watch(engine: Arc<LibraryEngine>) -> Result<()> {
    let mut track_events = engine.events().subscribe_tracks();
    tokio::spawn(async move {
        loop {
            match track_events.recv().await {
                Ok(TrackEvent::Added { path, .. }) => info!("Added {}", path),
                Ok(TrackEvent::Changed { path, .. }) => info!("Updated {}", path),
                Ok(TrackEvent::Removed { path, .. }) => info!("Removed {}", path),
                Ok(TrackEvent::Scanned { .. }) => {}
                Err(RecvError::Lagged(skipped)) => warn!("Missed {} track events", skipped),
                Err(RecvError::Closed) => break,
            }
        }
    });

    if let Some(summary) = engine.start().await.context("Library startup failed")? {
        print_summary(&summary);
    }
    info!("Watching for changes, press Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    engine.shutdown().await;
    Ok(())
}

fn run_search(
    engine: &LibraryEngine,
    query: String,
    search_type: SearchType,
    fuzzy: bool,
    limit: usize,
) -> Result<()> {
    let query = SearchQuery::new(query, search_type)
        .fuzzy(fuzzy)
        .page(limit, 0);
    let results = engine.store().search_tracks(&query)?;
    for track in &results.tracks {
        println!(
            "{} - {} [{}] {}",
            track.artist.as_deref().unwrap_or("Unknown artist"),
            track.title,
            track.album.as_deref().unwrap_or("-"),
            track.file_path
        );
    }
    for album in &results.albums {
        println!("album: {} - {} ({} tracks)", album.artist, album.name, album.track_count);
    }
    for artist in &results.artists {
        println!("artist: {} ({} tracks)", artist.name, artist.track_count);
    }
    println!(
        "{} results in {}ms{}",
        results.tracks.len() + results.albums.len() + results.artists.len(),
        results.elapsed_ms,
        if results.used_fallback { " (substring fallback)" } else { "" }
    );
    Ok(())
}

fn run_stats(engine: &LibraryEngine) -> Result<()> {
    let stats = engine.store().get_library_stats()?;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    let summaries = engine.store().get_metric_summaries()?;
    if !summaries.is_empty() {
        println!("Slow operations:");
        for summary in summaries {
            println!(
                "  {:<28} count {:>6}  avg {:>8.1}ms  max {:>6}ms",
                summary.operation, summary.count, summary.avg_duration_ms, summary.max_duration_ms
            );
        }
    }
    Ok(())
}

fn run_migrations(engine: &LibraryEngine) -> Result<()> {
    for migration in engine.store().get_applied_migrations()? {
        let applied_at = chrono::DateTime::from_timestamp_millis(migration.applied_at)
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| migration.applied_at.to_string());
        println!("{}  {}  {}", migration.version, applied_at, migration.description);
    }
    println!(
        "Schema version: {}",
        engine.store().schema_version()?.unwrap_or_else(|| "none".to_string())
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    let file_config = match &cli_args.config {
        Some(path) => Some(FileConfig::load(path)?),
        None => None,
    };
    let cli_config = CliConfig {
        db_path: cli_args.db.clone(),
        directories: cli_args.directories.clone(),
    };
    let config = AppConfig::resolve(&cli_config, file_config)?;

    info!("Opening SQLite library database at {:?}...", config.db_path);
    let store = SqliteLibraryStore::open(&config.db_path, config.read_pool_size)
        .with_context(|| format!("Failed to open library database {:?}", config.db_path))?
        .with_search_history_limit(config.library.search_history_limit);
    let engine = Arc::new(LibraryEngine::new(store, config.library));

    let result = match cli_args.command {
        Command::Scan { force } => run_scan(&engine, force).await,
        Command::Watch => run_watch(engine.clone()).await,
        Command::Search {
            query,
            search_type,
            fuzzy,
            limit,
        } => run_search(&engine, query, search_type, fuzzy, limit),
        Command::Stats => run_stats(&engine),
        Command::Migrations => run_migrations(&engine),
    };
    if let Err(e) = &result {
        error!("{:#}", e);
    }
    result
}
