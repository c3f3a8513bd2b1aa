//! Browse a paginated movie listing that keeps working offline.
//!
//! # Commands
//!
//! - `browse` - Load the listing (online when reachable) and scroll further pages
//! - `offline` - Show the stored listing without touching the network
//! - `like` - Toggle whether a movie is liked
//! - `liked` - Show whether a movie is liked
//! - `clear` - Forget every stored movie

mod error;

use crate::error::{ErrorKind, Result};
use clap::{Parser, Subcommand};
use exn::ResultExt;
use futures::StreamExt;
use reel_config::Config;
use reel_remote::RemoteClient;
use reel_store::Database;
use reel_sync::{Connectivity, HydrationEvent, ProbeConnectivity, Settings, Source, StaticConnectivity, SyncEngine};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// How long to wait for one page's artwork before giving up on it.
const HYDRATION_GRACE: Duration = Duration::from_secs(60);

#[derive(Parser)]
#[command(name = "reel")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(global = true, short, long)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the listing and scroll through further pages
    Browse {
        /// Number of pages to load after the first
        #[arg(short, long, default_value = "0")]
        pages: u32,

        /// Never touch the network
        #[arg(long)]
        offline: bool,
    },

    /// Show the stored listing without touching the network
    Offline,

    /// Toggle whether a movie is liked
    Like {
        /// Movie id
        id: i64,
    },

    /// Show whether a movie is liked
    Liked {
        /// Movie id
        id: i64,
    },

    /// Forget every stored movie (the liked set is kept)
    Clear,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if cli.verbose { "debug" } else { "warn" }));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::FAILURE
        },
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref()).or_raise(|| ErrorKind::Config)?;
    match cli.command {
        Commands::Browse { pages, offline } => browse(&config, pages, offline).await,
        Commands::Offline => browse(&config, 0, true).await,
        Commands::Like { id } => {
            let engine = open(&config, Arc::new(StaticConnectivity::new(false))).await?;
            let liked = engine.toggle_liked(id).await.or_raise(|| ErrorKind::Sync)?;
            println!("{id}: {}", if liked { "liked" } else { "not liked" });
            Ok(())
        },
        Commands::Liked { id } => {
            let engine = open(&config, Arc::new(StaticConnectivity::new(false))).await?;
            let liked = engine.is_liked(id).await.or_raise(|| ErrorKind::Sync)?;
            println!("{id}: {}", if liked { "liked" } else { "not liked" });
            Ok(())
        },
        Commands::Clear => {
            let engine = open(&config, Arc::new(StaticConnectivity::new(false))).await?;
            let removed = engine.clear().await.or_raise(|| ErrorKind::Sync)?;
            println!("Removed {removed} stored movies");
            Ok(())
        },
    }
}

fn settings(config: &Config) -> Settings {
    Settings {
        discover_url: config.api.discover_url.clone(),
        api_key: config.api.api_key.clone(),
        language: config.api.language.clone(),
        sort_by: config.api.sort_by.clone(),
        include_adult: config.api.include_adult,
        include_video: config.api.include_video,
        image_base_url: config.images.base_url.clone(),
        poster_size: config.images.poster,
        backdrop_size: config.images.backdrop,
        hydration_delay: config.sync.hydration_delay(),
    }
}

async fn open(config: &Config, connectivity: Arc<dyn Connectivity>) -> Result<SyncEngine> {
    let path = &config.store.database;
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).or_raise(|| ErrorKind::Store)?;
    }
    tracing::debug!(path = %path.display(), "Opening store");
    let db = Database::connect(path).await.or_raise(|| ErrorKind::Store)?;
    let client = RemoteClient::http(config.api.request_timeout()).or_raise(|| ErrorKind::Remote)?;
    Ok(SyncEngine::new(settings(config), client, &db, connectivity))
}

async fn browse(config: &Config, pages: u32, offline: bool) -> Result<()> {
    let connectivity: Arc<dyn Connectivity> = if offline {
        Arc::new(StaticConnectivity::new(false))
    } else {
        config.validate().or_raise(|| ErrorKind::Config)?;
        let probe = ProbeConnectivity::for_endpoint(&config.api.discover_url, config.sync.probe_interval())
            .or_raise(|| ErrorKind::Config)?;
        probe.refresh().await;
        probe.start();
        Arc::new(probe)
    };

    let engine = open(config, Arc::clone(&connectivity)).await?;
    let mut events = Box::pin(engine.hydration_events());

    let source = engine.load().await.or_raise(|| ErrorKind::Sync)?;
    tracing::info!(%source, count = engine.movies().len(), "Listing loaded");
    let mut batches = usize::from(source == Source::Online && !engine.movies().is_empty());

    if source == Source::Online {
        for _ in 0..pages {
            let Some(last) = engine.movies().last() else {
                break;
            };
            let Some(next) = engine.should_fetch_next_page(&last) else {
                break;
            };
            let outcome = next.await.or_raise(|| ErrorKind::Task)?.or_raise(|| ErrorKind::Sync)?;
            if outcome.replaced + outcome.appended > 0 {
                batches += 1;
            }
        }
    }
    connectivity.stop();

    while batches > 0 {
        match tokio::time::timeout(config.sync.hydration_delay() + HYDRATION_GRACE, events.next()).await {
            Ok(Some(HydrationEvent::BatchComplete { hydrated, failed })) => {
                tracing::debug!(hydrated, failed, "Artwork attached");
                batches -= 1;
            },
            Ok(Some(HydrationEvent::Failed { id, error })) => {
                tracing::warn!(id, %error, "No artwork");
            },
            Ok(Some(HydrationEvent::Hydrated { .. })) => {},
            Ok(None) => break,
            Err(_) => {
                tracing::warn!(remaining = batches, "Gave up waiting for artwork");
                break;
            },
        }
    }

    print_listing(&engine, source).await
}

async fn print_listing(engine: &SyncEngine, source: Source) -> Result<()> {
    let movies = engine.movies().items();
    println!("{} movies ({source}, page {})", movies.len(), engine.current_page());
    for (index, movie) in movies.iter().enumerate() {
        let liked = match movie.id {
            Some(id) => engine.is_liked(id).await.or_raise(|| ErrorKind::Sync)?,
            None => false,
        };
        let id = movie.id.map(|id| id.to_string()).unwrap_or_else(|| "-".to_string());
        println!(
            "{:>4}  {id:>8}  {:<40}  {:<10}  {:>4.1}  {}{}",
            index + 1,
            movie.title,
            movie.release_date,
            movie.vote_average,
            if movie.poster_data.is_some() { "poster " } else { "" },
            if liked { "liked" } else { "" },
        );
    }
    Ok(())
}
