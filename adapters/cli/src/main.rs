#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Command-line host for the Storyworld placement engine.

mod config;
mod report;

use std::{path::PathBuf, sync::Arc};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use storyworld_core::{Command, GeoCoordinate, InteractionTier};
use storyworld_system_catalog::{CatalogResolver, TmdbCatalog};
use storyworld_system_placement::PlacementGenerator;
use storyworld_system_proximity::ProximityClassifier;
use storyworld_system_scanning::Scanning;
use storyworld_world::{apply, query, FileStore, TokioScheduler, World};
use tracing::{info, level_filters::LevelFilter};

use crate::config::AppConfig;

#[derive(Parser, Debug)]
#[command(version, about = "Location-based collectible placement engine")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate and show placements around a location
    Scan {
        /// Player latitude in degrees
        #[arg(allow_negative_numbers = true)]
        lat: f64,
        /// Player longitude in degrees
        #[arg(allow_negative_numbers = true)]
        lon: f64,
        /// Seed for reproducible generation
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Tap a cached placement and collect it when in range
    Tap {
        /// Player latitude in degrees
        #[arg(allow_negative_numbers = true)]
        lat: f64,
        /// Player longitude in degrees
        #[arg(allow_negative_numbers = true)]
        lon: f64,
        /// Canonical key of the tile holding the placement, e.g. `223546-101645-18`
        #[arg(long)]
        tile: String,
        /// Position of the placement within the tile
        #[arg(long, default_value_t = 0)]
        index: usize,
        /// TMDb API key, overriding the configuration file
        #[arg(long, env = "TMDB_API_KEY", hide_env_values = true)]
        api_key: Option<String>,
    },
    /// Drop every cached tile
    Clear,
    /// List cached tiles and their placements
    Tiles,
    /// Inspect or edit the owned collection
    Collection {
        #[command(subcommand)]
        command: CollectionCommands,
    },
}

#[derive(Subcommand, Debug)]
enum CollectionCommands {
    /// List owned collectibles
    List,
    /// Remove a collectible by catalog id
    Remove {
        /// Catalog identifier
        id: u64,
    },
}

/// Entry point for the Storyworld command-line interface.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .try_init();

    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref())?;
    config.validate().context("invalid configuration")?;

    let mut world = open_world(&config)?;
    let mut events = Vec::new();
    apply(&mut world, Command::HideAllTiles, &mut events);
    world.schedule_expiry(config.cache_ttl()?)?;
    world.drain_expired(&mut events);
    print_events(&events);

    match cli.command {
        Commands::Scan { lat, lon, seed } => {
            scan(&config, &mut world, GeoCoordinate::new(lat, lon), seed)
        }
        Commands::Tap {
            lat,
            lon,
            tile,
            index,
            api_key,
        } => {
            tap(
                &config,
                &mut world,
                GeoCoordinate::new(lat, lon),
                &tile,
                index,
                api_key,
            )
            .await
        }
        Commands::Clear => {
            let mut events = Vec::new();
            apply(&mut world, Command::ClearCache, &mut events);
            print_events(&events);
            Ok(())
        }
        Commands::Tiles => {
            for entry in query::cached_tiles(&world) {
                let markers: Vec<String> = entry
                    .placements
                    .iter()
                    .map(report::describe_placement)
                    .collect();
                println!(
                    "{} [{}] {}",
                    entry.tile,
                    entry.placements.len(),
                    markers.join("; ")
                );
            }
            println!("last sweep at {}ms", query::last_sweep(&world).as_millis());
            Ok(())
        }
        Commands::Collection { command } => collection(&mut world, command),
    }
}

fn open_world(config: &AppConfig) -> Result<World> {
    let store = FileStore::open(&config.storage.directory).with_context(|| {
        format!(
            "failed to open storage directory {}",
            config.storage.directory.display()
        )
    })?;
    let scheduler = TokioScheduler::current().context("no tokio runtime available")?;
    Ok(World::load(Arc::new(store), Arc::new(scheduler)))
}

fn scan(
    config: &AppConfig,
    world: &mut World,
    center: GeoCoordinate,
    seed: Option<u64>,
) -> Result<()> {
    let generator = PlacementGenerator::new(config.placement()?, config.spacing()?)?;
    let mut scanning = Scanning::new(config.scanning()?, generator);
    scanning.prime(&query::cached_placements(world));

    let mut rng = match seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    };

    let mut commands = Vec::new();
    scanning.scan(
        center,
        |tile| query::is_cached(world, tile),
        &mut rng,
        &mut commands,
    );

    let mut events = Vec::new();
    for command in commands {
        apply(world, command, &mut events);
    }
    scanning.handle(&events);
    print_events(&events);
    Ok(())
}

async fn tap(
    config: &AppConfig,
    world: &mut World,
    player: GeoCoordinate,
    tile_key: &str,
    index: usize,
    api_key: Option<String>,
) -> Result<()> {
    let entry = query::tile_by_key(world, tile_key)?
        .with_context(|| format!("tile {tile_key} is not cached; scan first"))?;
    let Some(placement) = entry.placements.get(index).copied() else {
        bail!("tile {tile_key} has no placement at index {index}");
    };

    let classifier = ProximityClassifier::new(config.proximity()?);
    let tier = classifier.classify(player, placement.location());
    println!("{}", report::describe_tier(tier));
    if tier != InteractionTier::Direct {
        return Ok(());
    }

    let Some(api_key) = api_key.or_else(|| config.catalog.api_key.clone()) else {
        bail!("collecting needs a TMDb API key (--api-key, TMDB_API_KEY or [catalog] api_key)");
    };
    let source = TmdbCatalog::with_endpoint(
        api_key,
        config.catalog.base_url.as_str(),
        config.catalog_timeout(),
    )?;
    let resolver = CatalogResolver::new(source, config.catalog()?);
    let collectible = resolver
        .resolve(&placement, &mut ChaCha8Rng::from_entropy())
        .await
        .context("collect failed, nothing was saved")?;
    info!(id = collectible.id, "collect resolved");

    let mut events = Vec::new();
    apply(world, Command::Collect { collectible }, &mut events);
    print_events(&events);
    Ok(())
}

fn collection(world: &mut World, command: CollectionCommands) -> Result<()> {
    match command {
        CollectionCommands::List => {
            let items = query::collection(world);
            if items.is_empty() {
                println!("collection is empty");
            }
            for item in items {
                println!("{}", report::describe_collectible(item));
            }
        }
        CollectionCommands::Remove { id } => {
            let mut events = Vec::new();
            apply(world, Command::RemoveCollectible { id }, &mut events);
            if events.is_empty() {
                bail!("collectible {id} is not owned");
            }
            print_events(&events);
        }
    }
    Ok(())
}

fn print_events(events: &[storyworld_core::Event]) {
    for event in events {
        println!("{}", report::describe_event(event));
    }
}
