//! world-grid-server binary
//!
//! Loads every world, zone grid, startup table and heightmap, reports what
//! was loaded, and shuts down. Used to validate a data tree before the
//! game server boots from it.
//!
//! ## Configuration (env / TOML via `config` crate)
//!
//! | Key                         | Default | Description                        |
//! |-----------------------------|---------|------------------------------------|
//! | `WORLD_DATA_DIR`            | `Data`  | Root of the data tree              |
//! | `WORLD_HEIGHTMAPS_ENABLED`  | `true`  | Read `hmap.dat` files              |
//! | `WORLD_SNOWING`             | `false` | Initial weather flag               |

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use world_grid::{JsonTables, WorldService, WorldServiceConfig};

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "world-grid-server", about = "World Grid loader", version)]
struct Args {
    /// Optional config file (TOML/JSON)
    #[arg(long, env = "WORLD_CONFIG")]
    config: Option<PathBuf>,

    /// Data directory, overrides the config file
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Skip heightmap loading
    #[arg(long)]
    no_heightmaps: bool,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    // Initialise logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("world_grid=debug".parse()?),
        )
        .init();

    let args = Args::parse();

    let mut config = WorldServiceConfig::load(args.config.as_deref())
        .context("Failed to read world service configuration")?;
    if let Some(data_dir) = args.data_dir {
        config.data_dir = data_dir;
    }
    if args.no_heightmaps {
        config.heightmaps_enabled = false;
    }

    tracing::info!(
        data_dir = %config.data_dir.display(),
        heightmaps = config.heightmaps_enabled,
        "Starting world-grid-server"
    );

    let tables = JsonTables::new(config.data_dir.join("tables"));
    let service = WorldService::load(config, &tables).context("World data failed to load")?;
    service.load_heightmaps()?;

    let stats = service.stats();
    tracing::info!(
        worlds = stats.worlds,
        zones = stats.zones,
        regions = stats.regions,
        heightmaps = stats.heightmaps_loaded,
        area_shapes = stats.area_shapes,
        "World data ready"
    );
    println!("{}", serde_json::to_string_pretty(&stats)?);

    service.shutdown();
    Ok(())
}
