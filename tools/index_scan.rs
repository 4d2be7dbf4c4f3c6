use std::env;
use std::path::PathBuf;

use library::{config_path_from_env, load_or_create_config, save_config, Library};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config_path = config_path_from_env();
    let (mut config, created) = load_or_create_config(&config_path)?;
    if created {
        println!("Wrote default config to {}", config_path.display());
    }

    // a music root passed on the command line overrides the config
    if let Some(root) = env::args().nth(1) {
        config.root_dirs = vec![root];
        save_config(&config_path, &config)?;
    }

    let db_path = env::var("SONORITE_INDEX")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("data/library.redb"));

    let library = Library::open(config, &db_path)?;
    library.load()?;
    let stats = library.rescan_blocking()?;

    let totals = library.stats();
    println!(
        "Indexed {} new, removed {} stale ({} unreadable). Catalog: {} tracks, {} albums, {} artists",
        stats.tagged, stats.removed, stats.skipped, totals.tracks, totals.albums, totals.artists
    );

    Ok(())
}
