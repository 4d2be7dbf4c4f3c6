use std::path::Path;
use std::sync::Arc;

use catalog::{Catalog, CatalogStats};
use metadata::{build_track, LoftyExtractor, MetadataExtractor};
use notify::RecommendedWatcher;
use parking_lot::{Mutex, RwLock};
use tracing::{info, warn};

pub mod config;
mod pipeline;
pub mod scanner;
mod store;
mod watch;

pub use config::{
    config_path_from_env, load_or_create_config, save_config, ConfigError, UserConfig,
};
pub use pipeline::{Generation, IndexingPipeline, PostProcessor, ScanStats};
pub use store::{EntityMeta, MemoryStore, PersistentStore, RedbStore, StoreError};
pub use watch::configure_watcher;

#[derive(Debug)]
pub enum LibraryError {
    Io(std::io::Error),
    Store(StoreError),
    Config(ConfigError),
    Watch(notify::Error),
    ThreadPool(rayon::ThreadPoolBuildError),
}

impl std::fmt::Display for LibraryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LibraryError::Io(err) => write!(f, "io error: {}", err),
            LibraryError::Store(err) => write!(f, "store error: {}", err),
            LibraryError::Config(err) => write!(f, "config error: {}", err),
            LibraryError::Watch(err) => write!(f, "watch error: {}", err),
            LibraryError::ThreadPool(err) => write!(f, "thread pool error: {}", err),
        }
    }
}

impl std::error::Error for LibraryError {}

impl From<std::io::Error> for LibraryError {
    fn from(err: std::io::Error) -> Self {
        LibraryError::Io(err)
    }
}

impl From<StoreError> for LibraryError {
    fn from(err: StoreError) -> Self {
        LibraryError::Store(err)
    }
}

impl From<ConfigError> for LibraryError {
    fn from(err: ConfigError) -> Self {
        LibraryError::Config(err)
    }
}

impl From<notify::Error> for LibraryError {
    fn from(err: notify::Error) -> Self {
        LibraryError::Watch(err)
    }
}

impl From<rayon::ThreadPoolBuildError> for LibraryError {
    fn from(err: rayon::ThreadPoolBuildError) -> Self {
        LibraryError::ThreadPool(err)
    }
}

/// Ties the catalog, the persistent store and the extractor together.
/// Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct Library {
    shared: Arc<Shared>,
}

struct Shared {
    catalog: Arc<Catalog>,
    store: Arc<dyn PersistentStore>,
    extractor: Arc<dyn MetadataExtractor>,
    config: RwLock<UserConfig>,
    generation: Generation,
    watcher: Mutex<Option<RecommendedWatcher>>,
    post: RwLock<Vec<Arc<dyn PostProcessor>>>,
}

impl Library {
    pub fn new(
        config: UserConfig,
        store: Arc<dyn PersistentStore>,
        extractor: Arc<dyn MetadataExtractor>,
    ) -> Self {
        let catalog = Arc::new(Catalog::new(config.derive_options()));
        Self {
            shared: Arc::new(Shared {
                catalog,
                store,
                extractor,
                config: RwLock::new(config),
                generation: Generation::new(),
                watcher: Mutex::new(None),
                post: RwLock::new(Vec::new()),
            }),
        }
    }

    /// Production wiring: redb store, lofty extractor.
    pub fn open(config: UserConfig, db_path: &Path) -> Result<Self, LibraryError> {
        let store = Arc::new(RedbStore::open(db_path)?);
        Ok(Self::new(config, store, Arc::new(LoftyExtractor)))
    }

    /// Rebuilds the in-memory catalog from the persistent store, e.g. on
    /// process start.
    pub fn load(&self) -> Result<CatalogStats, LibraryError> {
        let tracks = self.shared.store.load_tracks()?;
        info!("Loading {} tracks from store", tracks.len());
        self.shared.catalog.load(tracks);
        pipeline::apply_entity_meta(&self.shared.catalog, self.shared.store.as_ref())?;

        let stats = self.shared.catalog.stats();
        info!(
            "Catalog ready: {} tracks, {} albums, {} artists",
            stats.tracks, stats.albums, stats.artists
        );
        Ok(stats)
    }

    pub fn catalog(&self) -> Arc<Catalog> {
        Arc::clone(&self.shared.catalog)
    }

    pub fn stats(&self) -> CatalogStats {
        self.shared.catalog.stats()
    }

    pub fn config(&self) -> UserConfig {
        self.shared.config.read().clone()
    }

    /// Swaps the configuration. Normalization changes apply to the next
    /// indexing run, not to already-indexed entities.
    pub fn update_config(&self, config: UserConfig) {
        self.shared.catalog.set_derive_options(config.derive_options());
        *self.shared.config.write() = config;
    }

    pub fn add_post_processor(&self, processor: Arc<dyn PostProcessor>) {
        self.shared.post.write().push(processor);
    }

    /// Runs one indexing pass on the calling thread. Post-processors are
    /// spawned afterwards and do not block the return.
    pub fn rescan_blocking(&self) -> Result<ScanStats, LibraryError> {
        let pipeline = IndexingPipeline::new(
            Arc::clone(&self.shared.catalog),
            Arc::clone(&self.shared.store),
            Arc::clone(&self.shared.extractor),
            self.config(),
            self.shared.generation.clone(),
        );

        let stats = pipeline.run()?;
        if !stats.cancelled {
            self.spawn_post_processors();
        }
        Ok(stats)
    }

    /// Kicks off an indexing pass in the background.
    pub fn start_rescan(&self) {
        let library = self.clone();
        tokio::spawn(async move {
            let worker = library.clone();
            match tokio::task::spawn_blocking(move || worker.rescan_blocking()).await {
                Ok(Ok(stats)) => {
                    info!(
                        "Scan finished: {} discovered, {} tagged, {} removed{}",
                        stats.discovered,
                        stats.tagged,
                        stats.removed,
                        if stats.cancelled { " (superseded)" } else { "" }
                    );
                }
                Ok(Err(err)) => warn!("Scan failed: {}", err),
                Err(err) => warn!("Scan join error: {}", err),
            }
        });
    }

    /// Explicitly spawned background threads, one per processor. Handles
    /// are discarded: this work is best-effort by contract.
    fn spawn_post_processors(&self) {
        let token = self.shared.generation.current();
        let processors: Vec<Arc<dyn PostProcessor>> = self.shared.post.read().clone();

        for processor in processors {
            let catalog = Arc::clone(&self.shared.catalog);
            let generation = self.shared.generation.clone();
            let name = processor.name().to_string();

            let spawned = std::thread::Builder::new()
                .name(format!("post-{}", name))
                .spawn(move || {
                    let is_cancelled = || !generation.is_current(token);
                    processor.run(&catalog, &is_cancelled);
                });
            if let Err(err) = spawned {
                warn!("Failed to spawn post-processor {}: {}", name, err);
            }
        }
    }

    /// Tags a single file and commits it to the store and catalog. Used
    /// by the file watcher; shares the insert primitives with the
    /// pipeline. Returns false for unreadable or degenerate files.
    pub fn add_file(&self, path: &Path) -> Result<bool, LibraryError> {
        let last_mod = match pipeline::file_mtime(path) {
            Some(mtime) => mtime,
            None => return Ok(false),
        };
        let tag = match self.shared.extractor.extract(path) {
            Some(tag) => tag,
            None => {
                warn!("Could not read file: {}", path.display());
                return Ok(false);
            }
        };

        let track = build_track(path, &tag, last_mod, &self.config().parse_options());
        if track.bitrate == 0 && track.duration == 0 {
            return Ok(false);
        }

        self.shared.store.upsert_tracks(std::slice::from_ref(&track))?;
        self.shared.catalog.insert_track(track);
        Ok(true)
    }

    /// Removes a file from the store and catalog, cascading album/artist
    /// cleanup.
    pub fn remove_file(&self, path: &Path) -> Result<bool, LibraryError> {
        let filepath = path.to_string_lossy().to_string();
        self.shared
            .store
            .remove_tracks_by_filepaths(std::slice::from_ref(&filepath))?;
        Ok(self
            .shared
            .catalog
            .remove_track_by_filepath(&filepath)
            .is_some())
    }

    /// Toggles a track favorite and writes the affected rows through to
    /// the store. Returns how many files were updated.
    pub fn set_track_favorite(&self, trackhash: &str, favorite: bool) -> Result<usize, LibraryError> {
        let updated = self.shared.catalog.set_track_favorite(trackhash, favorite);
        if updated > 0 {
            let tracks = self.shared.catalog.tracks_with_hash(trackhash);
            self.shared.store.upsert_tracks(&tracks)?;
        }
        Ok(updated)
    }

    pub fn set_album_favorite(&self, albumhash: &str, favorite: bool) -> Result<bool, LibraryError> {
        if !self.shared.catalog.set_album_favorite(albumhash, favorite) {
            return Ok(false);
        }
        let colors = self
            .shared
            .catalog
            .get_album_by_hash(albumhash)
            .map(|a| a.colors)
            .unwrap_or_default();
        self.shared.store.save_album_meta(
            albumhash,
            &EntityMeta {
                colors,
                is_favorite: favorite,
            },
        )?;
        Ok(true)
    }

    pub fn set_artist_favorite(&self, artisthash: &str, favorite: bool) -> Result<bool, LibraryError> {
        if !self.shared.catalog.set_artist_favorite(artisthash, favorite) {
            return Ok(false);
        }
        let colors = self
            .shared
            .catalog
            .get_artist_by_hash(artisthash)
            .map(|a| a.colors)
            .unwrap_or_default();
        self.shared.store.save_artist_meta(
            artisthash,
            &EntityMeta {
                colors,
                is_favorite: favorite,
            },
        )?;
        Ok(true)
    }

    pub fn set_album_colors(&self, albumhash: &str, colors: Vec<String>) -> Result<bool, LibraryError> {
        if !self.shared.catalog.set_album_colors(albumhash, colors.clone()) {
            return Ok(false);
        }
        let is_favorite = self
            .shared
            .catalog
            .get_album_by_hash(albumhash)
            .map(|a| a.is_favorite)
            .unwrap_or(false);
        self.shared
            .store
            .save_album_meta(albumhash, &EntityMeta { colors, is_favorite })?;
        Ok(true)
    }

    pub fn set_artist_colors(&self, artisthash: &str, colors: Vec<String>) -> Result<bool, LibraryError> {
        if !self.shared.catalog.set_artist_colors(artisthash, colors.clone()) {
            return Ok(false);
        }
        let is_favorite = self
            .shared
            .catalog
            .get_artist_by_hash(artisthash)
            .map(|a| a.is_favorite)
            .unwrap_or(false);
        self.shared
            .store
            .save_artist_meta(artisthash, &EntityMeta { colors, is_favorite })?;
        Ok(true)
    }

    /// Records a play and writes the updated rows through to the store.
    pub fn record_play(&self, trackhash: &str, duration: u32) -> Result<(), LibraryError> {
        self.shared.catalog.record_play(trackhash, duration);
        let tracks = self.shared.catalog.tracks_with_hash(trackhash);
        self.shared.store.upsert_tracks(&tracks)?;
        Ok(())
    }

    pub(crate) fn set_watcher(&self, watcher: Option<RecommendedWatcher>) {
        *self.shared.watcher.lock() = watcher;
    }
}
