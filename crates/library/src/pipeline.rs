use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use catalog::Catalog;
use common::Track;
use metadata::{build_track, MetadataExtractor, ParseOptions};
use rayon::prelude::*;
use tracing::{info, warn};

use crate::config::UserConfig;
use crate::scanner;
use crate::store::PersistentStore;
use crate::LibraryError;

const TAG_BATCH: usize = 50;

/// Monotonic run token. A new indexing run bumps the counter, which any
/// in-flight older run observes at its next check and exits early.
#[derive(Clone, Default)]
pub struct Generation(Arc<AtomicU64>);

impl Generation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new run and returns its token, implicitly cancelling any
    /// older run.
    pub fn begin(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn is_current(&self, token: u64) -> bool {
        self.0.load(Ordering::SeqCst) == token
    }

    pub fn current(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub discovered: usize,
    pub tagged: usize,
    pub removed: usize,
    pub skipped: usize,
    /// True when a newer run superseded this one. Not an error; the
    /// catalog is left in the consistent state it reached.
    pub cancelled: bool,
}

/// Best-effort work triggered after a completed indexing pass (color
/// extraction, artwork, similar artists). Implementations poll
/// `is_cancelled` between items and swallow individual failures.
pub trait PostProcessor: Send + Sync {
    fn name(&self) -> &str;
    fn run(&self, catalog: &Catalog, is_cancelled: &dyn Fn() -> bool);
}

enum TagOutcome {
    Tagged(Box<Track>),
    Failed,
    Superseded,
}

pub struct IndexingPipeline {
    catalog: Arc<Catalog>,
    store: Arc<dyn PersistentStore>,
    extractor: Arc<dyn MetadataExtractor>,
    config: UserConfig,
    generation: Generation,
    batch_size: usize,
}

impl IndexingPipeline {
    pub fn new(
        catalog: Arc<Catalog>,
        store: Arc<dyn PersistentStore>,
        extractor: Arc<dyn MetadataExtractor>,
        config: UserConfig,
        generation: Generation,
    ) -> Self {
        Self {
            catalog,
            store,
            extractor,
            config,
            generation,
            batch_size: TAG_BATCH,
        }
    }

    /// Commit granularity for tagging; also the cancellation check
    /// interval.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// One full indexing pass: discover, diff, tag, commit. Per-file
    /// failures are logged and skipped; only systemic failures (store,
    /// thread pool) propagate.
    pub fn run(&self) -> Result<ScanStats, LibraryError> {
        let token = self.generation.begin();
        let mut stats = ScanStats::default();

        let roots = self.config.resolved_root_dirs();
        if roots.is_empty() {
            warn!("No root directories configured; indexing skipped");
            return Ok(stats);
        }

        let files = scanner::scan_roots(
            &roots,
            &self.config.exclude_dirs,
            &self.config.supported_extensions,
        );
        stats.discovered = files.len();
        info!("Discovered {} audio files", files.len());

        let root_strings: Vec<String> = roots
            .iter()
            .map(|r| r.to_string_lossy().to_string())
            .collect();

        // diff stored rows against the filesystem
        let mut unmodified: HashSet<String> = HashSet::new();
        let mut stale: Vec<String> = Vec::new();
        for row in self.store.load_tracks()? {
            if !is_under_roots(&row.filepath, &root_strings) {
                stale.push(row.filepath);
                continue;
            }
            match file_mtime(Path::new(&row.filepath)) {
                Some(mtime) if mtime == row.last_mod => {
                    unmodified.insert(row.filepath);
                }
                // modified on disk or gone; either way the row is stale
                Some(_) | None => stale.push(row.filepath),
            }
        }

        if !stale.is_empty() {
            self.store.remove_tracks_by_filepaths(&stale)?;
            for filepath in &stale {
                self.catalog.remove_track_by_filepath(filepath);
            }
            stats.removed = stale.len();
        }

        let untagged: Vec<PathBuf> = files
            .into_iter()
            .filter(|f| !unmodified.contains(f.to_string_lossy().as_ref()))
            .collect();

        if untagged.is_empty() {
            info!("All clear, no unread files");
            self.apply_entity_meta()?;
            return Ok(stats);
        }
        info!("Found {} unread files", untagged.len());

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.workers())
            .build()?;
        let opts = self.config.parse_options();

        for chunk in untagged.chunks(self.batch_size) {
            if !self.generation.is_current(token) {
                info!("Indexing run superseded; stopping early");
                stats.cancelled = true;
                return Ok(stats);
            }

            let outcomes: Vec<TagOutcome> = pool.install(|| {
                chunk
                    .par_iter()
                    .map(|path| self.tag_file(path, token, &opts))
                    .collect()
            });

            let mut tagged: Vec<Track> = Vec::with_capacity(outcomes.len());
            for outcome in outcomes {
                match outcome {
                    TagOutcome::Tagged(track) => tagged.push(*track),
                    TagOutcome::Failed => stats.skipped += 1,
                    TagOutcome::Superseded => {}
                }
            }

            // a superseded run commits nothing past its last check
            if !self.generation.is_current(token) {
                info!("Indexing run superseded; stopping early");
                stats.cancelled = true;
                return Ok(stats);
            }

            self.store.upsert_tracks(&tagged)?;
            for track in tagged {
                self.catalog.insert_track(track);
                stats.tagged += 1;
            }
        }

        self.apply_entity_meta()?;
        info!(
            "Indexed {} new or modified files ({} unreadable)",
            stats.tagged, stats.skipped
        );
        Ok(stats)
    }

    fn tag_file(&self, path: &Path, token: u64, opts: &ParseOptions) -> TagOutcome {
        if !self.generation.is_current(token) {
            return TagOutcome::Superseded;
        }

        let last_mod = match file_mtime(path) {
            Some(mtime) => mtime,
            None => {
                warn!("File vanished before tagging: {}", path.display());
                return TagOutcome::Failed;
            }
        };

        match self.extractor.extract(path) {
            Some(tag) => TagOutcome::Tagged(Box::new(build_track(path, &tag, last_mod, opts))),
            None => {
                warn!("Could not read file: {}", path.display());
                TagOutcome::Failed
            }
        }
    }

    fn apply_entity_meta(&self) -> Result<(), LibraryError> {
        apply_entity_meta(&self.catalog, self.store.as_ref())
    }
}

/// Overlays durable album/artist state (colors, favorites) onto the
/// freshly derived entities.
pub(crate) fn apply_entity_meta(
    catalog: &Catalog,
    store: &dyn PersistentStore,
) -> Result<(), LibraryError> {
    for (hash, meta) in store.load_album_meta()? {
        if catalog.album_exists(&hash) {
            if !meta.colors.is_empty() {
                catalog.set_album_colors(&hash, meta.colors);
            }
            if meta.is_favorite {
                catalog.set_album_favorite(&hash, true);
            }
        }
    }
    for (hash, meta) in store.load_artist_meta()? {
        if catalog.artist_exists(&hash) {
            if !meta.colors.is_empty() {
                catalog.set_artist_colors(&hash, meta.colors);
            }
            if meta.is_favorite {
                catalog.set_artist_favorite(&hash, true);
            }
        }
    }
    Ok(())
}

fn is_under_roots(filepath: &str, roots: &[String]) -> bool {
    roots.iter().any(|root| {
        let root = root.trim_end_matches('/');
        filepath.starts_with(root)
            && filepath[root.len()..].starts_with('/')
    })
}

pub(crate) fn file_mtime(path: &Path) -> Option<i64> {
    let meta = std::fs::metadata(path).ok()?;
    let modified = meta.modified().ok()?;
    modified
        .duration_since(UNIX_EPOCH)
        .ok()
        .map(|d| d.as_secs() as i64)
}
