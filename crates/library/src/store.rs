use std::collections::HashMap;
use std::fs;
use std::path::Path;

use common::Track;
use parking_lot::Mutex;
use redb::{
    CommitError, Database, DatabaseError, ReadableTable, StorageError, TableDefinition, TableError,
    TransactionError,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

const STORE_VERSION: u32 = 3;

const META_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("meta");
const TRACKS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("tracks");
const ALBUM_META_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("album_meta");
const ARTIST_META_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("artist_meta");

const META_VERSION_KEY: &str = "version";

/// Durable per-entity state that survives re-derivation: colors are
/// extracted asynchronously, favorites are user actions.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EntityMeta {
    pub colors: Vec<String>,
    pub is_favorite: bool,
}

#[derive(Debug)]
pub enum StoreError {
    Io(std::io::Error),
    Redb(redb::Error),
    Bincode(Box<bincode::ErrorKind>),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Io(err) => write!(f, "io error: {}", err),
            StoreError::Redb(err) => write!(f, "db error: {}", err),
            StoreError::Bincode(err) => write!(f, "bincode error: {}", err),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err)
    }
}

impl From<redb::Error> for StoreError {
    fn from(err: redb::Error) -> Self {
        StoreError::Redb(err)
    }
}

impl From<DatabaseError> for StoreError {
    fn from(err: DatabaseError) -> Self {
        StoreError::Redb(err.into())
    }
}

impl From<TableError> for StoreError {
    fn from(err: TableError) -> Self {
        StoreError::Redb(err.into())
    }
}

impl From<TransactionError> for StoreError {
    fn from(err: TransactionError) -> Self {
        StoreError::Redb(err.into())
    }
}

impl From<StorageError> for StoreError {
    fn from(err: StorageError) -> Self {
        StoreError::Redb(err.into())
    }
}

impl From<CommitError> for StoreError {
    fn from(err: CommitError) -> Self {
        StoreError::Redb(err.into())
    }
}

impl From<Box<bincode::ErrorKind>> for StoreError {
    fn from(err: Box<bincode::ErrorKind>) -> Self {
        StoreError::Bincode(err)
    }
}

/// Persistence boundary for the catalog. Tracks are keyed by filepath,
/// album/artist side state by hash. The catalog is rebuilt from this
/// store on process start.
pub trait PersistentStore: Send + Sync {
    fn load_tracks(&self) -> Result<Vec<Track>, StoreError>;
    fn upsert_tracks(&self, tracks: &[Track]) -> Result<(), StoreError>;
    fn remove_tracks_by_filepaths(&self, filepaths: &[String]) -> Result<(), StoreError>;

    fn load_album_meta(&self) -> Result<HashMap<String, EntityMeta>, StoreError>;
    fn save_album_meta(&self, albumhash: &str, meta: &EntityMeta) -> Result<(), StoreError>;

    fn load_artist_meta(&self) -> Result<HashMap<String, EntityMeta>, StoreError>;
    fn save_artist_meta(&self, artisthash: &str, meta: &EntityMeta) -> Result<(), StoreError>;
}

/// redb-backed store, bincode-encoded rows.
pub struct RedbStore {
    db: Database,
}

impl RedbStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let db = if path.exists() {
            Database::open(path)?
        } else {
            Database::create(path)?
        };

        let store = Self { db };
        match store.read_version()? {
            Some(version) if version == STORE_VERSION => {}
            Some(version) => {
                warn!("Store version mismatch ({}); clearing", version);
                store.clear()?;
            }
            None => store.write_version()?,
        }
        Ok(store)
    }

    fn read_version(&self) -> Result<Option<u32>, StoreError> {
        let read_txn = self.db.begin_read()?;
        let table = match read_txn.open_table(META_TABLE) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let version = match table.get(META_VERSION_KEY)? {
            Some(value) => Some(decode_value(value.value())?),
            None => None,
        };
        Ok(version)
    }

    fn write_version(&self) -> Result<(), StoreError> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(META_TABLE)?;
            let bytes = encode_value(&STORE_VERSION)?;
            table.insert(META_VERSION_KEY, bytes.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        let write_txn = self.db.begin_write()?;
        for table in [META_TABLE, TRACKS_TABLE, ALBUM_META_TABLE, ARTIST_META_TABLE] {
            match write_txn.delete_table(table) {
                Ok(_) => {}
                Err(TableError::TableDoesNotExist(_)) => {}
                Err(err) => return Err(err.into()),
            }
        }
        write_txn.commit()?;
        self.write_version()
    }

    fn load_meta_table(
        &self,
        table: TableDefinition<&str, &[u8]>,
    ) -> Result<HashMap<String, EntityMeta>, StoreError> {
        let read_txn = self.db.begin_read()?;
        let table = match read_txn.open_table(table) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(HashMap::new()),
            Err(err) => return Err(err.into()),
        };

        let mut out = HashMap::new();
        for entry in table.iter()? {
            let entry = entry?;
            let meta: EntityMeta = decode_value(entry.1.value())?;
            out.insert(entry.0.value().to_string(), meta);
        }
        Ok(out)
    }

    fn save_meta(
        &self,
        table: TableDefinition<&str, &[u8]>,
        key: &str,
        meta: &EntityMeta,
    ) -> Result<(), StoreError> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(table)?;
            let bytes = encode_value(meta)?;
            table.insert(key, bytes.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }
}

impl PersistentStore for RedbStore {
    fn load_tracks(&self) -> Result<Vec<Track>, StoreError> {
        let read_txn = self.db.begin_read()?;
        let table = match read_txn.open_table(TRACKS_TABLE) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut tracks = Vec::new();
        for entry in table.iter()? {
            let entry = entry?;
            let track: Track = decode_value(entry.1.value())?;
            tracks.push(track);
        }
        Ok(tracks)
    }

    fn upsert_tracks(&self, tracks: &[Track]) -> Result<(), StoreError> {
        if tracks.is_empty() {
            return Ok(());
        }
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(TRACKS_TABLE)?;
            for track in tracks {
                let bytes = encode_value(track)?;
                table.insert(track.filepath.as_str(), bytes.as_slice())?;
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    fn remove_tracks_by_filepaths(&self, filepaths: &[String]) -> Result<(), StoreError> {
        if filepaths.is_empty() {
            return Ok(());
        }
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(TRACKS_TABLE)?;
            for filepath in filepaths {
                table.remove(filepath.as_str())?;
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    fn load_album_meta(&self) -> Result<HashMap<String, EntityMeta>, StoreError> {
        self.load_meta_table(ALBUM_META_TABLE)
    }

    fn save_album_meta(&self, albumhash: &str, meta: &EntityMeta) -> Result<(), StoreError> {
        self.save_meta(ALBUM_META_TABLE, albumhash, meta)
    }

    fn load_artist_meta(&self) -> Result<HashMap<String, EntityMeta>, StoreError> {
        self.load_meta_table(ARTIST_META_TABLE)
    }

    fn save_artist_meta(&self, artisthash: &str, meta: &EntityMeta) -> Result<(), StoreError> {
        self.save_meta(ARTIST_META_TABLE, artisthash, meta)
    }
}

/// In-memory store for tests and ephemeral setups.
#[derive(Default)]
pub struct MemoryStore {
    tracks: Mutex<HashMap<String, Track>>,
    album_meta: Mutex<HashMap<String, EntityMeta>>,
    artist_meta: Mutex<HashMap<String, EntityMeta>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track_count(&self) -> usize {
        self.tracks.lock().len()
    }
}

impl PersistentStore for MemoryStore {
    fn load_tracks(&self) -> Result<Vec<Track>, StoreError> {
        Ok(self.tracks.lock().values().cloned().collect())
    }

    fn upsert_tracks(&self, tracks: &[Track]) -> Result<(), StoreError> {
        let mut guard = self.tracks.lock();
        for track in tracks {
            guard.insert(track.filepath.clone(), track.clone());
        }
        Ok(())
    }

    fn remove_tracks_by_filepaths(&self, filepaths: &[String]) -> Result<(), StoreError> {
        let mut guard = self.tracks.lock();
        for filepath in filepaths {
            guard.remove(filepath);
        }
        Ok(())
    }

    fn load_album_meta(&self) -> Result<HashMap<String, EntityMeta>, StoreError> {
        Ok(self.album_meta.lock().clone())
    }

    fn save_album_meta(&self, albumhash: &str, meta: &EntityMeta) -> Result<(), StoreError> {
        self.album_meta
            .lock()
            .insert(albumhash.to_string(), meta.clone());
        Ok(())
    }

    fn load_artist_meta(&self) -> Result<HashMap<String, EntityMeta>, StoreError> {
        Ok(self.artist_meta.lock().clone())
    }

    fn save_artist_meta(&self, artisthash: &str, meta: &EntityMeta) -> Result<(), StoreError> {
        self.artist_meta
            .lock()
            .insert(artisthash.to_string(), meta.clone());
        Ok(())
    }
}

fn encode_value<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    Ok(bincode::serialize(value)?)
}

fn decode_value<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T, StoreError> {
    Ok(bincode::deserialize(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::ArtistRef;

    fn track(filepath: &str) -> Track {
        Track {
            trackhash: "hash".to_string(),
            albumhash: "alb".to_string(),
            title: "Song".to_string(),
            og_title: "Song".to_string(),
            album: "Album".to_string(),
            og_album: "Album".to_string(),
            artists: vec![ArtistRef::new("Artist")],
            albumartists: vec![ArtistRef::new("Artist")],
            genres: Vec::new(),
            bitrate: 320,
            duration: 100,
            track: 1,
            disc: 1,
            date: 0,
            filepath: filepath.to_string(),
            folder: "/m".to_string(),
            filetype: "mp3".to_string(),
            last_mod: 0,
            copyright: None,
            playcount: 0,
            playduration: 0,
            is_favorite: false,
        }
    }

    #[test]
    fn redb_store_round_trips_tracks() {
        let dir = tempfile::tempdir().unwrap();
        let store = RedbStore::open(&dir.path().join("library.redb")).unwrap();

        store.upsert_tracks(&[track("/m/a.mp3"), track("/m/b.mp3")]).unwrap();
        assert_eq!(store.load_tracks().unwrap().len(), 2);

        store
            .remove_tracks_by_filepaths(&["/m/a.mp3".to_string()])
            .unwrap();
        let remaining = store.load_tracks().unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].filepath, "/m/b.mp3");
    }

    #[test]
    fn redb_store_persists_entity_meta() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("library.redb");
        {
            let store = RedbStore::open(&path).unwrap();
            store
                .save_album_meta(
                    "alb",
                    &EntityMeta {
                        colors: vec!["#101010".to_string()],
                        is_favorite: true,
                    },
                )
                .unwrap();
        }

        let store = RedbStore::open(&path).unwrap();
        let meta = store.load_album_meta().unwrap();
        assert!(meta.get("alb").map(|m| m.is_favorite).unwrap_or(false));
    }

    #[test]
    fn upserting_same_filepath_replaces_the_row() {
        let store = MemoryStore::new();
        let mut t = track("/m/a.mp3");
        store.upsert_tracks(&[t.clone()]).unwrap();
        t.title = "Renamed".to_string();
        store.upsert_tracks(&[t]).unwrap();

        let rows = store.load_tracks().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].title, "Renamed");
    }
}
