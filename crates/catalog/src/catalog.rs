use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use common::{path_hash, Album, Artist, Folder, Track};
use parking_lot::RwLock;

use crate::dedup::{remove_album_duplicates, remove_duplicates};
use crate::derive::{build_album, build_artist, DeriveOptions};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CatalogStats {
    pub tracks: usize,
    pub albums: usize,
    pub artists: usize,
}

/// The in-memory working set: tracks, albums and artists kept mutually
/// consistent under a single lock. Albums and artists are derived from
/// the track set and rebuilt synchronously on every mutation, so readers
/// never observe a track pointing at a missing album or artist.
pub struct Catalog {
    inner: RwLock<Inner>,
}

struct Inner {
    opts: DeriveOptions,
    tracks: HashMap<String, Track>,
    by_trackhash: HashMap<String, Vec<String>>,
    by_albumhash: HashMap<String, Vec<String>>,
    by_artisthash: HashMap<String, Vec<String>>,
    albums: HashMap<String, AlbumEntry>,
    artists: HashMap<String, ArtistEntry>,
}

struct AlbumEntry {
    album: Album,
    trackhashes: HashSet<String>,
}

struct ArtistEntry {
    artist: Artist,
}

impl Catalog {
    pub fn new(opts: DeriveOptions) -> Self {
        Self {
            inner: RwLock::new(Inner {
                opts,
                tracks: HashMap::new(),
                by_trackhash: HashMap::new(),
                by_albumhash: HashMap::new(),
                by_artisthash: HashMap::new(),
                albums: HashMap::new(),
                artists: HashMap::new(),
            }),
        }
    }

    /// Updates derivation options. Takes effect on subsequent rebuilds,
    /// not retroactively.
    pub fn set_derive_options(&self, opts: DeriveOptions) {
        self.inner.write().opts = opts;
    }

    /// Replaces the whole working set, e.g. on startup from the
    /// persistent store. Derivation runs once per distinct album/artist.
    pub fn load(&self, tracks: Vec<Track>) {
        let mut inner = self.inner.write();
        inner.tracks.clear();
        inner.by_trackhash.clear();
        inner.by_albumhash.clear();
        inner.by_artisthash.clear();
        inner.albums.clear();
        inner.artists.clear();

        let mut albumhashes: HashSet<String> = HashSet::new();
        let mut artisthashes: HashSet<String> = HashSet::new();
        for track in tracks {
            albumhashes.insert(track.albumhash.clone());
            for artist in track.all_artists() {
                artisthashes.insert(artist.artisthash.clone());
            }
            inner.attach(track);
        }

        for hash in albumhashes {
            inner.rebuild_album(&hash);
        }
        for hash in artisthashes {
            inner.rebuild_artist(&hash);
        }
    }

    /// Inserts or replaces a track (keyed by filepath) and synchronously
    /// re-derives the owning album and artists.
    pub fn insert_track(&self, track: Track) {
        let mut inner = self.inner.write();
        inner.insert_track(track);
    }

    /// Removes a track and cascades: its album is rebuilt or pruned, its
    /// artists are rebuilt or pruned. Returns the removed track.
    pub fn remove_track_by_filepath(&self, filepath: &str) -> Option<Track> {
        let mut inner = self.inner.write();
        let removed = inner.detach(filepath)?;

        inner.rebuild_album(&removed.albumhash);
        let hashes: HashSet<String> = removed
            .all_artists()
            .map(|a| a.artisthash.clone())
            .collect();
        for hash in hashes {
            inner.rebuild_artist(&hash);
        }
        Some(removed)
    }

    pub fn get_track_by_filepath(&self, filepath: &str) -> Option<Track> {
        self.inner.read().tracks.get(filepath).cloned()
    }

    pub fn get_tracks_by_filepaths(&self, filepaths: &[String]) -> Vec<Track> {
        let inner = self.inner.read();
        filepaths
            .iter()
            .filter_map(|p| inner.tracks.get(p).cloned())
            .collect()
    }

    /// The max-bitrate representative for a trackhash.
    pub fn get_track_by_hash(&self, trackhash: &str) -> Option<Track> {
        self.inner.read().representative(trackhash)
    }

    /// Every file sharing a trackhash, duplicates included.
    pub fn tracks_with_hash(&self, trackhash: &str) -> Vec<Track> {
        let inner = self.inner.read();
        inner
            .by_trackhash
            .get(trackhash)
            .map(|paths| {
                paths
                    .iter()
                    .filter_map(|p| inner.tracks.get(p).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Order- and duplicate-preserving lookup: the result mirrors the
    /// input sequence, with unknown hashes skipped silently. Used for
    /// playlist track lists, which may legitimately repeat a hash.
    pub fn get_tracks_by_hashes(&self, trackhashes: &[String]) -> Vec<Track> {
        let inner = self.inner.read();
        trackhashes
            .iter()
            .filter_map(|h| inner.representative(h))
            .collect()
    }

    /// All tracks of an album, deduplicated position-aware and ordered by
    /// disc/track number.
    pub fn get_tracks_by_albumhash(&self, albumhash: &str) -> Vec<Track> {
        let tracks = self.inner.read().tracks_for_album(albumhash);
        remove_album_duplicates(tracks)
    }

    /// All tracks referencing an artist (as artist or albumartist),
    /// deduplicated, oldest first.
    pub fn get_tracks_by_artisthash(&self, artisthash: &str) -> Vec<Track> {
        let tracks = self.inner.read().tracks_for_artist(artisthash);
        let mut tracks = remove_duplicates(tracks);
        tracks.sort_by_key(|t| t.last_mod);
        tracks
    }

    pub fn album_exists(&self, albumhash: &str) -> bool {
        self.inner.read().albums.contains_key(albumhash)
    }

    pub fn artist_exists(&self, artisthash: &str) -> bool {
        self.inner.read().artists.contains_key(artisthash)
    }

    pub fn get_album_by_hash(&self, albumhash: &str) -> Option<Album> {
        self.inner.read().albums.get(albumhash).map(|e| e.album.clone())
    }

    pub fn get_albums_by_artisthash(&self, artisthash: &str) -> Vec<Album> {
        let inner = self.inner.read();
        let mut seen: HashSet<String> = HashSet::new();
        let mut albums = Vec::new();
        for track in inner.tracks_for_artist(artisthash) {
            if seen.insert(track.albumhash.clone()) {
                if let Some(entry) = inner.albums.get(&track.albumhash) {
                    albums.push(entry.album.clone());
                }
            }
        }
        albums.sort_by_key(|a| std::cmp::Reverse(a.date));
        albums
    }

    pub fn get_artist_by_hash(&self, artisthash: &str) -> Option<Artist> {
        self.inner
            .read()
            .artists
            .get(artisthash)
            .map(|e| e.artist.clone())
    }

    pub fn list_tracks(&self) -> Vec<Track> {
        self.inner.read().tracks.values().cloned().collect()
    }

    pub fn list_albums(&self) -> Vec<Album> {
        self.inner
            .read()
            .albums
            .values()
            .map(|e| e.album.clone())
            .collect()
    }

    pub fn list_artists(&self) -> Vec<Artist> {
        self.inner
            .read()
            .artists
            .values()
            .map(|e| e.artist.clone())
            .collect()
    }

    pub fn stats(&self) -> CatalogStats {
        let inner = self.inner.read();
        CatalogStats {
            tracks: inner.tracks.len(),
            albums: inner.albums.len(),
            artists: inner.artists.len(),
        }
    }

    /// Distinct folders containing at least one indexed track.
    pub fn folders(&self) -> Vec<Folder> {
        let inner = self.inner.read();
        let mut paths: Vec<&String> = {
            let mut seen = HashSet::new();
            inner
                .tracks
                .values()
                .map(|t| &t.folder)
                .filter(|f| seen.insert(f.as_str()))
                .collect()
        };
        paths.sort();
        paths.into_iter().map(|p| make_folder(p, true)).collect()
    }

    /// Folder view of an arbitrary path. `has_tracks` is a direct-equality
    /// check against track folders, never a prefix match.
    pub fn folder_info(&self, path: &str) -> Folder {
        let has_tracks = self
            .inner
            .read()
            .tracks
            .values()
            .any(|t| t.folder == path);
        make_folder(path, has_tracks)
    }

    /// Number of tracks anywhere under the given path, for recursive
    /// folder browsing.
    pub fn count_tracks_under_path(&self, prefix: &str) -> usize {
        let inner = self.inner.read();
        let prefix_dir = format!("{}/", prefix.trim_end_matches('/'));
        inner
            .tracks
            .values()
            .filter(|t| t.folder == prefix || t.folder.starts_with(&prefix_dir))
            .count()
    }

    /// Marks every file sharing the trackhash. Returns how many tracks
    /// were updated.
    pub fn set_track_favorite(&self, trackhash: &str, favorite: bool) -> usize {
        let mut inner = self.inner.write();
        let filepaths = inner.by_trackhash.get(trackhash).cloned().unwrap_or_default();
        let mut updated = 0;
        for filepath in filepaths {
            if let Some(track) = inner.tracks.get_mut(&filepath) {
                track.is_favorite = favorite;
                updated += 1;
            }
        }
        updated
    }

    pub fn set_album_favorite(&self, albumhash: &str, favorite: bool) -> bool {
        let mut inner = self.inner.write();
        match inner.albums.get_mut(albumhash) {
            Some(entry) => {
                entry.album.is_favorite = favorite;
                true
            }
            None => false,
        }
    }

    pub fn set_artist_favorite(&self, artisthash: &str, favorite: bool) -> bool {
        let mut inner = self.inner.write();
        match inner.artists.get_mut(artisthash) {
            Some(entry) => {
                entry.artist.is_favorite = favorite;
                true
            }
            None => false,
        }
    }

    pub fn set_album_colors(&self, albumhash: &str, colors: Vec<String>) -> bool {
        let mut inner = self.inner.write();
        match inner.albums.get_mut(albumhash) {
            Some(entry) => {
                entry.album.colors = colors;
                true
            }
            None => false,
        }
    }

    pub fn set_artist_colors(&self, artisthash: &str, colors: Vec<String>) -> bool {
        let mut inner = self.inner.write();
        match inner.artists.get_mut(artisthash) {
            Some(entry) => {
                entry.artist.colors = colors;
                true
            }
            None => false,
        }
    }

    /// Records a play against every file sharing the trackhash and keeps
    /// the album/artist aggregates in step before returning.
    pub fn record_play(&self, trackhash: &str, duration: u32) {
        let mut inner = self.inner.write();
        let filepaths = inner.by_trackhash.get(trackhash).cloned().unwrap_or_default();

        let mut albumhashes: HashSet<String> = HashSet::new();
        let mut artisthashes: HashSet<String> = HashSet::new();
        for filepath in filepaths {
            if let Some(track) = inner.tracks.get_mut(&filepath) {
                track.playcount += 1;
                track.playduration += duration;
                albumhashes.insert(track.albumhash.clone());
                for artist in track.all_artists() {
                    artisthashes.insert(artist.artisthash.clone());
                }
            }
        }

        for hash in albumhashes {
            inner.rebuild_album(&hash);
        }
        for hash in artisthashes {
            inner.rebuild_artist(&hash);
        }
    }
}

impl Inner {
    fn insert_track(&mut self, track: Track) {
        let mut albumhashes: HashSet<String> = HashSet::new();
        let mut artisthashes: HashSet<String> = HashSet::new();

        // a re-tagged file may have moved to a different album identity;
        // both the old and new owners need re-deriving
        if let Some(old) = self.detach(&track.filepath) {
            albumhashes.insert(old.albumhash.clone());
            for artist in old.all_artists() {
                artisthashes.insert(artist.artisthash.clone());
            }
        }
        albumhashes.insert(track.albumhash.clone());
        for artist in track.all_artists() {
            artisthashes.insert(artist.artisthash.clone());
        }

        self.attach(track);

        for hash in albumhashes {
            self.rebuild_album(&hash);
        }
        for hash in artisthashes {
            self.rebuild_artist(&hash);
        }
    }

    fn attach(&mut self, track: Track) {
        let filepath = track.filepath.clone();
        self.by_trackhash
            .entry(track.trackhash.clone())
            .or_default()
            .push(filepath.clone());
        self.by_albumhash
            .entry(track.albumhash.clone())
            .or_default()
            .push(filepath.clone());

        let mut seen: HashSet<&str> = HashSet::new();
        for artist in track.all_artists() {
            if seen.insert(&artist.artisthash) {
                self.by_artisthash
                    .entry(artist.artisthash.clone())
                    .or_default()
                    .push(filepath.clone());
            }
        }

        self.tracks.insert(filepath, track);
    }

    fn detach(&mut self, filepath: &str) -> Option<Track> {
        let track = self.tracks.remove(filepath)?;

        prune_index(&mut self.by_trackhash, &track.trackhash, filepath);
        prune_index(&mut self.by_albumhash, &track.albumhash, filepath);
        let hashes: HashSet<String> = track
            .all_artists()
            .map(|a| a.artisthash.clone())
            .collect();
        for hash in hashes {
            prune_index(&mut self.by_artisthash, &hash, filepath);
        }

        Some(track)
    }

    fn tracks_for_album(&self, albumhash: &str) -> Vec<Track> {
        self.by_albumhash
            .get(albumhash)
            .map(|paths| {
                paths
                    .iter()
                    .filter_map(|p| self.tracks.get(p).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn tracks_for_artist(&self, artisthash: &str) -> Vec<Track> {
        self.by_artisthash
            .get(artisthash)
            .map(|paths| {
                paths
                    .iter()
                    .filter_map(|p| self.tracks.get(p).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn representative(&self, trackhash: &str) -> Option<Track> {
        let paths = self.by_trackhash.get(trackhash)?;
        let mut best: Option<&Track> = None;
        for path in paths {
            if let Some(track) = self.tracks.get(path) {
                match best {
                    Some(current) if current.bitrate >= track.bitrate => {}
                    _ => best = Some(track),
                }
            }
        }
        best.cloned()
    }

    fn rebuild_album(&mut self, albumhash: &str) {
        let tracks = self.tracks_for_album(albumhash);
        if tracks.is_empty() {
            self.albums.remove(albumhash);
            return;
        }

        let (mut album, trackhashes) = build_album(&tracks, self.opts);
        if let Some(previous) = self.albums.get(albumhash) {
            album.colors = previous.album.colors.clone();
            album.is_favorite = previous.album.is_favorite;
        }
        self.albums
            .insert(albumhash.to_string(), AlbumEntry { album, trackhashes });
    }

    fn rebuild_artist(&mut self, artisthash: &str) {
        let tracks = self.tracks_for_artist(artisthash);
        if tracks.is_empty() {
            self.artists.remove(artisthash);
            return;
        }

        let mut artist = build_artist(artisthash, &tracks);
        if let Some(previous) = self.artists.get(artisthash) {
            artist.colors = previous.artist.colors.clone();
            artist.is_favorite = previous.artist.is_favorite;
        }
        self.artists
            .insert(artisthash.to_string(), ArtistEntry { artist });
    }
}

fn prune_index(index: &mut HashMap<String, Vec<String>>, key: &str, filepath: &str) {
    if let Some(paths) = index.get_mut(key) {
        paths.retain(|p| p != filepath);
        if paths.is_empty() {
            index.remove(key);
        }
    }
}

fn make_folder(path: &str, has_tracks: bool) -> Folder {
    let name = Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string());
    let is_symlink = fs::symlink_metadata(path)
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false);
    Folder {
        path: path.to_string(),
        name,
        is_symlink,
        path_hash: path_hash(path),
        has_tracks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{album_hash, artist_hash, track_hash, ArtistRef};

    fn track(title: &str, album: &str, artist: &str, filepath: &str, bitrate: u32) -> Track {
        let artists = vec![ArtistRef::new(artist)];
        Track {
            trackhash: track_hash(&[artist.to_string()], album, title),
            albumhash: album_hash(album, &[artist.to_string()]),
            title: title.to_string(),
            og_title: title.to_string(),
            album: album.to_string(),
            og_album: album.to_string(),
            artists: artists.clone(),
            albumartists: artists,
            genres: Vec::new(),
            bitrate,
            duration: 100,
            track: 1,
            disc: 1,
            date: 10,
            filepath: filepath.to_string(),
            folder: Path::new(filepath)
                .parent()
                .map(|p| p.to_string_lossy().to_string())
                .unwrap_or_default(),
            filetype: "mp3".to_string(),
            last_mod: 10,
            copyright: None,
            playcount: 0,
            playduration: 0,
            is_favorite: false,
        }
    }

    fn catalog() -> Catalog {
        Catalog::new(DeriveOptions::default())
    }

    #[test]
    fn insert_creates_album_and_artists() {
        let cat = catalog();
        cat.insert_track(track("One", "LP", "Band", "/music/LP/one.mp3", 320));

        let albumhash = album_hash("LP", &["Band".to_string()]);
        assert!(cat.album_exists(&albumhash));
        assert!(cat.artist_exists(&artist_hash("Band")));

        let album = cat.get_album_by_hash(&albumhash).unwrap();
        assert_eq!(album.trackcount, 1);
    }

    #[test]
    fn every_track_resolves_to_album_and_artists() {
        let cat = catalog();
        cat.insert_track(track("One", "LP", "Band", "/m/LP/1.mp3", 320));
        cat.insert_track(track("Two", "LP", "Band", "/m/LP/2.mp3", 320));
        cat.insert_track(track("Solo", "Other", "Band", "/m/Other/1.mp3", 320));

        for t in cat.list_tracks() {
            assert!(cat.album_exists(&t.albumhash));
            for artist in t.artists.iter().chain(t.albumartists.iter()) {
                assert!(cat.artist_exists(&artist.artisthash));
            }
        }

        let albumhash = album_hash("LP", &["Band".to_string()]);
        let album = cat.get_album_by_hash(&albumhash).unwrap();
        assert_eq!(album.trackcount as usize, cat.get_tracks_by_albumhash(&albumhash).len());
    }

    #[test]
    fn removing_last_track_prunes_album_and_artist() {
        let cat = catalog();
        cat.insert_track(track("One", "LP", "Band", "/m/LP/1.mp3", 320));
        cat.insert_track(track("Two", "LP", "Band", "/m/LP/2.mp3", 320));

        let albumhash = album_hash("LP", &["Band".to_string()]);
        let band = artist_hash("Band");

        cat.remove_track_by_filepath("/m/LP/1.mp3");
        assert!(cat.album_exists(&albumhash));
        let album = cat.get_album_by_hash(&albumhash).unwrap();
        assert_eq!(album.trackcount, 1);

        cat.remove_track_by_filepath("/m/LP/2.mp3");
        assert!(!cat.album_exists(&albumhash));
        assert!(!cat.artist_exists(&band));
        assert_eq!(cat.stats(), CatalogStats::default());
    }

    #[test]
    fn albumartist_reference_keeps_artist_alive() {
        let cat = catalog();
        let mut t = track("One", "Comp", "Singer", "/m/C/1.mp3", 320);
        t.albumartists = vec![ArtistRef::new("Curator")];
        cat.insert_track(t);
        cat.insert_track(track("Two", "Solo", "Singer", "/m/S/1.mp3", 320));

        let curator = artist_hash("Curator");
        assert!(cat.artist_exists(&curator));

        cat.remove_track_by_filepath("/m/C/1.mp3");
        assert!(!cat.artist_exists(&curator));
        assert!(cat.artist_exists(&artist_hash("Singer")));
    }

    #[test]
    fn replacing_a_file_reassigns_album_ownership() {
        let cat = catalog();
        cat.insert_track(track("One", "Old Album", "Band", "/m/x.mp3", 320));

        let old = album_hash("Old Album", &["Band".to_string()]);
        assert!(cat.album_exists(&old));

        // same file re-tagged into another album
        cat.insert_track(track("One", "New Album", "Band", "/m/x.mp3", 320));

        assert!(!cat.album_exists(&old));
        assert!(cat.album_exists(&album_hash("New Album", &["Band".to_string()])));
        assert_eq!(cat.stats().tracks, 1);
    }

    #[test]
    fn hash_lookup_returns_max_bitrate_representative() {
        let cat = catalog();
        cat.insert_track(track("One", "LP", "Band", "/m/low.mp3", 128));
        cat.insert_track(track("One", "LP", "Band", "/m/high.flac", 320));
        cat.insert_track(track("One", "LP", "Band", "/m/mid.mp3", 192));

        let hash = track_hash(&["Band".to_string()], "LP", "One");
        let best = cat.get_track_by_hash(&hash).unwrap();
        assert_eq!(best.bitrate, 320);
    }

    #[test]
    fn hash_sequence_lookup_preserves_order_and_duplicates() {
        let cat = catalog();
        cat.insert_track(track("One", "LP", "Band", "/m/1.mp3", 320));
        cat.insert_track(track("Two", "LP", "Band", "/m/2.mp3", 320));

        let one = track_hash(&["Band".to_string()], "LP", "One");
        let two = track_hash(&["Band".to_string()], "LP", "Two");
        let wanted = vec![two.clone(), one.clone(), two.clone(), "missing".to_string()];

        let got = cat.get_tracks_by_hashes(&wanted);
        let titles: Vec<&str> = got.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["Two", "One", "Two"]);
    }

    #[test]
    fn folder_flags_use_direct_equality() {
        let cat = catalog();
        cat.insert_track(track("One", "LP", "Band", "/m/artist/album/1.mp3", 320));

        assert!(cat.folder_info("/m/artist/album").has_tracks);
        assert!(!cat.folder_info("/m/artist").has_tracks);
        assert_eq!(cat.count_tracks_under_path("/m/artist"), 1);
        assert_eq!(cat.count_tracks_under_path("/m/art"), 0);
    }

    #[test]
    fn record_play_updates_aggregates_synchronously() {
        let cat = catalog();
        cat.insert_track(track("One", "LP", "Band", "/m/1.mp3", 320));

        let hash = track_hash(&["Band".to_string()], "LP", "One");
        cat.record_play(&hash, 100);

        let albumhash = album_hash("LP", &["Band".to_string()]);
        assert_eq!(cat.get_album_by_hash(&albumhash).unwrap().playcount, 1);
        assert_eq!(cat.get_artist_by_hash(&artist_hash("Band")).unwrap().playduration, 100);
    }

    #[test]
    fn favorites_survive_album_rebuild() {
        let cat = catalog();
        cat.insert_track(track("One", "LP", "Band", "/m/1.mp3", 320));

        let albumhash = album_hash("LP", &["Band".to_string()]);
        assert!(cat.set_album_favorite(&albumhash, true));
        cat.set_album_colors(&albumhash, vec!["#aabbcc".to_string()]);

        // a new track triggers a rebuild of the album entry
        cat.insert_track(track("Two", "LP", "Band", "/m/2.mp3", 320));

        let album = cat.get_album_by_hash(&albumhash).unwrap();
        assert!(album.is_favorite);
        assert_eq!(album.colors, vec!["#aabbcc"]);
        assert_eq!(album.trackcount, 2);
    }
}
