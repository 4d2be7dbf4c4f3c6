use serde::{Deserialize, Serialize};

pub mod hashing;

pub use hashing::{album_hash, artist_hash, create_hash, path_hash, track_hash};

/// Lightweight artist reference embedded in tracks and albums.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtistRef {
    pub name: String,
    pub artisthash: String,
}

impl ArtistRef {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.trim().to_string(),
            artisthash: artist_hash(name),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlbumKind {
    Album,
    Single,
    Ep,
    Compilation,
    Soundtrack,
    Live,
}

impl Default for AlbumKind {
    fn default() -> Self {
        AlbumKind::Album
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Track {
    pub trackhash: String,
    pub albumhash: String,
    pub title: String,
    pub og_title: String,
    pub album: String,
    pub og_album: String,
    pub artists: Vec<ArtistRef>,
    pub albumartists: Vec<ArtistRef>,
    #[serde(default)]
    pub genres: Vec<String>,
    pub bitrate: u32,
    pub duration: u32,
    pub track: u32,
    pub disc: u32,
    pub date: i64,
    pub filepath: String,
    pub folder: String,
    pub filetype: String,
    pub last_mod: i64,
    #[serde(default)]
    pub copyright: Option<String>,
    #[serde(default)]
    pub playcount: u32,
    #[serde(default)]
    pub playduration: u32,
    #[serde(default)]
    pub is_favorite: bool,
}

impl Track {
    /// Hashes of the track-level artists only.
    pub fn artist_hashes(&self) -> Vec<String> {
        self.artists.iter().map(|a| a.artisthash.clone()).collect()
    }

    /// All artist references on the track, album artists included.
    pub fn all_artists(&self) -> impl Iterator<Item = &ArtistRef> {
        self.artists.iter().chain(self.albumartists.iter())
    }

    pub fn references_artist(&self, artisthash: &str) -> bool {
        self.all_artists().any(|a| a.artisthash == artisthash)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Album {
    pub albumhash: String,
    pub title: String,
    pub og_title: String,
    pub base_title: String,
    pub albumartists: Vec<ArtistRef>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub versions: Vec<String>,
    #[serde(default)]
    pub kind: AlbumKind,
    pub date: i64,
    pub created_date: i64,
    pub duration: u32,
    pub trackcount: u32,
    #[serde(default)]
    pub colors: Vec<String>,
    #[serde(default)]
    pub playcount: u32,
    #[serde(default)]
    pub playduration: u32,
    #[serde(default)]
    pub is_favorite: bool,
}

impl Album {
    pub fn artist_hashes(&self) -> Vec<String> {
        self.albumartists
            .iter()
            .map(|a| a.artisthash.clone())
            .collect()
    }

    pub fn references_artist(&self, artisthash: &str) -> bool {
        self.albumartists.iter().any(|a| a.artisthash == artisthash)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Artist {
    pub artisthash: String,
    pub name: String,
    pub trackcount: u32,
    pub albumcount: u32,
    pub duration: u32,
    pub date: i64,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub colors: Vec<String>,
    #[serde(default)]
    pub playcount: u32,
    #[serde(default)]
    pub playduration: u32,
    #[serde(default)]
    pub is_favorite: bool,
}

/// A browsable directory derived from the indexed track set.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Folder {
    pub path: String,
    pub name: String,
    pub is_symlink: bool,
    pub path_hash: String,
    pub has_tracks: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artist_ref_hashes_from_name() {
        let first = ArtistRef::new("Burna Boy");
        let second = ArtistRef::new("burna boy");
        assert_eq!(first.artisthash, second.artisthash);
        assert_eq!(first.name, "Burna Boy");
    }

    #[test]
    fn track_references_album_artists() {
        let track = Track {
            trackhash: "t".into(),
            albumhash: "a".into(),
            title: "Song".into(),
            og_title: "Song".into(),
            album: "Album".into(),
            og_album: "Album".into(),
            artists: vec![ArtistRef::new("Main")],
            albumartists: vec![ArtistRef::new("Band")],
            genres: Vec::new(),
            bitrate: 320,
            duration: 200,
            track: 1,
            disc: 1,
            date: 0,
            filepath: "/music/song.mp3".into(),
            folder: "/music".into(),
            filetype: "mp3".into(),
            last_mod: 0,
            copyright: None,
            playcount: 0,
            playduration: 0,
            is_favorite: false,
        };

        let band = artist_hash("Band");
        assert!(track.references_artist(&band));
        assert!(!track.artist_hashes().contains(&band));
    }
}
