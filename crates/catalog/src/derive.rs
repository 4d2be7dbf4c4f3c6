//! Album and Artist aggregates, derived from the track set. Entities are
//! never created independently; they are rebuilt whenever their
//! constituent tracks change.

use std::collections::HashSet;

use common::{Album, AlbumKind, Artist, ArtistRef, Track};
use metadata::normalize;

use crate::dedup::remove_duplicates;

#[derive(Clone, Copy, Debug, Default)]
pub struct DeriveOptions {
    /// Treat every one-track album as a single.
    pub show_albums_as_singles: bool,
}

/// Builds the album for one albumhash from its tracks. Returns the album
/// and the distinct trackhashes it covers. `tracks` must be non-empty and
/// share the same albumhash.
pub fn build_album(tracks: &[Track], opts: DeriveOptions) -> (Album, HashSet<String>) {
    let representatives = remove_duplicates(tracks.to_vec());
    let first = &representatives[0];

    let albumhash = first.albumhash.clone();
    let og_title = first.og_album.clone();
    let title = first.album.clone();
    let albumartists: Vec<ArtistRef> = first.albumartists.clone();

    let mut date = first.date;
    let mut created_date = first.last_mod;
    let mut duration: u32 = 0;
    let mut playcount: u32 = 0;
    let mut playduration: u32 = 0;
    let mut genres: Vec<String> = Vec::new();
    let mut trackhashes: HashSet<String> = HashSet::new();

    for track in &representatives {
        date = date.min(track.date);
        created_date = created_date.min(track.last_mod);
        duration += track.duration;
        playcount += track.playcount;
        playduration += track.playduration;
        trackhashes.insert(track.trackhash.clone());
        for genre in &track.genres {
            if !genres.iter().any(|g| g == genre) {
                genres.push(genre.clone());
            }
        }
    }

    let (base_title, mut versions) = normalize::get_base_title_and_versions(&og_title);
    let kind = classify(&og_title, &title, &albumartists, &representatives, opts);

    if kind == AlbumKind::Soundtrack {
        versions.retain(|v| v != "original");
    }
    let versions: Vec<String> = versions.iter().map(|v| v.replace('_', " ")).collect();

    let album = Album {
        albumhash,
        title,
        og_title,
        base_title,
        albumartists,
        genres,
        versions,
        kind,
        date,
        created_date,
        duration,
        trackcount: trackhashes.len() as u32,
        colors: Vec::new(),
        playcount,
        playduration,
        is_favorite: false,
    };

    (album, trackhashes)
}

fn classify(
    og_title: &str,
    title: &str,
    albumartists: &[ArtistRef],
    tracks: &[Track],
    opts: DeriveOptions,
) -> AlbumKind {
    if is_single(og_title, title, tracks, opts) {
        return AlbumKind::Single;
    }
    if normalize::is_soundtrack(og_title) {
        return AlbumKind::Soundtrack;
    }
    if normalize::is_live(og_title) {
        return AlbumKind::Live;
    }
    let artist_names: Vec<String> = albumartists.iter().map(|a| a.name.clone()).collect();
    if normalize::is_compilation(title, &artist_names) {
        return AlbumKind::Compilation;
    }
    if normalize::is_ep(title) {
        return AlbumKind::Ep;
    }
    AlbumKind::Album
}

fn is_single(og_title: &str, title: &str, tracks: &[Track], opts: DeriveOptions) -> bool {
    if normalize::is_single_title(og_title) {
        return true;
    }
    if tracks.len() != 1 {
        return false;
    }
    if opts.show_albums_as_singles {
        return true;
    }

    // one track whose title is the album title
    let track_title = common::create_hash(&[&tracks[0].title], false, 10);
    let album_title = common::create_hash(&[title], false, 10);
    let og_album_title = common::create_hash(&[og_title], false, 10);
    track_title == album_title || track_title == og_album_title
}

/// Builds the artist for one artisthash from every track that references
/// it, through either the artist or albumartist list.
pub fn build_artist(artisthash: &str, tracks: &[Track]) -> Artist {
    let representatives = remove_duplicates(tracks.to_vec());

    let mut names: Vec<String> = Vec::new();
    let mut albumhashes: HashSet<String> = HashSet::new();
    let mut track_refs: HashSet<String> = HashSet::new();
    let mut date = i64::MAX;
    let mut duration: u32 = 0;
    let mut playcount: u32 = 0;
    let mut playduration: u32 = 0;
    let mut genres: Vec<String> = Vec::new();

    for track in &representatives {
        for reference in track.all_artists() {
            if reference.artisthash == artisthash && !names.contains(&reference.name) {
                names.push(reference.name.clone());
            }
        }

        albumhashes.insert(track.albumhash.clone());
        date = date.min(track.date);
        duration += track.duration;
        playcount += track.playcount;
        playduration += track.playduration;

        // albumartist-only credits do not count toward the track tally
        if track.artist_hashes().iter().any(|h| h == artisthash) {
            track_refs.insert(track.trackhash.clone());
        }

        for genre in &track.genres {
            if !genres.iter().any(|g| g == genre) {
                genres.push(genre.clone());
            }
        }
    }

    // canonical casing: first alphabetically among observed variants
    names.sort();
    let name = names.first().cloned().unwrap_or_default();

    Artist {
        artisthash: artisthash.to_string(),
        name,
        trackcount: track_refs.len() as u32,
        albumcount: albumhashes.len() as u32,
        duration,
        date: if date == i64::MAX { 0 } else { date },
        genres,
        colors: Vec::new(),
        playcount,
        playduration,
        is_favorite: false,
    }
}
