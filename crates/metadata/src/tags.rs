//! Turns raw extracted tags into a fully-formed `Track`. All derived
//! fields (hashes, cleaned titles, artist lists) are computed here, never
//! as constructor side effects.

use std::path::Path;

use chrono::NaiveDate;
use common::{album_hash, track_hash, ArtistRef, Track};

use crate::normalize;
use crate::TagInfo;

/// Normalization switches, resolved from user configuration once per
/// indexing run.
#[derive(Clone, Debug)]
pub struct ParseOptions {
    pub artist_separators: Vec<char>,
    pub artist_split_exceptions: Vec<String>,
    pub genre_separators: Vec<char>,
    pub extract_featured_artists: bool,
    pub remove_prod_by: bool,
    pub remove_remaster_info: bool,
    pub clean_album_title: bool,
    pub merge_albums: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            artist_separators: vec![',', ';'],
            artist_split_exceptions: Vec::new(),
            genre_separators: vec!['/', ';', '&'],
            extract_featured_artists: true,
            remove_prod_by: true,
            remove_remaster_info: true,
            clean_album_title: true,
            merge_albums: false,
        }
    }
}

pub fn build_track(filepath: &Path, tag: &TagInfo, last_mod: i64, opts: &ParseOptions) -> Track {
    let filetype = filepath
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();
    let stem = filepath
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_string();
    let folder = filepath
        .parent()
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_default();

    let mut raw_artist = non_empty(tag.artist.as_deref());
    let mut raw_albumartist = non_empty(tag.album_artist.as_deref());
    if raw_albumartist.is_none() {
        raw_albumartist = raw_artist.clone();
    }
    if raw_artist.is_none() {
        raw_artist = raw_albumartist.clone();
    }

    let mut title = non_empty(tag.title.as_deref());
    let mut album = non_empty(tag.album.as_deref());

    // fall back to the `artist - title` filename convention for whatever
    // the tags did not provide
    let mut filename_artist: Option<String> = None;
    if title.is_none() || album.is_none() || raw_artist.is_none() {
        let (artist_part, title_part) = normalize::parse_filename(&stem);
        let fallback = title_part.replace('_', " ");
        if title.is_none() {
            title = Some(fallback.clone());
        }
        if album.is_none() {
            album = Some(fallback);
        }
        filename_artist = artist_part;
    }

    let raw_artist = raw_artist
        .or_else(|| filename_artist.clone())
        .unwrap_or_else(|| "Unknown".to_string());
    let raw_albumartist = raw_albumartist
        .or(filename_artist)
        .unwrap_or_else(|| "Unknown".to_string());
    let mut title = title.unwrap_or_else(|| stem.clone());
    let mut album = album.unwrap_or_else(|| "Unknown".to_string());

    let og_title = title.clone();
    let og_album = album.clone();

    let mut artists = split_refs(&raw_artist, opts);
    let albumartists = split_refs(&raw_albumartist, opts);

    if opts.extract_featured_artists {
        let (featured, cleaned) = normalize::parse_featured_artists(
            &title,
            &opts.artist_separators,
            &opts.artist_split_exceptions,
        );
        for name in featured {
            let artist = ArtistRef::new(&name);
            if !artists.iter().any(|a| a.artisthash == artist.artisthash) {
                artists.push(artist);
            }
        }
        // singles often carry the feat block in the album title too
        if og_album == og_title {
            album = cleaned.clone();
        }
        title = cleaned;
    }

    if opts.remove_prod_by {
        title = normalize::remove_producer_string(&title);
    }
    if opts.remove_remaster_info {
        title = normalize::clean_title(&title);
    }
    if opts.clean_album_title {
        album = normalize::get_base_album_title(&album).0;
    }

    let albumartist_names: Vec<String> = albumartists.iter().map(|a| a.name.clone()).collect();
    let albumhash = if opts.merge_albums {
        album_hash(&album, &albumartist_names)
    } else {
        album_hash(&og_album, &albumartist_names)
    };

    let artist_names: Vec<String> = artists.iter().map(|a| a.name.clone()).collect();
    let trackhash = track_hash(&artist_names, &og_album, &title);

    let genres = match tag.genre.as_deref() {
        Some(raw) => normalize::split_genres(raw, &opts.genre_separators),
        None => Vec::new(),
    };

    let date = tag
        .date
        .as_deref()
        .and_then(parse_date)
        .unwrap_or(last_mod);

    Track {
        trackhash,
        albumhash,
        title,
        og_title,
        album,
        og_album,
        artists,
        albumartists,
        genres,
        bitrate: tag.bitrate.unwrap_or(0),
        duration: tag.duration_secs.unwrap_or(0),
        track: tag.track_no.unwrap_or(1),
        disc: tag.disc_no.unwrap_or(1),
        date,
        filepath: filepath.to_string_lossy().to_string(),
        folder,
        filetype,
        last_mod,
        copyright: non_empty(tag.copyright.as_deref()),
        playcount: 0,
        playduration: 0,
        is_favorite: false,
    }
}

fn split_refs(raw: &str, opts: &ParseOptions) -> Vec<ArtistRef> {
    let names = normalize::split_artists(
        raw,
        &opts.artist_separators,
        &opts.artist_split_exceptions,
        false,
    );

    let mut refs: Vec<ArtistRef> = Vec::new();
    for name in names {
        let artist = ArtistRef::new(&name);
        if !refs.iter().any(|a| a.artisthash == artist.artisthash) {
            refs.push(artist);
        }
    }
    refs
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Parses a date tag into a unix timestamp. Full dates are honored;
/// anything else degrades to the first four-digit year found.
fn parse_date(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    for format in ["%Y-%m-%d", "%Y/%m/%d", "%d-%m-%Y", "%d/%m/%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return to_timestamp(date);
        }
    }

    let year = leading_year(trimmed)?;
    NaiveDate::from_ymd_opt(year, 1, 1).and_then(to_timestamp)
}

fn to_timestamp(date: NaiveDate) -> Option<i64> {
    Some(date.and_hms_opt(0, 0, 0)?.and_utc().timestamp())
}

fn leading_year(text: &str) -> Option<i32> {
    let mut digits = String::new();
    for ch in text.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
            if digits.len() == 4 {
                break;
            }
        } else if !digits.is_empty() {
            break;
        }
    }
    if digits.len() == 4 {
        digits.parse().ok()
    } else {
        None
    }
}
