//! Fuzzy search over the catalog collections. Query and candidates are
//! transliterated to ASCII and lowercased before scoring, so accented
//! titles match plain queries.

use any_ascii::any_ascii;
use common::{Album, Artist, Track};
use strsim::normalized_levenshtein;

use crate::catalog::Catalog;
use crate::dedup::remove_duplicates;

#[derive(Clone, Copy, Debug)]
pub struct SearchOptions {
    /// Minimum score (0-100) a match must reach; inclusive.
    pub score_cutoff: u8,
    /// Maximum number of results returned, highest-scored first.
    pub limit: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            score_cutoff: 75,
            limit: 150,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct TopResults {
    pub tracks: Vec<Track>,
    pub albums: Vec<Album>,
    pub artists: Vec<Artist>,
}

impl Catalog {
    pub fn search_tracks(&self, query: &str, opts: SearchOptions) -> Vec<(Track, u8)> {
        let ranked = rank(self.list_tracks(), query, opts.score_cutoff, |t: &Track| {
            t.og_title.clone()
        });

        // collapse duplicate files to one result per trackhash, keeping
        // the max-bitrate file at the first (best-scored) position
        let mut out: Vec<(Track, u8)> = Vec::new();
        let mut index: std::collections::HashMap<String, usize> = std::collections::HashMap::new();
        for (track, score) in ranked {
            match index.get(&track.trackhash) {
                Some(&at) => {
                    if track.bitrate > out[at].0.bitrate {
                        let best = out[at].1.max(score);
                        out[at] = (track, best);
                    }
                }
                None => {
                    index.insert(track.trackhash.clone(), out.len());
                    out.push((track, score));
                }
            }
        }
        out.truncate(opts.limit);
        out
    }

    pub fn search_albums(&self, query: &str, opts: SearchOptions) -> Vec<(Album, u8)> {
        let mut ranked = rank(self.list_albums(), query, opts.score_cutoff, |a: &Album| {
            a.title.clone()
        });
        ranked.truncate(opts.limit);
        ranked
    }

    pub fn search_artists(&self, query: &str, opts: SearchOptions) -> Vec<(Artist, u8)> {
        let mut ranked = rank(self.list_artists(), query, opts.score_cutoff, |a: &Artist| {
            a.name.clone()
        });
        ranked.truncate(opts.limit);
        ranked
    }

    /// Scores all three collections in one merged ranking, then re-splits
    /// by type. Per-type relative order follows the merged ranking.
    pub fn search_top_results(&self, query: &str, opts: SearchOptions) -> TopResults {
        enum Item {
            Track(Track),
            Album(Album),
            Artist(Artist),
        }

        let mut items: Vec<Item> = Vec::new();
        items.extend(self.list_artists().into_iter().map(Item::Artist));
        items.extend(self.list_tracks().into_iter().map(Item::Track));
        items.extend(self.list_albums().into_iter().map(Item::Album));

        let mut ranked = rank(items, query, opts.score_cutoff, |item: &Item| match item {
            Item::Track(t) => t.og_title.clone(),
            Item::Album(a) => a.title.clone(),
            Item::Artist(a) => a.name.clone(),
        });
        ranked.truncate(opts.limit);

        let mut out = TopResults::default();
        for (item, _) in ranked {
            match item {
                Item::Track(t) => out.tracks.push(t),
                Item::Album(a) => out.albums.push(a),
                Item::Artist(a) => out.artists.push(a),
            }
        }
        out.tracks = remove_duplicates(out.tracks);
        out
    }
}

fn rank<T, F>(items: Vec<T>, query: &str, score_cutoff: u8, text: F) -> Vec<(T, u8)>
where
    F: Fn(&T) -> String,
{
    let query = normalize_text(query);
    if query.is_empty() {
        return Vec::new();
    }

    let mut scored: Vec<(T, u8)> = items
        .into_iter()
        .filter_map(|item| {
            let score = score_match(&query, &text(&item));
            if score >= score_cutoff {
                Some((item, score))
            } else {
                None
            }
        })
        .collect();

    scored.sort_by(|a, b| b.1.cmp(&a.1));
    scored
}

/// Scores a candidate against a query, 0-100. Both sides are normalized
/// first. Exact/prefix/substring matches short-circuit; otherwise the
/// better of plain and token-sorted normalized edit distance decides.
pub fn score_match(query: &str, candidate: &str) -> u8 {
    let query = normalize_text(query);
    let query = query.as_str();
    let target = normalize_text(candidate);
    if query.is_empty() || target.is_empty() {
        return 0;
    }

    if target == query {
        return 100;
    }
    if target.starts_with(query) {
        return 90;
    }
    if target.contains(query) {
        return 80;
    }

    let plain = normalized_levenshtein(query, &target);
    let sorted = normalized_levenshtein(&sort_tokens(query), &sort_tokens(&target));
    (plain.max(sorted) * 100.0).round() as u8
}

fn normalize_text(value: &str) -> String {
    let ascii = any_ascii(value);
    let mut out = String::with_capacity(ascii.len());
    let mut last_space = false;
    for ch in ascii.chars() {
        let lower = ch.to_ascii_lowercase();
        if lower.is_ascii_alphanumeric() {
            out.push(lower);
            last_space = false;
        } else if !last_space && !out.is_empty() {
            out.push(' ');
            last_space = true;
        }
    }
    out.trim_end().to_string()
}

fn sort_tokens(value: &str) -> String {
    let mut tokens: Vec<&str> = value.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::derive::DeriveOptions;
    use common::{album_hash, track_hash, ArtistRef};

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
    fn transliterated_text_matches_ascii_queries() {
        assert_eq!(score_match("beyonce", "Beyoncé"), 100);
        assert_eq!(score_match("sigur ros", "Sigur Rós"), 100);
    }

    #[test]
    fn score_tiers_are_ordered() {
        assert_eq!(score_match("halo", "Halo"), 100);
        assert_eq!(score_match("halo", "Halo Theme"), 90);
        assert_eq!(score_match("halo", "Beyond Halo"), 80);
        assert!(score_match("halo", "Zebra") < 50);
    }

    #[test]
    fn token_order_is_forgiven() {
        let score = score_match("stormzy heavy", "Heavy Stormzy");
        assert_eq!(score, 100);
    }

    #[test]
    fn cutoff_boundary_is_inclusive() {
        let cat = Catalog::new(DeriveOptions::default());
        cat.insert_track(track("Halo", "4", "Artist", "/m/1.mp3", 320));
        cat.insert_track(track("Beyond Halo", "4", "Artist", "/m/2.mp3", 320));

        // "Beyond Halo" scores exactly 80 (substring tier)
        let at_cutoff = cat.search_tracks(
            "halo",
            SearchOptions {
                score_cutoff: 80,
                limit: 10,
            },
        );
        assert_eq!(at_cutoff.len(), 2);

        let above_cutoff = cat.search_tracks(
            "halo",
            SearchOptions {
                score_cutoff: 81,
                limit: 10,
            },
        );
        assert_eq!(above_cutoff.len(), 1);
        assert_eq!(above_cutoff[0].0.title, "Halo");
    }

    #[test]
    fn results_are_ranked_and_truncated() {
        let cat = Catalog::new(DeriveOptions::default());
        cat.insert_track(track("Halo", "A", "Artist", "/m/1.mp3", 320));
        cat.insert_track(track("Halo Theme", "A", "Artist", "/m/2.mp3", 320));
        cat.insert_track(track("Beyond Halo", "A", "Artist", "/m/3.mp3", 320));

        let results = cat.search_tracks(
            "halo",
            SearchOptions {
                score_cutoff: 50,
                limit: 2,
            },
        );
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0.title, "Halo");
        assert_eq!(results[1].0.title, "Halo Theme");
    }

    #[test]
    fn duplicate_files_collapse_to_one_result() {
        let cat = Catalog::new(DeriveOptions::default());
        cat.insert_track(track("Halo", "A", "Artist", "/m/low.mp3", 128));
        cat.insert_track(track("Halo", "A", "Artist", "/m/high.flac", 320));

        let results = cat.search_tracks("halo", SearchOptions::default());
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0.bitrate, 320);
    }

    #[test]
    fn top_results_split_preserves_merged_order() {
        let cat = Catalog::new(DeriveOptions::default());
        cat.insert_track(track("Halo", "Halo LP", "Halo Band", "/m/1.mp3", 320));
        cat.insert_track(track("Other", "Halo LP", "Halo Band", "/m/2.mp3", 320));

        let top = cat.search_top_results(
            "halo",
            SearchOptions {
                score_cutoff: 50,
                limit: 20,
            },
        );
        assert_eq!(top.tracks.len(), 1);
        assert_eq!(top.albums.len(), 1);
        assert_eq!(top.artists.len(), 1);
        assert_eq!(top.tracks[0].title, "Halo");
    }
}
