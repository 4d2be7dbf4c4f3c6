//! Duplicate-track reconciliation. Files that collide on trackhash (same
//! normalized identity, different rips) are collapsed to one
//! representative: the highest bitrate, first-encountered on ties.

use std::collections::HashMap;

use common::{create_hash, Track};

pub fn remove_duplicates(tracks: Vec<Track>) -> Vec<Track> {
    pick_representatives(tracks, |t| t.trackhash.clone())
}

/// Album-context variant. Tracks are keyed by position (disc, zero-padded
/// track number) plus a title hash, so merged album versions collapse the
/// same song at the same position without merging different songs that
/// happen to share a position.
pub fn remove_album_duplicates(tracks: Vec<Track>) -> Vec<Track> {
    let mut out = pick_representatives(tracks, position_key);
    out.sort_by(|a, b| {
        (a.disc, a.track)
            .cmp(&(b.disc, b.track))
            .then_with(|| a.title.to_lowercase().cmp(&b.title.to_lowercase()))
    });
    out
}

fn position_key(track: &Track) -> String {
    format!(
        "{}{:03}{}",
        track.disc,
        track.track,
        create_hash(&[&track.title], false, 10)
    )
}

fn pick_representatives<F>(tracks: Vec<Track>, key: F) -> Vec<Track>
where
    F: Fn(&Track) -> String,
{
    let mut order: Vec<String> = Vec::new();
    let mut best: HashMap<String, Track> = HashMap::new();

    for track in tracks {
        let k = key(&track);
        match best.get(&k) {
            Some(existing) if existing.bitrate >= track.bitrate => {}
            Some(_) => {
                best.insert(k, track);
            }
            None => {
                order.push(k.clone());
                best.insert(k, track);
            }
        }
    }

    let mut out = Vec::with_capacity(order.len());
    for k in order {
        if let Some(track) = best.remove(&k) {
            out.push(track);
        }
    }
    out
}
