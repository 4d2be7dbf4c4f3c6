use std::path::Path;

use lofty::error::LoftyError;
use lofty::prelude::{AudioFile, ItemKey, TaggedFileExt};

pub mod normalize;
pub mod tags;

pub use tags::{build_track, ParseOptions};

/// Raw tag data as read from an audio file, before any normalization.
/// `None`/empty fields mean the tag was absent; the track builder decides
/// the fallbacks.
#[derive(Debug, Default, Clone)]
pub struct TagInfo {
    pub artist: Option<String>,
    pub album_artist: Option<String>,
    pub album: Option<String>,
    pub title: Option<String>,
    pub genre: Option<String>,
    pub date: Option<String>,
    pub copyright: Option<String>,
    pub track_no: Option<u32>,
    pub disc_no: Option<u32>,
    pub duration_secs: Option<u32>,
    pub bitrate: Option<u32>,
}

#[derive(Debug)]
pub enum MetadataError {
    Io(std::io::Error),
    Lofty(LoftyError),
}

impl std::fmt::Display for MetadataError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetadataError::Io(err) => write!(f, "io error: {}", err),
            MetadataError::Lofty(err) => write!(f, "tag error: {}", err),
        }
    }
}

impl std::error::Error for MetadataError {}

impl From<std::io::Error> for MetadataError {
    fn from(err: std::io::Error) -> Self {
        MetadataError::Io(err)
    }
}

impl From<LoftyError> for MetadataError {
    fn from(err: LoftyError) -> Self {
        MetadataError::Lofty(err)
    }
}

/// Boundary for tag extraction. The indexing pipeline only ever sees this
/// trait, so tests can substitute a canned extractor.
pub trait MetadataExtractor: Send + Sync {
    /// Returns `None` for corrupt or unreadable files.
    fn extract(&self, path: &Path) -> Option<TagInfo>;
}

/// Production extractor backed by lofty.
pub struct LoftyExtractor;

impl MetadataExtractor for LoftyExtractor {
    fn extract(&self, path: &Path) -> Option<TagInfo> {
        read_tags(path).ok()
    }
}

pub fn read_tags(path: &Path) -> Result<TagInfo, MetadataError> {
    let tagged_file = lofty::read_from_path(path)?;
    let properties = tagged_file.properties();

    let mut info = TagInfo::default();

    let duration = properties.duration().as_secs();
    if duration > 0 {
        info.duration_secs = Some(duration.min(u64::from(u32::MAX)) as u32);
    }
    info.bitrate = properties.audio_bitrate().or(properties.overall_bitrate());

    if let Some(tag) = tagged_file.primary_tag().or_else(|| tagged_file.first_tag()) {
        info.title = tag.get_string(&ItemKey::TrackTitle).map(|v| v.to_string());
        info.album = tag.get_string(&ItemKey::AlbumTitle).map(|v| v.to_string());
        info.artist = tag.get_string(&ItemKey::TrackArtist).map(|v| v.to_string());
        info.album_artist = tag.get_string(&ItemKey::AlbumArtist).map(|v| v.to_string());
        info.genre = tag.get_string(&ItemKey::Genre).map(|v| v.to_string());
        info.date = tag
            .get_string(&ItemKey::RecordingDate)
            .or_else(|| tag.get_string(&ItemKey::Year))
            .map(|v| v.to_string());
        info.copyright = tag
            .get_string(&ItemKey::CopyrightMessage)
            .map(|v| v.to_string());
        info.track_no = tag.get_string(&ItemKey::TrackNumber).and_then(parse_number);
        info.disc_no = tag.get_string(&ItemKey::DiscNumber).and_then(parse_number);
    }

    Ok(info)
}

fn parse_number(text: &str) -> Option<u32> {
    let head = text.split('/').next().unwrap_or(text).trim();
    head.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::parse_number;

    #[test]
    fn parse_number_handles_totals() {
        assert_eq!(parse_number("3/12"), Some(3));
        assert_eq!(parse_number(" 7 "), Some(7));
        assert_eq!(parse_number("x"), None);
    }
}
