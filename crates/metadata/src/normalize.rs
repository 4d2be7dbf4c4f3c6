//! Pure text-normalization heuristics for messy real-world tag data.
//! Every function here is deterministic for a given input and
//! configuration; none touch the filesystem.

use once_cell::sync::Lazy;
use regex::Regex;

/// Album version vocabulary, checked in order against the bracketed
/// qualifier block of an album title. Tag name first, keywords second.
pub const VERSION_KEYWORDS: &[(&str, &[&str])] = &[
    ("explicit", &["explicit"]),
    ("360_audio", &["360 audio"]),
    ("anniversary", &["anniversary"]),
    ("diamond", &["diamond"]),
    ("centennial", &["centennial"]),
    ("gold", &["gold"]),
    ("platinum", &["platinum"]),
    ("silver", &["silver"]),
    ("ultimate", &["ultimate"]),
    ("expanded", &["expanded"]),
    ("extended", &["extended"]),
    ("deluxe", &["deluxe"]),
    ("super_deluxe", &["super deluxe"]),
    ("complete", &["complete"]),
    ("legacy", &["legacy"]),
    ("special", &["special"]),
    ("collectors", &["collector"]),
    ("archive", &["archive"]),
    ("acoustic", &["acoustic"]),
    ("instrumental", &["instrumental"]),
    ("double_disc", &["double disc", "double disk"]),
    ("unplugged", &["unplugged"]),
    ("summer", &["summer"]),
    ("winter", &["winter"]),
    ("spring", &["spring"]),
    ("fall", &["fall"]),
    ("bonus", &["bonus"]),
    ("bonus_track", &["bonus track"]),
    ("original", &["original", " og ", "og "]),
    ("international", &["international"]),
    ("uk_version", &["uk version"]),
    ("us_version", &["us version"]),
    ("limited", &["limited"]),
    ("mono", &["mono"]),
    ("stereo", &["stereo"]),
    ("hi_res", &["hi res"]),
    ("re_mix", &["re-mix"]),
    ("re_recorded", &["re-recorded", "rerecorded"]),
    ("reissue", &["reissue"]),
    ("remastered", &["remaster"]),
];

static VERSION_BLOCK: Lazy<Regex> = Lazy::new(|| {
    let keywords: Vec<&str> = VERSION_KEYWORDS
        .iter()
        .flat_map(|(_, words)| words.iter().copied())
        .collect();
    let pattern = format!(
        r"(?i)\s*[\(\[][^\)\]]*?(?:{})[^\)\]]*?[\)\]]$",
        keywords.join("|")
    );
    Regex::new(&pattern).expect("version block pattern")
});

static FEAT_PAREN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\((?:feat|ft|featuring|with)\.?\s+(.+?)\)").expect("feat pattern"));
static FEAT_BRACKET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\[(?:feat|ft|featuring|with)\.?\s+(.+?)\]").expect("feat pattern"));

static PROD_BRACKETED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s?[\(\[]prod\..*?[\)\]]\s?").expect("prod pattern"));
static PROD_BARE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s?\bprod\.\s*\S+").expect("prod pattern"));

static REMASTER_BRACKETED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s*[\[(][^)\]]*remaster[^)\]]*[)\]]\s*").expect("remaster pattern"));
static REMASTER_HYPHENATED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s-\s*[^-]*\bremaster[^-]*\s*").expect("remaster pattern"));

static OFFICIAL_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s*\([^)]*official[^)]*\)").expect("official pattern"));
static DASH_SEPARATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+[-–—]\s+").expect("dash pattern"));
static ANNIVERSARY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(\d+\w*)\s+anniversary").expect("anniversary pattern"));

/// Splits a raw artist string on the configured separators, preserving
/// names from the exception list verbatim (matched case-insensitively).
/// With `with_conjunctions`, `&` and the word "and" also split.
pub fn split_artists(
    src: &str,
    separators: &[char],
    exceptions: &[String],
    with_conjunctions: bool,
) -> Vec<String> {
    let chars: Vec<char> = src.chars().collect();
    let mut result: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut i = 0;

    while i < chars.len() {
        if let Some(len) = exception_at(&chars, i, exceptions) {
            flush_current(&mut current, &mut result);
            result.push(chars[i..i + len].iter().collect());
            i += len;
            continue;
        }

        if with_conjunctions {
            if let Some(len) = conjunction_at(&chars, i) {
                flush_current(&mut current, &mut result);
                i += len;
                continue;
            }
        }

        let ch = chars[i];
        if separators.contains(&ch) || (with_conjunctions && ch == '&') {
            flush_current(&mut current, &mut result);
        } else {
            current.push(ch);
        }
        i += 1;
    }

    flush_current(&mut current, &mut result);
    result
}

fn exception_at(chars: &[char], at: usize, exceptions: &[String]) -> Option<usize> {
    for exception in exceptions {
        let len = exception.chars().count();
        if len == 0 || at + len > chars.len() {
            continue;
        }
        let window: String = chars[at..at + len].iter().collect();
        if window.to_lowercase() == exception.to_lowercase() {
            return Some(len);
        }
    }
    None
}

fn conjunction_at(chars: &[char], at: usize) -> Option<usize> {
    const WORD: [char; 5] = [' ', 'a', 'n', 'd', ' '];
    if at + WORD.len() > chars.len() {
        return None;
    }
    let matches = chars[at..at + WORD.len()]
        .iter()
        .zip(WORD.iter())
        .all(|(a, b)| a.eq_ignore_ascii_case(b));
    if matches {
        Some(WORD.len())
    } else {
        None
    }
}

fn flush_current(current: &mut String, result: &mut Vec<String>) {
    for piece in current.split(',') {
        let piece = piece.trim();
        if !piece.is_empty() {
            result.push(piece.to_string());
        }
    }
    current.clear();
}

/// Extracts featured artists from a `(feat. X)` / `[with X]` block and
/// returns them together with the title stripped of that block.
pub fn parse_featured_artists(
    title: &str,
    separators: &[char],
    exceptions: &[String],
) -> (Vec<String>, String) {
    for pattern in [&*FEAT_PAREN, &*FEAT_BRACKET] {
        if let Some(captures) = pattern.captures(title) {
            let raw = match captures.get(1) {
                Some(m) => m.as_str(),
                None => continue,
            };
            let artists = split_artists(raw, separators, exceptions, true);
            let cleaned = pattern.replace_all(title, "").trim().to_string();
            return (artists, cleaned);
        }
    }
    (Vec::new(), title.to_string())
}

/// Strips `(prod. X)` / `[prod. X]` / bare `prod. X` producer credits.
pub fn remove_producer_string(title: &str) -> String {
    if !title.to_lowercase().contains("prod.") {
        return title.to_string();
    }
    let pattern = if title.contains(['(', ')', '[', ']']) {
        &*PROD_BRACKETED
    } else {
        &*PROD_BARE
    };
    pattern.replace_all(title, "").trim().to_string()
}

/// Splits an album title into its base title and the trailing bracketed
/// qualifier block, when the block matches the version vocabulary.
pub fn get_base_album_title(title: &str) -> (String, Option<String>) {
    match VERSION_BLOCK.find(title) {
        Some(found) => {
            let block = found.as_str().trim().to_string();
            let base = title[..found.start()].trim_end().to_string();
            (base, Some(block))
        }
        None => (title.to_string(), None),
    }
}

/// Extracts the version tags present in a qualifier block.
pub fn album_versions(block: &str) -> Vec<String> {
    let cleaned: String = block
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || c.is_whitespace())
        .collect();
    let haystack = cleaned.to_lowercase();

    let mut versions: Vec<String> = Vec::new();
    for (name, keywords) in VERSION_KEYWORDS {
        if keywords.iter().any(|k| haystack.contains(k)) {
            versions.push((*name).to_string());
        }
    }

    if let Some(at) = versions.iter().position(|v| v == "anniversary") {
        versions.remove(at);
        let tag = match ANNIVERSARY.captures(&haystack) {
            Some(captures) => match captures.get(1) {
                Some(m) => format!("{} anniversary", m.as_str()),
                None => "anniversary".to_string(),
            },
            None => "anniversary".to_string(),
        };
        versions.insert(0, tag);
    }

    // super deluxe subsumes the plain deluxe tag
    if versions.iter().any(|v| v == "super_deluxe") {
        versions.retain(|v| v != "deluxe");
    }

    versions
}

/// Base title plus extracted version tags. When the qualifier block yields
/// no recognized versions the original title is kept untouched.
pub fn get_base_title_and_versions(title: &str) -> (String, Vec<String>) {
    let (base, block) = get_base_album_title(title);
    let block = match block {
        Some(block) => block,
        None => return (title.to_string(), Vec::new()),
    };

    let versions = album_versions(&block);
    if versions.is_empty() {
        (title.to_string(), Vec::new())
    } else {
        (base, versions)
    }
}

/// Removes remaster qualifiers from a track title, preferring whichever of
/// the bracketed/hyphenated forms strips more.
pub fn clean_title(title: &str) -> String {
    if !title.to_lowercase().contains("remaster") {
        return title.to_string();
    }

    let bracketed = REMASTER_BRACKETED.replace_all(title, "").trim().to_string();
    let hyphenated = REMASTER_HYPHENATED.replace_all(title, "").trim().to_string();

    if hyphenated.len() > bracketed.len() {
        bracketed
    } else {
        hyphenated
    }
}

/// Splits a filename stem on the `artist - title` convention. Tolerates
/// hyphen, en-dash and em-dash separators, a leading track number, and
/// strips `(Official ...)` noise.
pub fn parse_filename(stem: &str) -> (Option<String>, String) {
    let cleaned = OFFICIAL_BLOCK.replace_all(stem, "").to_string();
    let segments: Vec<&str> = DASH_SEPARATOR
        .split(&cleaned)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    match segments.len() {
        0 => (None, cleaned.trim().to_string()),
        1 => (None, segments[0].to_string()),
        2 => (Some(segments[0].to_string()), segments[1].to_string()),
        _ => {
            if segments[0].parse::<u32>().is_ok() {
                (Some(segments[1].to_string()), segments[2..].join(" - "))
            } else {
                (Some(segments[0].to_string()), segments[1..].join(" - "))
            }
        }
    }
}

pub fn parse_artist_from_filename(
    stem: &str,
    separators: &[char],
    exceptions: &[String],
) -> Vec<String> {
    match parse_filename(stem) {
        (Some(artist), _) => split_artists(&artist, separators, exceptions, false),
        (None, _) => Vec::new(),
    }
}

pub fn parse_title_from_filename(stem: &str) -> String {
    parse_filename(stem).1
}

/// Normalizes a raw genre string into a deduplicated list. "r&b" and
/// "rock & roll" are protected before `&` splits them apart.
pub fn split_genres(raw: &str, separators: &[char]) -> Vec<String> {
    let mut text = raw.to_lowercase();
    text = text.replace("r&b", "rnb");
    text = text.replace("rock & roll", "rock");

    for sep in separators {
        text = text.replace(*sep, ",");
    }

    let mut genres: Vec<String> = Vec::new();
    for piece in text.split(',') {
        let piece = piece.trim();
        if piece.is_empty() {
            continue;
        }
        if !genres.iter().any(|g| g == piece) {
            genres.push(piece.to_string());
        }
    }
    genres
}

// Album classification predicates. These look only at title/artist text;
// track-set context (single detection) lives with the album derivation.

pub fn is_soundtrack(title: &str) -> bool {
    let title = title.to_lowercase();
    ["motion picture", "soundtrack"]
        .iter()
        .any(|k| title.contains(k))
}

pub fn is_compilation(title: &str, albumartists: &[String]) -> bool {
    let artists = albumartists.join("").to_lowercase();
    if artists.contains("various artists") {
        return true;
    }

    const SUBSTRINGS: &[&str] = &[
        "the essential",
        "best of",
        "greatest hits",
        "#1 hits",
        "number ones",
        "super hits",
        "collection",
        "anthology",
        "great hits",
        "biggest hits",
        "the hits",
        "the ultimate",
        "compilation",
    ];

    let title = title.to_lowercase();
    SUBSTRINGS.iter().any(|k| title.contains(k))
}

pub fn is_live(title: &str) -> bool {
    let title = title.to_lowercase();
    ["live from", "live at", "live in", "live on", "unplugged"]
        .iter()
        .any(|k| title.contains(k))
}

pub fn is_ep(title: &str) -> bool {
    title.trim().ends_with(" EP")
}

pub fn is_single_title(title: &str) -> bool {
    let title = title.to_lowercase();
    ["single version", "- single"].iter().any(|k| title.contains(k))
}
