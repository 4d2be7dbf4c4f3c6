use any_ascii::any_ascii;

/// Default digest length for entity identifiers.
pub const HASH_LENGTH: usize = 10;

/// Folds a single part into its identity-relevant form: lowercased,
/// whitespace removed, non-alphanumerics dropped. If nothing survives the
/// alphanumeric filter (e.g. "!!!"), the lowercased token is used as-is so
/// the part still contributes to the digest.
fn fold_part(part: &str) -> String {
    let base: String = part
        .to_lowercase()
        .trim()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    let folded: String = base.chars().filter(|c| c.is_alphanumeric()).collect();
    if folded.is_empty() {
        base
    } else {
        folded
    }
}

/// Derives a fixed-length identity digest from the given parts.
///
/// Deterministic and order-sensitive across parts, case- and
/// punctuation-insensitive within each part. With `decode_unicode` the
/// folded text is transliterated to ASCII first, so accented and plain
/// spellings collide.
pub fn create_hash(parts: &[&str], decode_unicode: bool, length: usize) -> String {
    let mut joined = String::new();
    for part in parts {
        joined.push_str(&fold_part(part));
    }

    if decode_unicode {
        joined = any_ascii(&joined);
    }

    let digest = blake3::hash(joined.as_bytes()).to_hex().to_string();
    let length = length.min(digest.len());
    digest[digest.len() - length..].to_string()
}

pub fn track_hash(artists: &[String], album: &str, title: &str) -> String {
    let mut parts: Vec<&str> = artists.iter().map(String::as_str).collect();
    parts.push(album);
    parts.push(title);
    create_hash(&parts, false, HASH_LENGTH)
}

pub fn album_hash(title: &str, albumartists: &[String]) -> String {
    let mut parts: Vec<&str> = vec![title];
    parts.extend(albumartists.iter().map(String::as_str));
    create_hash(&parts, false, HASH_LENGTH)
}

pub fn artist_hash(name: &str) -> String {
    create_hash(&[name], true, HASH_LENGTH)
}

pub fn path_hash(path: &str) -> String {
    create_hash(&[path], false, HASH_LENGTH)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic() {
        assert_eq!(
            create_hash(&["Sober"], false, HASH_LENGTH),
            create_hash(&["Sober"], false, HASH_LENGTH)
        );
    }

    #[test]
    fn hash_ignores_case_and_punctuation() {
        assert_eq!(
            create_hash(&["A,B"], false, HASH_LENGTH),
            create_hash(&["AB"], false, HASH_LENGTH)
        );
        assert_eq!(
            create_hash(&["Hello, World!"], false, HASH_LENGTH),
            create_hash(&["hello world"], false, HASH_LENGTH)
        );
    }

    #[test]
    fn hash_is_order_sensitive() {
        assert_ne!(
            create_hash(&["ab"], false, HASH_LENGTH),
            create_hash(&["ba"], false, HASH_LENGTH)
        );
        assert_ne!(
            track_hash(&["X".to_string()], "Album", "Title"),
            track_hash(&["X".to_string()], "Title", "Album")
        );
    }

    #[test]
    fn decode_unicode_folds_accents() {
        assert_eq!(
            create_hash(&["Beyoncé"], true, HASH_LENGTH),
            create_hash(&["Beyonce"], true, HASH_LENGTH)
        );
        assert_eq!(artist_hash("Beyoncé"), artist_hash("Beyonce"));
    }

    #[test]
    fn empty_fold_falls_back_to_lowercased_token() {
        // "!!!" is an actual band name; it must not hash like an empty string.
        assert_ne!(
            create_hash(&["!!!"], false, HASH_LENGTH),
            create_hash(&[""], false, HASH_LENGTH)
        );
        assert_ne!(
            create_hash(&["!!!"], false, HASH_LENGTH),
            create_hash(&["???"], false, HASH_LENGTH)
        );
    }

    #[test]
    fn digest_is_truncated_to_length() {
        assert_eq!(create_hash(&["abc"], false, 10).len(), 10);
        assert_eq!(create_hash(&["abc"], false, 16).len(), 16);
    }
}
