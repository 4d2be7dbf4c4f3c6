use std::path::PathBuf;

use tracing::warn;
use walkdir::{DirEntry, WalkDir};

/// Walks the configured root directories and returns every supported
/// audio file. Hidden directories and configured exclusions are skipped;
/// unreadable subtrees are logged and skipped, never fatal.
pub fn scan_roots(
    roots: &[PathBuf],
    exclude_dirs: &[String],
    extensions: &[String],
) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for root in roots {
        if !root.exists() {
            warn!("Root directory not found: {}", root.display());
            continue;
        }

        let walker = WalkDir::new(root)
            .follow_links(true)
            .into_iter()
            .filter_entry(|entry| !should_skip_dir(entry, exclude_dirs));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!("Skipping unreadable entry: {}", err);
                    continue;
                }
            };
            if is_audio_file(&entry, extensions) {
                files.push(entry.into_path());
            }
        }
    }

    files.sort();
    files.dedup();
    files
}

fn should_skip_dir(entry: &DirEntry, exclude_dirs: &[String]) -> bool {
    if !entry.file_type().is_dir() {
        return false;
    }
    // always skip the root itself being filtered out
    if entry.depth() == 0 {
        return false;
    }
    match entry.file_name().to_str() {
        Some(name) => name.starts_with('.') || exclude_dirs.iter().any(|d| d == name),
        None => false,
    }
}

fn is_audio_file(entry: &DirEntry, extensions: &[String]) -> bool {
    if !entry.file_type().is_file() {
        return false;
    }
    entry
        .path()
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_lowercase();
            extensions.iter().any(|e| *e == ext)
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(path: &std::path::Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, b"x").unwrap();
    }

    fn extensions() -> Vec<String> {
        vec!["mp3".to_string(), "flac".to_string()]
    }

    #[test]
    fn finds_supported_files_recursively() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("a/one.mp3"));
        touch(&dir.path().join("a/b/two.FLAC"));
        touch(&dir.path().join("a/cover.jpg"));
        touch(&dir.path().join("notes.txt"));

        let files = scan_roots(&[dir.path().to_path_buf()], &[], &extensions());
        assert_eq!(files.len(), 2);
    }

    #[test]
    fn skips_hidden_and_excluded_directories() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("keep/one.mp3"));
        touch(&dir.path().join(".hidden/two.mp3"));
        touch(&dir.path().join("trash/three.mp3"));

        let files = scan_roots(
            &[dir.path().to_path_buf()],
            &["trash".to_string()],
            &extensions(),
        );
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("keep/one.mp3"));
    }

    #[test]
    fn missing_root_is_not_fatal() {
        let files = scan_roots(
            &[PathBuf::from("/definitely/not/here")],
            &[],
            &extensions(),
        );
        assert!(files.is_empty());
    }

    #[test]
    fn duplicate_roots_yield_unique_files() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("one.mp3"));

        let root = dir.path().to_path_buf();
        let files = scan_roots(&[root.clone(), root], &[], &extensions());
        assert_eq!(files.len(), 1);
    }
}
