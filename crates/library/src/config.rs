use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use catalog::DeriveOptions;
use metadata::ParseOptions;
use serde::{Deserialize, Serialize};

pub const CONFIG_VERSION: u32 = 2;

/// User-facing configuration. Changes take effect on the next indexing
/// run; already-indexed entities keep their derived fields until a
/// re-tag touches them.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct UserConfig {
    pub version: u32,
    /// Directories to index. The literal entry `$home` expands to the
    /// user's home directory.
    pub root_dirs: Vec<String>,
    /// Directory names skipped during scanning.
    pub exclude_dirs: Vec<String>,
    pub supported_extensions: Vec<String>,
    pub artist_separators: Vec<char>,
    /// Names never split apart, e.g. "AC/DC".
    pub artist_split_ignore_list: Vec<String>,
    pub genre_separators: Vec<char>,
    pub extract_featured_artists: bool,
    pub remove_prod_by: bool,
    pub remove_remaster_info: bool,
    pub clean_album_title: bool,
    pub merge_albums: bool,
    pub show_albums_as_singles: bool,
    pub watch_files: bool,
    pub watch_debounce_secs: u64,
    /// Tagging worker threads; 0 means half the available cores.
    pub tagger_workers: usize,
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            root_dirs: Vec::new(),
            exclude_dirs: Vec::new(),
            supported_extensions: vec![
                "flac".to_string(),
                "mp3".to_string(),
                "wav".to_string(),
                "m4a".to_string(),
                "ogg".to_string(),
                "wma".to_string(),
                "opus".to_string(),
                "alac".to_string(),
                "aiff".to_string(),
            ],
            artist_separators: vec![',', ';'],
            artist_split_ignore_list: Vec::new(),
            genre_separators: vec!['/', ';', '&'],
            extract_featured_artists: true,
            remove_prod_by: true,
            remove_remaster_info: true,
            clean_album_title: true,
            merge_albums: false,
            show_albums_as_singles: false,
            watch_files: true,
            watch_debounce_secs: 2,
            tagger_workers: 0,
        }
    }
}

impl UserConfig {
    pub fn parse_options(&self) -> ParseOptions {
        ParseOptions {
            artist_separators: self.artist_separators.clone(),
            artist_split_exceptions: self.artist_split_ignore_list.clone(),
            genre_separators: self.genre_separators.clone(),
            extract_featured_artists: self.extract_featured_artists,
            remove_prod_by: self.remove_prod_by,
            remove_remaster_info: self.remove_remaster_info,
            clean_album_title: self.clean_album_title,
            merge_albums: self.merge_albums,
        }
    }

    pub fn derive_options(&self) -> DeriveOptions {
        DeriveOptions {
            show_albums_as_singles: self.show_albums_as_singles,
        }
    }

    /// Root directories with `$home` expanded, missing entries dropped.
    pub fn resolved_root_dirs(&self) -> Vec<PathBuf> {
        let mut roots = Vec::new();
        for dir in &self.root_dirs {
            if dir == "$home" {
                if let Some(home) = dirs::home_dir() {
                    roots.push(home);
                }
                continue;
            }
            let trimmed = dir.trim();
            if !trimmed.is_empty() {
                roots.push(PathBuf::from(trimmed));
            }
        }
        roots
    }

    pub fn workers(&self) -> usize {
        if self.tagger_workers > 0 {
            self.tagger_workers
        } else {
            (num_cpus::get() / 2).max(1)
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Yaml(serde_yaml::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "io error: {}", err),
            ConfigError::Yaml(err) => write!(f, "yaml error: {}", err),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err)
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::Yaml(err)
    }
}

pub fn config_path_from_env() -> PathBuf {
    match env::var("SONORITE_CONFIG") {
        Ok(value) if !value.trim().is_empty() => PathBuf::from(value),
        _ => default_config_path(),
    }
}

fn default_config_path() -> PathBuf {
    match env::current_exe() {
        Ok(exe) => exe
            .parent()
            .map(|dir| dir.join("config.yaml"))
            .unwrap_or_else(|| PathBuf::from("config.yaml")),
        Err(_) => PathBuf::from("config.yaml"),
    }
}

pub fn load_or_create_config(path: &Path) -> Result<(UserConfig, bool), ConfigError> {
    if path.exists() {
        let contents = fs::read_to_string(path)?;
        let mut config: UserConfig = serde_yaml::from_str(&contents)?;
        if config.version < CONFIG_VERSION {
            config.version = CONFIG_VERSION;
        }
        if config.supported_extensions.is_empty() {
            config.supported_extensions = UserConfig::default().supported_extensions;
        }
        if config.artist_separators.is_empty() {
            config.artist_separators = UserConfig::default().artist_separators;
        }
        if config.watch_debounce_secs == 0 {
            config.watch_debounce_secs = 2;
        }
        return Ok((config, false));
    }

    let config = UserConfig::default();
    save_config(path, &config)?;
    Ok((config, true))
}

pub fn save_config(path: &Path, config: &UserConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let contents = serde_yaml::to_string(config)?;
    fs::write(path, contents)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_round_trip_through_yaml() {
        let config = UserConfig::default();
        let text = serde_yaml::to_string(&config).unwrap();
        let back: UserConfig = serde_yaml::from_str(&text).unwrap();
        assert_eq!(back.version, CONFIG_VERSION);
        assert_eq!(back.supported_extensions, config.supported_extensions);
        assert_eq!(back.artist_separators, config.artist_separators);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let config: UserConfig = serde_yaml::from_str("root_dirs:\n  - /music\n").unwrap();
        assert_eq!(config.root_dirs, vec!["/music"]);
        assert!(config.extract_featured_artists);
        assert!(!config.supported_extensions.is_empty());
    }

    #[test]
    fn home_token_expands() {
        let config = UserConfig {
            root_dirs: vec!["$home".to_string()],
            ..UserConfig::default()
        };
        let roots = config.resolved_root_dirs();
        assert_eq!(roots.len(), 1);
        assert!(roots[0].is_absolute());
    }

    #[test]
    fn workers_default_to_half_the_cores() {
        let config = UserConfig::default();
        assert!(config.workers() >= 1);

        let fixed = UserConfig {
            tagger_workers: 3,
            ..UserConfig::default()
        };
        assert_eq!(fixed.workers(), 3);
    }
}
