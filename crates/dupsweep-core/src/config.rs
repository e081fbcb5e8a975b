use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

pub const DEFAULT_STORE_DIR: &str = ".dupsweep_cache";
pub const DEFAULT_STORE_FILE: &str = "hashes.db";
pub const DEFAULT_MIN_FILE_SIZE: u64 = 10 * 1024;
pub const DEFAULT_SAMPLE_THRESHOLD: u64 = 20 * 1024 * 1024;
const MAX_MIN_FILE_SIZE: u64 = 1024 * 1024 * 1024;

pub const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "bmp", "tiff", "tif", "webp", "svg", "ico", "heic", "heif",
    "raw", "cr2", "nef", "arw", "dng", "psd", "ai",
];

/// Fully resolved settings for a session. Loaded once at startup; CLI flags
/// are applied on top by the caller.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Hash store location. `None` means `./.dupsweep_cache/hashes.db`.
    pub store_path: Option<PathBuf>,
    /// Extensions (no dot, any case) that are never considered.
    pub skip_extensions: Vec<String>,
    /// Glob patterns matched against full paths; a matching directory prunes its subtree.
    pub ignore_patterns: Vec<String>,
    pub min_file_size: u64,
    pub sample_threshold: u64,
    pub adaptive_sampling: bool,
    pub keep_keyword: String,
    /// 1 = hash on the calling thread, 0 = one worker per core.
    pub hash_threads: usize,
    pub detect_moves: bool,
    pub first_label: String,
    pub second_label: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            store_path: None,
            skip_extensions: IMAGE_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            ignore_patterns: Vec::new(),
            min_file_size: DEFAULT_MIN_FILE_SIZE,
            sample_threshold: DEFAULT_SAMPLE_THRESHOLD,
            adaptive_sampling: true,
            keep_keyword: "keep".to_string(),
            hash_threads: 1,
            detect_moves: true,
            first_label: "input".to_string(),
            second_label: "output".to_string(),
        }
    }
}

impl AppConfig {
    pub fn resolved_store_path(&self) -> PathBuf {
        match &self.store_path {
            Some(path) => path.clone(),
            None => default_store_path(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_file_size > MAX_MIN_FILE_SIZE {
            return Err(Error::InvalidConfig(format!(
                "min_file_size {} exceeds 1 GiB",
                self.min_file_size
            )));
        }
        if self.sample_threshold == 0 {
            return Err(Error::InvalidConfig(
                "sample_threshold must be greater than zero".to_string(),
            ));
        }
        if self.keep_keyword.trim().is_empty() {
            return Err(Error::InvalidConfig("keep_keyword must not be empty".to_string()));
        }
        if self.first_label.is_empty() || self.second_label.is_empty() {
            return Err(Error::InvalidConfig("folder labels must not be empty".to_string()));
        }
        if self.first_label == self.second_label {
            return Err(Error::InvalidConfig(format!(
                "first and second folder labels are both '{}'",
                self.first_label
            )));
        }
        Ok(())
    }
}

pub fn default_store_path() -> PathBuf {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    cwd.join(DEFAULT_STORE_DIR).join(DEFAULT_STORE_FILE)
}

/// `Dupsweep.toml` in the working directory (optional), then `DUPSWEEP_*` variables.
pub fn load_configuration() -> std::result::Result<AppConfig, ConfigError> {
    let builder = Config::builder()
        .add_source(ConfigFile::with_name("Dupsweep").required(false))
        .add_source(Environment::with_prefix("DUPSWEEP"))
        .build()?;
    builder.try_deserialize::<AppConfig>()
}

/// True when either root contains the other. Cross-folder runs over nested
/// trees would see the inner files under both labels.
pub fn roots_overlap(a: &Path, b: &Path) -> bool {
    a.starts_with(b) || b.starts_with(a)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.min_file_size, 10 * 1024);
        assert_eq!(config.sample_threshold, 20 * 1024 * 1024);
        assert!(config.skip_extensions.iter().any(|e| e == "jpg"));
        assert_eq!(config.hash_threads, 1);
    }

    #[test]
    fn test_validate_rejects_same_labels() {
        let config = AppConfig {
            second_label: "input".to_string(),
            ..AppConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_validate_rejects_huge_min_size() {
        let config = AppConfig {
            min_file_size: 2 * 1024 * 1024 * 1024,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_roots_overlap() {
        assert!(roots_overlap(Path::new("/data"), Path::new("/data/sub")));
        assert!(roots_overlap(Path::new("/data/sub"), Path::new("/data")));
        assert!(!roots_overlap(Path::new("/data/a"), Path::new("/data/b")));
        // Component-wise, not string prefix.
        assert!(!roots_overlap(Path::new("/data"), Path::new("/database")));
    }
}
