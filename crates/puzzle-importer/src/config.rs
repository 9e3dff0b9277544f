use std::io::Read;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::decoder::Compression;
use crate::error::ImportError;

/// Run configuration. Every field has a default so a TOML file only needs
/// the keys it wants to change.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ImportConfig {
    /// Stop once the dataset holds this many puzzles.
    #[serde(default = "defaults::target_total_count")]
    pub target_total_count: usize,
    #[serde(default = "defaults::min_popularity")]
    pub min_popularity: i32,
    #[serde(default = "defaults::max_rating_deviation")]
    pub max_rating_deviation: u32,
    /// `https://…`, `file://…` or a bare path.
    #[serde(default = "defaults::source_url")]
    pub source_url: String,
    #[serde(default = "defaults::output_path")]
    pub output_path: PathBuf,
    /// Notify progress every N accepted puzzles.
    #[serde(default = "defaults::progress_every")]
    pub progress_every: usize,
    /// Save what was accepted before a stream failure instead of discarding it.
    #[serde(default)]
    pub persist_partial: bool,
    #[serde(default = "defaults::http_timeout_secs")]
    pub http_timeout_secs: u64,
    /// Overrides suffix-based detection when set.
    #[serde(default)]
    pub compression: Option<Compression>,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            target_total_count: defaults::target_total_count(),
            min_popularity: defaults::min_popularity(),
            max_rating_deviation: defaults::max_rating_deviation(),
            source_url: defaults::source_url(),
            output_path: defaults::output_path(),
            progress_every: defaults::progress_every(),
            persist_partial: false,
            http_timeout_secs: defaults::http_timeout_secs(),
            compression: None,
        }
    }
}

impl ImportConfig {
    pub fn from_toml<P: AsRef<Path>>(path: P) -> Result<Self, ImportError> {
        let path = path.as_ref();
        let mut file = std::fs::File::open(path).map_err(|err| ImportError::io(path, err))?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|err| ImportError::io(path, err))?;
        let cfg: Self = toml::from_str(&contents)
            .map_err(|err| ImportError::Config(format!("{}: {err}", path.display())))?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ImportError> {
        if self.target_total_count == 0 {
            return Err(ImportError::Config(
                "target_total_count must be > 0".to_string(),
            ));
        }
        if self.progress_every == 0 {
            return Err(ImportError::Config("progress_every must be > 0".to_string()));
        }
        if self.source_url.trim().is_empty() {
            return Err(ImportError::Config("source_url must not be empty".to_string()));
        }
        if self.http_timeout_secs == 0 {
            return Err(ImportError::Config(
                "http_timeout_secs must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

mod defaults {
    use std::path::PathBuf;

    pub fn target_total_count() -> usize { 5500 }
    pub fn min_popularity() -> i32 { 80 }
    pub fn max_rating_deviation() -> u32 { 100 }
    pub fn source_url() -> String { "https://database.lichess.org/lichess_db_puzzle.csv.zst".to_string() }
    pub fn output_path() -> PathBuf { PathBuf::from("assets/puzzles/puzzles.json") }
    pub fn progress_every() -> usize { 1000 }
    pub fn http_timeout_secs() -> u64 { 60 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn empty_toml_yields_defaults() {
        let cfg: ImportConfig = toml::from_str("").unwrap();
        assert_eq!(cfg, ImportConfig::default());
        assert_eq!(cfg.target_total_count, 5500);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn bundled_sample_matches_defaults() {
        let cfg: ImportConfig = toml::from_str(include_str!("../import.toml")).unwrap();
        assert_eq!(cfg, ImportConfig::default());
    }

    #[test]
    fn from_toml_overrides_selected_keys() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("import.toml");
        std::fs::write(
            &path,
            r#"
            target_total_count = 10000
            min_popularity = 90
            source_url = "file:///tmp/dump.csv.gz"
            compression = "gzip"
            persist_partial = true
            "#,
        )
        .unwrap();
        let cfg = ImportConfig::from_toml(&path).unwrap();
        assert_eq!(cfg.target_total_count, 10000);
        assert_eq!(cfg.min_popularity, 90);
        assert_eq!(cfg.max_rating_deviation, 100);
        assert_eq!(cfg.compression, Some(Compression::Gzip));
        assert!(cfg.persist_partial);
    }

    #[test]
    fn invalid_toml_is_a_config_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "max_rating_deviation = -4").unwrap();
        assert!(matches!(
            ImportConfig::from_toml(&path),
            Err(ImportError::Config(_))
        ));
        assert!(matches!(
            ImportConfig::from_toml(dir.path().join("missing.toml")),
            Err(ImportError::Io { .. })
        ));
    }

    #[test]
    fn validate_rejects_degenerate_values() {
        let mut cfg = ImportConfig::default();
        cfg.target_total_count = 0;
        assert!(cfg.validate().is_err());
        let mut cfg = ImportConfig::default();
        cfg.progress_every = 0;
        assert!(cfg.validate().is_err());
        let mut cfg = ImportConfig::default();
        cfg.source_url = "  ".into();
        assert!(cfg.validate().is_err());
    }
}
