//! Configuration Module - User preferences from ~/.salvage/config.toml
//!
//! Supports:
//! - Log level used when RUST_LOG is not set
//! - Recovery defaults (chunk size, workers, catalog file, deleted-only policy)
//! - Output defaults (destination, manifest)

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::extract::DEFAULT_CHUNK_SIZE;
use crate::job::DEFAULT_WORKERS;
use crate::output::manifest::MANIFEST_FILE_NAME;

/// Salvage Configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,
    /// Recovery settings
    pub recovery: RecoveryDefaults,
    /// Output settings
    pub output: OutputConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Recovery defaults, overridden by command-line flags
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryDefaults {
    /// Bytes per random-access read
    pub chunk_size: usize,
    /// Number of copy workers
    pub workers: usize,
    /// Signature catalog file (built-in table when unset)
    pub catalog: Option<PathBuf>,
    /// Filesystem mode: recover live files too, not only deleted ones
    pub include_unallocated: bool,
}

impl Default for RecoveryDefaults {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            workers: DEFAULT_WORKERS,
            catalog: None,
            include_unallocated: false,
        }
    }
}

/// Output settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Destination used when none is given on the command line
    pub default_dest: Option<PathBuf>,
    /// Write a JSON manifest into the destination
    pub write_manifest: bool,
    /// Manifest file name
    pub manifest_name: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            default_dest: None,
            write_manifest: true,
            manifest_name: MANIFEST_FILE_NAME.to_string(),
        }
    }
}

impl Config {
    /// Load config from the default path, or defaults when it is absent
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))?;

        Ok(config)
    }

    /// Save config to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, content)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;

        Ok(())
    }

    /// Get default config path
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("org", "salvage", "salvage")
            .map(|dirs| dirs.config_dir().join("config.toml"))
            .unwrap_or_else(|| {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join(".salvage")
                    .join("config.toml")
            })
    }

    /// Write the commented sample file unless one already exists
    pub fn init_at(path: &Path) -> Result<bool> {
        if path.exists() {
            return Ok(false);
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, generate_sample_config())
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        tracing::info!("Created default config at {}", path.display());
        Ok(true)
    }
}

/// Generate a sample config file with comments
pub fn generate_sample_config() -> String {
    format!(
        r#"# Salvage Configuration
# Location: ~/.config/salvage/config.toml (or %APPDATA%\salvage\config\config.toml on Windows)

[general]
# Log level when RUST_LOG is unset: trace, debug, info, warn, error
log_level = "info"

[recovery]
# Bytes per random-access read; bounds memory per worker
chunk_size = {chunk}

# Parallel copy workers (I/O bound, not CPU bound)
workers = {workers}

# Signature catalog (JSON). Leave unset to use the built-in table.
# catalog = "/etc/salvage/signatures.json"

# Filesystem mode: also recover files that are still allocated.
# false = deleted entries only
include_unallocated = false

[output]
# Destination when none is given on the command line (optional)
# default_dest = "/home/user/Recovered"

# Write a JSON manifest with BLAKE3 digests into the destination
write_manifest = true
manifest_name = "{manifest}"
"#,
        chunk = DEFAULT_CHUNK_SIZE,
        workers = DEFAULT_WORKERS,
        manifest = MANIFEST_FILE_NAME,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.recovery.chunk_size, 1024 * 1024);
        assert!(!config.recovery.include_unallocated);
        assert!(config.output.write_manifest);
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test_config.toml");

        let mut config = Config::default();
        config.recovery.workers = 9;
        config.recovery.catalog = Some(PathBuf::from("/tmp/sigs.json"));
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.recovery.workers, 9);
        assert_eq!(loaded.recovery.catalog, config.recovery.catalog);
    }

    #[test]
    fn test_parse_sample_config() {
        let sample = generate_sample_config();
        let config: Config = toml::from_str(&sample).unwrap();
        assert_eq!(config.recovery.workers, DEFAULT_WORKERS);
        assert_eq!(config.output.manifest_name, MANIFEST_FILE_NAME);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: Config = toml::from_str("[recovery]\nworkers = 2\n").unwrap();
        assert_eq!(config.recovery.workers, 2);
        assert_eq!(config.recovery.chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(config.general.log_level, "info");
    }

    #[test]
    fn test_init_does_not_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        assert!(Config::init_at(&path).unwrap());
        fs::write(&path, "[general]\nlog_level = \"debug\"\n").unwrap();
        assert!(!Config::init_at(&path).unwrap());
        assert_eq!(Config::load_from(&path).unwrap().general.log_level, "debug");
    }
}
