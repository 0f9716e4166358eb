//! TQ-014: Configuration — `topoquery.yaml` parsing, validation and reader discovery.
//!
//! ```yaml
//! readers:            # glob patterns, relative to the config file
//!   - readers/*
//! pool_size: 10
//! verbosity: normal   # normal | debug
//! output: yaml        # yaml | json
//! ```

use super::runner::DEFAULT_POOL_SIZE;
use super::types::{OutputFormat, Verbosity};
use crate::error::{ConfigError, Error};
use crate::reader::file::{FileReader, MANIFEST_FILE};
use crate::reader::Reader;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

pub const DEFAULT_CONFIG_FILE: &str = "topoquery.yaml";
/// Environment variable the CLI reads the config path from.
pub const CONFIG_ENV: &str = "TOPOQUERY_CONFIG";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Glob patterns matching reader directories.
    #[serde(default)]
    pub readers: Vec<String>,

    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    #[serde(default)]
    pub verbosity: Verbosity,

    #[serde(default)]
    pub output: OutputFormat,
}

fn default_pool_size() -> usize {
    DEFAULT_POOL_SIZE
}

impl Default for Config {
    fn default() -> Self {
        Self {
            readers: Vec::new(),
            pool_size: DEFAULT_POOL_SIZE,
            verbosity: Verbosity::Normal,
            output: OutputFormat::Yaml,
        }
    }
}

/// A loaded config and the directory its relative patterns are resolved from.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: Config,
    pub base_dir: PathBuf,
    /// `None` when no file was found and defaults are in use.
    pub path: Option<PathBuf>,
}

pub fn parse_config(yaml: &str) -> Result<Config, ConfigError> {
    Ok(serde_yaml_ng::from_str(yaml)?)
}

pub fn parse_config_file(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&content)
}

/// Validate a parsed config. Returns a list of errors (empty = valid).
pub fn validate_config(config: &Config) -> Vec<String> {
    let mut errors = Vec::new();
    if config.pool_size == 0 {
        errors.push("pool_size must be at least 1".to_string());
    }
    for (i, pattern) in config.readers.iter().enumerate() {
        if pattern.trim().is_empty() {
            errors.push(format!("readers[{}] is empty", i));
            continue;
        }
        if let Err(e) = glob::Pattern::new(pattern) {
            errors.push(format!("readers[{}] \"{}\" is not a valid pattern: {}", i, pattern, e));
        }
    }
    errors
}

/// Load and validate the config at `flag`, else `./topoquery.yaml`. A missing default
/// file yields the default config; a missing explicitly requested file is an error.
pub fn load(flag: Option<&Path>) -> Result<LoadedConfig, ConfigError> {
    let explicit = flag.is_some();
    let path = flag.map_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE), Path::to_path_buf);
    if !explicit && !path.exists() {
        debug!(path = %path.display(), "no config file, using defaults");
        return Ok(LoadedConfig {
            config: Config::default(),
            base_dir: PathBuf::from("."),
            path: None,
        });
    }
    let config = parse_config_file(&path)?;
    let errors = validate_config(&config);
    if !errors.is_empty() {
        return Err(ConfigError::Invalid(errors));
    }
    let base_dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    debug!(path = %path.display(), readers = config.readers.len(), "config loaded");
    Ok(LoadedConfig {
        config,
        base_dir,
        path: Some(path),
    })
}

/// Expand reader patterns into reader directories, in pattern then path order.
/// Matches without a manifest are skipped.
pub fn reader_dirs(config: &Config, base_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let mut dirs: Vec<PathBuf> = Vec::new();
    for pattern in &config.readers {
        let full = if Path::new(pattern).is_absolute() {
            pattern.clone()
        } else {
            base_dir.join(pattern).to_string_lossy().into_owned()
        };
        let paths = glob::glob(&full).map_err(|e| ConfigError::Pattern {
            pattern: pattern.clone(),
            message: e.to_string(),
        })?;
        let mut matched: Vec<PathBuf> = paths.filter_map(|p| p.ok()).collect();
        matched.sort();
        for dir in matched {
            if !dir.join(MANIFEST_FILE).is_file() {
                warn!(path = %dir.display(), "skipping match without {}", MANIFEST_FILE);
                continue;
            }
            if !dirs.contains(&dir) {
                dirs.push(dir);
            }
        }
    }
    Ok(dirs)
}

/// Open every reader directory the config points at.
pub fn resolve_readers(config: &Config, base_dir: &Path) -> Result<Vec<Arc<dyn Reader>>, Error> {
    let mut readers: Vec<Arc<dyn Reader>> = Vec::new();
    for dir in reader_dirs(config, base_dir)? {
        readers.push(Arc::new(FileReader::open(&dir)?));
    }
    Ok(readers)
}
