use std::fs;
use std::path::{Path, PathBuf};

use pipewalk::TraversalConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Settings read from `pipewalk.toml`.
///
/// ```toml
/// graph = "/data/social.json"
///
/// [traversal]
/// optimize = true
/// seed = 7
/// max_loop_depth = 32
/// ```
#[derive(Debug, Default)]
pub struct CliConfig {
    path: Option<PathBuf>,
    data: RawConfig,
}

impl CliConfig {
    pub fn load(explicit: Option<PathBuf>) -> Result<Self, ConfigError> {
        let path = explicit.or_else(default_config_path);
        let data = match path.as_ref() {
            Some(config_path) if config_path.exists() => read_file(config_path)?,
            _ => RawConfig::default(),
        };
        Ok(Self { path, data })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn default_graph(&self) -> Option<&PathBuf> {
        self.data.graph.as_ref()
    }

    pub fn traversal(&self) -> &TraversalConfig {
        &self.data.traversal
    }

    /// Writes a commented starter file unless one already exists.
    pub fn init(&self) -> Result<PathBuf, ConfigError> {
        let target = self
            .path
            .clone()
            .or_else(default_config_path)
            .ok_or(ConfigError::NoConfigPath)?;
        if target.exists() {
            return Err(ConfigError::AlreadyExists { path: target });
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let serialized = toml::to_string_pretty(&RawConfig::default())
            .map_err(|source| ConfigError::Serialize { source })?;
        fs::write(&target, serialized).map_err(|source| ConfigError::Write {
            path: target.clone(),
            source,
        })?;
        Ok(target)
    }
}

fn read_file(path: &Path) -> Result<RawConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct RawConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    graph: Option<PathBuf>,
    #[serde(default)]
    traversal: TraversalConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read CLI config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse CLI config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("failed to serialize CLI config: {source}")]
    Serialize { source: toml::ser::Error },
    #[error("failed to write CLI config {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to create config directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("config file {path} already exists")]
    AlreadyExists { path: PathBuf },
    #[error("no config directory found; pass --config or set PIPEWALK_CONFIG")]
    NoConfigPath,
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join("pipewalk").join("pipewalk.toml"))
}
