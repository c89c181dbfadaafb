use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::parsers::Dialect;

const ENV_PREFIX: &str = "WEBDOCTOR_";

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to read settings file at {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse TOML from settings file at {path:?}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Failed to load settings from environment: {0}")]
    Env(#[from] envy::Error),
}

/// Process settings. The health-check configuration itself lives in
/// `config_path` and is parsed by one of the dialects.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ServerSettings {
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    #[serde(default = "default_config_path")]
    pub config_path: PathBuf,

    #[serde(default)]
    pub dialect: Dialect,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,
}

// Partial settings for layering
#[derive(Deserialize, Default, Debug)]
struct PartialSettings {
    listen_address: Option<String>,
    config_path: Option<PathBuf>,
    dialect: Option<Dialect>,
    log_dir: Option<String>,
    broadcast_capacity: Option<usize>,
}

fn default_listen_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_config_path() -> PathBuf {
    PathBuf::from("/app/config.hcl")
}

fn default_log_dir() -> String {
    "logs".to_string()
}

fn default_broadcast_capacity() -> usize {
    256
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            config_path: default_config_path(),
            dialect: Dialect::default(),
            log_dir: default_log_dir(),
            broadcast_capacity: default_broadcast_capacity(),
        }
    }
}

impl ServerSettings {
    /// Defaults, then the optional TOML file, then `WEBDOCTOR_*` variables.
    /// A `.env` file is loaded first when present.
    pub fn load(settings_path: Option<&Path>) -> Result<Self, SettingsError> {
        dotenv::dotenv().ok();
        let file = match settings_path {
            Some(path) => read_file(path)?,
            None => PartialSettings::default(),
        };
        let env = envy::prefixed(ENV_PREFIX).from_env::<PartialSettings>()?;
        Ok(Self::merge(env, file))
    }

    fn merge(env: PartialSettings, file: PartialSettings) -> Self {
        ServerSettings {
            listen_address: env
                .listen_address
                .or(file.listen_address)
                .unwrap_or_else(default_listen_address),
            config_path: env
                .config_path
                .or(file.config_path)
                .unwrap_or_else(default_config_path),
            dialect: env.dialect.or(file.dialect).unwrap_or_default(),
            log_dir: env.log_dir.or(file.log_dir).unwrap_or_else(default_log_dir),
            broadcast_capacity: env
                .broadcast_capacity
                .or(file.broadcast_capacity)
                .unwrap_or_else(default_broadcast_capacity)
                .max(1),
        }
    }
}

fn read_file(path: &Path) -> Result<PartialSettings, SettingsError> {
    if !path.exists() {
        return Ok(PartialSettings::default());
    }
    let contents = fs::read_to_string(path).map_err(|source| SettingsError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| SettingsError::Toml {
        path: path.to_path_buf(),
        source,
    })
}
