use std::fs;
use std::io::{IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info, warn};

use crate::models::Config;
use crate::parsers::Dialect;
use crate::parsers::lexical::DEFAULT_DURATION;

const FALLBACK_PATHS: [&str; 2] = ["./config.hcl", "./demos/example-health.hcl"];

/// Where the health-check configuration text came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigOrigin {
    Stdin,
    File(PathBuf),
    None,
}

/// Piped stdin wins; otherwise the first existing candidate file.
pub fn read_config_text(configured: &Path) -> (ConfigOrigin, Option<String>) {
    let stdin = std::io::stdin();
    if !stdin.is_terminal() {
        let mut text = String::new();
        match stdin.lock().read_to_string(&mut text) {
            Ok(_) if !text.trim().is_empty() => return (ConfigOrigin::Stdin, Some(text)),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Failed to read configuration from stdin"),
        }
    }
    read_first_existing(&candidates(configured))
}

fn candidates(configured: &Path) -> Vec<PathBuf> {
    std::iter::once(configured.to_path_buf())
        .chain(FALLBACK_PATHS.iter().map(PathBuf::from))
        .collect()
}

fn read_first_existing(paths: &[PathBuf]) -> (ConfigOrigin, Option<String>) {
    for path in paths.iter().filter(|p| p.is_file()) {
        match fs::read_to_string(path) {
            Ok(text) => return (ConfigOrigin::File(path.clone()), Some(text)),
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to read configuration file"),
        }
    }
    (ConfigOrigin::None, None)
}

/// An empty service list with the default interval; used whenever no usable
/// configuration exists.
pub fn empty_config() -> Config {
    Config {
        interval: Some(DEFAULT_DURATION),
        services: Vec::new(),
    }
}

/// Parses `text` with `dialect`. A parse failure is logged and yields an
/// empty configuration so the process can still start.
pub fn parse_or_empty(dialect: Dialect, origin: &ConfigOrigin, text: Option<&str>) -> Config {
    let Some(text) = text else {
        warn!("No configuration found, running with zero services");
        return empty_config();
    };
    match dialect.parse(text) {
        Ok(mut config) => {
            config.interval.get_or_insert(DEFAULT_DURATION);
            info!(
                origin = ?origin,
                dialect = %dialect,
                services = config.services.len(),
                interval_ms = interval_ms(config.interval),
                "Loaded health check configuration"
            );
            config
        }
        Err(e) => {
            error!(
                origin = ?origin,
                dialect = %dialect,
                input_len = e.input_len,
                prefix = %e.prefix,
                error = %e,
                "Failed to parse configuration, running with zero services"
            );
            empty_config()
        }
    }
}

fn interval_ms(interval: Option<Duration>) -> u128 {
    interval.unwrap_or(DEFAULT_DURATION).as_millis()
}

/// Discovers and parses the configuration in one step.
pub fn load(configured: &Path, dialect: Dialect) -> Config {
    let (origin, text) = read_config_text(configured);
    parse_or_empty(dialect, &origin, text.as_deref())
}
