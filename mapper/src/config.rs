use std::{net::SocketAddr, path::PathBuf};

use shared::UserLocation;

use crate::state::DEFAULT_NAMESPACE;

pub const DEFAULT_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_STORE_DIR: &str = "mapper-data";

pub const ENV_ADDR: &str = "MAPPER_ADDR";
pub const ENV_STORE_DIR: &str = "MAPPER_STORE_DIR";
pub const ENV_NAMESPACE: &str = "MAPPER_NAMESPACE";

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("invalid {name}: {value:?} is not a socket address")]
    InvalidAddr { name: &'static str, value: String },
    #[error("namespace must be non-empty ASCII letters, digits or '_', got {0:?}")]
    InvalidNamespace(String),
    #[error("invalid fixed location {0:?}: expected \"lat,lng[,accuracy]\" within range")]
    InvalidLocation(String),
}

/// Resolved runtime settings. CLI flags win over the environment, which wins
/// over the built-in defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct MapperConfig {
    pub bind_addr: SocketAddr,
    pub store_dir: PathBuf,
    pub namespace: String,
}

impl MapperConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let addr = lookup(ENV_ADDR).unwrap_or_else(|| DEFAULT_ADDR.to_string());
        let bind_addr = parse_addr(ENV_ADDR, &addr)?;
        let store_dir = lookup(ENV_STORE_DIR)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_DIR));
        let namespace = checked_namespace(
            lookup(ENV_NAMESPACE).unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
        )?;
        Ok(Self {
            bind_addr,
            store_dir,
            namespace,
        })
    }

    pub fn with_overrides(
        mut self,
        addr: Option<&str>,
        store_dir: Option<PathBuf>,
        namespace: Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(addr) = addr {
            self.bind_addr = parse_addr("--addr", addr)?;
        }
        if let Some(dir) = store_dir {
            self.store_dir = dir;
        }
        if let Some(namespace) = namespace {
            self.namespace = checked_namespace(namespace)?;
        }
        Ok(self)
    }
}

fn parse_addr(name: &'static str, value: &str) -> Result<SocketAddr, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidAddr {
        name,
        value: value.to_string(),
    })
}

// Keys end up as file names in the directory store.
fn checked_namespace(namespace: String) -> Result<String, ConfigError> {
    let valid = !namespace.is_empty()
        && namespace
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(namespace)
    } else {
        Err(ConfigError::InvalidNamespace(namespace))
    }
}

/// Parses `"lat,lng"` or `"lat,lng,accuracy"` for installations that report
/// a configured position instead of a measured one.
pub fn parse_fixed_location(text: &str) -> Result<UserLocation, ConfigError> {
    let invalid = || ConfigError::InvalidLocation(text.to_string());
    let parts: Vec<f64> = text
        .split(',')
        .map(|part| part.trim().parse::<f64>().map_err(|_| invalid()))
        .collect::<Result<_, _>>()?;
    let (lat, lng, accuracy) = match parts.as_slice() {
        [lat, lng] => (*lat, *lng, None),
        [lat, lng, accuracy] if *accuracy >= 0.0 => (*lat, *lng, Some(*accuracy)),
        _ => return Err(invalid()),
    };
    let location = UserLocation { lat, lng, accuracy };
    if !location.coordinate().is_valid() {
        return Err(invalid());
    }
    Ok(location)
}
