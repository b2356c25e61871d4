//! Daemon configuration (`convoy.toml`).
//!
//! Every field has a default and a missing file means "all defaults", so a
//! bare `convoyd run` works out of the box with a simulated runtime and a
//! redb store in `./convoy-data`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use convoy_alert::{AlertPolicy, NotifierConfig};

use crate::error::{ControllerError, ControllerResult};

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvoyConfig {
    pub controller: ControllerConfig,
    pub alerts: AlertPolicy,
    pub notifier: NotifierConfig,
    pub runtime: RuntimeConfig,
    pub store: StoreConfig,
    pub api: ApiConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Reconcile period.
    pub tick_ms: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self { tick_ms: 1_000 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeMode {
    /// In-process simulated agent.
    #[default]
    Simulated,
    /// Remote agent over HTTP.
    Agent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub mode: RuntimeMode,
    pub agent_url: String,
    pub api_key: Option<String>,
    pub timeout_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            mode: RuntimeMode::Simulated,
            agent_url: "http://127.0.0.1:8070".to_string(),
            api_key: None,
            timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Redb,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Redb,
            path: PathBuf::from("convoy-data/convoy.redb"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub port: u16,
    /// Required on mutating routes when set.
    pub api_key: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            api_key: None,
        }
    }
}

impl ConvoyConfig {
    /// Load from `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> ControllerResult<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(?path, "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };
        Self::from_toml(&content).map_err(|reason| ControllerError::Config {
            path: path.display().to_string(),
            reason,
        })
    }

    pub fn from_toml(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }
}
