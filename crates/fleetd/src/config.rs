//! fleetd.toml configuration parser.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetdConfig {
    /// Directory holding `fleetgrid.redb`.
    pub data_dir: PathBuf,
    pub api: ApiConfig,
    pub upgrader: UpgraderConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpgraderConfig {
    /// When false the upgrade loop is not started.
    pub enabled: bool,
    /// Tick period, also the window of the throttle budget.
    pub interval_secs: u64,
}

impl Default for FleetdConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("/var/lib/fleetgrid"),
            api: ApiConfig::default(),
            upgrader: UpgraderConfig::default(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self { port: 8480 }
    }
}

impl Default for UpgraderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 60,
        }
    }
}

impl UpgraderConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl FleetdConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: FleetdConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if given, otherwise the defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.upgrader.interval_secs == 0 {
            anyhow::bail!("upgrader.interval_secs must be at least 1");
        }
        Ok(())
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("fleetgrid.redb")
    }
}
