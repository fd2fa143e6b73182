use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::error::IbeError;
use crate::missions::MissionKind;

pub const DEFAULT_CONFIG_FILE: &str = "ibe.json";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub cache_dir: Option<String>,
    #[serde(default)]
    pub missions: BTreeMap<String, MissionEntry>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum MissionEntry {
    Shorthand(String),
    Detailed(MissionEntryObject),
}

#[derive(Debug, Deserialize, Serialize)]
pub struct MissionEntryObject {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub filesystem_basedir: Option<String>,
}

/// Per-mission overrides handed to a data source when it is built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MissionSettings {
    pub host: Option<String>,
    pub filesystem_basedir: Option<Utf8PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub timeout: Duration,
    pub user_agent: String,
    pub cache_dir: Option<Utf8PathBuf>,
    pub missions: BTreeMap<MissionKind, MissionSettings>,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            schema_version: 1,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_agent: default_user_agent(),
            cache_dir: None,
            missions: BTreeMap::new(),
        }
    }
}

impl ResolvedConfig {
    pub fn mission(&self, kind: MissionKind) -> MissionSettings {
        self.missions.get(&kind).cloned().unwrap_or_default()
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads `path`, or `ibe.json` in the working directory. Without an
    /// explicit path a missing file yields the defaults.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, IbeError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Ok(ResolvedConfig::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| IbeError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| IbeError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, IbeError> {
        let schema_version = config.schema_version.unwrap_or(1);
        let timeout = Duration::from_secs(config.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS));
        let user_agent = config
            .user_agent
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(default_user_agent);
        let cache_dir = config.cache_dir.map(Utf8PathBuf::from);

        let missions = config
            .missions
            .into_iter()
            .map(|(name, entry)| {
                let kind: MissionKind = name.parse()?;
                let settings = match entry {
                    MissionEntry::Shorthand(host) => MissionSettings {
                        host: Some(host),
                        filesystem_basedir: None,
                    },
                    MissionEntry::Detailed(obj) => MissionSettings {
                        host: obj.host,
                        filesystem_basedir: obj.filesystem_basedir.map(Utf8PathBuf::from),
                    },
                };
                Ok((kind, settings))
            })
            .collect::<Result<BTreeMap<_, _>, IbeError>>()?;

        Ok(ResolvedConfig {
            schema_version,
            timeout,
            user_agent,
            cache_dir,
            missions,
        })
    }
}

pub fn default_user_agent() -> String {
    format!("firefly-ibe/{}", env!("CARGO_PKG_VERSION"))
}
