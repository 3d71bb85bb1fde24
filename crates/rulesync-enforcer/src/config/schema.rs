use std::collections::BTreeMap;
use std::fs;

use serde::Deserialize;
use rulesync_core::error::{Result, RuleSyncError};

use crate::store::DEFAULT_TABLE;
use crate::watcher::DEFAULT_CHANNEL;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleSyncConfig {
    pub version: u32,

    #[serde(default = "default_profile_name")]
    pub default_profile: String,

    #[serde(default)]
    pub profiles: BTreeMap<String, ProfileConfig>,
}

impl RuleSyncConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(RuleSyncError::UnsupportedVersion);
        }
        if self.profiles.is_empty() {
            return Err(RuleSyncError::Config("profiles must not be empty".into()));
        }
        for (name, p) in &self.profiles {
            p.validate()
                .map_err(|e| RuleSyncError::Config(format!("profile {name}: {e}")))?;
        }
        Ok(())
    }

    /// Named profile, or a config error naming what is missing.
    pub fn profile(&self, name: &str) -> Result<&ProfileConfig> {
        self.profiles
            .get(name)
            .ok_or_else(|| RuleSyncError::Config(format!("profile {name} not found")))
    }

    /// `name`, falling back to `default_profile`.
    pub fn select<'a>(&'a self, name: Option<&'a str>) -> Result<(&'a str, &'a ProfileConfig)> {
        let name = name.unwrap_or(&self.default_profile);
        Ok((name, self.profile(name)?))
    }
}

fn default_profile_name() -> String {
    "default".into()
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileConfig {
    pub model: ModelSource,
    pub adapter: AdapterSection,
    #[serde(default)]
    pub watcher: Option<WatcherSection>,
}

impl ProfileConfig {
    pub fn validate(&self) -> Result<()> {
        self.model.validate()?;
        self.adapter.validate()?;
        if let Some(w) = &self.watcher {
            w.validate()?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelConfigType {
    File,
    Text,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelSource {
    pub config_type: ModelConfigType,
    #[serde(default)]
    pub config_file_path: Option<String>,
    #[serde(default)]
    pub config_text: Option<String>,
}

impl ModelSource {
    pub fn validate(&self) -> Result<()> {
        match self.config_type {
            ModelConfigType::File if self.config_file_path.as_deref().map_or(true, str::is_empty) => Err(
                RuleSyncError::Config("model.config_file_path is required for config_type file".into()),
            ),
            ModelConfigType::Text if self.config_text.is_none() => Err(RuleSyncError::Config(
                "model.config_text is required for config_type text".into(),
            )),
            _ => Ok(()),
        }
    }

    /// Model definition text (reads the file for `file`).
    pub fn definition(&self) -> Result<String> {
        match self.config_type {
            ModelConfigType::Text => Ok(self.config_text.clone().unwrap_or_default()),
            ModelConfigType::File => {
                let path = self.config_file_path.as_deref().unwrap_or_default();
                fs::read_to_string(path)
                    .map_err(|e| RuleSyncError::Config(format!("read model file {path} failed: {e}")))
            }
        }
    }
}

/// How the adapter is built: wrap a registered rule table (`model`) or use a
/// registered custom adapter (`adapter`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdapterKind {
    Model,
    Adapter,
}

impl AdapterKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AdapterKind::Model => "model",
            AdapterKind::Adapter => "adapter",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AdapterSection {
    #[serde(rename = "type")]
    pub kind: AdapterKind,
    /// Registry key (e.g. `sqlite`, `memory`, or a custom adapter name).
    pub class: String,
    #[serde(default)]
    pub dsn: Option<String>,
    #[serde(default = "default_table")]
    pub table: String,
}

impl AdapterSection {
    pub fn validate(&self) -> Result<()> {
        if self.class.trim().is_empty() {
            return Err(RuleSyncError::Config("adapter.class must not be empty".into()));
        }
        if self.table.is_empty() {
            return Err(RuleSyncError::Config("adapter.table must not be empty".into()));
        }
        Ok(())
    }
}

fn default_table() -> String {
    DEFAULT_TABLE.into()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Redis,
    /// In-process bus shared through the registry.
    Local,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WatcherSection {
    #[serde(default)]
    pub transport: TransportKind,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub database: u32,
    #[serde(default = "default_channel")]
    pub channel: String,
}

impl Default for WatcherSection {
    fn default() -> Self {
        Self {
            transport: TransportKind::default(),
            host: default_host(),
            port: default_port(),
            password: String::new(),
            database: 0,
            channel: default_channel(),
        }
    }
}

impl WatcherSection {
    pub fn validate(&self) -> Result<()> {
        if self.channel.is_empty() {
            return Err(RuleSyncError::Config("watcher.channel must not be empty".into()));
        }
        if self.transport == TransportKind::Redis {
            if self.host.is_empty() {
                return Err(RuleSyncError::Config("watcher.host must not be empty".into()));
            }
            if self.port == 0 {
                return Err(RuleSyncError::Config("watcher.port must be non-zero".into()));
            }
        }
        Ok(())
    }
}

fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    6379
}
fn default_channel() -> String {
    DEFAULT_CHANNEL.into()
}
