//! Profile config loading: YAML into a validated `RuleSyncConfig`.
//!
//! `AdapterRegistry` resolves each profile's adapter and watcher sections.

pub mod schema;

use std::fs;

use rulesync_core::error::{Result, RuleSyncError};

pub use schema::{
    AdapterKind, AdapterSection, ModelConfigType, ModelSource, ProfileConfig, RuleSyncConfig, TransportKind,
    WatcherSection,
};

pub fn load_from_file(path: &str) -> Result<RuleSyncConfig> {
    let s = fs::read_to_string(path)
        .map_err(|e| RuleSyncError::Config(format!("read config {path} failed: {e}")))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<RuleSyncConfig> {
    let cfg: RuleSyncConfig = serde_yaml::from_str(s)
        .map_err(|e| RuleSyncError::Config(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}
