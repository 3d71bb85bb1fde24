//! Engine-facing adapter contract.
//!
//! Mirrors the engine's capability split: `Adapter` (load/save and single-rule
//! auto-save), `BatchAdapter`, and `UpdatableAdapter`. Anything that implements
//! all three is a `PolicyAdapter` and can back an `Enforcer`.

pub mod database;

use async_trait::async_trait;

use rulesync_core::error::Result;
use rulesync_core::model::PolicyModel;

pub use database::DatabaseAdapter;

#[async_trait]
pub trait Adapter: Send + Sync {
    /// Feed every stored rule into `model` through its line parser.
    async fn load_policy(&self, model: &mut PolicyModel) -> Result<()>;

    /// Persist every rule of `model`. Storage is not cleared first.
    async fn save_policy(&self, model: &PolicyModel) -> Result<()>;

    async fn add_policy(&self, sec: &str, ptype: &str, rule: &[String]) -> Result<()>;

    async fn remove_policy(&self, sec: &str, ptype: &str, rule: &[String]) -> Result<()>;

    async fn remove_filtered_policy(
        &self,
        sec: &str,
        ptype: &str,
        field_index: usize,
        field_values: &[String],
    ) -> Result<()>;
}

#[async_trait]
pub trait BatchAdapter: Send + Sync {
    async fn add_policies(&self, sec: &str, ptype: &str, rules: &[Vec<String>]) -> Result<()>;

    async fn remove_policies(&self, sec: &str, ptype: &str, rules: &[Vec<String>]) -> Result<()>;
}

#[async_trait]
pub trait UpdatableAdapter: Send + Sync {
    async fn update_policy(&self, sec: &str, ptype: &str, old_rule: &[String], new_rule: &[String]) -> Result<()>;

    async fn update_policies(
        &self,
        sec: &str,
        ptype: &str,
        old_rules: &[Vec<String>],
        new_rules: &[Vec<String>],
    ) -> Result<()>;

    /// Replace every rule matching the filter with `new_rules`; returns the
    /// rules that were replaced.
    async fn update_filtered_policies(
        &self,
        sec: &str,
        ptype: &str,
        new_rules: &[Vec<String>],
        field_index: usize,
        field_values: &[String],
    ) -> Result<Vec<Vec<String>>>;
}

/// Full adapter capability set.
pub trait PolicyAdapter: Adapter + BatchAdapter + UpdatableAdapter {}

impl<T: Adapter + BatchAdapter + UpdatableAdapter> PolicyAdapter for T {}
