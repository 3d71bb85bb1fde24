//! Adapter over a relational rule table.
//!
//! Stateless: every call goes straight to the `PolicyStore`, which is the
//! single source of truth. `sec` is accepted for contract shape; rows are
//! keyed by `ptype` alone.

use std::sync::Arc;

use async_trait::async_trait;

use rulesync_core::error::Result;
use rulesync_core::model::PolicyModel;
use rulesync_core::rule::RuleFilter;

use super::{Adapter, BatchAdapter, UpdatableAdapter};
use crate::store::{PolicyStore, RuleTable};

/// Sections persisted by `save_policy`.
const SAVED_SECTIONS: [&str; 2] = ["p", "g"];

#[derive(Clone)]
pub struct DatabaseAdapter {
    store: PolicyStore,
}

impl DatabaseAdapter {
    pub fn new(table: Arc<dyn RuleTable>) -> Self {
        Self {
            store: PolicyStore::new(table),
        }
    }

    pub fn store(&self) -> &PolicyStore {
        &self.store
    }
}

#[async_trait]
impl Adapter for DatabaseAdapter {
    async fn load_policy(&self, model: &mut PolicyModel) -> Result<()> {
        let rows = self.store.all_rows().await?;
        for row in &rows {
            // Any empty field is dropped here, interior ones included.
            model.load_policy_line(&row.record.to_policy_line())?;
        }
        tracing::info!(rows = rows.len(), "policy loaded from storage");
        Ok(())
    }

    async fn save_policy(&self, model: &PolicyModel) -> Result<()> {
        let mut saved = 0usize;
        for sec in SAVED_SECTIONS {
            for (ptype, rules) in model.assertions(sec) {
                for rule in rules {
                    self.store.add(ptype, rule).await?;
                    saved += 1;
                }
            }
        }
        tracing::info!(rows = saved, "policy saved to storage");
        Ok(())
    }

    async fn add_policy(&self, _sec: &str, ptype: &str, rule: &[String]) -> Result<()> {
        self.store.add(ptype, rule).await
    }

    async fn remove_policy(&self, _sec: &str, ptype: &str, rule: &[String]) -> Result<()> {
        self.store.remove(ptype, rule).await.map(|_| ())
    }

    async fn remove_filtered_policy(
        &self,
        _sec: &str,
        ptype: &str,
        field_index: usize,
        field_values: &[String],
    ) -> Result<()> {
        let filter = RuleFilter::new(field_index, field_values);
        self.store.remove_filtered(ptype, &filter).await.map(|_| ())
    }
}

#[async_trait]
impl BatchAdapter for DatabaseAdapter {
    async fn add_policies(&self, _sec: &str, ptype: &str, rules: &[Vec<String>]) -> Result<()> {
        self.store.add_all(ptype, rules).await
    }

    async fn remove_policies(&self, _sec: &str, ptype: &str, rules: &[Vec<String>]) -> Result<()> {
        self.store.remove_all(ptype, rules).await.map(|_| ())
    }
}

#[async_trait]
impl UpdatableAdapter for DatabaseAdapter {
    async fn update_policy(&self, _sec: &str, ptype: &str, old_rule: &[String], new_rule: &[String]) -> Result<()> {
        self.store.update(ptype, old_rule, new_rule).await.map(|_| ())
    }

    async fn update_policies(
        &self,
        _sec: &str,
        ptype: &str,
        old_rules: &[Vec<String>],
        new_rules: &[Vec<String>],
    ) -> Result<()> {
        self.store.update_all(ptype, old_rules, new_rules).await.map(|_| ())
    }

    async fn update_filtered_policies(
        &self,
        _sec: &str,
        ptype: &str,
        new_rules: &[Vec<String>],
        field_index: usize,
        field_values: &[String],
    ) -> Result<Vec<Vec<String>>> {
        let filter = RuleFilter::new(field_index, field_values);
        self.store.update_filtered(ptype, new_rules, &filter).await
    }
}
