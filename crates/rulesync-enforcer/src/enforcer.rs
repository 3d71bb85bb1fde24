//! Enforcer context object.
//!
//! Built once and shared as `Arc<Enforcer>`. Every mutation checks the
//! in-memory model, persists through the adapter, updates the model, and
//! finally notifies the attached watcher so other instances reload.

use std::sync::{Arc, Weak};

use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;

use rulesync_core::error::{Result, RuleSyncError};
use rulesync_core::model::{section_of, PolicyModel};
use rulesync_core::rule::RuleFilter;

use crate::adapter::PolicyAdapter;
use crate::config::RuleSyncConfig;
use crate::registry::AdapterRegistry;
use crate::watcher::Watcher;

pub struct Enforcer {
    definition: String,
    model: RwLock<PolicyModel>,
    adapter: Arc<dyn PolicyAdapter>,
    watcher: RwLock<Option<Arc<dyn Watcher>>>,
    reload_task: Mutex<Option<JoinHandle<()>>>,
}

impl Enforcer {
    /// Enforcer with an empty model. Call `load_policy` to populate it.
    pub fn new(definition: impl Into<String>, adapter: Arc<dyn PolicyAdapter>) -> Arc<Self> {
        let definition = definition.into();
        Arc::new(Self {
            model: RwLock::new(PolicyModel::new(definition.clone())),
            definition,
            adapter,
            watcher: RwLock::new(None),
            reload_task: Mutex::new(None),
        })
    }

    /// Build from a config profile (`None` picks `default_profile`), load the
    /// stored policy, and attach the watcher when one is configured.
    pub async fn from_config(
        cfg: &RuleSyncConfig,
        profile: Option<&str>,
        registry: &AdapterRegistry,
    ) -> Result<Arc<Self>> {
        let (name, p) = cfg.select(profile)?;

        let adapter = registry.build_adapter(&p.adapter).await?;
        let enforcer = Self::new(p.model.definition()?, adapter);
        enforcer.load_policy().await?;

        if let Some(ws) = &p.watcher {
            let watcher = registry.build_watcher(ws).await?;
            enforcer.set_watcher(watcher).await;
        }

        tracing::info!(profile = %name, "enforcer built");
        Ok(enforcer)
    }

    pub fn model_definition(&self) -> &str {
        &self.definition
    }

    pub fn adapter(&self) -> &Arc<dyn PolicyAdapter> {
        &self.adapter
    }

    /// Replace the in-memory model with a fresh load from storage. Local
    /// mutations wait for the load, so none is overwritten by a stale read.
    pub async fn load_policy(&self) -> Result<()> {
        let mut model = self.model.write().await;
        let mut fresh = PolicyModel::new(self.definition.clone());
        self.adapter.load_policy(&mut fresh).await?;
        let count = fresh.policy_count();
        *model = fresh;
        drop(model);
        tracing::info!(rules = count, "policy loaded");
        Ok(())
    }

    pub async fn save_policy(&self) -> Result<()> {
        let model = self.model.read().await;
        self.adapter.save_policy(&model).await
    }

    pub async fn get_policy(&self, ptype: &str) -> Vec<Vec<String>> {
        self.model.read().await.policy(ptype).to_vec()
    }

    pub async fn has_policy(&self, ptype: &str, rule: &[String]) -> bool {
        self.model.read().await.has_policy(ptype, rule)
    }

    /// Returns false (and touches nothing) when the rule already exists.
    pub async fn add_policy(&self, ptype: &str, rule: &[String]) -> Result<bool> {
        let sec = section_of(ptype)?;
        let mut model = self.model.write().await;
        if model.has_policy(ptype, rule) {
            return Ok(false);
        }
        self.adapter.add_policy(&sec, ptype, rule).await?;
        model.add_policy(ptype, rule)?;
        drop(model);
        self.notify().await;
        Ok(true)
    }

    /// All or nothing: returns false when any rule already exists.
    pub async fn add_policies(&self, ptype: &str, rules: &[Vec<String>]) -> Result<bool> {
        let sec = section_of(ptype)?;
        let mut model = self.model.write().await;
        if rules.iter().any(|r| model.has_policy(ptype, r)) {
            return Ok(false);
        }
        self.adapter.add_policies(&sec, ptype, rules).await?;
        model.add_policies(ptype, rules)?;
        drop(model);
        self.notify().await;
        Ok(true)
    }

    pub async fn remove_policy(&self, ptype: &str, rule: &[String]) -> Result<bool> {
        let sec = section_of(ptype)?;
        let mut model = self.model.write().await;
        if !model.has_policy(ptype, rule) {
            return Ok(false);
        }
        self.adapter.remove_policy(&sec, ptype, rule).await?;
        model.remove_policy(ptype, rule);
        drop(model);
        self.notify().await;
        Ok(true)
    }

    /// All or nothing: returns false when any rule is missing.
    pub async fn remove_policies(&self, ptype: &str, rules: &[Vec<String>]) -> Result<bool> {
        let sec = section_of(ptype)?;
        let mut model = self.model.write().await;
        if !rules.iter().all(|r| model.has_policy(ptype, r)) {
            return Ok(false);
        }
        self.adapter.remove_policies(&sec, ptype, rules).await?;
        model.remove_policies(ptype, rules);
        drop(model);
        self.notify().await;
        Ok(true)
    }

    /// Storage is always asked to remove and peers are always notified;
    /// returns whether the local model changed.
    pub async fn remove_filtered_policy(
        &self,
        ptype: &str,
        field_index: usize,
        field_values: &[String],
    ) -> Result<bool> {
        let sec = section_of(ptype)?;
        let mut model = self.model.write().await;
        self.adapter
            .remove_filtered_policy(&sec, ptype, field_index, field_values)
            .await?;
        let removed = model.remove_filtered_policy(ptype, &RuleFilter::new(field_index, field_values));
        drop(model);
        self.notify().await;
        Ok(!removed.is_empty())
    }

    pub async fn update_policy(&self, ptype: &str, old_rule: &[String], new_rule: &[String]) -> Result<bool> {
        let sec = section_of(ptype)?;
        let mut model = self.model.write().await;
        if !model.has_policy(ptype, old_rule) {
            return Ok(false);
        }
        self.adapter.update_policy(&sec, ptype, old_rule, new_rule).await?;
        model.update_policy(ptype, old_rule, new_rule);
        drop(model);
        self.notify().await;
        Ok(true)
    }

    pub async fn update_policies(
        &self,
        ptype: &str,
        old_rules: &[Vec<String>],
        new_rules: &[Vec<String>],
    ) -> Result<bool> {
        if old_rules.len() != new_rules.len() {
            return Err(RuleSyncError::BadRequest(format!(
                "{} old rules paired with {} new rules",
                old_rules.len(),
                new_rules.len()
            )));
        }
        let sec = section_of(ptype)?;
        let mut model = self.model.write().await;
        if !old_rules.iter().all(|r| model.has_policy(ptype, r)) {
            return Ok(false);
        }
        self.adapter.update_policies(&sec, ptype, old_rules, new_rules).await?;
        for (old, new) in old_rules.iter().zip(new_rules) {
            model.update_policy(ptype, old, new);
        }
        drop(model);
        self.notify().await;
        Ok(true)
    }

    /// Replace every rule matching the filter with `new_rules`; returns the
    /// replaced rules as storage reported them.
    pub async fn update_filtered_policies(
        &self,
        ptype: &str,
        new_rules: &[Vec<String>],
        field_index: usize,
        field_values: &[String],
    ) -> Result<Vec<Vec<String>>> {
        let sec = section_of(ptype)?;
        let mut model = self.model.write().await;
        let old = self
            .adapter
            .update_filtered_policies(&sec, ptype, new_rules, field_index, field_values)
            .await?;
        model.remove_filtered_policy(ptype, &RuleFilter::new(field_index, field_values));
        // Storage bulk-inserts every rule, duplicates included.
        for rule in new_rules {
            model.load_rule(ptype, rule)?;
        }
        drop(model);
        self.notify().await;
        Ok(old)
    }

    /// Attach a watcher. Notifications are coalesced into a background
    /// reload; a notification arriving mid-reload queues one more reload.
    pub async fn set_watcher(self: &Arc<Self>, watcher: Arc<dyn Watcher>) {
        let (tx, rx) = mpsc::channel::<()>(1);
        watcher.set_update_callback(Arc::new(move || {
            // Full means a reload is already pending.
            let _ = tx.try_send(());
        }));

        let task = tokio::spawn(reload_loop(Arc::downgrade(self), rx));
        if let Some(old) = self.reload_task.lock().await.replace(task) {
            old.abort();
        }
        *self.watcher.write().await = Some(watcher);
        tracing::info!("watcher attached");
    }

    pub async fn watcher(&self) -> Option<Arc<dyn Watcher>> {
        self.watcher.read().await.clone()
    }

    /// Close the watcher and stop the reload task.
    pub async fn close(&self) -> Result<()> {
        let watcher = self.watcher.write().await.take();
        if let Some(w) = watcher {
            w.close().await?;
        }
        if let Some(task) = self.reload_task.lock().await.take() {
            task.abort();
        }
        Ok(())
    }

    async fn notify(&self) {
        let watcher = self.watcher.read().await.clone();
        if let Some(w) = watcher {
            // Storage is already committed; a failed publish only delays peers.
            if let Err(e) = w.update().await {
                tracing::warn!(error = %e, "watcher update failed");
            }
        }
    }
}

async fn reload_loop(weak: Weak<Enforcer>, mut rx: mpsc::Receiver<()>) {
    while rx.recv().await.is_some() {
        let Some(enforcer) = weak.upgrade() else { break };
        if let Err(e) = enforcer.load_policy().await {
            tracing::warn!(error = %e, "policy reload failed");
        }
    }
    tracing::debug!("reload task stopped");
}
