use std::sync::Arc;

use dashmap::DashMap;
use futures_util::future::{self, BoxFuture};
use futures_util::FutureExt;

use rulesync_core::error::{Result, RuleSyncError};

use crate::adapter::{DatabaseAdapter, PolicyAdapter};
use crate::config::{AdapterKind, AdapterSection, TransportKind, WatcherSection};
use crate::store::{MemoryRuleTable, RuleTable, SqliteRuleTable};
use crate::watcher::{BusConnector, BusWatcher, LocalBus, RedisConnector};

/// Builds a rule table from its adapter section.
pub type TableFactory = Arc<dyn Fn(AdapterSection) -> BoxFuture<'static, Result<Arc<dyn RuleTable>>> + Send + Sync>;

/// Builds a complete custom adapter from its adapter section.
pub type AdapterFactory =
    Arc<dyn Fn(AdapterSection) -> BoxFuture<'static, Result<Arc<dyn PolicyAdapter>>> + Send + Sync>;

/// Registry resolving `adapter.type` + `adapter.class` to a concrete adapter,
/// and `watcher.transport` to a bus connector.
#[derive(Default)]
pub struct AdapterRegistry {
    tables: DashMap<String, TableFactory>,
    adapters: DashMap<String, AdapterFactory>,
    local_bus: LocalBus,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the `memory` and `sqlite` tables.
    ///
    /// `memory` tables are shared per `(dsn, table)` within this registry, so
    /// enforcers built from the same registry see the same rows.
    pub fn with_builtins() -> Self {
        let reg = Self::new();

        let shared: Arc<DashMap<String, MemoryRuleTable>> = Arc::default();
        reg.register_table("memory", move |section: AdapterSection| {
            let key = format!("{}/{}", section.dsn.as_deref().unwrap_or_default(), section.table);
            let table = shared.entry(key).or_default().value().clone();
            future::ready(Ok(Arc::new(table) as Arc<dyn RuleTable>)).boxed()
        });
        reg.register_table("sqlite", |section: AdapterSection| open_sqlite(section).boxed());

        reg
    }

    pub fn register_table<F>(&self, class: impl Into<String>, factory: F)
    where
        F: Fn(AdapterSection) -> BoxFuture<'static, Result<Arc<dyn RuleTable>>> + Send + Sync + 'static,
    {
        self.tables.insert(class.into(), Arc::new(factory));
    }

    pub fn register_adapter<F>(&self, class: impl Into<String>, factory: F)
    where
        F: Fn(AdapterSection) -> BoxFuture<'static, Result<Arc<dyn PolicyAdapter>>> + Send + Sync + 'static,
    {
        self.adapters.insert(class.into(), Arc::new(factory));
    }

    pub fn registered_tables(&self) -> Vec<String> {
        self.tables.iter().map(|e| e.key().clone()).collect()
    }

    pub fn registered_adapters(&self) -> Vec<String> {
        self.adapters.iter().map(|e| e.key().clone()).collect()
    }

    /// Bus shared by every `local` watcher built from this registry.
    pub fn local_bus(&self) -> &LocalBus {
        &self.local_bus
    }

    pub async fn build_adapter(&self, section: &AdapterSection) -> Result<Arc<dyn PolicyAdapter>> {
        match section.kind {
            AdapterKind::Model => {
                let factory = self
                    .tables
                    .get(&section.class)
                    .map(|e| e.value().clone())
                    .ok_or_else(|| unknown_class(section))?;
                let table = factory(section.clone()).await?;
                tracing::info!(class = %section.class, table = %section.table, "rule table adapter built");
                Ok(Arc::new(DatabaseAdapter::new(table)))
            }
            AdapterKind::Adapter => {
                let factory = self
                    .adapters
                    .get(&section.class)
                    .map(|e| e.value().clone())
                    .ok_or_else(|| unknown_class(section))?;
                let adapter = factory(section.clone()).await?;
                tracing::info!(class = %section.class, "custom adapter built");
                Ok(adapter)
            }
        }
    }

    pub fn connector(&self, section: &WatcherSection) -> Box<dyn BusConnector> {
        match section.transport {
            TransportKind::Local => Box::new(self.local_bus.clone()),
            TransportKind::Redis => Box::new(
                RedisConnector::new(section.host.as_str(), section.port)
                    .with_password(section.password.as_str())
                    .with_database(section.database),
            ),
        }
    }

    pub async fn build_watcher(&self, section: &WatcherSection) -> Result<Arc<BusWatcher>> {
        let connector = self.connector(section);
        let watcher = BusWatcher::connect(connector.as_ref(), &section.channel).await?;
        Ok(Arc::new(watcher))
    }
}

fn unknown_class(section: &AdapterSection) -> RuleSyncError {
    RuleSyncError::Config(format!(
        "unknown {} class: {}",
        section.kind.as_str(),
        section.class
    ))
}

async fn open_sqlite(section: AdapterSection) -> Result<Arc<dyn RuleTable>> {
    let dsn = section
        .dsn
        .as_deref()
        .ok_or_else(|| RuleSyncError::Config("adapter.dsn is required for class sqlite".into()))?;
    let table = SqliteRuleTable::connect(dsn, &section.table).await?;
    table.create_table_if_missing().await?;
    Ok(Arc::new(table))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(kind: AdapterKind, class: &str) -> AdapterSection {
        AdapterSection {
            kind,
            class: class.into(),
            dsn: None,
            table: "casbin_rule".into(),
        }
    }

    #[test]
    fn builtins_are_registered() {
        let reg = AdapterRegistry::with_builtins();
        let mut tables = reg.registered_tables();
        tables.sort();
        assert_eq!(tables, vec!["memory".to_string(), "sqlite".to_string()]);
        assert!(reg.registered_adapters().is_empty());
    }

    #[tokio::test]
    async fn unknown_class_names_kind_and_class() {
        let reg = AdapterRegistry::with_builtins();
        let err = reg
            .build_adapter(&section(AdapterKind::Adapter, "nope"))
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind().as_str(), "CONFIG");
        assert!(err.to_string().contains("adapter class: nope"));
    }

    #[tokio::test]
    async fn sqlite_requires_dsn() {
        let reg = AdapterRegistry::with_builtins();
        let err = reg
            .build_adapter(&section(AdapterKind::Model, "sqlite"))
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind().as_str(), "CONFIG");
    }

    #[tokio::test]
    async fn memory_tables_are_shared_per_dsn() {
        let reg = AdapterRegistry::with_builtins();
        let a = reg.build_adapter(&section(AdapterKind::Model, "memory")).await.unwrap();
        let b = reg.build_adapter(&section(AdapterKind::Model, "memory")).await.unwrap();

        let rule = vec!["alice".to_string(), "data1".to_string(), "read".to_string()];
        a.add_policy("p", "p", &rule).await.unwrap();

        let mut model = rulesync_core::PolicyModel::new("");
        b.load_policy(&mut model).await.unwrap();
        assert!(model.has_policy("p", &rule));
    }

    #[tokio::test]
    async fn custom_adapter_class_is_built() {
        let reg = AdapterRegistry::with_builtins();
        let table = MemoryRuleTable::new();
        let backing = table.clone();
        reg.register_adapter("custom", move |_section: AdapterSection| {
            let adapter = DatabaseAdapter::new(Arc::new(backing.clone()));
            future::ready(Ok(Arc::new(adapter) as Arc<dyn PolicyAdapter>)).boxed()
        });
        assert_eq!(reg.registered_adapters(), vec!["custom".to_string()]);

        let adapter = reg.build_adapter(&section(AdapterKind::Adapter, "custom")).await.unwrap();
        let rule = vec!["bob".to_string(), "data2".to_string(), "write".to_string()];
        adapter.add_policy("p", "p", &rule).await.unwrap();
        assert_eq!(table.rows().await.len(), 1);

        let mut model = rulesync_core::PolicyModel::new("");
        adapter.load_policy(&mut model).await.unwrap();
        assert_eq!(model.policy("p"), &[rule][..]);
    }
}
