//! Multi-step operations leave storage untouched when a step fails.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::io;
use std::sync::Arc;

use async_trait::async_trait;

use rulesync_core::error::{Result, RuleSyncError};
use rulesync_core::rule::{RowId, RowPredicate, RuleFilter, RuleRecord, StoredRuleRow};
use rulesync_enforcer::store::{MemoryRuleTable, PolicyStore, RuleTable, RuleTxn};

#[derive(Clone, Copy, PartialEq, Eq)]
enum FailOn {
    SecondUpdate,
    InsertAll,
    SecondDelete,
}

/// Memory table whose transactions fail one chosen step.
struct FlakyTable {
    inner: MemoryRuleTable,
    fail_on: FailOn,
}

struct FlakyTxn {
    inner: Box<dyn RuleTxn>,
    fail_on: FailOn,
    updates: usize,
    deletes: usize,
}

fn injected() -> RuleSyncError {
    RuleSyncError::storage(io::Error::new(io::ErrorKind::Other, "injected failure"))
}

#[async_trait]
impl RuleTable for FlakyTable {
    async fn begin(&self) -> Result<Box<dyn RuleTxn>> {
        Ok(Box::new(FlakyTxn {
            inner: self.inner.begin().await?,
            fail_on: self.fail_on,
            updates: 0,
            deletes: 0,
        }))
    }
}

#[async_trait]
impl RuleTxn for FlakyTxn {
    async fn insert(&mut self, record: RuleRecord) -> Result<RowId> {
        self.inner.insert(record).await
    }

    async fn insert_all(&mut self, records: Vec<RuleRecord>) -> Result<()> {
        if self.fail_on == FailOn::InsertAll {
            return Err(injected());
        }
        self.inner.insert_all(records).await
    }

    async fn select(&mut self, pred: &RowPredicate) -> Result<Vec<StoredRuleRow>> {
        self.inner.select(pred).await
    }

    async fn select_all(&mut self) -> Result<Vec<StoredRuleRow>> {
        self.inner.select_all().await
    }

    async fn delete(&mut self, ids: &[RowId]) -> Result<u64> {
        self.deletes += 1;
        if self.fail_on == FailOn::SecondDelete && self.deletes == 2 {
            return Err(injected());
        }
        self.inner.delete(ids).await
    }

    async fn update_first(&mut self, pred: &RowPredicate, values: &[(usize, String)]) -> Result<bool> {
        self.updates += 1;
        if self.fail_on == FailOn::SecondUpdate && self.updates == 2 {
            return Err(injected());
        }
        self.inner.update_first(pred, values).await
    }

    async fn commit(&mut self) -> Result<()> {
        self.inner.commit().await
    }
}

fn rule(fields: &[&str]) -> Vec<String> {
    fields.iter().map(|s| s.to_string()).collect()
}

async fn seeded(fail_on: FailOn) -> (PolicyStore, MemoryRuleTable) {
    let inner = MemoryRuleTable::new();
    PolicyStore::new(Arc::new(inner.clone()))
        .add_all("p", &[rule(&["a", "1"]), rule(&["b", "2"]), rule(&["c", "3"])])
        .await
        .unwrap();
    let flaky = PolicyStore::new(Arc::new(FlakyTable {
        inner: inner.clone(),
        fail_on,
    }));
    (flaky, inner)
}

async fn snapshot(table: &MemoryRuleTable) -> Vec<Vec<String>> {
    table.rows().await.iter().map(|r| r.record.trimmed_values()).collect()
}

#[tokio::test]
async fn update_all_rolls_back_earlier_pairs() {
    let (store, table) = seeded(FailOn::SecondUpdate).await;
    let before = snapshot(&table).await;

    let err = store
        .update_all(
            "p",
            &[rule(&["a", "1"]), rule(&["b", "2"])],
            &[rule(&["a", "10"]), rule(&["b", "20"])],
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind().as_str(), "STORAGE");
    assert_eq!(snapshot(&table).await, before);
}

#[tokio::test]
async fn update_filtered_restores_removed_rows() {
    let (store, table) = seeded(FailOn::InsertAll).await;
    let before = snapshot(&table).await;

    let err = store
        .update_filtered("p", &[rule(&["z", "9"])], &RuleFilter::new(0, &["a"]))
        .await
        .unwrap_err();

    assert_eq!(err.kind().as_str(), "STORAGE");
    assert_eq!(snapshot(&table).await, before);
}

#[tokio::test]
async fn remove_all_is_all_or_nothing() {
    let (store, table) = seeded(FailOn::SecondDelete).await;
    let before = snapshot(&table).await;

    let err = store
        .remove_all("p", &[rule(&["a", "1"]), rule(&["b", "2"])])
        .await
        .unwrap_err();

    assert_eq!(err.kind().as_str(), "STORAGE");
    assert_eq!(snapshot(&table).await, before);
}

#[tokio::test]
async fn single_step_failure_propagates_unmodified() {
    let (store, _) = seeded(FailOn::InsertAll).await;
    let err = store.add_all("p", &[rule(&["d", "4"])]).await.unwrap_err();
    let src = std::error::Error::source(&err).map(|s| s.to_string());
    assert_eq!(src.as_deref(), Some("injected failure"));
}
