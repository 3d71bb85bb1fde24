//! In-process rule table.
//!
//! A transaction holds the table lock for its whole lifetime and works on a
//! copy; `commit` publishes the copy. Concurrent transactions therefore run
//! one after another, and an uncommitted transaction leaves no trace.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use rulesync_core::error::{Result, RuleSyncError};
use rulesync_core::rule::{RowId, RowPredicate, RuleRecord, StoredRuleRow};

use super::{RuleTable, RuleTxn};

#[derive(Debug, Clone, Default)]
struct TableState {
    rows: Vec<StoredRuleRow>,
    last_id: RowId,
}

impl TableState {
    fn push(&mut self, record: RuleRecord) -> RowId {
        self.last_id += 1;
        self.rows.push(StoredRuleRow { id: self.last_id, record });
        self.last_id
    }
}

/// Shared in-memory table. Clones share the same rows.
#[derive(Clone, Default)]
pub struct MemoryRuleTable {
    state: Arc<Mutex<TableState>>,
}

impl MemoryRuleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed rows, ordered by identity.
    pub async fn rows(&self) -> Vec<StoredRuleRow> {
        self.state.lock().await.rows.clone()
    }
}

#[async_trait]
impl RuleTable for MemoryRuleTable {
    async fn begin(&self) -> Result<Box<dyn RuleTxn>> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let work = guard.clone();
        Ok(Box::new(MemoryTxn {
            guard: Some(guard),
            work,
        }))
    }
}

struct MemoryTxn {
    guard: Option<OwnedMutexGuard<TableState>>,
    work: TableState,
}

impl MemoryTxn {
    fn live(&mut self) -> Result<&mut TableState> {
        if self.guard.is_none() {
            return Err(RuleSyncError::Internal("transaction already committed".into()));
        }
        Ok(&mut self.work)
    }
}

#[async_trait]
impl RuleTxn for MemoryTxn {
    async fn insert(&mut self, record: RuleRecord) -> Result<RowId> {
        Ok(self.live()?.push(record))
    }

    async fn insert_all(&mut self, records: Vec<RuleRecord>) -> Result<()> {
        let state = self.live()?;
        for r in records {
            state.push(r);
        }
        Ok(())
    }

    async fn select(&mut self, pred: &RowPredicate) -> Result<Vec<StoredRuleRow>> {
        Ok(self
            .live()?
            .rows
            .iter()
            .filter(|r| pred.matches(&r.record))
            .cloned()
            .collect())
    }

    async fn select_all(&mut self) -> Result<Vec<StoredRuleRow>> {
        Ok(self.live()?.rows.clone())
    }

    async fn delete(&mut self, ids: &[RowId]) -> Result<u64> {
        let state = self.live()?;
        let before = state.rows.len();
        state.rows.retain(|r| !ids.contains(&r.id));
        Ok((before - state.rows.len()) as u64)
    }

    async fn update_first(&mut self, pred: &RowPredicate, values: &[(usize, String)]) -> Result<bool> {
        let state = self.live()?;
        let Some(row) = state.rows.iter_mut().find(|r| pred.matches(&r.record)) else {
            return Ok(false);
        };
        for (pos, v) in values {
            if let Some(slot) = row.record.values.get_mut(*pos) {
                *slot = Some(v.clone());
            }
        }
        Ok(true)
    }

    async fn commit(&mut self) -> Result<()> {
        let mut guard = self
            .guard
            .take()
            .ok_or_else(|| RuleSyncError::Internal("transaction already committed".into()))?;
        *guard = std::mem::take(&mut self.work);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(rule: &[&str]) -> RuleRecord {
        RuleRecord::from_rule("p", rule).unwrap()
    }

    #[tokio::test]
    async fn uncommitted_work_is_discarded() {
        let table = MemoryRuleTable::new();
        {
            let mut tx = table.begin().await.unwrap();
            tx.insert(rec(&["alice"])).await.unwrap();
        }
        assert!(table.rows().await.is_empty());
    }

    #[tokio::test]
    async fn ids_are_monotonic_across_deletes() {
        let table = MemoryRuleTable::new();
        let mut tx = table.begin().await.unwrap();
        let a = tx.insert(rec(&["a"])).await.unwrap();
        tx.delete(&[a]).await.unwrap();
        let b = tx.insert(rec(&["b"])).await.unwrap();
        tx.commit().await.unwrap();
        assert!(b > a);
        assert_eq!(table.rows().await.len(), 1);
    }

    #[tokio::test]
    async fn commit_twice_is_an_error() {
        let table = MemoryRuleTable::new();
        let mut tx = table.begin().await.unwrap();
        tx.commit().await.unwrap();
        assert!(tx.commit().await.is_err());
    }
}
