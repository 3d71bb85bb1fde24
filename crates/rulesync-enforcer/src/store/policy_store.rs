//! Rule-level operations over a `RuleTable`.
//!
//! The store owns row lifecycle. Every public operation runs in its own
//! transaction; multi-step operations (batch remove/update, filtered update)
//! share one so a failure part-way leaves storage untouched. Operations that
//! match no rows are silent no-ops.

use std::sync::Arc;

use rulesync_core::error::{Result, RuleSyncError};
use rulesync_core::rule::{RowPredicate, RuleFilter, RuleRecord, StoredRuleRow};

use super::{RuleTable, RuleTxn};

#[derive(Clone)]
pub struct PolicyStore {
    table: Arc<dyn RuleTable>,
}

impl PolicyStore {
    pub fn new(table: Arc<dyn RuleTable>) -> Self {
        Self { table }
    }

    /// Every stored row, ordered by identity (stable within one read).
    pub async fn all_rows(&self) -> Result<Vec<StoredRuleRow>> {
        let mut tx = self.table.begin().await?;
        let rows = tx.select_all().await?;
        tx.commit().await?;
        Ok(rows)
    }

    /// Rows of `ptype` matching `rule` on every supplied position.
    pub async fn find(&self, ptype: &str, rule: &[String]) -> Result<Vec<StoredRuleRow>> {
        let pred = RowPredicate::exact(ptype, rule)?;
        let mut tx = self.table.begin().await?;
        let rows = tx.select(&pred).await?;
        tx.commit().await?;
        Ok(rows)
    }

    /// Insert one row. Duplicates are allowed.
    pub async fn add(&self, ptype: &str, rule: &[String]) -> Result<()> {
        let record = RuleRecord::from_rule(ptype, rule)?;
        let mut tx = self.table.begin().await?;
        let id = tx.insert(record).await?;
        tx.commit().await?;
        tracing::debug!(%ptype, id, "rule row inserted");
        Ok(())
    }

    /// One bulk insert for the whole batch.
    pub async fn add_all(&self, ptype: &str, rules: &[Vec<String>]) -> Result<()> {
        let records = encode_all(ptype, rules)?;
        let mut tx = self.table.begin().await?;
        tx.insert_all(records).await?;
        tx.commit().await?;
        tracing::debug!(%ptype, rows = rules.len(), "rule rows bulk inserted");
        Ok(())
    }

    /// Delete every row equal to `rule` on the supplied positions.
    pub async fn remove(&self, ptype: &str, rule: &[String]) -> Result<u64> {
        let mut tx = self.table.begin().await?;
        let n = remove_exact(tx.as_mut(), ptype, rule).await?;
        tx.commit().await?;
        Ok(n)
    }

    /// `remove` for each rule, in one transaction.
    pub async fn remove_all(&self, ptype: &str, rules: &[Vec<String>]) -> Result<u64> {
        let mut tx = self.table.begin().await?;
        let mut n = 0;
        for rule in rules {
            n += remove_exact(tx.as_mut(), ptype, rule).await?;
        }
        tx.commit().await?;
        Ok(n)
    }

    /// Delete every row matching `filter`; returns the removed value tuples
    /// with trailing empty positions trimmed.
    pub async fn remove_filtered(&self, ptype: &str, filter: &RuleFilter) -> Result<Vec<Vec<String>>> {
        let mut tx = self.table.begin().await?;
        let removed = remove_matching(tx.as_mut(), ptype, filter).await?;
        tx.commit().await?;
        Ok(removed)
    }

    /// Overwrite the positions present in `new` on the first row matching
    /// `old`. Returns false when no row matched.
    pub async fn update(&self, ptype: &str, old: &[String], new: &[String]) -> Result<bool> {
        let mut tx = self.table.begin().await?;
        let hit = update_one(tx.as_mut(), ptype, old, new).await?;
        tx.commit().await?;
        Ok(hit)
    }

    /// Pairwise `update` of `old[i]` to `new[i]`, all or nothing.
    pub async fn update_all(&self, ptype: &str, old: &[Vec<String>], new: &[Vec<String>]) -> Result<usize> {
        if old.len() != new.len() {
            return Err(RuleSyncError::BadRequest(format!(
                "{} old rules paired with {} new rules",
                old.len(),
                new.len()
            )));
        }
        let mut tx = self.table.begin().await?;
        let mut hits = 0;
        for (o, n) in old.iter().zip(new) {
            if update_one(tx.as_mut(), ptype, o, n).await? {
                hits += 1;
            }
        }
        tx.commit().await?;
        Ok(hits)
    }

    /// Replace every row matching `filter` with `new`, in one transaction.
    /// Returns the pre-image of the removed rows.
    pub async fn update_filtered(
        &self,
        ptype: &str,
        new: &[Vec<String>],
        filter: &RuleFilter,
    ) -> Result<Vec<Vec<String>>> {
        let records = encode_all(ptype, new)?;
        let mut tx = self.table.begin().await?;
        let old = remove_matching(tx.as_mut(), ptype, filter).await?;
        tx.insert_all(records).await?;
        tx.commit().await?;
        tracing::debug!(%ptype, removed = old.len(), inserted = new.len(), "filtered update applied");
        Ok(old)
    }
}

fn encode_all(ptype: &str, rules: &[Vec<String>]) -> Result<Vec<RuleRecord>> {
    rules.iter().map(|r| RuleRecord::from_rule(ptype, r)).collect()
}

async fn remove_exact(tx: &mut dyn RuleTxn, ptype: &str, rule: &[String]) -> Result<u64> {
    let pred = RowPredicate::exact(ptype, rule)?;
    let ids: Vec<_> = tx.select(&pred).await?.iter().map(|r| r.id).collect();
    let n = tx.delete(&ids).await?;
    tracing::debug!(%ptype, rows = n, "rule rows removed");
    Ok(n)
}

async fn remove_matching(tx: &mut dyn RuleTxn, ptype: &str, filter: &RuleFilter) -> Result<Vec<Vec<String>>> {
    let pred = filter.to_predicate(ptype);
    let rows = tx.select(&pred).await?;
    let ids: Vec<_> = rows.iter().map(|r| r.id).collect();
    let n = tx.delete(&ids).await?;
    tracing::debug!(%ptype, field_index = filter.field_index, rows = n, "filtered rule rows removed");
    Ok(rows.iter().map(|r| r.record.trimmed_values()).collect())
}

async fn update_one(tx: &mut dyn RuleTxn, ptype: &str, old: &[String], new: &[String]) -> Result<bool> {
    let pred = RowPredicate::exact(ptype, old)?;
    // Validates width before touching storage.
    RuleRecord::from_rule(ptype, new)?;
    let values: Vec<(usize, String)> = new.iter().cloned().enumerate().collect();
    let hit = tx.update_first(&pred, &values).await?;
    if !hit {
        tracing::debug!(%ptype, "update matched no rule row");
    }
    Ok(hit)
}
