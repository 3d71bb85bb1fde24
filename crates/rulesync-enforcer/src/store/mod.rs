//! Rule storage.
//!
//! `RuleTable` is the relational-table collaborator: every access happens in
//! a `RuleTxn`, and dropping a transaction without `commit` rolls it back.
//! `PolicyStore` builds the rule-level operations on top of it.

pub mod memory;
pub mod policy_store;
pub mod sqlite;

use async_trait::async_trait;

use rulesync_core::error::Result;
use rulesync_core::rule::{RowId, RowPredicate, RuleRecord, StoredRuleRow};

pub use memory::MemoryRuleTable;
pub use policy_store::PolicyStore;
pub use sqlite::SqliteRuleTable;

/// Default table name for stored rules.
pub const DEFAULT_TABLE: &str = "casbin_rule";

/// Table of `ptype, v0..v5` rows keyed by an identity column.
#[async_trait]
pub trait RuleTable: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn RuleTxn>>;
}

/// One transaction scope on a `RuleTable`.
#[async_trait]
pub trait RuleTxn: Send {
    async fn insert(&mut self, record: RuleRecord) -> Result<RowId>;

    /// Bulk insert. An empty batch is a no-op.
    async fn insert_all(&mut self, records: Vec<RuleRecord>) -> Result<()>;

    /// Matching rows ordered by identity.
    async fn select(&mut self, pred: &RowPredicate) -> Result<Vec<StoredRuleRow>>;

    /// Every row ordered by identity.
    async fn select_all(&mut self) -> Result<Vec<StoredRuleRow>>;

    /// Delete by identity; returns how many rows went away.
    async fn delete(&mut self, ids: &[RowId]) -> Result<u64>;

    /// Match-and-set in one statement: overwrite `values` positions on the
    /// lowest-identity row matching `pred`. Returns false when nothing matched.
    async fn update_first(&mut self, pred: &RowPredicate, values: &[(usize, String)]) -> Result<bool>;

    async fn commit(&mut self) -> Result<()>;
}
