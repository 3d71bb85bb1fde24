//! SQLite-backed rule table (sqlx).
//!
//! Columns: `id INTEGER PRIMARY KEY AUTOINCREMENT, ptype TEXT NOT NULL,
//! v0..v5 TEXT NULL`. Unset positions are stored as NULL.

use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite, Transaction};

use rulesync_core::error::{Result, RuleSyncError};
use rulesync_core::rule::{column_name, RowId, RowPredicate, RuleRecord, StoredRuleRow, MAX_FIELDS};

use super::{RuleTable, RuleTxn};

/// Rows per bulk INSERT statement (7 binds each).
const INSERT_CHUNK: usize = 500;

const COLUMNS: &str = "ptype, v0, v1, v2, v3, v4, v5";

#[derive(Clone)]
pub struct SqliteRuleTable {
    pool: SqlitePool,
    table: String,
}

impl SqliteRuleTable {
    pub fn new(pool: SqlitePool, table: &str) -> Result<Self> {
        if table.is_empty() || !table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(RuleSyncError::Config(format!("invalid table name: {table:?}")));
        }
        Ok(Self {
            pool,
            table: table.to_owned(),
        })
    }

    /// Open a pool for `dsn` (e.g. `sqlite://rules.db`, `sqlite::memory:`).
    /// In-memory databases get a single pinned connection so every
    /// transaction sees the same data.
    pub async fn connect(dsn: &str, table: &str) -> Result<Self> {
        let opts = SqliteConnectOptions::from_str(dsn)
            .map_err(RuleSyncError::storage)?
            .create_if_missing(true);
        let in_memory = dsn.contains(":memory:") || dsn.contains("mode=memory");
        let pool_opts = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };
        let pool = pool_opts
            .connect_with(opts)
            .await
            .map_err(RuleSyncError::storage)?;
        tracing::debug!(%dsn, %table, "sqlite rule table connected");
        Self::new(pool, table)
    }

    /// Create the rule table when absent. Existing tables are left as they are.
    pub async fn create_table_if_missing(&self) -> Result<()> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ptype TEXT NOT NULL,
                v0 TEXT NULL, v1 TEXT NULL, v2 TEXT NULL,
                v3 TEXT NULL, v4 TEXT NULL, v5 TEXT NULL
            )",
            self.table
        );
        sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .map_err(RuleSyncError::storage)?;
        Ok(())
    }
}

#[async_trait]
impl RuleTable for SqliteRuleTable {
    async fn begin(&self) -> Result<Box<dyn RuleTxn>> {
        let tx = self.pool.begin().await.map_err(RuleSyncError::storage)?;
        Ok(Box::new(SqliteTxn {
            tx: Some(tx),
            table: self.table.clone(),
        }))
    }
}

struct SqliteTxn {
    tx: Option<Transaction<'static, Sqlite>>,
    table: String,
}

impl SqliteTxn {
    fn conn(&mut self) -> Result<&mut SqliteConnection> {
        self.tx
            .as_deref_mut()
            .ok_or_else(|| RuleSyncError::Internal("transaction already committed".into()))
    }
}

/// Append `ptype = ? AND vN = ? ...` for `pred`.
fn push_predicate(qb: &mut QueryBuilder<'_, Sqlite>, pred: &RowPredicate) -> Result<()> {
    qb.push("ptype = ");
    qb.push_bind(pred.ptype.clone());
    for (pos, want) in &pred.constraints {
        if *pos >= MAX_FIELDS {
            return Err(RuleSyncError::BadRequest(format!("no column for position {pos}")));
        }
        qb.push(format!(" AND {} = ", column_name(*pos)));
        qb.push_bind(want.clone());
    }
    Ok(())
}

fn row_to_stored(row: &SqliteRow) -> Result<StoredRuleRow> {
    let mut values: [Option<String>; MAX_FIELDS] = Default::default();
    for (pos, slot) in values.iter_mut().enumerate() {
        *slot = row
            .try_get(column_name(pos))
            .map_err(RuleSyncError::storage)?;
    }
    Ok(StoredRuleRow {
        id: row.try_get("id").map_err(RuleSyncError::storage)?,
        record: RuleRecord {
            ptype: row.try_get("ptype").map_err(RuleSyncError::storage)?,
            values,
        },
    })
}

#[async_trait]
impl RuleTxn for SqliteTxn {
    async fn insert(&mut self, record: RuleRecord) -> Result<RowId> {
        let sql = format!(
            "INSERT INTO {} ({COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?)",
            self.table
        );
        let mut q = sqlx::query(&sql).bind(record.ptype);
        for v in record.values {
            q = q.bind(v);
        }
        let conn = self.conn()?;
        let res = q.execute(&mut *conn).await.map_err(RuleSyncError::storage)?;
        Ok(res.last_insert_rowid())
    }

    async fn insert_all(&mut self, records: Vec<RuleRecord>) -> Result<()> {
        let table = self.table.clone();
        let conn = self.conn()?;
        for chunk in records.chunks(INSERT_CHUNK) {
            let mut qb: QueryBuilder<'_, Sqlite> =
                QueryBuilder::new(format!("INSERT INTO {table} ({COLUMNS}) "));
            qb.push_values(chunk, |mut b, r| {
                b.push_bind(r.ptype.clone());
                for v in &r.values {
                    b.push_bind(v.clone());
                }
            });
            qb.build()
                .execute(&mut *conn)
                .await
                .map_err(RuleSyncError::storage)?;
        }
        Ok(())
    }

    async fn select(&mut self, pred: &RowPredicate) -> Result<Vec<StoredRuleRow>> {
        let mut qb: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new(format!("SELECT id, {COLUMNS} FROM {} WHERE ", self.table));
        push_predicate(&mut qb, pred)?;
        qb.push(" ORDER BY id");
        let conn = self.conn()?;
        let rows = qb
            .build()
            .fetch_all(&mut *conn)
            .await
            .map_err(RuleSyncError::storage)?;
        rows.iter().map(row_to_stored).collect()
    }

    async fn select_all(&mut self) -> Result<Vec<StoredRuleRow>> {
        let sql = format!("SELECT id, {COLUMNS} FROM {} ORDER BY id", self.table);
        let conn = self.conn()?;
        let rows = sqlx::query(&sql)
            .fetch_all(&mut *conn)
            .await
            .map_err(RuleSyncError::storage)?;
        rows.iter().map(row_to_stored).collect()
    }

    async fn delete(&mut self, ids: &[RowId]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut qb: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new(format!("DELETE FROM {} WHERE id IN (", self.table));
        let mut sep = qb.separated(", ");
        for id in ids {
            sep.push_bind(*id);
        }
        sep.push_unseparated(")");
        let conn = self.conn()?;
        let res = qb
            .build()
            .execute(&mut *conn)
            .await
            .map_err(RuleSyncError::storage)?;
        Ok(res.rows_affected())
    }

    async fn update_first(&mut self, pred: &RowPredicate, values: &[(usize, String)]) -> Result<bool> {
        let table = self.table.clone();
        let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new(format!("UPDATE {table} SET "));
        if values.is_empty() {
            // Nothing to write; still report whether a row matched.
            qb.push("ptype = ptype");
        } else {
            let mut sets = qb.separated(", ");
            for (pos, v) in values {
                if *pos >= MAX_FIELDS {
                    return Err(RuleSyncError::BadRequest(format!("no column for position {pos}")));
                }
                sets.push(format!("{} = ", column_name(*pos)));
                sets.push_bind_unseparated(v.clone());
            }
        }
        qb.push(format!(" WHERE id = (SELECT id FROM {table} WHERE "));
        push_predicate(&mut qb, pred)?;
        qb.push(" ORDER BY id LIMIT 1)");
        let conn = self.conn()?;
        let res = qb
            .build()
            .execute(&mut *conn)
            .await
            .map_err(RuleSyncError::storage)?;
        Ok(res.rows_affected() > 0)
    }

    async fn commit(&mut self) -> Result<()> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| RuleSyncError::Internal("transaction already committed".into()))?;
        tx.commit().await.map_err(RuleSyncError::storage)
    }
}
