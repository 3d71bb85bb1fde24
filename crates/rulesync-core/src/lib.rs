//! rulesync core: runtime-free rule primitives, error types, and wire codecs.
//!
//! This crate defines the row codec that maps policy rules onto a fixed-width
//! table, the filter predicates used by filtered remove/update, the in-memory
//! policy model the engine reads from, and the RESP2 codec used by the
//! broadcast transport. It carries no runtime or database dependencies so the
//! same semantics back every storage and transport implementation.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here.
//! All fallible paths surface as `RuleSyncError`/`Result`.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod model;
pub mod protocol;
pub mod rule;

/// Shared result type.
pub use error::{ErrorKind, Result, RuleSyncError};
pub use model::PolicyModel;
pub use rule::{RowId, RowPredicate, RuleFilter, RuleRecord, StoredRuleRow, MAX_FIELDS};
