//! Rule row codec and filter predicates.
//!
//! A policy rule is an ordered tuple of up to [`MAX_FIELDS`] strings tagged
//! with a `ptype`. Storage keeps it as a fixed-width row (`ptype, v0..v5`)
//! where positions beyond the rule's length stay unset.

mod filter;
mod record;

pub use filter::{RowPredicate, RuleFilter};
pub use record::{RowId, RuleRecord, StoredRuleRow, MAX_FIELDS};

/// Column name for a value position (`v0`..`v5`).
pub fn column_name(pos: usize) -> &'static str {
    match pos {
        0 => "v0",
        1 => "v1",
        2 => "v2",
        3 => "v3",
        4 => "v4",
        _ => "v5",
    }
}
