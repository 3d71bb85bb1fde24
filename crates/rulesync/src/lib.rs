//! Top-level facade crate for rulesync.
//!
//! Re-exports the core types and the enforcer runtime so users can depend on a single crate.

pub mod core {
    pub use rulesync_core::*;
}

pub mod enforcer {
    pub use rulesync_enforcer::*;
}
