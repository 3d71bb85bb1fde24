//! rulesync enforcer runtime.
//!
//! Wires the rule-table storage, the engine-facing adapter, the change
//! watcher, and the config-driven registry into an `Enforcer` context object.
//! Consumed by the binary (`main.rs`) and by integration tests.

pub mod adapter;
pub mod config;
pub mod enforcer;
pub mod registry;
pub mod store;
pub mod watcher;

pub use enforcer::Enforcer;
pub use registry::AdapterRegistry;
