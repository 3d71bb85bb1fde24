//! Wire protocols.
//!
//! The broadcast transport speaks RESP2 (the Redis serialization protocol).
//! The decoder is incremental and panic-free: partial input yields `Ok(None)`
//! and malformed input is reported as `RuleSyncError::Transport`.

pub mod resp;
