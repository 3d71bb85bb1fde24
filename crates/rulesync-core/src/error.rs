//! Shared error type across rulesync crates.

use thiserror::Error;

/// Boxed driver error kept as the `source()` of storage failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Stable error categories (used in logs and assertions).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing profile, bad adapter selection, invalid config file.
    Config,
    /// Config schema version not understood.
    UnsupportedVersion,
    /// Caller supplied an unusable rule or argument.
    BadRequest,
    /// Storage collaborator failed.
    Storage,
    /// Broadcast transport failed.
    Transport,
    /// Watcher already closed.
    Closed,
    /// Internal invariant violated.
    Internal,
}

impl ErrorKind {
    /// String representation used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Config => "CONFIG",
            ErrorKind::UnsupportedVersion => "UNSUPPORTED_VERSION",
            ErrorKind::BadRequest => "BAD_REQUEST",
            ErrorKind::Storage => "STORAGE",
            ErrorKind::Transport => "TRANSPORT",
            ErrorKind::Closed => "CLOSED",
            ErrorKind::Internal => "INTERNAL",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, RuleSyncError>;

/// Unified error type used by core and enforcer.
#[derive(Debug, Error)]
pub enum RuleSyncError {
    #[error("config: {0}")]
    Config(String),
    #[error("unsupported config version")]
    UnsupportedVersion,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("storage: {0}")]
    Storage(#[source] BoxError),
    #[error("transport: {0}")]
    Transport(String),
    #[error("watcher closed")]
    Closed,
    #[error("internal: {0}")]
    Internal(String),
}

impl RuleSyncError {
    /// Wrap a storage driver error without translating it.
    pub fn storage<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        RuleSyncError::Storage(Box::new(err))
    }

    /// Map to a stable category.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RuleSyncError::Config(_) => ErrorKind::Config,
            RuleSyncError::UnsupportedVersion => ErrorKind::UnsupportedVersion,
            RuleSyncError::BadRequest(_) => ErrorKind::BadRequest,
            RuleSyncError::Storage(_) => ErrorKind::Storage,
            RuleSyncError::Transport(_) => ErrorKind::Transport,
            RuleSyncError::Closed => ErrorKind::Closed,
            RuleSyncError::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl From<std::io::Error> for RuleSyncError {
    fn from(e: std::io::Error) -> Self {
        RuleSyncError::Transport(format!("io: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_error_keeps_driver_source() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "row gone");
        let err = RuleSyncError::storage(io);
        assert_eq!(err.kind(), ErrorKind::Storage);
        let src = std::error::Error::source(&err).map(|s| s.to_string());
        assert_eq!(src.as_deref(), Some("row gone"));
    }
}
