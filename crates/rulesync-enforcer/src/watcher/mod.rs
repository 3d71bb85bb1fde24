//! Change notification across enforcer instances.
//!
//! A `Watcher` tells every instance (itself included) that stored rules
//! changed so they can reload. `BusWatcher` implements it over any broadcast
//! transport exposed through `BusConnector`/`BusConnection`.

mod bus_watcher;
pub mod local;
pub mod redis;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use rulesync_core::error::Result;

pub use bus_watcher::BusWatcher;
pub use local::LocalBus;
pub use redis::{RedisConnection, RedisConnector};

/// Channel used when none is configured.
pub const DEFAULT_CHANNEL: &str = "/casbin";

/// Fixed payload published by `Watcher::update`.
pub const NOTIFY_PAYLOAD: &str = "casbin rules updated";

/// Invoked from the watcher's listening task; must return quickly.
pub type UpdateCallback = Arc<dyn Fn() + Send + Sync>;

#[async_trait]
pub trait Watcher: Send + Sync {
    /// Replace the callback run on every received notification.
    fn set_update_callback(&self, callback: UpdateCallback);

    /// Publish a notification. Fire-and-forget.
    async fn update(&self) -> Result<()>;

    /// Release both connections. No callback runs after this returns.
    async fn close(&self) -> Result<()>;
}

/// One message received on a subscribed channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    pub channel: String,
    pub payload: Bytes,
}

/// Opens connections to a broadcast transport.
#[async_trait]
pub trait BusConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn BusConnection>>;
}

/// A transport connection. Once `subscribe` succeeds the connection is in
/// subscriber mode and only `next_message`/`close` are valid.
#[async_trait]
pub trait BusConnection: Send {
    async fn publish(&mut self, channel: &str, payload: &[u8]) -> Result<()>;

    async fn subscribe(&mut self, channels: &[String]) -> Result<()>;

    /// Next message on a subscribed channel; `None` once the stream ends.
    async fn next_message(&mut self) -> Result<Option<BusMessage>>;

    async fn close(&mut self) -> Result<()>;
}
