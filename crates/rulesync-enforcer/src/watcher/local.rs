//! In-process broadcast transport.
//!
//! Every connection made from the same `LocalBus` sees every publish, which
//! lets several enforcers in one process share notifications.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::broadcast::{self, error::RecvError};

use rulesync_core::error::{Result, RuleSyncError};

use super::{BusConnection, BusConnector, BusMessage};

const DEFAULT_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct LocalBus {
    tx: broadcast::Sender<BusMessage>,
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl LocalBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }
}

#[async_trait]
impl BusConnector for LocalBus {
    async fn connect(&self) -> Result<Box<dyn BusConnection>> {
        Ok(Box::new(LocalConnection {
            tx: self.tx.clone(),
            rx: None,
            channels: Vec::new(),
            closed: false,
        }))
    }
}

struct LocalConnection {
    tx: broadcast::Sender<BusMessage>,
    rx: Option<broadcast::Receiver<BusMessage>>,
    channels: Vec<String>,
    closed: bool,
}

#[async_trait]
impl BusConnection for LocalConnection {
    async fn publish(&mut self, channel: &str, payload: &[u8]) -> Result<()> {
        if self.closed {
            return Err(RuleSyncError::Closed);
        }
        if self.rx.is_some() {
            return Err(RuleSyncError::BadRequest("publish on a subscribed connection".into()));
        }
        // No subscribers is not an error.
        let receivers = self
            .tx
            .send(BusMessage {
                channel: channel.to_owned(),
                payload: Bytes::copy_from_slice(payload),
            })
            .unwrap_or(0);
        tracing::trace!(%channel, receivers, "local bus publish");
        Ok(())
    }

    async fn subscribe(&mut self, channels: &[String]) -> Result<()> {
        if self.closed {
            return Err(RuleSyncError::Closed);
        }
        self.channels.extend(channels.iter().cloned());
        if self.rx.is_none() {
            self.rx = Some(self.tx.subscribe());
        }
        Ok(())
    }

    async fn next_message(&mut self) -> Result<Option<BusMessage>> {
        let rx = self
            .rx
            .as_mut()
            .ok_or_else(|| RuleSyncError::BadRequest("connection is not subscribed".into()))?;
        loop {
            match rx.recv().await {
                Ok(m) if self.channels.contains(&m.channel) => return Ok(Some(m)),
                Ok(_) => continue,
                // Newer messages are still queued, so the subscriber still hears about the change.
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "local bus subscriber lagged");
                    continue;
                }
                Err(RecvError::Closed) => return Ok(None),
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        self.rx = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_only_sees_its_channels() {
        let bus = LocalBus::default();
        let mut sub = bus.connect().await.unwrap();
        sub.subscribe(&["/a".to_string()]).await.unwrap();
        let mut publisher = bus.connect().await.unwrap();
        publisher.publish("/b", b"ignored").await.unwrap();
        publisher.publish("/a", b"hello").await.unwrap();
        let m = sub.next_message().await.unwrap().unwrap();
        assert_eq!(m.channel, "/a");
        assert_eq!(&m.payload[..], b"hello");
    }

    #[tokio::test]
    async fn subscribed_connection_cannot_publish() {
        let bus = LocalBus::default();
        let mut conn = bus.connect().await.unwrap();
        conn.subscribe(&["/a".to_string()]).await.unwrap();
        let err = conn.publish("/a", b"x").await.unwrap_err();
        assert_eq!(err.kind().as_str(), "BAD_REQUEST");
    }
}
