use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use rulesync_core::error::{Result, RuleSyncError};

use super::{BusConnection, BusConnector, UpdateCallback, Watcher, NOTIFY_PAYLOAD};

type CallbackSlot = Arc<RwLock<Option<UpdateCallback>>>;

/// Watcher over a broadcast transport.
///
/// Holds two connections: one for publishing and one parked in subscriber
/// mode, whose listening task runs the registered callback for every message
/// on the channel, including this instance's own notifications.
pub struct BusWatcher {
    channel: String,
    callback: CallbackSlot,
    publisher: Mutex<Option<Box<dyn BusConnection>>>,
    shutdown: watch::Sender<bool>,
    listener: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl BusWatcher {
    /// Open both connections and start listening. Connect/auth failures are
    /// returned here; there is no degraded mode.
    pub async fn connect(connector: &dyn BusConnector, channel: &str) -> Result<Self> {
        if channel.is_empty() {
            return Err(RuleSyncError::Config("watcher channel must not be empty".into()));
        }
        let publisher = connector.connect().await?;
        let mut subscriber = connector.connect().await?;
        subscriber.subscribe(&[channel.to_owned()]).await?;

        let callback: CallbackSlot = Arc::new(RwLock::new(None));
        let (shutdown, shutdown_rx) = watch::channel(false);
        let listener = tokio::spawn(listen(
            subscriber,
            channel.to_owned(),
            Arc::clone(&callback),
            shutdown_rx,
        ));

        tracing::info!(%channel, "watcher subscribed");
        Ok(Self {
            channel: channel.to_owned(),
            callback,
            publisher: Mutex::new(Some(publisher)),
            shutdown,
            listener: Mutex::new(Some(listener)),
            closed: AtomicBool::new(false),
        })
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

async fn listen(
    mut sub: Box<dyn BusConnection>,
    channel: String,
    callback: CallbackSlot,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            biased;
            // Fires on close() and when the watcher is dropped.
            _ = shutdown.changed() => break,
            msg = sub.next_message() => match msg {
                Ok(Some(m)) if m.channel == channel => {
                    tracing::debug!(%channel, bytes = m.payload.len(), "policy change notification");
                    // Clone out so the lock is not held while the callback runs.
                    let cb = match callback.read() {
                        Ok(g) => g.clone(),
                        Err(poisoned) => poisoned.into_inner().clone(),
                    };
                    if let Some(cb) = cb {
                        cb();
                    }
                }
                Ok(Some(m)) => {
                    tracing::warn!(channel = %m.channel, "message on unexpected channel ignored");
                }
                Ok(None) => {
                    tracing::warn!(%channel, "subscription stream ended");
                    break;
                }
                Err(e) => {
                    tracing::warn!(%channel, error = %e, "subscription read failed");
                    break;
                }
            }
        }
    }
    if let Err(e) = sub.close().await {
        tracing::debug!(error = %e, "subscriber close failed");
    }
}

#[async_trait]
impl Watcher for BusWatcher {
    fn set_update_callback(&self, callback: UpdateCallback) {
        match self.callback.write() {
            Ok(mut g) => *g = Some(callback),
            Err(poisoned) => *poisoned.into_inner() = Some(callback),
        }
    }

    async fn update(&self) -> Result<()> {
        let mut guard = self.publisher.lock().await;
        let publisher = guard.as_mut().ok_or(RuleSyncError::Closed)?;
        publisher.publish(&self.channel, NOTIFY_PAYLOAD.as_bytes()).await
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        // The listener may already have exited on its own.
        let _ = self.shutdown.send(true);
        if let Some(handle) = self.listener.lock().await.take() {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "watcher listener task failed");
            }
        }
        let publisher = self.publisher.lock().await.take();
        if let Some(mut p) = publisher {
            p.close().await?;
        }
        tracing::info!(channel = %self.channel, "watcher closed");
        Ok(())
    }
}
