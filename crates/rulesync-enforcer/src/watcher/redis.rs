//! Redis pub/sub transport (RESP2 over TCP).
//!
//! Each `connect` opens its own TCP connection, authenticates when a password
//! is configured and selects the database when it is not 0. A subscribed
//! connection only reads pushes; publishing needs a second connection.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use rulesync_core::error::{Result, RuleSyncError};
use rulesync_core::protocol::resp::{decode_frame, encode_command, Frame, Push};

use super::{BusConnection, BusConnector, BusMessage};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct RedisConnector {
    host: String,
    port: u16,
    password: Option<String>,
    database: u32,
    connect_timeout: Duration,
}

impl RedisConnector {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            password: None,
            database: 0,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Empty passwords are treated as "no AUTH".
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        let password = password.into();
        self.password = (!password.is_empty()).then_some(password);
        self
    }

    pub fn with_database(mut self, database: u32) -> Self {
        self.database = database;
        self
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[async_trait]
impl BusConnector for RedisConnector {
    async fn connect(&self) -> Result<Box<dyn BusConnection>> {
        let addr = self.address();
        let stream = timeout(self.connect_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| RuleSyncError::Transport(format!("connect to {addr} timed out")))?
            .map_err(|e| RuleSyncError::Transport(format!("connect to {addr} failed: {e}")))?;
        stream.set_nodelay(true)?;

        let mut conn = RedisConnection::new(stream);
        conn.handshake(self.password.as_deref(), self.database).await?;
        tracing::debug!(%addr, db = self.database, "redis connection ready");
        Ok(Box::new(conn))
    }
}

/// One RESP2 connection over any byte stream.
pub struct RedisConnection<S> {
    stream: S,
    buf: BytesMut,
    subscribed: bool,
    closed: bool,
    pending: VecDeque<BusMessage>,
}

impl<S> RedisConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            buf: BytesMut::with_capacity(4096),
            subscribed: false,
            closed: false,
            pending: VecDeque::new(),
        }
    }

    /// `AUTH` and `SELECT` as configured.
    pub async fn handshake(&mut self, password: Option<&str>, database: u32) -> Result<()> {
        if let Some(pw) = password {
            self.expect_ok(&[b"AUTH".as_slice(), pw.as_bytes()]).await?;
        }
        if database != 0 {
            let db = database.to_string();
            self.expect_ok(&[b"SELECT".as_slice(), db.as_bytes()]).await?;
        }
        Ok(())
    }

    async fn write_command(&mut self, args: &[&[u8]]) -> Result<()> {
        if self.closed {
            return Err(RuleSyncError::Closed);
        }
        let mut out = BytesMut::new();
        encode_command(args, &mut out);
        self.stream.write_all(&out).await?;
        self.stream.flush().await?;
        Ok(())
    }

    async fn read_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            if let Some(frame) = decode_frame(&mut self.buf)? {
                return Ok(Some(frame));
            }
            if self.stream.read_buf(&mut self.buf).await? == 0 {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                return Err(RuleSyncError::Transport("connection closed mid-frame".into()));
            }
        }
    }

    async fn command(&mut self, args: &[&[u8]]) -> Result<Frame> {
        self.write_command(args).await?;
        match self.read_frame().await? {
            Some(Frame::Error(e)) => Err(RuleSyncError::Transport(format!("server error: {e}"))),
            Some(frame) => Ok(frame),
            None => Err(RuleSyncError::Transport("connection closed by server".into())),
        }
    }

    async fn expect_ok(&mut self, args: &[&[u8]]) -> Result<()> {
        match self.command(args).await? {
            Frame::Simple(s) if s == "OK" => Ok(()),
            other => Err(RuleSyncError::Transport(format!("unexpected reply: {other:?}"))),
        }
    }
}

#[async_trait]
impl<S> BusConnection for RedisConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn publish(&mut self, channel: &str, payload: &[u8]) -> Result<()> {
        if self.subscribed {
            return Err(RuleSyncError::BadRequest("publish on a subscribed connection".into()));
        }
        match self.command(&[b"PUBLISH".as_slice(), channel.as_bytes(), payload]).await? {
            Frame::Integer(receivers) => {
                tracing::trace!(%channel, receivers, "redis publish");
                Ok(())
            }
            other => Err(RuleSyncError::Transport(format!("unexpected PUBLISH reply: {other:?}"))),
        }
    }

    async fn subscribe(&mut self, channels: &[String]) -> Result<()> {
        let mut args: Vec<&[u8]> = Vec::with_capacity(channels.len() + 1);
        args.push(b"SUBSCRIBE");
        args.extend(channels.iter().map(|c| c.as_bytes()));
        self.write_command(&args).await?;
        self.subscribed = true;

        let mut acked = 0;
        while acked < channels.len() {
            let frame = self
                .read_frame()
                .await?
                .ok_or_else(|| RuleSyncError::Transport("connection closed during SUBSCRIBE".into()))?;
            if let Frame::Error(e) = &frame {
                return Err(RuleSyncError::Transport(format!("SUBSCRIBE refused: {e}")));
            }
            match Push::classify(&frame) {
                Push::Subscribed { channel, count } => {
                    tracing::debug!(%channel, count, "redis channel subscribed");
                    acked += 1;
                }
                Push::Message { channel, payload } => self.pending.push_back(BusMessage { channel, payload }),
                Push::Other => {}
            }
        }
        Ok(())
    }

    async fn next_message(&mut self) -> Result<Option<BusMessage>> {
        if !self.subscribed {
            return Err(RuleSyncError::BadRequest("connection is not subscribed".into()));
        }
        if let Some(m) = self.pending.pop_front() {
            return Ok(Some(m));
        }
        loop {
            let Some(frame) = self.read_frame().await? else { return Ok(None); };
            if let Push::Message { channel, payload } = Push::classify(&frame) {
                return Ok(Some(BusMessage { channel, payload }));
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        // The peer may already be gone.
        let _ = self.stream.shutdown().await;
        Ok(())
    }
}
