//! RESP2 frame codec (panic-free).
//!
//! Parsing rules:
//! - Never index raw buffers; slice through `get()` and check lengths.
//! - Incomplete input leaves the buffer untouched and returns `Ok(None)`.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Result, RuleSyncError};

/// Largest bulk string accepted (server-side limit of Redis).
pub const MAX_BULK_LEN: usize = 512 * 1024 * 1024;

/// Deepest array nesting accepted.
const MAX_DEPTH: usize = 8;

/// One decoded RESP2 value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Simple(String),
    Error(String),
    Integer(i64),
    /// `None` is the null bulk string (`$-1`).
    Bulk(Option<Bytes>),
    /// `None` is the null array (`*-1`).
    Array(Option<Vec<Frame>>),
}

impl Frame {
    /// Payload of a simple or bulk string.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Frame::Simple(s) => Some(s.as_bytes()),
            Frame::Bulk(Some(b)) => Some(b),
            _ => None,
        }
    }

    fn as_text(&self) -> Option<String> {
        self.as_bytes()
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }
}

/// Server push seen on a subscribed connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Push {
    /// `["message", channel, payload]`
    Message { channel: String, payload: Bytes },
    /// `["subscribe", channel, count]`
    Subscribed { channel: String, count: i64 },
    /// Anything else (pong, unsubscribe, ...).
    Other,
}

impl Push {
    pub fn classify(frame: &Frame) -> Push {
        let Frame::Array(Some(items)) = frame else { return Push::Other; };
        let kind = items.first().and_then(Frame::as_text);
        match (kind.as_deref(), items.get(1), items.get(2)) {
            (Some("message"), Some(ch), Some(Frame::Bulk(Some(payload)))) => match ch.as_text() {
                Some(channel) => Push::Message { channel, payload: payload.clone() },
                None => Push::Other,
            },
            (Some("subscribe"), Some(ch), Some(Frame::Integer(count))) => match ch.as_text() {
                Some(channel) => Push::Subscribed { channel, count: *count },
                None => Push::Other,
            },
            _ => Push::Other,
        }
    }
}

/// Encode a command as an array of bulk strings.
pub fn encode_command<A: AsRef<[u8]>>(args: &[A], dst: &mut BytesMut) {
    dst.put_u8(b'*');
    dst.put_slice(args.len().to_string().as_bytes());
    dst.put_slice(b"\r\n");
    for arg in args {
        let arg = arg.as_ref();
        dst.put_u8(b'$');
        dst.put_slice(arg.len().to_string().as_bytes());
        dst.put_slice(b"\r\n");
        dst.put_slice(arg);
        dst.put_slice(b"\r\n");
    }
}

/// Decode one frame from the front of `buf`, consuming it on success.
pub fn decode_frame(buf: &mut BytesMut) -> Result<Option<Frame>> {
    match parse(buf.chunk(), 0)? {
        Some((frame, used)) => {
            buf.advance(used);
            Ok(Some(frame))
        }
        None => Ok(None),
    }
}

fn protocol_err(msg: impl Into<String>) -> RuleSyncError {
    RuleSyncError::Transport(format!("resp: {}", msg.into()))
}

/// Returns the frame and the number of bytes it spans.
fn parse(src: &[u8], depth: usize) -> Result<Option<(Frame, usize)>> {
    if depth > MAX_DEPTH {
        return Err(protocol_err("array nesting too deep"));
    }
    let Some(&tag) = src.first() else { return Ok(None); };
    let Some(cr) = find_crlf(src) else { return Ok(None); };
    let line = src.get(1..cr).unwrap_or_default();
    let mut used = cr + 2;

    let frame = match tag {
        b'+' => Frame::Simple(utf8(line)?),
        b'-' => Frame::Error(utf8(line)?),
        b':' => Frame::Integer(integer(line)?),
        b'$' => {
            let len = integer(line)?;
            if len < 0 {
                Frame::Bulk(None)
            } else {
                let len = usize::try_from(len).map_err(|_| protocol_err("bulk length"))?;
                if len > MAX_BULK_LEN {
                    return Err(protocol_err(format!("bulk length {len} over limit")));
                }
                let Some(body) = src.get(used..used + len) else { return Ok(None); };
                match src.get(used + len..used + len + 2) {
                    None => return Ok(None),
                    Some(b"\r\n") => {}
                    Some(_) => return Err(protocol_err("bulk string not terminated by CRLF")),
                }
                let body = Bytes::copy_from_slice(body);
                used += len + 2;
                Frame::Bulk(Some(body))
            }
        }
        b'*' => {
            let n = integer(line)?;
            if n < 0 {
                Frame::Array(None)
            } else {
                let n = usize::try_from(n).map_err(|_| protocol_err("array length"))?;
                let mut items = Vec::with_capacity(n.min(64));
                for _ in 0..n {
                    let rest = src.get(used..).unwrap_or_default();
                    match parse(rest, depth + 1)? {
                        Some((item, item_len)) => {
                            items.push(item);
                            used += item_len;
                        }
                        None => return Ok(None),
                    }
                }
                Frame::Array(Some(items))
            }
        }
        other => return Err(protocol_err(format!("unknown type byte 0x{other:02x}"))),
    };
    Ok(Some((frame, used)))
}

/// Index of the first `\r` that is followed by `\n`.
fn find_crlf(src: &[u8]) -> Option<usize> {
    src.windows(2).position(|w| w == b"\r\n")
}

fn utf8(line: &[u8]) -> Result<String> {
    std::str::from_utf8(line)
        .map(str::to_owned)
        .map_err(|e| protocol_err(format!("invalid utf8: {e}")))
}

fn integer(line: &[u8]) -> Result<i64> {
    utf8(line)?
        .parse()
        .map_err(|_| protocol_err("invalid integer"))
}
