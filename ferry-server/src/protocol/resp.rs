//! RESP encoding and incremental decoding
//!
//! The decoder is synchronous over a byte slice so the same code parses
//! socket buffers and the append-only log file.

use bytes::{Buf, BytesMut};
use std::borrow::Cow;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Largest bulk string accepted (512MB, same ceiling as Redis)
const MAX_BULK_LEN: usize = 512 * 1024 * 1024;

/// Largest multi-bulk element count accepted
const MAX_ARRAY_LEN: usize = 1024 * 1024;

/// Largest inline (telnet) line accepted
const MAX_INLINE_LEN: usize = 64 * 1024;

/// Wire protocol errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("connection closed")]
    ConnectionClosed,

    #[error("connection timed out")]
    Timeout,

    #[error("protocol error: {0}")]
    Invalid(String),

    #[error("IO error: {0}")]
    IOError(#[from] std::io::Error),
}

pub type ProtocolResult<T> = std::result::Result<T, ProtocolError>;

/// A single RESP value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    Simple(String),
    Error(String),
    Integer(i64),
    Bulk(Option<Vec<u8>>),
    Array(Option<Vec<RespValue>>),
}

impl RespValue {
    pub fn ok() -> Self {
        Self::Simple("OK".to_string())
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(message.into())
    }

    pub fn bulk(data: impl Into<Vec<u8>>) -> Self {
        Self::Bulk(Some(data.into()))
    }

    pub fn null() -> Self {
        Self::Bulk(None)
    }

    /// Flat array of bulk strings, used for key/value style replies
    pub fn string_array<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Vec<u8>>,
    {
        Self::Array(Some(items.into_iter().map(Self::bulk).collect()))
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Simple(s) if s == "OK")
    }

    /// Error text without the leading `ERR ` tag
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Error(message) => Some(message.strip_prefix("ERR ").unwrap_or(message)),
            _ => None,
        }
    }

    /// String view of scalar values
    pub fn as_string(&self) -> Option<Cow<'_, str>> {
        match self {
            Self::Simple(s) => Some(Cow::Borrowed(s)),
            Self::Bulk(Some(data)) => Some(String::from_utf8_lossy(data)),
            Self::Integer(n) => Some(Cow::Owned(n.to_string())),
            _ => None,
        }
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        match self {
            Self::Simple(s) => {
                out.push(b'+');
                out.extend_from_slice(s.as_bytes());
                out.extend_from_slice(b"\r\n");
            }
            Self::Error(message) => {
                out.push(b'-');
                out.extend_from_slice(message.as_bytes());
                out.extend_from_slice(b"\r\n");
            }
            Self::Integer(n) => {
                out.extend_from_slice(format!(":{}\r\n", n).as_bytes());
            }
            Self::Bulk(None) => out.extend_from_slice(b"$-1\r\n"),
            Self::Bulk(Some(data)) => {
                out.extend_from_slice(format!("${}\r\n", data.len()).as_bytes());
                out.extend_from_slice(data);
                out.extend_from_slice(b"\r\n");
            }
            Self::Array(None) => out.extend_from_slice(b"*-1\r\n"),
            Self::Array(Some(items)) => {
                out.extend_from_slice(format!("*{}\r\n", items.len()).as_bytes());
                for item in items {
                    item.encode(out);
                }
            }
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode(&mut out);
        out
    }
}

/// Encode a command as a multi-bulk array of bulk strings
pub fn encode_command<S: AsRef<[u8]>>(args: &[S]) -> Vec<u8> {
    let mut out = Vec::with_capacity(16 + args.iter().map(|a| a.as_ref().len() + 16).sum::<usize>());
    out.extend_from_slice(format!("*{}\r\n", args.len()).as_bytes());
    for arg in args {
        let arg = arg.as_ref();
        out.extend_from_slice(format!("${}\r\n", arg.len()).as_bytes());
        out.extend_from_slice(arg);
        out.extend_from_slice(b"\r\n");
    }
    out
}

/// A decoded frame: either a typed RESP value or an inline (telnet) command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Value(RespValue),
    Inline(Vec<String>),
}

impl Frame {
    /// Convert a command frame into its string arguments
    pub fn into_args(self) -> ProtocolResult<Vec<String>> {
        match self {
            Frame::Inline(args) => Ok(args),
            Frame::Value(RespValue::Array(Some(items))) => items
                .into_iter()
                .map(|item| match item {
                    RespValue::Bulk(Some(data)) => Ok(String::from_utf8_lossy(&data).into_owned()),
                    RespValue::Simple(s) => Ok(s),
                    RespValue::Integer(n) => Ok(n.to_string()),
                    other => Err(ProtocolError::Invalid(format!(
                        "unexpected {:?} inside command",
                        other
                    ))),
                })
                .collect(),
            Frame::Value(_) => Err(ProtocolError::Invalid("expected multibulk".to_string())),
        }
    }
}

/// Try to decode one frame from the front of `buf`.
///
/// Returns `Ok(None)` when more bytes are needed, otherwise the frame and
/// the number of bytes it occupied.
pub fn parse_frame(buf: &[u8]) -> ProtocolResult<Option<(Frame, usize)>> {
    let Some(&first) = buf.first() else {
        return Ok(None);
    };

    match first {
        b'+' | b'-' | b':' | b'$' | b'*' => {
            Ok(parse_value(buf, 0)?.map(|(value, end)| (Frame::Value(value), end)))
        }
        _ => {
            let Some(newline) = buf.iter().position(|&b| b == b'\n') else {
                if buf.len() > MAX_INLINE_LEN {
                    return Err(ProtocolError::Invalid("inline command too long".to_string()));
                }
                return Ok(None);
            };
            let line = &buf[..newline];
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            let args = String::from_utf8_lossy(line)
                .split_whitespace()
                .map(str::to_string)
                .collect();
            Ok(Some((Frame::Inline(args), newline + 1)))
        }
    }
}

fn read_line(buf: &[u8], start: usize) -> Option<(&[u8], usize)> {
    let rest = buf.get(start..)?;
    let end = rest.windows(2).position(|w| w == b"\r\n")?;
    Some((&rest[..end], start + end + 2))
}

fn parse_int(line: &[u8]) -> ProtocolResult<i64> {
    std::str::from_utf8(line)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| {
            ProtocolError::Invalid(format!(
                "invalid length '{}'",
                String::from_utf8_lossy(line)
            ))
        })
}

fn parse_value(buf: &[u8], start: usize) -> ProtocolResult<Option<(RespValue, usize)>> {
    let Some(&kind) = buf.get(start) else {
        return Ok(None);
    };
    let Some((line, mut pos)) = read_line(buf, start + 1) else {
        return Ok(None);
    };

    let value = match kind {
        b'+' => RespValue::Simple(String::from_utf8_lossy(line).into_owned()),
        b'-' => RespValue::Error(String::from_utf8_lossy(line).into_owned()),
        b':' => RespValue::Integer(parse_int(line)?),
        b'$' => {
            let len = parse_int(line)?;
            if len < 0 {
                RespValue::Bulk(None)
            } else {
                let len = len as usize;
                if len > MAX_BULK_LEN {
                    return Err(ProtocolError::Invalid(format!("bulk length {} too large", len)));
                }
                if buf.len() < pos + len + 2 {
                    return Ok(None);
                }
                if &buf[pos + len..pos + len + 2] != b"\r\n" {
                    return Err(ProtocolError::Invalid(
                        "bulk string not terminated by CRLF".to_string(),
                    ));
                }
                let data = buf[pos..pos + len].to_vec();
                pos += len + 2;
                RespValue::Bulk(Some(data))
            }
        }
        b'*' => {
            let len = parse_int(line)?;
            if len < 0 {
                RespValue::Array(None)
            } else {
                let len = len as usize;
                if len > MAX_ARRAY_LEN {
                    return Err(ProtocolError::Invalid(format!(
                        "multibulk length {} too large",
                        len
                    )));
                }
                let mut items = Vec::with_capacity(len.min(64));
                for _ in 0..len {
                    match parse_value(buf, pos)? {
                        Some((item, end)) => {
                            items.push(item);
                            pos = end;
                        }
                        None => return Ok(None),
                    }
                }
                RespValue::Array(Some(items))
            }
        }
        other => {
            return Err(ProtocolError::Invalid(format!(
                "unexpected type byte '{}'",
                other as char
            )));
        }
    };

    Ok(Some((value, pos)))
}

/// Buffered frame reader over any async byte source.
///
/// Tracks how many bytes have been consumed so callers can account for
/// the encoded size of each frame.
pub struct RespReader<R> {
    inner: R,
    buffer: BytesMut,
    consumed: u64,
}

impl<R: AsyncRead + Unpin> RespReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buffer: BytesMut::with_capacity(16 * 1024),
            consumed: 0,
        }
    }

    /// Total bytes consumed by decoded frames
    pub fn bytes_read(&self) -> u64 {
        self.consumed
    }

    /// Read the next frame. `Ok(None)` means the peer closed cleanly
    /// between frames.
    pub async fn read_frame(&mut self) -> ProtocolResult<Option<Frame>> {
        loop {
            if let Some((frame, used)) = parse_frame(&self.buffer)? {
                self.buffer.advance(used);
                self.consumed += used as u64;
                return Ok(Some(frame));
            }

            if self.inner.read_buf(&mut self.buffer).await? == 0 {
                return if self.buffer.is_empty() {
                    Ok(None)
                } else {
                    Err(ProtocolError::ConnectionClosed)
                };
            }
        }
    }
}
