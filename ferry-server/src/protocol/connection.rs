use super::resp::{Frame, ProtocolError, ProtocolResult, RespReader, RespValue, encode_command};
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tracing::debug;

/// One record received on a replication stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamedRecord {
    /// Command fields, empty for control frames
    pub fields: Vec<String>,
    /// True for inline (telnet) frames and non-multibulk values
    pub control: bool,
    /// Encoded size of the record on the wire
    pub encoded_len: u64,
}

/// Outbound RESP connection used by followers to talk to their leader
pub struct RespConnection {
    addr: String,
    reader: RespReader<OwnedReadHalf>,
    writer: BufWriter<OwnedWriteHalf>,
}

impl RespConnection {
    /// Dial `addr`, giving up after `timeout`
    pub async fn dial(addr: &str, timeout: Duration) -> ProtocolResult<Self> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| ProtocolError::Timeout)??;
        stream.set_nodelay(true)?;

        debug!("Connected to {}", addr);

        let (read_half, write_half) = stream.into_split();
        Ok(Self {
            addr: addr.to_string(),
            reader: RespReader::new(read_half),
            writer: BufWriter::new(write_half),
        })
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Send one command and wait for its reply
    pub async fn request<S: AsRef<[u8]>>(&mut self, args: &[S]) -> ProtocolResult<RespValue> {
        self.writer.write_all(&encode_command(args)).await?;
        self.writer.flush().await?;

        match self.reader.read_frame().await? {
            Some(Frame::Value(value)) => Ok(value),
            Some(Frame::Inline(_)) => Err(ProtocolError::Invalid(
                "unexpected inline reply".to_string(),
            )),
            None => Err(ProtocolError::ConnectionClosed),
        }
    }

    /// Block until the next streamed record arrives
    pub async fn read_streamed_record(&mut self) -> ProtocolResult<StreamedRecord> {
        let before = self.reader.bytes_read();
        let frame = self
            .reader
            .read_frame()
            .await?
            .ok_or(ProtocolError::ConnectionClosed)?;
        let encoded_len = self.reader.bytes_read() - before;

        let record = match frame {
            Frame::Value(value @ RespValue::Array(Some(_))) => match Frame::Value(value).into_args() {
                Ok(fields) => StreamedRecord {
                    fields,
                    control: false,
                    encoded_len,
                },
                Err(_) => StreamedRecord {
                    fields: Vec::new(),
                    control: true,
                    encoded_len,
                },
            },
            _ => StreamedRecord {
                fields: Vec::new(),
                control: true,
                encoded_len,
            },
        };

        Ok(record)
    }

    /// Shut down the write side; the peer sees EOF
    pub async fn close(mut self) -> ProtocolResult<()> {
        self.writer.shutdown().await?;
        Ok(())
    }
}
