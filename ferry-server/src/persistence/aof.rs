use super::types::{PersistenceError, Result};
use crate::protocol::{Frame, ProtocolError, RespReader, encode_command, parse_frame};
use sha2::{Digest, Sha256};
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Pending bytes allowed before a write is pushed to the file
pub const FLUSH_THRESHOLD_BYTES: usize = 10 * 1024;

/// Append-only command log
///
/// Records are stored as RESP multi-bulk commands, so the file can be
/// streamed to followers byte for byte. Appends go to an in-memory buffer
/// first; `flush` writes the buffer out and publishes the new flushed size
/// to anyone streaming the log.
pub struct AppendOnlyLog {
    path: PathBuf,
    file: File,
    /// Logical size, including bytes still pending
    size: u64,
    pending: Vec<u8>,
    flush_threshold: usize,
    flushed_tx: watch::Sender<u64>,
}

impl AppendOnlyLog {
    /// Create or open a log file
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(&path)
            .await?;
        let size = file.metadata().await?.len();
        let (flushed_tx, _) = watch::channel(size);

        info!("Append-only log opened at {:?}, size: {} bytes", path, size);

        Ok(Self {
            path,
            file,
            size,
            pending: Vec::new(),
            flush_threshold: FLUSH_THRESHOLD_BYTES,
            flushed_tx,
        })
    }

    /// Override the pending-bytes threshold
    pub fn with_flush_threshold(mut self, threshold: usize) -> Self {
        self.flush_threshold = threshold;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Logical size in bytes (flushed + pending)
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Bytes appended but not yet written to the file
    pub fn buffered_len(&self) -> usize {
        self.pending.len()
    }

    /// Size visible to readers of the file
    pub fn flushed_size(&self) -> u64 {
        *self.flushed_tx.borrow()
    }

    /// Whether the pending buffer has grown past the flush threshold
    pub fn needs_flush(&self) -> bool {
        self.pending.len() > self.flush_threshold
    }

    /// Append one command record; returns the new logical size
    pub fn append<S: AsRef<[u8]>>(&mut self, args: &[S]) -> u64 {
        let record = encode_command(args);
        self.pending.extend_from_slice(&record);
        self.size += record.len() as u64;
        self.size
    }

    /// Write pending bytes to the file. `force` also syncs to disk.
    pub async fn flush(&mut self, force: bool) -> Result<()> {
        if !self.pending.is_empty() {
            self.file.write_all(&self.pending).await?;
            self.file.flush().await?;
            debug!("Log flush: {} bytes, size={}", self.pending.len(), self.size);
            self.pending.clear();
        }

        if force {
            self.file.sync_data().await?;
        }

        self.flushed_tx.send_replace(self.size);
        Ok(())
    }

    /// Watch the flushed size (used by leader-side streaming)
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.flushed_tx.subscribe()
    }

    /// Read a flushed byte range
    pub async fn read_range(&self, pos: u64, len: u64) -> Result<Vec<u8>> {
        let flushed = self.flushed_size();
        if pos.checked_add(len).is_none_or(|end| end > flushed) {
            return Err(PersistenceError::OutOfRange {
                pos,
                len,
                size: flushed,
            });
        }

        let mut file = File::open(&self.path).await?;
        file.seek(SeekFrom::Start(pos)).await?;
        let mut data = vec![0u8; len as usize];
        file.read_exact(&mut data).await?;
        Ok(data)
    }

    /// Hex SHA-256 of a flushed byte range
    pub async fn checksum(&self, pos: u64, len: u64) -> Result<String> {
        let data = self.read_range(pos, len).await?;
        Ok(hex::encode(Sha256::digest(&data).as_slice()))
    }

    /// End offset of the last complete record that fits within `pos`.
    /// Scans the file one record at a time.
    pub async fn record_boundary(&self, pos: u64) -> Result<u64> {
        let end = pos.min(self.flushed_size());
        let file = File::open(&self.path).await?;
        let mut reader = RespReader::new(file.take(end));

        loop {
            match reader.read_frame().await {
                Ok(Some(_)) => {}
                // A record cut by `end` does not count
                Ok(None) | Err(ProtocolError::ConnectionClosed) => break,
                Err(ProtocolError::IOError(e)) => return Err(e.into()),
                Err(e) => {
                    return Err(PersistenceError::Corrupted {
                        offset: reader.bytes_read(),
                        reason: e.to_string(),
                    });
                }
            }
        }
        Ok(reader.bytes_read())
    }

    /// Cut the log back to `size` bytes
    pub async fn truncate(&mut self, size: u64) -> Result<()> {
        self.flush(false).await?;
        if size > self.size {
            return Err(PersistenceError::OutOfRange {
                pos: size,
                len: 0,
                size: self.size,
            });
        }

        self.file.set_len(size).await?;
        self.file.sync_all().await?;

        info!("Log truncated from {} to {} bytes", self.size, size);

        self.size = size;
        self.flushed_tx.send_replace(size);
        Ok(())
    }

    /// Decode every record in the log, in order.
    ///
    /// An incomplete trailing record (torn write) is cut off; anything else
    /// that does not decode is reported as corruption.
    pub async fn replay(&mut self) -> Result<Vec<Vec<String>>> {
        self.flush(false).await?;
        let data = tokio::fs::read(&self.path).await?;

        let mut records = Vec::new();
        let mut pos = 0usize;

        while pos < data.len() {
            match parse_frame(&data[pos..]) {
                Ok(Some((frame @ Frame::Value(_), used))) => {
                    let args = frame.into_args().map_err(|e| PersistenceError::Corrupted {
                        offset: pos as u64,
                        reason: e.to_string(),
                    })?;
                    if args.is_empty() {
                        return Err(PersistenceError::Corrupted {
                            offset: pos as u64,
                            reason: "empty record".to_string(),
                        });
                    }
                    records.push(args);
                    pos += used;
                }
                Ok(Some((Frame::Inline(_), _))) => {
                    return Err(PersistenceError::Corrupted {
                        offset: pos as u64,
                        reason: "inline record".to_string(),
                    });
                }
                Ok(None) => {
                    warn!(
                        "Incomplete record at offset {} (file is {} bytes), truncating",
                        pos,
                        data.len()
                    );
                    self.truncate(pos as u64).await?;
                    break;
                }
                Err(e) => {
                    return Err(PersistenceError::Corrupted {
                        offset: pos as u64,
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!("Replayed {} log records", records.len());
        Ok(records)
    }
}
