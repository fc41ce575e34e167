use crate::persistence::FLUSH_THRESHOLD_BYTES;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Replication timing and sizing settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicationSettings {
    /// Timeout for dialing a leader, in milliseconds
    pub dial_timeout_ms: u64,

    /// Sleep between failed session attempts, in milliseconds
    pub retry_interval_ms: u64,

    /// Pending log bytes allowed before a flush
    pub flush_threshold_bytes: usize,

    /// Chunk size used when comparing log checksums with a leader
    pub checksum_chunk_bytes: u64,
}

impl Default for ReplicationSettings {
    fn default() -> Self {
        Self {
            dial_timeout_ms: 2000,   // 2 seconds
            retry_interval_ms: 1000, // 1 second, no backoff
            flush_threshold_bytes: FLUSH_THRESHOLD_BYTES,
            checksum_chunk_bytes: 512 * 1024,
        }
    }
}

impl ReplicationSettings {
    /// Validate settings
    pub fn validate(&self) -> Result<(), String> {
        if self.dial_timeout_ms == 0 {
            return Err("dial_timeout_ms must be greater than zero".to_string());
        }
        if self.checksum_chunk_bytes == 0 {
            return Err("checksum_chunk_bytes must be greater than zero".to_string());
        }
        Ok(())
    }

    pub fn dial_timeout(&self) -> Duration {
        Duration::from_millis(self.dial_timeout_ms)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}
