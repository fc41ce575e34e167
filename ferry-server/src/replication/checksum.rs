//! Resume-point negotiation between a follower's log and its leader's
//!
//! Both logs are cut into fixed-size chunks and compared by SHA-256 digest
//! (`AOFSHA <pos> <len>` on the leader). The follower resumes after the
//! last chunk both sides agree on, truncating anything it holds beyond it.

use super::handshake::{authenticate, query_identity};
use super::types::{ReplicationError, ReplicationResult};
use crate::protocol::{RespConnection, RespValue};
use crate::server::Server;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use std::time::Duration;
use tracing::{debug, info};

/// Finds the byte offset in the leader's log from which streaming may
/// safely resume
pub trait AnchorNegotiator: Send + Sync {
    /// Returns the resume offset. Local state beyond it has already been
    /// discarded when this returns.
    fn negotiate<'a>(
        &'a self,
        server: &'a Server,
        leader: &'a str,
        generation: u64,
        credential: Option<&'a str>,
    ) -> BoxFuture<'a, ReplicationResult<u64>>;
}

/// Binary search over chunk checksums
#[derive(Debug, Clone)]
pub struct ChecksumAnchor {
    chunk_size: u64,
    dial_timeout: Duration,
}

impl Default for ChecksumAnchor {
    fn default() -> Self {
        Self::new(512 * 1024, Duration::from_secs(2))
    }
}

impl ChecksumAnchor {
    pub fn new(chunk_size: u64, dial_timeout: Duration) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            dial_timeout,
        }
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// Byte range of 1-based chunk `index`, clipped to `limit`
    fn chunk_range(&self, index: u64, limit: u64) -> (u64, u64) {
        let start = (index - 1) * self.chunk_size;
        let end = (index * self.chunk_size).min(limit);
        (start, end - start)
    }

    async fn chunk_matches(
        &self,
        server: &Server,
        conn: &mut RespConnection,
        index: u64,
        limit: u64,
    ) -> ReplicationResult<bool> {
        let (pos, len) = self.chunk_range(index, limit);

        let local = server.state().read().await.aof.checksum(pos, len).await?;

        let pos_arg = pos.to_string();
        let len_arg = len.to_string();
        let reply = conn
            .request(&["aofsha", pos_arg.as_str(), len_arg.as_str()])
            .await?;
        let remote = match reply {
            RespValue::Error(_) => {
                return Err(ReplicationError::Leader(
                    reply.error_message().unwrap_or_default().to_string(),
                ));
            }
            other => other
                .as_string()
                .map(|s| s.into_owned())
                .ok_or(ReplicationError::UnexpectedReply("aofsha"))?,
        };

        debug!("Chunk {} ({}+{}): match={}", index, pos, len, local == remote);
        Ok(local == remote)
    }

    async fn find_anchor(
        &self,
        server: &Server,
        leader: &str,
        credential: Option<&str>,
        local_size: u64,
    ) -> ReplicationResult<u64> {
        let mut conn = RespConnection::dial(leader, self.dial_timeout)
            .await
            .map_err(ReplicationError::Dial)?;
        if let Some(credential) = credential {
            authenticate(&mut conn, credential).await?;
        }
        let leader_size = query_identity(&mut conn).await?.aof_size()?;

        let comparable = local_size.min(leader_size);
        if comparable == 0 {
            return Ok(0);
        }

        // First chunk differs: nothing in common, start over
        if !self.chunk_matches(server, &mut conn, 1, comparable).await? {
            return Ok(0);
        }

        // Largest matching chunk; `low` always matches
        let (mut low, mut high) = (1, comparable.div_ceil(self.chunk_size));
        while low < high {
            let mid = low + (high - low).div_ceil(2);
            if self.chunk_matches(server, &mut conn, mid, comparable).await? {
                low = mid;
            } else {
                high = mid - 1;
            }
        }

        if let Err(e) = conn.close().await {
            debug!("Closing checksum connection to {} failed: {}", leader, e);
        }
        Ok((low * self.chunk_size).min(comparable))
    }
}

impl AnchorNegotiator for ChecksumAnchor {
    fn negotiate<'a>(
        &'a self,
        server: &'a Server,
        leader: &'a str,
        generation: u64,
        credential: Option<&'a str>,
    ) -> BoxFuture<'a, ReplicationResult<u64>> {
        async move {
            let local_size = {
                let mut state = server.state().write().await;
                state.aof.flush(false).await?;
                state.aof.size()
            };
            if local_size == 0 {
                return Ok(0);
            }

            let anchor = self
                .find_anchor(server, leader, credential, local_size)
                .await?;

            let mut state = server.state().write().await;
            server.generation().ensure_current(generation)?;

            // A chunk edge can split a record; resume at the record start
            let anchor = state.aof.record_boundary(anchor).await?;
            if anchor < state.aof.size() {
                info!(
                    "Local log diverges from {} after {} bytes, truncating from {}",
                    leader,
                    anchor,
                    state.aof.size()
                );
                state.aof.truncate(anchor).await?;
                state.reload_from_log().await?;
            }

            debug!("Resuming from {} at offset {}", leader, anchor);
            Ok(anchor)
        }
        .boxed()
    }
}
