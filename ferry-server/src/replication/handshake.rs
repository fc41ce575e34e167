use super::types::{ReplicationError, ReplicationResult};
use crate::protocol::{RespConnection, RespValue};
use std::collections::HashMap;
use tracing::debug;

/// Identity and role metadata returned by a peer's `SERVER` command
#[derive(Debug, Clone, Default)]
pub struct ServerIdentity {
    fields: HashMap<String, String>,
}

impl ServerIdentity {
    /// Parse a flat key/value array reply
    pub fn from_reply(reply: RespValue) -> ReplicationResult<Self> {
        match reply {
            RespValue::Array(Some(items)) => {
                let mut fields = HashMap::new();
                for pair in items.chunks_exact(2) {
                    let key = pair[0].as_string().unwrap_or_default().into_owned();
                    let value = pair[1].as_string().unwrap_or_default().into_owned();
                    fields.insert(key, value);
                }
                Ok(Self { fields })
            }
            RespValue::Error(_) => Err(ReplicationError::Leader(
                reply.error_message().unwrap_or_default().to_string(),
            )),
            _ => Err(ReplicationError::UnexpectedReply("server")),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn id(&self) -> &str {
        self.get("id").unwrap_or_default()
    }

    /// Leader this peer follows, empty when it is not a follower
    pub fn following(&self) -> &str {
        self.get("following").unwrap_or_default()
    }

    /// Size of the peer's append-only log
    pub fn aof_size(&self) -> ReplicationResult<u64> {
        let raw = self.get("aof_size").unwrap_or_default();
        raw.parse()
            .map_err(|_| ReplicationError::InvalidLogSize(raw.to_string()))
    }

    /// Reject peers we must not follow
    pub fn validate(&self, own_id: &str) -> ReplicationResult<()> {
        if self.id().is_empty() {
            return Err(ReplicationError::InvalidId);
        }
        if self.id() == own_id {
            return Err(ReplicationError::FollowSelf);
        }
        if !self.following().is_empty() {
            return Err(ReplicationError::FollowFollower);
        }
        Ok(())
    }
}

/// Require a plain `OK` reply
pub(crate) fn expect_ok(reply: RespValue, request: &'static str) -> ReplicationResult<()> {
    if let Some(message) = reply.error_message() {
        return Err(ReplicationError::Leader(message.to_string()));
    }
    if !reply.is_ok() {
        return Err(ReplicationError::UnexpectedReply(request));
    }
    Ok(())
}

/// `AUTH <credential>` against the leader
pub async fn authenticate(conn: &mut RespConnection, credential: &str) -> ReplicationResult<()> {
    let reply = conn.request(&["auth", credential]).await?;
    if let Some(message) = reply.error_message() {
        return Err(ReplicationError::Auth(message.to_string()));
    }
    if !reply.is_ok() {
        return Err(ReplicationError::Auth("auth no ok".to_string()));
    }
    Ok(())
}

/// `SERVER` against the peer
pub async fn query_identity(conn: &mut RespConnection) -> ReplicationResult<ServerIdentity> {
    let reply = conn.request(&["server"]).await?;
    ServerIdentity::from_reply(reply)
}

/// Authenticate if needed, then fetch and validate the peer's identity
pub async fn handshake(
    conn: &mut RespConnection,
    credential: Option<&str>,
    own_id: &str,
) -> ReplicationResult<ServerIdentity> {
    if let Some(credential) = credential {
        authenticate(conn, credential).await?;
    }

    let identity = query_identity(conn).await?;
    identity.validate(own_id)?;

    debug!(
        "Handshake with {} ok: id={}, aof_size={:?}",
        conn.addr(),
        identity.id(),
        identity.get("aof_size")
    );
    Ok(identity)
}
