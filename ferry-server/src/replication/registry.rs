use crate::core::{FerryError, Result};
use crate::protocol::RespValue;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

/// Replication info announced by a connected peer
#[derive(Debug, Clone, Serialize)]
pub struct FollowerInfo {
    pub remote_addr: SocketAddr,
    /// Port the follower accepts clients on (`REPLCONF listening-port`)
    pub listening_port: Option<u16>,
    /// Address the follower is reachable at (`REPLCONF ip-address`)
    pub ip_address: Option<String>,
    pub connected_at: u64,
}

/// Live inbound connections, keyed by remote address
///
/// Every accepted connection is tracked so `REPLCONF` from a follower can
/// be matched to the connection it arrived on.
#[derive(Debug, Default)]
pub struct FollowerRegistry {
    connections: RwLock<HashMap<SocketAddr, FollowerInfo>>,
}

impl FollowerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&self, remote_addr: SocketAddr) {
        let connected_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();

        self.connections.write().insert(
            remote_addr,
            FollowerInfo {
                remote_addr,
                listening_port: None,
                ip_address: None,
                connected_at,
            },
        );
    }

    pub fn untrack(&self, remote_addr: &SocketAddr) {
        let removed = self.connections.write().remove(remote_addr);
        if removed.is_some_and(|info| info.listening_port.is_some()) {
            info!("Follower {} disconnected", remote_addr);
        }
    }

    /// Connections that announced themselves as followers
    pub fn followers(&self) -> Vec<FollowerInfo> {
        let mut followers: Vec<_> = self
            .connections
            .read()
            .values()
            .filter(|info| info.listening_port.is_some() || info.ip_address.is_some())
            .cloned()
            .collect();
        followers.sort_by_key(|info| info.remote_addr);
        followers
    }

    pub fn connection_count(&self) -> usize {
        self.connections.read().len()
    }

    /// `REPLCONF listening-port <n>` / `REPLCONF ip-address <ip>`
    pub fn handle_replconf(&self, remote_addr: &SocketAddr, args: &[String]) -> Result<RespValue> {
        if args.len() != 3 {
            return Err(FerryError::WrongArity("replconf".to_string()));
        }
        let option = args[1].to_lowercase();
        let value = &args[2];

        let mut connections = self.connections.write();
        match option.as_str() {
            "listening-port" => {
                let port = value
                    .parse::<u16>()
                    .map_err(|_| FerryError::InvalidArgument(value.clone()))?;
                let info = connections
                    .get_mut(remote_addr)
                    .ok_or(FerryError::FollowerNotFound)?;
                info.listening_port = Some(port);
            }
            "ip-address" => {
                let info = connections
                    .get_mut(remote_addr)
                    .ok_or(FerryError::FollowerNotFound)?;
                info.ip_address = Some(value.clone());
            }
            _ => return Err(FerryError::FollowerNotFound),
        }

        debug!("REPLCONF {} {} from {}", option, value, remote_addr);
        Ok(RespValue::ok())
    }
}
