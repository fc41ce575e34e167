//! `FOLLOW host port` / `FOLLOW no one`

use super::handshake::handshake;
use super::supervisor::FollowSupervisor;
use super::types::ReplicationError;
use crate::config::FollowTarget;
use crate::core::{FerryError, Result};
use crate::metrics;
use crate::protocol::{RespConnection, RespValue};
use crate::server::Server;
use std::sync::Arc;
use tracing::{debug, info};

/// Parsed FOLLOW arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FollowRequest {
    /// `FOLLOW no one`
    Stop,
    Follow(FollowTarget),
}

impl FollowRequest {
    pub fn parse(args: &[String]) -> Result<Self> {
        if args.len() != 3 || args[1].is_empty() || args[2].is_empty() {
            return Err(FerryError::WrongArity("follow".to_string()));
        }
        let host = args[1].to_lowercase();
        let port = args[2].to_lowercase();

        if host == "no" && port == "one" {
            return Ok(Self::Stop);
        }

        let port = port
            .parse::<u16>()
            .map_err(|_| FerryError::InvalidArgument(port.clone()))?;
        Ok(Self::Follow(FollowTarget { host, port }))
    }

    pub fn target(&self) -> Option<&FollowTarget> {
        match self {
            Self::Stop => None,
            Self::Follow(target) => Some(target),
        }
    }
}

/// What committing a FOLLOW request would do to the stored target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FollowCommit {
    /// Already following the requested target
    Unchanged,
    Apply,
    /// The stored target moved since the request was vetted
    Revet,
}

fn plan_commit(
    current: Option<&FollowTarget>,
    requested: Option<&FollowTarget>,
    vetted: bool,
) -> FollowCommit {
    if current == requested {
        FollowCommit::Unchanged
    } else if requested.is_some() && !vetted {
        FollowCommit::Revet
    } else {
        FollowCommit::Apply
    }
}

/// Execute FOLLOW. A new leader is vetted before anything is committed.
pub async fn handle_follow(server: &Arc<Server>, args: &[String]) -> Result<RespValue> {
    let request = FollowRequest::parse(args)?;
    let target = request.target().cloned();
    let mut vetted = false;

    loop {
        let (current, credential, own_id) = {
            let state = server.state().read().await;
            let config = state.config.get();
            (
                config.follow_target(),
                config.leader_auth.clone(),
                config.server_id.clone(),
            )
        };

        // Vet the candidate without holding the state lock
        if let (FollowCommit::Revet, Some(target)) =
            (plan_commit(current.as_ref(), target.as_ref(), vetted), &target)
        {
            vet_leader(server, target, credential.as_deref(), &own_id)
                .await
                .map_err(follow_failure)?;
            vetted = true;
        }

        let mut state = server.state().write().await;
        let current = state.config.get().follow_target();
        let update = match plan_commit(current.as_ref(), target.as_ref(), vetted) {
            FollowCommit::Unchanged => false,
            FollowCommit::Apply => true,
            FollowCommit::Revet => continue,
        };

        // The target and the generation only ever move together
        let next = target.clone();
        state
            .config
            .update(false, |config| config.set_follow_target(next))
            .await?;

        if update {
            let generation = server.generation().advance();
            state.progress.reset();
            metrics::set_generation(generation);
            metrics::set_caught_up(false);

            match target {
                Some(target) => {
                    info!("following new host '{}' '{}'", target.host, target.port);
                    FollowSupervisor::new(Arc::clone(server), target, generation).spawn();
                }
                None => info!("following no one"),
            }
        }

        return Ok(RespValue::ok());
    }
}

async fn vet_leader(
    server: &Server,
    target: &FollowTarget,
    credential: Option<&str>,
    own_id: &str,
) -> std::result::Result<(), ReplicationError> {
    let mut conn = RespConnection::dial(&target.addr(), server.settings().dial_timeout())
        .await
        .map_err(ReplicationError::Dial)?;
    handshake(&mut conn, credential, own_id).await?;
    if let Err(e) = conn.close().await {
        debug!("Closing vetting connection to {} failed: {}", target, e);
    }
    Ok(())
}

/// Client-facing error for a rejected FOLLOW
fn follow_failure(e: ReplicationError) -> FerryError {
    match e {
        ReplicationError::Dial(_)
        | ReplicationError::Auth(_)
        | ReplicationError::InvalidId
        | ReplicationError::FollowSelf
        | ReplicationError::FollowFollower => FerryError::CannotFollow(e.to_string()),
        other => FerryError::CannotFollow(format!("cannot follow: {}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ProtocolError;

    fn args(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_follow() {
        assert_eq!(
            FollowRequest::parse(&args(&["follow", "No", "ONE"])).unwrap(),
            FollowRequest::Stop
        );
        assert_eq!(
            FollowRequest::parse(&args(&["FOLLOW", "Host1", "9000"])).unwrap(),
            FollowRequest::Follow(FollowTarget {
                host: "host1".to_string(),
                port: 9000
            })
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            FollowRequest::parse(&args(&["follow", "host1"])),
            Err(FerryError::WrongArity(_))
        ));
        assert!(matches!(
            FollowRequest::parse(&args(&["follow", "host1", "9000", "x"])),
            Err(FerryError::WrongArity(_))
        ));
        assert!(matches!(
            FollowRequest::parse(&args(&["follow", "host1", "-1"])),
            Err(FerryError::InvalidArgument(p)) if p == "-1"
        ));
        assert!(matches!(
            FollowRequest::parse(&args(&["follow", "host1", "70000"])),
            Err(FerryError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_follow_failure_messages() {
        assert_eq!(
            follow_failure(ReplicationError::FollowSelf).to_string(),
            "cannot follow self"
        );
        assert_eq!(
            follow_failure(ReplicationError::Dial(ProtocolError::Timeout)).to_string(),
            "cannot follow: connection timed out"
        );
        assert_eq!(
            follow_failure(ReplicationError::Protocol(ProtocolError::ConnectionClosed))
                .to_string(),
            "cannot follow: connection closed"
        );
    }

    #[test]
    fn test_plan_commit() {
        let leader = FollowTarget {
            host: "leader".to_string(),
            port: 9851,
        };
        let other = FollowTarget {
            host: "other".to_string(),
            port: 9851,
        };

        assert_eq!(plan_commit(None, None, false), FollowCommit::Unchanged);
        assert_eq!(
            plan_commit(Some(&leader), Some(&leader), false),
            FollowCommit::Unchanged
        );
        assert_eq!(plan_commit(Some(&leader), None, false), FollowCommit::Apply);
        assert_eq!(
            plan_commit(Some(&other), Some(&leader), true),
            FollowCommit::Apply
        );

        // Seen as a no-op before the lock, then another FOLLOW moved the
        // stored target: the request has to be vetted after all
        assert_eq!(plan_commit(None, Some(&leader), false), FollowCommit::Revet);
        assert_eq!(
            plan_commit(Some(&other), Some(&leader), false),
            FollowCommit::Revet
        );
    }
}
