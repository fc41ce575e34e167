use crate::core::FerryError;
use crate::persistence::PersistenceError;
use crate::protocol::ProtocolError;
use thiserror::Error;

/// Replication error types
#[derive(Debug, Error)]
pub enum ReplicationError {
    /// The session's generation was superseded by a newer FOLLOW
    #[error("no longer following")]
    NoLongerFollowing,

    #[error("cannot follow: invalid id")]
    InvalidId,

    #[error("cannot follow self")]
    FollowSelf,

    #[error("cannot follow a follower")]
    FollowFollower,

    #[error("cannot follow: {0}")]
    Dial(ProtocolError),

    #[error("cannot follow: {0}")]
    Auth(String),

    /// Error reply sent by the leader
    #[error("{0}")]
    Leader(String),

    #[error("invalid response to {0} request")]
    UnexpectedReply(&'static str),

    #[error("invalid aof_size '{0}'")]
    InvalidLogSize(String),

    #[error("invalid multibulk")]
    InvalidMultibulk,

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Command(#[from] FerryError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

impl ReplicationError {
    /// Misconfigured topology: following self, a follower, or a peer
    /// without identity
    pub fn is_topology(&self) -> bool {
        matches!(
            self,
            Self::InvalidId | Self::FollowSelf | Self::FollowFollower
        )
    }

    /// The session was cancelled by a newer follow configuration
    pub fn is_obsolete(&self) -> bool {
        matches!(self, Self::NoLongerFollowing)
    }
}

pub type ReplicationResult<T> = std::result::Result<T, ReplicationError>;
