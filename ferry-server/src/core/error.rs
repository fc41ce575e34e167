use crate::persistence::PersistenceError;
use crate::protocol::RespValue;
use thiserror::Error;

/// Main error type for Ferry commands
#[derive(Debug, Error)]
pub enum FerryError {
    #[error("wrong number of arguments for '{0}' command")]
    WrongArity(String),

    #[error("invalid argument '{0}'")]
    InvalidArgument(String),

    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    #[error("key not found")]
    KeyNotFound,

    #[error("value is not an integer or out of range")]
    NotAnInteger,

    #[error("authentication required")]
    AuthRequired,

    #[error("invalid password")]
    InvalidPassword,

    #[error("read only")]
    ReadOnly,

    #[error("{0}")]
    CannotFollow(String),

    #[error("cannot find follower")]
    FollowerNotFound,

    #[error("pos is too big")]
    PositionOutOfRange,

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

impl FerryError {
    /// Whether replaying a command that failed this way leaves local state
    /// unusable. Only lookups that legitimately miss are tolerated; anything
    /// else means the log and the store no longer agree.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::KeyNotFound | Self::NotAnInteger)
    }

    /// RESP error reply for this error
    pub fn to_reply(&self) -> RespValue {
        RespValue::error(format!("ERR {}", self))
    }
}

/// Result type alias for Ferry commands
pub type Result<T> = std::result::Result<T, FerryError>;
