pub mod config;
pub mod core;
pub mod metrics;
pub mod persistence;
pub mod protocol;
pub mod replication;
pub mod server;

// Re-export commonly used types
pub use config::{ConfigStore, FollowTarget, PersistedConfig, ServerConfig};
pub use core::{CommandKind, Database, FerryError, KVStore, PubSubRouter};
pub use persistence::{AppendOnlyLog, PersistenceError};
pub use protocol::{RespConnection, RespValue};
pub use replication::{
    AnchorNegotiator, ChecksumAnchor, FollowerStatus, GenerationGuard, ReplicationError,
    ReplicationSettings, SessionStatus, SupervisorState,
};
pub use server::{Server, ServerError, ServerOptions, create_router};
