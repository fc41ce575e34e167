pub mod command;
pub mod error;
pub mod kv_store;
pub mod pubsub;
pub mod types;

pub use command::{CommandKind, Database, is_durable_record};
pub use error::{FerryError, Result};
pub use kv_store::KVStore;
pub use pubsub::{Message, PubSubRouter, PubSubStats};
pub use types::KVStats;
