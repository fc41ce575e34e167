/// Persistence module - append-only command log
///
/// Provides durability for the data store through:
/// - A RESP-encoded append-only log, replayed on startup
/// - Buffered appends flushed past a fixed threshold
/// - Range reads and checksums used for follower resynchronization
pub mod aof;
pub mod types;

pub use aof::{AppendOnlyLog, FLUSH_THRESHOLD_BYTES};
pub use types::{PersistenceError, Result};
