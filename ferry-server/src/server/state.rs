use crate::config::ConfigStore;
use crate::core::{Database, Result};
use crate::persistence::AppendOnlyLog;
use crate::replication::FollowerProgress;
use tracing::{info, warn};

/// Everything guarded by the server's global state lock
pub struct ServerState {
    pub db: Database,
    pub aof: AppendOnlyLog,
    pub config: ConfigStore,
    pub progress: FollowerProgress,
}

impl ServerState {
    pub fn new(aof: AppendOnlyLog, config: ConfigStore) -> Self {
        Self {
            db: Database::new(),
            aof,
            config,
            progress: FollowerProgress::default(),
        }
    }

    /// Rebuild the in-memory data set from the log, returning how many
    /// records were applied
    pub async fn reload_from_log(&mut self) -> Result<usize> {
        self.db.reset();
        let records = self.aof.replay().await?;

        for (index, record) in records.iter().enumerate() {
            if let Err(e) = self.db.execute(record) {
                if e.is_fatal() {
                    return Err(e);
                }
                warn!("Log record {} ({:?}) failed: {}", index, record.first(), e);
            }
        }

        info!(
            "Loaded {} keys from {} log records",
            self.db.kv().len(),
            records.len()
        );
        Ok(records.len())
    }

    /// Whether client writes must be refused
    pub fn is_read_only(&self) -> bool {
        let config = self.config.get();
        config.read_only || config.follow_target().is_some()
    }
}
