pub mod connection;
pub mod dispatch;
pub mod http;
pub mod listener;
pub mod state;

pub use dispatch::{ClientContext, Dispatch, dispatch};
pub use http::create_router;
pub use state::ServerState;

use crate::config::ConfigStore;
use crate::core::FerryError;
use crate::metrics;
use crate::persistence::{AppendOnlyLog, PersistenceError};
use crate::replication::{
    AnchorNegotiator, ChecksumAnchor, FollowSupervisor, FollowerRegistry, FollowerStatus,
    GenerationGuard, ReplicationSettings,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tracing::info;

/// Startup failures
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("log replay failed: {0}")]
    Replay(#[from] FerryError),
}

/// How to start a server
#[derive(Clone)]
pub struct ServerOptions {
    pub listen_addr: String,
    pub data_dir: PathBuf,
    pub settings: ReplicationSettings,
    /// Resume-point negotiation; checksum chunks sized from `settings`
    /// when unset
    pub negotiator: Option<Arc<dyn AnchorNegotiator>>,
}

impl ServerOptions {
    pub fn new(listen_addr: impl Into<String>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            listen_addr: listen_addr.into(),
            data_dir: data_dir.into(),
            settings: ReplicationSettings::default(),
            negotiator: None,
        }
    }
}

/// A running Ferry server
///
/// Store, log, persisted config and follower progress live behind one
/// async RwLock. The follow generation and the connection registry have
/// their own synchronization so they can be read without it.
pub struct Server {
    state: RwLock<ServerState>,
    generation: GenerationGuard,
    followers: FollowerRegistry,
    settings: ReplicationSettings,
    negotiator: Arc<dyn AnchorNegotiator>,
    local_addr: SocketAddr,
}

impl Server {
    /// Bind, load the log, start accepting clients and resume following
    pub async fn start(options: ServerOptions) -> Result<Arc<Self>, ServerError> {
        let listener = TcpListener::bind(&options.listen_addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: options.listen_addr.clone(),
                source,
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ServerError::Bind {
                addr: options.listen_addr.clone(),
                source,
            })?;

        let config = ConfigStore::load_or_init(&options.data_dir).await?;
        let aof = AppendOnlyLog::open(options.data_dir.join("appendonly.aof"))
            .await?
            .with_flush_threshold(options.settings.flush_threshold_bytes);

        let mut state = ServerState::new(aof, config);
        state.reload_from_log().await?;

        let negotiator = options.negotiator.clone().unwrap_or_else(|| {
            Arc::new(ChecksumAnchor::new(
                options.settings.checksum_chunk_bytes,
                options.settings.dial_timeout(),
            ))
        });

        info!(
            "Ferry server {} listening on {}",
            state.config.get().server_id,
            local_addr
        );

        let server = Arc::new(Self {
            state: RwLock::new(state),
            generation: GenerationGuard::new(),
            followers: FollowerRegistry::new(),
            settings: options.settings,
            negotiator,
            local_addr,
        });

        tokio::spawn(listener::serve(Arc::clone(&server), listener));
        server.resume_following().await;

        Ok(server)
    }

    pub fn state(&self) -> &RwLock<ServerState> {
        &self.state
    }

    pub fn generation(&self) -> &GenerationGuard {
        &self.generation
    }

    pub fn followers(&self) -> &FollowerRegistry {
        &self.followers
    }

    pub fn settings(&self) -> &ReplicationSettings {
        &self.settings
    }

    pub fn negotiator(&self) -> &dyn AnchorNegotiator {
        self.negotiator.as_ref()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Pick up the persisted follow target after a restart
    pub async fn resume_following(self: &Arc<Self>) {
        let state = self.state.read().await;
        let Some(target) = state.config.get().follow_target() else {
            return;
        };

        let generation = self.generation.advance();
        metrics::set_generation(generation);
        info!("Resuming following {} from saved config", target);
        FollowSupervisor::new(Arc::clone(self), target, generation).spawn();
    }

    /// Snapshot of replication state
    pub async fn follower_status(&self) -> FollowerStatus {
        let state = self.state.read().await;
        let config = state.config.get();
        let progress = &state.progress;

        FollowerStatus {
            server_id: config.server_id.clone(),
            following: config.follow_target().map(|t| t.to_string()),
            generation: self.generation.current(),
            status: progress.status(),
            supervisor: progress.supervisor(),
            caught_up_once: progress.caught_up_once(),
            applied_offset: progress.applied_offset(),
            target_offset: progress.target_offset(),
            resume_offset: progress.resume_offset(),
            aof_size: state.aof.size(),
            followers: self.followers.followers(),
        }
    }
}
