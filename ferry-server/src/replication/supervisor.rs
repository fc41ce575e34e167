use super::session::run_session;
use super::status::SupervisorState;
use crate::config::FollowTarget;
use crate::metrics;
use crate::server::Server;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Retry loop owning the follow sessions of one generation
///
/// Runs one session attempt at a time, sleeping a fixed interval between
/// attempts, until a newer follow configuration makes it obsolete.
pub struct FollowSupervisor {
    server: Arc<Server>,
    target: FollowTarget,
    generation: u64,
}

impl FollowSupervisor {
    pub fn new(server: Arc<Server>, target: FollowTarget, generation: u64) -> Self {
        Self {
            server,
            target,
            generation,
        }
    }

    /// Start the supervisor on its own task
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(self) {
        info!(
            "Following {} (generation {})",
            self.target, self.generation
        );

        loop {
            self.set_state(SupervisorState::Attempting).await;

            match run_session(&self.server, &self.target, self.generation).await {
                Ok(()) => {
                    metrics::record_session_outcome("closed");
                    info!("follow: {} closed the stream", self.target);
                }
                Err(e) if e.is_obsolete() => {
                    metrics::record_session_outcome("obsolete");
                    info!(
                        "follow: {} no longer followed (generation {})",
                        self.target, self.generation
                    );
                    break;
                }
                Err(e) if e.is_topology() => {
                    metrics::record_session_outcome("topology");
                    warn!(kind = "topology", "follow: {}: {}", self.target, e);
                }
                Err(e) => {
                    metrics::record_session_outcome("error");
                    error!("follow: {}: {}", self.target, e);
                }
            }

            if !self.server.generation().is_current(self.generation) {
                metrics::record_session_outcome("obsolete");
                info!(
                    "follow: {} no longer followed (generation {})",
                    self.target, self.generation
                );
                break;
            }

            metrics::set_caught_up(false);
            tokio::time::sleep(self.server.settings().retry_interval()).await;
        }

        self.set_state(SupervisorState::Stopped).await;
    }

    /// Record the supervisor state unless a newer generation owns it
    async fn set_state(&self, supervisor: SupervisorState) {
        let mut state = self.server.state().write().await;
        if self.server.generation().is_current(self.generation) {
            state.progress.set_supervisor(supervisor);
        }
    }
}
