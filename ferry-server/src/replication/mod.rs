/// Replication module - leader/follower log shipping
///
/// Features:
/// - FOLLOW handling with inline leader vetting (self, chains, identity)
/// - Generation-guarded follow sessions, one supervisor per generation
/// - Checksum negotiation of the resume point, truncating divergent logs
/// - In-order application of the leader's streamed command log
/// - Leader-side follower registration (REPLCONF)
pub mod checksum;
pub mod config;
pub mod follow;
pub mod generation;
pub mod handshake;
pub mod registry;
pub mod session;
pub mod status;
pub mod supervisor;
pub mod types;

pub use checksum::{AnchorNegotiator, ChecksumAnchor};
pub use config::ReplicationSettings;
pub use follow::{FollowRequest, handle_follow};
pub use generation::GenerationGuard;
pub use handshake::{ServerIdentity, handshake};
pub use registry::{FollowerInfo, FollowerRegistry};
pub use session::{apply_record, run_session};
pub use status::{FollowerProgress, FollowerStatus, SessionStatus, SupervisorState};
pub use supervisor::FollowSupervisor;
pub use types::{ReplicationError, ReplicationResult};
