use serde::Serialize;

/// Catch-up state of the current follow session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Not following anyone
    #[default]
    Idle,
    /// Session started, applied offset still behind the catch-up target
    Syncing,
    /// Applied offset reached the leader's size observed at session start
    CaughtUp,
}

/// Follow supervisor lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SupervisorState {
    /// Running (or about to run) a session attempt
    Attempting,
    /// Subscribed to the leader's log stream
    Streaming,
    /// Superseded by a newer follow configuration
    #[default]
    Stopped,
}

/// Follower-side replication progress, guarded by the server state lock
#[derive(Debug, Clone, Default)]
pub struct FollowerProgress {
    status: SessionStatus,
    supervisor: SupervisorState,
    caught_up_once: bool,
    applied_offset: u64,
    target_offset: u64,
    resume_offset: u64,
}

impl FollowerProgress {
    /// Reset for a new session attempt
    pub fn begin_session(&mut self) {
        self.status = SessionStatus::Syncing;
        self.supervisor = SupervisorState::Attempting;
        self.applied_offset = 0;
        self.target_offset = 0;
        self.resume_offset = 0;
    }

    /// Subscribed at `resume_offset`; caught up once `target` is reached
    pub fn start_streaming(&mut self, resume_offset: u64, target: u64) {
        self.supervisor = SupervisorState::Streaming;
        self.applied_offset = resume_offset;
        self.resume_offset = resume_offset;
        self.target_offset = target;
    }

    /// Account for one applied record, returning the new applied offset
    pub fn advance(&mut self, encoded_len: u64) -> u64 {
        self.applied_offset += encoded_len;
        self.applied_offset
    }

    /// Flip to `CaughtUp`. Returns false if the session was not syncing.
    pub fn mark_caught_up(&mut self) -> bool {
        if self.status != SessionStatus::Syncing {
            return false;
        }
        self.status = SessionStatus::CaughtUp;
        self.caught_up_once = true;
        true
    }

    pub fn set_supervisor(&mut self, state: SupervisorState) {
        self.supervisor = state;
    }

    /// Forget everything about the previous target
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn supervisor(&self) -> SupervisorState {
        self.supervisor
    }

    pub fn is_caught_up(&self) -> bool {
        self.status == SessionStatus::CaughtUp
    }

    pub fn caught_up_once(&self) -> bool {
        self.caught_up_once
    }

    pub fn applied_offset(&self) -> u64 {
        self.applied_offset
    }

    pub fn target_offset(&self) -> u64 {
        self.target_offset
    }

    pub fn resume_offset(&self) -> u64 {
        self.resume_offset
    }
}

/// Point-in-time view of replication state (HTTP `/replication`)
#[derive(Debug, Clone, Serialize)]
pub struct FollowerStatus {
    pub server_id: String,
    /// `host:port` of the leader, if following
    pub following: Option<String>,
    pub generation: u64,
    pub status: SessionStatus,
    pub supervisor: SupervisorState,
    pub caught_up_once: bool,
    pub applied_offset: u64,
    pub target_offset: u64,
    pub resume_offset: u64,
    /// Size of this server's own log
    pub aof_size: u64,
    /// Followers registered against this server
    pub followers: Vec<super::registry::FollowerInfo>,
}
