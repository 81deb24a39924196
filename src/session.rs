use pod_api::AttachHandle;

/// Controller state visible to presentation code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    Connecting,
    Streaming,
    Reconnecting,
    Error(String),
}

impl SessionStatus {
    #[must_use]
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// True while a turn is in flight in any phase.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Connecting | Self::Streaming | Self::Reconnecting)
    }
}

/// Resumable agent state for one conversation.
///
/// The agent session id is only committed from observed system/result events,
/// so a stale hint can never survive a turn that the remote rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    pub agent_session_id: Option<String>,
    pub working_directory: String,
    pub attach: Option<AttachHandle>,
    pub model_id: Option<String>,
}

impl SessionContext {
    #[must_use]
    pub fn new(working_directory: impl Into<String>) -> Self {
        Self {
            agent_session_id: None,
            working_directory: working_directory.into(),
            attach: None,
            model_id: None,
        }
    }

    /// Forget all remote state; used by explicit "new chat".
    pub fn reset(&mut self) {
        self.agent_session_id = None;
        self.attach = None;
        self.model_id = None;
    }
}

/// Retry guards scoped to exactly one turn; created fresh at every dispatch
/// so retries are bounded to one attempt per failure class per turn.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TurnGuards {
    pub used_resume: bool,
    pub retried_after_timeout: bool,
}

/// Classification of how one transport epoch ended.
#[derive(Debug)]
pub(crate) enum TurnOutcome {
    Completed,
    TimedOut,
    Disconnected,
    StaleResume,
    Cancelled,
    Failed(crate::error::SessionError),
}
