use std::time::Duration;

/// Which wire transport carries the agent's output for this conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// Persistent multiplexed exec channel; dies with the socket unless a
    /// disconnect grace is granted.
    Interactive,
    /// Server-orchestrated managed process with a replayable output log.
    Managed,
}

pub const DEFAULT_WORKING_DIRECTORY: &str = "/home/pod/project";
pub const DEFAULT_AGENT_COMMAND: &str = "claude";

/// No-output window after which a turn is classified as stalled.
pub const STALL_TIMEOUT: Duration = Duration::from_secs(30);
/// Pause between unbounded reattach attempts.
pub const REATTACH_DELAY: Duration = Duration::from_secs(2);
/// Minimum gap between fire-and-forget transcript saves while streaming.
pub const SAVE_INTERVAL: Duration = Duration::from_secs(1);
/// Requested lifetime of a managed-process stream request.
pub const DEFAULT_SERVICE_DURATION: &str = "3600s";

/// Per-conversation session engine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub pod_name: String,
    pub conversation_id: String,
    pub working_directory: String,
    pub transport: TransportKind,
    /// Executable the remote turn command invokes.
    pub agent_command: String,
    pub stall_timeout: Duration,
    pub reattach_delay: Duration,
    pub save_interval: Duration,
    pub service_duration: String,
    /// Seconds an interactive command may outlive its socket.
    pub disconnect_grace_secs: Option<u64>,
}

impl SessionConfig {
    #[must_use]
    pub fn new(pod_name: impl Into<String>, conversation_id: impl Into<String>) -> Self {
        Self {
            pod_name: pod_name.into(),
            conversation_id: conversation_id.into(),
            working_directory: DEFAULT_WORKING_DIRECTORY.to_owned(),
            transport: TransportKind::Managed,
            agent_command: DEFAULT_AGENT_COMMAND.to_owned(),
            stall_timeout: STALL_TIMEOUT,
            reattach_delay: REATTACH_DELAY,
            save_interval: SAVE_INTERVAL,
            service_duration: DEFAULT_SERVICE_DURATION.to_owned(),
            disconnect_grace_secs: None,
        }
    }

    #[must_use]
    pub fn with_transport(mut self, transport: TransportKind) -> Self {
        self.transport = transport;
        self
    }

    #[must_use]
    pub fn with_working_directory(mut self, working_directory: impl Into<String>) -> Self {
        self.working_directory = working_directory.into();
        self
    }

    #[must_use]
    pub fn with_agent_command(mut self, agent_command: impl Into<String>) -> Self {
        self.agent_command = agent_command.into();
        self
    }

    #[must_use]
    pub fn with_stall_timeout(mut self, stall_timeout: Duration) -> Self {
        self.stall_timeout = stall_timeout;
        self
    }

    #[must_use]
    pub fn with_reattach_delay(mut self, reattach_delay: Duration) -> Self {
        self.reattach_delay = reattach_delay;
        self
    }

    #[must_use]
    pub fn with_save_interval(mut self, save_interval: Duration) -> Self {
        self.save_interval = save_interval;
        self
    }

    #[must_use]
    pub fn with_disconnect_grace(mut self, seconds: u64) -> Self {
        self.disconnect_grace_secs = Some(seconds);
        self
    }
}
