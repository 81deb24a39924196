use pod_api::PodApiError;
use thiserror::Error;

/// Session-engine error taxonomy.
///
/// Transient transport conditions are classified and retried inside the
/// controller and only surface here once per-turn retry bounds are exhausted.
/// Auth and server errors surface on first occurrence, unretried.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no pod API token configured")]
    MissingPodToken,

    #[error("no agent token configured")]
    MissingAgentToken,

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("server error: {0}")]
    Server(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("resume was rejected for session '{session_id}'")]
    StaleSession { session_id: String },

    #[error("no data received within {timeout_secs}s")]
    Stall { timeout_secs: u64 },

    #[error("a turn is already in flight")]
    Busy,

    #[error("turn was cancelled")]
    Cancelled,

    #[error("transcript store error: {0}")]
    Store(String),
}

impl SessionError {
    /// True for errors that must surface immediately, without retry.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::MissingPodToken | Self::MissingAgentToken | Self::Auth(_) | Self::Server(_)
        )
    }
}

impl From<PodApiError> for SessionError {
    fn from(error: PodApiError) -> Self {
        match error {
            PodApiError::MissingAccessToken => Self::MissingPodToken,
            PodApiError::Unauthorized => Self::Auth(error.to_string()),
            PodApiError::NotFound
            | PodApiError::Server { .. }
            | PodApiError::InvalidBaseUrl(_) => Self::Server(error.to_string()),
            PodApiError::Cancelled => Self::Cancelled,
            PodApiError::Request(_) | PodApiError::WebSocket(_) | PodApiError::Serde(_) => {
                Self::Transport(error.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use pod_api::PodApiError;

    use super::SessionError;

    #[test]
    fn auth_and_server_errors_are_fatal() {
        assert!(SessionError::MissingPodToken.is_fatal());
        assert!(SessionError::Auth("401".to_owned()).is_fatal());
        assert!(SessionError::Server("500".to_owned()).is_fatal());
        assert!(!SessionError::Transport("reset".to_owned()).is_fatal());
        assert!(!SessionError::Stall { timeout_secs: 30 }.is_fatal());
    }

    #[test]
    fn pod_api_errors_map_into_the_taxonomy() {
        assert!(matches!(
            SessionError::from(PodApiError::MissingAccessToken),
            SessionError::MissingPodToken
        ));
        assert!(matches!(
            SessionError::from(PodApiError::Unauthorized),
            SessionError::Auth(_)
        ));
        assert!(matches!(
            SessionError::from(PodApiError::Cancelled),
            SessionError::Cancelled
        ));
        assert!(matches!(
            SessionError::from(PodApiError::WebSocket("reset".to_owned())),
            SessionError::Transport(_)
        ));
    }
}
