use std::fmt;

use reqwest::StatusCode;
use serde_json::Error as JsonError;

#[derive(Debug)]
pub enum PodApiError {
    MissingAccessToken,
    InvalidBaseUrl(String),
    Request(reqwest::Error),
    Unauthorized,
    NotFound,
    Server {
        status: StatusCode,
        message: Option<String>,
    },
    WebSocket(String),
    Serde(JsonError),
    Cancelled,
}

impl PodApiError {
    /// Maps a non-success HTTP status and response body to the error taxonomy.
    #[must_use]
    pub fn from_status(status: StatusCode, body: Option<String>) -> Self {
        match status {
            StatusCode::UNAUTHORIZED => Self::Unauthorized,
            StatusCode::NOT_FOUND => Self::NotFound,
            _ => Self::Server {
                status,
                message: body.filter(|message| !message.trim().is_empty()),
            },
        }
    }
}

impl fmt::Display for PodApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingAccessToken => write!(f, "access token is required"),
            Self::InvalidBaseUrl(value) => write!(f, "invalid base URL: {value}"),
            Self::Request(error) => write!(f, "request error: {error}"),
            Self::Unauthorized => write!(f, "authentication failed; check the pod API token"),
            Self::NotFound => write!(f, "the requested resource was not found"),
            Self::Server { status, message } => match message {
                Some(message) => write!(f, "server error ({status}): {message}"),
                None => write!(f, "server error ({status})"),
            },
            Self::WebSocket(message) => write!(f, "websocket error: {message}"),
            Self::Serde(error) => write!(f, "serialization error: {error}"),
            Self::Cancelled => write!(f, "request was cancelled"),
        }
    }
}

impl std::error::Error for PodApiError {}

impl From<reqwest::Error> for PodApiError {
    fn from(error: reqwest::Error) -> Self {
        Self::Request(error)
    }
}

impl From<JsonError> for PodApiError {
    fn from(error: JsonError) -> Self {
        Self::Serde(error)
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for PodApiError {
    fn from(error: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use reqwest::StatusCode;

    use super::PodApiError;

    #[test]
    fn status_mapping_distinguishes_auth_and_missing_resources() {
        assert!(matches!(
            PodApiError::from_status(StatusCode::UNAUTHORIZED, None),
            PodApiError::Unauthorized
        ));
        assert!(matches!(
            PodApiError::from_status(StatusCode::NOT_FOUND, Some("gone".to_owned())),
            PodApiError::NotFound
        ));
    }

    #[test]
    fn server_errors_keep_non_empty_bodies_as_messages() {
        let error = PodApiError::from_status(StatusCode::CONFLICT, Some("service conflict".into()));
        let PodApiError::Server { status, message } = error else {
            panic!("expected server error");
        };

        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(message.as_deref(), Some("service conflict"));
    }

    #[test]
    fn server_errors_drop_blank_bodies() {
        let error = PodApiError::from_status(StatusCode::BAD_GATEWAY, Some("  ".into()));
        let PodApiError::Server { message, .. } = error else {
            panic!("expected server error");
        };

        assert!(message.is_none());
    }
}
