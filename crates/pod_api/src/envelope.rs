use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Process configuration for `PUT /pods/{pod}/services/{name}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRequest {
    pub cmd: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub needs: Option<Vec<String>>,
    #[serde(rename = "http_port", skip_serializing_if = "Option::is_none")]
    pub http_port: Option<u16>,
}

impl ServiceRequest {
    /// Builds a `bash -c` process configuration for one shell command.
    #[must_use]
    pub fn shell(command: impl Into<String>) -> Self {
        Self {
            cmd: "bash".to_owned(),
            args: Some(vec!["-c".to_owned(), command.into()]),
            needs: None,
            http_port: None,
        }
    }
}

/// One NDJSON envelope record from a managed-service stream.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ServiceLogEvent {
    #[serde(rename = "type")]
    pub event_type: ServiceLogEventType,
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub timestamp: Option<f64>,
    #[serde(default)]
    pub log_files: Option<BTreeMap<String, String>>,
}

/// Envelope discriminator; unrecognized values map to `Unknown` so a newer
/// server cannot break the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceLogEventType {
    Stdout,
    Stderr,
    Exit,
    Error,
    Complete,
    Started,
    Stopping,
    Stopped,
    #[serde(other)]
    Unknown,
}
