//! Transport-only client primitives for the pod instance service.
//!
//! This crate owns request building, status mapping, and the two wire
//! transports that reach a coding agent running on a remote pod:
//!
//! - the *interactive* exec WebSocket (persistent multiplexed byte channel)
//! - the *managed* service channel (HTTP long-poll / log-replay NDJSON)
//!
//! Both variants normalize to one [`TransportSignal`] stream so the session
//! engine upstream never branches on wire shape. The crate intentionally
//! contains no auth/login code, no conversation state, and no retry policy;
//! those concerns live in the session engine.

pub mod client;
pub mod config;
pub mod envelope;
pub mod error;
pub mod exec;
pub mod headers;
pub mod service;
pub mod transport;
pub mod url;

pub use client::PodApiClient;
pub use config::PodApiConfig;
pub use envelope::{ServiceLogEvent, ServiceLogEventType, ServiceRequest};
pub use error::PodApiError;
pub use exec::{ExecLaunch, ExecSession};
pub use service::strip_log_timestamps;
pub use transport::{
    await_or_cancel, is_cancelled, new_cancel_signal, AttachHandle, CancelSignal, TransportSignal,
};
pub use url::normalize_pod_base_url;
