//! Session engine for turn-based conversations with a coding agent running
//! on an ephemeral remote compute pod.
//!
//! The engine opens or reattaches transport connections, incrementally
//! decodes the agent's line-delimited event stream, builds a structured
//! transcript, and recovers automatically from disconnects, stalls, and
//! stale resumption state.
//!
//! ## Recovery contract
//!
//! - No output for the stall window: tear the transport down, clear remote
//!   state out-of-band, retry the same prompt once per turn.
//! - Resume hint used but no system event observed: drop the session id and
//!   retry once without resume.
//! - Abnormal end after data was seen: reattach with unbounded retries; a
//!   non-empty replay supersedes the stale partial message, an empty replay
//!   keeps it.
//!
//! Auth and server errors surface on first occurrence and are never retried.
//!
//! ## Collaborators
//!
//! [`CredentialProvider`], [`TranscriptRepository`], and
//! [`TransportProvider`] are injected traits; the engine compiles and tests
//! against fakes with no network or storage stack. [`PodTransportProvider`]
//! and [`FileTranscriptRepository`] are the production implementations over
//! the `pod_api` and `transcript_store` crates.

pub mod auth;
pub mod config;
pub mod controller;
pub mod conversation;
pub mod error;
pub mod launch;
pub mod message;
pub mod provider;
pub mod session;
pub mod store;
pub mod transport;

pub use auth::{CredentialProvider, StaticCredentials};
pub use config::{SessionConfig, TransportKind};
pub use controller::SessionController;
pub use conversation::ConversationBuilder;
pub use error::SessionError;
pub use message::{
    ContentBlock, ConversationMessage, Role, ToolInvocation, ToolResult, UNKNOWN_TOOL_NAME,
};
pub use provider::PodTransportProvider;
pub use session::{SessionContext, SessionStatus};
pub use store::{FileTranscriptRepository, TranscriptRepository};
pub use transport::{
    AttachHandle, CancelSignal, SessionTransport, TransportProvider, TransportSignal, TurnRequest,
};
