use async_trait::async_trait;
use tokio::sync::mpsc;

pub use pod_api::{AttachHandle, CancelSignal, TransportSignal};

use crate::error::SessionError;

/// Everything a transport needs to start one agent turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnRequest {
    pub prompt: String,
    pub resume_session_id: Option<String>,
    pub working_directory: String,
}

/// One transport epoch: a single connection's lifetime.
///
/// `open` hands back the inbound signal stream; the read task behind it must
/// honor the supplied cancel flag. `close` tears the connection down; it is
/// called exactly once per epoch, after the signal stream is finished with.
#[async_trait]
pub trait SessionTransport: Send {
    async fn open(
        &mut self,
        cancel: CancelSignal,
    ) -> Result<mpsc::Receiver<TransportSignal>, SessionError>;

    async fn close(&mut self);
}

/// Seam between the session controller and the wire.
///
/// The controller only ever holds one transport at a time and never touches
/// the network directly, so the whole engine tests against fakes.
#[async_trait]
pub trait TransportProvider: Send + Sync {
    /// Acquire a transport for a fresh turn, creating or replacing the
    /// remote process.
    async fn start_turn(
        &self,
        request: &TurnRequest,
    ) -> Result<Box<dyn SessionTransport>, SessionError>;

    /// Acquire a transport that reattaches to the in-flight remote process.
    async fn reattach(
        &self,
        handle: &AttachHandle,
    ) -> Result<Box<dyn SessionTransport>, SessionError>;

    /// Clear remote lock/state artifacts after a stall, out-of-band of the
    /// event stream, so the retried turn starts clean.
    async fn clear_stalled_turn(&self, request: &TurnRequest) -> Result<(), SessionError>;
}
