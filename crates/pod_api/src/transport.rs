use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Shared cancellation flag checked at loop boundaries by every read task.
pub type CancelSignal = Arc<AtomicBool>;

pub const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(25);

#[must_use]
pub fn new_cancel_signal() -> CancelSignal {
    Arc::new(AtomicBool::new(false))
}

#[must_use]
pub fn is_cancelled(cancel: &CancelSignal) -> bool {
    cancel.load(Ordering::Acquire)
}

/// Awaits a future while polling the cancellation flag.
///
/// Returns `None` when cancellation was requested, including when it was
/// requested while the future was completing; cancellation wins over output.
pub async fn await_or_cancel<F>(future: F, cancel: &CancelSignal) -> Option<F::Output>
where
    F: Future,
{
    let mut future = Box::pin(future);

    loop {
        if is_cancelled(cancel) {
            return None;
        }

        if let Ok(output) = tokio::time::timeout(CANCEL_POLL_INTERVAL, &mut future).await {
            if is_cancelled(cancel) {
                return None;
            }
            return Some(output);
        }
    }
}

/// Handle by which an in-flight remote process can be reattached after a
/// dropped connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachHandle {
    /// Interactive exec channel, reopened by exec-session id.
    Interactive { exec_session_id: String },
    /// Managed process whose output log is re-readable by service name.
    Managed { service_name: String },
}

/// Wire-neutral signal emitted by both transport variants.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportSignal {
    /// Raw bytes destined for the line decoder.
    Data(Vec<u8>),
    /// Reattachment handle announced by the transport.
    Attach(AttachHandle),
    /// Remote process exited with a code; the stream ends after this.
    Exited(i32),
    /// Transport-level failure; the stream ends after this.
    Failed(String),
}
