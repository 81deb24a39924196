use std::sync::OnceLock;

use futures_util::StreamExt;
use regex::Regex;
use reqwest::Response;
use tokio::sync::mpsc;
use tracing::debug;

use crate::envelope::{ServiceLogEvent, ServiceLogEventType};
use crate::transport::{await_or_cancel, AttachHandle, CancelSignal, TransportSignal};

pub(crate) const SIGNAL_CHANNEL_CAPACITY: usize = 64;

fn log_prefix_regex() -> &'static Regex {
    static CACHED: OnceLock<Regex> = OnceLock::new();
    CACHED.get_or_init(|| {
        Regex::new(r"(?m)^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(?:\.\d+)?Z \[(?:stdout|stderr)\] ")
            .expect("log prefix regex must compile")
    })
}

/// Strip the per-line `YYYY-MM-DDThh:mm:ssZ [stdout|stderr] ` prefix that the
/// log-replay path prepends to inner agent lines. Lines without the prefix
/// pass through unchanged.
#[must_use]
pub fn strip_log_timestamps(input: &str) -> String {
    log_prefix_regex().replace_all(input, "").into_owned()
}

/// What to do with one decoded envelope line.
#[derive(Debug, PartialEq)]
pub(crate) enum EnvelopeAction {
    /// Forward a signal and keep reading.
    Emit(TransportSignal),
    /// Forward a signal, then the stream is over.
    Final(TransportSignal),
    /// The stream is over without a signal.
    Finished,
    /// Nothing to forward; keep reading.
    Skip,
}

pub(crate) fn classify_envelope_line(line: &str, strip_replay_prefix: bool) -> EnvelopeAction {
    let Ok(event) = serde_json::from_str::<ServiceLogEvent>(line) else {
        debug!(line, "dropping undecodable service envelope line");
        return EnvelopeAction::Skip;
    };

    match event.event_type {
        ServiceLogEventType::Stdout | ServiceLogEventType::Stderr => match event.data {
            Some(data) => {
                let text = if strip_replay_prefix {
                    strip_log_timestamps(&data)
                } else {
                    data
                };
                // Envelope records are line-aligned; restore the newline the
                // NDJSON framing consumed so the decoder sees whole lines.
                let mut bytes = text.into_bytes();
                if !bytes.ends_with(b"\n") {
                    bytes.push(b'\n');
                }
                EnvelopeAction::Emit(TransportSignal::Data(bytes))
            }
            None => EnvelopeAction::Skip,
        },
        ServiceLogEventType::Exit => {
            EnvelopeAction::Final(TransportSignal::Exited(event.exit_code.unwrap_or(-1)))
        }
        ServiceLogEventType::Error => EnvelopeAction::Final(TransportSignal::Failed(
            event
                .data
                .unwrap_or_else(|| "managed process reported an error".to_owned()),
        )),
        ServiceLogEventType::Complete | ServiceLogEventType::Stopped => EnvelopeAction::Finished,
        ServiceLogEventType::Started | ServiceLogEventType::Stopping => {
            debug!(event_type = ?event.event_type, "managed process lifecycle envelope");
            EnvelopeAction::Skip
        }
        ServiceLogEventType::Unknown => EnvelopeAction::Skip,
    }
}

/// Spawn a task that reads a managed-service NDJSON response body and
/// forwards normalized transport signals until the body ends, a terminal
/// envelope arrives, or the cancel flag is raised.
pub(crate) fn spawn_envelope_reader(
    response: Response,
    cancel: CancelSignal,
    strip_replay_prefix: bool,
    announce: Option<AttachHandle>,
) -> mpsc::Receiver<TransportSignal> {
    let (sender, receiver) = mpsc::channel(SIGNAL_CHANNEL_CAPACITY);
    tokio::spawn(run_envelope_reader(
        response,
        sender,
        cancel,
        strip_replay_prefix,
        announce,
    ));
    receiver
}

async fn run_envelope_reader(
    response: Response,
    sender: mpsc::Sender<TransportSignal>,
    cancel: CancelSignal,
    strip_replay_prefix: bool,
    announce: Option<AttachHandle>,
) {
    if let Some(handle) = announce {
        if sender.send(TransportSignal::Attach(handle)).await.is_err() {
            return;
        }
    }

    let mut body = response.bytes_stream();
    let mut buffer = String::new();

    loop {
        let Some(next) = await_or_cancel(body.next(), &cancel).await else {
            debug!("managed stream reader cancelled");
            return;
        };
        let Some(chunk) = next else {
            break;
        };
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(error) => {
                let _ = sender
                    .send(TransportSignal::Failed(error.to_string()))
                    .await;
                return;
            }
        };

        buffer.push_str(&String::from_utf8_lossy(&chunk));
        while let Some(split) = buffer.find('\n') {
            let line: String = buffer.drain(..=split).collect();
            if !forward_line(line.trim_end(), &sender, strip_replay_prefix).await {
                return;
            }
        }
    }

    if !buffer.trim().is_empty() {
        let line = std::mem::take(&mut buffer);
        forward_line(line.trim_end(), &sender, strip_replay_prefix).await;
    }
}

/// Returns false once the stream must stop (terminal envelope or a dropped
/// receiver).
async fn forward_line(
    line: &str,
    sender: &mpsc::Sender<TransportSignal>,
    strip_replay_prefix: bool,
) -> bool {
    if line.is_empty() {
        return true;
    }

    match classify_envelope_line(line, strip_replay_prefix) {
        EnvelopeAction::Emit(signal) => sender.send(signal).await.is_ok(),
        EnvelopeAction::Final(signal) => {
            let _ = sender.send(signal).await;
            false
        }
        EnvelopeAction::Finished => false,
        EnvelopeAction::Skip => true,
    }
}

#[cfg(test)]
mod tests {
    use super::{classify_envelope_line, strip_log_timestamps, EnvelopeAction};
    use crate::transport::TransportSignal;

    #[test]
    fn strips_stdout_prefix_from_replay_line() {
        let input = "2026-02-19T09:13:24.665Z [stdout] {\"type\":\"system\"}\n";
        assert_eq!(strip_log_timestamps(input), "{\"type\":\"system\"}\n");
    }

    #[test]
    fn strips_stderr_prefix_from_replay_line() {
        let input = "2026-02-19T09:13:24.665Z [stderr] some error\n";
        assert_eq!(strip_log_timestamps(input), "some error\n");
    }

    #[test]
    fn leaves_unprefixed_lines_unchanged() {
        let input = "{\"type\":\"system\"}\n";
        assert_eq!(strip_log_timestamps(input), input);
    }

    #[test]
    fn strips_every_line_of_a_multiline_chunk() {
        let input = "2026-02-19T09:13:24.665Z [stdout] line1\n2026-02-19T09:13:25.000Z [stdout] line2";
        assert_eq!(strip_log_timestamps(input), "line1\nline2");
    }

    #[test]
    fn mixed_chunks_strip_only_prefixed_lines() {
        let input = "2026-02-19T09:13:24.665Z [stdout] json\nplain line\n";
        assert_eq!(strip_log_timestamps(input), "json\nplain line\n");
    }

    #[test]
    fn empty_input_stays_empty() {
        assert_eq!(strip_log_timestamps(""), "");
    }

    #[test]
    fn seconds_only_timestamps_are_also_stripped() {
        let input = "2026-02-19T09:13:24Z [stdout] data\n";
        assert_eq!(strip_log_timestamps(input), "data\n");
    }

    #[test]
    fn stdout_envelope_emits_newline_terminated_data() {
        let action = classify_envelope_line(r#"{"type":"stdout","data":"{\"type\":\"system\"}"}"#, false);
        assert_eq!(
            action,
            EnvelopeAction::Emit(TransportSignal::Data(b"{\"type\":\"system\"}\n".to_vec()))
        );
    }

    #[test]
    fn replay_envelope_data_is_stripped_before_emission() {
        let action = classify_envelope_line(
            r#"{"type":"stdout","data":"2026-02-19T09:13:24.665Z [stdout] {\"type\":\"system\"}"}"#,
            true,
        );
        assert_eq!(
            action,
            EnvelopeAction::Emit(TransportSignal::Data(b"{\"type\":\"system\"}\n".to_vec()))
        );
    }

    #[test]
    fn live_envelope_data_is_not_stripped() {
        let action = classify_envelope_line(
            r#"{"type":"stdout","data":"2026-02-19T09:13:24.665Z [stdout] x"}"#,
            false,
        );
        assert_eq!(
            action,
            EnvelopeAction::Emit(TransportSignal::Data(
                b"2026-02-19T09:13:24.665Z [stdout] x\n".to_vec()
            ))
        );
    }

    #[test]
    fn exit_envelope_is_terminal_with_code() {
        let action = classify_envelope_line(r#"{"type":"exit","exit_code":2}"#, false);
        assert_eq!(action, EnvelopeAction::Final(TransportSignal::Exited(2)));
    }

    #[test]
    fn exit_envelope_without_code_defaults_to_minus_one() {
        let action = classify_envelope_line(r#"{"type":"exit"}"#, false);
        assert_eq!(action, EnvelopeAction::Final(TransportSignal::Exited(-1)));
    }

    #[test]
    fn error_envelope_is_terminal_failure() {
        let action = classify_envelope_line(r#"{"type":"error","data":"boom"}"#, false);
        assert_eq!(
            action,
            EnvelopeAction::Final(TransportSignal::Failed("boom".to_owned()))
        );
    }

    #[test]
    fn lifecycle_envelopes_do_not_reach_the_decoder() {
        assert_eq!(
            classify_envelope_line(r#"{"type":"started"}"#, false),
            EnvelopeAction::Skip
        );
        assert_eq!(
            classify_envelope_line(r#"{"type":"stopping"}"#, false),
            EnvelopeAction::Skip
        );
        assert_eq!(
            classify_envelope_line(r#"{"type":"complete"}"#, false),
            EnvelopeAction::Finished
        );
        assert_eq!(
            classify_envelope_line(r#"{"type":"stopped"}"#, false),
            EnvelopeAction::Finished
        );
    }

    #[test]
    fn malformed_envelope_lines_are_skipped() {
        assert_eq!(classify_envelope_line("not json", false), EnvelopeAction::Skip);
    }
}
