use std::collections::BTreeMap;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;
use url::Url;

use crate::error::PodApiError;
use crate::service::SIGNAL_CHANNEL_CAPACITY;
use crate::transport::{await_or_cancel, AttachHandle, CancelSignal, TransportSignal};

/// Inbound/outbound channel tags of the exec byte protocol.
pub const CHANNEL_INPUT: u8 = 0;
pub const CHANNEL_OUTPUT: u8 = 1;
pub const CHANNEL_DIAGNOSTIC: u8 = 2;
pub const CHANNEL_EXIT: u8 = 3;
pub const CHANNEL_INPUT_EOF: u8 = 4;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Command, environment, and disconnect grace for a fresh exec session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecLaunch {
    pub command: String,
    pub env: BTreeMap<String, String>,
    /// Seconds the remote process may keep running after the socket drops.
    pub max_run_after_disconnect: Option<u64>,
}

impl ExecLaunch {
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            env: BTreeMap::new(),
            max_run_after_disconnect: None,
        }
    }

    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_disconnect_grace(mut self, seconds: u64) -> Self {
        self.max_run_after_disconnect = Some(seconds);
        self
    }
}

/// Interactive exec transport: one persistent multiplexed WebSocket per
/// remote command.
pub struct ExecSession {
    url: Url,
    token: String,
    writer: Option<SplitSink<WsStream, Message>>,
}

impl std::fmt::Debug for ExecSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecSession")
            .field("url", &self.url)
            .field("connected", &self.writer.is_some())
            .finish()
    }
}

impl ExecSession {
    pub(crate) fn new(url: Url, token: String) -> Self {
        Self {
            url,
            token,
            writer: None,
        }
    }

    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Open the socket and start the inbound frame reader.
    ///
    /// The reader honors `cancel` and closes the returned channel when the
    /// socket ends, an exit frame arrives, or cancellation is requested.
    pub async fn connect(
        &mut self,
        cancel: CancelSignal,
    ) -> Result<mpsc::Receiver<TransportSignal>, PodApiError> {
        let mut request = self.url.as_str().into_client_request()?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.token))
            .map_err(|_| PodApiError::WebSocket("invalid bearer token header".to_owned()))?;
        request.headers_mut().insert(AUTHORIZATION, bearer);

        let Some(connected) = await_or_cancel(connect_async(request), &cancel).await else {
            return Err(PodApiError::Cancelled);
        };
        let (stream, _response) = connected?;
        debug!(url = %self.url, "exec websocket connected");

        let (writer, reader) = stream.split();
        self.writer = Some(writer);

        let (sender, receiver) = mpsc::channel(SIGNAL_CHANNEL_CAPACITY);
        tokio::spawn(run_frame_reader(reader, sender, cancel));
        Ok(receiver)
    }

    /// Close the outbound half; the reader ends via its cancel flag or the
    /// server's close frame.
    pub async fn disconnect(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            let _ = writer.send(Message::Close(None)).await;
        }
    }

    /// Send raw bytes to the remote process input channel.
    pub async fn send_input(&mut self, bytes: &[u8]) -> Result<(), PodApiError> {
        self.send_frame(input_frame(bytes)).await
    }

    /// Signal end-of-input to the remote process.
    pub async fn send_input_eof(&mut self) -> Result<(), PodApiError> {
        self.send_frame(input_eof_frame()).await
    }

    async fn send_frame(&mut self, frame: Vec<u8>) -> Result<(), PodApiError> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| PodApiError::WebSocket("exec session is not connected".to_owned()))?;
        writer
            .send(Message::Binary(frame.into()))
            .await
            .map_err(PodApiError::from)
    }
}

async fn run_frame_reader(
    mut reader: SplitStream<WsStream>,
    sender: mpsc::Sender<TransportSignal>,
    cancel: CancelSignal,
) {
    loop {
        let Some(next) = await_or_cancel(reader.next(), &cancel).await else {
            debug!("exec frame reader cancelled");
            return;
        };
        let Some(message) = next else {
            break;
        };
        let message = match message {
            Ok(message) => message,
            Err(error) => {
                let _ = sender
                    .send(TransportSignal::Failed(error.to_string()))
                    .await;
                return;
            }
        };

        match message {
            Message::Binary(data) => match classify_binary_frame(&data) {
                Some(signal @ TransportSignal::Exited(_)) => {
                    let _ = sender.send(signal).await;
                    return;
                }
                Some(signal) => {
                    if sender.send(signal).await.is_err() {
                        return;
                    }
                }
                None => {}
            },
            Message::Text(text) => {
                if let Some(exec_session_id) = parse_session_info(text.as_str()) {
                    let attach = TransportSignal::Attach(AttachHandle::Interactive {
                        exec_session_id,
                    });
                    if sender.send(attach).await.is_err() {
                        return;
                    }
                }
            }
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
        }
    }
}

fn input_frame(bytes: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(bytes.len() + 1);
    frame.push(CHANNEL_INPUT);
    frame.extend_from_slice(bytes);
    frame
}

fn input_eof_frame() -> Vec<u8> {
    vec![CHANNEL_INPUT_EOF]
}

/// Classify one inbound byte frame by its leading channel tag.
fn classify_binary_frame(data: &[u8]) -> Option<TransportSignal> {
    let (&tag, payload) = data.split_first()?;

    match tag {
        CHANNEL_OUTPUT | CHANNEL_DIAGNOSTIC => Some(TransportSignal::Data(payload.to_vec())),
        CHANNEL_EXIT => Some(TransportSignal::Exited(
            payload.first().map(|&code| i32::from(code)).unwrap_or(-1),
        )),
        other => {
            debug!(tag = other, size = payload.len(), "ignoring unknown exec channel tag");
            None
        }
    }
}

/// Extract the exec-session id from a `session_info` control message.
fn parse_session_info(text: &str) -> Option<String> {
    let value: Value = serde_json::from_str(text).ok()?;
    if value.get("type")?.as_str()? != "session_info" {
        return None;
    }
    value
        .get("session_id")?
        .as_str()
        .map(ToOwned::to_owned)
}

#[cfg(test)]
mod tests {
    use super::{
        classify_binary_frame, input_eof_frame, input_frame, parse_session_info, ExecLaunch,
    };
    use crate::transport::TransportSignal;

    #[test]
    fn outbound_frames_carry_the_input_channel_tags() {
        assert_eq!(input_frame(b"ls\n"), b"\x00ls\n");
        assert_eq!(input_eof_frame(), vec![4]);
    }

    #[test]
    fn output_and_diagnostic_frames_both_surface_payload_bytes() {
        assert_eq!(
            classify_binary_frame(b"\x01hello"),
            Some(TransportSignal::Data(b"hello".to_vec()))
        );
        assert_eq!(
            classify_binary_frame(b"\x02warn"),
            Some(TransportSignal::Data(b"warn".to_vec()))
        );
    }

    #[test]
    fn exit_frame_carries_its_code_byte() {
        assert_eq!(
            classify_binary_frame(&[3, 7]),
            Some(TransportSignal::Exited(7))
        );
    }

    #[test]
    fn exit_frame_without_code_defaults_to_minus_one() {
        assert_eq!(classify_binary_frame(&[3]), Some(TransportSignal::Exited(-1)));
    }

    #[test]
    fn unknown_tags_and_empty_frames_are_ignored() {
        assert_eq!(classify_binary_frame(&[9, 1, 2]), None);
        assert_eq!(classify_binary_frame(&[]), None);
    }

    #[test]
    fn session_info_control_message_yields_the_session_id() {
        assert_eq!(
            parse_session_info(r#"{"type":"session_info","session_id":"exec-9"}"#),
            Some("exec-9".to_owned())
        );
    }

    #[test]
    fn other_control_messages_are_ignored() {
        assert_eq!(parse_session_info(r#"{"type":"resize_ack"}"#), None);
        assert_eq!(parse_session_info("not json"), None);
    }

    #[test]
    fn launch_builder_collects_env_and_disconnect_grace() {
        let launch = ExecLaunch::new("run")
            .with_env("A", "1")
            .with_disconnect_grace(300);

        assert_eq!(launch.command, "run");
        assert_eq!(launch.env.get("A").map(String::as_str), Some("1"));
        assert_eq!(launch.max_run_after_disconnect, Some(300));
    }
}
