use std::sync::Arc;

use async_trait::async_trait;
use pod_api::{
    AttachHandle, CancelSignal, ExecLaunch, ExecSession, PodApiClient, PodApiConfig, PodApiError,
    ServiceRequest, TransportSignal,
};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::auth::CredentialProvider;
use crate::config::{SessionConfig, TransportKind};
use crate::error::SessionError;
use crate::launch::{agent_turn_command, redact_secrets, with_token_export, AGENT_TOKEN_ENV};
use crate::transport::{SessionTransport, TransportProvider, TurnRequest};

/// Concrete [`TransportProvider`] over the pod instance service.
///
/// Builds the remote agent command per turn, injects credentials at dispatch
/// time, and hands the controller a wire-appropriate transport.
pub struct PodTransportProvider {
    config: SessionConfig,
    credentials: Arc<dyn CredentialProvider>,
    base_url: String,
}

impl PodTransportProvider {
    #[must_use]
    pub fn new(
        config: SessionConfig,
        credentials: Arc<dyn CredentialProvider>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            config,
            credentials,
            base_url: base_url.into(),
        }
    }

    fn client(&self) -> Result<PodApiClient, SessionError> {
        let token = self
            .credentials
            .pod_token()
            .ok_or(SessionError::MissingPodToken)?;
        let api_config = PodApiConfig::new(token).with_base_url(self.base_url.clone());
        PodApiClient::new(api_config).map_err(SessionError::from)
    }

    fn service_name(&self) -> String {
        format!("chat-{}", self.config.conversation_id)
    }
}

#[async_trait]
impl TransportProvider for PodTransportProvider {
    async fn start_turn(
        &self,
        request: &TurnRequest,
    ) -> Result<Box<dyn SessionTransport>, SessionError> {
        let agent_token = self
            .credentials
            .agent_token()
            .ok_or(SessionError::MissingAgentToken)?;
        let client = self.client()?;

        let command = agent_turn_command(
            &request.working_directory,
            &self.config.agent_command,
            &request.prompt,
            request.resume_session_id.as_deref(),
        );
        debug!(command = %redact_secrets(&command), "dispatching agent turn");

        match self.config.transport {
            TransportKind::Interactive => {
                let mut launch =
                    ExecLaunch::new(command).with_env(AGENT_TOKEN_ENV, agent_token);
                if let Some(grace) = self.config.disconnect_grace_secs {
                    launch = launch.with_disconnect_grace(grace);
                }
                let session = client.create_exec_session(&self.config.pod_name, &launch)?;
                Ok(Box::new(ExecTurnTransport { session }))
            }
            TransportKind::Managed => Ok(Box::new(ManagedTurnTransport {
                client,
                pod: self.config.pod_name.clone(),
                service: self.service_name(),
                duration: self.config.service_duration.clone(),
                mode: ManagedMode::Start(ServiceRequest::shell(with_token_export(
                    &command,
                    &agent_token,
                ))),
                cancel: None,
            })),
        }
    }

    async fn reattach(
        &self,
        handle: &AttachHandle,
    ) -> Result<Box<dyn SessionTransport>, SessionError> {
        let client = self.client()?;

        match handle {
            AttachHandle::Interactive { exec_session_id } => {
                let session = client.attach_exec_session(&self.config.pod_name, exec_session_id)?;
                Ok(Box::new(ExecTurnTransport { session }))
            }
            AttachHandle::Managed { service_name } => Ok(Box::new(ManagedTurnTransport {
                client,
                pod: self.config.pod_name.clone(),
                service: service_name.clone(),
                duration: self.config.service_duration.clone(),
                mode: ManagedMode::Replay,
                cancel: None,
            })),
        }
    }

    async fn clear_stalled_turn(&self, _request: &TurnRequest) -> Result<(), SessionError> {
        // Deleting the managed process drops whatever lock/state the stalled
        // attempt left behind; the retry recreates it from scratch. A missing
        // service means there is nothing to clear.
        let client = self.client()?;
        match client
            .delete_service(&self.config.pod_name, &self.service_name())
            .await
        {
            Ok(()) | Err(PodApiError::NotFound) => Ok(()),
            Err(error) => {
                warn!(%error, "failed to clear stalled remote state");
                Ok(())
            }
        }
    }
}

/// Interactive exec channel bound to one turn.
struct ExecTurnTransport {
    session: ExecSession,
}

#[async_trait]
impl SessionTransport for ExecTurnTransport {
    async fn open(
        &mut self,
        cancel: CancelSignal,
    ) -> Result<mpsc::Receiver<TransportSignal>, SessionError> {
        self.session.connect(cancel).await.map_err(SessionError::from)
    }

    async fn close(&mut self) {
        self.session.disconnect().await;
    }
}

enum ManagedMode {
    /// Create or replace the managed process.
    Start(ServiceRequest),
    /// Read-only history + live tail of the running process.
    Replay,
}

struct ManagedTurnTransport {
    client: PodApiClient,
    pod: String,
    service: String,
    duration: String,
    mode: ManagedMode,
    cancel: Option<CancelSignal>,
}

#[async_trait]
impl SessionTransport for ManagedTurnTransport {
    async fn open(
        &mut self,
        cancel: CancelSignal,
    ) -> Result<mpsc::Receiver<TransportSignal>, SessionError> {
        self.cancel = Some(cancel.clone());

        let signals = match &self.mode {
            ManagedMode::Start(request) => {
                self.client
                    .start_service(&self.pod, &self.service, request, &self.duration, &cancel)
                    .await?
            }
            ManagedMode::Replay => {
                self.client
                    .stream_service_logs(&self.pod, &self.service, &self.duration, &cancel)
                    .await?
            }
        };

        Ok(signals)
    }

    async fn close(&mut self) {
        // The reader task holds no socket of its own; raising the epoch
        // cancel flag is the whole teardown.
        if let Some(cancel) = self.cancel.take() {
            cancel.store(true, std::sync::atomic::Ordering::Release);
        }
    }
}
