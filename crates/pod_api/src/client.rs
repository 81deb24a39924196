use std::future::Future;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Response};
use tokio::sync::mpsc;
use tracing::info;

use crate::config::PodApiConfig;
use crate::envelope::ServiceRequest;
use crate::error::PodApiError;
use crate::exec::{ExecLaunch, ExecSession};
use crate::headers::build_headers;
use crate::service::spawn_envelope_reader;
use crate::transport::{await_or_cancel, AttachHandle, CancelSignal, TransportSignal};
use crate::url::{attach_exec_url, exec_session_url, service_logs_url, service_url};

/// Cap on service deletion so an unresponsive pod cannot block callers.
const DELETE_SERVICE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug)]
pub struct PodApiClient {
    http: Client,
    config: PodApiConfig,
}

impl PodApiClient {
    pub fn new(config: PodApiConfig) -> Result<Self, PodApiError> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(PodApiError::from)?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &PodApiConfig {
        &self.config
    }

    /// Create or replace the managed process and stream its live envelope
    /// output. The first signal announces the managed attach handle.
    pub async fn start_service(
        &self,
        pod: &str,
        service: &str,
        request: &ServiceRequest,
        duration: &str,
        cancel: &CancelSignal,
    ) -> Result<mpsc::Receiver<TransportSignal>, PodApiError> {
        let url = service_url(&self.config.base_url, pod, service, Some(duration))?;
        let headers = self.request_headers()?;
        info!(pod, service, "starting managed process");

        let send = self.http.put(url).headers(headers).json(request).send();
        let response = complete(send, cancel).await?;
        let response = ensure_success(response, cancel).await?;

        Ok(spawn_envelope_reader(
            response,
            cancel.clone(),
            false,
            Some(AttachHandle::Managed {
                service_name: service.to_owned(),
            }),
        ))
    }

    /// Reattach to a managed process: an idempotent read-only request that
    /// replays full history, then tails live output. Replay lines carry the
    /// timestamp prefix, which the reader strips.
    pub async fn stream_service_logs(
        &self,
        pod: &str,
        service: &str,
        duration: &str,
        cancel: &CancelSignal,
    ) -> Result<mpsc::Receiver<TransportSignal>, PodApiError> {
        let url = service_logs_url(&self.config.base_url, pod, service, duration)?;
        let headers = self.request_headers()?;
        info!(pod, service, "reattaching to managed process logs");

        let send = self.http.get(url).headers(headers).send();
        let response = complete(send, cancel).await?;
        let response = ensure_success(response, cancel).await?;

        Ok(spawn_envelope_reader(response, cancel.clone(), true, None))
    }

    /// Delete the managed process.
    pub async fn delete_service(&self, pod: &str, service: &str) -> Result<(), PodApiError> {
        let url = service_url(&self.config.base_url, pod, service, None)?;
        let headers = self.request_headers()?;
        info!(pod, service, "deleting managed process");

        let response = self
            .http
            .delete(url)
            .headers(headers)
            .timeout(DELETE_SERVICE_TIMEOUT)
            .send()
            .await
            .map_err(PodApiError::from)?;

        if response.status().is_success() {
            return Ok(());
        }

        let status = response.status();
        let body = response.text().await.ok();
        Err(PodApiError::from_status(status, body))
    }

    /// Build an interactive exec session running one shell command on a pod.
    pub fn create_exec_session(
        &self,
        pod: &str,
        launch: &ExecLaunch,
    ) -> Result<ExecSession, PodApiError> {
        let token = self.bearer_token()?;
        let url = exec_session_url(
            &self.config.base_url,
            pod,
            &launch.command,
            &launch.env,
            launch.max_run_after_disconnect,
        )?;
        Ok(ExecSession::new(url, token))
    }

    /// Build an exec session that reattaches to a running command by id.
    pub fn attach_exec_session(
        &self,
        pod: &str,
        exec_session_id: &str,
    ) -> Result<ExecSession, PodApiError> {
        let token = self.bearer_token()?;
        let url = attach_exec_url(&self.config.base_url, pod, exec_session_id)?;
        Ok(ExecSession::new(url, token))
    }

    fn bearer_token(&self) -> Result<String, PodApiError> {
        let token = self.config.access_token.trim();
        if token.is_empty() {
            return Err(PodApiError::MissingAccessToken);
        }
        Ok(token.to_owned())
    }

    fn request_headers(&self) -> Result<HeaderMap, PodApiError> {
        let headers = build_headers(&self.config)?;
        let mut out = HeaderMap::new();
        for (key, value) in headers {
            out.insert(
                HeaderName::from_bytes(key.as_bytes())
                    .map_err(|_| PodApiError::InvalidBaseUrl(format!("invalid header key: {key}")))?,
                HeaderValue::from_str(&value).map_err(|_| {
                    PodApiError::InvalidBaseUrl(format!("invalid header value for {key}"))
                })?,
            );
        }
        Ok(out)
    }
}

async fn complete<F>(future: F, cancel: &CancelSignal) -> Result<Response, PodApiError>
where
    F: Future<Output = Result<Response, reqwest::Error>>,
{
    match await_or_cancel(future, cancel).await {
        None => Err(PodApiError::Cancelled),
        Some(result) => result.map_err(PodApiError::from),
    }
}

async fn ensure_success(response: Response, cancel: &CancelSignal) -> Result<Response, PodApiError> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let body = match await_or_cancel(response.text(), cancel).await {
        None => return Err(PodApiError::Cancelled),
        Some(Ok(text)) => Some(text),
        Some(Err(_)) => None,
    };
    Err(PodApiError::from_status(status, body))
}
