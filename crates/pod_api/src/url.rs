use std::collections::BTreeMap;

use url::Url;

use crate::error::PodApiError;

/// Default base URL for the pod instance service.
pub const DEFAULT_POD_BASE_URL: &str = "https://api.podgrid.dev/v1";

/// Normalize a base URL: fall back to the default when empty, drop trailing
/// slashes so path concatenation stays predictable.
#[must_use]
pub fn normalize_pod_base_url(input: &str) -> String {
    let base = if input.trim().is_empty() {
        DEFAULT_POD_BASE_URL
    } else {
        input.trim()
    };

    base.trim_end_matches('/').to_string()
}

pub fn service_url(
    base_url: &str,
    pod: &str,
    service: &str,
    duration: Option<&str>,
) -> Result<Url, PodApiError> {
    let base = normalize_pod_base_url(base_url);
    let mut url = parse(&format!("{base}/pods/{pod}/services/{service}"))?;
    if let Some(duration) = duration {
        url.query_pairs_mut().append_pair("duration", duration);
    }
    Ok(url)
}

pub fn service_logs_url(
    base_url: &str,
    pod: &str,
    service: &str,
    duration: &str,
) -> Result<Url, PodApiError> {
    let base = normalize_pod_base_url(base_url);
    let mut url = parse(&format!("{base}/pods/{pod}/services/{service}/logs"))?;
    url.query_pairs_mut().append_pair("duration", duration);
    Ok(url)
}

/// Build the exec WebSocket URL for a fresh interactive session.
///
/// The command is carried as repeated `cmd` parameters (`bash`, `-c`,
/// command) with environment entries as repeated `env=K=V` pairs.
pub fn exec_session_url(
    base_url: &str,
    pod: &str,
    command: &str,
    env: &BTreeMap<String, String>,
    max_run_after_disconnect: Option<u64>,
) -> Result<Url, PodApiError> {
    let base = normalize_pod_base_url(base_url);
    let mut url = parse(&format!("{base}/pods/{pod}/exec"))?;

    {
        let mut query = url.query_pairs_mut();
        query.append_pair("cmd", "bash");
        query.append_pair("cmd", "-c");
        query.append_pair("cmd", command);

        if let Some(seconds) = max_run_after_disconnect {
            query.append_pair("max_run_after_disconnect", &seconds.to_string());
        }

        for (key, value) in env {
            query.append_pair("env", &format!("{key}={value}"));
        }
    }

    to_ws_scheme(url)
}

/// Build the exec WebSocket URL that reattaches to a running session by id.
pub fn attach_exec_url(base_url: &str, pod: &str, exec_session_id: &str) -> Result<Url, PodApiError> {
    let base = normalize_pod_base_url(base_url);
    let url = parse(&format!("{base}/pods/{pod}/exec/{exec_session_id}"))?;
    to_ws_scheme(url)
}

fn parse(input: &str) -> Result<Url, PodApiError> {
    Url::parse(input).map_err(|_| PodApiError::InvalidBaseUrl(input.to_string()))
}

fn to_ws_scheme(mut url: Url) -> Result<Url, PodApiError> {
    let scheme = match url.scheme() {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        other => {
            return Err(PodApiError::InvalidBaseUrl(format!(
                "unsupported scheme '{other}'"
            )))
        }
    };

    if url.set_scheme(scheme).is_err() {
        return Err(PodApiError::InvalidBaseUrl(url.to_string()));
    }

    Ok(url)
}
