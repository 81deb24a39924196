use std::collections::BTreeMap;

use crate::config::PodApiConfig;
use crate::error::PodApiError;

pub const HEADER_AUTHORIZATION: &str = "authorization";
pub const HEADER_ACCEPT: &str = "accept";
pub const HEADER_CONTENT_TYPE: &str = "content-type";
pub const HEADER_USER_AGENT: &str = "user-agent";

/// Build a deterministic header map for instance-service requests.
pub fn build_headers(config: &PodApiConfig) -> Result<BTreeMap<String, String>, PodApiError> {
    if config.access_token.trim().is_empty() {
        return Err(PodApiError::MissingAccessToken);
    }

    let mut headers = BTreeMap::new();
    headers.insert(
        HEADER_AUTHORIZATION.to_owned(),
        format!("Bearer {}", config.access_token.trim()),
    );
    headers.insert(HEADER_ACCEPT.to_owned(), "application/json".to_owned());
    headers.insert(
        HEADER_CONTENT_TYPE.to_owned(),
        "application/json".to_owned(),
    );
    headers.insert(
        HEADER_USER_AGENT.to_owned(),
        config
            .user_agent
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(ToOwned::to_owned)
            .unwrap_or_else(default_user_agent),
    );

    Ok(headers)
}

fn default_user_agent() -> String {
    format!("tether/{}", env!("CARGO_PKG_VERSION"))
}
