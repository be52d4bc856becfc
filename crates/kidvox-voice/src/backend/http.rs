//! Shared HTTP plumbing for the cloud adapters.

use std::time::Duration;

use kidvox_core::ProviderError;
use reqwest::{Client, Response, StatusCode};

/// Identifies the orchestrator to speech services.
pub(crate) const USER_AGENT: &str = concat!("kidvox/", env!("CARGO_PKG_VERSION"));

/// Default per-request budget for speech calls.
pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Build a client with `timeout` and the orchestrator user agent.
pub(crate) fn build_client(timeout: Duration) -> Result<Client, ProviderError> {
    Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| ProviderError::Unavailable(format!("Failed to build HTTP client: {e}")))
}

/// Classify a transport failure.
pub(crate) fn send_error(e: &reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout
    } else {
        ProviderError::Network(e.to_string())
    }
}

/// Classify a non-success status.
pub(crate) fn status_error(status: StatusCode, body: String) -> ProviderError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ProviderError::Unauthorized(format!("{status}: {body}"))
        }
        _ => ProviderError::Status {
            status: status.as_u16(),
            body,
        },
    }
}

/// Pass successful responses through; turn the rest into errors.
pub(crate) async fn check_status(response: Response) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(status_error(status, body))
}
