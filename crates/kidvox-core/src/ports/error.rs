//! Errors reported by speech provider ports.

use thiserror::Error;

/// Failure of a synthesis, recognition or detection provider call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    /// Connection-level failure (DNS, reset, TLS).
    #[error("Network error: {0}")]
    Network(String),

    /// The provider did not answer in time.
    #[error("Provider timed out")]
    Timeout,

    /// The provider answered with an unexpected HTTP status.
    #[error("Provider returned status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body (truncated by the caller).
        body: String,
    },

    /// Credentials were rejected or could not be issued.
    #[error("Provider rejected credentials: {0}")]
    Unauthorized(String),

    /// The host blocked access to the microphone or audio output.
    #[error("Device permission denied: {0}")]
    PermissionDenied(String),

    /// Recognition completed but heard no speech.
    #[error("No speech detected")]
    NoSpeech,

    /// The provider is not configured or not installed.
    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    /// The provider answered with something we could not use.
    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// Whether a single silent retry is worthwhile.
    ///
    /// Network blips, timeouts, throttling (429) and server errors (5xx) are
    /// transient; everything else fails the same way on a retry.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}
