//! CLI-specific errors and exit codes.

use kidvox_core::{ProviderError, SettingsError};
use kidvox_voice::VoiceError;
use thiserror::Error;

/// CLI-specific error type.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid command-line arguments.
    #[error("Invalid arguments: {0}")]
    Arguments(String),

    /// A required service or device is not configured.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The user interrupted the session (Ctrl+C).
    #[error("Interrupted")]
    Interrupted,

    /// The session event stream ended unexpectedly.
    #[error("Speech session closed unexpectedly")]
    SessionClosed,
}

impl CliError {
    /// Map error to an exit code (sysexits.h where one fits).
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Arguments(_) => 2, // EX_USAGE
            Self::Config(_) => 78,   // EX_CONFIG
            Self::Interrupted => 130,
            Self::SessionClosed => 1,
        }
    }
}

/// Exit code for any error a command returned.
pub fn exit_code(err: &anyhow::Error) -> u8 {
    if let Some(e) = err.downcast_ref::<CliError>() {
        return e.exit_code();
    }
    if err.downcast_ref::<SettingsError>().is_some() {
        return 78; // EX_CONFIG
    }
    if let Some(e) = err.downcast_ref::<VoiceError>() {
        return match e {
            VoiceError::Configuration(_) => 78,
            VoiceError::UnsupportedLanguage | VoiceError::NoScript => 65, // EX_DATAERR
            VoiceError::PermissionDenied(_) | VoiceError::NoInputDevice => 77, // EX_NOPERM
            VoiceError::Io(_) => 74, // EX_IOERR
            VoiceError::Provider(_) | VoiceError::SynthesisFailed(_) => 69, // EX_UNAVAILABLE
            _ => 1,
        };
    }
    if err.downcast_ref::<ProviderError>().is_some() {
        return 69;
    }
    1
}
