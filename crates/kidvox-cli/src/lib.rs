//! `kidvox` command-line host.
//!
//! Wires the speech orchestrator to WAV files (or, with the `local-audio`
//! feature, the default speaker and microphone) and the configured speech
//! services. Useful for checking voices, detection and whole lessons
//! without a browser.
#![deny(unsafe_code)]
#![deny(unused_crate_dependencies)]

// Silence unused dev-dependency warnings for the lib test target
#[cfg(test)]
use tempfile as _;

// Used by the binary only
use dotenvy as _;

pub mod bootstrap;
pub mod commands;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod parser;
pub mod presentation;

// Re-export primary types for convenient access
pub use bootstrap::{AudioOutput, CliContext};
pub use commands::{Commands, OutputArgs};
pub use error::{CliError, exit_code};
pub use logging::init_logging;
pub use parser::Cli;
