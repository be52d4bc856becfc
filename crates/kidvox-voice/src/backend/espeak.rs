//! Built-in fallback synthesis via the `espeak-ng` command-line engine.
//!
//! Lower fidelity than the cloud voices but always local. The child
//! process writes a WAV clip to stdout and is killed if the request is
//! dropped (playback cancelled).

use std::io::ErrorKind;
use std::process::Stdio;

use async_trait::async_trait;
use kidvox_core::{Language, ProviderError, SynthesisProvider, SynthesisRequest, SynthesizedAudio};
use tokio::process::Command;

/// Default executable name.
pub const DEFAULT_PROGRAM: &str = "espeak-ng";

/// Fallback provider spawning `espeak-ng` per fragment.
#[derive(Debug, Clone)]
pub struct EspeakSynthesisProvider {
    program: String,
}

impl Default for EspeakSynthesisProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl EspeakSynthesisProvider {
    /// Provider using `espeak-ng` from `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_program(DEFAULT_PROGRAM)
    }

    /// Provider using a specific executable.
    #[must_use]
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Whether the executable can be started.
    pub async fn is_available(&self) -> bool {
        Command::new(&self.program)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .is_ok_and(|status| status.success())
    }
}

/// `espeak-ng` voice for a locale: the built-in table for supported
/// languages, otherwise the primary subtag.
fn espeak_voice(locale: &str) -> String {
    Language::from_code(locale).map_or_else(
        || {
            locale
                .split(['-', '_'])
                .next()
                .unwrap_or_default()
                .to_ascii_lowercase()
        },
        |language| language.espeak_voice().to_string(),
    )
}

fn espeak_args(request: &SynthesisRequest) -> Vec<String> {
    vec![
        "--stdout".to_string(),
        "-v".to_string(),
        espeak_voice(&request.locale),
        "-s".to_string(),
        request.prosody.words_per_minute().to_string(),
        "-p".to_string(),
        request.prosody.espeak_pitch().to_string(),
        // End of options; the fragment may start with '-'.
        "--".to_string(),
        request.text.clone(),
    ]
}

#[async_trait]
impl SynthesisProvider for EspeakSynthesisProvider {
    fn name(&self) -> &str {
        "espeak-ng"
    }

    async fn synthesize(&self, request: &SynthesisRequest) -> Result<SynthesizedAudio, ProviderError> {
        let args = espeak_args(request);
        tracing::debug!(program = %self.program, voice = %args[2], "Running fallback synthesis");

        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => {
                    ProviderError::Unavailable(format!("{} is not installed", self.program))
                }
                _ => ProviderError::Unavailable(format!("Failed to run {}: {e}", self.program)),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProviderError::Unavailable(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }
        if output.stdout.is_empty() {
            return Err(ProviderError::InvalidResponse(format!(
                "{} produced no audio",
                self.program
            )));
        }

        // WAV carries its real sample rate in the header.
        Ok(SynthesizedAudio {
            bytes: output.stdout,
            format: request.output_format,
        })
    }
}
