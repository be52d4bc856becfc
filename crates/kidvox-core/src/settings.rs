//! Settings domain types and validation.
//!
//! Settings are pure data. Hosts fill them from defaults, a `.env` file or
//! the process environment (see [`Settings::from_env`]) and validate them
//! once before assembling a session.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::language::{LanguageProfile, Prosody};
use crate::ports::AudioFormat;

/// Default delay before draining continues after a failed fragment.
pub const DEFAULT_GUARD_DELAY_MS: u64 = 300;

/// Default number of answers a child may give before the session finishes.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default number of characters the language heuristic looks at.
pub const DEFAULT_DETECTION_PREFIX_CHARS: usize = 1000;

/// Default time budget for the remote language-detection call.
pub const DEFAULT_DETECTION_TIMEOUT_MS: u64 = 2500;

/// Environment variable prefix for all settings.
const ENV_PREFIX: &str = "KIDVOX_";

/// Application settings for the speech orchestrator.
///
/// Optional fields fall back to the `DEFAULT_*` constants through the
/// `effective_*` accessors, so partially filled settings stay usable.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Cloud speech region, e.g. `"westeurope"`. Required for cloud providers.
    pub speech_region: Option<String>,

    /// Subscription key exchanged for short-lived bearer tokens.
    pub speech_key: Option<String>,

    /// Override for the token-issuing endpoint.
    pub token_endpoint: Option<String>,

    /// Remote language-detection endpoint. Detection is local-only when unset.
    pub detection_endpoint: Option<String>,

    /// Time budget for the remote detection call.
    pub detection_timeout_ms: Option<u64>,

    /// Number of leading characters the local heuristic inspects.
    pub detection_prefix_chars: Option<usize>,

    /// Delay before continuing after a failed fragment.
    pub guard_delay_ms: Option<u64>,

    /// Answers allowed before the session finishes (1-10).
    pub max_attempts: Option<u32>,

    /// Audio encoding requested from the synthesis provider.
    pub output_format: Option<AudioFormat>,

    /// Whether to fall back to the built-in `espeak-ng` engine.
    pub fallback_engine: Option<bool>,

    /// Per-language prosody overrides keyed by primary language code
    /// (`"uz"`, `"ru"`, `"en"`).
    pub prosody_overrides: BTreeMap<String, Prosody>,

    /// Microphone endpointing and interim-result tuning.
    pub recognition: RecognitionSettings,
}

/// Endpointing parameters for microphone capture.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RecognitionSettings {
    /// Sample rate audio is captured and uploaded at.
    pub sample_rate: u32,

    /// RMS energy above which a frame counts as speech.
    pub energy_threshold: f32,

    /// Speech must last this long before an utterance starts.
    pub min_speech_ms: u32,

    /// Silence after speech that ends the utterance.
    pub trailing_silence_ms: u32,

    /// Give up with "no speech" when nothing is heard for this long.
    pub no_speech_timeout_ms: u32,

    /// Hard cap on one utterance.
    pub max_utterance_ms: u32,

    /// Interval between interim results in press-and-hold mode.
    pub partial_interval_ms: u32,

    /// How often captured audio is polled for endpointing.
    pub poll_interval_ms: u32,
}

impl Default for RecognitionSettings {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            energy_threshold: 0.01,
            min_speech_ms: 250,
            trailing_silence_ms: 800,
            no_speech_timeout_ms: 5_000,
            max_utterance_ms: 10_000,
            partial_interval_ms: 1_500,
            poll_interval_ms: 100,
        }
    }
}

impl Settings {
    /// Create settings with sensible defaults.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self {
            speech_region: None,
            speech_key: None,
            token_endpoint: None,
            detection_endpoint: None,
            detection_timeout_ms: Some(DEFAULT_DETECTION_TIMEOUT_MS),
            detection_prefix_chars: Some(DEFAULT_DETECTION_PREFIX_CHARS),
            guard_delay_ms: Some(DEFAULT_GUARD_DELAY_MS),
            max_attempts: Some(DEFAULT_MAX_ATTEMPTS),
            output_format: Some(AudioFormat::default()),
            fallback_engine: Some(true),
            prosody_overrides: BTreeMap::new(),
            recognition: RecognitionSettings::default(),
        }
    }

    /// Read settings from `KIDVOX_*` environment variables on top of the
    /// defaults. Hosts load `.env` (via `dotenvy`) before calling this.
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) but with an injectable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, SettingsError> {
        let get = |name: &str| {
            lookup(&format!("{ENV_PREFIX}{name}"))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut settings = Self::with_defaults();
        settings.speech_region = get("SPEECH_REGION");
        settings.speech_key = get("SPEECH_KEY");
        settings.token_endpoint = get("TOKEN_ENDPOINT");
        settings.detection_endpoint = get("DETECT_ENDPOINT");

        if let Some(v) = get("DETECT_TIMEOUT_MS") {
            settings.detection_timeout_ms = Some(parse_var("DETECT_TIMEOUT_MS", &v)?);
        }
        if let Some(v) = get("GUARD_DELAY_MS") {
            settings.guard_delay_ms = Some(parse_var("GUARD_DELAY_MS", &v)?);
        }
        if let Some(v) = get("MAX_ATTEMPTS") {
            settings.max_attempts = Some(parse_var("MAX_ATTEMPTS", &v)?);
        }
        if let Some(v) = get("FALLBACK_ENGINE") {
            settings.fallback_engine = Some(parse_bool("FALLBACK_ENGINE", &v)?);
        }

        tracing::debug!(
            region = settings.speech_region.as_deref().unwrap_or("<unset>"),
            has_key = settings.speech_key.is_some(),
            remote_detection = settings.detection_endpoint.is_some(),
            "Loaded settings from environment"
        );

        Ok(settings)
    }

    /// Delay before continuing after a failed fragment.
    #[must_use]
    pub fn effective_guard_delay_ms(&self) -> u64 {
        self.guard_delay_ms.unwrap_or(DEFAULT_GUARD_DELAY_MS)
    }

    /// Answers allowed before the session finishes.
    #[must_use]
    pub fn effective_max_attempts(&self) -> u32 {
        self.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS)
    }

    /// Characters inspected by the local heuristic.
    #[must_use]
    pub fn effective_detection_prefix_chars(&self) -> usize {
        self.detection_prefix_chars
            .unwrap_or(DEFAULT_DETECTION_PREFIX_CHARS)
    }

    /// Time budget for remote detection.
    #[must_use]
    pub fn effective_detection_timeout_ms(&self) -> u64 {
        self.detection_timeout_ms
            .unwrap_or(DEFAULT_DETECTION_TIMEOUT_MS)
    }

    /// Output encoding for synthesis.
    #[must_use]
    pub fn effective_output_format(&self) -> AudioFormat {
        self.output_format.unwrap_or_default()
    }

    /// Whether the built-in fallback engine is enabled.
    #[must_use]
    pub fn effective_fallback_engine(&self) -> bool {
        self.fallback_engine.unwrap_or(true)
    }

    /// Prosody for a profile: an override for its language, else the
    /// locale's fixed constants.
    #[must_use]
    pub fn effective_prosody(&self, profile: &LanguageProfile) -> Prosody {
        let primary = profile
            .code
            .split(['-', '_'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        self.prosody_overrides
            .get(&primary)
            .copied()
            .unwrap_or_else(|| profile.prosody())
    }

    /// Token-issuing endpoint (explicit override or derived from the region).
    #[must_use]
    pub fn token_endpoint(&self) -> Option<String> {
        self.token_endpoint.clone().or_else(|| {
            self.speech_region.as_ref().map(|region| {
                format!("https://{region}.api.cognitive.microsoft.com/sts/v1.0/issueToken")
            })
        })
    }

    /// Synthesis endpoint derived from the region.
    #[must_use]
    pub fn synthesis_endpoint(&self) -> Option<String> {
        self.speech_region
            .as_ref()
            .map(|region| format!("https://{region}.tts.speech.microsoft.com/cognitiveservices/v1"))
    }

    /// Short-utterance recognition endpoint derived from the region.
    #[must_use]
    pub fn recognition_endpoint(&self) -> Option<String> {
        self.speech_region.as_ref().map(|region| {
            format!(
                "https://{region}.stt.speech.microsoft.com/speech/recognition/conversation/cognitiveservices/v1"
            )
        })
    }

    /// Whether enough is configured to use the cloud providers.
    #[must_use]
    pub const fn has_cloud_credentials(&self) -> bool {
        self.speech_region.is_some() && self.speech_key.is_some()
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, SettingsError> {
    value.parse().map_err(|_| SettingsError::InvalidVariable {
        name: format!("{ENV_PREFIX}{name}"),
        value: value.to_string(),
    })
}

fn parse_bool(name: &str, value: &str) -> Result<bool, SettingsError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(SettingsError::InvalidVariable {
            name: format!("{ENV_PREFIX}{name}"),
            value: value.to_string(),
        }),
    }
}

/// Settings validation error.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("Environment variable {name} has an invalid value: {value:?}")]
    InvalidVariable { name: String, value: String },

    #[error("Speech region cannot be empty")]
    EmptyRegion,

    #[error("Endpoint must be an http(s) URL, got {0:?}")]
    InvalidEndpoint(String),

    #[error("Max attempts must be between 1 and 10, got {0}")]
    InvalidMaxAttempts(u32),

    #[error("Detection prefix must be between 100 and 10,000 characters, got {0}")]
    InvalidDetectionPrefix(usize),

    #[error("Detection timeout must be positive")]
    ZeroDetectionTimeout,

    #[error("Prosody override for {code:?} is out of range (rate 0.5-2.0, pitch -50..50%)")]
    InvalidProsody { code: String },

    #[error("Energy threshold must be between 0 and 1 (exclusive)")]
    InvalidEnergyThreshold,

    #[error("Trailing silence ({silence_ms} ms) must be shorter than the max utterance ({max_ms} ms)")]
    InvalidEndpointing { silence_ms: u32, max_ms: u32 },
}

/// Validate settings values.
pub fn validate_settings(settings: &Settings) -> Result<(), SettingsError> {
    if settings
        .speech_region
        .as_ref()
        .is_some_and(|r| r.trim().is_empty())
    {
        return Err(SettingsError::EmptyRegion);
    }

    for endpoint in [&settings.token_endpoint, &settings.detection_endpoint]
        .into_iter()
        .flatten()
    {
        if !(endpoint.starts_with("https://") || endpoint.starts_with("http://")) {
            return Err(SettingsError::InvalidEndpoint(endpoint.clone()));
        }
    }

    if let Some(attempts) = settings.max_attempts {
        if !(1..=10).contains(&attempts) {
            return Err(SettingsError::InvalidMaxAttempts(attempts));
        }
    }

    if let Some(prefix) = settings.detection_prefix_chars {
        if !(100..=10_000).contains(&prefix) {
            return Err(SettingsError::InvalidDetectionPrefix(prefix));
        }
    }

    if settings.detection_timeout_ms == Some(0) {
        return Err(SettingsError::ZeroDetectionTimeout);
    }

    for (code, prosody) in &settings.prosody_overrides {
        if !(0.5..=2.0).contains(&prosody.rate) || !(-50..=50).contains(&prosody.pitch_percent) {
            return Err(SettingsError::InvalidProsody { code: code.clone() });
        }
    }

    let rec = &settings.recognition;
    if !(rec.energy_threshold > 0.0 && rec.energy_threshold < 1.0) {
        return Err(SettingsError::InvalidEnergyThreshold);
    }
    if rec.trailing_silence_ms >= rec.max_utterance_ms {
        return Err(SettingsError::InvalidEndpointing {
            silence_ms: rec.trailing_silence_ms,
            max_ms: rec.max_utterance_ms,
        });
    }

    Ok(())
}
