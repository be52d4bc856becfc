//! Language profiles: the voice and recognition locale chosen for a script.
//!
//! A [`LanguageProfile`] is computed once per script (or per text block) and
//! cached for the lifetime of one session activation. It is never mutated;
//! a new detection replaces it wholesale.

use serde::{Deserialize, Serialize};

/// How a profile was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Confidence {
    /// Reported by the remote detection service.
    Certain,
    /// Inferred locally from letters, stop words or script ratios.
    Heuristic,
    /// Pinned by the host without any detection.
    None,
}

/// Languages the orchestrator can speak and listen in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Language {
    /// Uzbek, in either Latin or Cyrillic script.
    Uzbek,
    Russian,
    English,
}

/// Speaking rate and pitch applied to every fragment of a language.
///
/// Values are fixed per locale and tuned for a child audience: slowed down
/// with a slightly lowered pitch. They are configuration, not negotiated with
/// the provider at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prosody {
    /// Rate multiplier (1.0 = provider default).
    pub rate: f32,
    /// Pitch offset in percent (negative = lower).
    pub pitch_percent: i8,
}

impl Prosody {
    /// SSML `rate` attribute value, e.g. `-15%`.
    #[must_use]
    pub fn rate_attr(&self) -> String {
        #[allow(clippy::cast_possible_truncation)] // rate is a small multiplier
        let percent = ((self.rate - 1.0) * 100.0).round() as i32;
        format!("{percent:+}%")
    }

    /// SSML `pitch` attribute value, e.g. `-5%`.
    #[must_use]
    pub fn pitch_attr(&self) -> String {
        format!("{:+}%", self.pitch_percent)
    }

    /// Words-per-minute for engines that take an absolute speed
    /// (`espeak-ng` defaults to 175 wpm).
    #[must_use]
    pub fn words_per_minute(&self) -> u32 {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let wpm = (175.0 * self.rate).round().max(80.0) as u32;
        wpm
    }

    /// Pitch on the `espeak-ng` 0–99 scale (50 = default).
    #[must_use]
    pub fn espeak_pitch(&self) -> u8 {
        let pitch = 50 + i16::from(self.pitch_percent) / 2;
        #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
        let clamped = pitch.clamp(0, 99) as u8;
        clamped
    }
}

impl Language {
    /// All supported languages, in detection tie-break order.
    pub const ALL: [Self; 3] = [Self::Uzbek, Self::Russian, Self::English];

    /// BCP-47 locale used for synthesis and as the profile code.
    #[must_use]
    pub const fn locale(self) -> &'static str {
        match self {
            Self::Uzbek => "uz-UZ",
            Self::Russian => "ru-RU",
            Self::English => "en-US",
        }
    }

    /// Default neural voice for the cloud synthesis provider.
    #[must_use]
    pub const fn default_voice(self) -> &'static str {
        match self {
            Self::Uzbek => "uz-UZ-MadinaNeural",
            Self::Russian => "ru-RU-SvetlanaNeural",
            Self::English => "en-US-JennyNeural",
        }
    }

    /// Voice name for the built-in `espeak-ng` fallback engine.
    #[must_use]
    pub const fn espeak_voice(self) -> &'static str {
        match self {
            Self::Uzbek => "uz",
            Self::Russian => "ru",
            Self::English => "en-us",
        }
    }

    /// Fixed prosody for this locale.
    #[must_use]
    pub const fn prosody(self) -> Prosody {
        match self {
            Self::Uzbek | Self::Russian => Prosody {
                rate: 0.85,
                pitch_percent: -5,
            },
            Self::English => Prosody {
                rate: 0.9,
                pitch_percent: -5,
            },
        }
    }

    /// Parse a language code such as `"uz"`, `"uz-UZ"`, `"uz-Cyrl"` or
    /// `"RU_ru"`. Only the primary subtag is considered.
    #[must_use]
    pub fn from_code(code: &str) -> Option<Self> {
        let primary = code
            .trim()
            .split(['-', '_'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        match primary.as_str() {
            "uz" | "uzb" => Some(Self::Uzbek),
            "ru" | "rus" => Some(Self::Russian),
            "en" | "eng" => Some(Self::English),
            _ => None,
        }
    }
}

/// The voice and recognition locale selected for a script.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LanguageProfile {
    /// Profile code, e.g. `"uz-UZ"`.
    pub code: String,
    /// Locale handed to the recognition provider.
    pub recognition_locale: String,
    /// Voice handed to the synthesis provider.
    pub synthesis_voice: String,
    /// How the profile was obtained.
    pub confidence: Confidence,
}

impl LanguageProfile {
    /// Build the standard profile for a supported language.
    #[must_use]
    pub fn for_language(language: Language, confidence: Confidence) -> Self {
        Self {
            code: language.locale().to_string(),
            recognition_locale: language.locale().to_string(),
            synthesis_voice: language.default_voice().to_string(),
            confidence,
        }
    }

    /// The supported language this profile maps to, if any.
    ///
    /// Profiles returned by the remote service may carry a code outside the
    /// supported set; those still play through the cloud provider but have no
    /// built-in fallback voice or fixed prosody.
    #[must_use]
    pub fn language(&self) -> Option<Language> {
        Language::from_code(&self.code)
    }

    /// Prosody for this profile, falling back to the provider default.
    #[must_use]
    pub fn prosody(&self) -> Prosody {
        self.language().map_or(
            Prosody {
                rate: 1.0,
                pitch_percent: 0,
            },
            Language::prosody,
        )
    }
}
