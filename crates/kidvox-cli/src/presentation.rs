//! Terminal rendering of session events and profiles.

use kidvox_core::{LanguageProfile, SessionEvent};

/// One line for an event, or `None` for events not worth printing.
pub fn describe(event: &SessionEvent) -> Option<String> {
    match event {
        SessionEvent::StateChanged(state) => Some(format!("[{state}]")),
        SessionEvent::FragmentStarted { index, text } => Some(format!("  > {}: {text}", index + 1)),
        SessionEvent::FragmentFinished { .. } => None,
        SessionEvent::Transcript(t) if t.is_final => Some(format!("  heard: {}", t.text)),
        SessionEvent::Transcript(t) => Some(format!("  hearing: {}...", t.text)),
        SessionEvent::Notice(notice) => Some(format!("  ! {}", notice.message())),
        SessionEvent::HardStopped { .. } => Some("[stopped]".to_string()),
    }
}

/// Human-readable summary of a language profile.
pub fn describe_profile(profile: &LanguageProfile) -> String {
    let voice = if profile.synthesis_voice.is_empty() {
        "<none>"
    } else {
        profile.synthesis_voice.as_str()
    };
    format!(
        "Language: {} (voice {voice}, recognition {}, {:?})",
        profile.code, profile.recognition_locale, profile.confidence
    )
}
