//! `kidvox speak`: read fragments in order.

use anyhow::Result;
use kidvox_core::{Confidence, Language, LanguageProfile, SessionState};
use kidvox_voice::{LifecycleSignals, PlaybackLifecycleGuard};

use super::follow;
use crate::bootstrap::{AudioOutput, CliContext};
use crate::commands::OutputArgs;
use crate::presentation::describe_profile;

/// Speak `fragments`, pinned to `lang` when given.
pub async fn execute(
    ctx: &CliContext,
    fragments: &[String],
    lang: Option<Language>,
    output: &OutputArgs,
) -> Result<()> {
    let audio = AudioOutput::open(output)?;
    let mut builder = ctx.session_builder(&audio)?;
    if let Some(lang) = lang {
        builder = builder.profile(LanguageProfile::for_language(lang, Confidence::Certain));
    }
    let (session, mut events) = builder.build_with_events()?;

    let signals = LifecycleSignals::new();
    let _subscription = PlaybackLifecycleGuard::for_session(&session).subscribe(signals.subscribe());

    let profile = session.build_script(fragments).await?;
    println!("{}", describe_profile(&profile));

    session.start_session()?;
    follow(&mut events, &signals, &[SessionState::Asking]).await?;

    audio.report();
    Ok(())
}
