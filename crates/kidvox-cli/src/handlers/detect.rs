//! `kidvox detect`: show the profile a text would be read with.

use anyhow::Result;
use kidvox_voice::VoiceError;

use crate::bootstrap::CliContext;
use crate::presentation::describe_profile;

/// Detect the language of `text` and print its profile.
pub async fn execute(ctx: &CliContext, text: &str, local_only: bool, json: bool) -> Result<()> {
    let detector = ctx.detector(local_only)?;
    let profile = detector
        .detect(text)
        .await
        .ok_or(VoiceError::UnsupportedLanguage)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&profile)?);
    } else {
        println!("{}", describe_profile(&profile));
    }
    Ok(())
}
