//! Command handlers.
//!
//! Handlers follow one shape: `pub async fn execute(ctx: &CliContext, ...) -> Result<()>`.
//! They assemble a session through [`CliContext`](crate::CliContext), drive
//! it through its caller API and print its event stream.

pub mod detect;
pub mod lesson;
pub mod speak;

use anyhow::Result;
use kidvox_core::{SessionEvent, SessionState};
use kidvox_voice::{LifecycleSignal, LifecycleSignals};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::error::CliError;
use crate::presentation::describe;

/// Print session events until the session enters one of `until`.
///
/// Ctrl+C publishes a teardown signal and fails with
/// [`CliError::Interrupted`]; so does a hard-stop from anywhere else.
pub async fn follow(
    events: &mut UnboundedReceiver<SessionEvent>,
    signals: &LifecycleSignals,
    until: &[SessionState],
) -> Result<SessionState> {
    loop {
        tokio::select! {
            biased;
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, stopping playback");
                signals.publish(LifecycleSignal::Teardown);
                return Err(CliError::Interrupted.into());
            }
            event = events.recv() => {
                let event = event.ok_or(CliError::SessionClosed)?;
                if let Some(line) = describe(&event) {
                    println!("{line}");
                }
                match event {
                    SessionEvent::StateChanged(state) if until.contains(&state) => return Ok(state),
                    SessionEvent::HardStopped { .. } => return Err(CliError::Interrupted.into()),
                    _ => {}
                }
            }
        }
    }
}
