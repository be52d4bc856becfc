//! Session state machine: pure transitions, no I/O.
//!
//! ```text
//! initial  --ScriptBuilt-------> reading
//! reading  --QueueDrained------> asking
//! reading  --Pause-------------> paused --Resume--> reading
//! asking   --ListenStarted-----> listening
//! listening--FinalTranscript---> analyzing
//! listening--RecognitionFailed-> asking
//! asking   --FinalTranscript---> analyzing          (typed/submitted answer)
//! analyzing--QueueDrained------> asking | finished  (attempt limit or evaluator done)
//! asking | finished --Replay---> reading
//! any      --HardStop----------> initial
//! ```
//!
//! The session owns one of these behind a mutex and applies triggers from
//! its control methods and from generation-checked completions. Invalid
//! triggers are rejected with [`TransitionError`] and leave the state
//! untouched.

use kidvox_core::SessionState;

/// Something that happened to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionTrigger {
    /// A script was built and handed to the scheduler.
    ScriptBuilt,
    /// The scheduler emptied its queue naturally.
    QueueDrained,
    /// The microphone opened.
    ListenStarted,
    /// A final transcript was produced or submitted.
    FinalTranscript,
    /// Recognition ended without a usable transcript.
    RecognitionFailed,
    /// Reading was paused.
    Pause,
    /// Reading was resumed.
    Resume,
    /// The script is read again.
    Replay,
    /// Everything was stopped.
    HardStop,
}

/// A trigger that is not valid in the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Cannot apply {trigger:?} while {from}")]
pub struct TransitionError {
    /// State the session was in.
    pub from: SessionState,
    /// The rejected trigger.
    pub trigger: SessionTrigger,
}

/// Pure session state machine with the answer-attempt counter.
#[derive(Debug, Clone)]
pub struct SessionStateMachine {
    state: SessionState,
    attempts: u32,
    max_attempts: u32,
    finish_requested: bool,
}

impl SessionStateMachine {
    /// Create a machine in `Initial` allowing `max_attempts` answers
    /// (at least one).
    #[must_use]
    pub fn new(max_attempts: u32) -> Self {
        Self {
            state: SessionState::Initial,
            attempts: 0,
            max_attempts: max_attempts.max(1),
            finish_requested: false,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Answers submitted since the script was built.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Answers still allowed.
    #[must_use]
    pub const fn remaining_attempts(&self) -> u32 {
        self.max_attempts.saturating_sub(self.attempts)
    }

    /// Whether `trigger` would be accepted.
    #[must_use]
    pub fn can_apply(&self, trigger: SessionTrigger) -> bool {
        self.next_state(trigger).is_some()
    }

    /// Mark the session as done once the current response drains.
    ///
    /// Only meaningful while analyzing; ignored otherwise.
    pub fn request_finish(&mut self) {
        if self.state == SessionState::Analyzing {
            self.finish_requested = true;
        }
    }

    /// Apply a trigger, returning the new state.
    pub fn apply(&mut self, trigger: SessionTrigger) -> Result<SessionState, TransitionError> {
        let next = self.next_state(trigger).ok_or(TransitionError {
            from: self.state,
            trigger,
        })?;

        match (self.state, trigger) {
            (_, SessionTrigger::HardStop | SessionTrigger::ScriptBuilt)
            | (SessionState::Finished, SessionTrigger::Replay) => {
                self.attempts = 0;
                self.finish_requested = false;
            }
            (_, SessionTrigger::FinalTranscript) => {
                self.attempts = self.attempts.saturating_add(1);
            }
            (SessionState::Analyzing, SessionTrigger::QueueDrained) => {
                self.finish_requested = false;
            }
            _ => {}
        }

        if next != self.state {
            tracing::debug!(from = %self.state, to = %next, ?trigger, "Session transition");
        }
        self.state = next;
        Ok(next)
    }

    fn next_state(&self, trigger: SessionTrigger) -> Option<SessionState> {
        use SessionState as S;
        use SessionTrigger as T;

        let next = match (self.state, trigger) {
            (_, T::HardStop) => S::Initial,
            (S::Initial | S::Finished, T::ScriptBuilt) => S::Reading,
            (S::Reading, T::QueueDrained) => S::Asking,
            (S::Reading, T::Pause) => S::Paused,
            (S::Paused, T::Resume) => S::Reading,
            (S::Asking, T::ListenStarted) => S::Listening,
            (S::Asking | S::Listening, T::FinalTranscript) => S::Analyzing,
            (S::Listening, T::RecognitionFailed) => S::Asking,
            (S::Analyzing, T::QueueDrained) => {
                if self.finish_requested || self.attempts >= self.max_attempts {
                    S::Finished
                } else {
                    S::Asking
                }
            }
            (S::Asking | S::Finished, T::Replay) => S::Reading,
            _ => return None,
        };
        Some(next)
    }
}
