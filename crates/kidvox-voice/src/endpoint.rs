//! Energy endpointing: decides when a single utterance is over.
//!
//! Captured audio is fed in arbitrary chunks and cut into 20 ms frames.
//! A frame whose RMS energy exceeds the threshold counts as speech. The
//! utterance starts after `min_speech_ms` of consecutive speech and ends
//! after `trailing_silence_ms` of silence, or when `max_utterance_ms` of
//! audio has been seen. If no speech starts within `no_speech_timeout_ms`
//! the endpointer reports [`EndpointEvent::NoSpeech`].

use kidvox_core::RecognitionSettings;

const FRAME_MS: u32 = 20;

/// Endpointer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointState {
    /// Waiting for speech to start.
    Waiting,
    /// Speech detected, accumulating the utterance.
    InSpeech,
    /// A terminal event was reported; further audio is ignored.
    Done,
}

/// Events emitted by the endpointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointEvent {
    /// Speech has started.
    SpeechStart,
    /// The utterance is complete (trailing silence or length cap).
    UtteranceEnd,
    /// Nothing was said before the no-speech timeout.
    NoSpeech,
}

/// Frame-based RMS energy endpointer.
#[derive(Debug, Clone)]
pub struct EnergyEndpointer {
    config: RecognitionSettings,
    state: EndpointState,
    frame_len: usize,
    pending: Vec<f32>,
    elapsed_ms: u32,
    speech_ms: u32,
    silence_ms: u32,
}

impl EnergyEndpointer {
    /// Create an endpointer for audio at `config.sample_rate`.
    #[must_use]
    pub fn new(config: RecognitionSettings) -> Self {
        let frame_len = (config.sample_rate as usize * FRAME_MS as usize / 1000).max(1);
        Self {
            config,
            state: EndpointState::Waiting,
            frame_len,
            pending: Vec::with_capacity(frame_len),
            elapsed_ms: 0,
            speech_ms: 0,
            silence_ms: 0,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> EndpointState {
        self.state
    }

    /// Milliseconds of audio processed so far.
    #[must_use]
    pub const fn elapsed_ms(&self) -> u32 {
        self.elapsed_ms
    }

    /// Feed newly captured samples. Returns the most significant event the
    /// chunk produced, if any.
    pub fn feed(&mut self, samples: &[f32]) -> Option<EndpointEvent> {
        if self.state == EndpointState::Done {
            return None;
        }

        self.pending.extend_from_slice(samples);
        let mut event = None;

        let mut offset = 0;
        while self.pending.len() - offset >= self.frame_len {
            let frame = &self.pending[offset..offset + self.frame_len];
            offset += self.frame_len;
            let is_speech = calculate_rms_energy(frame) > self.config.energy_threshold;

            if let Some(e) = self.process_frame(is_speech) {
                event = Some(e);
                if self.state == EndpointState::Done {
                    break;
                }
            }
        }
        self.pending.drain(..offset);
        if self.state == EndpointState::Done {
            self.pending.clear();
        }

        event
    }

    fn process_frame(&mut self, is_speech: bool) -> Option<EndpointEvent> {
        self.elapsed_ms += FRAME_MS;

        match self.state {
            EndpointState::Waiting => {
                if is_speech {
                    self.speech_ms += FRAME_MS;
                    if self.speech_ms >= self.config.min_speech_ms {
                        self.state = EndpointState::InSpeech;
                        self.silence_ms = 0;
                        tracing::debug!(at_ms = self.elapsed_ms, "Endpointer: speech start");
                        return Some(EndpointEvent::SpeechStart);
                    }
                } else {
                    // Silence before the minimum duration resets the run.
                    self.speech_ms = 0;
                }

                if self.elapsed_ms >= self.config.no_speech_timeout_ms
                    || self.elapsed_ms >= self.config.max_utterance_ms
                {
                    self.state = EndpointState::Done;
                    tracing::debug!(at_ms = self.elapsed_ms, "Endpointer: no speech");
                    return Some(EndpointEvent::NoSpeech);
                }
                None
            }

            EndpointState::InSpeech => {
                if is_speech {
                    self.silence_ms = 0;
                } else {
                    self.silence_ms += FRAME_MS;
                }

                if self.silence_ms >= self.config.trailing_silence_ms
                    || self.elapsed_ms >= self.config.max_utterance_ms
                {
                    self.state = EndpointState::Done;
                    tracing::debug!(
                        at_ms = self.elapsed_ms,
                        trailing_ms = self.silence_ms,
                        "Endpointer: utterance end"
                    );
                    return Some(EndpointEvent::UtteranceEnd);
                }
                None
            }

            EndpointState::Done => None,
        }
    }
}

/// Calculate RMS (Root Mean Square) energy of an audio frame.
#[must_use]
pub fn calculate_rms_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|&s| s * s).sum();

    #[allow(clippy::cast_precision_loss)]
    let mean = sum_squares / samples.len() as f32;

    mean.sqrt()
}
