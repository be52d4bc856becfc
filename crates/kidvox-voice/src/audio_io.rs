//! `AudioSink` and `AudioSource`: the device seams of the orchestrator.
//!
//! | Implementor | Where used |
//! |---|---|
//! | [`WavFileSink`](crate::audio_file::WavFileSink) / [`WavFileSource`](crate::audio_file::WavFileSource) | Headless hosts, the CLI, tests |
//! | `LocalSpeaker` / `LocalMicrophone` (`local-audio` feature) | Desktop: rodio playback, cpal capture |
//!
//! Both traits are object-safe and take `&self`; implementations use
//! interior mutability (atomics, channels) for state changes.

use kidvox_core::SynthesizedAudio;

use crate::error::VoiceError;

/// Callback invoked once when playback finishes naturally.
pub type PlaybackDoneCallback = Box<dyn FnOnce() + Send + 'static>;

/// Audio output (speaker).
pub trait AudioSink: Send + Sync {
    /// Start playing one synthesized clip.
    ///
    /// `on_done` fires once the audio physically finished. It may fire
    /// synchronously from inside `play`. If playback is stopped, the sink
    /// drops `on_done` without calling it.
    fn play(
        &self,
        audio: SynthesizedAudio,
        on_done: PlaybackDoneCallback,
    ) -> Result<(), VoiceError>;

    /// Stop playback immediately. Must be idempotent.
    fn stop(&self);

    /// Whether audio is currently playing.
    fn is_playing(&self) -> bool;
}

/// Audio input (microphone).
pub trait AudioSource: Send + Sync {
    /// Begin capturing into a fresh buffer.
    fn start_capture(&self) -> Result<(), VoiceError>;

    /// Samples captured since `offset` (mono f32 at [`sample_rate`](Self::sample_rate)).
    ///
    /// Used for endpointing and interim results while capture runs.
    fn captured_since(&self, offset: usize) -> Result<Vec<f32>, VoiceError>;

    /// Stop capturing and return everything captured since `start_capture`.
    ///
    /// Releases the device; idempotent (returns an empty buffer when idle).
    fn stop_capture(&self) -> Result<Vec<f32>, VoiceError>;

    /// Whether audio is currently being captured.
    fn is_capturing(&self) -> bool;

    /// Sample rate of captured audio.
    fn sample_rate(&self) -> u32;
}
