//! Dedicated audio I/O thread: keeps `!Send` device handles off the runtime.
//!
//! `cpal::Stream` and `rodio::OutputStream` are `!Send` on some platforms.
//! Both are confined to one OS thread; [`AudioThreadHandle`] is the
//! `Send + Sync` proxy that routes every call through an [`AudioCommand`].

use std::sync::mpsc;
use std::thread;

use kidvox_core::SynthesizedAudio;

use crate::audio_io::PlaybackDoneCallback;
use crate::capture::MicCapture;
use crate::error::VoiceError;
use crate::playback::SpeakerPlayback;

// ── Commands ───────────────────────────────────────────────────────

enum AudioCommand {
    StartCapture {
        reply: mpsc::Sender<Result<(), VoiceError>>,
    },
    CapturedSince {
        offset: usize,
        reply: mpsc::Sender<Result<Vec<f32>, VoiceError>>,
    },
    StopCapture {
        reply: mpsc::Sender<Result<Vec<f32>, VoiceError>>,
    },
    IsRecording {
        reply: mpsc::Sender<bool>,
    },
    Play {
        audio: SynthesizedAudio,
        on_done: PlaybackDoneCallback,
        reply: mpsc::Sender<Result<(), VoiceError>>,
    },
    /// Fire-and-forget.
    StopPlayback,
    IsPlaying {
        reply: mpsc::Sender<bool>,
    },
    Shutdown,
}

// ── Handle ─────────────────────────────────────────────────────────

/// `Send + Sync` handle to the audio thread.
///
/// Request-reply methods block the caller for the duration of the local
/// channel round trip plus the device operation.
pub struct AudioThreadHandle {
    cmd_tx: mpsc::Sender<AudioCommand>,
    thread: Option<thread::JoinHandle<()>>,
}

impl AudioThreadHandle {
    /// Spawn the thread and open both devices on it.
    ///
    /// Device errors are reported back through a one-shot init channel.
    pub fn spawn() -> Result<Self, VoiceError> {
        let (cmd_tx, cmd_rx) = mpsc::channel::<AudioCommand>();
        let (init_tx, init_rx) = mpsc::channel::<Result<(), VoiceError>>();

        let thread = thread::Builder::new()
            .name("kidvox-audio".into())
            .spawn(move || Self::run(&cmd_rx, &init_tx))
            .map_err(|e| {
                VoiceError::OutputStreamError(format!("failed to spawn audio thread: {e}"))
            })?;

        init_rx.recv().map_err(|_| VoiceError::AudioThreadDied)??;

        Ok(Self {
            cmd_tx,
            thread: Some(thread),
        })
    }

    // ── Capture ────────────────────────────────────────────────────

    /// Open the microphone.
    pub fn start_capture(&self) -> Result<(), VoiceError> {
        self.send_and_recv(|reply| AudioCommand::StartCapture { reply })
    }

    /// 16 kHz samples captured so far, from `offset`.
    pub fn captured_since(&self, offset: usize) -> Result<Vec<f32>, VoiceError> {
        self.send_and_recv(|reply| AudioCommand::CapturedSince { offset, reply })
    }

    /// Close the microphone and return the utterance.
    pub fn stop_capture(&self) -> Result<Vec<f32>, VoiceError> {
        self.send_and_recv(|reply| AudioCommand::StopCapture { reply })
    }

    /// Whether the microphone is open.
    pub fn is_recording(&self) -> bool {
        self.query(|reply| AudioCommand::IsRecording { reply })
            .unwrap_or(false)
    }

    // ── Playback ───────────────────────────────────────────────────

    /// Start a clip; `on_done` fires when it drains naturally.
    pub fn play(
        &self,
        audio: SynthesizedAudio,
        on_done: PlaybackDoneCallback,
    ) -> Result<(), VoiceError> {
        self.send_and_recv(|reply| AudioCommand::Play {
            audio,
            on_done,
            reply,
        })
    }

    /// Stop playback immediately.
    pub fn stop_playback(&self) {
        if self.cmd_tx.send(AudioCommand::StopPlayback).is_err() {
            tracing::debug!("Audio thread gone, nothing to stop");
        }
    }

    /// Whether audio is playing.
    pub fn is_playing(&self) -> bool {
        self.query(|reply| AudioCommand::IsPlaying { reply })
            .unwrap_or(false)
    }

    // ── Internal helpers ───────────────────────────────────────────

    fn send_and_recv<T>(
        &self,
        build: impl FnOnce(mpsc::Sender<Result<T, VoiceError>>) -> AudioCommand,
    ) -> Result<T, VoiceError> {
        let (tx, rx) = mpsc::channel();
        self.cmd_tx
            .send(build(tx))
            .map_err(|_| VoiceError::AudioThreadDied)?;
        rx.recv().map_err(|_| VoiceError::AudioThreadDied)?
    }

    fn query<T>(&self, build: impl FnOnce(mpsc::Sender<T>) -> AudioCommand) -> Option<T> {
        let (tx, rx) = mpsc::channel();
        self.cmd_tx.send(build(tx)).ok()?;
        rx.recv().ok()
    }

    // ── Audio thread event loop ────────────────────────────────────

    fn run(cmd_rx: &mpsc::Receiver<AudioCommand>, init_tx: &mpsc::Sender<Result<(), VoiceError>>) {
        let opened = MicCapture::new().and_then(|mic| Ok((mic, SpeakerPlayback::new()?)));
        let (mut mic, mut speaker) = match opened {
            Ok(devices) => devices,
            Err(e) => {
                let _ = init_tx.send(Err(e));
                return;
            }
        };
        if init_tx.send(Ok(())).is_err() {
            return;
        }

        while let Ok(cmd) = cmd_rx.recv() {
            match cmd {
                AudioCommand::StartCapture { reply } => {
                    let _ = reply.send(mic.start());
                }
                AudioCommand::CapturedSince { offset, reply } => {
                    let _ = reply.send(mic.captured_since(offset));
                }
                AudioCommand::StopCapture { reply } => {
                    let _ = reply.send(mic.stop());
                }
                AudioCommand::IsRecording { reply } => {
                    let _ = reply.send(mic.is_recording());
                }
                AudioCommand::Play {
                    audio,
                    on_done,
                    reply,
                } => {
                    let _ = reply.send(speaker.play(audio, on_done));
                }
                AudioCommand::StopPlayback => speaker.stop(),
                AudioCommand::IsPlaying { reply } => {
                    let _ = reply.send(speaker.is_playing());
                }
                AudioCommand::Shutdown => break,
            }
        }

        speaker.stop();
        tracing::debug!("Audio thread shutting down");
    }
}

impl Drop for AudioThreadHandle {
    fn drop(&mut self) {
        let _ = self.cmd_tx.send(AudioCommand::Shutdown);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}
