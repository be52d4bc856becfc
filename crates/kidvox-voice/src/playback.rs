//! Speaker output via `rodio`.

use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use kidvox_core::SynthesizedAudio;
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink};

use crate::audio_io::PlaybackDoneCallback;
use crate::error::VoiceError;

/// Playback on the default output device. Lives on the audio thread.
pub struct SpeakerPlayback {
    /// rodio output stream (must be kept alive).
    _stream: OutputStream,
    stream_handle: OutputStreamHandle,
    sink: Option<Arc<Sink>>,
    /// Id of the clip whose completion may still fire; 0 when none.
    active: Arc<AtomicU64>,
    next_id: u64,
}

impl SpeakerPlayback {
    /// Open the default output device.
    pub fn new() -> Result<Self, VoiceError> {
        let (stream, stream_handle) = OutputStream::try_default()
            .map_err(|e| VoiceError::OutputStreamError(e.to_string()))?;
        tracing::info!("Audio playback initialized on default output device");

        Ok(Self {
            _stream: stream,
            stream_handle,
            sink: None,
            active: Arc::new(AtomicU64::new(0)),
            next_id: 0,
        })
    }

    /// Decode and start `audio`; `on_done` fires when it drains naturally.
    pub fn play(
        &mut self,
        audio: SynthesizedAudio,
        on_done: PlaybackDoneCallback,
    ) -> Result<(), VoiceError> {
        self.stop();

        let decoder = Decoder::new(Cursor::new(audio.bytes))
            .map_err(|e| VoiceError::Codec(format!("Failed to decode {:?}: {e}", audio.format)))?;
        let sink = Sink::try_new(&self.stream_handle)
            .map_err(|e| VoiceError::OutputStreamError(e.to_string()))?;
        sink.append(decoder);
        let sink = Arc::new(sink);

        self.next_id += 1;
        let id = self.next_id;
        self.active.store(id, Ordering::SeqCst);
        self.sink = Some(Arc::clone(&sink));

        let active = Arc::clone(&self.active);
        // `sleep_until_end` returns when the queue drains or `stop()` clears it.
        std::thread::spawn(move || {
            sink.sleep_until_end();
            if active
                .compare_exchange(id, 0, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                tracing::debug!(id, "Playback finished naturally");
                on_done();
            }
        });

        tracing::debug!(id, "Audio playback started");
        Ok(())
    }

    /// Stop immediately. A pending completion callback is dropped unfired.
    pub fn stop(&mut self) {
        self.active.store(0, Ordering::SeqCst);
        if let Some(sink) = self.sink.take() {
            sink.stop();
            tracing::debug!("Audio playback stopped");
        }
    }

    /// Whether audio is still queued on the sink.
    pub fn is_playing(&self) -> bool {
        self.sink.as_ref().is_some_and(|sink| !sink.empty())
    }
}
