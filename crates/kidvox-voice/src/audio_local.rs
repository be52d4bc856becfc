//! Local speaker and microphone adapters for [`AudioSink`] and [`AudioSource`].
//!
//! Both share one [`AudioThreadHandle`]; the audio OS thread owns the cpal
//! capture stream and the rodio output stream. Use [`open_local_audio`] to
//! create the pair.

use std::sync::Arc;

use kidvox_core::SynthesizedAudio;

use crate::audio_io::{AudioSink, AudioSource, PlaybackDoneCallback};
use crate::audio_thread::AudioThreadHandle;
use crate::capture::CAPTURE_SAMPLE_RATE;
use crate::error::VoiceError;

/// Default output device.
pub struct LocalSpeaker {
    handle: Arc<AudioThreadHandle>,
}

impl AudioSink for LocalSpeaker {
    fn play(&self, audio: SynthesizedAudio, on_done: PlaybackDoneCallback) -> Result<(), VoiceError> {
        self.handle.play(audio, on_done)
    }

    fn stop(&self) {
        self.handle.stop_playback();
    }

    fn is_playing(&self) -> bool {
        self.handle.is_playing()
    }
}

/// Default input device, delivering 16 kHz mono.
pub struct LocalMicrophone {
    handle: Arc<AudioThreadHandle>,
}

impl AudioSource for LocalMicrophone {
    fn start_capture(&self) -> Result<(), VoiceError> {
        self.handle.start_capture()
    }

    fn captured_since(&self, offset: usize) -> Result<Vec<f32>, VoiceError> {
        self.handle.captured_since(offset)
    }

    fn stop_capture(&self) -> Result<Vec<f32>, VoiceError> {
        self.handle.stop_capture()
    }

    fn is_capturing(&self) -> bool {
        self.handle.is_recording()
    }

    fn sample_rate(&self) -> u32 {
        CAPTURE_SAMPLE_RATE
    }
}

/// Spawn the audio thread and return the speaker/microphone pair sharing it.
pub fn open_local_audio() -> Result<(Arc<LocalSpeaker>, Arc<LocalMicrophone>), VoiceError> {
    let handle = Arc::new(AudioThreadHandle::spawn()?);
    Ok((
        Arc::new(LocalSpeaker {
            handle: Arc::clone(&handle),
        }),
        Arc::new(LocalMicrophone { handle }),
    ))
}
