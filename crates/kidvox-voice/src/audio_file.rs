//! WAV file audio I/O and codec helpers.
//!
//! [`WavFileSink`] writes every played clip to a directory (optionally
//! pacing completion to the clip's real duration); [`WavFileSource`] replays
//! a recorded answer as if it were arriving from a microphone. Both are used
//! by headless hosts and the CLI.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use kidvox_core::{AudioFormat, SynthesizedAudio};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::audio_io::{AudioSink, AudioSource, PlaybackDoneCallback};
use crate::error::VoiceError;

// ── Codec helpers ──────────────────────────────────────────────────

/// Encode mono f32 samples as a 16-bit PCM WAV file.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>, VoiceError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut bytes = Vec::with_capacity(44 + samples.len() * 2);
    {
        let mut writer = hound::WavWriter::new(Cursor::new(&mut bytes), spec)
            .map_err(|e| VoiceError::Codec(e.to_string()))?;
        for &s in samples {
            #[allow(clippy::cast_possible_truncation)]
            let pcm = (s.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16;
            writer
                .write_sample(pcm)
                .map_err(|e| VoiceError::Codec(e.to_string()))?;
        }
        writer
            .finalize()
            .map_err(|e| VoiceError::Codec(e.to_string()))?;
    }
    Ok(bytes)
}

/// Decode a WAV stream into mono f32 samples and its sample rate.
#[allow(clippy::cast_precision_loss)]
pub fn decode_wav<R: std::io::Read>(reader: R) -> Result<(Vec<f32>, u32), VoiceError> {
    let reader = hound::WavReader::new(reader).map_err(|e| VoiceError::Codec(e.to_string()))?;
    let spec = reader.spec();

    let interleaved: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (hound::SampleFormat::Float, _) => reader
            .into_samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(|e| VoiceError::Codec(e.to_string()))?,
        (hound::SampleFormat::Int, bits) => {
            let scale = (1_i64 << bits.saturating_sub(1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()
                .map_err(|e| VoiceError::Codec(e.to_string()))?
        }
    };

    let mono = if spec.channels > 1 {
        to_mono(&interleaved, spec.channels)
    } else {
        interleaved
    };
    Ok((mono, spec.sample_rate))
}

/// Duration of a synthesized clip, when the container reveals it.
#[must_use]
pub fn clip_duration(audio: &SynthesizedAudio) -> Option<Duration> {
    match audio.format {
        AudioFormat::Wav16k | AudioFormat::Wav24k => {
            let reader = hound::WavReader::new(Cursor::new(&audio.bytes)).ok()?;
            let rate = reader.spec().sample_rate;
            (rate > 0).then(|| {
                Duration::from_secs_f64(f64::from(reader.duration()) / f64::from(rate))
            })
        }
        AudioFormat::Mp3 => None,
    }
}

/// Downmix interleaved samples to mono.
pub(crate) fn to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    let channels = usize::from(channels.max(1));
    #[allow(clippy::cast_precision_loss)]
    let divisor = channels as f32;
    samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / divisor)
        .collect()
}

// ── WavFileSink ────────────────────────────────────────────────────

struct Clip {
    cancel: CancellationToken,
    finished: Arc<AtomicBool>,
}

/// Sink that writes each clip to `<dir>/<index>.<ext>`.
pub struct WavFileSink {
    dir: PathBuf,
    next_index: AtomicUsize,
    realtime: bool,
    current: Mutex<Option<Clip>>,
}

impl WavFileSink {
    /// Create a sink writing into `dir` (created if missing). Completion
    /// fires as soon as the file is written.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, VoiceError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            next_index: AtomicUsize::new(0),
            realtime: false,
            current: Mutex::new(None),
        })
    }

    /// Delay completion by the clip's duration, like a real speaker.
    #[must_use]
    pub fn with_realtime(mut self, realtime: bool) -> Self {
        self.realtime = realtime;
        self
    }

    /// Output directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Number of clips written so far.
    #[must_use]
    pub fn clips_written(&self) -> usize {
        self.next_index.load(Ordering::SeqCst)
    }

    fn take_current(&self) -> Option<Clip> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

impl AudioSink for WavFileSink {
    fn play(
        &self,
        audio: SynthesizedAudio,
        on_done: PlaybackDoneCallback,
    ) -> Result<(), VoiceError> {
        self.stop();

        let index = self.next_index.fetch_add(1, Ordering::SeqCst);
        let path = self
            .dir
            .join(format!("{index:03}.{}", audio.format.extension()));
        std::fs::write(&path, &audio.bytes)?;
        tracing::debug!(path = %path.display(), bytes = audio.bytes.len(), "Wrote clip");

        let paced = if self.realtime {
            clip_duration(&audio).zip(tokio::runtime::Handle::try_current().ok())
        } else {
            None
        };

        let Some((duration, handle)) = paced else {
            on_done();
            return Ok(());
        };

        let cancel = CancellationToken::new();
        let finished = Arc::new(AtomicBool::new(false));
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(Clip {
            cancel: cancel.clone(),
            finished: Arc::clone(&finished),
        });

        handle.spawn(async move {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {}
                () = tokio::time::sleep(duration) => {
                    finished.store(true, Ordering::SeqCst);
                    on_done();
                }
            }
        });
        Ok(())
    }

    fn stop(&self) {
        if let Some(clip) = self.take_current() {
            clip.cancel.cancel();
        }
    }

    fn is_playing(&self) -> bool {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|c| !c.cancel.is_cancelled() && !c.finished.load(Ordering::SeqCst))
    }
}

// ── WavFileSource ──────────────────────────────────────────────────

/// Source that replays recorded samples at real-time pace.
///
/// Samples "arrive" as time passes after `start_capture`; once the
/// recording is exhausted the source keeps delivering silence, like an
/// open microphone in a quiet room.
pub struct WavFileSource {
    samples: Arc<[f32]>,
    sample_rate: u32,
    started: Mutex<Option<Instant>>,
}

impl WavFileSource {
    /// Load a WAV file (any channel count; downmixed to mono).
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, VoiceError> {
        let file = std::fs::File::open(path.as_ref())?;
        let (samples, sample_rate) = decode_wav(std::io::BufReader::new(file))?;
        tracing::debug!(
            path = %path.as_ref().display(),
            samples = samples.len(),
            sample_rate,
            "Loaded answer recording"
        );
        Ok(Self::from_samples(samples, sample_rate))
    }

    /// Replay in-memory samples.
    #[must_use]
    pub fn from_samples(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples: samples.into(),
            sample_rate: sample_rate.max(1),
            started: Mutex::new(None),
        }
    }

    fn available(&self) -> usize {
        let Some(started) = *self.started.lock().unwrap_or_else(PoisonError::into_inner) else {
            return 0;
        };
        let elapsed = started.elapsed();
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let count = (elapsed.as_secs_f64() * f64::from(self.sample_rate)) as usize;
        count
    }
}

impl AudioSource for WavFileSource {
    fn start_capture(&self) -> Result<(), VoiceError> {
        *self.started.lock().unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());
        Ok(())
    }

    fn captured_since(&self, offset: usize) -> Result<Vec<f32>, VoiceError> {
        let end = self.available();
        if offset >= end {
            return Ok(Vec::new());
        }
        Ok((offset..end)
            .map(|i| self.samples.get(i).copied().unwrap_or(0.0))
            .collect())
    }

    fn stop_capture(&self) -> Result<Vec<f32>, VoiceError> {
        let end = self.available().min(self.samples.len());
        *self.started.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(self.samples[..end].to_vec())
    }

    fn is_capturing(&self) -> bool {
        self.started
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}
