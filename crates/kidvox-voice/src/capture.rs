//! Microphone capture via `cpal`.
//!
//! Captures from the default input device, downmixes to mono and resamples
//! to 16 kHz incrementally, so endpointing can read the utterance while it
//! is still being spoken.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig};
use rubato::{FftFixedIn, Resampler as _};

use crate::audio_file::to_mono;
use crate::error::VoiceError;

/// Sample rate handed to endpointing and recognition.
pub const CAPTURE_SAMPLE_RATE: u32 = 16_000;

const RESAMPLE_CHUNK: usize = 1024;

/// Incremental FFT resampler fed with arbitrary-length slices.
pub struct StreamingResampler {
    inner: Option<FftFixedIn<f32>>,
    from_rate: u32,
    to_rate: u32,
    pending: Vec<f32>,
}

impl StreamingResampler {
    /// Resampler from `from_rate` to `to_rate` (pass-through when equal).
    pub fn new(from_rate: u32, to_rate: u32) -> Result<Self, VoiceError> {
        let inner = if from_rate == to_rate {
            None
        } else {
            Some(
                FftFixedIn::<f32>::new(
                    from_rate as usize,
                    to_rate as usize,
                    RESAMPLE_CHUNK,
                    2, // sub-chunks for quality
                    1, // mono
                )
                .map_err(|e| VoiceError::ResampleError(e.to_string()))?,
            )
        };
        Ok(Self {
            inner,
            from_rate,
            to_rate,
            pending: Vec::new(),
        })
    }

    /// Feed samples, appending every completed output chunk to `out`.
    pub fn push(&mut self, samples: &[f32], out: &mut Vec<f32>) -> Result<(), VoiceError> {
        let Some(resampler) = self.inner.as_mut() else {
            out.extend_from_slice(samples);
            return Ok(());
        };

        self.pending.extend_from_slice(samples);
        let mut pos = 0;
        while pos + RESAMPLE_CHUNK <= self.pending.len() {
            let chunk = &self.pending[pos..pos + RESAMPLE_CHUNK];
            let result = resampler
                .process(&[chunk], None)
                .map_err(|e| VoiceError::ResampleError(e.to_string()))?;
            if let Some(channel) = result.first() {
                out.extend_from_slice(channel);
            }
            pos += RESAMPLE_CHUNK;
        }
        self.pending.drain(..pos);
        Ok(())
    }

    /// Flush the partial tail chunk (zero-padded, trimmed to length).
    pub fn finish(&mut self, out: &mut Vec<f32>) -> Result<(), VoiceError> {
        let Some(resampler) = self.inner.as_mut() else {
            return Ok(());
        };
        if self.pending.is_empty() {
            return Ok(());
        }

        let remaining = std::mem::take(&mut self.pending);
        let mut padded = vec![0.0f32; RESAMPLE_CHUNK];
        padded[..remaining.len()].copy_from_slice(&remaining);

        let result = resampler
            .process(&[&padded], None)
            .map_err(|e| VoiceError::ResampleError(e.to_string()))?;
        if let Some(channel) = result.first() {
            #[allow(
                clippy::cast_precision_loss,
                clippy::cast_possible_truncation,
                clippy::cast_sign_loss
            )]
            let output_len = (remaining.len() as f64 * f64::from(self.to_rate)
                / f64::from(self.from_rate))
            .ceil() as usize;
            let take = output_len.min(channel.len());
            out.extend_from_slice(&channel[..take]);
        }
        Ok(())
    }
}

/// Raw device samples shared with the cpal callback.
type RawBuffer = Arc<Mutex<Vec<f32>>>;

/// Microphone capture. Lives on the audio thread.
pub struct MicCapture {
    stream: Option<Stream>,
    raw: RawBuffer,
    recording: Arc<AtomicBool>,
    resampler: Option<StreamingResampler>,
    captured: Vec<f32>,
    device_sample_rate: u32,
    device_channels: u16,
}

impl MicCapture {
    /// Probe the default input device.
    pub fn new() -> Result<Self, VoiceError> {
        let device = default_device()?;
        let config = device
            .default_input_config()
            .map_err(|e| classify_device_error(&e.to_string()))?;

        let device_sample_rate = config.sample_rate().0;
        let device_channels = config.channels();
        tracing::info!(
            device = %device.name().unwrap_or_default(),
            sample_rate = device_sample_rate,
            channels = device_channels,
            "Microphone initialized"
        );

        Ok(Self {
            stream: None,
            raw: Arc::new(Mutex::new(Vec::new())),
            recording: Arc::new(AtomicBool::new(false)),
            resampler: None,
            captured: Vec::new(),
            device_sample_rate,
            device_channels,
        })
    }

    /// Open the input stream into a fresh buffer.
    pub fn start(&mut self) -> Result<(), VoiceError> {
        if self.is_recording() {
            return Ok(());
        }
        self.raw
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.captured.clear();
        self.resampler = Some(StreamingResampler::new(
            self.device_sample_rate,
            CAPTURE_SAMPLE_RATE,
        )?);

        let device = default_device()?;
        let config = device
            .default_input_config()
            .map_err(|e| classify_device_error(&e.to_string()))?;
        let stream = self.build_input_stream(&device, &config)?;
        stream
            .play()
            .map_err(|e| classify_device_error(&e.to_string()))?;

        self.stream = Some(stream);
        self.recording.store(true, Ordering::SeqCst);
        tracing::debug!("Microphone capture started");
        Ok(())
    }

    /// 16 kHz samples captured so far, from `offset`.
    pub fn captured_since(&mut self, offset: usize) -> Result<Vec<f32>, VoiceError> {
        self.pump()?;
        Ok(self.captured.get(offset..).map(<[f32]>::to_vec).unwrap_or_default())
    }

    /// Close the stream and return the whole 16 kHz utterance.
    pub fn stop(&mut self) -> Result<Vec<f32>, VoiceError> {
        self.recording.store(false, Ordering::SeqCst);
        self.stream = None;
        self.pump()?;
        if let Some(mut resampler) = self.resampler.take() {
            resampler.finish(&mut self.captured)?;
        }
        tracing::debug!(samples = self.captured.len(), "Microphone capture stopped");
        Ok(std::mem::take(&mut self.captured))
    }

    /// Whether the stream is open.
    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }

    /// Move raw callback samples through downmix and resampling.
    fn pump(&mut self) -> Result<(), VoiceError> {
        let raw = std::mem::take(&mut *self.raw.lock().unwrap_or_else(PoisonError::into_inner));
        if raw.is_empty() {
            return Ok(());
        }
        let mono = to_mono(&raw, self.device_channels);
        match self.resampler.as_mut() {
            Some(resampler) => resampler.push(&mono, &mut self.captured),
            None => Ok(()),
        }
    }

    fn build_input_stream(
        &self,
        device: &Device,
        config: &cpal::SupportedStreamConfig,
    ) -> Result<Stream, VoiceError> {
        let stream_config: StreamConfig = config.clone().into();
        let sample_format = config.sample_format();
        let err_fn = |err: cpal::StreamError| {
            tracing::error!(%err, "Audio input stream error");
        };

        let stream = match sample_format {
            SampleFormat::F32 => {
                let (raw, recording) = (Arc::clone(&self.raw), Arc::clone(&self.recording));
                device.build_input_stream(
                    &stream_config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        append_raw(&raw, &recording, data.iter().copied());
                    },
                    err_fn,
                    None,
                )
            }
            SampleFormat::I16 => {
                let (raw, recording) = (Arc::clone(&self.raw), Arc::clone(&self.recording));
                device.build_input_stream(
                    &stream_config,
                    move |data: &[i16], _: &cpal::InputCallbackInfo| {
                        append_raw(&raw, &recording, data.iter().map(|&s| f32::from(s) / 32768.0));
                    },
                    err_fn,
                    None,
                )
            }
            SampleFormat::I32 => {
                let (raw, recording) = (Arc::clone(&self.raw), Arc::clone(&self.recording));
                device.build_input_stream(
                    &stream_config,
                    move |data: &[i32], _: &cpal::InputCallbackInfo| {
                        #[allow(clippy::cast_precision_loss)]
                        let samples = data.iter().map(|&s| s as f32 / 2_147_483_648.0);
                        append_raw(&raw, &recording, samples);
                    },
                    err_fn,
                    None,
                )
            }
            _ => {
                return Err(VoiceError::InputStreamError(format!(
                    "Unsupported sample format: {sample_format:?}"
                )));
            }
        };

        stream.map_err(|e| classify_device_error(&e.to_string()))
    }
}

fn append_raw(raw: &RawBuffer, recording: &AtomicBool, samples: impl Iterator<Item = f32>) {
    if !recording.load(Ordering::Relaxed) {
        return;
    }
    raw.lock()
        .unwrap_or_else(PoisonError::into_inner)
        .extend(samples);
}

fn default_device() -> Result<Device, VoiceError> {
    cpal::default_host()
        .default_input_device()
        .ok_or(VoiceError::NoInputDevice)
}

/// Hosts report blocked microphones through backend-specific messages.
fn classify_device_error(message: &str) -> VoiceError {
    let lower = message.to_ascii_lowercase();
    if lower.contains("permission") || lower.contains("denied") || lower.contains("not allowed") {
        VoiceError::PermissionDenied(message.to_string())
    } else {
        VoiceError::InputStreamError(message.to_string())
    }
}
