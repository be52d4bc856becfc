//! Fakes and helpers shared by the session integration tests.
//!
//! Nothing here touches audio hardware or the network. Clips "play" for a
//! fixed span of tokio time, so tests run under `start_paused` and finish
//! instantly while keeping realistic ordering.

// Each test binary uses a different subset of these helpers.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use kidvox_core::{
    AudioFormat, ProviderError, RecognitionProvider, RecognitionRequest, RecognitionResult,
    SessionEvent, SessionState, Settings, SynthesisProvider, SynthesisRequest, SynthesizedAudio,
};
use kidvox_voice::audio_io::PlaybackDoneCallback;
use kidvox_voice::{AudioSink, SessionBuilder, SpeechSession, VoiceError, WavFileSource};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;

/// Sample rate of the fake microphone.
pub const MIC_RATE: u32 = 16_000;

/// How long every fake clip plays.
pub const CLIP: Duration = Duration::from_secs(1);

// ── Synthesis ──────────────────────────────────────────────────────

/// Synthesis provider whose "audio" is the UTF-8 text itself.
pub struct EchoTts {
    name: &'static str,
    failures: Mutex<HashMap<String, (ProviderError, bool)>>,
    requests: Mutex<Vec<(String, AudioFormat)>>,
}

impl EchoTts {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            failures: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Always fail `text` with `error`.
    pub fn failing_on(self, text: &str, error: ProviderError) -> Self {
        self.failures
            .lock()
            .unwrap()
            .insert(text.to_string(), (error, false));
        self
    }

    /// Fail the first request for `text` with `error`.
    pub fn failing_once(self, text: &str, error: ProviderError) -> Self {
        self.failures
            .lock()
            .unwrap()
            .insert(text.to_string(), (error, true));
        self
    }

    /// Every request seen, as `(text, format)`.
    pub fn requests(&self) -> Vec<(String, AudioFormat)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl SynthesisProvider for EchoTts {
    fn name(&self) -> &str {
        self.name
    }

    async fn synthesize(
        &self,
        request: &SynthesisRequest,
    ) -> Result<SynthesizedAudio, ProviderError> {
        self.requests
            .lock()
            .unwrap()
            .push((request.text.clone(), request.output_format));

        let mut failures = self.failures.lock().unwrap();
        if let Some((error, once)) = failures.get(&request.text).cloned() {
            if once {
                failures.remove(&request.text);
            }
            return Err(error);
        }
        Ok(SynthesizedAudio {
            bytes: request.text.as_bytes().to_vec(),
            format: request.output_format,
        })
    }
}

/// Non-transient provider failure.
pub fn bad_request() -> ProviderError {
    ProviderError::Status {
        status: 400,
        body: "bad request".into(),
    }
}

// ── Speaker ────────────────────────────────────────────────────────

/// Sink that plays each clip for [`CLIP`] of tokio time.
#[derive(Default)]
pub struct ClockSink {
    played: Mutex<Vec<String>>,
    current: Mutex<Option<(CancellationToken, Arc<AtomicBool>)>>,
}

impl ClockSink {
    /// Texts of every clip started, in order.
    pub fn played(&self) -> Vec<String> {
        self.played.lock().unwrap().clone()
    }
}

impl AudioSink for ClockSink {
    fn play(
        &self,
        audio: SynthesizedAudio,
        on_done: PlaybackDoneCallback,
    ) -> Result<(), VoiceError> {
        self.stop();
        self.played
            .lock()
            .unwrap()
            .push(String::from_utf8_lossy(&audio.bytes).into_owned());

        let cancel = CancellationToken::new();
        let finished = Arc::new(AtomicBool::new(false));
        *self.current.lock().unwrap() = Some((cancel.clone(), Arc::clone(&finished)));

        tokio::spawn(async move {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {}
                () = tokio::time::sleep(CLIP) => {
                    finished.store(true, Ordering::SeqCst);
                    on_done();
                }
            }
        });
        Ok(())
    }

    fn stop(&self) {
        if let Some((cancel, _)) = self.current.lock().unwrap().take() {
            cancel.cancel();
        }
    }

    fn is_playing(&self) -> bool {
        self.current
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|(cancel, finished)| {
                !cancel.is_cancelled() && !finished.load(Ordering::SeqCst)
            })
    }
}

// ── Recognition ────────────────────────────────────────────────────

/// Recognition provider answering from a script, then a default.
pub struct ScriptedRecognizer {
    queued: Mutex<VecDeque<Result<RecognitionResult, ProviderError>>>,
    default: Result<RecognitionResult, ProviderError>,
    locales: Mutex<Vec<String>>,
}

impl ScriptedRecognizer {
    /// Always hear `text`.
    pub fn hearing(text: &str) -> Self {
        Self {
            queued: Mutex::new(VecDeque::new()),
            default: Ok(heard(text)),
            locales: Mutex::new(Vec::new()),
        }
    }

    /// Answer `result` once before falling back to the default.
    pub fn then(self, result: Result<RecognitionResult, ProviderError>) -> Self {
        self.queued.lock().unwrap().push_back(result);
        self
    }

    /// Locales of every request, in order.
    pub fn locales(&self) -> Vec<String> {
        self.locales.lock().unwrap().clone()
    }
}

#[async_trait]
impl RecognitionProvider for ScriptedRecognizer {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn recognize(
        &self,
        request: &RecognitionRequest,
    ) -> Result<RecognitionResult, ProviderError> {
        self.locales.lock().unwrap().push(request.locale.clone());
        self.queued
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.default.clone())
    }
}

pub fn heard(text: &str) -> RecognitionResult {
    RecognitionResult {
        text: text.to_string(),
        confidence: 0.9,
    }
}

/// Half a second of silence, one second of tone, then silence.
#[allow(clippy::cast_precision_loss)]
pub fn speech_samples() -> Vec<f32> {
    let rate = MIC_RATE as usize;
    let mut samples = vec![0.0; rate / 2];
    samples.extend((0..rate).map(|i| (i as f32 * 0.07).sin() * 0.3));
    samples.extend(std::iter::repeat_n(0.0, rate * 2));
    samples
}

pub fn speaking_microphone() -> WavFileSource {
    WavFileSource::from_samples(speech_samples(), MIC_RATE)
}

pub fn silent_microphone() -> WavFileSource {
    WavFileSource::from_samples(vec![0.0; MIC_RATE as usize], MIC_RATE)
}

// ── Harness ────────────────────────────────────────────────────────

/// A session wired to fakes, plus handles on each fake.
pub struct Harness {
    pub session: SpeechSession,
    pub events: UnboundedReceiver<SessionEvent>,
    pub sink: Arc<ClockSink>,
    pub tts: Arc<EchoTts>,
    pub recognizer: Arc<ScriptedRecognizer>,
    pub microphone: Arc<WavFileSource>,
}

/// Fixture options; `configure` can add anything else to the builder.
pub struct HarnessConfig {
    pub settings: Settings,
    pub tts: EchoTts,
    pub recognizer: ScriptedRecognizer,
    pub microphone: WavFileSource,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            settings: Settings::with_defaults(),
            tts: EchoTts::new("echo"),
            recognizer: ScriptedRecognizer::hearing("olma"),
            microphone: speaking_microphone(),
        }
    }
}

impl HarnessConfig {
    pub fn build(self) -> Harness {
        self.build_with(|builder| builder)
    }

    pub fn build_with(self, configure: impl FnOnce(SessionBuilder) -> SessionBuilder) -> Harness {
        let sink = Arc::new(ClockSink::default());
        let tts = Arc::new(self.tts);
        let recognizer = Arc::new(self.recognizer);
        let microphone = Arc::new(self.microphone);

        let builder = SessionBuilder::new(self.settings)
            .sink(Arc::clone(&sink) as Arc<dyn AudioSink>)
            .synthesis(Arc::clone(&tts) as Arc<dyn SynthesisProvider>)
            .recognition(
                Arc::clone(&recognizer) as Arc<dyn RecognitionProvider>,
                Arc::clone(&microphone) as Arc<dyn kidvox_voice::AudioSource>,
            );
        let (session, events) = configure(builder).build_with_events().unwrap();

        Harness {
            session,
            events,
            sink,
            tts,
            recognizer,
            microphone,
        }
    }
}

pub fn harness() -> Harness {
    HarnessConfig::default().build()
}

// ── Events ─────────────────────────────────────────────────────────

/// Receive events until the session announces `state`; returns everything
/// received, the state change included.
pub async fn wait_for_state(
    events: &mut UnboundedReceiver<SessionEvent>,
    state: SessionState,
) -> Vec<SessionEvent> {
    let mut seen = Vec::new();
    let wait = async {
        while let Some(event) = events.recv().await {
            let reached = event == SessionEvent::StateChanged(state);
            seen.push(event);
            if reached {
                return;
            }
        }
    };
    if tokio::time::timeout(Duration::from_secs(60), wait).await.is_err() {
        panic!("session never reached {state:?}; saw {seen:?}");
    }
    seen
}

/// Everything already queued on the event stream.
pub fn drain_events(events: &mut UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}

/// Let spawned tasks run without advancing time meaningfully.
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}
