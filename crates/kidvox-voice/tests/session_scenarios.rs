//! End-to-end session scenarios driven with fake providers and devices.
//!
//! Tests run on paused tokio time unless noted: a clip lasts one virtual
//! second, the fake microphone delivers its recording at real-time pace,
//! and the runtime auto-advances whenever all tasks are idle. The
//! hard-stop ordering test uses a multi-threaded runtime instead.
//!
//! # What is tested
//!
//! - Ordered reading and the `reading -> asking` hand-off
//! - Hard-stop mid-playback, idempotence, and lifecycle-driven stops
//! - No fragment events after `HardStopped`, and the device gate freed
//! - Pause/resume replaying the interrupted fragment
//! - Failed fragments counting as completed
//! - Listening, no-speech, press-and-hold, attempt limits and replay
//! - Stale completions discarded after a stop

mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{
    CLIP, Harness, HarnessConfig, ScriptedRecognizer, bad_request, drain_events, harness, settle,
    silent_microphone, wait_for_state,
};
use kidvox_core::{
    Confidence, Language, LanguageProfile, ProviderError, SessionEvent, SessionState, Settings,
    SynthesisProvider, SynthesizedAudio, Transcript, UserNotice,
};
use kidvox_voice::audio_io::PlaybackDoneCallback;
use kidvox_voice::{
    AnswerContext, AnswerEvaluator, AudioSink, AudioSource, DeviceOwner, Evaluation, FnEvaluator,
    LifecycleSignal, LifecycleSignals, PlaybackLifecycleGuard, StaticScript, VoiceError,
};

const SCRIPT: [&str; 3] = ["B", "Ball", "Banana"];

fn uzbek() -> LanguageProfile {
    LanguageProfile::for_language(Language::Uzbek, Confidence::Certain)
}

/// Praises "olma" and ends the session; otherwise asks again.
fn apple_quiz() -> Arc<dyn AnswerEvaluator> {
    Arc::new(FnEvaluator(|ctx: &AnswerContext| {
        if ctx.answer.text.eq_ignore_ascii_case("olma") {
            Evaluation::finish(["Barakalla!"])
        } else {
            Evaluation::respond(["Yana bir bor urinib ko'ring."])
        }
    }))
}

fn started_indices(events: &[SessionEvent]) -> Vec<usize> {
    events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::FragmentStarted { index, .. } => Some(*index),
            _ => None,
        })
        .collect()
}

async fn read_script(h: &mut Harness) {
    h.session.build_script(SCRIPT).await.unwrap();
    h.session.start_session().unwrap();
    wait_for_state(&mut h.events, SessionState::Asking).await;
}

// ── Reading ────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn script_plays_in_order_then_asks() {
    let mut h = harness();

    let profile = h.session.build_script(SCRIPT).await.unwrap();
    assert_eq!(profile.code, "en-US");
    assert_eq!(profile.confidence, Confidence::Heuristic);

    h.session.start_session().unwrap();
    let events = wait_for_state(&mut h.events, SessionState::Asking).await;

    assert_eq!(h.sink.played(), SCRIPT);
    assert_eq!(
        events,
        vec![
            SessionEvent::StateChanged(SessionState::Reading),
            SessionEvent::FragmentStarted { index: 0, text: "B".into() },
            SessionEvent::FragmentFinished { index: 0 },
            SessionEvent::FragmentStarted { index: 1, text: "Ball".into() },
            SessionEvent::FragmentFinished { index: 1 },
            SessionEvent::FragmentStarted { index: 2, text: "Banana".into() },
            SessionEvent::FragmentFinished { index: 2 },
            SessionEvent::StateChanged(SessionState::Asking),
        ]
    );
    assert_eq!(h.session.current_state(), SessionState::Asking);
}

#[tokio::test(start_paused = true)]
async fn reading_takes_one_clip_per_fragment() {
    let mut h = harness();
    h.session.build_script(SCRIPT).await.unwrap();

    let started = tokio::time::Instant::now();
    h.session.start_session().unwrap();
    wait_for_state(&mut h.events, SessionState::Asking).await;

    let elapsed = started.elapsed();
    assert!(elapsed >= CLIP * 3, "finished too early: {elapsed:?}");
    assert!(elapsed < CLIP * 3 + Duration::from_millis(500), "took {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn markup_is_stripped_before_speaking() {
    let mut h = harness();
    h.session
        .build_script(["<b>Ball</b>", "   ", "**big**   ball"])
        .await
        .unwrap();
    assert_eq!(h.session.script(), ["Ball", "big ball"]);

    h.session.start_session().unwrap();
    wait_for_state(&mut h.events, SessionState::Asking).await;
    assert_eq!(h.sink.played(), ["Ball", "big ball"]);
}

#[tokio::test(start_paused = true)]
async fn failed_fragment_counts_as_finished() {
    let mut h = HarnessConfig {
        tts: common::EchoTts::new("echo").failing_on("Ball", bad_request()),
        ..HarnessConfig::default()
    }
    .build();

    h.session.build_script(SCRIPT).await.unwrap();
    h.session.start_session().unwrap();
    let events = wait_for_state(&mut h.events, SessionState::Asking).await;

    assert_eq!(h.sink.played(), ["B", "Banana"]);
    assert!(events.contains(&SessionEvent::FragmentFinished { index: 1 }));
    assert_eq!(started_indices(&events), [0, 1, 2]);
}

#[tokio::test(start_paused = true)]
async fn transient_synthesis_failure_is_retried_once() {
    let mut h = HarnessConfig {
        tts: common::EchoTts::new("echo").failing_once("Ball", ProviderError::Timeout),
        ..HarnessConfig::default()
    }
    .build();

    read_script(&mut h).await;

    assert_eq!(h.sink.played(), SCRIPT);
    let ball_requests = h.tts.requests().iter().filter(|(t, _)| t == "Ball").count();
    assert_eq!(ball_requests, 2);
}

#[tokio::test(start_paused = true)]
async fn fallback_engine_speaks_when_primary_fails() {
    let fallback = Arc::new(common::EchoTts::new("fallback"));
    let mut h = HarnessConfig {
        tts: common::EchoTts::new("cloud").failing_on("Ball", bad_request()),
        ..HarnessConfig::default()
    }
    .build_with(|b| b.fallback(Arc::clone(&fallback) as Arc<dyn SynthesisProvider>));

    read_script(&mut h).await;

    assert_eq!(h.sink.played(), SCRIPT);
    assert_eq!(
        fallback.requests(),
        [("Ball".to_string(), kidvox_core::AudioFormat::Wav16k)]
    );
}

#[tokio::test(start_paused = true)]
async fn disabled_fallback_is_not_used() {
    let fallback = Arc::new(common::EchoTts::new("fallback"));
    let settings = Settings {
        fallback_engine: Some(false),
        ..Settings::with_defaults()
    };
    let mut h = HarnessConfig {
        settings,
        tts: common::EchoTts::new("cloud").failing_on("Ball", bad_request()),
        ..HarnessConfig::default()
    }
    .build_with(|b| b.fallback(Arc::clone(&fallback) as Arc<dyn SynthesisProvider>));

    read_script(&mut h).await;

    assert_eq!(h.sink.played(), ["B", "Banana"]);
    assert!(fallback.requests().is_empty());
}

// ── Script building ────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn undetermined_language_refuses_to_start() {
    let mut h = harness();

    let err = h.session.build_script(["123 456", "!!"]).await.unwrap_err();
    assert!(matches!(err, VoiceError::UnsupportedLanguage));
    assert!(
        drain_events(&mut h.events)
            .contains(&SessionEvent::Notice(UserNotice::UnsupportedLanguage))
    );

    assert!(matches!(h.session.start_session(), Err(VoiceError::NoScript)));
    assert_eq!(h.session.current_state(), SessionState::Initial);
    assert!(h.sink.played().is_empty());
}

#[tokio::test(start_paused = true)]
async fn blank_script_is_rejected() {
    let h = harness();
    let err = h.session.build_script(["  ", "<br/>", ""]).await.unwrap_err();
    assert!(matches!(err, VoiceError::NoScript));
}

#[tokio::test(start_paused = true)]
async fn pinned_profile_skips_detection() {
    let h = HarnessConfig::default().build_with(|b| b.profile(uzbek()));

    let profile = h.session.build_script(["The ball is red"]).await.unwrap();
    assert_eq!(profile, uzbek());
    assert_eq!(h.session.current_profile(), Some(uzbek()));
}

#[tokio::test(start_paused = true)]
async fn script_source_feeds_load_script() {
    let mut h = HarnessConfig::default().build_with(|b| {
        b.script_source(Arc::new(StaticScript::from_iter(["Что это?", "Это мяч."])))
    });

    let profile = h.session.load_script().await.unwrap();
    assert_eq!(profile.code, "ru-RU");

    h.session.start_session().unwrap();
    wait_for_state(&mut h.events, SessionState::Asking).await;
    assert_eq!(h.sink.played(), ["Что это?", "Это мяч."]);
}

#[tokio::test(start_paused = true)]
async fn load_script_without_source_fails() {
    let h = harness();
    assert!(matches!(h.session.load_script().await, Err(VoiceError::NoScript)));
}

#[tokio::test(start_paused = true)]
async fn start_without_script_fails() {
    let h = harness();
    assert!(matches!(h.session.start_session(), Err(VoiceError::NoScript)));
}

// ── Hard stop ──────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn hard_stop_mid_fragment_silences_everything() {
    let mut h = harness();
    h.session.build_script(SCRIPT).await.unwrap();
    h.session.start_session().unwrap();

    // Halfway through "Ball".
    tokio::time::sleep(CLIP + CLIP / 2).await;
    h.session.hard_stop();

    assert_eq!(h.session.current_state(), SessionState::Initial);
    assert!(!h.sink.is_playing());

    tokio::time::sleep(CLIP * 5).await;
    let events = drain_events(&mut h.events);

    assert_eq!(h.sink.played(), ["B", "Ball"]);
    assert_eq!(started_indices(&events), [0, 1]);
    assert!(!events.contains(&SessionEvent::FragmentFinished { index: 1 }));
    assert!(
        events
            .iter()
            .any(|e| matches!(e, SessionEvent::HardStopped { .. }))
    );
    assert_eq!(h.session.current_state(), SessionState::Initial);
}

#[tokio::test(start_paused = true)]
async fn hard_stop_is_idempotent() {
    let mut h = harness();

    // Nothing to stop yet: no events at all.
    h.session.hard_stop();
    assert!(drain_events(&mut h.events).is_empty());

    h.session.build_script(SCRIPT).await.unwrap();
    h.session.start_session().unwrap();
    tokio::time::sleep(CLIP / 2).await;

    let generation = h.session.generation();
    h.session.hard_stop();
    h.session.hard_stop();
    h.session.hard_stop();
    assert!(h.session.generation() > generation);

    let stops = drain_events(&mut h.events)
        .iter()
        .filter(|e| matches!(e, SessionEvent::HardStopped { .. }))
        .count();
    assert_eq!(stops, 1);
}

#[tokio::test(start_paused = true)]
async fn session_restarts_cleanly_after_hard_stop() {
    let mut h = harness();
    h.session.build_script(SCRIPT).await.unwrap();
    h.session.start_session().unwrap();
    tokio::time::sleep(CLIP / 2).await;
    h.session.hard_stop();

    h.session.start_session().unwrap();
    wait_for_state(&mut h.events, SessionState::Asking).await;
    assert_eq!(h.sink.played(), ["B", "B", "Ball", "Banana"]);
}

/// Sink whose clips finish as soon as they start.
struct InstantSink;

impl AudioSink for InstantSink {
    fn play(
        &self,
        _audio: SynthesizedAudio,
        on_done: PlaybackDoneCallback,
    ) -> Result<(), VoiceError> {
        tokio::spawn(async move { on_done() });
        Ok(())
    }

    fn stop(&self) {}

    fn is_playing(&self) -> bool {
        false
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn no_fragment_events_follow_hard_stopped() {
    let english = LanguageProfile::for_language(Language::English, Confidence::Certain);
    let script: Vec<String> = (0..50).map(|i| format!("Fragment {i}")).collect();

    for round in 0..20 {
        let mut h = HarnessConfig::default().build_with(|b| {
            b.sink(Arc::new(InstantSink) as Arc<dyn AudioSink>)
                .profile(english.clone())
        });
        h.session.build_script(script.clone()).await.unwrap();
        h.session.start_session().unwrap();
        for _ in 0..round {
            tokio::task::yield_now().await;
        }
        h.session.hard_stop();

        // Workers on other threads get a chance to deliver late callbacks.
        tokio::time::sleep(Duration::from_millis(20)).await;
        let events = drain_events(&mut h.events);

        let Some(stopped) = events
            .iter()
            .position(|e| matches!(e, SessionEvent::HardStopped { .. }))
        else {
            continue;
        };
        let late: Vec<_> = events[stopped..]
            .iter()
            .filter(|e| {
                matches!(
                    e,
                    SessionEvent::FragmentStarted { .. } | SessionEvent::FragmentFinished { .. }
                )
            })
            .collect();
        assert!(late.is_empty(), "round {round}: {late:?} after hard stop");
    }
}

#[tokio::test(start_paused = true)]
async fn lifecycle_signal_stops_playback() {
    let mut h = harness();
    let signals = LifecycleSignals::new();
    let subscription = PlaybackLifecycleGuard::for_session(&h.session).subscribe(signals.subscribe());

    h.session.build_script(SCRIPT).await.unwrap();
    h.session.start_session().unwrap();
    tokio::time::sleep(CLIP + CLIP / 2).await;

    signals.publish(LifecycleSignal::NavigatedAway);
    settle().await;

    assert_eq!(h.session.current_state(), SessionState::Initial);
    assert!(!h.sink.is_playing());
    tokio::time::sleep(CLIP * 5).await;
    assert_eq!(h.sink.played(), ["B", "Ball"]);

    // Teardown on an idle session is a no-op.
    drop(subscription);
    settle().await;
    assert_eq!(signals.subscriber_count(), 0);
    let stops = drain_events(&mut h.events)
        .iter()
        .filter(|e| matches!(e, SessionEvent::HardStopped { .. }))
        .count();
    assert_eq!(stops, 1);
}

#[tokio::test(start_paused = true)]
async fn dropping_lifecycle_subscription_stops_reading() {
    let h = harness();
    let signals = LifecycleSignals::new();
    let subscription = PlaybackLifecycleGuard::for_session(&h.session).subscribe(signals.subscribe());

    h.session.build_script(SCRIPT).await.unwrap();
    h.session.start_session().unwrap();
    tokio::time::sleep(CLIP / 2).await;

    drop(subscription);
    assert_eq!(h.session.current_state(), SessionState::Initial);
    tokio::time::sleep(CLIP * 5).await;
    assert_eq!(h.sink.played(), ["B"]);
}

// ── Pause / resume ─────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn resume_replays_interrupted_fragment() {
    let mut h = harness();
    h.session.build_script(SCRIPT).await.unwrap();
    h.session.start_session().unwrap();

    tokio::time::sleep(CLIP + CLIP / 2).await;
    h.session.pause().unwrap();
    assert_eq!(h.session.current_state(), SessionState::Paused);
    assert!(!h.sink.is_playing());

    // Nothing moves while paused.
    tokio::time::sleep(CLIP * 3).await;
    assert_eq!(h.sink.played(), ["B", "Ball"]);

    h.session.resume().unwrap();
    let events = wait_for_state(&mut h.events, SessionState::Asking).await;

    assert_eq!(h.sink.played(), ["B", "Ball", "Ball", "Banana"]);
    assert_eq!(started_indices(&events), [0, 1, 2]);
    let finished_ball = events
        .iter()
        .filter(|e| **e == SessionEvent::FragmentFinished { index: 1 })
        .count();
    assert_eq!(finished_ball, 1);
}

#[tokio::test(start_paused = true)]
async fn pause_outside_reading_is_rejected() {
    let mut h = harness();
    read_script(&mut h).await;

    assert!(matches!(
        h.session.pause(),
        Err(VoiceError::InvalidTransition(_))
    ));
    assert!(matches!(
        h.session.resume(),
        Err(VoiceError::InvalidTransition(_))
    ));
}

// ── Answers ────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn spoken_answer_is_recognized_evaluated_and_answered() {
    let mut h = HarnessConfig::default().build_with(|b| b.profile(uzbek()).evaluator(apple_quiz()));

    h.session.build_script(["Bu nima?"]).await.unwrap();
    h.session.start_session().unwrap();
    wait_for_state(&mut h.events, SessionState::Asking).await;

    let transcript = h.session.listen().await.unwrap();
    assert_eq!(transcript, Transcript::final_text("olma"));
    assert_eq!(h.session.current_transcript(), Some(Transcript::final_text("olma")));
    assert_eq!(h.recognizer.locales(), ["uz-UZ"]);
    assert!(!h.microphone.is_capturing());

    let events = wait_for_state(&mut h.events, SessionState::Finished).await;
    assert!(events.contains(&SessionEvent::StateChanged(SessionState::Listening)));
    assert!(events.contains(&SessionEvent::StateChanged(SessionState::Analyzing)));
    assert!(events.contains(&SessionEvent::Transcript(Transcript::final_text("olma"))));
    assert_eq!(h.sink.played(), ["Bu nima?", "Barakalla!"]);
}

#[tokio::test(start_paused = true)]
async fn wrong_answer_gets_another_try() {
    let mut h = HarnessConfig {
        recognizer: ScriptedRecognizer::hearing("olma").then(Ok(common::heard("nok"))),
        ..HarnessConfig::default()
    }
    .build_with(|b| b.profile(uzbek()).evaluator(apple_quiz()));

    h.session.build_script(["Bu nima?"]).await.unwrap();
    h.session.start_session().unwrap();
    wait_for_state(&mut h.events, SessionState::Asking).await;

    let first = h.session.listen().await.unwrap();
    assert_eq!(first.text, "nok");
    wait_for_state(&mut h.events, SessionState::Asking).await;
    assert_eq!(h.session.remaining_attempts(), 2);

    h.session.listen().await.unwrap();
    wait_for_state(&mut h.events, SessionState::Finished).await;
    assert_eq!(
        h.sink.played(),
        ["Bu nima?", "Yana bir bor urinib ko'ring.", "Barakalla!"]
    );
}

#[tokio::test(start_paused = true)]
async fn silence_reports_no_speech_without_using_an_attempt() {
    let mut h = HarnessConfig {
        microphone: silent_microphone(),
        ..HarnessConfig::default()
    }
    .build();
    read_script(&mut h).await;

    let err = h.session.listen().await.unwrap_err();
    assert!(matches!(err, VoiceError::NoSpeech));
    assert_eq!(h.session.current_state(), SessionState::Asking);
    assert_eq!(h.session.remaining_attempts(), 3);
    assert!(!h.microphone.is_capturing());
    assert!(h.recognizer.locales().is_empty());

    let events = drain_events(&mut h.events);
    assert!(events.contains(&SessionEvent::Notice(UserNotice::NoSpeech)));
}

#[tokio::test(start_paused = true)]
async fn provider_hearing_nothing_is_no_speech() {
    let mut h = HarnessConfig {
        recognizer: ScriptedRecognizer::hearing("olma").then(Err(ProviderError::NoSpeech)),
        ..HarnessConfig::default()
    }
    .build();
    read_script(&mut h).await;

    assert!(matches!(h.session.listen().await, Err(VoiceError::NoSpeech)));
    assert_eq!(h.session.current_state(), SessionState::Asking);
}

#[tokio::test(start_paused = true)]
async fn permission_denied_ends_the_session() {
    let mut h = HarnessConfig {
        recognizer: ScriptedRecognizer::hearing("olma")
            .then(Err(ProviderError::PermissionDenied("blocked".into()))),
        ..HarnessConfig::default()
    }
    .build();
    read_script(&mut h).await;

    let err = h.session.listen().await.unwrap_err();
    assert!(matches!(err, VoiceError::PermissionDenied(_)));
    assert_eq!(h.session.current_state(), SessionState::Initial);

    let events = drain_events(&mut h.events);
    assert!(events.contains(&SessionEvent::Notice(UserNotice::PermissionDenied)));
    assert!(
        events
            .iter()
            .any(|e| matches!(e, SessionEvent::HardStopped { .. }))
    );
}

#[tokio::test(start_paused = true)]
async fn listening_is_rejected_while_reading() {
    let h = harness();
    h.session.build_script(SCRIPT).await.unwrap();
    h.session.start_session().unwrap();
    settle().await;

    let err = h.session.listen().await.unwrap_err();
    assert!(matches!(err, VoiceError::InvalidTransition(_)));
    assert!(!h.microphone.is_capturing());
    assert_eq!(h.session.current_state(), SessionState::Reading);
}

#[tokio::test(start_paused = true)]
async fn listening_without_recognition_fails() {
    let sink = Arc::new(common::ClockSink::default());
    let session = kidvox_voice::SessionBuilder::new(Settings::with_defaults())
        .sink(sink as Arc<dyn AudioSink>)
        .synthesis(Arc::new(common::EchoTts::new("echo")))
        .build()
        .unwrap();

    assert!(matches!(session.listen().await, Err(VoiceError::NoInputDevice)));
}

#[tokio::test(start_paused = true)]
async fn hard_stop_while_listening_releases_the_microphone() {
    let mut h = HarnessConfig {
        microphone: silent_microphone(),
        ..HarnessConfig::default()
    }
    .build();
    read_script(&mut h).await;

    let session = h.session.clone();
    let listening = tokio::spawn(async move { session.listen().await });
    wait_for_state(&mut h.events, SessionState::Listening).await;
    assert!(h.microphone.is_capturing());

    h.session.hard_stop();
    assert_eq!(h.session.device_owner(), DeviceOwner::Idle);
    let result = listening.await.unwrap();

    assert!(matches!(result, Err(VoiceError::Cancelled)));
    assert!(!h.microphone.is_capturing());
    assert_eq!(h.session.current_state(), SessionState::Initial);
}

#[tokio::test(start_paused = true)]
async fn press_and_hold_streams_partials() {
    let mut h = HarnessConfig::default().build_with(|b| b.profile(uzbek()).evaluator(apple_quiz()));
    h.session.build_script(["Bu nima?"]).await.unwrap();
    h.session.start_session().unwrap();
    wait_for_state(&mut h.events, SessionState::Asking).await;

    h.session.begin_hold().unwrap();
    assert_eq!(h.session.current_state(), SessionState::Listening);
    assert!(matches!(
        h.session.begin_hold(),
        Err(VoiceError::InvalidTransition(_))
    ));

    tokio::time::sleep(Duration::from_secs(2)).await;
    let transcript = h.session.end_hold().await.unwrap();
    assert_eq!(transcript, Transcript::final_text("olma"));
    assert!(!h.microphone.is_capturing());

    let events = wait_for_state(&mut h.events, SessionState::Finished).await;
    assert!(events.contains(&SessionEvent::Transcript(Transcript::partial("olma"))));
    assert!(events.contains(&SessionEvent::Transcript(Transcript::final_text("olma"))));
}

#[tokio::test(start_paused = true)]
async fn end_hold_without_hold_is_a_conflict() {
    let mut h = harness();
    read_script(&mut h).await;

    assert!(matches!(
        h.session.end_hold().await,
        Err(VoiceError::ResourceConflict(_))
    ));
    assert_eq!(h.session.current_state(), SessionState::Asking);
}

#[tokio::test(start_paused = true)]
async fn attempt_limit_finishes_the_session() {
    let settings = Settings {
        max_attempts: Some(2),
        ..Settings::with_defaults()
    };
    let mut h = HarnessConfig {
        settings,
        ..HarnessConfig::default()
    }
    .build();
    read_script(&mut h).await;

    h.session
        .submit_answer(Transcript::final_text("one"))
        .await
        .unwrap();
    assert_eq!(h.session.current_state(), SessionState::Asking);
    assert_eq!(h.session.remaining_attempts(), 1);

    h.session
        .submit_answer(Transcript::final_text("two"))
        .await
        .unwrap();
    assert_eq!(h.session.current_state(), SessionState::Finished);
    assert_eq!(h.session.remaining_attempts(), 0);

    assert!(matches!(
        h.session.submit_answer(Transcript::final_text("three")).await,
        Err(VoiceError::InvalidTransition(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn replay_after_finishing_reads_again_with_fresh_attempts() {
    let settings = Settings {
        max_attempts: Some(1),
        ..Settings::with_defaults()
    };
    let mut h = HarnessConfig {
        settings,
        ..HarnessConfig::default()
    }
    .build();
    read_script(&mut h).await;

    h.session
        .submit_answer(Transcript::final_text("ball"))
        .await
        .unwrap();
    assert_eq!(h.session.current_state(), SessionState::Finished);

    h.session.replay().unwrap();
    assert_eq!(h.session.current_state(), SessionState::Reading);
    let events = wait_for_state(&mut h.events, SessionState::Asking).await;

    assert_eq!(started_indices(&events), [0, 1, 2]);
    assert_eq!(h.sink.played().len(), SCRIPT.len() * 2);
    assert_eq!(h.session.remaining_attempts(), 1);
}

struct SlowEvaluator;

#[async_trait]
impl AnswerEvaluator for SlowEvaluator {
    async fn evaluate(&self, _context: AnswerContext) -> Evaluation {
        tokio::time::sleep(Duration::from_secs(2)).await;
        Evaluation::respond(["late"])
    }
}

#[tokio::test(start_paused = true)]
async fn evaluation_finishing_after_stop_is_discarded() {
    let mut h = HarnessConfig::default().build_with(|b| b.evaluator(Arc::new(SlowEvaluator)));
    read_script(&mut h).await;

    let session = h.session.clone();
    let submitted =
        tokio::spawn(async move { session.submit_answer(Transcript::final_text("ball")).await });
    wait_for_state(&mut h.events, SessionState::Analyzing).await;

    h.session.hard_stop();
    let result = submitted.await.unwrap();
    assert!(matches!(result, Err(VoiceError::Cancelled)));

    tokio::time::sleep(CLIP * 3).await;
    assert!(!h.sink.played().iter().any(|t| t == "late"));
    assert_eq!(h.session.current_state(), SessionState::Initial);
}

#[tokio::test(start_paused = true)]
async fn evaluator_sees_attempt_and_script() {
    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    let record = Arc::clone(&seen);
    let evaluator = FnEvaluator(move |ctx: &AnswerContext| {
        record
            .lock()
            .unwrap()
            .push((ctx.attempt, ctx.remaining, ctx.script.clone()));
        Evaluation::default()
    });
    let mut h = HarnessConfig::default().build_with(|b| b.evaluator(Arc::new(evaluator)));
    read_script(&mut h).await;

    h.session
        .submit_answer(Transcript::final_text("ball"))
        .await
        .unwrap();

    let seen = seen.lock().unwrap().clone();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, 1);
    assert_eq!(seen[0].1, 2);
    assert_eq!(seen[0].2, SCRIPT);
}
