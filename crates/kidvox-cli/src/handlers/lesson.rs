//! `kidvox lesson`: read a script, take one answer and speak the response.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use kidvox_core::{Confidence, Language, LanguageProfile, SessionState, Transcript, UserNotice};
use kidvox_voice::{
    AnswerContext, AudioSource, Evaluation, FnEvaluator, LifecycleSignals,
    PlaybackLifecycleGuard, VoiceError, WavFileSource,
};

use super::follow;
use crate::bootstrap::{AudioOutput, CliContext};
use crate::commands::OutputArgs;
use crate::error::CliError;
use crate::presentation::describe_profile;

/// Arguments of one lesson run.
#[derive(Debug, Clone)]
pub struct LessonArgs {
    pub fragments: Vec<String>,
    pub answer_wav: Option<PathBuf>,
    pub answer: Option<String>,
    pub expected: Vec<String>,
    pub lang: Option<Language>,
    pub output: OutputArgs,
}

/// How the answer reaches the session.
enum Answer {
    Typed(String),
    Spoken(Arc<dyn AudioSource>),
}

pub async fn execute(ctx: &CliContext, args: LessonArgs) -> Result<()> {
    let audio = AudioOutput::open(&args.output)?;
    let answer = choose_answer(&args, &audio)?;

    let mut builder = ctx
        .session_builder(&audio)?
        .evaluator(Arc::new(keyword_evaluator(args.expected.clone())));
    if let Some(lang) = args.lang {
        builder = builder.profile(LanguageProfile::for_language(lang, Confidence::Certain));
    }
    if let Answer::Spoken(microphone) = &answer {
        builder = builder.recognition(ctx.recognizer()?, Arc::clone(microphone));
    }
    let (session, mut events) = builder.build_with_events()?;

    let signals = LifecycleSignals::new();
    let _subscription = PlaybackLifecycleGuard::for_session(&session).subscribe(signals.subscribe());

    let profile = session.build_script(&args.fragments).await?;
    println!("{}", describe_profile(&profile));
    session.start_session()?;
    follow(&mut events, &signals, &[SessionState::Asking]).await?;

    match answer {
        Answer::Typed(text) => {
            session.submit_answer(Transcript::final_text(text)).await?;
        }
        Answer::Spoken(_) => match session.listen().await {
            Ok(transcript) => tracing::debug!(text = %transcript.text, "Answer recognized"),
            Err(VoiceError::NoSpeech) => {
                println!("{}", UserNotice::NoSpeech.message());
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        },
    }

    let state = follow(
        &mut events,
        &signals,
        &[SessionState::Asking, SessionState::Finished],
    )
    .await?;
    if state == SessionState::Asking {
        println!("{} attempt(s) left", session.remaining_attempts());
    }

    audio.report();
    Ok(())
}

fn choose_answer(args: &LessonArgs, audio: &AudioOutput) -> Result<Answer> {
    if let Some(text) = &args.answer {
        return Ok(Answer::Typed(text.clone()));
    }
    if let Some(path) = &args.answer_wav {
        let source = WavFileSource::from_file(path)?;
        return Ok(Answer::Spoken(Arc::new(source)));
    }
    if let Some(microphone) = &audio.microphone {
        return Ok(Answer::Spoken(Arc::clone(microphone)));
    }
    Err(CliError::Arguments(
        "a lesson needs --answer or --answer-wav (or --live with local audio)".to_string(),
    )
    .into())
}

// ── Evaluation ─────────────────────────────────────────────────────

struct Phrases {
    praise: &'static str,
    retry: &'static str,
    answer_is: &'static str,
}

const fn phrases(language: Language) -> Phrases {
    match language {
        Language::Uzbek => Phrases {
            praise: "Barakalla!",
            retry: "Yana bir bor urinib ko'ring!",
            answer_is: "To'g'ri javob:",
        },
        Language::Russian => Phrases {
            praise: "Молодец!",
            retry: "Не совсем. Попробуй ещё раз!",
            answer_is: "Правильный ответ:",
        },
        Language::English => Phrases {
            praise: "Well done!",
            retry: "Not quite. Try again!",
            answer_is: "The answer is",
        },
    }
}

/// Lowercase words without surrounding punctuation.
fn normalize(text: &str) -> String {
    text.split_whitespace()
        .map(|word| word.trim_matches(|c: char| c.is_ascii_punctuation()).to_lowercase())
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Accepts an answer containing any of `expected`. With nothing expected,
/// every answer is accepted.
pub fn keyword_evaluator(
    expected: Vec<String>,
) -> FnEvaluator<impl Fn(&AnswerContext) -> Evaluation + Send + Sync> {
    let accepted: Vec<String> = expected.iter().map(|e| normalize(e)).collect();

    FnEvaluator(move |ctx: &AnswerContext| {
        let language = ctx
            .profile
            .as_ref()
            .and_then(LanguageProfile::language)
            .unwrap_or(Language::English);
        let say = phrases(language);
        let answer = normalize(&ctx.answer.text);

        let padded = format!(" {answer} ");
        let correct = accepted.is_empty()
            || accepted
                .iter()
                .any(|a| !a.is_empty() && padded.contains(&format!(" {a} ")));
        if correct {
            return Evaluation::finish([say.praise]);
        }
        match expected.first() {
            Some(solution) if ctx.remaining == 0 => {
                Evaluation::finish([format!("{} {solution}", say.answer_is)])
            }
            _ => Evaluation::respond([say.retry]),
        }
    })
}
