//! Pluggable strategies: where the script comes from and how answers are
//! judged.

use async_trait::async_trait;
use kidvox_core::{LanguageProfile, Transcript};

use crate::error::VoiceError;

/// Everything an evaluator gets to judge one answer.
#[derive(Debug, Clone)]
pub struct AnswerContext {
    /// The child's answer.
    pub answer: Transcript,
    /// 1-based attempt number.
    pub attempt: u32,
    /// Attempts left after this one.
    pub remaining: u32,
    /// The script that was read.
    pub script: Vec<String>,
    /// Profile the script was read with.
    pub profile: Option<LanguageProfile>,
}

/// What to say back, and whether the session is over.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Evaluation {
    /// Response fragments, spoken in order.
    pub response: Vec<String>,
    /// End the session after the response, regardless of attempts left.
    pub finished: bool,
}

impl Evaluation {
    /// Speak `response` and keep asking.
    #[must_use]
    pub fn respond<I, S>(response: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            response: response.into_iter().map(Into::into).collect(),
            finished: false,
        }
    }

    /// Speak `response` and finish.
    #[must_use]
    pub fn finish<I, S>(response: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            finished: true,
            ..Self::respond(response)
        }
    }
}

/// Scores an answer and produces the spoken response.
///
/// Lives outside the orchestrator; hosts plug in quiz logic, a remote
/// grader or a fixed script.
#[async_trait]
pub trait AnswerEvaluator: Send + Sync {
    /// Judge one answer.
    async fn evaluate(&self, context: AnswerContext) -> Evaluation;
}

/// Adapts a synchronous closure into an [`AnswerEvaluator`].
pub struct FnEvaluator<F>(pub F);

#[async_trait]
impl<F> AnswerEvaluator for FnEvaluator<F>
where
    F: Fn(&AnswerContext) -> Evaluation + Send + Sync,
{
    async fn evaluate(&self, context: AnswerContext) -> Evaluation {
        (self.0)(&context)
    }
}

/// Evaluator used when none is configured: no response, keep asking until
/// the attempt limit.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentEvaluator;

#[async_trait]
impl AnswerEvaluator for SilentEvaluator {
    async fn evaluate(&self, _context: AnswerContext) -> Evaluation {
        Evaluation::default()
    }
}

/// Supplies script fragments (lesson content, a CMS, a fixed list).
#[async_trait]
pub trait ScriptSource: Send + Sync {
    /// Load the fragments to read.
    async fn fragments(&self) -> Result<Vec<String>, VoiceError>;
}

/// A fixed, in-memory script.
#[derive(Debug, Clone, Default)]
pub struct StaticScript(pub Vec<String>);

impl<S: Into<String>> FromIterator<S> for StaticScript {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

#[async_trait]
impl ScriptSource for StaticScript {
    async fn fragments(&self) -> Result<Vec<String>, VoiceError> {
        Ok(self.0.clone())
    }
}
