//! Subcommands and their arguments.

use std::path::PathBuf;

use clap::{Args, Subcommand};
use kidvox_core::Language;

/// Available commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Detect the language of a text and show the voice that would read it
    Detect {
        /// Text to inspect
        text: String,
        /// Only use the local heuristic, even if a detection service is configured
        #[arg(long)]
        local: bool,
        /// Print the profile as JSON
        #[arg(long)]
        json: bool,
    },

    /// Speak fragments in order, one clip per fragment
    Speak {
        /// Fragments to speak
        #[arg(required = true)]
        fragments: Vec<String>,
        /// Language (uz, ru, en); detected from the text when omitted
        #[arg(short, long, value_parser = parse_language)]
        lang: Option<Language>,
        #[command(flatten)]
        output: OutputArgs,
    },

    /// Run a lesson: read the fragments, take one answer, speak the response
    Lesson {
        /// Script fragments; the last one usually asks the question
        #[arg(required = true)]
        fragments: Vec<String>,
        /// Recorded spoken answer (WAV), recognized by the speech service
        #[arg(long, conflicts_with = "answer")]
        answer_wav: Option<PathBuf>,
        /// Typed answer
        #[arg(long)]
        answer: Option<String>,
        /// An accepted answer; repeat for several
        #[arg(long = "expect")]
        expected: Vec<String>,
        /// Language (uz, ru, en); detected from the text when omitted
        #[arg(short, long, value_parser = parse_language)]
        lang: Option<Language>,
        #[command(flatten)]
        output: OutputArgs,
    },
}

/// Where synthesized audio goes.
#[derive(Args, Debug, Clone)]
pub struct OutputArgs {
    /// Directory synthesized clips are written to
    #[arg(short, long, default_value = "kidvox-out")]
    pub out_dir: PathBuf,

    /// Hold each clip for its real duration, like a speaker would
    #[arg(long)]
    pub realtime: bool,

    /// Use the default speaker and microphone instead of files
    #[cfg(feature = "local-audio")]
    #[arg(long)]
    pub live: bool,
}

/// Parse a language code for `--lang`.
pub fn parse_language(value: &str) -> Result<Language, String> {
    Language::from_code(value)
        .ok_or_else(|| format!("unsupported language {value:?} (expected uz, ru or en)"))
}
