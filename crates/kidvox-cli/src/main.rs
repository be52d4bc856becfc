//! CLI entry point.
//!
//! Loads `.env`, parses arguments, installs logging and dispatches to the
//! handlers. Everything the handlers need comes from the bootstrap.

use std::process::ExitCode;

use clap::{CommandFactory, Parser};

use kidvox_cli::handlers::lesson::LessonArgs;
use kidvox_cli::{Cli, CliContext, Commands, exit_code, handlers, init_logging};

#[tokio::main]
async fn main() -> ExitCode {
    // Load environment variables before settings are read
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_logging(cli.verbose);

    let Some(command) = cli.command else {
        // No command provided - show help
        return match Cli::command().print_help() {
            Ok(()) => ExitCode::SUCCESS,
            Err(_) => ExitCode::FAILURE,
        };
    };

    match run(command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::from(exit_code(&err))
        }
    }
}

async fn run(command: Commands) -> anyhow::Result<()> {
    let ctx = CliContext::from_env()?;

    match command {
        Commands::Detect { text, local, json } => {
            handlers::detect::execute(&ctx, &text, local, json).await
        }
        Commands::Speak {
            fragments,
            lang,
            output,
        } => handlers::speak::execute(&ctx, &fragments, lang, &output).await,
        Commands::Lesson {
            fragments,
            answer_wav,
            answer,
            expected,
            lang,
            output,
        } => {
            let args = LessonArgs {
                fragments,
                answer_wav,
                answer,
                expected,
                lang,
                output,
            };
            handlers::lesson::execute(&ctx, args).await
        }
    }
}
