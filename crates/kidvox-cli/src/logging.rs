//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset.
fn default_directives(verbose: bool) -> &'static str {
    if verbose {
        "kidvox_cli=debug,kidvox_voice=debug,kidvox_core=debug"
    } else {
        "warn,kidvox_cli=info,kidvox_voice=info"
    }
}

/// Install a compact stderr subscriber. `RUST_LOG` overrides the default
/// filter; `--verbose` raises the default to debug.
pub fn init_logging(verbose: bool) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(verbose)));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .compact()
        .try_init()
        .ok(); // Ignore error if already initialized
}
