//! benchrun - resumable benchmark runner CLI

use clap::Parser;
use benchrun::cli::Cli;
use benchrun::output::{emit_error, infer_command_name_from_args};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Longest RUST_LOG value we try to parse
const MAX_FILTER_LEN: usize = 4096;

fn main() {
    // Logging is off unless RUST_LOG is set; a bad filter never blocks startup.
    let filter = std::env::var("RUST_LOG")
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty() && raw.len() <= MAX_FILTER_LEN)
        .and_then(|raw| EnvFilter::try_new(raw).ok())
        .unwrap_or_else(|| EnvFilter::new("off"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let command = infer_command_name_from_args();
    let cli = Cli::parse();
    let json = cli.json && cli.events.as_deref().map(str::trim) != Some("-");

    if let Err(err) = cli.run() {
        let _ = emit_error(&command, &err, json);
        std::process::exit(err.exit_code());
    }
}
