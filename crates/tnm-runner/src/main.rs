//! `tnm` command-line entry point.

use clap::Parser;
use std::io::{self, Write};
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tnm_runner::{commands, Cli, Command, Outcome, TracingSink};

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli.log_level);
    tnm_metrics::describe_metrics();

    match run(&cli) {
        Ok(outcome) => ExitCode::from(outcome.exit_code()),
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Log to stderr so stdout carries only the JSON summary.
fn init_logging(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn run(cli: &Cli) -> anyhow::Result<Outcome> {
    let bbox = cli.area().bounding_box()?;
    let config = cli.runner_config()?;
    let sink = TracingSink;
    let stdout = io::stdout();
    let mut out = stdout.lock();

    let outcome = match &cli.command {
        Command::Dem(_) => commands::run_dem(&config, &bbox, &sink, &mut out)?,
        Command::Topo(_) => commands::run_topo(&config, &bbox, &sink, &mut out)?,
        Command::Tiles(_) => commands::run_tiles(&config, &bbox, &mut out)?,
    };
    out.flush()?;
    Ok(outcome)
}
