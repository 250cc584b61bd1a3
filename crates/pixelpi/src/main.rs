mod cli;
mod commands;
mod config;
mod error;
mod output;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command, LogFormat};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // the daemon logs its lifecycle at info by default
    let (base, format) = match &cli.command {
        Command::Run(args) => (1, args.log_format),
        _ => (0, LogFormat::Text),
    };
    init_tracing(cli.global.verbose.saturating_add(base), format);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8, format: LogFormat) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // stdout is reserved for command output
    match format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(false)
            .with_writer(std::io::stderr)
            .init(),
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let global = &cli.global;
    match cli.command {
        // Neither needs the host
        Command::Config(args) => commands::config_cmd::handle(args, global),
        Command::Completions(args) => {
            commands::completions::handle(&args);
            Ok(())
        }

        Command::Run(_) => commands::run::handle(global).await,

        // Everything else acts on this host through a one-shot engine
        cmd => {
            tracing::debug!(command = ?cmd, "dispatching command");
            commands::dispatch(cmd, global).await
        }
    }
}
