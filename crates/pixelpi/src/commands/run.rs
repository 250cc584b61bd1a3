//! `pixelpi run`: the long-running daemon.
//!
//! Starts the engine with its background loops, answers CLI requests on
//! the control socket and waits for a signal. SIGINT and SIGTERM stop it;
//! SIGHUP reloads the reservation table from disk and regenerates the
//! wired DHCP configuration, for hand edits of the reservation file.

use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use pixelpi_core::{Command as CoreCommand, CommandResult, ControlServer, Engine, RebuildOutcome, RunMode};

use crate::cli::GlobalOpts;
use crate::config;
use crate::error::CliError;

pub async fn handle(global: &GlobalOpts) -> Result<(), CliError> {
    let engine_config = config::engine_config(global)?;
    // bound first so a second daemon stops before touching the host
    let control = ControlServer::bind(&engine_config.control_socket).await?;
    let engine = Engine::new(engine_config)?;

    let mut terminate = signal(SignalKind::terminate())?;
    let mut hangup = signal(SignalKind::hangup())?;

    engine.start(RunMode::Daemon).await?;
    let stop_control = CancellationToken::new();
    let control_task = {
        let engine = engine.clone();
        let stop = stop_control.clone();
        tokio::spawn(async move { control.run(&engine, &stop).await })
    };
    info!(version = env!("CARGO_PKG_VERSION"), "pixelpi running");

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    warn!(error = %e, "failed to listen for interrupt");
                }
                info!("interrupt received, shutting down");
                break;
            }
            _ = terminate.recv() => {
                info!("SIGTERM received, shutting down");
                break;
            }
            _ = hangup.recv() => {
                info!("SIGHUP received, reloading reservations");
                reload(&engine).await;
            }
            () = engine.cancelled() => break,
        }
    }

    stop_control.cancel();
    if let Err(e) = control_task.await {
        warn!(error = %e, "control socket task failed");
    }
    engine.shutdown().await;
    info!("pixelpi stopped");
    Ok(())
}

async fn reload(engine: &Engine) {
    match engine.reservations().load().await {
        Ok(count) => info!(count, "reservations reloaded"),
        Err(e) => {
            error!(error = %e, "reservation reload failed; keeping the previous table");
            return;
        }
    }
    match engine.execute(CoreCommand::RebuildDhcp).await {
        Ok(CommandResult::Rebuilt(RebuildOutcome::Applied)) => info!("wired DHCP configuration updated"),
        Ok(_) => info!("wired DHCP configuration unchanged"),
        Err(e) => error!(error = %e, "DHCP rebuild failed"),
    }
}
