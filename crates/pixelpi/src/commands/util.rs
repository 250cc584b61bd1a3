//! Shared helpers for command handlers.

use std::io::IsTerminal;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use pixelpi_core::{
    AddressPlan, ControlClient, ControlRequest, ControlResponse, CoreError, Engine, EngineConfig, MacAddress,
};

use crate::error::{CliError, invalid};

/// Run `f` against a one-shot engine for this host.
pub async fn with_engine<F, Fut, T>(config: EngineConfig, f: F) -> Result<T, CliError>
where
    F: FnOnce(Engine) -> Fut,
    Fut: Future<Output = Result<T, CoreError>>,
{
    Ok(Engine::oneshot(config, f).await?)
}

/// Like [`with_engine`], but refuse to touch the DHCP configuration when
/// another DHCP authority claims the wireless interface.
pub async fn with_checked_engine<F, Fut, T>(config: EngineConfig, f: F) -> Result<T, CliError>
where
    F: FnOnce(Engine) -> Fut,
    Fut: Future<Output = Result<T, CoreError>>,
{
    with_engine(config, |engine| async move {
        engine.check().await?;
        f(engine).await
    })
    .await
}

/// The running daemon, if one answers on the control socket. Commands
/// that change host state go through it so they act on its engine
/// instead of starting a second one.
pub async fn daemon(config: &EngineConfig) -> Result<Option<ControlClient>, CliError> {
    let client = ControlClient::connect(&config.control_socket).await?;
    if client.is_some() {
        tracing::debug!(socket = %config.control_socket.display(), "forwarding to the running daemon");
    }
    Ok(client)
}

/// Send one request to the daemon. An error answer becomes this
/// command's error.
pub async fn ask(client: &mut ControlClient, request: &ControlRequest) -> Result<ControlResponse, CliError> {
    match client.request(request).await? {
        ControlResponse::Error { kind, message } => Err(CliError::Daemon { kind, message }),
        response => Ok(response),
    }
}

pub fn unexpected(request: &ControlRequest) -> CliError {
    CliError::Internal(format!("unexpected daemon response to {}", request.name()))
}

pub fn parse_mac(raw: &str) -> Result<MacAddress, CliError> {
    raw.parse().map_err(|e| invalid("mac", &e))
}

pub fn parse_plan(field: &str, raw: &str) -> Result<AddressPlan, CliError> {
    raw.parse().map_err(|e| invalid(field, &e))
}

/// Prompt for confirmation, auto-approving if `--yes` was passed.
pub fn confirm(message: &str, yes_flag: bool) -> Result<bool, CliError> {
    if yes_flag {
        return Ok(true);
    }
    if !std::io::stdin().is_terminal() {
        return Err(CliError::NonInteractiveRequiresYes {
            action: message.into(),
        });
    }
    dialoguer::Confirm::new()
        .with_prompt(message)
        .default(false)
        .interact()
        .map_err(|e| CliError::Io(std::io::Error::other(e)))
}

/// Spinner on stderr for long waits; hidden with `--quiet`.
pub fn spinner(message: &'static str, quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner} {msg} [{elapsed}]")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar.set_message(message);
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

/// `-` for empty values in detail views.
pub fn or_dash(value: Option<&str>) -> &str {
    value.unwrap_or("-")
}
