//! Access point command handlers.

use secrecy::SecretString;
use tabled::Tabled;

use pixelpi_core::{
    ApClient, ApSettings, ApState, ApStatus, Command as CoreCommand, ControlClient, ControlRequest,
    ControlResponse, CoreError, EngineConfig,
};

use crate::cli::{ApArgs, ApCommand, ApEnableArgs, GlobalOpts};
use crate::config;
use crate::error::CliError;
use crate::output;

use super::util;

// ── Table rows ──────────────────────────────────────────────────────

#[derive(Tabled)]
struct ClientRow {
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "MAC")]
    mac: String,
    #[tabled(rename = "State")]
    state: String,
}

impl From<&ApClient> for ClientRow {
    fn from(c: &ApClient) -> Self {
        Self {
            address: c.address.to_string(),
            mac: c.hardware_address.to_string(),
            state: c.state.clone(),
        }
    }
}

fn detail(status: &ApStatus, color: bool) -> String {
    let mut lines = vec![
        format!("Interface: {}", status.interface),
        format!("State:     {}", output::paint_state(status.state, color)),
        format!("SSID:      {}", util::or_dash(status.ssid.as_deref())),
        format!("Degraded:  {}", output::yes_no(status.degraded)),
        format!("Since:     {}", status.changed_at.format("%Y-%m-%d %H:%M:%S UTC")),
    ];
    if let Some(ref failure) = status.last_failure {
        lines.push(format!("Failure:   {} ({})", failure.message, failure.kind));
    }
    for attempt in &status.failed_attempts {
        let code = attempt
            .exit_code
            .map_or_else(|| "timeout".to_owned(), |c| format!("exit {c}"));
        lines.push(format!("Attempt {}: {code}: {}", attempt.attempt, attempt.detail));
    }
    lines.join("\n")
}

fn print_status(status: &ApStatus, global: &GlobalOpts) -> Result<(), CliError> {
    let color = output::should_color(&global.color);
    let out = output::render_single(
        &global.output,
        status,
        |s| detail(s, color),
        |s| s.state.to_string(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

/// A settled `Failed` status becomes the command's error.
fn settled(status: ApStatus) -> Result<ApStatus, CliError> {
    if status.state != ApState::Failed {
        return Ok(status);
    }
    let (kind, message) = status.last_failure.map_or_else(
        || ("unknown".into(), "activation failed".into()),
        |f| (f.kind, f.message),
    );
    Err(CliError::ApFailed { kind, message })
}

fn print_clients(clients: &[ApClient], global: &GlobalOpts) -> Result<(), CliError> {
    let out = output::render_list(
        &global.output,
        clients,
        |c| ClientRow::from(c),
        |c| c.address.to_string(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

// ── Settings ────────────────────────────────────────────────────────

fn prompt_passphrase() -> Result<String, CliError> {
    dialoguer::Password::new()
        .with_prompt("Access point passphrase")
        .interact()
        .map_err(|e| CliError::Io(std::io::Error::other(e)))
}

fn settings(engine_config: &EngineConfig, args: &ApEnableArgs) -> Result<ApSettings, CliError> {
    let ap = &engine_config.ap;
    let address = match args.address {
        Some(ref raw) => util::parse_plan("address", raw)?,
        None => ap.address,
    };

    let passphrase = if args.ask_passphrase {
        SecretString::from(prompt_passphrase()?)
    } else {
        ap.passphrase.clone().ok_or(CliError::NoPassphrase)?
    };

    let settings = ApSettings {
        ssid: args.ssid.clone().unwrap_or_else(|| ap.ssid.clone()),
        passphrase,
        address,
        channel: args.channel.unwrap_or(ap.channel),
    };
    settings.validate()?;
    Ok(settings)
}

// ── Through the daemon ──────────────────────────────────────────────

/// The daemon owns the access point while it runs; a second controller
/// here would fight it over the same connection.
async fn via_daemon(command: ApCommand, client: &mut ControlClient, global: &GlobalOpts) -> Result<(), CliError> {
    let request = match command {
        ApCommand::State => ControlRequest::ApStatus,
        ApCommand::Clients => {
            let request = ControlRequest::ApClients;
            let ControlResponse::Clients { clients } = util::ask(client, &request).await? else {
                return Err(util::unexpected(&request));
            };
            return print_clients(&clients, global);
        }
        ApCommand::Enable(enable) => ControlRequest::EnableAp {
            passphrase: if enable.ask_passphrase {
                Some(prompt_passphrase()?)
            } else {
                None
            },
            address: enable
                .address
                .as_deref()
                .map(|raw| util::parse_plan("address", raw))
                .transpose()?,
            ssid: enable.ssid,
            channel: enable.channel,
        },
        ApCommand::Disable => ControlRequest::DisableAp,
        ApCommand::Retry => ControlRequest::RetryAp,
        ApCommand::Restart => ControlRequest::RestartAp,
    };

    let waits = matches!(request, ControlRequest::EnableAp { .. } | ControlRequest::RetryAp);
    let bar = util::spinner("Waiting for the daemon's access point", global.quiet || !waits);
    let response = util::ask(client, &request).await;
    bar.finish_and_clear();
    let ControlResponse::Ap { status } = response? else {
        return Err(util::unexpected(&request));
    };
    let status = if waits { settled(status)? } else { status };
    print_status(&status, global)
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(args: ApArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let engine_config = config::engine_config(global)?;
    if let Some(mut client) = util::daemon(&engine_config).await? {
        return via_daemon(args.command, &mut client, global).await;
    }

    match args.command {
        ApCommand::State => {
            let status = util::with_engine(engine_config, |engine| async move { Ok(engine.ap().status()) }).await?;
            print_status(&status, global)
        }

        ApCommand::Enable(enable) => {
            let settings = settings(&engine_config, &enable)?;
            let bar = util::spinner("Bringing up the access point", global.quiet);
            let status = util::with_engine(engine_config, |engine| async move {
                engine
                    .execute(CoreCommand::EnableAp {
                        settings: Some(settings),
                    })
                    .await?;
                Ok(engine.ap().wait_settled().await)
            })
            .await;
            bar.finish_and_clear();
            let status = settled(status?)?;
            print_status(&status, global)
        }

        ApCommand::Disable => {
            let status = util::with_engine(engine_config, |engine| async move {
                engine.execute(CoreCommand::DisableAp).await?;
                Ok(engine.ap().status())
            })
            .await?;
            print_status(&status, global)
        }

        ApCommand::Retry => {
            let bar = util::spinner("Retrying access point activation", global.quiet);
            let status = util::with_engine(engine_config, |engine| async move {
                match engine.execute(CoreCommand::RetryAp).await {
                    Ok(_) => {}
                    // a fresh process has no failed activation of its own
                    // to retry, so start a new one
                    Err(CoreError::InvalidState { .. }) if engine.ap().state() == ApState::Disabled => {
                        engine.execute(CoreCommand::EnableAp { settings: None }).await?;
                    }
                    Err(e) => return Err(e),
                }
                Ok(engine.ap().wait_settled().await)
            })
            .await;
            bar.finish_and_clear();
            let status = settled(status?)?;
            print_status(&status, global)
        }

        ApCommand::Restart => {
            let status = util::with_engine(engine_config, |engine| async move {
                engine.execute(CoreCommand::RestartAp).await?;
                Ok(engine.ap().status())
            })
            .await?;
            print_status(&status, global)
        }

        ApCommand::Clients => {
            let clients = util::with_engine(engine_config, |engine| async move { engine.ap().clients().await }).await?;
            print_clients(&clients, global)
        }
    }
}
