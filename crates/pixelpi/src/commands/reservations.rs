//! Reservation command handlers.

use tabled::Tabled;

use pixelpi_core::{Command as CoreCommand, CommandResult, ControlRequest, ControlResponse, RebuildOutcome, Reservation};

use crate::cli::{GlobalOpts, ReservationsArgs, ReservationsCommand};
use crate::config;
use crate::error::CliError;
use crate::output;

use super::util;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct ReservationRow {
    #[tabled(rename = "MAC")]
    mac: String,
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "Label")]
    label: String,
    #[tabled(rename = "Created")]
    created: String,
}

impl From<&Reservation> for ReservationRow {
    fn from(r: &Reservation) -> Self {
        Self {
            mac: r.hardware_address.to_string(),
            address: r.address.to_string(),
            label: r.label.clone(),
            created: r.created_at.format("%Y-%m-%d %H:%M").to_string(),
        }
    }
}

fn detail(r: &Reservation) -> String {
    let hostname = r.hostname();
    [
        format!("MAC:      {}", r.hardware_address),
        format!("Address:  {}", r.address),
        format!("Label:    {}", if r.label.is_empty() { "-" } else { &r.label }),
        format!("Hostname: {}", util::or_dash(hostname.as_deref())),
        format!("Created:  {}", r.created_at.format("%Y-%m-%d %H:%M:%S UTC")),
    ]
    .join("\n")
}

fn print_one(reservation: &Reservation, global: &GlobalOpts) -> Result<(), CliError> {
    let out = output::render_single(&global.output, reservation, detail, |r| {
        r.hardware_address.to_string()
    })?;
    output::print_output(&out, global.quiet);
    Ok(())
}

/// The change is saved either way; say so when DHCP has not caught up.
fn report_dhcp(outcome: RebuildOutcome, daemon: bool, quiet: bool) {
    if outcome != RebuildOutcome::Pending {
        return;
    }
    let next = if daemon {
        "the daemon retries on its next rebuild"
    } else {
        "restart the DHCP service by hand"
    };
    output::notice(
        &format!("Warning: saved, but the DHCP service did not reload; {next}"),
        quiet,
    );
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(args: ReservationsArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ReservationsCommand::List => {
            let engine_config = config::engine_config(global)?;
            let reservations = util::with_engine(engine_config, |engine| async move {
                Ok(engine.reservations().list().await)
            })
            .await?;
            let out = output::render_list(
                &global.output,
                &reservations,
                |r| ReservationRow::from(r),
                |r| format!("{} {}", r.hardware_address, r.address),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ReservationsCommand::Add {
            mac,
            address,
            label,
        } => {
            let hardware_address = util::parse_mac(&mac)?;
            let engine_config = config::engine_config(global)?;

            if let Some(mut client) = util::daemon(&engine_config).await? {
                let request = ControlRequest::Reserve {
                    hardware_address,
                    address,
                    label,
                };
                let ControlResponse::Reservation { reservation, dhcp } = util::ask(&mut client, &request).await? else {
                    return Err(util::unexpected(&request));
                };
                report_dhcp(dhcp, true, global.quiet);
                return print_one(&reservation, global);
            }

            let command = CoreCommand::Reserve {
                hardware_address,
                address,
                label,
            };
            let result =
                util::with_checked_engine(engine_config, |engine| async move { engine.execute(command).await })
                    .await?;
            let CommandResult::Reservation(reservation, dhcp) = result else {
                return Err(CliError::Internal("unexpected result for reservation".into()));
            };
            report_dhcp(dhcp, false, global.quiet);
            print_one(&reservation, global)
        }

        ReservationsCommand::Remove { mac } => {
            let hardware_address = util::parse_mac(&mac)?;
            if !util::confirm(&format!("Remove the reservation for {hardware_address}?"), global.yes)? {
                return Ok(());
            }
            let engine_config = config::engine_config(global)?;

            let (removed, dhcp, daemon) = if let Some(mut client) = util::daemon(&engine_config).await? {
                let request = ControlRequest::RemoveReservation { hardware_address };
                let ControlResponse::Removed { reservation, dhcp } = util::ask(&mut client, &request).await? else {
                    return Err(util::unexpected(&request));
                };
                (reservation, dhcp, true)
            } else {
                let command = CoreCommand::RemoveReservation { hardware_address };
                let result =
                    util::with_checked_engine(engine_config, |engine| async move { engine.execute(command).await })
                        .await?;
                let CommandResult::Removed(reservation, dhcp) = result else {
                    return Err(CliError::Internal("unexpected result for reservation removal".into()));
                };
                (reservation, dhcp, false)
            };
            report_dhcp(dhcp, daemon, global.quiet);
            output::notice(
                &format!("Removed {} ({})", removed.hardware_address, removed.address),
                global.quiet,
            );
            Ok(())
        }
    }
}
