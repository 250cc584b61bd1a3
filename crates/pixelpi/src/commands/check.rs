//! `pixelpi check`: DHCP authority self-check plus a host summary.

use pixelpi_core::SystemStatus;

use crate::cli::GlobalOpts;
use crate::config;
use crate::error::CliError;
use crate::output;

use super::util;

fn detail(status: &SystemStatus, color: bool) -> String {
    let degraded = if status.ap_degraded { " (degraded)" } else { "" };
    [
        format!("DHCP service:       {}", active(status.dhcp_service_active)),
        format!("Connection manager: {}", active(status.connection_manager_active)),
        format!("USB adapters:       {}", status.usb_adapters),
        format!("Reservations:       {}", status.reservations),
        format!(
            "Access point:       {}{degraded}",
            output::paint_state(status.ap_state, color)
        ),
    ]
    .join("\n")
}

fn active(up: bool) -> &'static str {
    if up { "active" } else { "inactive" }
}

pub async fn handle(global: &GlobalOpts) -> Result<(), CliError> {
    let engine_config = config::engine_config(global)?;
    let (status, conflict) = util::with_engine(engine_config, |engine| async move {
        let conflict = engine.check().await.err();
        Ok((engine.status().await, conflict))
    })
    .await?;

    let color = output::should_color(&global.color);
    let out = output::render_single(
        &global.output,
        &status,
        |s| detail(s, color),
        |s| s.ap_state.to_string(),
    )?;
    output::print_output(&out, global.quiet);

    // status first so the operator sees the whole picture
    match conflict {
        Some(e) => Err(e.into()),
        None => {
            output::notice("No DHCP conflicts found", global.quiet);
            Ok(())
        }
    }
}
