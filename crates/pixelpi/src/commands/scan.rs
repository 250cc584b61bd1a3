//! Discovery scan handler.

use std::time::Duration;

use tabled::Tabled;

use pixelpi_core::{DiscoveredDevice, ScanError, ScanReport, Subnet};

use crate::cli::{GlobalOpts, OutputFormat, ScanArgs};
use crate::config;
use crate::error::{CliError, invalid};
use crate::output;

use super::util;

// ── Table rows ──────────────────────────────────────────────────────

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "MAC")]
    mac: String,
    #[tabled(rename = "Controller")]
    controller: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Version")]
    version: String,
}

impl From<&DiscoveredDevice> for DeviceRow {
    fn from(d: &DiscoveredDevice) -> Self {
        let info = d.info.as_ref();
        Self {
            address: d.address.to_string(),
            mac: d.hardware_address.to_string(),
            controller: output::yes_no(d.responded).into(),
            name: info.and_then(|i| i.name.clone()).unwrap_or_default(),
            version: info.and_then(|i| i.version.clone()).unwrap_or_default(),
        }
    }
}

#[derive(Tabled)]
struct ErrorRow {
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "Error")]
    kind: String,
    #[tabled(rename = "Detail")]
    detail: String,
}

impl From<&ScanError> for ErrorRow {
    fn from(e: &ScanError) -> Self {
        Self {
            address: e.address.to_string(),
            kind: e.kind.to_string(),
            detail: e.detail.clone().unwrap_or_default(),
        }
    }
}

fn summary(report: &ScanReport) -> String {
    let controllers = report.devices.iter().filter(|d| d.responded).count();
    let mut line = format!(
        "{}: {} host(s), {controllers} controller(s) in {:.1}s",
        report.subnet,
        report.devices.len(),
        Duration::from_millis(report.elapsed_ms).as_secs_f64(),
    );
    if !report.errors.is_empty() {
        line.push_str(&format!(", {} host(s) not probed", report.errors.len()));
    }
    line
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(args: ScanArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let subnet = args
        .subnet
        .as_deref()
        .map(str::parse::<Subnet>)
        .transpose()
        .map_err(|e| invalid("subnet", &e))?;
    let engine_config = config::engine_config(global)?;

    let bar = util::spinner("Scanning", global.quiet);
    let reports = util::with_checked_engine(engine_config, |engine| async move {
        match subnet {
            Some(subnet) => Ok(vec![engine.scan(subnet).await?]),
            None => engine.scan_all().await,
        }
    })
    .await;
    bar.finish_and_clear();
    let reports = reports?;

    if reports.is_empty() {
        output::notice(
            "No wired subnets are configured; pass one explicitly, e.g. pixelpi scan 10.0.1.0/24",
            global.quiet,
        );
        return Ok(());
    }

    match global.output {
        // structured formats get the full reports, errors included
        OutputFormat::Json | OutputFormat::JsonCompact | OutputFormat::Yaml => {
            let out = output::render_single(
                &global.output,
                reports.as_slice(),
                |_| String::new(),
                |_| String::new(),
            )?;
            output::print_output(&out, global.quiet);
        }
        OutputFormat::Table | OutputFormat::Plain => {
            for report in &reports {
                let out = output::render_list(
                    &global.output,
                    &report.devices,
                    |d| DeviceRow::from(d),
                    |d| format!("{} {}", d.address, d.hardware_address),
                )?;
                output::print_output(&out, global.quiet);
                if args.show_errors && !report.errors.is_empty() {
                    let errors = output::render_list(
                        &global.output,
                        &report.errors,
                        |e| ErrorRow::from(e),
                        |e| format!("{} {}", e.address, e.kind),
                    )?;
                    output::print_output(&errors, global.quiet);
                }
                output::notice(&summary(report), global.quiet);
            }
        }
    }
    Ok(())
}
