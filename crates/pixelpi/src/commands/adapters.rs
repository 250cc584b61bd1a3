//! Adapter command handlers.

use std::sync::Arc;

use tabled::Tabled;

use pixelpi_core::{Adapter, Command as CoreCommand, CommandResult};

use crate::cli::{AdaptersArgs, AdaptersCommand, GlobalOpts};
use crate::config::{self, PlanSection};
use crate::error::CliError;
use crate::output;

use super::util;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct AdapterRow {
    #[tabled(rename = "Interface")]
    id: String,
    #[tabled(rename = "Role")]
    role: String,
    #[tabled(rename = "Link")]
    link: String,
    #[tabled(rename = "MAC")]
    mac: String,
    #[tabled(rename = "Plan")]
    plan: String,
    #[tabled(rename = "Addresses")]
    current: String,
    #[tabled(rename = "Domain")]
    domain: String,
    #[tabled(rename = "Driver")]
    driver: String,
}

impl From<&Arc<Adapter>> for AdapterRow {
    fn from(a: &Arc<Adapter>) -> Self {
        Self {
            id: a.id.clone(),
            role: if a.builtin {
                format!("{} (built-in)", a.role)
            } else {
                a.role.to_string()
            },
            link: a.link_state.to_string(),
            mac: a.hardware_address.as_ref().map(ToString::to_string).unwrap_or_default(),
            plan: a.assigned_address.map(|p| p.to_string()).unwrap_or_default(),
            current: a.current_addresses.join(", "),
            domain: a.isolation_domain.clone(),
            driver: a.driver.clone().unwrap_or_default(),
        }
    }
}

fn detail(a: &Arc<Adapter>) -> String {
    let plan = a.assigned_address.map(|p| p.to_string());
    let mac = a.hardware_address.as_ref().map(ToString::to_string);
    [
        format!("Interface:  {}", a.id),
        format!("Role:       {}", a.role),
        format!("Built-in:   {}", output::yes_no(a.builtin)),
        format!("Link:       {}", a.link_state),
        format!("MAC:        {}", util::or_dash(mac.as_deref())),
        format!("Driver:     {}", util::or_dash(a.driver.as_deref())),
        format!("Plan:       {}", util::or_dash(plan.as_deref())),
        format!(
            "Addresses:  {}",
            if a.current_addresses.is_empty() {
                "-".to_owned()
            } else {
                a.current_addresses.join(", ")
            }
        ),
        format!("Domain:     {}", a.isolation_domain),
        format!("Connection: {}", a.static_connection_name()),
        format!("Last seen:  {}", a.last_seen_at.format("%Y-%m-%d %H:%M:%S UTC")),
    ]
    .join("\n")
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(args: AdaptersArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        AdaptersCommand::List { usb } => {
            let engine_config = config::engine_config(global)?;
            let adapters = util::with_engine(engine_config, |engine| async move {
                Ok(if usb {
                    engine.adapters().usb_adapters()
                } else {
                    engine.adapters_snapshot().to_vec()
                })
            })
            .await?;
            let out = output::render_list(&global.output, &adapters, |a| AdapterRow::from(a), |a| a.id.clone())?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        AdaptersCommand::Get { id } => {
            let engine_config = config::engine_config(global)?;
            let lookup = id.clone();
            let found = util::with_engine(engine_config, |engine| async move {
                Ok(engine.adapters().get(&lookup))
            })
            .await?;
            let adapter = found.ok_or_else(|| CliError::NotFound {
                resource_type: "adapter".into(),
                identifier: id,
                list_command: "adapters list".into(),
            })?;
            let out = output::render_single(&global.output, &adapter, detail, |a| a.id.clone())?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        AdaptersCommand::Configure {
            id,
            address,
            isolation_domain,
            save,
        } => {
            let plan = util::parse_plan("address", &address)?;
            let engine_config = config::engine_config(global)?;
            let command = CoreCommand::ConfigureAdapter {
                id: id.clone(),
                plan,
                isolation_domain: isolation_domain.clone(),
            };
            let result =
                util::with_checked_engine(engine_config, |engine| async move { engine.execute(command).await })
                    .await?;
            let CommandResult::Adapter(adapter) = result else {
                return Err(CliError::Internal("unexpected result for adapter configuration".into()));
            };

            if save {
                let path = config::path(global);
                let mut file = config::load(global)?;
                file.adapters.plans.insert(
                    id,
                    PlanSection {
                        address: plan.to_string(),
                        isolation_domain,
                    },
                );
                config::save_config(&file, &path)?;
                output::notice(&format!("Plan saved to {}", path.display()), global.quiet);
            }

            let out = output::render_single(&global.output, &adapter, detail, |a| a.id.clone())?;
            output::print_output(&out, global.quiet);
            Ok(())
        }
    }
}
