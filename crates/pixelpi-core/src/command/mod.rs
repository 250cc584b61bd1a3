// ── Command API ──
//
// Every mutating request from the administrative surface flows through a
// `Command`. The engine's command processor handles them one at a time,
// so two writes never interleave across components.

use std::net::Ipv4Addr;
use std::sync::Arc;

use crate::adapters::RefreshSummary;
use crate::dhcp::RebuildOutcome;
use crate::error::CoreError;
use crate::model::{Adapter, AddressPlan, ApSettings, ApState, MacAddress, Reservation};

/// A command envelope sent through the command channel.
/// Contains the command and a oneshot response channel.
pub(crate) struct CommandEnvelope {
    pub command: Command,
    pub response_tx: tokio::sync::oneshot::Sender<Result<CommandResult, CoreError>>,
}

/// All write operations against the engine.
#[derive(Debug, Clone)]
pub enum Command {
    // ── Adapters ─────────────────────────────────────────────────────
    ConfigureAdapter {
        id: String,
        plan: AddressPlan,
        isolation_domain: Option<String>,
    },
    RefreshAdapters,

    // ── Access point ─────────────────────────────────────────────────
    /// `None` uses the configured SSID and passphrase.
    EnableAp { settings: Option<ApSettings> },
    DisableAp,
    RetryAp,
    RestartAp,

    // ── Reservations ─────────────────────────────────────────────────
    Reserve {
        hardware_address: MacAddress,
        address: Ipv4Addr,
        label: String,
    },
    RemoveReservation { hardware_address: MacAddress },

    // ── DHCP ─────────────────────────────────────────────────────────
    RebuildDhcp,
}

impl Command {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ConfigureAdapter { .. } => "configure_adapter",
            Self::RefreshAdapters => "refresh_adapters",
            Self::EnableAp { .. } => "enable_ap",
            Self::DisableAp => "disable_ap",
            Self::RetryAp => "retry_ap",
            Self::RestartAp => "restart_ap",
            Self::Reserve { .. } => "reserve",
            Self::RemoveReservation { .. } => "remove_reservation",
            Self::RebuildDhcp => "rebuild_dhcp",
        }
    }
}

/// Result of a successfully executed command.
#[derive(Debug, Clone)]
pub enum CommandResult {
    Adapter(Arc<Adapter>),
    Refreshed(RefreshSummary),
    ApState(ApState),
    /// The change is on disk. `RebuildOutcome::Pending` means the DHCP
    /// service has not picked it up yet.
    Reservation(Reservation, RebuildOutcome),
    Removed(Reservation, RebuildOutcome),
    Rebuilt(RebuildOutcome),
}
