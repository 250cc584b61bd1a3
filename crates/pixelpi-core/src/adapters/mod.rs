// ── Adapter registry ──
//
// Owns every `Adapter` record. Populated at startup and re-enumerated on
// hotplug notifications; the only writer of adapter state.

mod registry;

pub use registry::{AdapterRegistry, RefreshSummary};

use crate::parse::parse_monitor_interface;

/// A hotplug notification. Triggers a registry refresh; the payload is
/// informational.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HotplugEvent {
    LinkChanged { interface: String },
    LinkRemoved { interface: String },
    /// Re-enumerate without a specific interface in mind.
    Rescan,
}

impl HotplugEvent {
    pub fn interface(&self) -> Option<&str> {
        match self {
            Self::LinkChanged { interface } | Self::LinkRemoved { interface } => Some(interface),
            Self::Rescan => None,
        }
    }
}

/// Translate a line of `ip -o monitor link` into an event.
pub(crate) fn parse_monitor_line(line: &str) -> Option<HotplugEvent> {
    let (interface, deleted) = parse_monitor_interface(line)?;
    Some(if deleted {
        HotplugEvent::LinkRemoved { interface }
    } else {
        HotplugEvent::LinkChanged { interface }
    })
}
