// ── Adapter domain types ──

use chrono::{DateTime, Utc};
use serde::Serialize;
use strum::{AsRefStr, Display, EnumString};

use super::address::AddressPlan;
use super::mac::MacAddress;

/// What an adapter is used for on this host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, EnumString, AsRefStr)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum AdapterRole {
    Wired,
    Wireless,
    /// The single wireless interface that carries the access point.
    WirelessAp,
}

impl AdapterRole {
    pub fn is_wired(self) -> bool {
        matches!(self, Self::Wired)
    }

    pub fn is_wireless(self) -> bool {
        matches!(self, Self::Wireless | Self::WirelessAp)
    }
}

/// Link state as last observed by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, EnumString, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LinkState {
    /// Known adapter that disappeared from the last enumeration.
    Absent,
    Down,
    Up,
}

/// A physical network adapter, keyed by interface name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Adapter {
    /// Kernel interface name (`eth1`, `wlan0`, `enx00e04c680001`).
    pub id: String,
    pub hardware_address: Option<MacAddress>,
    pub role: AdapterRole,
    pub link_state: LinkState,
    /// Static plan applied through the registry, if any.
    pub assigned_address: Option<AddressPlan>,
    /// IPv4 addresses currently present on the interface (`10.0.1.1/24`).
    pub current_addresses: Vec<String>,
    pub isolation_domain: String,
    pub driver: Option<String>,
    /// The board's own port, excluded from the USB adapter view.
    pub builtin: bool,
    pub last_seen_at: DateTime<Utc>,
}

impl Adapter {
    pub fn is_present(&self) -> bool {
        self.link_state != LinkState::Absent
    }

    /// Name of the per-interface static connection profile.
    pub fn static_connection_name(&self) -> String {
        static_connection_name(&self.id)
    }
}

pub(crate) fn static_connection_name(interface: &str) -> String {
    format!("{interface}-static")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn roles_render_kebab_case() {
        assert_eq!(AdapterRole::WirelessAp.to_string(), "wireless-ap");
        assert_eq!("wired".parse::<AdapterRole>().unwrap(), AdapterRole::Wired);
        assert!(AdapterRole::WirelessAp.is_wireless());
        assert!(!AdapterRole::Wireless.is_wired());
    }

    #[test]
    fn static_connection_is_named_after_interface() {
        assert_eq!(static_connection_name("eth1"), "eth1-static");
    }
}
