// ── Operation catalogue ──
//
// Every effect the engine has on the host is one of these. Each variant
// knows the program and argument vector it maps to; `Display` renders a
// log-safe form with secrets redacted.

use std::fmt;
use std::net::Ipv4Addr;

use secrecy::{ExposeSecret, SecretString};

use crate::model::AddressPlan;

/// Settings of a connection-manager profile.
#[derive(Debug, Clone)]
pub enum ConnectionProfile {
    /// Wired interface with a manual IPv4 address, autoconnect on.
    StaticEthernet { address: AddressPlan },
    /// Wireless access point in shared-addressing mode. The connection
    /// manager serves DHCP on it; autoconnect stays off.
    AccessPoint {
        ssid: String,
        passphrase: SecretString,
        address: AddressPlan,
        channel: u8,
    },
}

#[derive(Debug, Clone)]
pub enum Operation {
    // ── Interface queries ────────────────────────────────────────────
    ListLinks,
    ShowAddresses,
    LinkExists { interface: String },
    DriverName { interface: String },

    // ── Connection manager ───────────────────────────────────────────
    DeviceStates,
    ManagerStatus,
    RadioUnblock,
    RadioOn,
    ConnectionExists { name: String },
    ConnectionAdd {
        name: String,
        interface: String,
        profile: ConnectionProfile,
    },
    ConnectionModify { name: String, profile: ConnectionProfile },
    ConnectionDelete { name: String },
    ConnectionUp { name: String },
    ConnectionDown { name: String },
    ActiveConnections,

    // ── Services ─────────────────────────────────────────────────────
    ServiceIsActive { service: String },
    ServiceRestart { service: String },

    // ── Neighbour discovery ──────────────────────────────────────────
    NeighborShow { interface: String },
    NeighborLookup { address: Ipv4Addr },
    Arping { interface: Option<String>, address: Ipv4Addr },
}

fn s(v: &str) -> String {
    v.to_owned()
}

impl ConnectionProfile {
    fn settings(&self) -> Vec<String> {
        match self {
            Self::StaticEthernet { address } => vec![
                s("ipv4.addresses"),
                address.to_string(),
                s("ipv4.method"),
                s("manual"),
            ],
            Self::AccessPoint {
                ssid,
                passphrase,
                address,
                channel,
            } => vec![
                s("autoconnect"),
                s("no"),
                s("ssid"),
                ssid.clone(),
                s("802-11-wireless.mode"),
                s("ap"),
                s("802-11-wireless.band"),
                s("bg"),
                s("802-11-wireless.channel"),
                channel.to_string(),
                s("ipv4.method"),
                s("shared"),
                s("ipv4.addresses"),
                address.to_string(),
                s("wifi-sec.key-mgmt"),
                s("wpa-psk"),
                s("wifi-sec.psk"),
                passphrase.expose_secret().to_owned(),
            ],
        }
    }

    fn connection_type(&self) -> &'static str {
        match self {
            Self::StaticEthernet { .. } => "ethernet",
            Self::AccessPoint { .. } => "wifi",
        }
    }
}

impl Operation {
    pub fn program(&self) -> &'static str {
        match self {
            Self::ListLinks
            | Self::ShowAddresses
            | Self::LinkExists { .. }
            | Self::NeighborShow { .. }
            | Self::NeighborLookup { .. } => "ip",
            Self::DriverName { .. } => "readlink",
            Self::RadioUnblock => "rfkill",
            Self::ServiceIsActive { .. } | Self::ServiceRestart { .. } => "systemctl",
            Self::Arping { .. } => "arping",
            Self::DeviceStates
            | Self::ManagerStatus
            | Self::RadioOn
            | Self::ConnectionExists { .. }
            | Self::ConnectionAdd { .. }
            | Self::ConnectionModify { .. }
            | Self::ConnectionDelete { .. }
            | Self::ConnectionUp { .. }
            | Self::ConnectionDown { .. }
            | Self::ActiveConnections => "nmcli",
        }
    }

    pub fn args(&self) -> Vec<String> {
        match self {
            Self::ListLinks => vec![s("-o"), s("link"), s("show")],
            Self::ShowAddresses => vec![s("-o"), s("-4"), s("addr"), s("show")],
            Self::LinkExists { interface } => vec![s("link"), s("show"), interface.clone()],
            Self::DriverName { interface } => vec![
                s("-f"),
                format!("/sys/class/net/{interface}/device/driver"),
            ],
            Self::DeviceStates => vec![s("-t"), s("-f"), s("DEVICE,STATE"), s("device")],
            Self::ManagerStatus => vec![s("general"), s("status")],
            Self::RadioUnblock => vec![s("unblock"), s("wifi")],
            Self::RadioOn => vec![s("radio"), s("wifi"), s("on")],
            Self::ConnectionExists { name } => vec![s("connection"), s("show"), name.clone()],
            Self::ConnectionAdd {
                name,
                interface,
                profile,
            } => {
                let mut args = vec![
                    s("connection"),
                    s("add"),
                    s("type"),
                    s(profile.connection_type()),
                    s("ifname"),
                    interface.clone(),
                    s("con-name"),
                    name.clone(),
                ];
                args.extend(profile.settings());
                if matches!(profile, ConnectionProfile::StaticEthernet { .. }) {
                    args.extend([s("connection.autoconnect"), s("yes")]);
                }
                args
            }
            Self::ConnectionModify { name, profile } => {
                let mut args = vec![s("connection"), s("modify"), name.clone()];
                args.extend(profile.settings());
                args
            }
            Self::ConnectionDelete { name } => vec![s("connection"), s("delete"), name.clone()],
            Self::ConnectionUp { name } => vec![s("connection"), s("up"), name.clone()],
            Self::ConnectionDown { name } => vec![s("connection"), s("down"), name.clone()],
            Self::ActiveConnections => vec![
                s("-t"),
                s("-f"),
                s("NAME"),
                s("connection"),
                s("show"),
                s("--active"),
            ],
            Self::ServiceIsActive { service } => vec![s("is-active"), service.clone()],
            Self::ServiceRestart { service } => vec![s("restart"), service.clone()],
            Self::NeighborShow { interface } => {
                vec![s("neigh"), s("show"), s("dev"), interface.clone()]
            }
            Self::NeighborLookup { address } => vec![s("neigh"), s("show"), address.to_string()],
            Self::Arping { interface, address } => {
                let mut args = vec![s("-c"), s("1"), s("-w"), s("1")];
                if let Some(iface) = interface {
                    args.extend([s("-I"), iface.clone()]);
                }
                args.push(address.to_string());
                args
            }
        }
    }

    /// Connection-manager operations that change state. Used to decide
    /// which failures deserve a warning.
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            Self::RadioUnblock
                | Self::RadioOn
                | Self::ConnectionAdd { .. }
                | Self::ConnectionModify { .. }
                | Self::ConnectionDelete { .. }
                | Self::ConnectionUp { .. }
                | Self::ConnectionDown { .. }
                | Self::ServiceRestart { .. }
        )
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program())?;
        let mut redact_next = false;
        for arg in self.args() {
            if redact_next {
                f.write_str(" ********")?;
                redact_next = false;
                continue;
            }
            redact_next = arg == "wifi-sec.psk";
            if arg.contains(' ') {
                write!(f, " '{arg}'")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn ap_profile() -> ConnectionProfile {
        ConnectionProfile::AccessPoint {
            ssid: "WLED AP".into(),
            passphrase: SecretString::from("supersecret".to_owned()),
            address: "10.0.2.1/24".parse().unwrap(),
            channel: 6,
        }
    }

    #[test]
    fn ap_connection_uses_shared_mode_without_autoconnect() {
        let op = Operation::ConnectionAdd {
            name: "pixelpi-ap".into(),
            interface: "wlan0".into(),
            profile: ap_profile(),
        };
        let args = op.args();
        assert_eq!(op.program(), "nmcli");
        let joined = args.join(" ");
        assert!(joined.contains("ipv4.method shared"));
        assert!(joined.contains("autoconnect no"));
        assert!(joined.contains("802-11-wireless.mode ap"));
        assert!(joined.contains("wifi-sec.psk supersecret"));
    }

    #[test]
    fn display_redacts_passphrase() {
        let op = Operation::ConnectionAdd {
            name: "pixelpi-ap".into(),
            interface: "wlan0".into(),
            profile: ap_profile(),
        };
        let rendered = op.to_string();
        assert!(!rendered.contains("supersecret"));
        assert!(rendered.contains("wifi-sec.psk ********"));
        assert!(rendered.contains("ssid 'WLED AP'"));
    }

    #[test]
    fn static_ethernet_add_enables_autoconnect() {
        let op = Operation::ConnectionAdd {
            name: "eth1-static".into(),
            interface: "eth1".into(),
            profile: ConnectionProfile::StaticEthernet {
                address: "10.0.1.1/24".parse().unwrap(),
            },
        };
        assert_eq!(
            op.to_string(),
            "nmcli connection add type ethernet ifname eth1 con-name eth1-static \
             ipv4.addresses 10.0.1.1/24 ipv4.method manual connection.autoconnect yes"
        );
    }

    #[test]
    fn arping_binds_interface_when_given() {
        let op = Operation::Arping {
            interface: Some("eth1".into()),
            address: Ipv4Addr::new(10, 0, 1, 20),
        };
        assert_eq!(op.to_string(), "arping -c 1 -w 1 -I eth1 10.0.1.20");
    }
}
