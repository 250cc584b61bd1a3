// ── Wired DHCP configuration rendering ──
//
// Pure function from (wired plans, reservations) to the dnsmasq drop-in.
// Interfaces are whitelisted with `interface=`; the wireless interface is
// never named, so the file cannot hand it a range.

use std::fmt::Write as _;

use crate::config::DhcpConfig;
use crate::model::{AddressPlan, Reservation};

pub(crate) const HEADER: &str =
    "# Generated by pixelpi. Do not edit: this file is rewritten on every change.";

/// Render the wired-side DHCP service configuration.
pub(crate) fn render_wired_config(
    ap_interface: &str,
    plans: &[(String, AddressPlan)],
    reservations: &[Reservation],
    config: &DhcpConfig,
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{HEADER}");
    out.push('\n');
    out.push_str("bind-dynamic\n");

    let wired: Vec<&(String, AddressPlan)> = plans
        .iter()
        .filter(|(iface, _)| iface != ap_interface)
        .collect();

    if wired.is_empty() {
        // with no whitelist dnsmasq would bind everything
        out.push_str("\n# No wired adapters configured\ninterface=lo\nno-dhcp-interface=lo\n");
    }

    for (interface, plan) in wired {
        let subnet = plan.subnet();
        out.push('\n');
        let _ = writeln!(out, "# {interface} ({subnet})");
        let _ = writeln!(out, "interface={interface}");

        match (
            subnet.nth_host(config.pool_start),
            subnet.nth_host(config.pool_end),
        ) {
            (Some(start), Some(end)) if start <= end => {
                let _ = writeln!(
                    out,
                    "dhcp-range={interface},{start},{end},{}",
                    config.lease
                );
            }
            _ => {
                let _ = writeln!(
                    out,
                    "# pool {}..{} does not fit {subnet}",
                    config.pool_start, config.pool_end
                );
            }
        }

        let _ = writeln!(out, "dhcp-option={interface},3,{}", plan.address);
        let dns = if config.dns_servers.is_empty() {
            plan.address.to_string()
        } else {
            config
                .dns_servers
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(",")
        };
        let _ = writeln!(out, "dhcp-option={interface},6,{dns}");
    }

    if !reservations.is_empty() {
        out.push_str("\n# Reservations\n");
        for r in reservations {
            match r.hostname() {
                Some(host) => {
                    let _ = writeln!(out, "dhcp-host={},{host},{}", r.hardware_address, r.address);
                }
                None => {
                    let _ = writeln!(out, "dhcp-host={},{}", r.hardware_address, r.address);
                }
            }
        }
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use std::net::Ipv4Addr;

    #[test]
    fn renders_ranges_options_and_hosts() {
        let plans = vec![("eth1".to_owned(), "10.0.1.1/24".parse().unwrap())];
        let reservations = vec![
            Reservation {
                hardware_address: "aa:bb:cc:dd:ee:ff".parse().unwrap(),
                address: Ipv4Addr::new(10, 0, 1, 50),
                label: "Controller 1".into(),
                created_at: Utc::now(),
            },
            Reservation {
                hardware_address: "11:22:33:44:55:66".parse().unwrap(),
                address: Ipv4Addr::new(10, 0, 1, 51),
                label: String::new(),
                created_at: Utc::now(),
            },
        ];
        let rendered = render_wired_config("wlan0", &plans, &reservations, &DhcpConfig::default());
        let expected = format!(
            "{HEADER}

bind-dynamic

# eth1 (10.0.1.0/24)
interface=eth1
dhcp-range=eth1,10.0.1.10,10.0.1.50,24h
dhcp-option=eth1,3,10.0.1.1
dhcp-option=eth1,6,10.0.1.1

# Reservations
dhcp-host=aa:bb:cc:dd:ee:ff,controller-1,10.0.1.50
dhcp-host=11:22:33:44:55:66,10.0.1.51
"
        );
        assert_eq!(rendered, expected);
    }

    #[test]
    fn pool_that_does_not_fit_is_commented_out() {
        let plans = vec![("eth1".to_owned(), "10.0.1.1/28".parse().unwrap())];
        let rendered = render_wired_config("wlan0", &plans, &[], &DhcpConfig::default());
        assert!(rendered.contains("# pool 10..50 does not fit 10.0.1.0/28"));
        assert!(!rendered.contains("dhcp-range"));
    }

    #[test]
    fn wireless_interface_never_appears() {
        let plans = vec![
            ("wlan0".to_owned(), "10.0.2.1/24".parse().unwrap()),
            ("eth2".to_owned(), "10.0.3.1/24".parse().unwrap()),
        ];
        let rendered = render_wired_config("wlan0", &plans, &[], &DhcpConfig::default());
        assert!(!rendered.contains("wlan0"));
        assert!(rendered.contains("interface=eth2"));
    }

    #[test]
    fn no_wired_adapters_binds_loopback_only() {
        let rendered = render_wired_config("wlan0", &[], &[], &DhcpConfig::default());
        assert!(rendered.contains("interface=lo\nno-dhcp-interface=lo"));
        assert!(!rendered.contains("dhcp-range"));
    }

    #[test]
    fn explicit_dns_servers() {
        let plans = vec![("eth1".to_owned(), "10.0.1.1/24".parse().unwrap())];
        let config = DhcpConfig {
            dns_servers: vec![Ipv4Addr::new(1, 1, 1, 1), Ipv4Addr::new(9, 9, 9, 9)],
            ..DhcpConfig::default()
        };
        let rendered = render_wired_config("wlan0", &plans, &[], &config);
        assert!(rendered.contains("dhcp-option=eth1,6,1.1.1.1,9.9.9.9"));
    }
}
