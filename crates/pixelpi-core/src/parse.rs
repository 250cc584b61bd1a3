// ── Tool output parsers ──
//
// Line-oriented parsers for `ip -o` and `nmcli -t` output. Malformed
// lines are skipped; the tools are not versioned and a stray line must
// not take a refresh down.

use std::collections::HashMap;
use std::net::Ipv4Addr;

use crate::model::MacAddress;

/// Virtual interfaces never treated as adapters.
const VIRTUAL_PREFIXES: &[&str] = &["lo", "veth", "docker", "br-", "virbr", "tun", "tap", "wg"];

/// One entry of `ip -o link show`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LinkRecord {
    pub name: String,
    pub hardware_address: Option<MacAddress>,
    /// Administratively up with carrier.
    pub up: bool,
}

/// One entry of the neighbour table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct NeighborRecord {
    pub address: Ipv4Addr,
    pub hardware_address: Option<MacAddress>,
    pub state: String,
}

fn is_virtual(name: &str) -> bool {
    VIRTUAL_PREFIXES.iter().any(|p| name.starts_with(p))
}

/// Parse `ip -o link show`, keeping only physical ethernet-class links.
///
/// `2: eth1: <BROADCAST,MULTICAST,UP,LOWER_UP> mtu 1500 ... state UP ...\    link/ether 00:e0:4c:68:00:01 brd ff:ff:ff:ff:ff:ff`
pub(crate) fn parse_links(output: &str) -> Vec<LinkRecord> {
    output
        .lines()
        .filter_map(|line| {
            let mut parts = line.splitn(3, ": ");
            let _index = parts.next()?;
            let raw_name = parts.next()?.trim();
            let rest = parts.next()?;
            let name = raw_name.split('@').next()?.to_owned();
            if name.is_empty() || is_virtual(&name) {
                return None;
            }

            let flags = rest
                .strip_prefix('<')
                .and_then(|r| r.split_once('>'))
                .map(|(flags, _)| flags)
                .unwrap_or_default();
            let has_flag = |f: &str| flags.split(',').any(|x| x == f);

            let mut tokens = rest.split_whitespace();
            let mut hardware_address = None;
            let mut is_ether = false;
            while let Some(token) = tokens.next() {
                if token == "link/ether" {
                    is_ether = true;
                    hardware_address = tokens.next().and_then(|m| MacAddress::parse(m).ok());
                    break;
                }
            }
            if !is_ether {
                return None;
            }

            Some(LinkRecord {
                name,
                hardware_address,
                up: has_flag("UP") && has_flag("LOWER_UP"),
            })
        })
        .collect()
}

/// Parse `ip -o -4 addr show` into interface -> `addr/prefix` list.
///
/// `3: eth1    inet 10.0.1.1/24 brd 10.0.1.255 scope global noprefixroute eth1\       valid_lft forever ...`
pub(crate) fn parse_addresses(output: &str) -> HashMap<String, Vec<String>> {
    let mut map: HashMap<String, Vec<String>> = HashMap::new();
    for line in output.lines() {
        let mut tokens = line.split_whitespace();
        let (Some(_index), Some(name)) = (tokens.next(), tokens.next()) else {
            continue;
        };
        let mut tokens = tokens.skip_while(|t| *t != "inet");
        if tokens.next().is_none() {
            continue;
        }
        if let Some(cidr) = tokens.next() {
            map.entry(name.trim_end_matches(':').to_owned())
                .or_default()
                .push(cidr.to_owned());
        }
    }
    map
}

/// Parse `nmcli -t -f DEVICE,STATE device` into device -> state.
pub(crate) fn parse_device_states(output: &str) -> HashMap<String, String> {
    output
        .lines()
        .filter_map(|line| {
            let (device, state) = line.split_once(':')?;
            Some((device.to_owned(), state.trim().to_owned()))
        })
        .collect()
}

/// Connection manager device states in which the AP can be activated.
pub(crate) fn device_state_usable(state: &str) -> bool {
    // "connected (externally)" and friends count as connected
    state.starts_with("disconnected") || state.starts_with("connected")
}

/// Parse `nmcli -t -f NAME connection show --active`.
pub(crate) fn parse_active_connections(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        // terse mode escapes ':' in names
        .map(|l| l.replace("\\:", ":"))
        .collect()
}

/// Parse `ip neigh show [dev X]` lines.
///
/// `10.0.1.20 lladdr aa:bb:cc:dd:ee:ff REACHABLE`
/// `10.0.1.20 dev eth1 lladdr aa:bb:cc:dd:ee:ff STALE`
/// `10.0.1.21 dev eth1 FAILED`
pub(crate) fn parse_neighbors(output: &str) -> Vec<NeighborRecord> {
    output
        .lines()
        .filter_map(|line| {
            let mut tokens = line.split_whitespace();
            let address: Ipv4Addr = tokens.next()?.parse().ok()?;
            let rest: Vec<&str> = tokens.collect();
            let hardware_address = rest
                .iter()
                .position(|t| *t == "lladdr")
                .and_then(|i| rest.get(i + 1))
                .and_then(|m| MacAddress::parse(m).ok())
                .filter(|m| !m.is_placeholder());
            let state = rest.last().map(|s| (*s).to_owned()).unwrap_or_default();
            Some(NeighborRecord {
                address,
                hardware_address,
                state,
            })
        })
        .collect()
}

/// Last path component of `readlink -f .../device/driver`.
pub(crate) fn parse_driver(output: &str) -> Option<String> {
    let trimmed = output.trim();
    let name = trimmed.rsplit('/').next()?;
    (!name.is_empty() && trimmed.contains('/')).then(|| name.to_owned())
}

/// Interface named by an `ip -o monitor link` line.
///
/// `3: eth1: <NO-CARRIER,...> mtu 1500 ...` or `Deleted 3: eth1: <...> ...`
pub(crate) fn parse_monitor_interface(line: &str) -> Option<(String, bool)> {
    let (deleted, rest) = match line.strip_prefix("Deleted ") {
        Some(rest) => (true, rest),
        None => (false, line),
    };
    let mut parts = rest.splitn(3, ": ");
    let index = parts.next()?;
    if index.trim().parse::<u32>().is_err() {
        return None;
    }
    let name = parts.next()?.split('@').next()?.trim();
    if name.is_empty() || is_virtual(name) {
        return None;
    }
    Some((name.to_owned(), deleted))
}
