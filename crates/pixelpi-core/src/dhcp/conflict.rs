// ── DHCP authority self-check ──
//
// Reads every DHCP service file that will be loaded together and reports
// when the wireless interface could be served by the wired-side service as
// well as by the connection manager.

use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::error::CoreError;

#[derive(Debug, Default)]
struct Directives {
    interfaces: BTreeSet<String>,
    excluded: BTreeSet<String>,
    /// (file, line number, raw line) of every `dhcp-range`.
    ranges: Vec<(PathBuf, usize, String)>,
    /// First file/line naming the wireless interface as served.
    explicit: Option<(PathBuf, usize, String)>,
}

fn list_values(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|v| !v.is_empty())
}

fn collect(ap_interface: &str, files: &[(PathBuf, String)]) -> Directives {
    let mut d = Directives::default();
    for (path, contents) in files {
        for (idx, raw) in contents.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let lineno = idx + 1;
            match key.trim() {
                "interface" => {
                    for v in list_values(value) {
                        if v == ap_interface && d.explicit.is_none() {
                            d.explicit = Some((path.clone(), lineno, line.to_owned()));
                        }
                        d.interfaces.insert(v.to_owned());
                    }
                }
                "except-interface" | "no-dhcp-interface" => {
                    d.excluded.extend(list_values(value).map(str::to_owned));
                }
                "dhcp-range" => {
                    let names_ap = list_values(value).any(|v| {
                        v == ap_interface
                            || v.strip_prefix("tag:") == Some(ap_interface)
                            || v.strip_prefix("set:") == Some(ap_interface)
                    });
                    if names_ap && d.explicit.is_none() {
                        d.explicit = Some((path.clone(), lineno, line.to_owned()));
                    }
                    d.ranges.push((path.clone(), lineno, line.to_owned()));
                }
                _ => {}
            }
        }
    }
    d
}

/// Find a double DHCP authority on `ap_interface` across `files`.
///
/// Conflicts are: any file whitelisting or handing a range to the
/// wireless interface, or ranges defined with no interface whitelist and
/// no exclusion, which binds every interface including the wireless one.
pub(crate) fn find_conflict(ap_interface: &str, files: &[(PathBuf, String)]) -> Option<CoreError> {
    let d = collect(ap_interface, files);

    if let Some((path, lineno, line)) = d.explicit {
        return Some(CoreError::ConfigConflict {
            interface: ap_interface.to_owned(),
            detail: format!(
                "{}:{lineno} `{line}` serves the interface the connection manager already serves",
                path.display()
            ),
        });
    }

    if d.interfaces.is_empty() && !d.excluded.contains(ap_interface) {
        if let Some((path, lineno, line)) = d.ranges.into_iter().next() {
            return Some(CoreError::ConfigConflict {
                interface: ap_interface.to_owned(),
                detail: format!(
                    "{}:{lineno} `{line}` with no interface= whitelist binds every interface",
                    path.display()
                ),
            });
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files(entries: &[(&str, &str)]) -> Vec<(PathBuf, String)> {
        entries
            .iter()
            .map(|(p, c)| (PathBuf::from(p), (*c).to_owned()))
            .collect()
    }

    #[test]
    fn clean_wired_config_passes() {
        let f = files(&[(
            "/etc/dnsmasq.d/pixelpi.conf",
            "bind-dynamic\ninterface=eth1\ndhcp-range=eth1,10.0.1.10,10.0.1.50,24h\n",
        )]);
        assert!(find_conflict("wlan0", &f).is_none());
    }

    #[test]
    fn legacy_wireless_range_is_a_conflict() {
        let f = files(&[
            ("/etc/dnsmasq.d/pixelpi.conf", "interface=eth1\ndhcp-range=eth1,10.0.1.10,10.0.1.50,24h\n"),
            ("/etc/dnsmasq.d/wlan0.conf", "# old AP setup\ninterface=wlan0\ndhcp-range=10.0.2.10,10.0.2.50,24h\n"),
        ]);
        let err = find_conflict("wlan0", &f).expect("conflict");
        assert_eq!(err.kind(), "config_conflict");
        assert!(err.to_string().contains("wlan0.conf:2"));
    }

    #[test]
    fn tagged_range_is_a_conflict() {
        let f = files(&[("/etc/dnsmasq.conf", "interface=eth1\ndhcp-range=tag:wlan0,10.0.2.10,10.0.2.50\n")]);
        assert!(find_conflict("wlan0", &f).is_some());
    }

    #[test]
    fn wildcard_bind_without_exclusion_is_a_conflict() {
        let f = files(&[("/etc/dnsmasq.conf", "dhcp-range=10.0.0.10,10.0.0.50,12h\n")]);
        assert!(find_conflict("wlan0", &f).is_some());

        let f = files(&[(
            "/etc/dnsmasq.conf",
            "except-interface=wlan0\ndhcp-range=10.0.0.10,10.0.0.50,12h\n",
        )]);
        assert!(find_conflict("wlan0", &f).is_none());
    }

    #[test]
    fn commented_lines_are_ignored() {
        let f = files(&[("/etc/dnsmasq.conf", "#interface=wlan0\ninterface=eth1\n")]);
        assert!(find_conflict("wlan0", &f).is_none());
    }
}
