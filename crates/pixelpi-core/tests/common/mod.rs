// Scripted host for integration tests.
#![allow(dead_code, clippy::unwrap_used)]

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::time::Instant;

use pixelpi_core::{CommandOutput, CommandRunner, ControllerInfo, MacAddress, NetworkProbe, Operation, RunOutcome};

pub const AP_CONNECTION: &str = "pixelpi-ap";

#[derive(Default)]
struct HostState {
    links: String,
    /// When the wireless interface becomes visible. `None` = never.
    wlan_visible_at: Option<Instant>,
    manager_ready: bool,
    /// Remaining failures of `connection up` for the AP profile.
    ap_up_failures: u32,
    active: Vec<String>,
    neighbors: String,
    failing_services: Vec<String>,
    /// Remaining failures of `systemctl restart`.
    restart_failures: u32,
    /// Remaining failures of `connection down`.
    down_failures: u32,
}

/// A fake host that answers operations from mutable state and records
/// every operation it saw.
pub struct FakeRunner {
    state: Mutex<HostState>,
    log: Mutex<Vec<String>>,
}

impl FakeRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(HostState {
                wlan_visible_at: Some(Instant::now()),
                manager_ready: true,
                ..HostState::default()
            }),
            log: Mutex::new(Vec::new()),
        })
    }

    pub fn set_links(&self, links: &str) {
        self.state.lock().unwrap().links = links.to_owned();
    }

    pub fn wlan_appears_after(&self, delay: Duration) {
        self.state.lock().unwrap().wlan_visible_at = Some(Instant::now() + delay);
    }

    pub fn set_manager_ready(&self, ready: bool) {
        self.state.lock().unwrap().manager_ready = ready;
    }

    pub fn fail_ap_up(&self, times: u32) {
        self.state.lock().unwrap().ap_up_failures = times;
    }

    pub fn drop_active(&self, name: &str) {
        self.state.lock().unwrap().active.retain(|n| n != name);
    }

    pub fn set_neighbors(&self, neighbors: &str) {
        self.state.lock().unwrap().neighbors = neighbors.to_owned();
    }

    pub fn fail_service(&self, service: &str) {
        self.state.lock().unwrap().failing_services.push(service.to_owned());
    }

    pub fn fail_ap_down(&self, times: u32) {
        self.state.lock().unwrap().down_failures = times;
    }

    pub fn fail_restarts(&self, times: u32) {
        self.state.lock().unwrap().restart_failures = times;
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.log.lock().unwrap().iter().filter(|l| l.starts_with(prefix)).count()
    }

    fn answer(&self, op: &Operation) -> RunOutcome {
        let mut state = self.state.lock().unwrap();
        let wlan_visible = state.wlan_visible_at.is_some_and(|at| Instant::now() >= at);
        let out = match op {
            Operation::ListLinks => CommandOutput::success(state.links.clone()),
            Operation::LinkExists { interface } => {
                if interface == "wlan0" && wlan_visible {
                    CommandOutput::success("")
                } else {
                    CommandOutput::failure(1, "Device does not exist")
                }
            }
            Operation::DeviceStates => {
                if wlan_visible {
                    CommandOutput::success("wlan0:disconnected\nlo:unmanaged\n")
                } else {
                    CommandOutput::success("lo:unmanaged\n")
                }
            }
            Operation::ManagerStatus => {
                if state.manager_ready {
                    CommandOutput::success("connected")
                } else {
                    CommandOutput::failure(8, "NetworkManager is not running")
                }
            }
            Operation::ConnectionExists { .. } => CommandOutput::failure(10, "no such connection"),
            Operation::ConnectionUp { name } => {
                if name == AP_CONNECTION && state.ap_up_failures > 0 {
                    state.ap_up_failures -= 1;
                    CommandOutput::failure(4, "Error: Connection activation failed")
                } else {
                    if !state.active.contains(name) {
                        state.active.push(name.clone());
                    }
                    CommandOutput::success("")
                }
            }
            Operation::ConnectionDown { .. } if state.down_failures > 0 => {
                state.down_failures -= 1;
                CommandOutput::failure(10, "Error: no active connection provided")
            }
            Operation::ConnectionDown { name } => {
                state.active.retain(|n| n != name);
                CommandOutput::success("")
            }
            Operation::ActiveConnections => CommandOutput::success(state.active.join("\n")),
            Operation::NeighborShow { .. } => CommandOutput::success(state.neighbors.clone()),
            Operation::NeighborLookup { address } => {
                let prefix = format!("{address} ");
                let rows: Vec<&str> = state.neighbors.lines().filter(|l| l.starts_with(&prefix)).collect();
                CommandOutput::success(rows.join("\n"))
            }
            Operation::ServiceIsActive { service } => {
                if state.failing_services.contains(service) {
                    CommandOutput::failure(3, "inactive")
                } else {
                    CommandOutput::success("active")
                }
            }
            Operation::ServiceRestart { .. } if state.restart_failures > 0 => {
                state.restart_failures -= 1;
                CommandOutput::failure(1, "Job for dnsmasq.service failed")
            }
            _ => CommandOutput::success(""),
        };
        RunOutcome::Exited(out)
    }
}

impl CommandRunner for FakeRunner {
    fn run<'a>(&'a self, op: &'a Operation, _timeout: Duration) -> BoxFuture<'a, RunOutcome> {
        Box::pin(async move {
            self.log.lock().unwrap().push(op.to_string());
            self.answer(op)
        })
    }
}

/// `ip -o link show` line for a physical ethernet-like interface.
pub fn link_line(index: u32, name: &str, mac: &str) -> String {
    format!(
        "{index}: {name}: <BROADCAST,MULTICAST,UP,LOWER_UP> mtu 1500 state UP\\    link/ether {mac} brd ff:ff:ff:ff:ff:ff\n"
    )
}

// ── Network probe ───────────────────────────────────────────────────

#[derive(Clone)]
pub struct FakeHost {
    pub mac: MacAddress,
    pub info: Option<ControllerInfo>,
    /// Resolution takes this long.
    pub delay: Duration,
}

/// Answers resolution and identification from a fixed host table.
/// Hosts not in the table are silent.
#[derive(Default)]
pub struct FakeProbe {
    hosts: HashMap<Ipv4Addr, FakeHost>,
    /// Every address with no entry takes this long to stay silent.
    silent_delay: Duration,
}

impl FakeProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_silent_delay(mut self, delay: Duration) -> Self {
        self.silent_delay = delay;
        self
    }

    pub fn controller(mut self, address: &str, mac: &str, name: &str) -> Self {
        self.hosts.insert(
            address.parse().unwrap(),
            FakeHost {
                mac: mac.parse().unwrap(),
                info: Some(ControllerInfo {
                    name: Some(name.to_owned()),
                    version: Some("0.14.0".to_owned()),
                    ..ControllerInfo::default()
                }),
                delay: Duration::from_millis(10),
            },
        );
        self
    }

    pub fn plain_host(mut self, address: &str, mac: &str) -> Self {
        self.hosts.insert(
            address.parse().unwrap(),
            FakeHost {
                mac: mac.parse().unwrap(),
                info: None,
                delay: Duration::from_millis(10),
            },
        );
        self
    }
}

impl NetworkProbe for FakeProbe {
    fn resolve<'a>(
        &'a self,
        address: Ipv4Addr,
        _timeout: Duration,
    ) -> BoxFuture<'a, Result<Option<MacAddress>, String>> {
        Box::pin(async move {
            match self.hosts.get(&address) {
                Some(host) => {
                    tokio::time::sleep(host.delay).await;
                    Ok(Some(host.mac.clone()))
                }
                None => {
                    tokio::time::sleep(self.silent_delay).await;
                    Ok(None)
                }
            }
        })
    }

    fn identify<'a>(&'a self, address: Ipv4Addr, _timeout: Duration) -> BoxFuture<'a, Option<ControllerInfo>> {
        Box::pin(async move { self.hosts.get(&address).and_then(|h| h.info.clone()) })
    }
}
