// ── Runtime engine configuration ──
//
// These types describe how the engine drives this host: which interfaces
// play which role, how long it may wait for hardware, where generated
// files live. They never touch disk; pixelpi-config builds an
// `EngineConfig` and hands it in.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::model::{AddressPlan, ApSettings};

/// Adapter registry tuning and the persisted addressing plan.
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    /// The board's own ports. Never counted as USB adapters.
    pub builtin: Vec<String>,
    /// How long a vanished adapter is kept as `absent` before removal.
    pub absent_grace: Duration,
    /// Static plans applied at startup, keyed by interface name.
    pub plans: BTreeMap<String, AdapterPlan>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterPlan {
    pub address: AddressPlan,
    /// Defaults to the interface name, i.e. every adapter is its own domain.
    pub isolation_domain: Option<String>,
}

/// Access point lifecycle configuration.
#[derive(Debug, Clone)]
pub struct ApConfig {
    pub interface: String,
    /// Connection-manager profile name for the AP.
    pub connection: String,
    pub ssid: String,
    pub passphrase: Option<SecretString>,
    pub channel: u8,
    pub address: AddressPlan,
    /// Bring the AP up when the engine starts.
    pub enabled: bool,
    /// Overall budget for hardware and service-manager readiness.
    pub max_wait: Duration,
    pub poll_interval: Duration,
    /// Activation attempts before giving up (N).
    pub activation_attempts: u32,
    /// Fixed delay between activation attempts.
    pub retry_delay: Duration,
    /// Settle time between `down` and `up` on restart.
    pub restart_settle: Duration,
    /// How often an active AP is checked. Zero disables the watchdog.
    pub watchdog_interval: Duration,
}

impl ApConfig {
    /// Settings for `enable()` built from configuration, if a passphrase
    /// is available.
    pub fn settings(&self) -> Option<ApSettings> {
        self.passphrase.as_ref().map(|passphrase| ApSettings {
            ssid: self.ssid.clone(),
            passphrase: passphrase.clone(),
            address: self.address,
            channel: self.channel,
        })
    }
}

/// Wired-side DHCP service configuration.
#[derive(Debug, Clone)]
pub struct DhcpConfig {
    /// The generated file. Only the coordinator writes it.
    pub config_path: PathBuf,
    /// Other DHCP service files examined by the conflict self-check.
    pub inspect_paths: Vec<PathBuf>,
    pub service: String,
    /// Pool offsets from the network address.
    pub pool_start: u32,
    pub pool_end: u32,
    pub lease: String,
    /// Empty means "advertise the adapter's own address".
    pub dns_servers: Vec<std::net::Ipv4Addr>,
}

#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Periodic scan interval. Zero disables periodic scans.
    pub interval: Duration,
    pub per_host_timeout: Duration,
    pub total_timeout: Duration,
    pub concurrency: usize,
    /// Port of the controllers' HTTP identification endpoint.
    pub probe_port: u16,
    /// Also create reservations for hosts that resolved but did not
    /// identify as controllers.
    pub reserve_unidentified: bool,
}

/// Everything the engine needs, built by the caller.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub adapters: AdapterConfig,
    pub ap: ApConfig,
    pub dhcp: DhcpConfig,
    pub discovery: DiscoveryConfig,
    pub reservations_path: PathBuf,
    /// Unix socket a running daemon answers one-shot CLI requests on.
    pub control_socket: PathBuf,
    /// Default bound for every external operation.
    pub command_timeout: Duration,
    /// Follow `ip monitor link` for hotplug events.
    pub link_monitor: bool,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            builtin: vec!["eth0".into()],
            absent_grace: Duration::from_secs(30),
            plans: BTreeMap::new(),
        }
    }
}

impl Default for ApConfig {
    fn default() -> Self {
        Self {
            interface: "wlan0".into(),
            connection: "pixelpi-ap".into(),
            ssid: "WLED-Manager-AP".into(),
            passphrase: None,
            channel: 6,
            address: AddressPlan {
                address: std::net::Ipv4Addr::new(10, 0, 2, 1),
                prefix: 24,
            },
            enabled: false,
            max_wait: Duration::from_secs(60),
            poll_interval: Duration::from_secs(3),
            activation_attempts: 3,
            retry_delay: Duration::from_secs(5),
            restart_settle: Duration::from_secs(2),
            watchdog_interval: Duration::from_secs(30),
        }
    }
}

impl Default for DhcpConfig {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from("/etc/dnsmasq.d/pixelpi.conf"),
            inspect_paths: Vec::new(),
            service: "dnsmasq".into(),
            pool_start: 10,
            pool_end: 50,
            lease: "24h".into(),
            dns_servers: Vec::new(),
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            interval: Duration::ZERO,
            per_host_timeout: Duration::from_millis(1500),
            total_timeout: Duration::from_secs(60),
            concurrency: 32,
            probe_port: 80,
            reserve_unidentified: false,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            adapters: AdapterConfig::default(),
            ap: ApConfig::default(),
            dhcp: DhcpConfig::default(),
            discovery: DiscoveryConfig::default(),
            reservations_path: PathBuf::from("/var/lib/pixelpi/reservations.toml"),
            control_socket: PathBuf::from("/run/pixelpi/control.sock"),
            command_timeout: Duration::from_secs(15),
            link_monitor: true,
        }
    }
}
