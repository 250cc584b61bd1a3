//! Configuration for the PixelPi daemon and CLI.
//!
//! One TOML file (`/etc/pixelpi/config.toml` by default), `PIXELPI_`
//! environment overrides, AP passphrase resolution (env + keyring +
//! plaintext), and translation to `pixelpi_core::EngineConfig`. The CLI
//! adds `--config`-aware wrappers on top.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use pixelpi_core::{
    AdapterConfig, AdapterPlan, AddressPlan, ApConfig, DhcpConfig, DiscoveryConfig, EngineConfig,
};

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/pixelpi/config.toml";

/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
pub const CONFIG_PATH_ENV: &str = "PIXELPI_CONFIG";

/// Keyring service and entry holding the AP passphrase.
pub const KEYRING_SERVICE: &str = "pixelpi";
pub const KEYRING_PASSPHRASE_ENTRY: &str = "ap/passphrase";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

fn invalid(field: impl Into<String>, reason: impl std::fmt::Display) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.to_string(),
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub adapters: AdaptersSection,

    #[serde(default)]
    pub ap: ApSection,

    #[serde(default)]
    pub dhcp: DhcpSection,

    #[serde(default)]
    pub discovery: DiscoverySection,

    #[serde(default)]
    pub storage: StorageSection,

    #[serde(default)]
    pub commands: CommandsSection,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AdaptersSection {
    /// The board's own ports, excluded from the USB adapter view.
    pub builtin: Vec<String>,
    pub absent_grace_secs: u64,
    /// Follow kernel link events for hotplug.
    pub link_monitor: bool,
    /// Persisted addressing plan, keyed by interface name.
    pub plans: BTreeMap<String, PlanSection>,
}

impl Default for AdaptersSection {
    fn default() -> Self {
        Self {
            builtin: vec!["eth0".into()],
            absent_grace_secs: 30,
            link_monitor: true,
            plans: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PlanSection {
    /// e.g. "10.0.1.1/24"
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isolation_domain: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ApSection {
    pub interface: String,
    pub connection: String,
    pub ssid: String,

    /// Plaintext passphrase (prefer keyring or env var).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passphrase: Option<String>,

    /// Environment variable name containing the passphrase.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passphrase_env: Option<String>,

    /// Consult the system keyring for the passphrase.
    pub keyring: bool,

    pub channel: u8,
    pub address: String,
    /// Activate the AP when the daemon starts.
    pub enabled: bool,
    pub max_wait_secs: u64,
    pub poll_interval_secs: u64,
    pub activation_attempts: u32,
    pub retry_delay_secs: u64,
    pub restart_settle_secs: u64,
    /// 0 disables the watchdog.
    pub watchdog_interval_secs: u64,
}

impl Default for ApSection {
    fn default() -> Self {
        let core = ApConfig::default();
        Self {
            interface: core.interface,
            connection: core.connection,
            ssid: core.ssid,
            passphrase: None,
            passphrase_env: None,
            keyring: true,
            channel: core.channel,
            address: core.address.to_string(),
            enabled: false,
            max_wait_secs: core.max_wait.as_secs(),
            poll_interval_secs: core.poll_interval.as_secs(),
            activation_attempts: core.activation_attempts,
            retry_delay_secs: core.retry_delay.as_secs(),
            restart_settle_secs: core.restart_settle.as_secs(),
            watchdog_interval_secs: core.watchdog_interval.as_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DhcpSection {
    /// The generated wired-side file.
    pub config_path: PathBuf,
    /// Other dnsmasq files examined by the conflict self-check.
    pub inspect_paths: Vec<PathBuf>,
    pub service: String,
    pub pool_start: u32,
    pub pool_end: u32,
    pub lease: String,
    pub dns_servers: Vec<Ipv4Addr>,
}

impl Default for DhcpSection {
    fn default() -> Self {
        let core = DhcpConfig::default();
        Self {
            config_path: core.config_path,
            inspect_paths: vec![PathBuf::from("/etc/dnsmasq.conf")],
            service: core.service,
            pool_start: core.pool_start,
            pool_end: core.pool_end,
            lease: core.lease,
            dns_servers: core.dns_servers,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DiscoverySection {
    /// 0 turns periodic scans off.
    pub interval_secs: u64,
    pub per_host_timeout_ms: u64,
    pub total_timeout_secs: u64,
    pub concurrency: usize,
    pub probe_port: u16,
    pub reserve_unidentified: bool,
}

impl Default for DiscoverySection {
    fn default() -> Self {
        let core = DiscoveryConfig::default();
        Self {
            interval_secs: core.interval.as_secs(),
            per_host_timeout_ms: duration_millis(core.per_host_timeout),
            total_timeout_secs: core.total_timeout.as_secs(),
            concurrency: core.concurrency,
            probe_port: core.probe_port,
            reserve_unidentified: core.reserve_unidentified,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageSection {
    pub reservations_path: PathBuf,
    /// Where `pixelpi run` listens for CLI requests.
    pub control_socket: PathBuf,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            reservations_path: EngineConfig::default().reservations_path,
            control_socket: EngineConfig::default().control_socket,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CommandsSection {
    /// Default bound for every external operation.
    pub timeout_secs: u64,
}

impl Default for CommandsSection {
    fn default() -> Self {
        Self {
            timeout_secs: EngineConfig::default().command_timeout.as_secs(),
        }
    }
}

fn duration_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path: `PIXELPI_CONFIG`, else the system default.
pub fn config_path() -> PathBuf {
    std::env::var_os(CONFIG_PATH_ENV).map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from)
}

// ── Config loading ──────────────────────────────────────────────────

fn figment_for(path: &Path) -> Figment {
    Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("PIXELPI_").ignore(&["config"]).split("__"))
}

/// Load the Config from the given file + environment. A missing file
/// yields the defaults.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let config: Config = figment_for(path).extract()?;
    Ok(config)
}

/// Load the Config from [`config_path`] + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write it to `path`.
pub fn save_config(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Passphrase resolution ───────────────────────────────────────────

/// Resolve the AP passphrase: named env var, system keyring, plaintext.
///
/// `None` is not an error: the AP is optional until someone enables it.
pub fn resolve_passphrase(ap: &ApSection) -> Option<SecretString> {
    // 1. passphrase_env → env var lookup
    if let Some(ref env_name) = ap.passphrase_env {
        if let Ok(val) = std::env::var(env_name) {
            return Some(SecretString::from(val));
        }
    }

    // 2. System keyring
    if ap.keyring {
        if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, KEYRING_PASSPHRASE_ENTRY) {
            if let Ok(secret) = entry.get_password() {
                return Some(SecretString::from(secret));
            }
        }
    }

    // 3. Plaintext in config
    ap.passphrase.clone().map(SecretString::from)
}

/// Store the AP passphrase in the system keyring.
pub fn store_passphrase(passphrase: &str) -> Result<(), ConfigError> {
    let entry = keyring::Entry::new(KEYRING_SERVICE, KEYRING_PASSPHRASE_ENTRY)?;
    entry.set_password(passphrase)?;
    Ok(())
}

// ── Translation ─────────────────────────────────────────────────────

impl Config {
    /// Build the engine configuration, resolving the passphrase and
    /// validating every address and bound.
    pub fn to_engine_config(&self) -> Result<EngineConfig, ConfigError> {
        let ap = &self.ap;
        let ap_address: AddressPlan = ap.address.parse().map_err(|e| invalid("ap.address", e))?;
        if !(1..=11).contains(&ap.channel) {
            return Err(invalid("ap.channel", format!("{} is outside 1-11", ap.channel)));
        }
        if ap.activation_attempts == 0 {
            return Err(invalid("ap.activation_attempts", "must be at least 1"));
        }
        if ap.poll_interval_secs == 0 {
            return Err(invalid("ap.poll_interval_secs", "must be at least 1"));
        }

        let mut plans: BTreeMap<String, AdapterPlan> = BTreeMap::new();
        for (iface, plan) in &self.adapters.plans {
            let address: AddressPlan = plan
                .address
                .parse()
                .map_err(|e| invalid(format!("adapters.plans.{iface}.address"), e))?;
            if address.subnet().overlaps(&ap_address.subnet()) {
                return Err(invalid(
                    format!("adapters.plans.{iface}.address"),
                    format!("{address} overlaps the access point subnet {}", ap_address.subnet()),
                ));
            }
            let taken = plans
                .iter()
                .find(|(_, other)| address.subnet().overlaps(&other.address.subnet()));
            if let Some((other, _)) = taken {
                return Err(invalid(
                    format!("adapters.plans.{iface}.address"),
                    format!("{address} overlaps the subnet planned for {other}"),
                ));
            }
            plans.insert(
                iface.clone(),
                AdapterPlan {
                    address,
                    isolation_domain: plan.isolation_domain.clone(),
                },
            );
        }

        let dhcp = &self.dhcp;
        if dhcp.pool_start == 0 || dhcp.pool_start > dhcp.pool_end {
            return Err(invalid(
                "dhcp.pool_start",
                format!("pool {}..{} is empty or starts at the network address", dhcp.pool_start, dhcp.pool_end),
            ));
        }

        let discovery = &self.discovery;
        if discovery.concurrency == 0 {
            return Err(invalid("discovery.concurrency", "must be at least 1"));
        }
        if discovery.per_host_timeout_ms == 0 || discovery.total_timeout_secs == 0 {
            return Err(invalid("discovery", "timeouts must be positive"));
        }
        if self.commands.timeout_secs == 0 {
            return Err(invalid("commands.timeout_secs", "must be at least 1"));
        }

        Ok(EngineConfig {
            adapters: AdapterConfig {
                builtin: self.adapters.builtin.clone(),
                absent_grace: Duration::from_secs(self.adapters.absent_grace_secs),
                plans,
            },
            ap: ApConfig {
                interface: ap.interface.clone(),
                connection: ap.connection.clone(),
                ssid: ap.ssid.clone(),
                passphrase: resolve_passphrase(ap),
                channel: ap.channel,
                address: ap_address,
                enabled: ap.enabled,
                max_wait: Duration::from_secs(ap.max_wait_secs),
                poll_interval: Duration::from_secs(ap.poll_interval_secs),
                activation_attempts: ap.activation_attempts,
                retry_delay: Duration::from_secs(ap.retry_delay_secs),
                restart_settle: Duration::from_secs(ap.restart_settle_secs),
                watchdog_interval: Duration::from_secs(ap.watchdog_interval_secs),
            },
            dhcp: DhcpConfig {
                config_path: dhcp.config_path.clone(),
                inspect_paths: dhcp.inspect_paths.clone(),
                service: dhcp.service.clone(),
                pool_start: dhcp.pool_start,
                pool_end: dhcp.pool_end,
                lease: dhcp.lease.clone(),
                dns_servers: dhcp.dns_servers.clone(),
            },
            discovery: DiscoveryConfig {
                interval: Duration::from_secs(discovery.interval_secs),
                per_host_timeout: Duration::from_millis(discovery.per_host_timeout_ms),
                total_timeout: Duration::from_secs(discovery.total_timeout_secs),
                concurrency: discovery.concurrency,
                probe_port: discovery.probe_port,
                reserve_unidentified: discovery.reserve_unidentified,
            },
            reservations_path: self.storage.reservations_path.clone(),
            control_socket: self.storage.control_socket.clone(),
            command_timeout: Duration::from_secs(self.commands.timeout_secs),
            link_monitor: self.adapters.link_monitor,
        })
    }

    /// A copy safe to print: the plaintext passphrase is masked.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.ap.passphrase.is_some() {
            copy.ap.passphrase = Some("********".into());
        }
        copy
    }
}
