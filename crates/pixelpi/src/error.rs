//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text and distinct exit codes.

use miette::Diagnostic;
use thiserror::Error;

use pixelpi_config::ConfigError;
use pixelpi_core::CoreError;

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const CONFIG: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const HARDWARE: i32 = 5;
    pub const CONFLICT: i32 = 6;
    pub const STATE: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Hardware / readiness ─────────────────────────────────────────
    #[error("Access point failed ({kind}): {message}")]
    #[diagnostic(
        code(pixelpi::ap_failed),
        help(
            "Check that the wireless adapter is attached and NetworkManager is running.\n\
             Inspect with: pixelpi ap state\n\
             Try again with: pixelpi ap retry"
        )
    )]
    ApFailed { kind: String, message: String },

    #[error("{message}")]
    #[diagnostic(
        code(pixelpi::hardware_not_ready),
        help("Check `ip link` and `nmcli general status`, then try again.")
    )]
    HardwareNotReady { message: String },

    // ── Conflicts ────────────────────────────────────────────────────
    #[error("DHCP authority conflict on {interface}")]
    #[diagnostic(
        code(pixelpi::dhcp_conflict),
        help(
            "{detail}\n\
             The access point hands out its own addresses; remove the wireless\n\
             interface from other dnsmasq configuration, then run: pixelpi check"
        )
    )]
    DhcpConflict { interface: String, detail: String },

    #[error("{address} is already reserved for {holder}")]
    #[diagnostic(
        code(pixelpi::reservation_conflict),
        help("Remove it first with: pixelpi reservations remove {holder}")
    )]
    ReservationConflict { address: String, holder: String },

    #[error("Subnet {subnet} for {interface} overlaps {holder}")]
    #[diagnostic(
        code(pixelpi::address_conflict),
        help("Every adapter needs its own subnet. See: pixelpi adapters list")
    )]
    AddressConflict {
        interface: String,
        subnet: String,
        holder: String,
    },

    // ── Resources ────────────────────────────────────────────────────
    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(pixelpi::not_found),
        help("Run: pixelpi {list_command} to see available {resource_type}s")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    #[error("Cannot {operation} while {state}")]
    #[diagnostic(code(pixelpi::invalid_state), help("Check the current state with: pixelpi ap state"))]
    InvalidState { operation: String, state: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(pixelpi::validation))]
    Validation { field: String, reason: String },

    #[error("No access point passphrase configured")]
    #[diagnostic(
        code(pixelpi::no_passphrase),
        help(
            "Store one with: pixelpi config set-passphrase\n\
             Or set ap.passphrase_env in the configuration, or pass --ask-passphrase."
        )
    )]
    NoPassphrase,

    // ── Host commands ────────────────────────────────────────────────
    #[error("`{operation}` failed with exit code {exit_code}")]
    #[diagnostic(code(pixelpi::command_failed), help("{stderr}"))]
    CommandFailed {
        operation: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("{message}")]
    #[diagnostic(code(pixelpi::timeout), help("Raise commands.timeout_secs if the host is slow."))]
    Timeout { message: String },

    #[error("Failed to write {path}: {reason}")]
    #[diagnostic(code(pixelpi::persistence), help("Check permissions; try running as root."))]
    Persistence { path: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Configuration file already exists: {path}")]
    #[diagnostic(code(pixelpi::config_exists), help("Use --force to overwrite it."))]
    ConfigExists { path: String },

    #[error(transparent)]
    #[diagnostic(code(pixelpi::config), help("Check the configuration file: pixelpi config path"))]
    Config(#[from] ConfigError),

    // ── Interactive ──────────────────────────────────────────────────
    #[error("Destructive operation '{action}' requires confirmation")]
    #[diagnostic(
        code(pixelpi::confirmation_required),
        help("Use --yes (-y) to skip confirmation in non-interactive contexts.")
    )]
    NonInteractiveRequiresYes { action: String },

    // ── Daemon ───────────────────────────────────────────────────────
    #[error("{message}")]
    #[diagnostic(
        code(pixelpi::daemon),
        help("The running daemon refused the request ({kind}). Its log has the details: journalctl -u pixelpi")
    )]
    Daemon { kind: String, message: String },

    // ── IO / Serialization / Internal ────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to render output: {0}")]
    Render(String),

    #[error("{0}")]
    #[diagnostic(code(pixelpi::internal))]
    Internal(String),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ApFailed { .. } | Self::HardwareNotReady { .. } => exit_code::HARDWARE,
            Self::DhcpConflict { .. } | Self::ReservationConflict { .. } | Self::AddressConflict { .. } => {
                exit_code::CONFLICT
            }
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::InvalidState { .. } => exit_code::STATE,
            Self::Validation { .. } | Self::NonInteractiveRequiresYes { .. } => exit_code::USAGE,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::NoPassphrase | Self::ConfigExists { .. } | Self::Config(_) => exit_code::CONFIG,
            Self::Daemon { kind, .. } => daemon_exit_code(kind),
            _ => exit_code::GENERAL,
        }
    }
}

/// Exit code for an error the daemon reported by kind, matching what the
/// same error raised locally would exit with.
fn daemon_exit_code(kind: &str) -> i32 {
    match kind {
        "hardware_not_ready" | "service_manager_not_ready" | "activation_failed" => exit_code::HARDWARE,
        "config_conflict" | "reservation_conflict" | "conflict" => exit_code::CONFLICT,
        "not_found" => exit_code::NOT_FOUND,
        "invalid_state" => exit_code::STATE,
        "validation_failed" => exit_code::USAGE,
        "timeout" | "scan_timeout" => exit_code::TIMEOUT,
        "config" => exit_code::CONFIG,
        _ => exit_code::GENERAL,
    }
}

/// A field-specific validation error from a core parse failure.
pub fn invalid(field: &str, err: &CoreError) -> CliError {
    let reason = match err {
        CoreError::ValidationFailed { message } => message.clone(),
        other => other.to_string(),
    };
    CliError::Validation {
        field: field.into(),
        reason,
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            e @ (CoreError::HardwareNotReady { .. } | CoreError::ServiceManagerNotReady { .. }) => {
                CliError::HardwareNotReady { message: e.to_string() }
            }

            e @ CoreError::ActivationFailed { .. } => CliError::ApFailed {
                kind: e.kind().into(),
                message: e.to_string(),
            },

            CoreError::ConfigConflict { interface, detail } => {
                CliError::DhcpConflict { interface, detail }
            }

            CoreError::ReservationConflict { address, holder, .. } => {
                CliError::ReservationConflict {
                    address: address.to_string(),
                    holder: holder.to_string(),
                }
            }

            CoreError::AddressConflict {
                interface,
                subnet,
                holder,
            } => CliError::AddressConflict {
                interface,
                subnet,
                holder,
            },

            e @ CoreError::ScanTimeout { .. } => CliError::Timeout { message: e.to_string() },

            CoreError::PersistenceError { path, reason } => CliError::Persistence {
                path: path.display().to_string(),
                reason,
            },

            CoreError::AdapterNotFound { identifier } => CliError::NotFound {
                resource_type: "adapter".into(),
                identifier,
                list_command: "adapters list".into(),
            },

            CoreError::ReservationNotFound { hardware_address } => CliError::NotFound {
                resource_type: "reservation".into(),
                identifier: hardware_address.to_string(),
                list_command: "reservations list".into(),
            },

            CoreError::ValidationFailed { message } => CliError::Validation {
                field: "input".into(),
                reason: message,
            },

            CoreError::InvalidState { operation, state } => {
                CliError::InvalidState { operation, state }
            }

            CoreError::CommandFailed {
                operation,
                exit_code,
                stderr,
            } => CliError::CommandFailed {
                operation,
                exit_code,
                stderr,
            },

            e @ CoreError::Timeout { .. } => CliError::Timeout { message: e.to_string() },

            CoreError::Config { message } => CliError::Config(ConfigError::Validation {
                field: "configuration".into(),
                reason: message,
            }),

            CoreError::Internal(message) => CliError::Internal(message),
        }
    }
}
