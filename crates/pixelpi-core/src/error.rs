// ── Core error types ──
//
// User-facing errors from pixelpi-core. Every mutating operation on the
// administrative surface returns either a success payload or one of these,
// carrying enough detail (interface, address, attempt count) to diagnose
// without reading logs. Non-zero exits of external tools are never errors
// by themselves; callers decide when one becomes `CommandFailed`.

use std::net::Ipv4Addr;
use std::path::PathBuf;

use thiserror::Error;

use crate::model::MacAddress;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Readiness / activation ───────────────────────────────────────
    #[error("Interface {interface} not ready after {waited_secs}s")]
    HardwareNotReady { interface: String, waited_secs: u64 },

    #[error("Connection manager not operational after {waited_secs}s")]
    ServiceManagerNotReady { waited_secs: u64 },

    #[error("Access point activation on {interface} failed after {attempts} attempt(s): {last_error}")]
    ActivationFailed {
        interface: String,
        attempts: u32,
        last_error: String,
    },

    // ── Configuration integrity ──────────────────────────────────────
    #[error("DHCP authority conflict on {interface}: {detail}")]
    ConfigConflict { interface: String, detail: String },

    #[error("Address {address} is already reserved for {holder} (requested by {hardware_address})")]
    ReservationConflict {
        address: Ipv4Addr,
        hardware_address: MacAddress,
        holder: MacAddress,
    },

    #[error("Subnet {subnet} requested for {interface} is already in use by {holder}")]
    AddressConflict {
        interface: String,
        subnet: String,
        holder: String,
    },

    // ── Discovery ────────────────────────────────────────────────────
    #[error("Scan deadline reached with {unprobed} host(s) not probed")]
    ScanTimeout { unprobed: usize },

    // ── Persistence ──────────────────────────────────────────────────
    #[error("Failed to persist {path}: {reason}")]
    PersistenceError { path: PathBuf, reason: String },

    // ── Lookups ──────────────────────────────────────────────────────
    #[error("Adapter not found: {identifier}")]
    AdapterNotFound { identifier: String },

    #[error("No reservation for {hardware_address}")]
    ReservationNotFound { hardware_address: MacAddress },

    // ── Operation errors ─────────────────────────────────────────────
    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    #[error("Operation rejected in state {state}: {operation}")]
    InvalidState { operation: String, state: String },

    #[error("`{operation}` exited with {exit_code}: {stderr}")]
    CommandFailed {
        operation: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("`{operation}` timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Stable, machine-readable kind for the administrative surface.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::HardwareNotReady { .. } => "hardware_not_ready",
            Self::ServiceManagerNotReady { .. } => "service_manager_not_ready",
            Self::ActivationFailed { .. } => "activation_failed",
            Self::ConfigConflict { .. } => "config_conflict",
            Self::ReservationConflict { .. } => "reservation_conflict",
            Self::AddressConflict { .. } => "conflict",
            Self::ScanTimeout { .. } => "scan_timeout",
            Self::PersistenceError { .. } => "persistence_error",
            Self::AdapterNotFound { .. } | Self::ReservationNotFound { .. } => "not_found",
            Self::ValidationFailed { .. } => "validation_failed",
            Self::InvalidState { .. } => "invalid_state",
            Self::CommandFailed { .. } => "command_failed",
            Self::Timeout { .. } => "timeout",
            Self::Config { .. } => "config",
            Self::Internal(_) => "internal",
        }
    }

    /// Transient hardware/readiness failures may be retried locally.
    /// Integrity errors never are.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::HardwareNotReady { .. }
                | Self::ServiceManagerNotReady { .. }
                | Self::CommandFailed { .. }
                | Self::Timeout { .. }
        )
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::ValidationFailed {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(format!("I/O error: {err}"))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn integrity_errors_are_not_retryable() {
        let conflict = CoreError::ConfigConflict {
            interface: "wlan0".into(),
            detail: "served twice".into(),
        };
        assert!(!conflict.is_retryable());
        assert_eq!(conflict.kind(), "config_conflict");

        let reservation = CoreError::ReservationConflict {
            address: Ipv4Addr::new(10, 0, 1, 50),
            hardware_address: "11:22:33:44:55:66".parse().unwrap(),
            holder: "aa:bb:cc:dd:ee:ff".parse().unwrap(),
        };
        assert!(!reservation.is_retryable());
    }

    #[test]
    fn readiness_errors_are_retryable() {
        let err = CoreError::HardwareNotReady {
            interface: "wlan0".into(),
            waited_secs: 60,
        };
        assert!(err.is_retryable());
        assert_eq!(err.to_string(), "Interface wlan0 not ready after 60s");
    }
}
