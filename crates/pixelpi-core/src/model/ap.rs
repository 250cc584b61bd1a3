// ── Access point lifecycle types ──

use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::address::AddressPlan;
use super::mac::MacAddress;
use crate::error::CoreError;

/// Process-wide access point state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ApState {
    Disabled,
    WaitingForHardware,
    WaitingForServiceManager,
    Activating,
    Active,
    Failed,
}

impl ApState {
    /// Legal edges of the lifecycle. `Disabled` is reachable from every
    /// state because disable tears down unconditionally.
    pub fn can_transition_to(self, next: ApState) -> bool {
        use ApState::{
            Activating, Active, Disabled, Failed, WaitingForHardware, WaitingForServiceManager,
        };
        match (self, next) {
            (_, Disabled)
            | (Disabled | Failed, WaitingForHardware)
            | (WaitingForHardware, WaitingForServiceManager | Failed)
            | (WaitingForServiceManager, Activating | Failed)
            | (Activating, Activating | Active | Failed) => true,
            _ => false,
        }
    }

    /// States in which an activation sequence is running.
    pub fn is_in_flight(self) -> bool {
        matches!(
            self,
            Self::WaitingForHardware | Self::WaitingForServiceManager | Self::Activating
        )
    }

    /// States `enable()` may start from.
    pub fn accepts_enable(self) -> bool {
        matches!(self, Self::Disabled | Self::Failed)
    }
}

/// One state change of the access point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApTransition {
    pub from: ApState,
    pub to: ApState,
}

/// Diagnostic record of one failed activation attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub attempt: u32,
    pub at: DateTime<Utc>,
    pub exit_code: Option<i32>,
    pub detail: String,
}

/// Terminal failure reason attached to `ApState::Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApFailure {
    /// Stable kind from `CoreError::kind()`.
    pub kind: String,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl From<&CoreError> for ApFailure {
    fn from(err: &CoreError) -> Self {
        Self {
            kind: err.kind().to_owned(),
            message: err.to_string(),
            at: Utc::now(),
        }
    }
}

/// Snapshot of the access point, published on every transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApStatus {
    pub interface: String,
    pub state: ApState,
    pub ssid: Option<String>,
    pub last_failure: Option<ApFailure>,
    /// Failed attempts of the most recent activation sequence.
    pub failed_attempts: Vec<AttemptRecord>,
    /// Set by the watchdog when an active AP connection went missing.
    pub degraded: bool,
    pub changed_at: DateTime<Utc>,
}

impl ApStatus {
    pub(crate) fn new(interface: impl Into<String>, state: ApState) -> Self {
        Self {
            interface: interface.into(),
            state,
            ssid: None,
            last_failure: None,
            failed_attempts: Vec::new(),
            degraded: false,
            changed_at: Utc::now(),
        }
    }
}

/// Parameters for bringing the access point up.
#[derive(Debug, Clone)]
pub struct ApSettings {
    pub ssid: String,
    pub passphrase: SecretString,
    pub address: AddressPlan,
    pub channel: u8,
}

impl ApSettings {
    pub fn validate(&self) -> Result<(), CoreError> {
        let ssid_len = self.ssid.len();
        if !(1..=32).contains(&ssid_len) {
            return Err(CoreError::validation(format!(
                "SSID must be 1-32 bytes, got {ssid_len}"
            )));
        }
        let pass_len = self.passphrase.expose_secret().chars().count();
        if !(8..=63).contains(&pass_len) {
            return Err(CoreError::validation(
                "passphrase must be 8-63 characters",
            ));
        }
        if !(1..=11).contains(&self.channel) {
            return Err(CoreError::validation(format!(
                "channel must be 1-11, got {}",
                self.channel
            )));
        }
        self.address.validate()
    }
}

/// A client associated with the access point, from the neighbour table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApClient {
    pub address: Ipv4Addr,
    pub hardware_address: MacAddress,
    /// Neighbour state (`REACHABLE` or `STALE`).
    pub state: String,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn settings(ssid: &str, pass: &str, channel: u8) -> ApSettings {
        ApSettings {
            ssid: ssid.into(),
            passphrase: SecretString::from(pass.to_owned()),
            address: "10.0.2.1/24".parse().unwrap(),
            channel,
        }
    }

    #[test]
    fn lifecycle_edges() {
        assert!(ApState::Disabled.can_transition_to(ApState::WaitingForHardware));
        assert!(ApState::Failed.can_transition_to(ApState::WaitingForHardware));
        assert!(ApState::Activating.can_transition_to(ApState::Activating));
        assert!(ApState::Active.can_transition_to(ApState::Disabled));
        assert!(!ApState::Disabled.can_transition_to(ApState::Activating));
        assert!(!ApState::WaitingForHardware.can_transition_to(ApState::Active));
        assert!(!ApState::Active.can_transition_to(ApState::WaitingForHardware));
    }

    #[test]
    fn state_names_are_snake_case() {
        assert_eq!(ApState::WaitingForHardware.to_string(), "waiting_for_hardware");
        assert_eq!("active".parse::<ApState>().unwrap(), ApState::Active);
    }

    #[test]
    fn settings_validation() {
        assert!(settings("WLED-Manager-AP", "wledmanager", 6).validate().is_ok());
        assert!(settings("", "wledmanager", 6).validate().is_err());
        assert!(settings(&"x".repeat(33), "wledmanager", 6).validate().is_err());
        assert!(settings("ap", "short", 6).validate().is_err());
        assert!(settings("ap", "wledmanager", 12).validate().is_err());
        assert!(settings("ap", "wledmanager", 0).validate().is_err());
    }
}
