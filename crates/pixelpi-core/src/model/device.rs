// ── Discovery result types ──

use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;

use super::address::Subnet;
use super::mac::MacAddress;
use crate::error::CoreError;

/// Identification payload returned by a controller's info endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerInfo {
    pub name: Option<String>,
    #[serde(rename = "ver")]
    pub version: Option<String>,
    pub brand: Option<String>,
    pub product: Option<String>,
    pub arch: Option<String>,
}

impl ControllerInfo {
    /// A reply only counts as an identification if it carries a version
    /// or a name.
    pub fn is_identified(&self) -> bool {
        self.version.is_some() || self.name.is_some()
    }
}

/// One host seen during a scan. Rebuilt every scan pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveredDevice {
    pub hardware_address: MacAddress,
    pub address: Ipv4Addr,
    pub last_seen_at: DateTime<Utc>,
    /// Whether the application-level identification succeeded.
    pub responded: bool,
    pub info: Option<ControllerInfo>,
}

impl DiscoveredDevice {
    /// Label used when a sighting creates a new reservation.
    pub fn label_hint(&self) -> Option<&str> {
        self.info.as_ref().and_then(|i| i.name.as_deref())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ScanErrorKind {
    /// The scan deadline passed before this host was probed.
    Timeout,
    /// The scan was cancelled before this host was probed.
    Cancelled,
    /// The probe ran but failed in a way worth reporting.
    Probe,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanError {
    pub address: Ipv4Addr,
    pub kind: ScanErrorKind,
    pub detail: Option<String>,
}

/// Result of one discovery pass.
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub subnet: Subnet,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub devices: Vec<DiscoveredDevice>,
    pub errors: Vec<ScanError>,
}

impl ScanReport {
    pub fn timed_out(&self) -> usize {
        self.errors
            .iter()
            .filter(|e| e.kind == ScanErrorKind::Timeout)
            .count()
    }

    /// The partial-result error to surface when the deadline cut the
    /// scan short.
    pub fn deadline_error(&self) -> Option<CoreError> {
        let unprobed = self.timed_out();
        (unprobed > 0).then_some(CoreError::ScanTimeout { unprobed })
    }
}
