// ── Reservation domain types ──

use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::mac::MacAddress;

/// A durable binding of a hardware address to a wired-side address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub hardware_address: MacAddress,
    pub address: Ipv4Addr,
    #[serde(default)]
    pub label: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Reservation {
    /// Hostname handed to the DHCP server, derived from the label.
    ///
    /// Lowercases, maps anything outside `[a-z0-9-]` to `-`, collapses
    /// runs, trims leading/trailing dashes and caps the result at 63
    /// characters. `None` when nothing usable remains.
    pub fn hostname(&self) -> Option<String> {
        let mut out = String::with_capacity(self.label.len());
        for ch in self.label.chars() {
            let mapped = if ch.is_ascii_alphanumeric() {
                ch.to_ascii_lowercase()
            } else {
                '-'
            };
            if mapped == '-' && (out.is_empty() || out.ends_with('-')) {
                continue;
            }
            out.push(mapped);
        }
        let trimmed: String = out.trim_end_matches('-').chars().take(63).collect();
        let trimmed = trimmed.trim_end_matches('-').to_owned();
        (!trimmed.is_empty()).then_some(trimmed)
    }
}
