// ── Hardware address ──
//
// Every reservation, sighting, and adapter is keyed by a MacAddress.
// Construction always goes through `parse`, so a value of this type is
// guaranteed to be in canonical lowercase colon-separated form.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::CoreError;

/// MAC address, normalized to lowercase colon-separated format (aa:bb:cc:dd:ee:ff).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct MacAddress(String);

impl MacAddress {
    /// Parse a MAC address from any common format.
    /// Accepts colon-separated, dash-separated, dotted (cisco) or bare hex.
    pub fn parse(raw: impl AsRef<str>) -> Result<Self, CoreError> {
        let raw = raw.as_ref().trim();
        let hex: String = raw
            .chars()
            .filter(|c| !matches!(c, ':' | '-' | '.'))
            .collect();

        if hex.len() != 12 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(CoreError::validation(format!(
                "invalid hardware address '{raw}'"
            )));
        }

        let lower = hex.to_ascii_lowercase();
        let octets: Vec<&str> = (0..6)
            .filter_map(|i| lower.get(i * 2..i * 2 + 2))
            .collect();
        Ok(Self(octets.join(":")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `ff:ff:ff:ff:ff:ff` and `00:00:00:00:00:00` show up in neighbour
    /// tables for incomplete entries; neither identifies a device.
    pub fn is_placeholder(&self) -> bool {
        self.0 == "ff:ff:ff:ff:ff:ff" || self.0 == "00:00:00:00:00:00"
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MacAddress {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// Hand-edited reservation files may carry any accepted spelling.
impl<'de> Deserialize<'de> for MacAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn mac_address_normalizes_dashes() {
        let mac = MacAddress::parse("AA-BB-CC-DD-EE-FF").unwrap();
        assert_eq!(mac.as_str(), "aa:bb:cc:dd:ee:ff");
    }

    #[test]
    fn mac_address_normalizes_case() {
        let mac = MacAddress::parse("AA:BB:CC:DD:EE:FF").unwrap();
        assert_eq!(mac.as_str(), "aa:bb:cc:dd:ee:ff");
    }

    #[test]
    fn mac_address_accepts_bare_hex() {
        let mac: MacAddress = "aabbccddeeff".parse().unwrap();
        assert_eq!(mac.to_string(), "aa:bb:cc:dd:ee:ff");
    }

    #[test]
    fn mac_address_rejects_garbage() {
        assert!(MacAddress::parse("aa:bb:cc:dd:ee").is_err());
        assert!(MacAddress::parse("zz:bb:cc:dd:ee:ff").is_err());
        assert!(MacAddress::parse("").is_err());
    }

    #[test]
    fn mac_address_deserializes_through_parse() {
        let mac: MacAddress = serde_json::from_str("\"AA-BB-CC-DD-EE-01\"").unwrap();
        assert_eq!(mac.as_str(), "aa:bb:cc:dd:ee:01");
        assert!(serde_json::from_str::<MacAddress>("\"nope\"").is_err());
    }

    #[test]
    fn placeholder_addresses_are_flagged() {
        assert!(MacAddress::parse("ff:ff:ff:ff:ff:ff").unwrap().is_placeholder());
        assert!(!MacAddress::parse("aa:bb:cc:dd:ee:ff").unwrap().is_placeholder());
    }
}
