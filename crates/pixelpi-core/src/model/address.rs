// ── IPv4 addressing plans ──
//
// `AddressPlan` is a host address plus prefix ("10.0.1.1/24"), the unit an
// adapter is configured with. `Subnet` is the network it implies; overlap
// between subnets is what the isolation invariant checks.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::CoreError;

/// Largest sweep the discovery scanner accepts (a /20).
pub const MAX_SCAN_HOSTS: u32 = 4094;

fn parse_ipv4_cidr(cidr: &str) -> Result<(Ipv4Addr, u8), CoreError> {
    let (host, prefix) = cidr
        .trim()
        .split_once('/')
        .ok_or_else(|| CoreError::validation(format!("invalid ipv4 host/prefix value '{cidr}'")))?;
    let host_ip = host
        .parse::<Ipv4Addr>()
        .map_err(|_| CoreError::validation(format!("invalid IPv4 host address '{host}'")))?;
    let prefix_len = prefix
        .parse::<u8>()
        .map_err(|_| CoreError::validation(format!("invalid IPv4 prefix length '{prefix}'")))?;
    if prefix_len > 32 {
        return Err(CoreError::validation(format!(
            "IPv4 prefix length must be <= 32, got {prefix_len}"
        )));
    }
    Ok((host_ip, prefix_len))
}

fn mask(prefix: u8) -> u32 {
    if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix))
    }
}

// ── Subnet ──────────────────────────────────────────────────────────

/// An IPv4 network, always stored with host bits cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subnet {
    network: Ipv4Addr,
    prefix: u8,
}

impl Subnet {
    pub fn new(address: Ipv4Addr, prefix: u8) -> Result<Self, CoreError> {
        if prefix > 32 {
            return Err(CoreError::validation(format!(
                "IPv4 prefix length must be <= 32, got {prefix}"
            )));
        }
        let network = Ipv4Addr::from(u32::from(address) & mask(prefix));
        Ok(Self { network, prefix })
    }

    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    pub fn broadcast(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.network) | !mask(self.prefix))
    }

    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        u32::from(addr) & mask(self.prefix) == u32::from(self.network)
    }

    /// Two networks overlap when the shorter prefix contains the other's base.
    pub fn overlaps(&self, other: &Subnet) -> bool {
        let shorter = self.prefix.min(other.prefix);
        u32::from(self.network) & mask(shorter) == u32::from(other.network) & mask(shorter)
    }

    /// Number of usable host addresses (network and broadcast excluded
    /// for prefixes shorter than /31).
    pub fn host_count(&self) -> u32 {
        match self.prefix {
            32 => 1,
            31 => 2,
            p => (1u32 << (32 - u32::from(p))) - 2,
        }
    }

    /// Usable host addresses in ascending order.
    pub fn hosts(&self) -> impl Iterator<Item = Ipv4Addr> + use<> {
        let base = u32::from(self.network);
        let (first, last) = match self.prefix {
            32 => (base, base),
            31 => (base, base + 1),
            _ => (base + 1, u32::from(self.broadcast()) - 1),
        };
        (first..=last).map(Ipv4Addr::from)
    }

    /// The address `offset` hosts above the network base, if it is a
    /// usable host of this subnet.
    pub fn nth_host(&self, offset: u32) -> Option<Ipv4Addr> {
        let candidate = u32::from(self.network).checked_add(offset)?;
        let addr = Ipv4Addr::from(candidate);
        (offset > 0 && self.contains(addr) && addr != self.broadcast()).then_some(addr)
    }
}

impl fmt::Display for Subnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}

impl FromStr for Subnet {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, prefix) = parse_ipv4_cidr(s)?;
        Self::new(addr, prefix)
    }
}

// ── AddressPlan ─────────────────────────────────────────────────────

/// A static host address for an interface, e.g. `10.0.1.1/24`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AddressPlan {
    pub address: Ipv4Addr,
    pub prefix: u8,
}

impl AddressPlan {
    pub fn new(address: Ipv4Addr, prefix: u8) -> Result<Self, CoreError> {
        let plan = Self { address, prefix };
        plan.validate()?;
        Ok(plan)
    }

    /// A plan must name a usable host: not the network or broadcast
    /// address, and not loopback, multicast or unspecified.
    pub fn validate(&self) -> Result<(), CoreError> {
        if !(8..=30).contains(&self.prefix) {
            return Err(CoreError::validation(format!(
                "prefix /{} is outside the supported range /8../30",
                self.prefix
            )));
        }
        let addr = self.address;
        if addr.is_loopback() || addr.is_multicast() || addr.is_unspecified() || addr.is_broadcast()
        {
            return Err(CoreError::validation(format!(
                "{addr} cannot be assigned to an interface"
            )));
        }
        let subnet = self.subnet();
        if addr == subnet.network() || addr == subnet.broadcast() {
            return Err(CoreError::validation(format!(
                "{addr} is the network or broadcast address of {subnet}"
            )));
        }
        Ok(())
    }

    pub fn subnet(&self) -> Subnet {
        // prefix is <= 32 by construction
        Subnet {
            network: Ipv4Addr::from(u32::from(self.address) & mask(self.prefix)),
            prefix: self.prefix,
        }
    }
}

impl fmt::Display for AddressPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.prefix)
    }
}

impl FromStr for AddressPlan {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (address, prefix) = parse_ipv4_cidr(s)?;
        Self::new(address, prefix)
    }
}

impl Serialize for AddressPlan {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for AddressPlan {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

impl Serialize for Subnet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
