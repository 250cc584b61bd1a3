// ── Domain model ──
//
// Typed entities shared by every component. Validation of addresses,
// hardware identifiers and AP parameters happens when these are built.

pub mod adapter;
pub mod address;
pub mod ap;
pub mod device;
pub mod mac;
pub mod reservation;
pub mod status;

pub use adapter::{Adapter, AdapterRole, LinkState};
pub use address::{AddressPlan, MAX_SCAN_HOSTS, Subnet};
pub use ap::{ApClient, ApFailure, ApSettings, ApState, ApStatus, ApTransition, AttemptRecord};
pub use device::{ControllerInfo, DiscoveredDevice, ScanError, ScanErrorKind, ScanReport};
pub use mac::MacAddress;
pub use reservation::Reservation;
pub use status::SystemStatus;
