//! Network orchestration engine for a PixelPi controller host.
//!
//! Turns a single-board computer into a field controller for addressable
//! LED controllers: wired adapters get static addressing and a DHCP pool,
//! the built-in radio runs a WPA2 access point, and controllers found on
//! the wired side get durable address reservations.
//!
//! - **[`Engine`]**: facade owning every component.
//!   [`start()`](Engine::start) runs the conflict self-check, loads state,
//!   applies adapter plans and spawns the background loops (hotplug,
//!   AP watchdog, periodic discovery) and the command processor.
//!   [`Engine::oneshot()`] starts without loops for single CLI invocations.
//!
//! - **[`ApController`]**: the access point state machine
//!   (`Disabled -> WaitingForHardware -> WaitingForServiceManager ->
//!   Activating -> Active | Failed`). One activation sequence at a time,
//!   bounded waits, fixed-delay retries.
//!
//! - **[`AdapterRegistry`]** / **[`DhcpCoordinator`]** /
//!   **[`ReservationStore`]**: adapter records and isolation rules, the
//!   generated wired-side DHCP file, and the atomically persisted
//!   reservation table.
//!
//! - **[`DiscoveryScanner`]**: bounded-concurrency subnet sweep with
//!   address resolution and HTTP identification.
//!
//! - **[`ControlServer`]** / **[`ControlClient`]**: the daemon's Unix
//!   socket, so one-shot invocations act on the running engine instead of
//!   a second one.
//!
//! - **[`CommandRunner`]**: the only seam to the host. Every external tool
//!   call is a typed [`Operation`] with its own timeout, so the whole engine
//!   runs against scripted fakes in tests.

pub mod adapters;
pub mod ap;
pub mod command;
pub mod config;
pub mod control;
pub mod dhcp;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod model;
mod parse;
pub mod readiness;
pub mod reservations;
pub mod runner;
mod store;

// ── Primary re-exports ──────────────────────────────────────────────
pub use adapters::{AdapterRegistry, HotplugEvent, RefreshSummary};
pub use ap::{ApController, WatchdogOutcome};
pub use command::{Command, CommandResult};
pub use config::{AdapterConfig, AdapterPlan, ApConfig, DhcpConfig, DiscoveryConfig, EngineConfig};
pub use control::{ControlClient, ControlRequest, ControlResponse, ControlServer};
pub use dhcp::{DhcpCoordinator, RebuildOutcome};
pub use discovery::{DiscoveryScanner, NetworkProbe, SystemProbe};
pub use engine::{Engine, EngineState, RunMode};
pub use error::CoreError;
pub use readiness::{InterfaceReadinessProbe, Pending, Readiness};
pub use reservations::{ReservationStore, TouchOutcome};
pub use runner::{CommandOutput, CommandRunner, Operation, RunOutcome, SystemRunner};

// Re-export model types at the crate root for ergonomics.
pub use model::{
    Adapter, AdapterRole, AddressPlan, ApClient, ApFailure, ApSettings, ApState, ApStatus, ApTransition,
    AttemptRecord, ControllerInfo, DiscoveredDevice, LinkState, MacAddress, Reservation,
    ScanError, ScanErrorKind, ScanReport, Subnet, SystemStatus,
};
