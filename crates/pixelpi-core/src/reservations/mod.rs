// ── Reservation table ──

mod persist;
mod store;

pub use store::{ReservationStore, TouchOutcome};
