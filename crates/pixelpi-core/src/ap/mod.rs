// ── Access point lifecycle ──
//
// One process-wide `ApState`, owned by `ApController`. Everything else
// reads it through `status()` / `subscribe()`.

mod controller;
mod sequence;

pub use controller::{ApController, WatchdogOutcome};
