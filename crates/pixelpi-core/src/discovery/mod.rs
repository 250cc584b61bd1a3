// ── Device discovery ──

mod probe;
mod scanner;

pub use probe::{INFO_PATH, NetworkProbe, SystemProbe};
pub use scanner::DiscoveryScanner;
