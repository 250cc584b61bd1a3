// ── Host status summary ──

use serde::Serialize;

use super::ap::ApState;

/// Aggregate health view shown by `pixelpi check` and the status command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SystemStatus {
    pub dhcp_service_active: bool,
    pub connection_manager_active: bool,
    pub usb_adapters: usize,
    pub reservations: usize,
    pub ap_state: ApState,
    pub ap_degraded: bool,
}
