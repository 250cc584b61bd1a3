// ── DHCP coordination ──
//
// Single authority per interface, enforced when the wired configuration
// is generated: the wired service only ever whitelists wired adapters and
// the wireless interface is left to the connection manager. Every change
// to reservations flows through here so the generated file and the table
// never drift.

mod conflict;
mod render;

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::adapters::AdapterRegistry;
use crate::config::DhcpConfig;
use crate::error::CoreError;
use crate::model::{DiscoveredDevice, MacAddress, Reservation};
use crate::reservations::{ReservationStore, TouchOutcome};
use crate::runner::{CommandRunner, Operation, run_checked};
use crate::store::{read_optional, write_atomic_async};

/// Result of a rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebuildOutcome {
    /// Rendered content matched the file; nothing written or reloaded.
    Unchanged,
    /// File replaced and the service restarted.
    Applied,
    /// The service has not loaded the current content yet, because the
    /// write or the restart failed. The next rebuild tries again even if
    /// nothing else changed.
    Pending,
}

pub struct DhcpCoordinator {
    runner: Arc<dyn CommandRunner>,
    config: DhcpConfig,
    ap_interface: String,
    command_timeout: Duration,
    registry: Arc<AdapterRegistry>,
    store: Arc<ReservationStore>,
    /// Held for the whole rebuild. `true` while the file on disk is newer
    /// than what the service last loaded.
    reload_pending: Mutex<bool>,
}

impl DhcpCoordinator {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        config: DhcpConfig,
        ap_interface: impl Into<String>,
        command_timeout: Duration,
        registry: Arc<AdapterRegistry>,
        store: Arc<ReservationStore>,
    ) -> Self {
        Self {
            runner,
            config,
            ap_interface: ap_interface.into(),
            command_timeout,
            registry,
            store,
            reload_pending: Mutex::new(false),
        }
    }

    pub fn store(&self) -> &Arc<ReservationStore> {
        &self.store
    }

    pub fn config_path(&self) -> &std::path::Path {
        &self.config.config_path
    }

    /// Render the configuration the service would get right now.
    pub async fn render(&self) -> String {
        let plans = self.registry.wired_plans();
        let reservations = self.store.list().await;
        render::render_wired_config(&self.ap_interface, &plans, &reservations, &self.config)
    }

    /// Regenerate the wired DHCP configuration from the registry and the
    /// reservation table, and restart the service if it changed or an
    /// earlier restart failed. The only path by which the generated file
    /// changes.
    pub async fn rebuild_wired_config(&self) -> Result<RebuildOutcome, CoreError> {
        let mut pending = self.reload_pending.lock().await;
        if let Err(e) = self.store.refresh().await {
            warn!(error = %e, "reservation file unreadable, rendering the loaded table");
        }
        let rendered = self.render().await;

        let path = self.config.config_path.clone();
        let current = read_optional(path.clone()).await?;
        if current.as_deref() == Some(rendered.as_str()) {
            if !*pending {
                debug!(path = %path.display(), "dhcp configuration unchanged");
                return Ok(RebuildOutcome::Unchanged);
            }
            info!(path = %path.display(), "retrying dhcp service restart");
        } else {
            write_atomic_async(path.clone(), rendered).await?;
            *pending = true;
        }

        let restart = Operation::ServiceRestart {
            service: self.config.service.clone(),
        };
        run_checked(self.runner.as_ref(), &restart, self.command_timeout).await?;
        *pending = false;
        info!(path = %path.display(), service = %self.config.service, "dhcp configuration applied");
        Ok(RebuildOutcome::Applied)
    }

    /// Whether the service still has to load the file on disk.
    pub async fn reload_pending(&self) -> bool {
        *self.reload_pending.lock().await
    }

    /// Rebuild after a reservation change that is already on disk. The
    /// change stands when the rebuild fails; it is reported as `Pending`
    /// and retried by the next rebuild.
    async fn rebuild_after_commit(&self) -> RebuildOutcome {
        match self.rebuild_wired_config().await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "reservation saved but dhcp service not reloaded");
                RebuildOutcome::Pending
            }
        }
    }

    /// Fail if the wireless interface could be served by two DHCP
    /// authorities. Never auto-resolved.
    pub async fn assert_no_conflict(&self) -> Result<(), CoreError> {
        let mut paths = self.config.inspect_paths.clone();
        if !paths.contains(&self.config.config_path) {
            paths.push(self.config.config_path.clone());
        }
        let mut files = Vec::with_capacity(paths.len());
        for path in paths {
            if let Some(contents) = read_optional(path.clone()).await? {
                files.push((path, contents));
            }
        }
        match conflict::find_conflict(&self.ap_interface, &files) {
            Some(err) => Err(err),
            None => {
                debug!(files = files.len(), "no dhcp authority conflict");
                Ok(())
            }
        }
    }

    // ── Reservation writes ───────────────────────────────────────────

    pub async fn reserve(
        &self,
        hardware_address: MacAddress,
        address: Ipv4Addr,
        label: impl Into<String>,
    ) -> Result<(Reservation, RebuildOutcome), CoreError> {
        let reservation = self.store.reserve(hardware_address, address, label).await?;
        Ok((reservation, self.rebuild_after_commit().await))
    }

    pub async fn touch(
        &self,
        hardware_address: &MacAddress,
        address: Ipv4Addr,
        label_hint: Option<&str>,
    ) -> Result<TouchOutcome, CoreError> {
        let outcome = self.store.touch(hardware_address, address, label_hint).await?;
        if outcome.changed() {
            self.rebuild_after_commit().await;
        }
        Ok(outcome)
    }

    /// Forward discovered devices to the reservation table, then rebuild
    /// once if any sighting changed it or a reload is still owed. A
    /// sighting that collides with another device's reservation is
    /// skipped. Returns how many changed.
    pub async fn record_sightings(
        &self,
        devices: &[DiscoveredDevice],
        include_unidentified: bool,
    ) -> Result<usize, CoreError> {
        let mut changed = 0;
        for device in devices.iter().filter(|d| d.responded || include_unidentified) {
            match self
                .store
                .touch(&device.hardware_address, device.address, device.label_hint())
                .await
            {
                Ok(outcome) if outcome.changed() => changed += 1,
                Ok(_) => {}
                Err(e @ CoreError::ReservationConflict { .. }) => {
                    warn!(error = %e, "sighting conflicts with an existing reservation, skipped");
                }
                Err(e) => return Err(e),
            }
        }
        if changed > 0 || self.reload_pending().await {
            self.rebuild_after_commit().await;
        }
        Ok(changed)
    }

    pub async fn remove(&self, hardware_address: &MacAddress) -> Result<(Reservation, RebuildOutcome), CoreError> {
        let removed = self.store.remove(hardware_address).await?;
        Ok((removed, self.rebuild_after_commit().await))
    }
}
