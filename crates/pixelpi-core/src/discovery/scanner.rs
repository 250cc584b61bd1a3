use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::StreamExt;
use tokio::sync::watch;
use tokio::time::{Instant, sleep_until, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::probe::NetworkProbe;
use crate::error::CoreError;
use crate::model::{
    DiscoveredDevice, MAX_SCAN_HOSTS, MacAddress, ScanError, ScanErrorKind, ScanReport, Subnet,
};

enum HostResult {
    Silent,
    Found(DiscoveredDevice),
    Failed(String),
}

/// Active sweep of a wired subnet.
pub struct DiscoveryScanner {
    probe: Arc<dyn NetworkProbe>,
    concurrency: usize,
    latest: watch::Sender<Option<Arc<ScanReport>>>,
}

impl DiscoveryScanner {
    pub fn new(probe: Arc<dyn NetworkProbe>, concurrency: usize) -> Self {
        let (latest, _) = watch::channel(None);
        Self {
            probe,
            concurrency: concurrency.max(1),
            latest,
        }
    }

    /// The most recent completed scan. Each scan replaces the last.
    pub fn latest(&self) -> Option<Arc<ScanReport>> {
        self.latest.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<ScanReport>>> {
        self.latest.subscribe()
    }

    /// Probe every host of `subnet` with bounded parallelism.
    ///
    /// Returns within `total_timeout`. Hosts not probed by then (or by
    /// cancellation) are reported in `errors`, never in `devices`.
    pub async fn scan(
        &self,
        subnet: Subnet,
        per_host_timeout: Duration,
        total_timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<ScanReport, CoreError> {
        if subnet.host_count() > MAX_SCAN_HOSTS {
            return Err(CoreError::validation(format!(
                "{subnet} has {} hosts, scans are limited to {MAX_SCAN_HOSTS}",
                subnet.host_count()
            )));
        }

        let started_at = Utc::now();
        let started = Instant::now();
        let deadline = started + total_timeout;
        let hosts: Vec<Ipv4Addr> = subnet.hosts().collect();
        let mut unprobed: BTreeSet<Ipv4Addr> = hosts.iter().copied().collect();
        info!(%subnet, hosts = hosts.len(), "scan started");

        let probe = Arc::clone(&self.probe);
        let mut probes = futures_util::stream::iter(hosts)
            .map(|address| {
                let probe = Arc::clone(&probe);
                async move {
                    let result = probe_host(probe.as_ref(), address, per_host_timeout).await;
                    (address, result)
                }
            })
            .buffer_unordered(self.concurrency);

        let mut by_mac: BTreeMap<MacAddress, DiscoveredDevice> = BTreeMap::new();
        let mut errors = Vec::new();

        let stopped = loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break Some(ScanErrorKind::Cancelled),
                () = sleep_until(deadline) => break Some(ScanErrorKind::Timeout),
                next = probes.next() => {
                    let Some((address, result)) = next else { break None };
                    unprobed.remove(&address);
                    match result {
                        HostResult::Silent => {}
                        HostResult::Found(device) => merge(&mut by_mac, device),
                        HostResult::Failed(detail) => errors.push(ScanError {
                            address,
                            kind: ScanErrorKind::Probe,
                            detail: Some(detail),
                        }),
                    }
                }
            }
        };
        // in-flight probes are dropped here; their hosts stay unprobed
        drop(probes);

        if let Some(kind) = stopped {
            errors.extend(unprobed.iter().map(|&address| ScanError {
                address,
                kind,
                detail: None,
            }));
        }
        errors.sort_by_key(|e| e.address);

        let mut devices: Vec<DiscoveredDevice> = by_mac.into_values().collect();
        devices.sort_by_key(|d| d.address);

        let report = ScanReport {
            subnet,
            started_at,
            elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            devices,
            errors,
        };
        info!(
            %subnet,
            devices = report.devices.len(),
            responded = report.devices.iter().filter(|d| d.responded).count(),
            unprobed = if stopped.is_some() { unprobed.len() } else { 0 },
            elapsed_ms = report.elapsed_ms,
            "scan finished"
        );
        self.latest.send_replace(Some(Arc::new(report.clone())));
        Ok(report)
    }
}

/// The same hardware address seen twice: prefer the one that identified,
/// then the lower address.
fn merge(by_mac: &mut BTreeMap<MacAddress, DiscoveredDevice>, device: DiscoveredDevice) {
    match by_mac.get(&device.hardware_address) {
        Some(existing)
            if (existing.responded && !device.responded)
                || (existing.responded == device.responded && existing.address <= device.address) => {}
        _ => {
            by_mac.insert(device.hardware_address.clone(), device);
        }
    }
}

async fn probe_host(probe: &dyn NetworkProbe, address: Ipv4Addr, per_host: Duration) -> HostResult {
    let hardware_address = match timeout(per_host, probe.resolve(address, per_host)).await {
        Ok(Ok(Some(mac))) => mac,
        Ok(Ok(None)) | Err(_) => return HostResult::Silent,
        Ok(Err(detail)) => return HostResult::Failed(detail),
    };
    let info = timeout(per_host, probe.identify(address, per_host))
        .await
        .ok()
        .flatten();
    debug!(%address, %hardware_address, responded = info.is_some(), "host resolved");
    HostResult::Found(DiscoveredDevice {
        hardware_address,
        address,
        last_seen_at: Utc::now(),
        responded: info.is_some(),
        info,
    })
}
