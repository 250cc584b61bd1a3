use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::{Mutex, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{AdapterPlan, EngineConfig};
use crate::error::CoreError;
use crate::model::{Adapter, AdapterRole, AddressPlan, LinkState};
use crate::model::adapter::static_connection_name;
use crate::parse::{LinkRecord, parse_addresses, parse_driver, parse_links};
use crate::runner::{CommandRunner, ConnectionProfile, Operation, run_checked};
use crate::store::EntityCollection;

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    pub added: Vec<String>,
    pub went_absent: Vec<String>,
    pub removed: Vec<String>,
}

impl RefreshSummary {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.went_absent.is_empty() && self.removed.is_empty()
    }
}

/// Registry of physical adapters keyed by interface name.
///
/// Reads are lock-free snapshots. `refresh` and `assign_address` are
/// serialized against each other so a hotplug pass never interleaves with
/// an address change.
pub struct AdapterRegistry {
    runner: Arc<dyn CommandRunner>,
    builtin: Vec<String>,
    absent_grace: Duration,
    ap_interface: String,
    ap_address: AddressPlan,
    command_timeout: Duration,
    adapters: EntityCollection<Adapter>,
    /// Addressing plans by interface, including adapters not attached yet.
    plans: DashMap<String, AdapterPlan>,
    absent_since: DashMap<String, Instant>,
    write_lock: Mutex<()>,
}

impl AdapterRegistry {
    pub fn new(runner: Arc<dyn CommandRunner>, config: &EngineConfig) -> Self {
        Self {
            runner,
            builtin: config.adapters.builtin.clone(),
            absent_grace: config.adapters.absent_grace,
            ap_interface: config.ap.interface.clone(),
            ap_address: config.ap.address,
            command_timeout: config.command_timeout,
            adapters: EntityCollection::new(),
            plans: isolated_plans(config),
            absent_since: DashMap::new(),
            write_lock: Mutex::new(()),
        }
    }

    // ── Reads ────────────────────────────────────────────────────────

    pub fn get(&self, id: &str) -> Option<Arc<Adapter>> {
        self.adapters.get(id)
    }

    pub fn list(&self) -> Arc<Vec<Arc<Adapter>>> {
        self.adapters.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<Vec<Arc<Adapter>>>> {
        self.adapters.subscribe()
    }

    /// Present add-on wired adapters: not built in, not wireless.
    pub fn usb_adapters(&self) -> Vec<Arc<Adapter>> {
        self.list()
            .iter()
            .filter(|a| a.is_present() && !a.builtin && a.role.is_wired())
            .cloned()
            .collect()
    }

    /// Wired adapters that carry an addressing plan, sorted by name.
    pub fn wired_plans(&self) -> Vec<(String, AddressPlan)> {
        self.list()
            .iter()
            .filter(|a| a.role.is_wired())
            .filter_map(|a| a.assigned_address.map(|p| (a.id.clone(), p)))
            .collect()
    }

    /// Configured plans, whether or not the adapter is attached.
    pub fn plans(&self) -> Vec<(String, AdapterPlan)> {
        let mut plans: Vec<_> = self
            .plans
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect();
        plans.sort_by(|a, b| a.0.cmp(&b.0));
        plans
    }

    pub fn ap_interface(&self) -> &str {
        &self.ap_interface
    }

    fn role_for(&self, name: &str) -> AdapterRole {
        if name == self.ap_interface {
            AdapterRole::WirelessAp
        } else if name.starts_with("wl") {
            AdapterRole::Wireless
        } else {
            AdapterRole::Wired
        }
    }

    // ── Reconciliation ───────────────────────────────────────────────

    /// Re-enumerate attached adapters and reconcile with known state.
    ///
    /// New links are added, links that vanished are marked `absent`, and
    /// absent adapters past the grace period are dropped.
    pub async fn refresh(&self) -> Result<RefreshSummary, CoreError> {
        let _guard = self.write_lock.lock().await;

        let output = run_checked(self.runner.as_ref(), &Operation::ListLinks, self.command_timeout).await?;
        let links = parse_links(&output.stdout);

        let addresses = self
            .runner
            .run(&Operation::ShowAddresses, self.command_timeout)
            .await
            .stdout()
            .map(parse_addresses)
            .unwrap_or_default();

        let mut summary = RefreshSummary::default();
        let now = Instant::now();
        let seen: Vec<&str> = links.iter().map(|l| l.name.as_str()).collect();

        for link in &links {
            let current = addresses.get(&link.name).cloned().unwrap_or_default();
            self.absent_since.remove(&link.name);
            if self.adapters.get(&link.name).is_some() {
                self.adapters.update(&link.name, |adapter| {
                    adapter.link_state = link_state(link);
                    adapter.hardware_address.clone_from(&link.hardware_address);
                    adapter.current_addresses = current;
                    adapter.last_seen_at = Utc::now();
                });
            } else {
                let adapter = self.detect(link, current).await;
                info!(interface = %adapter.id, role = %adapter.role, "adapter detected");
                summary.added.push(adapter.id.clone());
                self.adapters.upsert(adapter.id.clone(), adapter);
            }
        }

        for key in self.adapters.keys() {
            if seen.contains(&key.as_str()) {
                continue;
            }
            let since = *self.absent_since.entry(key.clone()).or_insert(now);
            if now.duration_since(since) >= self.absent_grace {
                self.adapters.remove(&key);
                self.absent_since.remove(&key);
                info!(interface = %key, "adapter removed after grace period");
                summary.removed.push(key);
            } else if let Some(adapter) = self.adapters.get(&key) {
                if adapter.link_state != LinkState::Absent {
                    self.adapters.update(&key, |a| a.link_state = LinkState::Absent);
                    warn!(interface = %key, "adapter went absent");
                    summary.went_absent.push(key);
                }
            }
        }

        if !summary.is_empty() {
            debug!(?summary, "adapter registry reconciled");
        }
        Ok(summary)
    }

    async fn detect(&self, link: &LinkRecord, current: Vec<String>) -> Adapter {
        let driver = self
            .runner
            .run(
                &Operation::DriverName {
                    interface: link.name.clone(),
                },
                self.command_timeout,
            )
            .await
            .stdout()
            .and_then(parse_driver);
        let role = self.role_for(&link.name);
        let plan = self
            .plans
            .get(&link.name)
            .map(|p| p.value().clone())
            .filter(|p| {
                let usable = role.is_wired() && self.check_isolation(&link.name, p.address).is_ok();
                if !usable {
                    warn!(interface = %link.name, address = %p.address, "addressing plan not isolated, not applied");
                }
                usable
            });
        Adapter {
            id: link.name.clone(),
            hardware_address: link.hardware_address.clone(),
            role,
            link_state: link_state(link),
            assigned_address: plan.as_ref().map(|p| p.address),
            current_addresses: current,
            isolation_domain: plan
                .and_then(|p| p.isolation_domain)
                .unwrap_or_else(|| link.name.clone()),
            driver,
            builtin: self.builtin.iter().any(|b| b == &link.name),
            last_seen_at: Utc::now(),
        }
    }

    // ── Addressing ───────────────────────────────────────────────────

    /// Apply a static addressing plan to a wired adapter.
    ///
    /// Rejected with `AddressConflict` when the subnet overlaps another
    /// wired adapter's plan or the access point network. Otherwise the
    /// `<iface>-static` connection is created or modified and brought up.
    pub async fn assign_address(
        &self,
        id: &str,
        plan: AddressPlan,
        isolation_domain: Option<String>,
    ) -> Result<Arc<Adapter>, CoreError> {
        plan.validate()?;
        let _guard = self.write_lock.lock().await;

        let adapter = self
            .adapters
            .get(id)
            .ok_or_else(|| CoreError::AdapterNotFound {
                identifier: id.to_owned(),
            })?;
        if !adapter.role.is_wired() {
            return Err(CoreError::validation(format!(
                "{id} is wireless; its addressing belongs to the access point"
            )));
        }

        self.check_isolation(id, plan)?;

        let name = static_connection_name(id);
        let profile = ConnectionProfile::StaticEthernet { address: plan };
        let exists = self
            .runner
            .run(&Operation::ConnectionExists { name: name.clone() }, self.command_timeout)
            .await
            .succeeded();
        let apply = if exists {
            Operation::ConnectionModify {
                name: name.clone(),
                profile,
            }
        } else {
            Operation::ConnectionAdd {
                name: name.clone(),
                interface: id.to_owned(),
                profile,
            }
        };
        run_checked(self.runner.as_ref(), &apply, self.command_timeout).await?;
        run_checked(
            self.runner.as_ref(),
            &Operation::ConnectionUp { name },
            self.command_timeout,
        )
        .await?;

        let domain = isolation_domain
            .or_else(|| self.plans.get(id).and_then(|p| p.isolation_domain.clone()))
            .unwrap_or_else(|| id.to_owned());
        self.plans.insert(
            id.to_owned(),
            AdapterPlan {
                address: plan,
                isolation_domain: Some(domain.clone()),
            },
        );
        let updated = self
            .adapters
            .update(id, |a| {
                a.assigned_address = Some(plan);
                a.isolation_domain = domain;
            })
            .ok_or_else(|| CoreError::AdapterNotFound {
                identifier: id.to_owned(),
            })?;

        info!(interface = %id, address = %plan, "static address applied");
        Ok(updated)
    }

    fn check_isolation(&self, id: &str, plan: AddressPlan) -> Result<(), CoreError> {
        let subnet = plan.subnet();
        if subnet.overlaps(&self.ap_address.subnet()) {
            return Err(CoreError::AddressConflict {
                interface: id.to_owned(),
                subnet: subnet.to_string(),
                holder: self.ap_interface.clone(),
            });
        }
        for entry in &self.plans {
            let other = entry.key();
            if other == id || *other == self.ap_interface || self.role_for(other).is_wireless() {
                continue;
            }
            if subnet.overlaps(&entry.value().address.subnet()) {
                return Err(CoreError::AddressConflict {
                    interface: id.to_owned(),
                    subnet: subnet.to_string(),
                    holder: other.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Configured plans that keep every wired subnet apart from the access
/// point and from each other. Plans are taken in interface order; one that
/// overlaps an earlier plan is dropped.
fn isolated_plans(config: &EngineConfig) -> DashMap<String, AdapterPlan> {
    let accepted: DashMap<String, AdapterPlan> = DashMap::new();
    let ap_subnet = config.ap.address.subnet();
    for (iface, plan) in &config.adapters.plans {
        let subnet = plan.address.subnet();
        let holder = if subnet.overlaps(&ap_subnet) {
            Some(config.ap.interface.clone())
        } else {
            accepted
                .iter()
                .find(|other| subnet.overlaps(&other.value().address.subnet()))
                .map(|other| other.key().clone())
        };
        if let Some(holder) = holder {
            warn!(interface = %iface, %subnet, %holder, "addressing plan overlaps another network, ignored");
            continue;
        }
        accepted.insert(iface.clone(), plan.clone());
    }
    accepted
}

fn link_state(link: &LinkRecord) -> LinkState {
    if link.up { LinkState::Up } else { LinkState::Down }
}
