use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::persist;
use crate::error::CoreError;
use crate::model::{MacAddress, Reservation};

/// What a `touch` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TouchOutcome {
    Created(Reservation),
    /// Address changed; label untouched.
    Updated(Reservation),
    Unchanged,
}

impl TouchOutcome {
    pub fn changed(&self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

/// Durable hardware-address -> address table.
///
/// The only writer of the reservation file. Every mutation re-reads the
/// file, computes the next table from it, writes that atomically, and
/// only then swaps it in, so a failed write leaves both the file and
/// memory at the previous version.
pub struct ReservationStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<MacAddress, Reservation>>,
}

fn validate_address(address: Ipv4Addr) -> Result<(), CoreError> {
    if address.is_unspecified() || address.is_broadcast() || address.is_multicast() || address.is_loopback() {
        return Err(CoreError::validation(format!(
            "{address} cannot be reserved"
        )));
    }
    Ok(())
}

fn holder_of(
    entries: &BTreeMap<MacAddress, Reservation>,
    address: Ipv4Addr,
    except: &MacAddress,
) -> Option<MacAddress> {
    entries
        .values()
        .find(|r| r.address == address && r.hardware_address != *except)
        .map(|r| r.hardware_address.clone())
}

impl ReservationStore {
    /// An empty store backed by `path`. Call [`load`](Self::load) to read
    /// existing entries.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    /// Open and load in one step.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, CoreError> {
        let store = Self::new(path);
        store.load().await?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// (Re)load the table from disk. Hand edits may break the address
    /// uniqueness rule; later duplicates are dropped with a warning.
    pub async fn load(&self) -> Result<usize, CoreError> {
        let table = self.read_table().await?;
        let count = table.len();
        *self.entries.lock().await = table;
        info!(path = %self.path.display(), count, "reservations loaded");
        Ok(count)
    }

    async fn read_table(&self) -> Result<BTreeMap<MacAddress, Reservation>, CoreError> {
        let path = self.path.clone();
        let loaded = tokio::task::spawn_blocking(move || persist::read(&path))
            .await
            .map_err(|e| CoreError::Internal(format!("reservation loader failed: {e}")))??;

        let mut table = BTreeMap::new();
        for reservation in loaded {
            if let Some(holder) = holder_of(&table, reservation.address, &reservation.hardware_address) {
                warn!(
                    address = %reservation.address,
                    hardware_address = %reservation.hardware_address,
                    holder = %holder,
                    "duplicate reserved address in file, entry ignored"
                );
                continue;
            }
            table.insert(reservation.hardware_address.clone(), reservation);
        }
        Ok(table)
    }

    /// Adopt whatever is on disk before a mutation, so a write made by
    /// another process since the last load is built on, not replaced.
    /// Caller holds the entries lock.
    async fn sync_from_disk(&self, entries: &mut BTreeMap<MacAddress, Reservation>) -> Result<bool, CoreError> {
        let on_disk = self.read_table().await?;
        if on_disk == *entries {
            return Ok(false);
        }
        debug!(path = %self.path.display(), count = on_disk.len(), "reservation file changed on disk");
        *entries = on_disk;
        Ok(true)
    }

    /// Pick up changes another process made to the file. Returns whether
    /// the table changed.
    pub async fn refresh(&self) -> Result<bool, CoreError> {
        let mut entries = self.entries.lock().await;
        self.sync_from_disk(&mut entries).await
    }

    // ── Reads ────────────────────────────────────────────────────────

    /// All reservations, ordered by hardware address.
    pub async fn list(&self) -> Vec<Reservation> {
        self.entries.lock().await.values().cloned().collect()
    }

    pub async fn get(&self, hardware_address: &MacAddress) -> Option<Reservation> {
        self.entries.lock().await.get(hardware_address).cloned()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    // ── Mutations ────────────────────────────────────────────────────

    /// Reserve `address` for `hardware_address`.
    ///
    /// Rejected with `ReservationConflict` if another hardware address
    /// already holds `address`. An existing reservation for the same
    /// hardware address is updated in place and keeps its `created_at`.
    pub async fn reserve(
        &self,
        hardware_address: MacAddress,
        address: Ipv4Addr,
        label: impl Into<String>,
    ) -> Result<Reservation, CoreError> {
        validate_address(address)?;
        let label = label.into();
        let mut entries = self.entries.lock().await;
        self.sync_from_disk(&mut entries).await?;

        if let Some(holder) = holder_of(&entries, address, &hardware_address) {
            return Err(CoreError::ReservationConflict {
                address,
                hardware_address,
                holder,
            });
        }

        let reservation = match entries.get(&hardware_address) {
            Some(existing) => Reservation {
                address,
                label,
                ..existing.clone()
            },
            None => Reservation {
                hardware_address: hardware_address.clone(),
                address,
                label,
                created_at: Utc::now(),
            },
        };
        if entries.get(&hardware_address) == Some(&reservation) {
            return Ok(reservation);
        }

        let mut next = entries.clone();
        next.insert(hardware_address, reservation.clone());
        self.commit(&mut entries, next).await?;
        info!(
            hardware_address = %reservation.hardware_address,
            address = %reservation.address,
            label = %reservation.label,
            "reservation saved"
        );
        Ok(reservation)
    }

    /// Record a sighting of `hardware_address` at `address`.
    ///
    /// Creates the reservation (labelled with `label_hint`) if none
    /// exists, otherwise updates only its address. Never changes an
    /// existing label.
    pub async fn touch(
        &self,
        hardware_address: &MacAddress,
        address: Ipv4Addr,
        label_hint: Option<&str>,
    ) -> Result<TouchOutcome, CoreError> {
        validate_address(address)?;
        let mut entries = self.entries.lock().await;
        self.sync_from_disk(&mut entries).await?;

        if let Some(existing) = entries.get(hardware_address) {
            if existing.address == address {
                return Ok(TouchOutcome::Unchanged);
            }
        }
        if let Some(holder) = holder_of(&entries, address, hardware_address) {
            return Err(CoreError::ReservationConflict {
                address,
                hardware_address: hardware_address.clone(),
                holder,
            });
        }

        let (reservation, created) = match entries.get(hardware_address) {
            Some(existing) => (
                Reservation {
                    address,
                    ..existing.clone()
                },
                false,
            ),
            None => (
                Reservation {
                    hardware_address: hardware_address.clone(),
                    address,
                    label: label_hint.unwrap_or_default().to_owned(),
                    created_at: Utc::now(),
                },
                true,
            ),
        };

        let mut next = entries.clone();
        next.insert(hardware_address.clone(), reservation.clone());
        self.commit(&mut entries, next).await?;
        debug!(%hardware_address, %address, created, "reservation touched");
        Ok(if created {
            TouchOutcome::Created(reservation)
        } else {
            TouchOutcome::Updated(reservation)
        })
    }

    pub async fn remove(&self, hardware_address: &MacAddress) -> Result<Reservation, CoreError> {
        let mut entries = self.entries.lock().await;
        self.sync_from_disk(&mut entries).await?;
        let mut next = entries.clone();
        let removed = next
            .remove(hardware_address)
            .ok_or_else(|| CoreError::ReservationNotFound {
                hardware_address: hardware_address.clone(),
            })?;
        self.commit(&mut entries, next).await?;
        info!(%hardware_address, "reservation removed");
        Ok(removed)
    }

    /// Write `next` to disk, then make it current.
    async fn commit(
        &self,
        current: &mut BTreeMap<MacAddress, Reservation>,
        next: BTreeMap<MacAddress, Reservation>,
    ) -> Result<(), CoreError> {
        let rows: Vec<Reservation> = next.values().cloned().collect();
        let contents = persist::render(&rows)?;
        crate::store::write_atomic_async(self.path.clone(), contents).await?;
        *current = next;
        Ok(())
    }
}
