use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::sequence::run_activation;
use crate::config::ApConfig;
use crate::error::CoreError;
use crate::model::{ApClient, ApFailure, ApSettings, ApState, ApStatus, ApTransition, AttemptRecord};
use crate::parse::{parse_active_connections, parse_neighbors};
use crate::readiness::InterfaceReadinessProbe;
use crate::runner::{CommandRunner, Operation, run_checked};

const TRANSITION_CHANNEL_CAPACITY: usize = 64;

/// What a watchdog pass found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogOutcome {
    /// The AP is not `Active`; nothing to check.
    Skipped,
    Healthy,
    /// The connection was missing and `up` succeeded.
    Recovered,
    /// The connection was missing and `up` failed.
    StillDown,
}

struct InFlight {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub(super) struct ApInner {
    pub(super) runner: Arc<dyn CommandRunner>,
    pub(super) probe: InterfaceReadinessProbe,
    pub(super) config: ApConfig,
    pub(super) command_timeout: Duration,
    status: watch::Sender<ApStatus>,
    transitions: broadcast::Sender<ApTransition>,
    in_flight: Mutex<Option<InFlight>>,
    last_settings: Mutex<Option<ApSettings>>,
    cancel: CancellationToken,
}

/// Drives the wireless access point through its lifecycle.
///
/// Cheaply cloneable. At most one activation sequence runs at a time:
/// `enable()` only starts one from `Disabled` or `Failed`, and the state
/// check and the switch to `WaitingForHardware` are a single atomic step.
#[derive(Clone)]
pub struct ApController {
    inner: Arc<ApInner>,
}

impl ApController {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        config: ApConfig,
        command_timeout: Duration,
        cancel: CancellationToken,
    ) -> Self {
        let (status, _) = watch::channel(ApStatus::new(config.interface.clone(), ApState::Disabled));
        let probe = InterfaceReadinessProbe::new(Arc::clone(&runner), command_timeout);
        let (transitions, _) = broadcast::channel(TRANSITION_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(ApInner {
                runner,
                probe,
                config,
                command_timeout,
                status,
                transitions,
                in_flight: Mutex::new(None),
                last_settings: Mutex::new(None),
                cancel,
            }),
        }
    }

    // ── Reads ────────────────────────────────────────────────────────

    pub fn state(&self) -> ApState {
        self.inner.status.borrow().state
    }

    pub fn status(&self) -> ApStatus {
        self.inner.status.borrow().clone()
    }

    /// Latest status. Intermediate states may be skipped by a slow reader.
    pub fn subscribe(&self) -> watch::Receiver<ApStatus> {
        self.inner.status.subscribe()
    }

    /// Every state change, in order.
    ///
    /// Each one is an edge of [`ApState::can_transition_to`], except the
    /// start-up adoption `Disabled -> Active` from
    /// [`sync_initial_state`](Self::sync_initial_state). A receiver that
    /// falls more than 64 changes behind gets `RecvError::Lagged`.
    pub fn transitions(&self) -> broadcast::Receiver<ApTransition> {
        self.inner.transitions.subscribe()
    }

    pub fn interface(&self) -> &str {
        &self.inner.config.interface
    }

    /// Wait until no activation sequence is running and return the
    /// resulting status.
    pub async fn wait_settled(&self) -> ApStatus {
        let mut rx = self.inner.status.subscribe();
        match rx.wait_for(|s| !s.state.is_in_flight()).await {
            Ok(status) => status.clone(),
            Err(_) => self.status(),
        }
    }

    /// Adopt an AP connection that is already active (e.g. brought up
    /// before this process started). Only applies while `Disabled`.
    ///
    /// `Disabled -> Active` is not a lifecycle edge: adoption records what
    /// the host already did and bypasses the transition table on purpose.
    pub async fn sync_initial_state(&self) -> ApState {
        let active = self.connection_active().await;
        if active {
            let adopted = self.inner.status.send_if_modified(|s| {
                if s.state != ApState::Disabled {
                    return false;
                }
                s.state = ApState::Active;
                s.changed_at = Utc::now();
                true
            });
            if adopted {
                self.inner.publish(ApState::Disabled, ApState::Active);
            }
            info!(interface = %self.inner.config.interface, "access point already active");
        }
        self.state()
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Start an activation sequence.
    ///
    /// A no-op returning the current state unless the AP is `Disabled`
    /// or `Failed`. Enabling from `Failed` is the explicit retry.
    pub fn enable(&self, settings: ApSettings) -> Result<ApState, CoreError> {
        settings.validate()?;
        let mut slot = lock(&self.inner.in_flight);

        let mut from = ApState::Disabled;
        let started = self.inner.status.send_if_modified(|s| {
            if !s.state.accepts_enable() {
                return false;
            }
            from = s.state;
            s.state = ApState::WaitingForHardware;
            s.ssid = Some(settings.ssid.clone());
            s.last_failure = None;
            s.failed_attempts.clear();
            s.degraded = false;
            s.changed_at = Utc::now();
            true
        });
        if !started {
            let state = self.state();
            debug!(%state, "enable ignored, activation already in flight or active");
            return Ok(state);
        }
        self.inner.publish(from, ApState::WaitingForHardware);

        *lock(&self.inner.last_settings) = Some(settings.clone());
        let cancel = self.inner.cancel.child_token();
        let inner = Arc::clone(&self.inner);
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            tokio::select! {
                biased;
                () = token.cancelled() => debug!("activation sequence cancelled"),
                () = run_activation(&inner, settings) => {}
            }
        });
        if let Some(previous) = slot.replace(InFlight { cancel, handle }) {
            previous.cancel.cancel();
        }
        info!(interface = %self.inner.config.interface, "access point activation started");
        Ok(ApState::WaitingForHardware)
    }

    /// Re-run the last activation after a terminal failure.
    pub fn retry(&self) -> Result<ApState, CoreError> {
        let state = self.state();
        if state != ApState::Failed {
            return Err(CoreError::InvalidState {
                operation: "retry".into(),
                state: state.to_string(),
            });
        }
        let settings = lock(&self.inner.last_settings)
            .clone()
            .or_else(|| self.inner.config.settings())
            .ok_or_else(|| CoreError::Config {
                message: "no access point settings to retry with".into(),
            })?;
        self.enable(settings)
    }

    /// Tear the AP down from any state.
    ///
    /// Cancels a running activation sequence, brings the connection down
    /// (a failure here is logged, not returned) and lands in `Disabled`.
    pub async fn disable(&self) -> ApState {
        self.cancel_in_flight().await;

        let down = Operation::ConnectionDown {
            name: self.inner.config.connection.clone(),
        };
        let outcome = self.inner.runner.run(&down, self.inner.command_timeout).await;
        if !outcome.succeeded() {
            warn!(op = %down, ?outcome, "connection down failed, may not have been active");
        }

        let mut from = ApState::Disabled;
        self.inner.status.send_modify(|s| {
            from = s.state;
            s.state = ApState::Disabled;
            s.degraded = false;
            s.changed_at = Utc::now();
        });
        if from != ApState::Disabled {
            self.inner.publish(from, ApState::Disabled);
        }
        // an enable racing this teardown would have left a sequence behind
        self.cancel_in_flight().await;
        info!(interface = %self.inner.config.interface, "access point disabled");
        ApState::Disabled
    }

    /// Cycle an active AP connection: down, settle, up.
    pub async fn restart(&self) -> Result<ApState, CoreError> {
        let state = self.state();
        if state != ApState::Active {
            return Err(CoreError::InvalidState {
                operation: "restart".into(),
                state: state.to_string(),
            });
        }
        let name = self.inner.config.connection.clone();
        let down = Operation::ConnectionDown { name: name.clone() };
        let outcome = self.inner.runner.run(&down, self.inner.command_timeout).await;
        if !outcome.succeeded() {
            warn!(op = %down, ?outcome, "connection down failed during restart, bringing it up anyway");
        }
        tokio::time::sleep(self.inner.config.restart_settle).await;

        let up = Operation::ConnectionUp { name };
        if let Err(e) = run_checked(self.inner.runner.as_ref(), &up, self.inner.command_timeout).await {
            self.inner.status.send_modify(|s| s.degraded = true);
            warn!(error = %e, "access point restart failed");
            return Err(e);
        }
        self.inner.status.send_modify(|s| {
            s.degraded = false;
            s.changed_at = Utc::now();
        });
        info!("access point restarted");
        Ok(self.state())
    }

    /// Stop any in-flight sequence without touching the connection.
    pub async fn shutdown(&self) {
        self.cancel_in_flight().await;
    }

    async fn cancel_in_flight(&self) {
        let in_flight = lock(&self.inner.in_flight).take();
        if let Some(InFlight { cancel, handle }) = in_flight {
            cancel.cancel();
            let _ = handle.await;
        }
    }

    // ── Monitoring ───────────────────────────────────────────────────

    async fn connection_active(&self) -> bool {
        self.inner
            .runner
            .run(&Operation::ActiveConnections, self.inner.command_timeout)
            .await
            .stdout()
            .is_some_and(|out| {
                parse_active_connections(out)
                    .iter()
                    .any(|name| *name == self.inner.config.connection)
            })
    }

    /// Check that an `Active` AP still has its connection up; re-issue
    /// activation if it vanished. The state stays `Active` either way;
    /// loss is reported through `degraded`.
    pub async fn watchdog_check(&self) -> WatchdogOutcome {
        if self.state() != ApState::Active {
            return WatchdogOutcome::Skipped;
        }
        if self.connection_active().await {
            self.inner.status.send_if_modified(|s| {
                let was = s.degraded;
                s.degraded = false;
                was
            });
            return WatchdogOutcome::Healthy;
        }

        warn!(connection = %self.inner.config.connection, "access point connection lost, reactivating");
        self.inner.status.send_modify(|s| s.degraded = true);
        let up = Operation::ConnectionUp {
            name: self.inner.config.connection.clone(),
        };
        if self
            .inner
            .runner
            .run(&up, self.inner.command_timeout)
            .await
            .succeeded()
        {
            info!("access point connection restored");
            WatchdogOutcome::Recovered
        } else {
            WatchdogOutcome::StillDown
        }
    }

    /// Clients in the neighbour table of the AP interface.
    pub async fn clients(&self) -> Result<Vec<ApClient>, CoreError> {
        let op = Operation::NeighborShow {
            interface: self.inner.config.interface.clone(),
        };
        let output = run_checked(self.inner.runner.as_ref(), &op, self.inner.command_timeout).await?;
        Ok(parse_neighbors(&output.stdout)
            .into_iter()
            .filter(|n| n.state == "REACHABLE" || n.state == "STALE")
            .filter_map(|n| {
                Some(ApClient {
                    address: n.address,
                    hardware_address: n.hardware_address?,
                    state: n.state,
                })
            })
            .collect())
    }
}

// ── Transitions (used by the activation sequence) ────────────────────

impl ApInner {
    fn publish(&self, from: ApState, to: ApState) {
        // no subscribers is the normal case
        let _ = self.transitions.send(ApTransition { from, to });
    }

    /// Move `from -> to` only if the state is still `from`. A `false`
    /// return means someone else (disable) took over.
    pub(super) fn advance(&self, from: ApState, to: ApState) -> bool {
        let moved = self.status.send_if_modified(|s| {
            if s.state != from || !from.can_transition_to(to) {
                return false;
            }
            s.state = to;
            s.changed_at = Utc::now();
            true
        });
        if moved {
            self.publish(from, to);
            debug!(%from, %to, "ap transition");
        }
        moved
    }

    /// Record a failed activation attempt while still `Activating`.
    pub(super) fn record_attempt(&self, record: AttemptRecord) -> bool {
        self.status.send_if_modified(|s| {
            if s.state != ApState::Activating {
                return false;
            }
            s.failed_attempts.push(record);
            true
        })
    }

    /// Terminal failure from an in-flight state.
    pub(super) fn fail(&self, err: &CoreError) {
        let mut from = ApState::Failed;
        let failed = self.status.send_if_modified(|s| {
            if !s.state.is_in_flight() {
                return false;
            }
            from = s.state;
            s.state = ApState::Failed;
            s.last_failure = Some(ApFailure::from(err));
            s.changed_at = Utc::now();
            true
        });
        if failed {
            self.publish(from, ApState::Failed);
            warn!(error = %err, kind = err.kind(), "access point activation failed");
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}
