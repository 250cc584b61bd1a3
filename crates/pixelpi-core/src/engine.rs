// ── Engine facade ──
//
// Owns every component, the background loops (hotplug handling, AP
// watchdog, periodic discovery) and the command processor that serializes
// writes from the administrative surface.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::adapters::{AdapterRegistry, HotplugEvent};
use crate::ap::ApController;
use crate::command::{Command, CommandEnvelope, CommandResult};
use crate::config::EngineConfig;
use crate::dhcp::DhcpCoordinator;
use crate::discovery::{DiscoveryScanner, NetworkProbe, SystemProbe};
use crate::error::CoreError;
use crate::model::{Adapter, ApState, ScanReport, Subnet, SystemStatus};
use crate::reservations::ReservationStore;
use crate::runner::{CommandRunner, Operation, SystemRunner, spawn_link_monitor};

const COMMAND_CHANNEL_SIZE: usize = 64;
const HOTPLUG_CHANNEL_SIZE: usize = 64;
const CONNECTION_MANAGER_SERVICE: &str = "NetworkManager";

/// Lifecycle of the engine itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum EngineState {
    Stopped,
    Starting,
    Running,
}

/// How much of the engine [`start`](Engine::start) brings up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Full startup: conflict self-check, plan application, DHCP rebuild,
    /// background loops and the configured AP.
    Daemon,
    /// Load state and accept commands. No loops, nothing applied.
    OneShot,
}

/// The main entry point for consumers.
///
/// Cheaply cloneable. Reads go straight to the components; writes go
/// through [`execute`](Self::execute).
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    config: EngineConfig,
    runner: Arc<dyn CommandRunner>,
    registry: Arc<AdapterRegistry>,
    store: Arc<ReservationStore>,
    dhcp: Arc<DhcpCoordinator>,
    ap: ApController,
    scanner: DiscoveryScanner,
    state: watch::Sender<EngineState>,
    command_tx: Mutex<mpsc::Sender<CommandEnvelope>>,
    command_rx: Mutex<Option<mpsc::Receiver<CommandEnvelope>>>,
    hotplug_tx: Mutex<mpsc::Sender<HotplugEvent>>,
    hotplug_rx: Mutex<Option<mpsc::Receiver<HotplugEvent>>>,
    cancel: CancellationToken,
    /// Cancelled on shutdown, replaced on the next start.
    cancel_child: Mutex<CancellationToken>,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Engine {
    /// Build an engine that drives the real host.
    pub fn new(config: EngineConfig) -> Result<Self, CoreError> {
        let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner::new());
        let probe = SystemProbe::new(Arc::clone(&runner), None, config.discovery.probe_port)?;
        Ok(Self::with_parts(config, runner, Arc::new(probe)))
    }

    /// Build an engine on top of caller-supplied host primitives.
    pub fn with_parts(
        config: EngineConfig,
        runner: Arc<dyn CommandRunner>,
        probe: Arc<dyn NetworkProbe>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let registry = Arc::new(AdapterRegistry::new(Arc::clone(&runner), &config));
        let store = Arc::new(ReservationStore::new(config.reservations_path.clone()));
        let dhcp = Arc::new(DhcpCoordinator::new(
            Arc::clone(&runner),
            config.dhcp.clone(),
            config.ap.interface.clone(),
            config.command_timeout,
            Arc::clone(&registry),
            Arc::clone(&store),
        ));
        let ap = ApController::new(
            Arc::clone(&runner),
            config.ap.clone(),
            config.command_timeout,
            cancel.child_token(),
        );
        let scanner = DiscoveryScanner::new(probe, config.discovery.concurrency);
        let (state, _) = watch::channel(EngineState::Stopped);
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
        let (hotplug_tx, hotplug_rx) = mpsc::channel(HOTPLUG_CHANNEL_SIZE);
        let cancel_child = cancel.child_token();

        Self {
            inner: Arc::new(EngineInner {
                config,
                runner,
                registry,
                store,
                dhcp,
                ap,
                scanner,
                state,
                command_tx: Mutex::new(command_tx),
                command_rx: Mutex::new(Some(command_rx)),
                hotplug_tx: Mutex::new(hotplug_tx),
                hotplug_rx: Mutex::new(Some(hotplug_rx)),
                cancel,
                cancel_child: Mutex::new(cancel_child),
                task_handles: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn adapters(&self) -> &Arc<AdapterRegistry> {
        &self.inner.registry
    }

    pub fn ap(&self) -> &ApController {
        &self.inner.ap
    }

    pub fn reservations(&self) -> &Arc<ReservationStore> {
        &self.inner.store
    }

    pub fn adapters_snapshot(&self) -> Arc<Vec<Arc<Adapter>>> {
        self.inner.registry.list()
    }

    pub fn dhcp(&self) -> &Arc<DhcpCoordinator> {
        &self.inner.dhcp
    }

    pub fn state(&self) -> EngineState {
        *self.inner.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<EngineState> {
        self.inner.state.subscribe()
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Bring the engine up.
    ///
    /// Startup order: DHCP conflict self-check, reservation load, adapter
    /// enumeration, plan application, DHCP rebuild, AP state detection,
    /// background loops, then the configured AP. A DHCP authority
    /// conflict aborts startup before anything is changed.
    pub async fn start(&self, mode: RunMode) -> Result<(), CoreError> {
        let started = self.inner.state.send_if_modified(|s| {
            if *s != EngineState::Stopped {
                return false;
            }
            *s = EngineState::Starting;
            true
        });
        if !started {
            return Err(CoreError::InvalidState {
                operation: "start".into(),
                state: self.state().to_string(),
            });
        }

        match self.bring_up(mode).await {
            Ok(()) => {
                self.inner.state.send_replace(EngineState::Running);
                info!(?mode, "engine started");
                Ok(())
            }
            Err(e) => {
                self.shutdown().await;
                Err(e)
            }
        }
    }

    async fn bring_up(&self, mode: RunMode) -> Result<(), CoreError> {
        let child = self.inner.cancel.child_token();
        *self.inner.cancel_child.lock().await = child.clone();
        let daemon = mode == RunMode::Daemon;

        if daemon {
            self.inner.dhcp.assert_no_conflict().await?;
        }
        self.inner.store.load().await?;
        let summary = self.inner.registry.refresh().await?;
        debug!(added = ?summary.added, "initial adapter enumeration");

        if daemon {
            self.apply_plans().await;
            self.inner.dhcp.rebuild_wired_config().await?;
        }
        let ap_state = self.inner.ap.sync_initial_state().await;
        debug!(%ap_state, "initial access point state");

        let mut handles = self.inner.task_handles.lock().await;

        if let Some(rx) = self.inner.command_rx.lock().await.take() {
            let engine = self.clone();
            handles.push(tokio::spawn(command_processor_task(engine, rx, child.clone())));
        }

        if daemon {
            if let Some(rx) = self.inner.hotplug_rx.lock().await.take() {
                let engine = self.clone();
                handles.push(tokio::spawn(hotplug_task(engine, rx, child.clone())));
            }

            if self.inner.config.link_monitor {
                let tx = self.inner.hotplug_tx.lock().await.clone();
                handles.push(spawn_link_monitor(tx, child.clone()));
            }

            let watchdog = self.inner.config.ap.watchdog_interval;
            if !watchdog.is_zero() {
                let ap = self.inner.ap.clone();
                handles.push(tokio::spawn(watchdog_task(ap, watchdog, child.clone())));
            }

            let scan_interval = self.inner.config.discovery.interval;
            if !scan_interval.is_zero() {
                let engine = self.clone();
                handles.push(tokio::spawn(scan_task(engine, scan_interval, child.clone())));
            }
        }
        drop(handles);

        if daemon && self.inner.config.ap.enabled {
            match self.inner.config.ap.settings() {
                Some(settings) => {
                    self.inner.ap.enable(settings)?;
                }
                None => warn!("access point enabled in configuration but no passphrase is set"),
            }
        }
        Ok(())
    }

    /// Apply every configured plan whose adapter is attached. Failures are
    /// per adapter and do not stop startup.
    async fn apply_plans(&self) {
        for (iface, plan) in self.inner.registry.plans() {
            if !self.inner.registry.get(&iface).is_some_and(|a| a.is_present()) {
                debug!(interface = %iface, "planned adapter not attached");
                continue;
            }
            if let Err(e) = self
                .inner
                .registry
                .assign_address(&iface, plan.address, plan.isolation_domain)
                .await
            {
                warn!(interface = %iface, error = %e, "failed to apply addressing plan");
            }
        }
    }

    /// Cancel background loops and any in-flight activation, and wait for
    /// them to finish. The AP connection itself is left as it is.
    pub async fn shutdown(&self) {
        self.inner.cancel_child.lock().await.cancel();
        self.inner.ap.shutdown().await;

        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        drop(handles);

        // fresh channels so the engine can be started again
        {
            let (tx, rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
            *self.inner.command_tx.lock().await = tx;
            *self.inner.command_rx.lock().await = Some(rx);
            let (tx, rx) = mpsc::channel(HOTPLUG_CHANNEL_SIZE);
            *self.inner.hotplug_tx.lock().await = tx;
            *self.inner.hotplug_rx.lock().await = Some(rx);
        }

        self.inner.state.send_replace(EngineState::Stopped);
        debug!("engine stopped");
    }

    /// One-shot: start without loops, run closure, shut down.
    pub async fn oneshot<F, Fut, T>(config: EngineConfig, f: F) -> Result<T, CoreError>
    where
        F: FnOnce(Engine) -> Fut,
        Fut: Future<Output = Result<T, CoreError>>,
    {
        let engine = Engine::new(config)?;
        engine.start(RunMode::OneShot).await?;
        let result = f(engine.clone()).await;
        engine.shutdown().await;
        result
    }

    /// Block until the engine's root token is cancelled.
    pub async fn cancelled(&self) {
        self.inner.cancel.cancelled().await;
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Execute a write through the command processor.
    pub async fn execute(&self, cmd: Command) -> Result<CommandResult, CoreError> {
        let state = self.state();
        if state != EngineState::Running {
            return Err(CoreError::InvalidState {
                operation: cmd.name().into(),
                state: state.to_string(),
            });
        }

        let (tx, rx) = oneshot::channel();
        let command_tx = self.inner.command_tx.lock().await.clone();
        let stopped = || CoreError::Internal("engine stopped while handling command".into());
        command_tx
            .send(CommandEnvelope {
                command: cmd,
                response_tx: tx,
            })
            .await
            .map_err(|_| stopped())?;

        rx.await.map_err(|_| stopped())?
    }

    /// Push a hotplug notification from any source.
    pub async fn notify_hotplug(&self, event: HotplugEvent) -> Result<(), CoreError> {
        let tx = self.inner.hotplug_tx.lock().await.clone();
        tx.send(event)
            .await
            .map_err(|_| CoreError::Internal("hotplug channel closed".into()))
    }

    // ── Discovery ────────────────────────────────────────────────────

    /// Scan `subnet` and forward the sightings to the reservation table.
    ///
    /// A scan cut short by its deadline still returns the partial report;
    /// hosts that were not probed are in `errors`.
    pub async fn scan(&self, subnet: Subnet) -> Result<ScanReport, CoreError> {
        let cfg = &self.inner.config.discovery;
        let cancel = self.inner.cancel_child.lock().await.child_token();
        let report = self
            .inner
            .scanner
            .scan(subnet, cfg.per_host_timeout, cfg.total_timeout, &cancel)
            .await?;
        if let Some(partial) = report.deadline_error() {
            warn!(%subnet, error = %partial, "scan incomplete");
        }
        let changed = self
            .inner
            .dhcp
            .record_sightings(&report.devices, cfg.reserve_unidentified)
            .await?;
        if changed > 0 {
            info!(%subnet, changed, "reservations updated from scan");
        }
        Ok(report)
    }

    /// Scan every planned wired subnet in turn.
    pub async fn scan_all(&self) -> Result<Vec<ScanReport>, CoreError> {
        let mut reports = Vec::new();
        for (_, plan) in self.inner.registry.wired_plans() {
            reports.push(self.scan(plan.subnet()).await?);
        }
        Ok(reports)
    }

    pub fn latest_scan(&self) -> Option<Arc<ScanReport>> {
        self.inner.scanner.latest()
    }

    // ── Status ───────────────────────────────────────────────────────

    pub async fn status(&self) -> SystemStatus {
        let timeout = self.inner.config.command_timeout;
        let dhcp = Operation::ServiceIsActive {
            service: self.inner.config.dhcp.service.clone(),
        };
        let manager = Operation::ServiceIsActive {
            service: CONNECTION_MANAGER_SERVICE.into(),
        };
        let (dhcp, manager) = tokio::join!(
            self.inner.runner.run(&dhcp, timeout),
            self.inner.runner.run(&manager, timeout)
        );
        let ap = self.inner.ap.status();
        SystemStatus {
            dhcp_service_active: dhcp.succeeded(),
            connection_manager_active: manager.succeeded(),
            usb_adapters: self.inner.registry.usb_adapters().len(),
            reservations: self.inner.store.len().await,
            ap_state: ap.state,
            ap_degraded: ap.degraded,
        }
    }

    /// Run the DHCP authority self-check on demand.
    pub async fn check(&self) -> Result<(), CoreError> {
        self.inner.dhcp.assert_no_conflict().await
    }
}

// ── Background tasks ─────────────────────────────────────────────────

async fn command_processor_task(
    engine: Engine,
    mut rx: mpsc::Receiver<CommandEnvelope>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            envelope = rx.recv() => {
                let Some(envelope) = envelope else { break };
                let name = envelope.command.name();
                let result = route_command(&engine, envelope.command).await;
                if let Err(ref e) = result {
                    debug!(command = name, error = %e, "command failed");
                }
                let _ = envelope.response_tx.send(result);
            }
        }
    }
}

async fn route_command(engine: &Engine, cmd: Command) -> Result<CommandResult, CoreError> {
    let inner = &engine.inner;
    match cmd {
        Command::ConfigureAdapter {
            id,
            plan,
            isolation_domain,
        } => {
            let adapter = inner.registry.assign_address(&id, plan, isolation_domain).await?;
            inner.dhcp.rebuild_wired_config().await?;
            Ok(CommandResult::Adapter(adapter))
        }
        Command::RefreshAdapters => {
            let summary = inner.registry.refresh().await?;
            if !summary.is_empty() {
                inner.dhcp.rebuild_wired_config().await?;
            }
            Ok(CommandResult::Refreshed(summary))
        }
        Command::EnableAp { settings } => {
            let settings = settings
                .or_else(|| inner.config.ap.settings())
                .ok_or_else(|| CoreError::Config {
                    message: "no access point passphrase configured".into(),
                })?;
            Ok(CommandResult::ApState(inner.ap.enable(settings)?))
        }
        Command::DisableAp => Ok(CommandResult::ApState(inner.ap.disable().await)),
        Command::RetryAp => Ok(CommandResult::ApState(inner.ap.retry()?)),
        Command::RestartAp => Ok(CommandResult::ApState(inner.ap.restart().await?)),
        Command::Reserve {
            hardware_address,
            address,
            label,
        } => {
            let (reservation, dhcp) = inner.dhcp.reserve(hardware_address, address, label).await?;
            Ok(CommandResult::Reservation(reservation, dhcp))
        }
        Command::RemoveReservation { hardware_address } => {
            let (removed, dhcp) = inner.dhcp.remove(&hardware_address).await?;
            Ok(CommandResult::Removed(removed, dhcp))
        }
        Command::RebuildDhcp => Ok(CommandResult::Rebuilt(inner.dhcp.rebuild_wired_config().await?)),
    }
}

/// Coalesce bursts of hotplug events into one registry refresh.
async fn hotplug_task(engine: Engine, mut rx: mpsc::Receiver<HotplugEvent>, cancel: CancellationToken) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            event = rx.recv() => {
                let Some(event) = event else { break };
                let mut touched = vec![event];
                while let Ok(more) = rx.try_recv() {
                    touched.push(more);
                }
                debug!(events = touched.len(), "hotplug");
                if let Err(e) = handle_hotplug(&engine, &touched).await {
                    warn!(error = %e, "hotplug handling failed");
                }
            }
        }
    }
}

async fn handle_hotplug(engine: &Engine, events: &[HotplugEvent]) -> Result<(), CoreError> {
    let inner = &engine.inner;
    let summary = inner.registry.refresh().await?;
    if summary.is_empty() {
        return Ok(());
    }
    info!(
        added = ?summary.added,
        absent = ?summary.went_absent,
        removed = ?summary.removed,
        "adapters changed"
    );

    for iface in &summary.added {
        let Some((_, plan)) = inner.registry.plans().into_iter().find(|(id, _)| id == iface) else {
            continue;
        };
        if let Err(e) = inner
            .registry
            .assign_address(iface, plan.address, plan.isolation_domain)
            .await
        {
            warn!(interface = %iface, error = %e, "failed to apply addressing plan");
        }
    }
    inner.dhcp.rebuild_wired_config().await?;

    // the wireless adapter showing up late is the common cause of a
    // failed boot-time activation
    let ap_iface = inner.ap.interface();
    let ap_arrived = summary.added.iter().any(|i| i == ap_iface)
        || events.iter().any(|e| e.interface() == Some(ap_iface));
    let status = inner.ap.status();
    if ap_arrived
        && inner.config.ap.enabled
        && status.state == ApState::Failed
        && status
            .last_failure
            .as_ref()
            .is_some_and(|f| f.kind == "hardware_not_ready")
    {
        info!(interface = %ap_iface, "wireless adapter appeared, retrying access point");
        inner.ap.retry()?;
    }
    Ok(())
}

async fn watchdog_task(ap: ApController, period: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(period);
    interval.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                let outcome = ap.watchdog_check().await;
                debug!(?outcome, "access point watchdog");
            }
        }
    }
}

async fn scan_task(engine: Engine, period: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    interval.tick().await;

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                if let Err(e) = engine.scan_all().await {
                    warn!(error = %e, "periodic scan failed");
                }
            }
        }
    }
}
