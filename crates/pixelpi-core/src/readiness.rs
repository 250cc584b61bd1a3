// ── Interface readiness ──
//
// Active, bounded polling for "the wireless interface exists and the
// connection manager can use it". Readiness is re-checked at the end of a
// wait, never assumed to persist.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, sleep, sleep_until};
use tracing::{debug, trace};

use crate::parse::{device_state_usable, parse_device_states};
use crate::runner::{CommandRunner, Operation};

/// Result of a bounded wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    /// The deadline passed. Carries which condition was still missing.
    TimedOut(Pending),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pending {
    Interface,
    ServiceManager,
}

impl Readiness {
    pub fn is_ready(self) -> bool {
        matches!(self, Self::Ready)
    }
}

pub struct InterfaceReadinessProbe {
    runner: Arc<dyn CommandRunner>,
    command_timeout: Duration,
}

impl InterfaceReadinessProbe {
    pub fn new(runner: Arc<dyn CommandRunner>, command_timeout: Duration) -> Self {
        Self {
            runner,
            command_timeout,
        }
    }

    /// Bound for a single check: never longer than what is left of the
    /// caller's budget.
    fn op_timeout(&self, deadline: Instant) -> Duration {
        let left = deadline.saturating_duration_since(Instant::now());
        self.command_timeout.min(left.max(Duration::from_millis(1)))
    }

    /// The link exists and the connection manager reports a usable
    /// device state for it.
    pub async fn interface_present(&self, interface: &str, deadline: Instant) -> bool {
        let timeout = self.op_timeout(deadline);
        let exists = self
            .runner
            .run(
                &Operation::LinkExists {
                    interface: interface.to_owned(),
                },
                timeout,
            )
            .await
            .succeeded();
        if !exists {
            trace!(interface, "link not present");
            return false;
        }
        let timeout = self.op_timeout(deadline);
        let outcome = self.runner.run(&Operation::DeviceStates, timeout).await;
        let Some(stdout) = outcome.stdout() else {
            return false;
        };
        let states = parse_device_states(stdout);
        match states.get(interface) {
            Some(state) if device_state_usable(state) => true,
            Some(state) => {
                trace!(interface, state = %state, "device not usable yet");
                false
            }
            None => false,
        }
    }

    pub async fn manager_operational(&self, deadline: Instant) -> bool {
        let timeout = self.op_timeout(deadline);
        self.runner
            .run(&Operation::ManagerStatus, timeout)
            .await
            .succeeded()
    }

    /// Poll until `check` holds or `deadline` passes. The last check
    /// happens no later than the deadline.
    async fn poll_until<F, Fut>(deadline: Instant, poll: Duration, mut check: F) -> bool
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        loop {
            if check().await {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let next = now + poll;
            if next >= deadline {
                sleep_until(deadline).await;
            } else {
                sleep(poll).await;
            }
        }
    }

    pub async fn wait_for_interface(&self, interface: &str, deadline: Instant, poll: Duration) -> bool {
        Self::poll_until(deadline, poll, || self.interface_present(interface, deadline)).await
    }

    pub async fn wait_for_manager(&self, deadline: Instant, poll: Duration) -> bool {
        Self::poll_until(deadline, poll, || self.manager_operational(deadline)).await
    }

    /// Wait for the interface, then the connection manager, inside one
    /// `max_wait` budget. `Ready` only if both hold on the final check.
    pub async fn wait_ready(&self, interface: &str, max_wait: Duration, poll: Duration) -> Readiness {
        let deadline = Instant::now() + max_wait;
        if !self.wait_for_interface(interface, deadline, poll).await {
            return Readiness::TimedOut(Pending::Interface);
        }
        if !self.wait_for_manager(deadline, poll).await {
            return Readiness::TimedOut(Pending::ServiceManager);
        }
        self.recheck(interface, deadline).await
    }

    /// Single point-in-time check of both conditions.
    pub async fn is_ready(&self, interface: &str) -> Readiness {
        let deadline = Instant::now() + self.command_timeout;
        self.recheck(interface, deadline).await
    }

    async fn recheck(&self, interface: &str, deadline: Instant) -> Readiness {
        // confirmation always gets at least one command budget
        let deadline = deadline.max(Instant::now() + self.command_timeout);
        if !self.interface_present(interface, deadline).await {
            debug!(interface, "interface lost during readiness confirmation");
            return Readiness::TimedOut(Pending::Interface);
        }
        if !self.manager_operational(deadline).await {
            debug!("connection manager lost during readiness confirmation");
            return Readiness::TimedOut(Pending::ServiceManager);
        }
        Readiness::Ready
    }
}
