// ── Activation sequence ──
//
// radio unblock -> wait for hardware -> wait for connection manager ->
// provision profile -> bounded activation attempts. Every step advances
// the state with a compare-and-set, so a concurrent disable wins.

use chrono::Utc;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use super::controller::ApInner;
use crate::error::CoreError;
use crate::model::{ApSettings, ApState, AttemptRecord};
use crate::readiness::{Pending, Readiness};
use crate::runner::{ConnectionProfile, Operation, RunOutcome, run_checked};

pub(super) async fn run_activation(inner: &ApInner, settings: ApSettings) {
    let config = &inner.config;
    let interface = config.interface.as_str();

    unblock_radio(inner).await;

    // ── Readiness ────────────────────────────────────────────────────
    let deadline = Instant::now() + config.max_wait;
    let waited_secs = config.max_wait.as_secs();

    if !inner
        .probe
        .wait_for_interface(interface, deadline, config.poll_interval)
        .await
    {
        inner.fail(&CoreError::HardwareNotReady {
            interface: interface.to_owned(),
            waited_secs,
        });
        return;
    }
    if !inner.advance(ApState::WaitingForHardware, ApState::WaitingForServiceManager) {
        return;
    }

    if !inner
        .probe
        .wait_for_manager(deadline, config.poll_interval)
        .await
    {
        inner.fail(&CoreError::ServiceManagerNotReady { waited_secs });
        return;
    }
    if !inner.advance(ApState::WaitingForServiceManager, ApState::Activating) {
        return;
    }

    // ── Provisioning ─────────────────────────────────────────────────
    if let Err(e) = provision(inner, &settings).await {
        inner.fail(&CoreError::ActivationFailed {
            interface: interface.to_owned(),
            attempts: 0,
            last_error: e.to_string(),
        });
        return;
    }

    // ── Activation attempts ──────────────────────────────────────────
    let attempts = config.activation_attempts.max(1);
    let up = Operation::ConnectionUp {
        name: config.connection.clone(),
    };
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        if attempt > 1 {
            sleep(config.retry_delay).await;
        }

        let (exit_code, detail) = match inner.probe.is_ready(interface).await {
            Readiness::TimedOut(pending) => {
                let what = match pending {
                    Pending::Interface => "interface not ready",
                    Pending::ServiceManager => "connection manager not ready",
                };
                (None, what.to_owned())
            }
            Readiness::Ready => match inner.runner.run(&up, inner.command_timeout).await {
                RunOutcome::Exited(out) if out.is_success() => {
                    if inner.advance(ApState::Activating, ApState::Active) {
                        info!(interface, attempt, "access point active");
                    }
                    return;
                }
                RunOutcome::Exited(out) => (Some(out.exit_code), out.stderr.trim().to_owned()),
                RunOutcome::TimedOut => (None, format!("timed out after {:?}", inner.command_timeout)),
            },
        };

        warn!(interface, attempt, attempts, detail = %detail, "activation attempt failed");
        last_error.clone_from(&detail);
        let recorded = inner.record_attempt(AttemptRecord {
            attempt,
            at: Utc::now(),
            exit_code,
            detail,
        });
        if !recorded {
            return;
        }
    }

    inner.fail(&CoreError::ActivationFailed {
        interface: interface.to_owned(),
        attempts,
        last_error,
    });
}

/// Idempotent: both commands succeed when the radio is already on.
async fn unblock_radio(inner: &ApInner) {
    for op in [Operation::RadioUnblock, Operation::RadioOn] {
        let outcome = inner.runner.run(&op, inner.command_timeout).await;
        if !outcome.succeeded() {
            debug!(op = %op, ?outcome, "radio unblock step failed");
        }
    }
}

/// Recreate the AP profile from the requested settings.
async fn provision(inner: &ApInner, settings: &ApSettings) -> Result<(), CoreError> {
    let name = inner.config.connection.clone();
    let _ = inner
        .runner
        .run(&Operation::ConnectionDelete { name: name.clone() }, inner.command_timeout)
        .await;
    let add = Operation::ConnectionAdd {
        name,
        interface: inner.config.interface.clone(),
        profile: ConnectionProfile::AccessPoint {
            ssid: settings.ssid.clone(),
            passphrase: settings.passphrase.clone(),
            address: settings.address,
            channel: settings.channel,
        },
    };
    run_checked(inner.runner.as_ref(), &add, inner.command_timeout).await?;
    debug!(ssid = %settings.ssid, "access point profile provisioned");
    Ok(())
}
