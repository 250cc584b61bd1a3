#![allow(clippy::unwrap_used)]
// Access point state machine against a scripted host.

mod common;

use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use common::{AP_CONNECTION, FakeRunner};
use pixelpi_core::{ApConfig, ApController, ApSettings, ApState, ApTransition, CoreError, WatchdogOutcome};

// ── Helpers ─────────────────────────────────────────────────────────

fn config() -> ApConfig {
    ApConfig {
        connection: AP_CONNECTION.into(),
        max_wait: Duration::from_secs(60),
        poll_interval: Duration::from_secs(3),
        activation_attempts: 3,
        retry_delay: Duration::from_secs(5),
        restart_settle: Duration::from_secs(2),
        ..ApConfig::default()
    }
}

fn settings() -> ApSettings {
    ApSettings {
        ssid: "WLED-Manager-AP".into(),
        passphrase: SecretString::from("wled1234".to_owned()),
        address: "10.0.2.1/24".parse().unwrap(),
        channel: 6,
    }
}

fn controller(runner: &Arc<FakeRunner>) -> ApController {
    ApController::new(
        runner.clone(),
        config(),
        Duration::from_secs(15),
        CancellationToken::new(),
    )
}

// ── Readiness ───────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn absent_interface_past_max_wait_fails_hardware_not_ready() {
    let runner = FakeRunner::new();
    runner.wlan_appears_after(Duration::from_secs(70));
    let ap = controller(&runner);

    let started = Instant::now();
    assert_eq!(ap.enable(settings()).unwrap(), ApState::WaitingForHardware);
    let status = ap.wait_settled().await;

    assert_eq!(status.state, ApState::Failed);
    assert_eq!(status.last_failure.unwrap().kind, "hardware_not_ready");
    let waited = started.elapsed();
    assert!(waited >= Duration::from_secs(60), "gave up early: {waited:?}");
    assert!(waited < Duration::from_secs(61), "waited too long: {waited:?}");
    // nothing was provisioned for missing hardware
    assert_eq!(runner.count("nmcli connection add"), 0);
}

#[tokio::test(start_paused = true)]
async fn late_interface_within_max_wait_still_activates() {
    let runner = FakeRunner::new();
    runner.wlan_appears_after(Duration::from_secs(20));
    let ap = controller(&runner);

    ap.enable(settings()).unwrap();
    let status = ap.wait_settled().await;
    assert_eq!(status.state, ApState::Active);
    assert!(status.failed_attempts.is_empty());
}

#[tokio::test(start_paused = true)]
async fn connection_manager_down_fails_service_manager_not_ready() {
    let runner = FakeRunner::new();
    runner.set_manager_ready(false);
    let ap = controller(&runner);

    ap.enable(settings()).unwrap();
    let status = ap.wait_settled().await;
    assert_eq!(status.state, ApState::Failed);
    assert_eq!(status.last_failure.unwrap().kind, "service_manager_not_ready");
}

// ── Activation attempts ─────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn two_failures_then_success_reaches_active_with_two_records() {
    let runner = FakeRunner::new();
    runner.fail_ap_up(2);
    let ap = controller(&runner);

    ap.enable(settings()).unwrap();
    let status = ap.wait_settled().await;

    assert_eq!(status.state, ApState::Active);
    assert!(status.last_failure.is_none());
    let attempts: Vec<u32> = status.failed_attempts.iter().map(|a| a.attempt).collect();
    assert_eq!(attempts, vec![1, 2]);
    assert!(status.failed_attempts.iter().all(|a| a.exit_code == Some(4)));
    assert_eq!(runner.count(&format!("nmcli connection up {AP_CONNECTION}")), 3);
}

#[tokio::test(start_paused = true)]
async fn exhausted_attempts_fail_then_retry_recovers() {
    let runner = FakeRunner::new();
    runner.fail_ap_up(3);
    let ap = controller(&runner);

    ap.enable(settings()).unwrap();
    let status = ap.wait_settled().await;
    assert_eq!(status.state, ApState::Failed);
    assert_eq!(status.failed_attempts.len(), 3);
    let failure = status.last_failure.unwrap();
    assert_eq!(failure.kind, "activation_failed");
    assert!(failure.message.contains("3 attempt"), "{}", failure.message);

    assert_eq!(ap.retry().unwrap(), ApState::WaitingForHardware);
    let status = ap.wait_settled().await;
    assert_eq!(status.state, ApState::Active);
    assert!(status.failed_attempts.is_empty());
}

#[tokio::test(start_paused = true)]
async fn profile_is_provisioned_in_shared_mode_without_leaking_passphrase() {
    let runner = FakeRunner::new();
    let ap = controller(&runner);

    ap.enable(settings()).unwrap();
    ap.wait_settled().await;

    let log = runner.log();
    let add = log
        .iter()
        .find(|l| l.starts_with("nmcli connection add"))
        .unwrap();
    assert!(add.contains("ipv4.method shared"), "{add}");
    assert!(add.contains("802-11-wireless.mode ap"), "{add}");
    assert!(!add.contains("wled1234"), "{add}");
    // radio unblock happens before anything else touches the radio
    assert_eq!(log.first().unwrap(), "rfkill unblock wifi");
}

// ── Concurrency ─────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn enable_while_in_flight_is_a_noop() {
    let runner = FakeRunner::new();
    runner.wlan_appears_after(Duration::from_secs(10));
    let ap = controller(&runner);

    assert_eq!(ap.enable(settings()).unwrap(), ApState::WaitingForHardware);
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(ap.enable(settings()).unwrap(), ApState::WaitingForHardware);

    let status = ap.wait_settled().await;
    assert_eq!(status.state, ApState::Active);
    assert_eq!(runner.count("nmcli connection add"), 1);

    // and from Active as well
    assert_eq!(ap.enable(settings()).unwrap(), ApState::Active);
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(runner.count("nmcli connection add"), 1);
}

#[tokio::test(start_paused = true)]
async fn disable_during_activation_wins() {
    let runner = FakeRunner::new();
    runner.wlan_appears_after(Duration::from_secs(30));
    let ap = controller(&runner);

    ap.enable(settings()).unwrap();
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(ap.state(), ApState::WaitingForHardware);

    assert_eq!(ap.disable().await, ApState::Disabled);
    tokio::time::sleep(Duration::from_secs(120)).await;

    assert_eq!(ap.state(), ApState::Disabled);
    assert_eq!(runner.count("nmcli connection add"), 0);
    assert_eq!(runner.count(&format!("nmcli connection up {AP_CONNECTION}")), 0);
}

#[tokio::test(start_paused = true)]
async fn invalid_settings_are_rejected_before_any_transition() {
    let runner = FakeRunner::new();
    let ap = controller(&runner);

    let mut bad = settings();
    bad.passphrase = SecretString::from("short".to_owned());
    let err = ap.enable(bad).unwrap_err();
    assert!(matches!(err, CoreError::ValidationFailed { .. }));
    assert_eq!(ap.state(), ApState::Disabled);
    assert!(runner.log().is_empty());
}

#[tokio::test(start_paused = true)]
async fn every_published_transition_is_a_lifecycle_edge() {
    let runner = FakeRunner::new();
    runner.wlan_appears_after(Duration::from_secs(10));
    runner.fail_ap_up(3);
    let ap = controller(&runner);
    let mut transitions = ap.transitions();
    let mut status = ap.subscribe();

    // torn down while waiting for the radio
    ap.enable(settings()).unwrap();
    tokio::time::sleep(Duration::from_secs(4)).await;
    ap.disable().await;
    // exhausts its attempts, then recovers on retry
    ap.enable(settings()).unwrap();
    assert_eq!(ap.wait_settled().await.state, ApState::Failed);
    ap.retry().unwrap();
    ap.enable(settings()).unwrap();
    assert_eq!(ap.wait_settled().await.state, ApState::Active);
    ap.disable().await;
    ap.disable().await;
    ap.enable(settings()).unwrap();
    assert_eq!(ap.wait_settled().await.state, ApState::Active);

    let mut trace: Vec<ApTransition> = Vec::new();
    while let Ok(t) = transitions.try_recv() {
        trace.push(t);
    }
    assert!(!trace.is_empty());
    assert_eq!(trace[0].from, ApState::Disabled);
    for t in &trace {
        assert!(t.from.can_transition_to(t.to), "illegal edge {} -> {}", t.from, t.to);
        if t.from.accepts_enable() && t.to != ApState::Disabled {
            assert_eq!(t.to, ApState::WaitingForHardware, "activation skipped the hardware wait");
        }
    }
    for pair in trace.windows(2) {
        assert_eq!(pair[0].to, pair[1].from, "gap in trace {trace:?}");
    }
    let starts = trace.iter().filter(|t| t.to == ApState::WaitingForHardware).count();
    assert_eq!(starts, 4);
    assert_eq!(trace.last().unwrap().to, ApState::Active);

    // the status channel agrees with the trace
    assert!(status.has_changed().unwrap());
    assert_eq!(status.borrow_and_update().state, ApState::Active);
}

// ── Restart / retry guards ──────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn restart_and_retry_require_their_states() {
    let runner = FakeRunner::new();
    let ap = controller(&runner);

    let err = ap.restart().await.unwrap_err();
    assert_eq!(err.kind(), "invalid_state");
    let err = ap.retry().unwrap_err();
    assert_eq!(err.kind(), "invalid_state");

    ap.enable(settings()).unwrap();
    ap.wait_settled().await;
    assert_eq!(ap.restart().await.unwrap(), ApState::Active);
    assert_eq!(runner.count(&format!("nmcli connection down {AP_CONNECTION}")), 1);
}

#[tokio::test(start_paused = true)]
async fn restart_still_brings_connection_up_when_down_fails() {
    let runner = FakeRunner::new();
    let ap = controller(&runner);
    ap.enable(settings()).unwrap();
    ap.wait_settled().await;

    runner.fail_ap_down(1);
    assert_eq!(ap.restart().await.unwrap(), ApState::Active);
    assert!(!ap.status().degraded);
    let up = format!("nmcli connection up {AP_CONNECTION}");
    let log = runner.log();
    let down_at = log.iter().rposition(|l| l.starts_with("nmcli connection down")).unwrap();
    assert!(log[down_at..].iter().any(|l| *l == up), "{log:?}");
}

// ── Watchdog ────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn watchdog_reactivates_lost_connection_and_flags_degraded() {
    let runner = FakeRunner::new();
    let ap = controller(&runner);

    assert_eq!(ap.watchdog_check().await, WatchdogOutcome::Skipped);

    ap.enable(settings()).unwrap();
    ap.wait_settled().await;
    assert_eq!(ap.watchdog_check().await, WatchdogOutcome::Healthy);

    runner.drop_active(AP_CONNECTION);
    assert_eq!(ap.watchdog_check().await, WatchdogOutcome::Recovered);
    let status = ap.status();
    assert_eq!(status.state, ApState::Active);
    assert!(status.degraded);

    // next healthy pass clears the flag
    assert_eq!(ap.watchdog_check().await, WatchdogOutcome::Healthy);
    assert!(!ap.status().degraded);
}

#[tokio::test(start_paused = true)]
async fn already_active_connection_is_adopted_at_startup() {
    let runner = FakeRunner::new();
    // a previous process brought the profile up
    let ap = controller(&runner);
    ap.enable(settings()).unwrap();
    ap.wait_settled().await;

    let fresh = controller(&runner);
    assert_eq!(fresh.state(), ApState::Disabled);
    assert_eq!(fresh.sync_initial_state().await, ApState::Active);
}

#[tokio::test(start_paused = true)]
async fn clients_come_from_reachable_and_stale_neighbours() {
    let runner = FakeRunner::new();
    runner.set_neighbors(
        "10.0.2.20 lladdr aa:bb:cc:dd:ee:01 REACHABLE\n\
         10.0.2.21 lladdr aa:bb:cc:dd:ee:02 STALE\n\
         10.0.2.22 lladdr aa:bb:cc:dd:ee:03 FAILED\n\
         10.0.2.23 INCOMPLETE\n",
    );
    let ap = controller(&runner);
    let clients = ap.clients().await.unwrap();
    let addrs: Vec<String> = clients.iter().map(|c| c.address.to_string()).collect();
    assert_eq!(addrs, vec!["10.0.2.20", "10.0.2.21"]);
}
