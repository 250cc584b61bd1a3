#![allow(clippy::unwrap_used)]
// End-to-end engine behaviour against a scripted host and a temp
// directory standing in for /etc and /var/lib.

mod common;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;

use common::{FakeProbe, FakeRunner, link_line};
use pixelpi_core::{
    AdapterPlan, ApState, Command, CommandResult, EngineConfig, Engine, EngineState, HotplugEvent,
    RebuildOutcome, RunMode,
};

// ── Helpers ─────────────────────────────────────────────────────────

const RESTART: &str = "systemctl restart dnsmasq";

fn links() -> String {
    format!(
        "{}{}{}",
        link_line(2, "eth0", "dc:a6:32:00:00:01"),
        link_line(3, "wlan0", "dc:a6:32:00:00:02"),
        link_line(4, "eth1", "00:e0:4c:68:00:01"),
    )
}

fn config(dir: &Path) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.dhcp.config_path = dir.join("dnsmasq.d").join("pixelpi.conf");
    config.reservations_path = dir.join("reservations.toml");
    config.link_monitor = false;
    config.ap.watchdog_interval = Duration::ZERO;
    config.adapters.plans.insert(
        "eth1".into(),
        AdapterPlan {
            address: "10.0.1.1/24".parse().unwrap(),
            isolation_domain: None,
        },
    );
    config
}

fn probe() -> Arc<FakeProbe> {
    Arc::new(
        FakeProbe::new()
            .controller("10.0.1.20", "aa:bb:cc:00:00:20", "Stage Left")
            .plain_host("10.0.1.30", "aa:bb:cc:00:00:30"),
    )
}

fn engine(config: EngineConfig) -> (Arc<FakeRunner>, Engine) {
    let runner = FakeRunner::new();
    runner.set_links(&links());
    let engine = Engine::with_parts(config, runner.clone(), probe());
    (runner, engine)
}

async fn eventually<F: Fn() -> bool>(what: &str, check: F) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

// ── Startup ─────────────────────────────────────────────────────────

#[tokio::test]
async fn daemon_start_applies_plans_and_renders_wired_config() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    let dhcp_path = cfg.dhcp.config_path.clone();
    let (runner, engine) = engine(cfg);

    engine.start(RunMode::Daemon).await.unwrap();
    assert_eq!(engine.state(), EngineState::Running);

    assert_eq!(runner.count("nmcli connection add type ethernet ifname eth1"), 1);
    assert_eq!(runner.count("nmcli connection up eth1-static"), 1);
    assert_eq!(runner.count(RESTART), 1);

    let rendered = std::fs::read_to_string(&dhcp_path).unwrap();
    assert!(rendered.contains("interface=eth1\n"), "{rendered}");
    assert!(rendered.contains("dhcp-range=eth1,10.0.1.10,10.0.1.50,24h"), "{rendered}");
    assert!(!rendered.contains("wlan0"), "{rendered}");

    // unchanged content never restarts the service
    let result = engine.execute(Command::RebuildDhcp).await.unwrap();
    assert!(matches!(result, CommandResult::Rebuilt(RebuildOutcome::Unchanged)));
    assert_eq!(runner.count(RESTART), 1);

    engine.shutdown().await;
    assert_eq!(engine.state(), EngineState::Stopped);
}

#[tokio::test]
async fn dhcp_authority_conflict_aborts_startup() {
    let dir = tempfile::tempdir().unwrap();
    let foreign = dir.path().join("dnsmasq.conf");
    std::fs::write(&foreign, "interface=wlan0\ndhcp-range=10.0.2.10,10.0.2.50,24h\n").unwrap();
    let mut cfg = config(dir.path());
    cfg.dhcp.inspect_paths = vec![foreign];
    let dhcp_path = cfg.dhcp.config_path.clone();
    let (runner, engine) = engine(cfg);

    let err = engine.start(RunMode::Daemon).await.unwrap_err();
    assert_eq!(err.kind(), "config_conflict");
    assert!(!err.is_retryable());
    assert_eq!(engine.state(), EngineState::Stopped);
    assert!(!dhcp_path.exists());
    assert!(runner.log().is_empty(), "{:?}", runner.log());
}

#[tokio::test]
async fn commands_are_rejected_when_not_running() {
    let dir = tempfile::tempdir().unwrap();
    let (_, engine) = engine(config(dir.path()));
    let err = engine.execute(Command::RebuildDhcp).await.unwrap_err();
    assert_eq!(err.kind(), "invalid_state");

    engine.start(RunMode::OneShot).await.unwrap();
    let err = engine.start(RunMode::OneShot).await.unwrap_err();
    assert_eq!(err.kind(), "invalid_state");
    engine.shutdown().await;
}

#[tokio::test]
async fn oneshot_mode_changes_nothing_on_start() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    let dhcp_path = cfg.dhcp.config_path.clone();
    let (runner, engine) = engine(cfg);

    engine.start(RunMode::OneShot).await.unwrap();
    assert_eq!(engine.adapters().usb_adapters().len(), 1);
    assert!(!dhcp_path.exists());
    assert_eq!(runner.count("nmcli connection add"), 0);
    engine.shutdown().await;
}

#[tokio::test]
async fn configured_access_point_comes_up_with_the_daemon() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(dir.path());
    cfg.ap.enabled = true;
    cfg.ap.passphrase = Some(SecretString::from("wled1234".to_owned()));
    let (_, engine) = engine(cfg);

    engine.start(RunMode::Daemon).await.unwrap();
    let status = engine.ap().wait_settled().await;
    assert_eq!(status.state, ApState::Active);
    assert_eq!(status.ssid.as_deref(), Some("WLED-Manager-AP"));
    engine.shutdown().await;
}

// ── Discovery and reservations ──────────────────────────────────────

#[tokio::test]
async fn scan_reserves_responding_controllers_only() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    let dhcp_path = cfg.dhcp.config_path.clone();
    let (runner, engine) = engine(cfg);
    engine.start(RunMode::Daemon).await.unwrap();

    let report = engine.scan("10.0.1.0/24".parse().unwrap()).await.unwrap();
    assert_eq!(report.devices.len(), 2);

    let reservations = engine.reservations().list().await;
    assert_eq!(reservations.len(), 1);
    assert_eq!(reservations[0].label, "Stage Left");
    let rendered = std::fs::read_to_string(&dhcp_path).unwrap();
    assert!(
        rendered.contains("dhcp-host=aa:bb:cc:00:00:20,stage-left,10.0.1.20"),
        "{rendered}"
    );
    assert_eq!(runner.count(RESTART), 2);

    // a second pass sees the same device at the same address: no rewrite
    engine.scan("10.0.1.0/24".parse().unwrap()).await.unwrap();
    assert_eq!(runner.count(RESTART), 2);
    engine.shutdown().await;
}

#[tokio::test]
async fn reservations_through_commands() {
    let dir = tempfile::tempdir().unwrap();
    let (_, engine) = engine(config(dir.path()));
    engine.start(RunMode::Daemon).await.unwrap();

    let result = engine
        .execute(Command::Reserve {
            hardware_address: "aa:bb:cc:dd:ee:ff".parse().unwrap(),
            address: "10.0.1.50".parse().unwrap(),
            label: "Controller-1".into(),
        })
        .await
        .unwrap();
    assert!(matches!(
        result,
        CommandResult::Reservation(ref r, RebuildOutcome::Applied) if r.label == "Controller-1"
    ));

    let err = engine
        .execute(Command::Reserve {
            hardware_address: "11:22:33:44:55:66".parse().unwrap(),
            address: "10.0.1.50".parse().unwrap(),
            label: "Other".into(),
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "reservation_conflict");

    let removed = engine
        .execute(Command::RemoveReservation {
            hardware_address: "aa:bb:cc:dd:ee:ff".parse().unwrap(),
        })
        .await
        .unwrap();
    assert!(matches!(removed, CommandResult::Removed(_, RebuildOutcome::Applied)));
    assert!(engine.reservations().is_empty().await);
    engine.shutdown().await;
}

#[tokio::test]
async fn failed_service_restart_is_retried_by_the_next_rebuild() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    let reservations_path = cfg.reservations_path.clone();
    let (runner, engine) = engine(cfg);
    engine.start(RunMode::Daemon).await.unwrap();
    assert_eq!(runner.count(RESTART), 1);

    runner.fail_restarts(1);
    let result = engine
        .execute(Command::Reserve {
            hardware_address: "aa:bb:cc:dd:ee:ff".parse().unwrap(),
            address: "10.0.1.50".parse().unwrap(),
            label: "Controller-1".into(),
        })
        .await
        .unwrap();
    // saved even though the service did not reload
    assert!(matches!(result, CommandResult::Reservation(_, RebuildOutcome::Pending)));
    assert!(std::fs::read_to_string(&reservations_path).unwrap().contains("aa:bb:cc:dd:ee:ff"));
    assert_eq!(runner.count(RESTART), 2);
    assert!(engine.dhcp().reload_pending().await);

    // same rendered content, but the service still owes a reload
    let result = engine.execute(Command::RebuildDhcp).await.unwrap();
    assert!(matches!(result, CommandResult::Rebuilt(RebuildOutcome::Applied)));
    assert_eq!(runner.count(RESTART), 3);
    assert!(!engine.dhcp().reload_pending().await);

    let result = engine.execute(Command::RebuildDhcp).await.unwrap();
    assert!(matches!(result, CommandResult::Rebuilt(RebuildOutcome::Unchanged)));
    assert_eq!(runner.count(RESTART), 3);
    engine.shutdown().await;
}

#[tokio::test]
async fn overlapping_plans_are_never_served_twice() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(dir.path());
    cfg.adapters.plans.get_mut("eth1").unwrap().isolation_domain = Some("eth1".into());
    cfg.adapters.plans.insert(
        "eth2".into(),
        AdapterPlan {
            address: "10.0.1.2/24".parse().unwrap(),
            isolation_domain: Some("eth2".into()),
        },
    );
    let dhcp_path = cfg.dhcp.config_path.clone();
    let (runner, engine) = engine(cfg);
    runner.set_links(&format!("{}{}", links(), link_line(5, "eth2", "00:e0:4c:68:00:02")));

    engine.start(RunMode::Daemon).await.unwrap();
    let rendered = std::fs::read_to_string(&dhcp_path).unwrap();
    assert!(rendered.contains("dhcp-range=eth1,10.0.1.10,10.0.1.50,24h"), "{rendered}");
    assert!(!rendered.contains("eth2"), "{rendered}");
    assert_eq!(runner.count("nmcli connection up eth2-static"), 0);
    assert!(engine.adapters().get("eth2").unwrap().assigned_address.is_none());

    // the same overlap through a command is rejected outright
    let err = engine
        .execute(Command::ConfigureAdapter {
            id: "eth2".into(),
            plan: "10.0.1.2/24".parse().unwrap(),
            isolation_domain: None,
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "conflict");
    engine.shutdown().await;
}

#[tokio::test]
async fn configure_adapter_rejects_overlap_with_access_point() {
    let dir = tempfile::tempdir().unwrap();
    let (_, engine) = engine(config(dir.path()));
    engine.start(RunMode::Daemon).await.unwrap();

    let err = engine
        .execute(Command::ConfigureAdapter {
            id: "eth1".into(),
            plan: "10.0.2.7/24".parse().unwrap(),
            isolation_domain: None,
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "conflict");
    engine.shutdown().await;
}

// ── Hotplug ─────────────────────────────────────────────────────────

#[tokio::test]
async fn hotplugged_adapter_with_plan_is_configured_and_served() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(dir.path());
    cfg.adapters.plans.insert(
        "eth2".into(),
        AdapterPlan {
            address: "10.0.3.1/24".parse().unwrap(),
            isolation_domain: None,
        },
    );
    let dhcp_path = cfg.dhcp.config_path.clone();
    let (runner, engine) = engine(cfg);
    engine.start(RunMode::Daemon).await.unwrap();
    assert!(!std::fs::read_to_string(&dhcp_path).unwrap().contains("eth2"));

    runner.set_links(&format!("{}{}", links(), link_line(5, "eth2", "00:e0:4c:68:00:02")));
    engine
        .notify_hotplug(HotplugEvent::LinkChanged {
            interface: "eth2".into(),
        })
        .await
        .unwrap();

    eventually("eth2 in dhcp config", || {
        std::fs::read_to_string(&dhcp_path).is_ok_and(|c| c.contains("interface=eth2"))
    })
    .await;
    assert_eq!(runner.count("nmcli connection up eth2-static"), 1);
    assert_eq!(engine.adapters().usb_adapters().len(), 2);

    let status = engine.status().await;
    assert!(status.dhcp_service_active);
    assert!(status.connection_manager_active);
    assert_eq!(status.usb_adapters, 2);
    engine.shutdown().await;
}
