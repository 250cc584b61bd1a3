#![allow(clippy::unwrap_used)]
// Subnet scans against a scripted probe, plus the HTTP identification
// probe against a mock controller.

mod common;

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{FakeProbe, FakeRunner};
use pixelpi_core::{DiscoveryScanner, NetworkProbe, ScanErrorKind, Subnet, SystemProbe};

fn subnet(s: &str) -> Subnet {
    s.parse().unwrap()
}

// ── Scanner ─────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn responders_and_silent_hosts() {
    let probe = FakeProbe::new()
        .controller("10.0.1.20", "aa:bb:cc:00:00:20", "Stage Left")
        .plain_host("10.0.1.30", "aa:bb:cc:00:00:30");
    let scanner = DiscoveryScanner::new(Arc::new(probe), 16);

    let report = scanner
        .scan(
            subnet("10.0.1.0/24"),
            Duration::from_millis(500),
            Duration::from_secs(60),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(report.errors.is_empty(), "{:?}", report.errors);
    assert_eq!(report.devices.len(), 2);
    let controller = &report.devices[0];
    assert_eq!(controller.address, Ipv4Addr::new(10, 0, 1, 20));
    assert!(controller.responded);
    assert_eq!(controller.label_hint(), Some("Stage Left"));
    let plain = &report.devices[1];
    assert!(!plain.responded);
    assert!(plain.info.is_none());

    assert_eq!(scanner.latest().unwrap().devices.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn deadline_bounds_the_scan_and_reports_unprobed_hosts() {
    // every silent host takes 2s; 254 hosts at concurrency 4 would take
    // over two minutes
    let probe = FakeProbe::new()
        .with_silent_delay(Duration::from_secs(2))
        .controller("10.0.1.1", "aa:bb:cc:00:00:01", "First");
    let scanner = DiscoveryScanner::new(Arc::new(probe), 4);

    let started = Instant::now();
    let report = scanner
        .scan(
            subnet("10.0.1.0/24"),
            Duration::from_secs(5),
            Duration::from_secs(10),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    let elapsed = started.elapsed();

    assert!(elapsed <= Duration::from_secs(10) + Duration::from_millis(50), "{elapsed:?}");
    assert_eq!(report.devices.len(), 1);
    assert!(report.timed_out() > 0);
    assert!(report.errors.iter().all(|e| e.kind == ScanErrorKind::Timeout));
    // nothing lost: every host is either probed silent, a device, or an error
    let device_addrs: Vec<Ipv4Addr> = report.devices.iter().map(|d| d.address).collect();
    assert!(report.errors.iter().all(|e| !device_addrs.contains(&e.address)));
    let probed = 254 - report.errors.len();
    assert!(probed >= 4 * 4, "only {probed} probed");
    assert_eq!(report.deadline_error().unwrap().kind(), "scan_timeout");
}

#[tokio::test(start_paused = true)]
async fn per_host_timeout_treats_slow_hosts_as_silent() {
    let probe = FakeProbe::new().with_silent_delay(Duration::from_secs(30));
    let scanner = DiscoveryScanner::new(Arc::new(probe), 8);

    let report = scanner
        .scan(
            subnet("10.0.1.0/29"),
            Duration::from_secs(1),
            Duration::from_secs(60),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert!(report.devices.is_empty());
    assert!(report.errors.is_empty());
}

#[tokio::test(start_paused = true)]
async fn cancellation_reports_remaining_hosts_as_cancelled() {
    let probe = FakeProbe::new().with_silent_delay(Duration::from_secs(1));
    let scanner = DiscoveryScanner::new(Arc::new(probe), 2);
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(2500)).await;
        trigger.cancel();
    });

    let report = scanner
        .scan(
            subnet("10.0.1.0/28"),
            Duration::from_secs(5),
            Duration::from_secs(60),
            &cancel,
        )
        .await
        .unwrap();
    assert!(!report.errors.is_empty());
    assert!(report.errors.iter().all(|e| e.kind == ScanErrorKind::Cancelled));
    assert_eq!(report.timed_out(), 0);
}

#[tokio::test]
async fn oversized_subnet_is_rejected() {
    let scanner = DiscoveryScanner::new(Arc::new(FakeProbe::new()), 4);
    let err = scanner
        .scan(
            subnet("10.0.0.0/16"),
            Duration::from_secs(1),
            Duration::from_secs(1),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "validation_failed");
}

// ── HTTP identification ─────────────────────────────────────────────

fn probe_for(server: &MockServer) -> (Ipv4Addr, SystemProbe) {
    let addr = server.address();
    let ip = match addr.ip() {
        std::net::IpAddr::V4(v4) => v4,
        std::net::IpAddr::V6(_) => panic!("mock server bound to IPv6"),
    };
    let probe = SystemProbe::with_client(FakeRunner::new(), None, addr.port(), reqwest::Client::new());
    (ip, probe)
}

#[tokio::test]
async fn identify_reads_controller_info() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/json/info"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ver": "0.14.4",
            "name": "Stage Left",
            "brand": "WLED",
            "product": "FOSS",
            "arch": "esp32",
            "leds": { "count": 300 }
        })))
        .mount(&server)
        .await;

    let (ip, probe) = probe_for(&server);
    let info = probe.identify(ip, Duration::from_secs(2)).await.unwrap();
    assert_eq!(info.name.as_deref(), Some("Stage Left"));
    assert_eq!(info.version.as_deref(), Some("0.14.4"));
    assert_eq!(info.arch.as_deref(), Some("esp32"));
}

#[tokio::test]
async fn identify_rejects_non_controllers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/json/info"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "hello": "world" })))
        .mount(&server)
        .await;
    let (ip, probe) = probe_for(&server);
    assert!(probe.identify(ip, Duration::from_secs(2)).await.is_none());
}

#[tokio::test]
async fn identify_treats_errors_as_no_answer() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/json/info"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    let (ip, probe) = probe_for(&server);
    assert!(probe.identify(ip, Duration::from_secs(2)).await.is_none());
}

#[tokio::test]
async fn resolve_reads_neighbour_table() {
    let runner = FakeRunner::new();
    runner.set_neighbors(
        "10.0.1.20 dev eth1 lladdr aa:bb:cc:00:00:20 REACHABLE\n\
         10.0.1.21 dev eth1 FAILED\n",
    );
    let probe = SystemProbe::with_client(runner.clone(), Some("eth1".into()), 80, reqwest::Client::new());

    let mac = probe
        .resolve(Ipv4Addr::new(10, 0, 1, 20), Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(mac.unwrap().as_str(), "aa:bb:cc:00:00:20");
    let silent = probe
        .resolve(Ipv4Addr::new(10, 0, 1, 21), Duration::from_secs(1))
        .await
        .unwrap();
    assert!(silent.is_none());

    let log = runner.log();
    assert_eq!(log[0], "arping -c 1 -w 1 -I eth1 10.0.1.20");
    assert_eq!(log[1], "ip neigh show 10.0.1.20");
}
