// ── Host probes ──
//
// Address resolution (ARP solicitation, then the neighbour table) and the
// controller identification request. Behind a trait so scans can be
// driven without a network.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tracing::trace;
use url::Url;

use crate::error::CoreError;
use crate::model::{ControllerInfo, MacAddress};
use crate::parse::parse_neighbors;
use crate::runner::{CommandRunner, Operation, RunOutcome};

/// Path of the identification endpoint served by LED controllers.
pub const INFO_PATH: &str = "/json/info";

pub trait NetworkProbe: Send + Sync {
    /// Resolve `address` to a hardware address. `Ok(None)` when nothing
    /// answers; `Err` only when the resolution machinery itself failed.
    fn resolve<'a>(
        &'a self,
        address: Ipv4Addr,
        timeout: Duration,
    ) -> BoxFuture<'a, Result<Option<MacAddress>, String>>;

    /// Application-level identification. `None` when the host does not
    /// answer as a controller.
    fn identify<'a>(&'a self, address: Ipv4Addr, timeout: Duration) -> BoxFuture<'a, Option<ControllerInfo>>;
}

/// Probes the real network through the command runner and HTTP.
pub struct SystemProbe {
    runner: Arc<dyn CommandRunner>,
    interface: Option<String>,
    http: reqwest::Client,
    port: u16,
}

impl SystemProbe {
    pub fn new(runner: Arc<dyn CommandRunner>, interface: Option<String>, port: u16) -> Result<Self, CoreError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("pixelpi/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CoreError::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_client(runner, interface, port, http))
    }

    pub fn with_client(
        runner: Arc<dyn CommandRunner>,
        interface: Option<String>,
        port: u16,
        http: reqwest::Client,
    ) -> Self {
        Self {
            runner,
            interface,
            http,
            port,
        }
    }

    pub fn info_url(address: Ipv4Addr, port: u16) -> Option<Url> {
        Url::parse(&format!("http://{address}:{port}{INFO_PATH}")).ok()
    }

    async fn resolve_inner(&self, address: Ipv4Addr, timeout: Duration) -> Result<Option<MacAddress>, String> {
        // arping only primes the neighbour table; its exit code is noise
        let _ = self
            .runner
            .run(
                &Operation::Arping {
                    interface: self.interface.clone(),
                    address,
                },
                timeout,
            )
            .await;

        let lookup = Operation::NeighborLookup { address };
        match self.runner.run(&lookup, timeout).await {
            RunOutcome::Exited(out) if out.is_success() => Ok(parse_neighbors(&out.stdout)
                .into_iter()
                .find(|n| n.address == address)
                .and_then(|n| n.hardware_address)),
            RunOutcome::Exited(out) => Err(format!("{lookup} exited with {}", out.exit_code)),
            RunOutcome::TimedOut => Err(format!("{lookup} timed out")),
        }
    }

    async fn identify_inner(&self, address: Ipv4Addr, timeout: Duration) -> Option<ControllerInfo> {
        let url = Self::info_url(address, self.port)?;
        let response = match self.http.get(url).timeout(timeout).send().await {
            Ok(resp) if resp.status().is_success() => resp,
            Ok(resp) => {
                trace!(%address, status = %resp.status(), "identification refused");
                return None;
            }
            Err(e) => {
                trace!(%address, error = %e, "identification failed");
                return None;
            }
        };
        let info: ControllerInfo = response.json().await.ok()?;
        info.is_identified().then_some(info)
    }
}

impl NetworkProbe for SystemProbe {
    fn resolve<'a>(
        &'a self,
        address: Ipv4Addr,
        timeout: Duration,
    ) -> BoxFuture<'a, Result<Option<MacAddress>, String>> {
        Box::pin(self.resolve_inner(address, timeout))
    }

    fn identify<'a>(&'a self, address: Ipv4Addr, timeout: Duration) -> BoxFuture<'a, Option<ControllerInfo>> {
        Box::pin(self.identify_inner(address, timeout))
    }
}
