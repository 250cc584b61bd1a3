// ── Daemon control socket ──
//
// A running daemon owns the access point state and the reservation table.
// One-shot CLI invocations reach it here instead of building a second
// engine: one JSON request per line, one JSON response per line, over a
// Unix socket only root can open.

use std::io::ErrorKind;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::command::{Command, CommandResult};
use crate::dhcp::RebuildOutcome;
use crate::engine::Engine;
use crate::error::CoreError;
use crate::model::{AddressPlan, ApClient, ApSettings, ApStatus, MacAddress, Reservation};

const SOCKET_MODE: u32 = 0o600;

/// A request from the CLI to the daemon.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ControlRequest {
    ApStatus,
    ApClients,
    /// Fields left out fall back to the daemon's configuration.
    EnableAp {
        ssid: Option<String>,
        passphrase: Option<String>,
        address: Option<AddressPlan>,
        channel: Option<u8>,
    },
    DisableAp,
    RetryAp,
    RestartAp,
    Reserve {
        hardware_address: MacAddress,
        address: std::net::Ipv4Addr,
        label: String,
    },
    RemoveReservation {
        hardware_address: MacAddress,
    },
}

impl ControlRequest {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ApStatus => "ap_status",
            Self::ApClients => "ap_clients",
            Self::EnableAp { .. } => "enable_ap",
            Self::DisableAp => "disable_ap",
            Self::RetryAp => "retry_ap",
            Self::RestartAp => "restart_ap",
            Self::Reserve { .. } => "reserve",
            Self::RemoveReservation { .. } => "remove_reservation",
        }
    }
}

/// The daemon's answer. Errors carry the stable kind from
/// [`CoreError::kind`] so the CLI can pick its exit code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ControlResponse {
    Ap { status: ApStatus },
    Clients { clients: Vec<ApClient> },
    Reservation { reservation: Reservation, dhcp: RebuildOutcome },
    Removed { reservation: Reservation, dhcp: RebuildOutcome },
    Error { kind: String, message: String },
}

impl From<&CoreError> for ControlResponse {
    fn from(err: &CoreError) -> Self {
        Self::Error {
            kind: err.kind().to_owned(),
            message: err.to_string(),
        }
    }
}

fn socket_error(path: &Path, err: &std::io::Error) -> CoreError {
    CoreError::Internal(format!("control socket {}: {err}", path.display()))
}

// ── Server ──────────────────────────────────────────────────────────

pub struct ControlServer {
    listener: UnixListener,
    path: PathBuf,
}

impl ControlServer {
    /// Bind the socket, replacing one left behind by a dead daemon.
    ///
    /// Fails with `InvalidState` when another daemon still answers on it.
    pub async fn bind(path: &Path) -> Result<Self, CoreError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| socket_error(path, &e))?;
        }
        if tokio::fs::symlink_metadata(path).await.is_ok() {
            if UnixStream::connect(path).await.is_ok() {
                return Err(CoreError::InvalidState {
                    operation: "bind control socket".into(),
                    state: "daemon already running".into(),
                });
            }
            debug!(path = %path.display(), "removing stale control socket");
            tokio::fs::remove_file(path)
                .await
                .map_err(|e| socket_error(path, &e))?;
        }

        let listener = UnixListener::bind(path).map_err(|e| socket_error(path, &e))?;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(SOCKET_MODE))
            .map_err(|e| socket_error(path, &e))?;
        info!(path = %path.display(), "control socket listening");
        Ok(Self {
            listener,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Accept connections until `cancel` fires, then remove the socket.
    pub async fn run(self, engine: &Engine, cancel: &CancellationToken) {
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, _)) => {
                        let engine = engine.clone();
                        let cancel = cancel.clone();
                        tokio::spawn(async move {
                            tokio::select! {
                                () = cancel.cancelled() => {}
                                result = serve_connection(stream, &engine) => {
                                    if let Err(e) = result {
                                        debug!(error = %e, "control connection closed");
                                    }
                                }
                            }
                        });
                    }
                    Err(e) => warn!(error = %e, "control socket accept failed"),
                },
            }
        }
        if let Err(e) = tokio::fs::remove_file(&self.path).await {
            debug!(error = %e, "control socket already gone");
        }
        debug!("control socket closed");
    }
}

async fn serve_connection(stream: UnixStream, engine: &Engine) -> std::io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            return Ok(());
        }
        let response = match serde_json::from_str::<ControlRequest>(&line) {
            Ok(request) => {
                let op = request.name();
                debug!(op, "control request");
                match dispatch(engine, request).await {
                    Ok(response) => response,
                    Err(e) => {
                        debug!(op, error = %e, "control request failed");
                        ControlResponse::from(&e)
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "malformed control request");
                ControlResponse::from(&CoreError::validation(format!("malformed request: {e}")))
            }
        };
        let mut out = serde_json::to_string(&response).map_err(std::io::Error::other)?;
        out.push('\n');
        writer.write_all(out.as_bytes()).await?;
    }
}

async fn dispatch(engine: &Engine, request: ControlRequest) -> Result<ControlResponse, CoreError> {
    let ap = engine.ap();
    match request {
        ControlRequest::ApStatus => Ok(ControlResponse::Ap { status: ap.status() }),
        ControlRequest::ApClients => Ok(ControlResponse::Clients {
            clients: ap.clients().await?,
        }),
        ControlRequest::EnableAp {
            ssid,
            passphrase,
            address,
            channel,
        } => {
            let configured = &engine.config().ap;
            let passphrase = match passphrase {
                Some(p) => SecretString::from(p),
                None => configured.passphrase.clone().ok_or_else(|| CoreError::Config {
                    message: "no access point passphrase configured".into(),
                })?,
            };
            let settings = ApSettings {
                ssid: ssid.unwrap_or_else(|| configured.ssid.clone()),
                passphrase,
                address: address.unwrap_or(configured.address),
                channel: channel.unwrap_or(configured.channel),
            };
            engine
                .execute(Command::EnableAp {
                    settings: Some(settings),
                })
                .await?;
            Ok(ControlResponse::Ap {
                status: ap.wait_settled().await,
            })
        }
        ControlRequest::RetryAp => {
            engine.execute(Command::RetryAp).await?;
            Ok(ControlResponse::Ap {
                status: ap.wait_settled().await,
            })
        }
        ControlRequest::DisableAp => {
            engine.execute(Command::DisableAp).await?;
            Ok(ControlResponse::Ap { status: ap.status() })
        }
        ControlRequest::RestartAp => {
            engine.execute(Command::RestartAp).await?;
            Ok(ControlResponse::Ap { status: ap.status() })
        }
        ControlRequest::Reserve {
            hardware_address,
            address,
            label,
        } => match engine
            .execute(Command::Reserve {
                hardware_address,
                address,
                label,
            })
            .await?
        {
            CommandResult::Reservation(reservation, dhcp) => Ok(ControlResponse::Reservation { reservation, dhcp }),
            _ => Err(CoreError::Internal("unexpected result for reserve".into())),
        },
        ControlRequest::RemoveReservation { hardware_address } => {
            match engine.execute(Command::RemoveReservation { hardware_address }).await? {
                CommandResult::Removed(reservation, dhcp) => Ok(ControlResponse::Removed { reservation, dhcp }),
                _ => Err(CoreError::Internal("unexpected result for remove_reservation".into())),
            }
        }
    }
}

// ── Client ──────────────────────────────────────────────────────────

/// A connection to a running daemon.
pub struct ControlClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    path: PathBuf,
}

impl ControlClient {
    /// `Ok(None)` when no daemon is listening, so the caller can work on
    /// the host directly. Any other failure (a permission error, for
    /// one) is returned: a daemon may be running and must not be
    /// bypassed.
    pub async fn connect(path: &Path) -> Result<Option<Self>, CoreError> {
        match UnixStream::connect(path).await {
            Ok(stream) => {
                let (reader, writer) = stream.into_split();
                Ok(Some(Self {
                    reader: BufReader::new(reader),
                    writer,
                    path: path.to_path_buf(),
                }))
            }
            Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::ConnectionRefused) => Ok(None),
            Err(e) => Err(socket_error(path, &e)),
        }
    }

    /// Send one request and wait for its response.
    pub async fn request(&mut self, request: &ControlRequest) -> Result<ControlResponse, CoreError> {
        let mut out = serde_json::to_string(request).map_err(|e| CoreError::Internal(e.to_string()))?;
        out.push('\n');
        self.writer
            .write_all(out.as_bytes())
            .await
            .map_err(|e| socket_error(&self.path, &e))?;

        let mut line = String::new();
        let read = self
            .reader
            .read_line(&mut line)
            .await
            .map_err(|e| socket_error(&self.path, &e))?;
        if read == 0 {
            return Err(CoreError::Internal(format!(
                "daemon closed {} without answering {}",
                self.path.display(),
                request.name()
            )));
        }
        serde_json::from_str(&line).map_err(|e| CoreError::Internal(format!("unreadable daemon response: {e}")))
    }
}
