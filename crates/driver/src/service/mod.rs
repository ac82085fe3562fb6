//! Local driver executable lifecycle
//!
//! A [`DriverService`] owns one driver process: it resolves the executable,
//! reserves a port, spawns the process with `--port=<port>`, and polls
//! `/status` until the driver reports ready. Disposal is idempotent and also
//! happens on drop.

pub mod port;

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use serde::Deserialize;
use tokio::process::{Child, Command};
use tokio::sync::broadcast;
use url::Url;

use crate::command::CommandDescriptor;
use crate::config::{ExecutorConfig, ServiceConfig};
use crate::error::{ErrorKind, Result, WebDriverError};
use crate::events::{EventBus, ServiceEvent};
use crate::executor::CommandExecutor;
use crate::vendor::Vendor;
use crate::wait::Wait;

use port::PortReservation;

const STATUS_REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    NotStarted,
    Starting,
    Ready,
    Stopped,
}

/// Body of a `/status` reply.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServiceStatus {
    #[serde(default)]
    pub ready: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub build: Option<BuildInfo>,
    #[serde(default)]
    pub os: Option<OsInfo>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BuildInfo {
    #[serde(default)]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OsInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub arch: Option<String>,
}

/// Query `/status` on any remote end.
pub async fn fetch_status(executor: &CommandExecutor) -> Result<ServiceStatus> {
    let envelope = executor.execute(&CommandDescriptor::get("/status")).await?;
    let value = envelope
        .value
        .ok_or_else(|| WebDriverError::protocol("status reply without value"))?;
    serde_json::from_value(value)
        .map_err(|e| WebDriverError::protocol(format!("malformed status reply: {e}")))
}

#[derive(Debug)]
pub struct DriverService {
    config: ServiceConfig,
    port: u16,
    url: Url,
    state: ServiceState,
    child: Option<Child>,
    reservation: Option<PortReservation>,
    status_client: CommandExecutor,
    events: EventBus,
}

impl DriverService {
    /// Prepare a service. The port is reserved now; nothing is spawned until
    /// [`start`](Self::start).
    pub fn new(config: ServiceConfig, default_port: u16) -> Result<Self> {
        if config.executable_name.is_empty() {
            return Err(WebDriverError::Config(
                "driver executable name is empty".to_string(),
            ));
        }

        let reservation = match config.port {
            Some(fixed) => port::reserve(fixed).ok_or_else(|| {
                WebDriverError::Config(format!("port {fixed} is already held by another service"))
            })?,
            None => port::allocate(&config.host, default_port)?,
        };
        let port = reservation.port();

        let url = Url::parse(&format!("http://{}:{}", config.host, port))
            .map_err(|e| WebDriverError::Config(format!("invalid service host: {e}")))?;
        let status_client = CommandExecutor::new(
            url.clone(),
            ExecutorConfig {
                command_timeout: STATUS_REQUEST_TIMEOUT,
                ..Default::default()
            },
        )?;

        Ok(Self {
            config,
            port,
            url,
            state: ServiceState::NotStarted,
            child: None,
            reservation: Some(reservation),
            status_client,
            events: EventBus::new(),
        })
    }

    /// Service for a vendor, filling in its executable name when the config
    /// leaves it blank.
    pub fn for_vendor(vendor: &dyn Vendor, mut config: ServiceConfig) -> Result<Self> {
        if config.executable_name.is_empty() {
            config.executable_name = vendor.executable_name().to_string();
        }
        Self::new(config, vendor.default_port())
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn state(&self) -> ServiceState {
        self.state
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServiceEvent> {
        self.events.subscribe()
    }

    fn file_name(&self) -> String {
        let name = &self.config.executable_name;
        if cfg!(windows) && Path::new(name).extension().is_none() {
            format!("{name}.exe")
        } else {
            name.clone()
        }
    }

    /// Locate the executable in `binaries_dir`, or on `PATH` when no
    /// directory is configured.
    pub fn executable_path(&self) -> Option<PathBuf> {
        let name = self.file_name();
        match &self.config.binaries_dir {
            Some(dir) => {
                let candidate = dir.join(&name);
                candidate.is_file().then_some(candidate)
            }
            None => which::which(&name).ok(),
        }
    }

    async fn ensure_executable(&self) -> Result<PathBuf> {
        if let Some(path) = self.executable_path() {
            return Ok(path);
        }
        match &self.config.download_url {
            Some(url) => self.download(url).await,
            None => Err(WebDriverError::Config(format!(
                "driver executable '{}' not found",
                self.file_name()
            ))),
        }
    }

    async fn download(&self, url: &str) -> Result<PathBuf> {
        let dir = self.config.binaries_dir.as_ref().ok_or_else(|| {
            WebDriverError::Config("downloading a driver requires binaries_dir".to_string())
        })?;

        tracing::info!(url, dir = %dir.display(), "downloading driver executable");
        let bytes = reqwest::get(url)
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| WebDriverError::transport(url, e))?
            .bytes()
            .await
            .map_err(|e| WebDriverError::transport(url, e))?;

        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(self.file_name());
        tokio::fs::write(&path, &bytes).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).await?;
        }

        Ok(path)
    }

    /// Launch arguments: the port first, then configured extras.
    pub fn launch_args(&self) -> Vec<String> {
        let mut args = vec![format!("--port={}", self.port)];
        args.extend(self.config.args.iter().cloned());
        args
    }

    /// Spawn the driver and block until `/status` reports ready. A no-op on a
    /// running service. Readiness failure kills the process and is fatal.
    pub async fn start(&mut self) -> Result<()> {
        match self.state {
            ServiceState::Ready => return Ok(()),
            ServiceState::Stopped => {
                return Err(WebDriverError::Config(
                    "driver service was already disposed".to_string(),
                ))
            }
            ServiceState::NotStarted | ServiceState::Starting => {}
        }

        let exe = self.ensure_executable().await?;
        let args = self.launch_args();
        let command_line = std::iter::once(exe.display().to_string())
            .chain(args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ");

        self.state = ServiceState::Starting;
        self.events.publish(ServiceEvent::Starting {
            command_line: command_line.clone(),
        });
        tracing::info!(command = %command_line, "starting driver service");

        let child = Command::new(&exe)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn();
        let child = match child {
            Ok(child) => child,
            Err(e) => {
                self.state = ServiceState::NotStarted;
                return Err(e.into());
            }
        };

        let pid = child.id();
        self.child = Some(child);
        self.events.publish(ServiceEvent::Started {
            pid,
            port: self.port,
        });

        match self.wait_until_ready().await {
            Ok(()) => {
                self.state = ServiceState::Ready;
                self.events.publish(ServiceEvent::Ready { port: self.port });
                tracing::info!(port = self.port, pid, "driver service ready");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(port = self.port, error = %e, "driver service failed to start");
                self.dispose().await;
                Err(e)
            }
        }
    }

    async fn wait_until_ready(&mut self) -> Result<()> {
        let timeout = self.config.startup_timeout;
        let wait = Wait::new(timeout)
            .polling(self.config.poll_interval)
            .ignoring(ErrorKind::Transport)
            .ignoring(ErrorKind::Protocol)
            .with_message("driver service startup");

        let Self {
            child,
            status_client,
            url,
            ..
        } = self;
        let client: &CommandExecutor = status_client;

        let result = wait
            .until(|| {
                let exited = child
                    .as_mut()
                    .and_then(|c| c.try_wait().ok().flatten());
                async move {
                    if let Some(status) = exited {
                        return Err(WebDriverError::ServiceExited {
                            status: status.to_string(),
                        });
                    }
                    Ok(fetch_status(client).await?.ready)
                }
            })
            .await;

        match result {
            Err(WebDriverError::Timeout { .. }) => Err(WebDriverError::ServiceNotReady {
                url: url.to_string(),
                timeout,
            }),
            other => other,
        }
    }

    /// `/status` of the running driver.
    pub async fn status(&self) -> Result<ServiceStatus> {
        fetch_status(&self.status_client).await
    }

    /// Stop the process and release the port. Safe to call repeatedly and on
    /// a service that never started.
    pub async fn dispose(&mut self) {
        if self.state == ServiceState::Stopped {
            return;
        }

        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill().await {
                tracing::warn!(port = self.port, error = %e, "failed to kill driver process");
            }
            self.events.publish(ServiceEvent::Stopped { port: self.port });
            tracing::info!(port = self.port, "driver service stopped");
        }

        self.reservation = None;
        self.state = ServiceState::Stopped;
    }
}

impl Drop for DriverService {
    fn drop(&mut self) {
        if let Some(child) = self.child.as_mut() {
            let _ = child.start_kill();
        }
    }
}
