//! Embedded backend supervisor
//!
//! Owns the single live PocketBase child. `start()` is memoized: while a start
//! is in flight every caller awaits the same shared future, so two callers can
//! never spawn two children. After the readiness marker shows up, a monitor
//! task owns the child and handles unexpected exits with a bounded restart.

mod output;

use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use clairvoyance_core::ProcessState;

use crate::backend::BackendClient;

/// Line PocketBase prints once its HTTP server is accepting connections
pub const READY_MARKER: &str = "Server started at";

// ============================================================================
// CONFIG / ERRORS / STATUS
// ============================================================================

/// How to launch and babysit the backend
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub executable: PathBuf,
    pub bind: String,
    pub data_dir: PathBuf,
    /// Address clients use to reach the backend
    pub base_url: String,
    pub ready_marker: String,
    pub ready_timeout: Duration,
    pub restart_delay: Duration,
    /// Restarts allowed after crashes over the supervisor's lifetime
    pub max_restarts: u32,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            executable: PathBuf::from("pocketbase"),
            bind: "127.0.0.1:8090".to_string(),
            data_dir: PathBuf::from("pb_data"),
            base_url: "http://127.0.0.1:8090".to_string(),
            ready_marker: READY_MARKER.to_string(),
            ready_timeout: Duration::from_secs(10),
            restart_delay: Duration::from_secs(1),
            max_restarts: 1,
        }
    }
}

impl SupervisorConfig {
    /// Arguments passed to the backend executable
    pub fn args(&self) -> Vec<String> {
        vec![
            "serve".to_string(),
            format!("--http={}", self.bind),
            format!("--dir={}", self.data_dir.display()),
        ]
    }
}

/// Supervisor error
///
/// Cloneable because one start outcome is handed to every waiting caller.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SupervisorError {
    #[error("backend executable not found: {0}")]
    ExecutableMissing(PathBuf),
    #[error("backend executable is not a file: {0}")]
    NotAFile(PathBuf),
    #[error("could not prepare data directory {path}: {source}")]
    DataDir {
        path: PathBuf,
        #[source]
        source: Arc<io::Error>,
    },
    #[error("failed to spawn {path}: {source}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: Arc<io::Error>,
    },
    #[error("failed to wait on backend process: {0}")]
    Wait(#[source] Arc<io::Error>),
    #[error("backend did not report ready within {0:?}")]
    ReadinessTimeout(Duration),
    #[error("backend exited before becoming ready (exit code {code:?})")]
    ExitedBeforeReady { code: Option<i32> },
    #[error("backend start was cancelled by stop()")]
    Cancelled,
}

/// Snapshot of the managed process
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessStatus {
    pub state: ProcessState,
    pub pid: Option<u32>,
    pub last_exit_code: Option<i32>,
    /// Children spawned so far
    pub spawns: u32,
    /// Crash restarts used so far
    pub restarts: u32,
    pub last_error: Option<String>,
}

// ============================================================================
// SUPERVISOR
// ============================================================================

type StartFuture = Shared<BoxFuture<'static, Result<(), SupervisorError>>>;

/// Handle to the supervisor; clones share the same child
#[derive(Clone)]
pub struct Supervisor {
    inner: Arc<Inner>,
}

struct Inner {
    config: SupervisorConfig,
    status: watch::Sender<ProcessStatus>,
    control: Mutex<Control>,
}

#[derive(Default)]
struct Control {
    /// In-flight start and the generation it belongs to
    pending: Option<(u64, StartFuture)>,
    running: Option<Running>,
    /// Bumped by stop(); exits from older generations are ignored
    generation: u64,
}

impl Control {
    /// Forget the in-flight start if it is the one for `generation`
    fn clear_pending(&mut self, generation: u64) {
        if matches!(&self.pending, Some((g, _)) if *g == generation) {
            self.pending = None;
        }
    }
}

/// A ready child, owned by its monitor task
struct Running {
    generation: u64,
    kill: oneshot::Sender<()>,
    monitor: JoinHandle<()>,
}

enum Startup {
    Ready,
    Exited(ExitStatus),
}

impl Supervisor {
    pub fn new(config: SupervisorConfig) -> Self {
        let (status, _) = watch::channel(ProcessStatus::default());
        Self {
            inner: Arc::new(Inner {
                config,
                status,
                control: Mutex::new(Control::default()),
            }),
        }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.inner.config
    }

    /// Current process snapshot
    pub fn status(&self) -> ProcessStatus {
        self.inner.status.borrow().clone()
    }

    /// Receive every status change, including the fatal Failed state
    pub fn subscribe(&self) -> watch::Receiver<ProcessStatus> {
        self.inner.status.subscribe()
    }

    /// HTTP client pointed at the backend's local address
    pub fn client(&self) -> reqwest::Result<BackendClient> {
        BackendClient::new(&self.inner.config.base_url)
    }

    /// Start the backend and wait until it is ready
    ///
    /// Returns immediately when already running. Concurrent callers share the
    /// in-flight attempt and all observe its outcome.
    pub async fn start(&self) -> Result<(), SupervisorError> {
        let pending = {
            let mut control = self.inner.control.lock().await;

            if control.running.is_some() && self.status().state.is_ready() {
                return Ok(());
            }

            self.pending_start(&mut control)
        };

        pending.await
    }

    /// Join the in-flight start or create one bound to the current generation
    fn pending_start(&self, control: &mut Control) -> StartFuture {
        let generation = control.generation;
        match &control.pending {
            Some((pending_generation, pending)) if *pending_generation == generation => {
                pending.clone()
            }
            _ => {
                let attempt = self.clone().launch(generation).boxed().shared();
                control.pending = Some((generation, attempt.clone()));
                attempt
            }
        }
    }

    /// Start again after a crash, unless stop() ran since `generation`
    ///
    /// Boxed because the monitor restarting its own supervisor would
    /// otherwise make the future types recursive.
    fn resume_after_crash(
        &self,
        generation: u64,
    ) -> BoxFuture<'static, Result<(), SupervisorError>> {
        let this = self.clone();
        async move {
            let pending = {
                let mut control = this.inner.control.lock().await;
                if control.generation != generation {
                    info!("Backend was stopped during the restart delay, not restarting");
                    return Ok(());
                }
                this.pending_start(&mut control)
            };
            pending.await
        }
        .boxed()
    }

    /// Kill the live child and wait for it to exit
    pub async fn stop(&self) {
        let running = {
            let mut control = self.inner.control.lock().await;
            control.generation += 1;
            control.running.take()
        };

        if let Some(running) = running {
            let _ = running.kill.send(());
            if let Err(e) = running.monitor.await {
                warn!("Backend monitor task ended abnormally: {}", e);
            }
            info!("Backend stopped");
        }

        self.inner.status.send_modify(|s| {
            s.state = ProcessState::Stopped;
            s.pid = None;
        });
    }

    /// Replace the live child with a fresh one
    pub async fn restart(&self) -> Result<(), SupervisorError> {
        self.stop().await;
        self.start().await
    }

    async fn launch(self, generation: u64) -> Result<(), SupervisorError> {
        {
            let mut control = self.inner.control.lock().await;
            if control.generation != generation {
                // stop() ran before this attempt got going
                control.clear_pending(generation);
                return Err(SupervisorError::Cancelled);
            }
        }
        self.inner.status.send_modify(|s| {
            s.state = ProcessState::Starting;
            s.last_error = None;
        });

        let result = self.spawn_until_ready(generation).await;

        let mut control = self.inner.control.lock().await;
        control.clear_pending(generation);

        match result {
            Ok(running) if running.generation == control.generation => {
                control.running = Some(running);
                self.inner.status.send_modify(|s| s.state = ProcessState::Ready);
                Ok(())
            }
            Ok(running) => {
                // stop() ran while we were waiting for readiness
                let superseded = control.pending.is_some();
                drop(control);
                let _ = running.kill.send(());
                let _ = running.monitor.await;
                if !superseded {
                    self.inner.status.send_modify(|s| {
                        s.state = ProcessState::Stopped;
                        s.pid = None;
                    });
                }
                Err(SupervisorError::Cancelled)
            }
            Err(e) => {
                error!("Backend failed to start: {}", e);
                self.inner.status.send_modify(|s| {
                    s.state = ProcessState::Failed;
                    s.pid = None;
                    s.last_error = Some(e.to_string());
                });
                Err(e)
            }
        }
    }

    async fn spawn_until_ready(&self, generation: u64) -> Result<Running, SupervisorError> {
        let config = &self.inner.config;

        prepare_executable(&config.executable).await?;

        tokio::fs::create_dir_all(&config.data_dir)
            .await
            .map_err(|e| SupervisorError::DataDir {
                path: config.data_dir.clone(),
                source: Arc::new(e),
            })?;

        info!(
            executable = %config.executable.display(),
            bind = %config.bind,
            data_dir = %config.data_dir.display(),
            "Spawning backend"
        );

        let mut child = Command::new(&config.executable)
            .args(config.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SupervisorError::Spawn {
                path: config.executable.clone(),
                source: Arc::new(e),
            })?;

        let pid = child.id();
        self.inner.status.send_modify(|s| {
            s.pid = pid;
            s.spawns += 1;
        });

        let (ready_tx, mut ready_rx) = oneshot::channel();
        if let Some(stdout) = child.stdout.take() {
            output::forward_stdout(stdout, config.ready_marker.clone(), ready_tx);
        }
        if let Some(stderr) = child.stderr.take() {
            output::forward_stderr(stderr);
        }

        let startup = tokio::time::timeout(config.ready_timeout, async {
            tokio::select! {
                biased;
                Ok(()) = &mut ready_rx => Ok(Startup::Ready),
                status = child.wait() => status.map(Startup::Exited),
            }
        })
        .await;

        match startup {
            Ok(Ok(Startup::Ready)) => {
                info!(pid = ?pid, "Backend ready");
                let (kill, kill_rx) = oneshot::channel();
                let monitor = tokio::spawn(self.clone().monitor(child, generation, kill_rx));
                Ok(Running {
                    generation,
                    kill,
                    monitor,
                })
            }
            Ok(Ok(Startup::Exited(status))) => {
                self.inner.status.send_modify(|s| s.last_exit_code = status.code());
                Err(SupervisorError::ExitedBeforeReady {
                    code: status.code(),
                })
            }
            Ok(Err(e)) => Err(SupervisorError::Wait(Arc::new(e))),
            Err(_) => {
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill unresponsive backend: {}", e);
                }
                Err(SupervisorError::ReadinessTimeout(config.ready_timeout))
            }
        }
    }

    /// Own the child until it exits or we are told to kill it
    async fn monitor(self, mut child: Child, generation: u64, kill_rx: oneshot::Receiver<()>) {
        let status = tokio::select! {
            status = child.wait() => status,
            _ = kill_rx => {
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill backend: {}", e);
                }
                return;
            }
        };

        self.handle_exit(generation, status).await;
    }

    async fn handle_exit(&self, generation: u64, status: io::Result<ExitStatus>) {
        let config = &self.inner.config;

        let restart = {
            let mut control = self.inner.control.lock().await;
            if control.generation != generation {
                return;
            }
            control.running = None;

            let code = match &status {
                Ok(status) => status.code(),
                Err(e) => {
                    warn!("Lost track of backend process: {}", e);
                    None
                }
            };
            let crashed = matches!(code, Some(c) if c != 0);

            let mut restart = false;
            self.inner.status.send_modify(|s| {
                s.pid = None;
                s.last_exit_code = code;

                if !crashed {
                    s.state = ProcessState::Stopped;
                } else if s.restarts < config.max_restarts {
                    s.restarts += 1;
                    s.state = ProcessState::Starting;
                    restart = true;
                } else {
                    s.state = ProcessState::Failed;
                    s.last_error = Some(format!("backend crashed with exit code {:?}", code));
                }
            });
            restart
        };

        let state = self.status().state;
        match (restart, state) {
            (true, _) => {
                warn!(
                    delay_ms = config.restart_delay.as_millis() as u64,
                    "Backend exited unexpectedly, restarting"
                );
                tokio::time::sleep(config.restart_delay).await;
                if let Err(e) = self.resume_after_crash(generation).await {
                    error!("Backend restart failed, giving up: {}", e);
                }
            }
            (false, ProcessState::Failed) => {
                error!("Backend crashed again after its restart budget was used");
            }
            _ => info!("Backend exited"),
        }
    }
}

/// Check the executable exists and make sure it is runnable
async fn prepare_executable(path: &Path) -> Result<(), SupervisorError> {
    let metadata = match tokio::fs::metadata(path).await {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(SupervisorError::ExecutableMissing(path.to_path_buf()));
        }
        Err(e) => {
            return Err(SupervisorError::Spawn {
                path: path.to_path_buf(),
                source: Arc::new(e),
            });
        }
    };

    if !metadata.is_file() {
        return Err(SupervisorError::NotAFile(path.to_path_buf()));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = metadata.permissions();
        if perms.mode() & 0o111 != 0o111 {
            perms.set_mode(perms.mode() | 0o755);
            if let Err(e) = tokio::fs::set_permissions(path, perms).await {
                warn!(path = %path.display(), "Could not mark backend executable: {}", e);
            }
        }
    }

    Ok(())
}
