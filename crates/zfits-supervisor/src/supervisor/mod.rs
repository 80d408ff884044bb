//! Ownership of the single live writer process.
//!
//! [`ProcessSupervisor`] spawns the writer from a [`WriterConfig`], keeps
//! its output drained in the background, and tears down the writer's whole
//! process group on [`ProcessSupervisor::stop`]. At most one writer is live
//! per supervisor. All methods take `&self`, so the supervisor can be shared
//! across threads and stopped from any of them.

mod shutdown;
mod spawn;

use std::process::{Child, ExitStatus};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::{debug, info, warn};
use zfits_config::{Config, DEFAULT_SHUTDOWN_GRACE_MS};

use crate::drain::{DrainEnd, DrainTask, OutputSink, TracingSink};
use crate::error::SupervisorError;
use crate::terminate::{ProcessTreeTerminator, SignalGroupTerminator};
use crate::writer::WriterConfig;

/// Log target for process supervision.
pub const PROCESS_TARGET: &str = "zfits_supervisor::process";

/// Interval between liveness checks while waiting for the writer to exit.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Launch settings for the writer process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorSettings {
    binary: Utf8PathBuf,
    shutdown_grace: Duration,
}

impl SupervisorSettings {
    /// Settings for `binary` with the default grace period.
    #[must_use]
    pub fn new(binary: impl Into<Utf8PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            shutdown_grace: Duration::from_millis(DEFAULT_SHUTDOWN_GRACE_MS),
        }
    }

    /// Replaces the grace period between SIGTERM and SIGKILL.
    #[must_use]
    pub const fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Writer executable.
    #[must_use]
    pub fn binary(&self) -> &Utf8Path {
        &self.binary
    }

    /// Grace period between SIGTERM and SIGKILL.
    #[must_use]
    pub const fn shutdown_grace(&self) -> Duration {
        self.shutdown_grace
    }
}

impl From<&Config> for SupervisorSettings {
    fn from(config: &Config) -> Self {
        Self::new(config.writer_binary().clone()).with_shutdown_grace(config.shutdown_grace())
    }
}

/// Identity of a live writer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerInfo {
    /// Process id of the writer.
    pub pid: u32,
    /// Process group led by the writer.
    pub pgid: u32,
    /// Label attached to the writer's log lines.
    pub label: String,
}

impl WorkerInfo {
    fn new(binary: &Utf8Path, config: &WriterConfig, pid: u32) -> Self {
        let name = binary.file_name().unwrap_or(binary.as_str());
        let label = config
            .id()
            .map_or_else(|| format!("{name}:{pid}"), |id| format!("{name}:{id}"));
        Self {
            pid,
            pgid: pid,
            label,
        }
    }
}

/// Outcome of [`ProcessSupervisor::stop`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopReport {
    /// Process id of the stopped writer.
    pub pid: u32,
    /// Exit status collected when the writer was reaped.
    pub status: ExitStatus,
    /// Whether the group had to be sent SIGKILL.
    pub escalated: bool,
    /// Why the output drain stopped, or `None` if its thread panicked.
    pub drain: Option<DrainEnd>,
}

struct LiveWorker {
    info: WorkerInfo,
    child: Child,
    drain: DrainTask,
}

/// Spawns, monitors and terminates the writer process.
pub struct ProcessSupervisor {
    settings: SupervisorSettings,
    terminator: Arc<dyn ProcessTreeTerminator>,
    sink: Arc<dyn OutputSink>,
    worker: Mutex<Option<LiveWorker>>,
}

impl std::fmt::Debug for ProcessSupervisor {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ProcessSupervisor")
            .field("settings", &self.settings)
            .field("worker", &self.worker().map(|info| info.label))
            .finish_non_exhaustive()
    }
}

impl ProcessSupervisor {
    /// Builds a supervisor that logs writer output through `tracing` and
    /// terminates process groups with `killpg(2)`.
    #[must_use]
    pub fn new(settings: SupervisorSettings) -> Self {
        Self {
            settings,
            terminator: Arc::new(SignalGroupTerminator),
            sink: Arc::new(TracingSink),
            worker: Mutex::new(None),
        }
    }

    /// Replaces the destination of writer output.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn OutputSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Replaces the process-group terminator.
    #[must_use]
    pub fn with_terminator(mut self, terminator: Arc<dyn ProcessTreeTerminator>) -> Self {
        self.terminator = terminator;
        self
    }

    /// Launch settings in use.
    #[must_use]
    pub const fn settings(&self) -> &SupervisorSettings {
        &self.settings
    }

    /// Launches the writer for `config` and starts draining its output.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::InvalidState`] when a writer is already
    /// live (the live writer is left untouched),
    /// [`SupervisorError::InvalidConfig`] when a required field is unset,
    /// [`SupervisorError::Spawn`] when the executable cannot be started, and
    /// [`SupervisorError::Io`] when the output pipe or drain thread cannot
    /// be set up. On error no writer is left running.
    pub fn start(&self, config: &WriterConfig) -> Result<WorkerInfo, SupervisorError> {
        let mut slot = self.lock_worker();
        if let Some(live) = slot.as_ref() {
            return Err(SupervisorError::InvalidState {
                operation: "start",
                reason: format!("writer '{}' is already running", live.info.label),
            });
        }
        config.validate()?;

        let args = config.render_args();
        let (mut child, output) = spawn::spawn_writer(&self.settings.binary, &args)?;
        let info = WorkerInfo::new(&self.settings.binary, config, child.id());

        let drain = match DrainTask::spawn(&info.label, output, Arc::clone(&self.sink)) {
            Ok(drain) => drain,
            Err(error) => {
                warn!(
                    target: PROCESS_TARGET,
                    worker = %info.label,
                    %error,
                    "failed to start output drain, killing writer"
                );
                drop(shutdown::terminate_group(
                    &mut child,
                    &info,
                    self.terminator.as_ref(),
                    Duration::ZERO,
                ));
                return Err(SupervisorError::io("failed to start output drain", error));
            }
        };

        info!(
            target: PROCESS_TARGET,
            worker = %info.label,
            pid = info.pid,
            "writer started"
        );
        *slot = Some(LiveWorker {
            info: info.clone(),
            child,
            drain,
        });
        Ok(info)
    }

    /// Terminates the live writer's process group and joins its drain.
    ///
    /// The writer is released from the supervisor before termination
    /// starts, so a failed stop still leaves the supervisor idle.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::InvalidState`] when no writer is live and
    /// [`SupervisorError::Shutdown`] when the writer cannot be reaped.
    pub fn stop(&self) -> Result<StopReport, SupervisorError> {
        let LiveWorker {
            info,
            mut child,
            drain,
        } = self
            .lock_worker()
            .take()
            .ok_or_else(|| SupervisorError::not_running("stop"))?;

        debug!(target: PROCESS_TARGET, worker = %info.label, "stopping writer");
        let terminated = shutdown::terminate_group(
            &mut child,
            &info,
            self.terminator.as_ref(),
            self.settings.shutdown_grace,
        );
        let drain = drain.finish();
        let termination = terminated?;

        info!(
            target: PROCESS_TARGET,
            worker = %info.label,
            status = %termination.status,
            escalated = termination.escalated,
            "writer stopped"
        );
        Ok(StopReport {
            pid: info.pid,
            status: termination.status,
            escalated: termination.escalated,
            drain,
        })
    }

    /// Whether a writer is currently owned by the supervisor.
    ///
    /// A writer that exited on its own stays owned until [`Self::stop`]
    /// reaps it; see [`Self::has_exited`].
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.lock_worker().is_some()
    }

    /// Identity of the live writer, if any.
    #[must_use]
    pub fn worker(&self) -> Option<WorkerInfo> {
        self.lock_worker().as_ref().map(|live| live.info.clone())
    }

    /// Checks without blocking whether the live writer has exited.
    ///
    /// Returns `Ok(None)` when no writer is live.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::Io`] when the writer's status cannot be
    /// queried.
    pub fn has_exited(&self) -> Result<Option<bool>, SupervisorError> {
        let mut slot = self.lock_worker();
        let Some(live) = slot.as_mut() else {
            return Ok(None);
        };
        live.child
            .try_wait()
            .map(|status| Some(status.is_some()))
            .map_err(|error| SupervisorError::io("failed to query writer status", error))
    }

    fn lock_worker(&self) -> MutexGuard<'_, Option<LiveWorker>> {
        self.worker
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }
}

impl Drop for ProcessSupervisor {
    fn drop(&mut self) {
        if !self.is_live() {
            return;
        }
        if let Err(error) = self.stop() {
            warn!(
                target: PROCESS_TARGET,
                %error,
                "failed to stop writer while dropping supervisor"
            );
        }
    }
}
