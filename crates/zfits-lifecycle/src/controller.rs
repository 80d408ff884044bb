//! Command surface of the writer lifecycle.
//!
//! [`Controller`] serialises lifecycle commands through one
//! [`StateMachine`] whose guards ([`WriterGuards`]) drive a
//! [`WorkerSupervisor`]. Commands never fail: every call returns a
//! [`CommandOutcome`] describing whether it was accepted and where the
//! lifecycle ended up.

use std::mem;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};
use zfits_config::{Config, DEFAULT_READINESS_DELAY_MS};
use zfits_supervisor::{
    ProcessSupervisor, StopReport, SupervisorError, SupervisorSettings, WorkerInfo, WriterConfig,
    WriterOptions,
};

use crate::machine::{GuardError, LifecycleState, StateMachine, Transition, TransitionGuards};

/// Log target for controller activity.
pub const CONTROLLER_TARGET: &str = "zfits_lifecycle::controller";

/// Process operations the lifecycle guards rely on.
///
/// [`ProcessSupervisor`] is the production implementation.
pub trait WorkerSupervisor: Send + Sync {
    /// Launches the writer for `config`.
    ///
    /// # Errors
    ///
    /// Returns the supervisor's launch failure.
    fn start(&self, config: &WriterConfig) -> Result<WorkerInfo, SupervisorError>;

    /// Stops the live writer.
    ///
    /// # Errors
    ///
    /// Returns the supervisor's shutdown failure.
    fn stop(&self) -> Result<StopReport, SupervisorError>;

    /// Whether a writer is live.
    fn is_live(&self) -> bool;

    /// Checks without blocking whether the live writer has exited.
    ///
    /// # Errors
    ///
    /// Returns the supervisor's status query failure.
    fn has_exited(&self) -> Result<Option<bool>, SupervisorError>;

    /// Identity of the live writer.
    fn worker(&self) -> Option<WorkerInfo>;
}

impl WorkerSupervisor for ProcessSupervisor {
    fn start(&self, config: &WriterConfig) -> Result<WorkerInfo, SupervisorError> {
        Self::start(self, config)
    }

    fn stop(&self) -> Result<StopReport, SupervisorError> {
        Self::stop(self)
    }

    fn is_live(&self) -> bool {
        Self::is_live(self)
    }

    fn has_exited(&self) -> Result<Option<bool>, SupervisorError> {
        Self::has_exited(self)
    }

    fn worker(&self) -> Option<WorkerInfo> {
        Self::worker(self)
    }
}

/// Controller settings derived from the operator configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerSettings {
    /// Time granted to a freshly started writer before allocation succeeds.
    pub readiness_delay: Duration,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            readiness_delay: Duration::from_millis(DEFAULT_READINESS_DELAY_MS),
        }
    }
}

impl From<&Config> for ControllerSettings {
    fn from(config: &Config) -> Self {
        Self {
            readiness_delay: config.readiness_delay(),
        }
    }
}

/// Guards connecting lifecycle transitions to a writer supervisor.
#[derive(Debug)]
pub struct WriterGuards<S> {
    supervisor: Arc<S>,
    settings: ControllerSettings,
    config: WriterConfig,
    pending: WriterOptions,
    trigger_enabled: bool,
    run_number: Option<u32>,
}

impl<S: WorkerSupervisor> WriterGuards<S> {
    /// Creates guards around a shared `supervisor`.
    #[must_use]
    pub fn new(supervisor: Arc<S>, settings: ControllerSettings) -> Self {
        Self {
            supervisor,
            settings,
            config: WriterConfig::default(),
            pending: WriterOptions::new(),
            trigger_enabled: false,
            run_number: None,
        }
    }

    /// Writer configuration currently in effect.
    #[must_use]
    pub const fn config(&self) -> &WriterConfig {
        &self.config
    }

    /// Whether triggers are enabled.
    #[must_use]
    pub const fn trigger_enabled(&self) -> bool {
        self.trigger_enabled
    }

    /// Most recent run number, if one was announced since the last reset.
    #[must_use]
    pub const fn run_number(&self) -> Option<u32> {
        self.run_number
    }

    fn stage(&mut self, options: WriterOptions) {
        self.pending = options;
    }

    fn discard_staged(&mut self) {
        self.pending.clear();
    }

    fn update_run_number(&mut self, run_number: u32) -> bool {
        self.run_number = Some(run_number);
        self.config.update_run_number(run_number)
    }

    fn stop_exited_worker(&self, label: String) -> GuardError {
        if let Err(error) = self.supervisor.stop() {
            warn!(
                target: CONTROLLER_TARGET,
                worker = %label,
                %error,
                "failed to reap writer that exited during start-up"
            );
        }
        GuardError::WorkerExited { label }
    }
}

impl<S: WorkerSupervisor> TransitionGuards for WriterGuards<S> {
    fn allocate(&mut self) -> Result<(), GuardError> {
        let mut config = WriterConfig::default();
        let report = config.apply(mem::take(&mut self.pending));
        debug!(
            target: CONTROLLER_TARGET,
            applied = report.applied.len(),
            ignored = report.ignored.len(),
            rejected = report.rejected.len(),
            "allocate options applied"
        );

        let worker = self.supervisor.start(&config)?;
        self.config = config;
        thread::sleep(self.settings.readiness_delay);

        match self.supervisor.has_exited() {
            Ok(Some(true)) => Err(self.stop_exited_worker(worker.label)),
            Ok(_) => Ok(()),
            Err(error) => {
                warn!(
                    target: CONTROLLER_TARGET,
                    worker = %worker.label,
                    %error,
                    "could not confirm the writer survived start-up"
                );
                Ok(())
            }
        }
    }

    fn configure(&mut self) -> Result<(), GuardError> {
        let report = self.config.apply(mem::take(&mut self.pending));
        debug!(
            target: CONTROLLER_TARGET,
            applied = report.applied.len(),
            ignored = report.ignored.len(),
            rejected = report.rejected.len(),
            "writer configuration updated without restart"
        );
        Ok(())
    }

    fn start_run(&mut self) -> Result<(), GuardError> {
        debug!(
            target: CONTROLLER_TARGET,
            run_number = ?self.run_number,
            "preparing to persist events"
        );
        Ok(())
    }

    fn start_trigger(&mut self) -> Result<(), GuardError> {
        self.trigger_enabled = true;
        Ok(())
    }

    fn stop_trigger(&mut self) -> Result<(), GuardError> {
        self.trigger_enabled = false;
        Ok(())
    }

    fn stop_run(&mut self) -> Result<(), GuardError> {
        debug!(target: CONTROLLER_TARGET, run_number = ?self.run_number, "run finalised");
        Ok(())
    }

    fn reset(&mut self) -> Result<(), GuardError> {
        self.trigger_enabled = false;
        self.run_number = None;
        Ok(())
    }

    fn deallocate(&mut self) -> Result<(), GuardError> {
        let report = self.supervisor.stop()?;
        debug!(
            target: CONTROLLER_TARGET,
            pid = report.pid,
            escalated = report.escalated,
            "writer released"
        );
        Ok(())
    }

    fn on_enter(&mut self, state: LifecycleState) {
        info!(target: CONTROLLER_TARGET, %state, "entered state");
    }

    fn after_abort(&mut self) {
        if !self.supervisor.is_live() {
            return;
        }
        if let Err(error) = self.supervisor.stop() {
            warn!(
                target: CONTROLLER_TARGET,
                %error,
                "failed to stop writer during abort"
            );
        }
    }
}

/// Result of one lifecycle command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[must_use]
pub struct CommandOutcome {
    /// Command that was issued.
    pub command: Transition,
    /// Whether the command took effect.
    pub accepted: bool,
    /// State after the command.
    pub state: LifecycleState,
    /// Why the command was refused.
    pub reason: Option<String>,
}

/// Point-in-time view of the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControllerSnapshot {
    /// Current lifecycle state.
    pub state: LifecycleState,
    /// Live writer, if any.
    pub worker: Option<WorkerInfo>,
    /// Whether triggers are enabled.
    pub trigger_enabled: bool,
    /// Most recent run number since the last reset.
    pub run_number: Option<u32>,
    /// Arguments the current configuration renders to.
    pub writer_args: Vec<String>,
}

/// Lifecycle fields published after every command for lock-free reads.
#[derive(Debug, Clone)]
struct PublishedView {
    state: LifecycleState,
    trigger_enabled: bool,
    run_number: Option<u32>,
    writer_args: Vec<String>,
}

impl PublishedView {
    fn of<S: WorkerSupervisor>(machine: &StateMachine<WriterGuards<S>>) -> Self {
        let guards = machine.guards();
        Self {
            state: machine.state(),
            trigger_enabled: guards.trigger_enabled(),
            run_number: guards.run_number(),
            writer_args: guards.config().render_args(),
        }
    }
}

/// Thread-safe entry point for lifecycle commands.
///
/// Commands are serialised on one lock. [`Self::state`] and
/// [`Self::snapshot`] read the view published by the last completed command
/// and never wait on a command in flight, such as an allocate sitting out
/// its readiness delay.
#[derive(Debug)]
pub struct Controller<S = ProcessSupervisor> {
    machine: Mutex<StateMachine<WriterGuards<S>>>,
    view: Mutex<PublishedView>,
    supervisor: Arc<S>,
}

impl Controller<ProcessSupervisor> {
    /// Builds a controller around a [`ProcessSupervisor`] configured from
    /// the operator settings.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let supervisor = ProcessSupervisor::new(SupervisorSettings::from(config));
        Self::new(supervisor, ControllerSettings::from(config))
    }
}

impl<S: WorkerSupervisor> Controller<S> {
    /// Creates a controller in [`LifecycleState::NotReady`].
    #[must_use]
    pub fn new(supervisor: S, settings: ControllerSettings) -> Self {
        let supervisor = Arc::new(supervisor);
        let machine = StateMachine::new(WriterGuards::new(Arc::clone(&supervisor), settings));
        Self {
            view: Mutex::new(PublishedView::of(&machine)),
            machine: Mutex::new(machine),
            supervisor,
        }
    }

    /// Starts the writer with `options` layered over the default
    /// configuration.
    pub fn allocate(&self, options: WriterOptions) -> CommandOutcome {
        self.fire_with(Transition::Allocate, options)
    }

    /// Applies `options` to the current configuration without restarting
    /// the writer.
    pub fn configure(&self, options: WriterOptions) -> CommandOutcome {
        self.fire_with(Transition::Configure, options)
    }

    /// Opens a run.
    pub fn start_run(&self) -> CommandOutcome {
        self.execute(Transition::StartRun)
    }

    /// Enables triggering.
    pub fn start_trigger(&self) -> CommandOutcome {
        self.execute(Transition::StartTrigger)
    }

    /// Disables triggering.
    pub fn stop_trigger(&self) -> CommandOutcome {
        self.execute(Transition::StopTrigger)
    }

    /// Closes the run.
    pub fn stop_run(&self) -> CommandOutcome {
        self.execute(Transition::StopRun)
    }

    /// Clears the trigger flag and run number.
    pub fn reset(&self) -> CommandOutcome {
        self.execute(Transition::Reset)
    }

    /// Stops the writer.
    pub fn deallocate(&self) -> CommandOutcome {
        self.execute(Transition::Deallocate)
    }

    /// Unwinds to `NOT_READY` from any state, stopping a live writer.
    pub fn abort(&self) -> CommandOutcome {
        self.execute(Transition::Abort)
    }

    /// Fires `transition` with no options.
    pub fn execute(&self, transition: Transition) -> CommandOutcome {
        self.fire_with(transition, WriterOptions::new())
    }

    /// Lifecycle state after the last completed command.
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.lock_view().state
    }

    /// Captures the controller's observable state.
    ///
    /// Lifecycle fields reflect the last completed command; the worker is
    /// read from the supervisor directly.
    #[must_use]
    pub fn snapshot(&self) -> ControllerSnapshot {
        let view = self.lock_view().clone();
        ControllerSnapshot {
            state: view.state,
            worker: self.supervisor.worker(),
            trigger_enabled: view.trigger_enabled,
            run_number: view.run_number,
            writer_args: view.writer_args,
        }
    }

    /// Records the current run number and rewrites the writer suffix when
    /// run numbers are embedded in it.
    ///
    /// Returns whether the suffix was rewritten. The call bypasses the
    /// lifecycle, so it is accepted in every state.
    pub fn update_run_number(&self, run_number: u32) -> bool {
        let mut machine = self.lock_machine();
        let rewritten = machine.guards_mut().update_run_number(run_number);
        self.publish(&machine);
        drop(machine);
        debug!(
            target: CONTROLLER_TARGET,
            run_number,
            rewritten,
            "run number updated"
        );
        rewritten
    }

    fn fire_with(&self, transition: Transition, options: WriterOptions) -> CommandOutcome {
        let mut machine = self.lock_machine();
        machine.guards_mut().stage(options);
        let result = machine.fire(transition);
        machine.guards_mut().discard_staged();
        let state = machine.state();
        self.publish(&machine);
        drop(machine);

        match result {
            Ok(_) => CommandOutcome {
                command: transition,
                accepted: true,
                state,
                reason: None,
            },
            Err(error) => {
                info!(
                    target: CONTROLLER_TARGET,
                    %transition,
                    %state,
                    %error,
                    "command refused"
                );
                CommandOutcome {
                    command: transition,
                    accepted: false,
                    state,
                    reason: Some(error.to_string()),
                }
            }
        }
    }

    fn publish(&self, machine: &StateMachine<WriterGuards<S>>) {
        *self.lock_view() = PublishedView::of(machine);
    }

    fn lock_view(&self) -> MutexGuard<'_, PublishedView> {
        self.view.lock().unwrap_or_else(|poison| poison.into_inner())
    }

    fn lock_machine(&self) -> MutexGuard<'_, StateMachine<WriterGuards<S>>> {
        self.machine
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }
}
