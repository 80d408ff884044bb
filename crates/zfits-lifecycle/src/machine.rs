//! Guarded lifecycle state machine.
//!
//! The machine knows which [`Transition`] is legal from which
//! [`LifecycleState`] and nothing else. Side effects live behind
//! [`TransitionGuards`]: the machine runs the guard for a legal transition
//! and commits the target state only when the guard succeeds.

use serde::Serialize;
use strum::{Display, EnumIter, EnumString, IntoStaticStr};
use thiserror::Error;
use tracing::{debug, info, warn};
use zfits_supervisor::SupervisorError;

/// Log target for state machine activity.
pub const MACHINE_TARGET: &str = "zfits_lifecycle::machine";

/// States of the writer lifecycle.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumIter,
    EnumString,
    IntoStaticStr,
    Serialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    /// No writer is allocated.
    #[default]
    NotReady,
    /// A writer is running and configurable.
    Ready,
    /// A run is open but triggers are disabled.
    StandBy,
    /// Triggers are enabled.
    Running,
}

/// Commands that move the lifecycle between states.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumIter,
    EnumString,
    IntoStaticStr,
    Serialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    /// Start the writer.
    Allocate,
    /// Apply new writer options without a restart.
    Configure,
    /// Open a run.
    StartRun,
    /// Enable triggering.
    StartTrigger,
    /// Disable triggering.
    StopTrigger,
    /// Close the run.
    StopRun,
    /// Clear transient state.
    Reset,
    /// Stop the writer.
    Deallocate,
    /// Unwind from any state back to [`LifecycleState::NotReady`].
    Abort,
}

impl Transition {
    /// State reached by firing `self` from `from`, or `None` when the
    /// transition is not defined there.
    #[must_use]
    pub const fn target_from(self, from: LifecycleState) -> Option<LifecycleState> {
        use LifecycleState::{NotReady, Ready, Running, StandBy};

        match (self, from) {
            (Self::Allocate, NotReady)
            | (Self::Configure | Self::Reset, Ready)
            | (Self::StopRun, StandBy) => Some(Ready),
            (Self::StartRun, Ready) | (Self::StopTrigger, Running) => Some(StandBy),
            (Self::StartTrigger, StandBy) => Some(Running),
            (Self::Deallocate, Ready) | (Self::Abort, _) => Some(NotReady),
            _ => None,
        }
    }

    /// Steps replayed by [`Transition::Abort`] before the machine is forced
    /// to [`LifecycleState::NotReady`].
    #[must_use]
    pub const fn abort_unwind(from: LifecycleState) -> &'static [Self] {
        match from {
            LifecycleState::Running => &[Self::StopTrigger, Self::StopRun, Self::Reset],
            LifecycleState::StandBy => &[Self::StopRun, Self::Reset],
            LifecycleState::Ready => &[Self::Reset],
            LifecycleState::NotReady => &[],
        }
    }
}

/// Failure reported by a transition guard.
#[derive(Debug, Clone, Error)]
pub enum GuardError {
    /// The process supervisor refused or failed the request.
    #[error(transparent)]
    Supervisor(#[from] SupervisorError),
    /// The writer exited while it was expected to be starting up.
    #[error("writer '{label}' exited during the readiness delay")]
    WorkerExited {
        /// Label of the writer that exited.
        label: String,
    },
}

/// Reasons a transition did not happen.
#[derive(Debug, Clone, Error)]
pub enum TransitionError {
    /// The transition is not defined from the current state.
    #[error("{transition} is not permitted in state {from}")]
    NotPermitted {
        /// Requested transition.
        transition: Transition,
        /// State the machine was in.
        from: LifecycleState,
    },
    /// The guard refused the transition.
    #[error("{transition} rejected in state {from}: {source}")]
    Rejected {
        /// Requested transition.
        transition: Transition,
        /// State the machine stayed in.
        from: LifecycleState,
        /// Guard failure.
        #[source]
        source: GuardError,
    },
}

/// Side effects attached to each transition.
///
/// Every guard runs before the machine commits the target state; an error
/// leaves the machine where it was.
pub trait TransitionGuards {
    /// Runs before `NOT_READY -> READY`.
    fn allocate(&mut self) -> Result<(), GuardError>;
    /// Runs before `READY -> READY` on configure.
    fn configure(&mut self) -> Result<(), GuardError>;
    /// Runs before `READY -> STAND_BY`.
    fn start_run(&mut self) -> Result<(), GuardError>;
    /// Runs before `STAND_BY -> RUNNING`.
    fn start_trigger(&mut self) -> Result<(), GuardError>;
    /// Runs before `RUNNING -> STAND_BY`.
    fn stop_trigger(&mut self) -> Result<(), GuardError>;
    /// Runs before `STAND_BY -> READY`.
    fn stop_run(&mut self) -> Result<(), GuardError>;
    /// Runs before `READY -> READY` on reset.
    fn reset(&mut self) -> Result<(), GuardError>;
    /// Runs before `READY -> NOT_READY`.
    fn deallocate(&mut self) -> Result<(), GuardError>;

    /// Called after a state has been committed.
    fn on_enter(&mut self, state: LifecycleState) {
        let _ = state;
    }

    /// Called once the abort unwind has finished, before the machine is
    /// forced to `NOT_READY`.
    fn after_abort(&mut self) {}
}

/// Lifecycle state machine driving a set of guards.
#[derive(Debug)]
pub struct StateMachine<G> {
    state: LifecycleState,
    guards: G,
}

impl<G: TransitionGuards> StateMachine<G> {
    /// Creates a machine in [`LifecycleState::NotReady`].
    #[must_use]
    pub fn new(guards: G) -> Self {
        Self {
            state: LifecycleState::NotReady,
            guards,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> LifecycleState {
        self.state
    }

    /// Guards driven by the machine.
    #[must_use]
    pub const fn guards(&self) -> &G {
        &self.guards
    }

    /// Mutable access to the guards, for staging transition inputs.
    pub const fn guards_mut(&mut self) -> &mut G {
        &mut self.guards
    }

    /// Whether `transition` is defined from the current state.
    #[must_use]
    pub const fn can_fire(&self, transition: Transition) -> bool {
        transition.target_from(self.state).is_some()
    }

    /// Fires `transition`.
    ///
    /// [`Transition::Abort`] is delegated to [`Self::abort`] and always
    /// succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError::NotPermitted`] when the transition is not
    /// defined from the current state and [`TransitionError::Rejected`] when
    /// its guard fails. The state is unchanged in both cases.
    pub fn fire(&mut self, transition: Transition) -> Result<LifecycleState, TransitionError> {
        if transition == Transition::Abort {
            return Ok(self.abort());
        }
        let from = self.state;
        let Some(to) = transition.target_from(from) else {
            debug!(
                target: MACHINE_TARGET,
                %transition,
                %from,
                "transition not permitted"
            );
            return Err(TransitionError::NotPermitted { transition, from });
        };

        if let Err(source) = self.run_guard(transition) {
            warn!(
                target: MACHINE_TARGET,
                %transition,
                %from,
                error = %source,
                "transition guard failed"
            );
            return Err(TransitionError::Rejected {
                transition,
                from,
                source,
            });
        }

        self.commit(transition, to);
        Ok(to)
    }

    /// Unwinds to [`LifecycleState::NotReady`] from any state.
    ///
    /// The unwind replays the guards of [`Transition::abort_unwind`] in
    /// order. A failing step is logged and the unwind carries on from the
    /// step's target state.
    pub fn abort(&mut self) -> LifecycleState {
        let from = self.state;
        info!(target: MACHINE_TARGET, %from, "aborting");
        for &step in Transition::abort_unwind(from) {
            if let Err(error) = self.run_guard(step) {
                warn!(
                    target: MACHINE_TARGET,
                    transition = %step,
                    %error,
                    "abort step failed, continuing"
                );
            }
            if let Some(to) = step.target_from(self.state) {
                self.commit(step, to);
            }
        }
        self.guards.after_abort();
        self.commit(Transition::Abort, LifecycleState::NotReady);
        self.state
    }

    fn run_guard(&mut self, transition: Transition) -> Result<(), GuardError> {
        match transition {
            Transition::Allocate => self.guards.allocate(),
            Transition::Configure => self.guards.configure(),
            Transition::StartRun => self.guards.start_run(),
            Transition::StartTrigger => self.guards.start_trigger(),
            Transition::StopTrigger => self.guards.stop_trigger(),
            Transition::StopRun => self.guards.stop_run(),
            Transition::Reset => self.guards.reset(),
            Transition::Deallocate => self.guards.deallocate(),
            Transition::Abort => Ok(()),
        }
    }

    fn commit(&mut self, transition: Transition, to: LifecycleState) {
        debug!(
            target: MACHINE_TARGET,
            %transition,
            from = %self.state,
            %to,
            "transition committed"
        );
        self.state = to;
        self.guards.on_enter(to);
    }
}
