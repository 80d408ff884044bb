//! Lifecycle control of the ZFits writer.
//!
//! A camera server allocates, configures, runs and releases its writer
//! through a fixed set of commands. This crate models those commands as a
//! guarded state machine over four states:
//!
//! ```text
//!            allocate              start_run             start_trigger
//! NOT_READY ----------> READY ----------------> STAND_BY --------------> RUNNING
//!           <----------  |  <----------------           <--------------
//!            deallocate  |       stop_run                 stop_trigger
//!                        +-- configure / reset (READY -> READY)
//! ```
//!
//! `abort` unwinds from any state back to `NOT_READY`.
//!
//! [`Controller`] is the entry point. It owns a [`StateMachine`] whose
//! guards start and stop the writer through a [`WorkerSupervisor`], by
//! default a [`zfits_supervisor::ProcessSupervisor`].
//!
//! # Example
//!
//! ```rust,no_run
//! use zfits_config::Config;
//! use zfits_lifecycle::{Controller, LifecycleState, telemetry};
//! use zfits_supervisor::{ConfigValue, WriterOptions};
//!
//! let config = Config::default();
//! telemetry::initialise(&config).expect("telemetry installs");
//!
//! let controller = Controller::from_config(&config);
//! let options = WriterOptions::from([("output_dir".to_owned(), ConfigValue::from("/data/out"))]);
//! let outcome = controller.allocate(options);
//! assert_eq!(outcome.state, LifecycleState::Ready);
//! assert!(controller.abort().accepted);
//! ```

pub mod controller;
pub mod machine;
pub mod telemetry;

#[cfg(test)]
mod tests;

pub use self::controller::{
    CommandOutcome, Controller, ControllerSettings, ControllerSnapshot, WorkerSupervisor,
    WriterGuards,
};
pub use self::machine::{
    GuardError, LifecycleState, StateMachine, Transition, TransitionError, TransitionGuards,
};
pub use self::telemetry::{TelemetryError, TelemetryHandle};
