//! Supervision of the ZFits compressed stream writer.
//!
//! The writer is an external executable that reads camera events from a
//! stream and writes compressed FITS files. This crate owns everything
//! needed to run one instance of it:
//!
//! - [`WriterConfig`] holds the writer's parameters, accepts flat option
//!   updates and renders them into command-line arguments.
//! - [`ProcessSupervisor`] launches the writer as the leader of its own
//!   process group, drains its combined stdout/stderr on a background
//!   thread, and tears the whole group down with SIGTERM followed by
//!   SIGKILL once the grace period runs out.
//! - [`OutputSink`] decides where the writer's output lines go; the
//!   default [`TracingSink`] logs them on the `zfits_supervisor::worker`
//!   target.
//!
//! # Example
//!
//! ```rust,no_run
//! use zfits_supervisor::{ConfigValue, ProcessSupervisor, SupervisorSettings, WriterConfig};
//!
//! let mut config = WriterConfig::default();
//! config.apply([("output_dir", ConfigValue::from("/data/out"))]);
//!
//! let supervisor = ProcessSupervisor::new(SupervisorSettings::new("ZFitsWriter"));
//! let worker = supervisor.start(&config).expect("writer starts");
//! println!("writer {} running", worker.label);
//! let report = supervisor.stop().expect("writer stops");
//! assert!(!report.escalated);
//! ```

pub mod drain;
pub mod error;
pub mod supervisor;
pub mod terminate;
pub mod writer;

pub use self::drain::{ChannelSink, DrainEnd, OutputEvent, OutputSink, TracingSink};
pub use self::error::{ConfigError, SupervisorError};
pub use self::supervisor::{ProcessSupervisor, StopReport, SupervisorSettings, WorkerInfo};
pub use self::terminate::{ProcessTreeTerminator, SignalGroupTerminator, TreeSignal};
pub use self::writer::{
    ApplyReport, CompressionScheme, ConfigValue, FieldKind, WriterConfig, WriterField,
    WriterOptions, parse_options,
};
