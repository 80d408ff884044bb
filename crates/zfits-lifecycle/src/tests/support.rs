//! Shared doubles for lifecycle tests.

use std::fs;
use std::os::unix::fs::PermissionsExt;

use camino::Utf8PathBuf;
use once_cell::sync::Lazy;
use tempfile::TempDir;
use zfits_supervisor::SupervisorError;

use crate::machine::{GuardError, LifecycleState, TransitionGuards};

/// Writer stand-ins written once, before any test in this binary spawns.
pub(crate) struct Scripts {
    _dir: TempDir,
    /// Stays up until signalled.
    pub(crate) steady: Utf8PathBuf,
    /// Exits straight away.
    pub(crate) crashing: Utf8PathBuf,
}

pub(crate) static SCRIPTS: Lazy<Scripts> = Lazy::new(|| {
    let dir = tempfile::tempdir().expect("create script dir");
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 temp dir");
    let write = |name: &str, body: &str| {
        let path = root.join(name);
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod script");
        path
    };
    Scripts {
        steady: write("ZFitsWriter", "echo \"listening with $*\"\nexec sleep 30"),
        crashing: write("crashing", "echo 'cannot open input' >&2\nexit 1"),
        _dir: dir,
    }
});

/// Guard calls observed by [`RecordingGuards`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Call {
    Guard(&'static str),
    Entered(LifecycleState),
    AfterAbort,
}

/// Guards that record every call and can be told to fail one guard.
#[derive(Debug, Default)]
pub(crate) struct RecordingGuards {
    calls: Vec<Call>,
    failing: Option<&'static str>,
}

impl RecordingGuards {
    pub(crate) fn failing(guard: &'static str) -> Self {
        Self {
            failing: Some(guard),
            ..Self::default()
        }
    }

    pub(crate) fn calls(&self) -> &[Call] {
        &self.calls
    }

    pub(crate) fn guard_calls(&self) -> Vec<&'static str> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                Call::Guard(name) => Some(*name),
                Call::Entered(_) | Call::AfterAbort => None,
            })
            .collect()
    }

    pub(crate) fn clear(&mut self) {
        self.calls.clear();
    }

    fn record(&mut self, name: &'static str) -> Result<(), GuardError> {
        self.calls.push(Call::Guard(name));
        if self.failing == Some(name) {
            return Err(GuardError::Supervisor(SupervisorError::InvalidState {
                operation: "stop",
                reason: format!("{name} forced to fail"),
            }));
        }
        Ok(())
    }
}

impl TransitionGuards for RecordingGuards {
    fn allocate(&mut self) -> Result<(), GuardError> {
        self.record("allocate")
    }

    fn configure(&mut self) -> Result<(), GuardError> {
        self.record("configure")
    }

    fn start_run(&mut self) -> Result<(), GuardError> {
        self.record("start_run")
    }

    fn start_trigger(&mut self) -> Result<(), GuardError> {
        self.record("start_trigger")
    }

    fn stop_trigger(&mut self) -> Result<(), GuardError> {
        self.record("stop_trigger")
    }

    fn stop_run(&mut self) -> Result<(), GuardError> {
        self.record("stop_run")
    }

    fn reset(&mut self) -> Result<(), GuardError> {
        self.record("reset")
    }

    fn deallocate(&mut self) -> Result<(), GuardError> {
        self.record("deallocate")
    }

    fn on_enter(&mut self, state: LifecycleState) {
        self.calls.push(Call::Entered(state));
    }

    fn after_abort(&mut self) {
        self.calls.push(Call::AfterAbort);
    }
}
