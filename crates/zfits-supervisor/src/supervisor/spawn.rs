//! Launching the writer process.

use std::io::{self, PipeReader};
use std::process::{Child, Command, Stdio};
use std::sync::Arc;

use camino::Utf8Path;
use tracing::debug;

use super::PROCESS_TARGET;
use crate::error::SupervisorError;

/// Spawns `binary` with `args` as the leader of a new process group.
///
/// stdout and stderr share one pipe whose read end is returned alongside
/// the child. The parent's copies of the write end are closed before this
/// returns, so the reader sees end-of-stream once the writer and every
/// process it forked have exited.
pub(super) fn spawn_writer(
    binary: &Utf8Path,
    args: &[String],
) -> Result<(Child, PipeReader), SupervisorError> {
    debug!(
        target: PROCESS_TARGET,
        binary = %binary,
        ?args,
        "spawning writer process"
    );

    let (reader, writer) =
        io::pipe().map_err(|error| SupervisorError::io("failed to create output pipe", error))?;
    let stderr = writer
        .try_clone()
        .map_err(|error| SupervisorError::io("failed to share output pipe", error))?;

    let mut command = Command::new(binary.as_std_path());
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(writer)
        .stderr(stderr);
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }

    let spawned = command.spawn();
    drop(command);
    let child = spawned.map_err(|error| spawn_error(binary, error))?;

    debug!(
        target: PROCESS_TARGET,
        binary = %binary,
        pid = child.id(),
        "writer process spawned"
    );
    Ok((child, reader))
}

fn spawn_error(binary: &Utf8Path, error: io::Error) -> SupervisorError {
    let message = if error.kind() == io::ErrorKind::NotFound {
        "executable not found".to_owned()
    } else {
        format!("failed to start: {error}")
    };
    SupervisorError::Spawn {
        binary: binary.to_string(),
        message,
        source: Arc::new(error),
    }
}
