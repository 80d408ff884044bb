//! Signalling of whole process groups.
//!
//! The writer is launched as the leader of its own process group, so every
//! helper it forks can be reached with one `killpg(2)` call.

use std::io;

use strum::Display;

/// Signal delivered to a process group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum TreeSignal {
    /// Polite request to exit (`SIGTERM`).
    #[strum(serialize = "SIGTERM")]
    Terminate,
    /// Forced termination (`SIGKILL`).
    #[strum(serialize = "SIGKILL")]
    Kill,
}

/// Capability to signal a process group and check whether it is alive.
pub trait ProcessTreeTerminator: Send + Sync {
    /// Delivers `signal` to every member of `group`.
    ///
    /// Signalling a group that no longer exists succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error when the signal cannot be delivered, or when `group`
    /// is 0 or 1.
    fn signal(&self, group: u32, signal: TreeSignal) -> io::Result<()>;

    /// Reports whether any member of `group` is still alive.
    ///
    /// Members that have exited but have not been reaped count as alive.
    ///
    /// # Errors
    ///
    /// Returns an error when the group cannot be queried.
    fn is_alive(&self, group: u32) -> io::Result<bool>;
}

/// Terminator backed by `killpg(2)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SignalGroupTerminator;

fn checked_group(group: u32) -> io::Result<i32> {
    match i32::try_from(group) {
        Ok(raw) if raw > 1 => Ok(raw),
        _ => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("refusing to signal process group {group}"),
        )),
    }
}

#[cfg(unix)]
impl ProcessTreeTerminator for SignalGroupTerminator {
    fn signal(&self, group: u32, signal: TreeSignal) -> io::Result<()> {
        use nix::errno::Errno;
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        let pgid = Pid::from_raw(checked_group(group)?);
        let raw = match signal {
            TreeSignal::Terminate => Signal::SIGTERM,
            TreeSignal::Kill => Signal::SIGKILL,
        };
        match killpg(pgid, raw) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(errno) => Err(io::Error::from(errno)),
        }
    }

    fn is_alive(&self, group: u32) -> io::Result<bool> {
        use nix::errno::Errno;
        use nix::sys::signal::killpg;
        use nix::unistd::Pid;

        let pgid = Pid::from_raw(checked_group(group)?);
        match killpg(pgid, None) {
            Ok(()) | Err(Errno::EPERM) => Ok(true),
            Err(Errno::ESRCH) => Ok(false),
            Err(errno) => Err(io::Error::from(errno)),
        }
    }
}

#[cfg(not(unix))]
impl ProcessTreeTerminator for SignalGroupTerminator {
    fn signal(&self, group: u32, _signal: TreeSignal) -> io::Result<()> {
        checked_group(group)?;
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "process groups are only supported on Unix",
        ))
    }

    fn is_alive(&self, group: u32) -> io::Result<bool> {
        checked_group(group)?;
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "process groups are only supported on Unix",
        ))
    }
}
