//! Graceful-then-forced termination of the writer's process group.

use std::process::{Child, ExitStatus};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::{POLL_INTERVAL, PROCESS_TARGET, WorkerInfo};
use crate::error::SupervisorError;
use crate::terminate::{ProcessTreeTerminator, TreeSignal};

/// How the process group went away.
#[derive(Debug)]
pub(super) struct Termination {
    pub(super) status: ExitStatus,
    pub(super) escalated: bool,
}

/// Sends SIGTERM to the group, waits up to `grace` for the leader to be
/// reaped and the group to empty, then falls back to SIGKILL.
pub(super) fn terminate_group(
    child: &mut Child,
    worker: &WorkerInfo,
    terminator: &dyn ProcessTreeTerminator,
    grace: Duration,
) -> Result<Termination, SupervisorError> {
    let mut status = None;
    let mut escalated = false;

    match terminator.signal(worker.pgid, TreeSignal::Terminate) {
        Ok(()) => {
            debug!(
                target: PROCESS_TARGET,
                worker = %worker.label,
                pgid = worker.pgid,
                grace_ms = grace.as_millis(),
                "sent SIGTERM to writer group"
            );
            status = wait_for_group(child, worker, terminator, grace);
        }
        Err(error) => warn!(
            target: PROCESS_TARGET,
            worker = %worker.label,
            %error,
            "failed to send SIGTERM to writer group"
        ),
    }

    if status.is_none() || group_alive(terminator, worker) {
        warn!(
            target: PROCESS_TARGET,
            worker = %worker.label,
            pgid = worker.pgid,
            "writer group outlived its grace period, sending SIGKILL"
        );
        escalated = true;
        if let Err(error) = terminator.signal(worker.pgid, TreeSignal::Kill) {
            warn!(
                target: PROCESS_TARGET,
                worker = %worker.label,
                %error,
                "failed to send SIGKILL to writer group, killing leader only"
            );
            drop(child.kill());
        }
    }

    let reaped = match status {
        Some(reaped) => reaped,
        None => child.wait().map_err(|error| SupervisorError::Shutdown {
            pid: worker.pid,
            message: "failed to reap writer".to_owned(),
            source: Some(Arc::new(error)),
        })?,
    };
    Ok(Termination {
        status: reaped,
        escalated,
    })
}

fn wait_for_group(
    child: &mut Child,
    worker: &WorkerInfo,
    terminator: &dyn ProcessTreeTerminator,
    grace: Duration,
) -> Option<ExitStatus> {
    let deadline = Instant::now() + grace;
    let mut status = None;
    loop {
        if status.is_none() {
            match child.try_wait() {
                Ok(reaped) => status = reaped,
                Err(error) => warn!(
                    target: PROCESS_TARGET,
                    worker = %worker.label,
                    %error,
                    "failed to poll writer status"
                ),
            }
        }
        if status.is_some() && !group_alive(terminator, worker) {
            return status;
        }
        if Instant::now() >= deadline {
            return status;
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// A failed liveness check counts as alive so the caller escalates.
fn group_alive(terminator: &dyn ProcessTreeTerminator, worker: &WorkerInfo) -> bool {
    match terminator.is_alive(worker.pgid) {
        Ok(alive) => alive,
        Err(error) => {
            warn!(
                target: PROCESS_TARGET,
                worker = %worker.label,
                %error,
                "failed to check writer group"
            );
            true
        }
    }
}
