//! Background draining of the writer's combined output stream.
//!
//! Each live writer owns exactly one [`DrainTask`]: a dedicated thread that
//! reads the joined stdout/stderr pipe line by line and hands every line to
//! an [`OutputSink`]. The thread keeps reading regardless of what the sink
//! does with a line, so the writer never stalls on a full pipe buffer.
//!
//! Reads only start once `poll(2)` reports the pipe readable, which lets
//! the stop flag end the drain while a process that left the writer's
//! group still holds the pipe open.

use std::io::{self, PipeReader, Read};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::thread::{self, JoinHandle};

use tracing::{debug, info, warn};

/// Log target for lines forwarded from the writer.
pub const WORKER_TARGET: &str = "zfits_supervisor::worker";

/// Why a drain task stopped reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainEnd {
    /// Every writer end of the pipe was closed.
    EndOfStream,
    /// The supervisor raised the stop flag.
    Stopped,
    /// Reading the pipe failed.
    ReadFailed,
}

/// Destination for the writer's output lines.
///
/// Implementations are called from the drain thread and must return
/// promptly; anything slow belongs behind a channel such as [`ChannelSink`].
pub trait OutputSink: Send + Sync {
    /// Receives one line of output, without its line terminator.
    fn forward(&self, worker: &str, line: &str);

    /// Called once after the drain task stops reading.
    fn closed(&self, worker: &str, end: DrainEnd) {
        let _ = (worker, end);
    }
}

/// Forwards writer output to `tracing` at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl OutputSink for TracingSink {
    fn forward(&self, worker: &str, line: &str) {
        info!(target: WORKER_TARGET, worker, line, "writer output");
    }

    fn closed(&self, worker: &str, end: DrainEnd) {
        debug!(target: WORKER_TARGET, worker, ?end, "writer output drained");
    }
}

/// A line captured from a writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputEvent {
    /// One line of output.
    Line {
        /// Label of the writer that produced the line.
        worker: String,
        /// Line content without the terminator.
        text: String,
    },
    /// The drain task finished.
    Closed {
        /// Label of the drained writer.
        worker: String,
        /// Why draining stopped.
        end: DrainEnd,
    },
}

/// Hands writer output to an unbounded channel.
///
/// Sending never blocks, so a slow consumer cannot back-pressure the drain.
/// Events are dropped once the receiver is gone.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: Sender<OutputEvent>,
}

impl ChannelSink {
    /// Wraps the sending half of a channel.
    #[must_use]
    pub const fn new(sender: Sender<OutputEvent>) -> Self {
        Self { sender }
    }
}

impl OutputSink for ChannelSink {
    fn forward(&self, worker: &str, line: &str) {
        drop(self.sender.send(OutputEvent::Line {
            worker: worker.to_owned(),
            text: line.to_owned(),
        }));
    }

    fn closed(&self, worker: &str, end: DrainEnd) {
        drop(self.sender.send(OutputEvent::Closed {
            worker: worker.to_owned(),
            end,
        }));
    }
}

/// Longest single wait on the pipe before the stop flag is re-checked.
const POLL_MS: u16 = 50;

/// Reads still taken after the stop flag is raised, while output left in
/// the pipe is readable without waiting.
const STOP_SWEEP_LIMIT: usize = 64;

/// Handle on a running drain thread.
///
/// Dropping the handle raises the stop flag and joins the thread, so the
/// drain never outlives its owner on any exit path.
#[derive(Debug)]
pub(crate) struct DrainTask {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<DrainEnd>>,
}

impl DrainTask {
    /// Starts draining `stream` on a dedicated thread.
    pub(crate) fn spawn(
        label: &str,
        stream: PipeReader,
        sink: Arc<dyn OutputSink>,
    ) -> io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let worker = label.to_owned();
        let handle = thread::Builder::new()
            .name(format!("drain-{label}"))
            .spawn(move || drain_lines(&worker, stream, &flag, sink.as_ref()))?;
        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    /// Raises the stop flag and waits for the thread to finish.
    ///
    /// The wait is bounded even while another process still holds the
    /// pipe's write end.
    pub(crate) fn finish(mut self) -> Option<DrainEnd> {
        self.stop_and_join()
    }

    fn stop_and_join(&mut self) -> Option<DrainEnd> {
        self.stop.store(true, Ordering::SeqCst);
        let handle = self.handle.take()?;
        match handle.join() {
            Ok(end) => Some(end),
            Err(_) => {
                warn!(target: WORKER_TARGET, "drain thread panicked");
                None
            }
        }
    }
}

impl Drop for DrainTask {
    fn drop(&mut self) {
        drop(self.stop_and_join());
    }
}

fn drain_lines(
    worker: &str,
    mut stream: PipeReader,
    stop: &AtomicBool,
    sink: &dyn OutputSink,
) -> DrainEnd {
    let mut pending = Vec::new();
    let mut chunk = [0_u8; 4096];
    let mut swept = 0;
    let end = loop {
        let stopping = stop.load(Ordering::SeqCst);
        match wait_readable(&stream, if stopping { 0 } else { POLL_MS }) {
            Ok(true) => {}
            Ok(false) if stopping => break DrainEnd::Stopped,
            Ok(false) => continue,
            Err(error) => {
                warn!(target: WORKER_TARGET, worker, %error, "failed to wait for writer output");
                break DrainEnd::ReadFailed;
            }
        }
        if stopping {
            if swept == STOP_SWEEP_LIMIT {
                break DrainEnd::Stopped;
            }
            swept += 1;
        }
        match stream.read(&mut chunk) {
            Ok(0) => break DrainEnd::EndOfStream,
            Ok(read) => {
                pending.extend_from_slice(chunk.get(..read).unwrap_or_default());
                forward_complete_lines(worker, &mut pending, sink);
            }
            Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
            Err(error) => {
                warn!(target: WORKER_TARGET, worker, %error, "failed to read writer output");
                break DrainEnd::ReadFailed;
            }
        }
    };
    if !pending.is_empty() {
        forward_line(worker, &pending, sink);
    }
    sink.closed(worker, end);
    end
}

fn forward_complete_lines(worker: &str, pending: &mut Vec<u8>, sink: &dyn OutputSink) {
    while let Some(newline) = pending.iter().position(|byte| *byte == b'\n') {
        let line: Vec<u8> = pending.drain(..=newline).collect();
        forward_line(worker, &line, sink);
    }
}

fn forward_line(worker: &str, line: &[u8], sink: &dyn OutputSink) {
    let text = String::from_utf8_lossy(line);
    sink.forward(worker, text.trim_end_matches(['\n', '\r']));
}

/// Waits up to `timeout_ms` for the pipe to become readable or hang up.
#[cfg(unix)]
fn wait_readable(stream: &PipeReader, timeout_ms: u16) -> io::Result<bool> {
    use std::os::fd::AsFd;

    use nix::errno::Errno;
    use nix::poll::{PollFd, PollFlags, poll};

    let mut fds = [PollFd::new(stream.as_fd(), PollFlags::POLLIN)];
    match poll(&mut fds, timeout_ms) {
        Ok(ready) => Ok(ready > 0),
        Err(Errno::EINTR) => Ok(false),
        Err(errno) => Err(io::Error::from(errno)),
    }
}

/// Without `poll(2)` the drain falls back to blocking reads.
#[cfg(not(unix))]
fn wait_readable(_stream: &PipeReader, _timeout_ms: u16) -> io::Result<bool> {
    Ok(true)
}
