//! Storage helper process lifecycle.
//!
//! [`open`] turns a [`Request`] into a running helper with its stdout wrapped
//! as a [`BsonSource`] and its stdin as a [`BsonSink`]. The helper's stderr
//! is copied to our own stderr by a detached thread so diagnostics stay
//! visible and a chatty helper never blocks on a full pipe.
//!
//! # Process Cleanup Safety
//!
//! [`ShimProcess`] owns the child. Waiting is cached, so the exit status is
//! observed once and reported on every later wait. Dropping a handle that
//! was never waited kills and reaps the child to avoid zombies.

use std::ffi::OsString;
use std::io;
use std::path::Path;
use std::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command, ExitStatus, Stdio};
use std::thread;

use tracing::{debug, warn};

use crate::args::{build_args, Request};
use crate::error::{Result, ShimError, SpawnStep};
use crate::framing::{BsonSink, BsonSource, RawDocSource};

/// Document stream read from the helper's stdout.
///
/// The pipe is read unbuffered: each record is assembled with exact-size
/// reads, so nothing past the current record is pulled from the helper.
pub type HelperOutput = BsonSource<ChildStdout>;

/// Document stream written to the helper's stdin.
pub type HelperInput = BsonSink<ChildStdin>;

/// A running (or finished) storage helper.
pub struct ShimProcess {
    child: Child,
    status: Option<ExitStatus>,
}

impl ShimProcess {
    fn new(child: Child) -> Self {
        Self {
            child,
            status: None,
        }
    }

    /// OS process id of the helper.
    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// Block until the helper exits; an unsuccessful exit is an error.
    ///
    /// Safe to call repeatedly.
    pub fn wait(&mut self) -> Result<()> {
        let status = match self.status {
            Some(status) => status,
            None => {
                let status = self.child.wait().map_err(ShimError::Wait)?;
                debug!(pid = self.child.id(), %status, "storage helper exited");
                self.status = Some(status);
                status
            }
        };

        if status.success() {
            Ok(())
        } else {
            Err(ShimError::Exit { status })
        }
    }

    /// Kill the helper if it is still running.
    pub fn kill(&mut self) -> Result<()> {
        if self.status.is_some() {
            return Ok(());
        }
        match self.child.kill() {
            Ok(()) => Ok(()),
            // Already exited but not yet reaped.
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => Ok(()),
            Err(e) => Err(ShimError::Wait(e)),
        }
    }
}

impl Drop for ShimProcess {
    fn drop(&mut self) {
        if self.status.is_some() {
            return;
        }
        match self.child.try_wait() {
            Ok(Some(_)) => {}
            Ok(None) => {
                warn!(pid = self.child.id(), "storage helper dropped while running, killing");
                let _ = self.child.kill();
                let _ = self.child.wait();
            }
            Err(e) => warn!(pid = self.child.id(), "Error waiting for storage helper: {}", e),
        }
    }
}

/// Handles to a freshly started helper.
pub struct Launched {
    /// Documents the helper writes.
    pub output: HelperOutput,
    /// Documents for the helper to read (insert mode).
    pub input: HelperInput,
    /// The helper process.
    pub process: ShimProcess,
}

/// Build the request's arguments and start the helper.
pub fn open(helper: &Path, request: &Request) -> Result<Launched> {
    let args = build_args(request)?;
    spawn_helper(helper, &args)
}

/// Start `helper` with `args` and wire its standard streams.
///
/// Fails before handing out any stream if a pipe is missing or the process
/// cannot be started.
pub fn spawn_helper(helper: &Path, args: &[OsString]) -> Result<Launched> {
    debug!(helper = %helper.display(), ?args, "starting storage helper");

    let child = Command::new(helper)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| ShimError::Spawn {
            step: SpawnStep::Start,
            source,
        })?;

    // Owned from here on so any failure below still reaps the child.
    let mut process = ShimProcess::new(child);

    let stdout = process
        .child
        .stdout
        .take()
        .ok_or_else(|| missing_pipe(SpawnStep::Stdout))?;
    let stderr = process
        .child
        .stderr
        .take()
        .ok_or_else(|| missing_pipe(SpawnStep::Stderr))?;
    let stdin = process
        .child
        .stdin
        .take()
        .ok_or_else(|| missing_pipe(SpawnStep::Stdin))?;

    drain_stderr(stderr, process.id()).map_err(|source| ShimError::Spawn {
        step: SpawnStep::Stderr,
        source,
    })?;

    debug!(pid = process.id(), "storage helper started");

    Ok(Launched {
        output: BsonSource::new(stdout),
        input: BsonSink::new(stdin),
        process,
    })
}

fn missing_pipe(step: SpawnStep) -> ShimError {
    ShimError::Spawn {
        step,
        source: io::Error::new(io::ErrorKind::BrokenPipe, "pipe was not captured"),
    }
}

/// Copy the helper's stderr to ours on a detached thread.
///
/// The thread is never joined: it ends on its own when the helper exits and
/// the pipe reaches EOF.
fn drain_stderr(mut stderr: ChildStderr, pid: u32) -> io::Result<()> {
    thread::Builder::new()
        .name(format!("shim-stderr-{pid}"))
        .spawn(move || {
            if let Err(e) = io::copy(&mut stderr, &mut io::stderr()) {
                debug!(pid, "storage helper stderr drain stopped: {}", e);
            }
        })?;
    Ok(())
}

/// A helper's output stream bound to its process.
///
/// Closing releases the stream first, then waits on the helper. A stream
/// error takes priority; otherwise an unsuccessful exit is reported.
pub struct ShimDocSource {
    stream: HelperOutput,
    process: ShimProcess,
}

impl ShimDocSource {
    /// Bind an output stream to the process that writes it.
    pub fn new(stream: HelperOutput, process: ShimProcess) -> Self {
        Self { stream, process }
    }

    /// Kill the helper; the next read sees end of stream.
    pub fn kill(&mut self) -> Result<()> {
        self.process.kill()
    }
}

impl RawDocSource for ShimDocSource {
    fn load_next_into(&mut self, buf: &mut Vec<u8>) -> Option<usize> {
        self.stream.load_next_into(buf)
    }

    fn err(&self) -> Option<&ShimError> {
        self.stream.err()
    }

    fn close(self) -> Result<()> {
        let ShimDocSource {
            stream,
            mut process,
        } = self;
        let closed = stream.close();
        let exited = process.wait();
        closed.and(exited)
    }
}
