//! PID namespace fork point
//!
//! The process that creates (or joins) a PID namespace stays outside of it;
//! only its next child is born inside. The supervisor forks that child and
//! has the parent wait for it.
//!
//! This module uses `unsafe` for fork(), which is sound here because mnexec
//! never starts a second thread.

#![allow(unsafe_code)]

use std::io::Write;

use mnexec_core::{Error, ProcessId, Result};
use nix::errno::Errno;
use nix::sys::wait::{WaitStatus, waitpid};
use nix::unistd::{ForkResult, fork};
use tracing::{debug, info, warn};

/// Outcome of the PID namespace fork
#[derive(Debug)]
pub enum Checkpoint {
    /// We are the child; continue towards exec
    Child,
    /// We are the parent; wait for the child and exit
    Parent(ProcessHandle),
}

/// The child forked into the PID namespace
///
/// Owned by the parent branch only and consumed by [`ProcessHandle::wait`].
#[derive(Debug)]
#[must_use = "the child must be waited for"]
pub struct ProcessHandle {
    pid: ProcessId,
}

impl ProcessHandle {
    /// Child pid, as seen from the parent
    pub const fn pid(&self) -> ProcessId {
        self.pid
    }

    /// Block until the child terminates
    ///
    /// Returns the child's exit status, or `128 + signal` if it was killed.
    ///
    /// # Errors
    /// Returns error if waitpid(2) fails for a reason other than `EINTR`
    pub fn wait(self) -> Result<i32> {
        debug!(child = %self.pid, "Waiting for child to exit");

        loop {
            match waitpid(self.pid.as_nix_pid(), None) {
                Ok(WaitStatus::Exited(_, code)) => {
                    info!(child = %self.pid, code, "Child exited");
                    return Ok(code);
                }
                Ok(WaitStatus::Signaled(_, signal, _)) => {
                    warn!(child = %self.pid, ?signal, "Child terminated by signal");
                    return Ok(128 + signal as i32);
                }
                Ok(status) => {
                    debug!(?status, "Child status changed");
                }
                Err(Errno::EINTR) => {}
                Err(e) => return Err(Error::syscall("waitpid")(e)),
            }
        }
    }
}

/// Fork so that the child runs inside the PID namespace
///
/// Standard output is flushed first so buffered bytes are not written twice.
///
/// # Errors
/// Returns error if flushing stdout or fork(2) fails
pub fn fork_into_namespace() -> Result<Checkpoint> {
    std::io::stdout().flush()?;

    // SAFETY: the process is single-threaded, so the child cannot inherit a
    // lock held by another thread.
    match unsafe { fork() }.map_err(Error::syscall("fork"))? {
        ForkResult::Parent { child } => {
            debug!(%child, "Forked PID namespace child");
            Ok(Checkpoint::Parent(ProcessHandle { pid: child.into() }))
        }
        ForkResult::Child => Ok(Checkpoint::Child),
    }
}
