//! Process plumbing around the final exec
//!
//! This module uses `unsafe` for fork() and close(), both of which are
//! inherently unsafe but needed to hand a clean process to the command.

#![allow(unsafe_code)]

use std::convert::Infallible;
use std::ffi::CString;
use std::io::Write;
use std::os::fd::RawFd;

use mnexec_core::{Error, ProcessId, Result};
use nix::unistd::{ForkResult, fork, getpgrp, getpid, setsid};
use tracing::{debug, info};

/// Control byte that prefixes the pid line on stdout
pub const PID_MARKER: u8 = 0x01;

/// Descriptor limit assumed when `OPEN_MAX` cannot be queried
const FALLBACK_OPEN_MAX: RawFd = 1024;

/// Outcome of detaching from the controlling terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detach {
    /// The original process group leader; it should exit with status 0
    Parent,
    /// The detached process, now leading a new session
    Child,
}

/// Close every file descriptor except stdin, stdout and stderr
///
/// Returns the number of descriptors that were actually closed.
///
/// # Errors
/// Never fails today; the `Result` keeps the signature in line with the
/// other steps of the launch sequence.
pub fn close_descriptors() -> Result<usize> {
    let fds = match open_descriptors() {
        Ok(fds) => fds,
        Err(e) => {
            debug!(error = %e, "Cannot list /proc/self/fd, closing up to OPEN_MAX");
            // SAFETY: sysconf only reads a system limit
            let max = unsafe { libc::sysconf(libc::_SC_OPEN_MAX) };
            let max = RawFd::try_from(max)
                .ok()
                .filter(|max| *max > 0)
                .unwrap_or(FALLBACK_OPEN_MAX);
            (3..max).collect()
        }
    };

    let closed = fds
        .into_iter()
        .filter(|fd| *fd > 2)
        // SAFETY: nothing in this process uses descriptors above 2 past this
        // point. EBADF for a descriptor that is already gone is expected.
        .filter(|fd| unsafe { libc::close(*fd) } == 0)
        .count();

    debug!(closed, "Closed file descriptors");
    Ok(closed)
}

fn open_descriptors() -> std::io::Result<Vec<RawFd>> {
    Ok(std::fs::read_dir("/proc/self/fd")?
        .filter_map(|entry| entry.ok()?.file_name().to_str()?.parse().ok())
        .collect())
}

/// Drop the controlling terminal
///
/// setsid(2) refuses to run in a process group leader, so a leader forks
/// first and only the child goes on.
///
/// # Errors
/// Returns error if fork(2) or setsid(2) fails
pub fn detach_terminal() -> Result<Detach> {
    if getpgrp() == getpid() {
        std::io::stdout().flush()?;

        // SAFETY: the process is single-threaded at this point
        match unsafe { fork() }.map_err(Error::syscall("fork"))? {
            ForkResult::Parent { child } => {
                debug!(%child, "Process group leader forked detached child");
                return Ok(Detach::Parent);
            }
            ForkResult::Child => {}
        }
    }

    let session = setsid().map_err(Error::syscall("setsid"))?;
    debug!(%session, "Detached from controlling terminal");

    Ok(Detach::Child)
}

/// Write `^A<pid>\n` so a supervising caller can pick the pid out of the
/// command's own output
///
/// # Errors
/// Returns error if writing or flushing fails
pub fn write_pid_marker<W: Write>(out: &mut W, pid: ProcessId) -> std::io::Result<()> {
    out.write_all(&[PID_MARKER])?;
    writeln!(out, "{pid}")?;
    out.flush()
}

/// Print the pid marker on stdout
///
/// # Errors
/// Returns error if stdout is not writable
pub fn announce_pid(pid: ProcessId) -> Result<()> {
    write_pid_marker(&mut std::io::stdout().lock(), pid)?;
    debug!(%pid, "Announced pid");
    Ok(())
}

/// Replace the current process image with `command`
///
/// The program is looked up in `PATH`. Never returns on success.
///
/// # Errors
/// Returns error if the command is empty, contains a NUL byte, or cannot be
/// executed
pub fn exec_command(command: &[String]) -> Result<Infallible> {
    let program = command.first().ok_or_else(|| Error::InvalidConfig {
        message: "no command given".to_string(),
    })?;

    let args = to_cstrings(command)?;

    info!(command = %command.join(" "), "Executing");

    nix::unistd::execvp(&args[0], &args).map_err(|source| Error::Exec {
        command: program.clone(),
        source,
    })
}

fn to_cstrings(args: &[String]) -> Result<Vec<CString>> {
    args.iter()
        .map(|arg| {
            CString::new(arg.as_bytes()).map_err(|_| Error::InvalidConfig {
                message: format!("argument contains a NUL byte: {arg:?}"),
            })
        })
        .collect()
}
