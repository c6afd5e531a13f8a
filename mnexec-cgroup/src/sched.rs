//! Real-time scheduling class

#![allow(unsafe_code)]

use mnexec_core::{Error, RtPriority, Result};
use tracing::debug;

/// Switch the current process to `SCHED_RR` with the given priority
///
/// nix has no wrapper for sched_setscheduler(2), so this goes through libc.
///
/// # Errors
/// Returns error if the kernel refuses, usually `EPERM` without
/// `CAP_SYS_NICE` or `EINVAL` for a priority above the RR maximum
pub fn set_realtime(priority: RtPriority) -> Result<()> {
    let param = libc::sched_param {
        sched_priority: priority.as_raw(),
    };

    // SAFETY: param is a valid sched_param that outlives the call; pid 0
    // means the calling process.
    let rc = unsafe { libc::sched_setscheduler(0, libc::SCHED_RR, &param) };
    if rc != 0 {
        return Err(Error::syscall("sched_setscheduler")(nix::Error::last()));
    }

    debug!(%priority, "Switched to SCHED_RR");
    Ok(())
}
