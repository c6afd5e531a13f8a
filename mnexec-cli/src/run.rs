//! Launch sequence
//!
//! close fds → detach → namespaces → PID namespace fork → cgroup/RT → exec.
//! Two steps fork; at each of them the parent leaves the sequence with an
//! exit code and only the child goes on.

use anyhow::Result;
use mnexec_cgroup::set_realtime;
use mnexec_core::ProcessId;
use mnexec_namespace::executor::{self, Detach};
use mnexec_namespace::supervisor::{self, Checkpoint};
use mnexec_namespace::NamespaceBinder;
use tracing::{debug, info};

use crate::config::InvocationConfig;

/// Run the launch sequence
///
/// Returns only when this process should exit with the returned code;
/// on success the last step replaces the process image.
pub fn execute(config: InvocationConfig) -> Result<i32> {
    debug!(?config, "Resolved invocation");

    if config.close_fds {
        executor::close_descriptors()?;
    }

    if config.detach_tty && executor::detach_terminal()? == Detach::Parent {
        return Ok(0);
    }

    let binder = NamespaceBinder::kernel();
    let binding = binder.bind(&config.namespaces)?;

    if binding.needs_fork() {
        match supervisor::fork_into_namespace()? {
            Checkpoint::Parent(child) => {
                if config.print_pid {
                    executor::announce_pid(child.pid())?;
                }
                let code = child.wait()?;
                info!(code, "PID namespace child finished");
                return Ok(code);
            }
            Checkpoint::Child => binder.settle_child(&binding)?,
        }
    } else if config.print_pid {
        executor::announce_pid(ProcessId::current())?;
    }

    confine(&config)?;

    match executor::exec_command(&config.command)? {}
}

/// Cgroup and scheduling changes for the process that is about to exec
fn confine(config: &InvocationConfig) -> Result<()> {
    if let Some(cgroup) = &config.cgroup {
        cgroup.join()?;
    }

    if let Some(priority) = config.rt_priority {
        set_realtime(priority)?;
    }

    Ok(())
}
