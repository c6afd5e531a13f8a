//! Resolved invocation

use mnexec_cgroup::CgroupTarget;
use mnexec_core::{CgroupName, Error, ProcessId, Result, RtPriority};
use mnexec_namespace::{NamespaceKind, NamespaceRequest, NamespaceSet};

use crate::cli::Cli;

/// Everything one mnexec run is going to do
///
/// Built once from the command line; all validation happens here, before any
/// system call with side effects.
#[derive(Debug, Clone)]
pub struct InvocationConfig {
    /// Close descriptors above stderr
    pub close_fds: bool,
    /// Drop the controlling terminal
    pub detach_tty: bool,
    /// Namespaces to create or join
    pub namespaces: NamespaceRequest,
    /// Cgroup to join
    pub cgroup: Option<CgroupTarget>,
    /// `SCHED_RR` priority
    pub rt_priority: Option<RtPriority>,
    /// Print `^A<pid>` on stdout
    pub print_pid: bool,
    /// Program and arguments
    pub command: Vec<String>,
}

impl InvocationConfig {
    /// Validate and resolve parsed arguments
    ///
    /// # Errors
    /// Returns a configuration error for an invalid cgroup name, pid or
    /// priority, or a missing command
    pub fn from_cli(cli: Cli) -> Result<Self> {
        let cgroup = cli
            .group
            .map(CgroupName::new)
            .transpose()?
            .map(|name| CgroupTarget::with_root(cli.cgroup_root, name));

        let kinds = NamespaceSet::new()
            .with_if(NamespaceKind::Network, cli.net)
            .with_if(NamespaceKind::Mount, cli.mount)
            .with_if(NamespaceKind::Pid, cli.pid_ns)
            .with_if(NamespaceKind::Uts, cli.uts);

        let namespaces = match cli.attach {
            Some(pid) => NamespaceRequest::attach(pid.parse::<ProcessId>()?, kinds),
            None => NamespaceRequest::create(kinds),
        };

        let rt_priority = cli.rtprio.map(RtPriority::new).transpose()?;

        if cli.command.is_empty() {
            return Err(Error::InvalidConfig {
                message: "no command given".to_string(),
            });
        }

        Ok(Self {
            close_fds: cli.close_fds,
            detach_tty: cli.detach,
            namespaces,
            cgroup,
            rt_priority,
            print_pid: cli.print_pid,
            command: cli.command,
        })
    }
}
