//! CLI argument definitions

use std::path::PathBuf;

use clap::Parser;
use mnexec_cgroup::CGROUP_ROOT;

/// Execution utility for Mininet
///
/// Runs a command inside new or existing namespaces, optionally detached
/// from the tty, in a cgroup, and with real-time scheduling.
#[derive(Parser, Debug)]
#[command(name = "mnexec")]
#[command(about = "Execution utility for Mininet", long_about = None)]
#[command(override_usage = "mnexec [-cdnmPup] [-a pid] [-g group] [-r rtprio] cmd args...")]
pub struct Cli {
    /// Close all file descriptors except stdin/out/error
    #[arg(short = 'c')]
    pub close_fds: bool,

    /// Detach from tty by calling setsid()
    #[arg(short = 'd')]
    pub detach: bool,

    /// Run in new network namespace
    #[arg(short = 'n')]
    pub net: bool,

    /// Run in new mount namespace
    #[arg(short = 'm')]
    pub mount: bool,

    /// Run in new PID namespace
    #[arg(short = 'P')]
    pub pid_ns: bool,

    /// Run in new UTS namespace
    #[arg(short = 'u')]
    pub uts: bool,

    /// Print ^A + pid
    #[arg(short = 'p')]
    pub print_pid: bool,

    /// Attach to pid's namespaces (those selected by -n/-m/-P/-u, network and mount if none)
    #[arg(short = 'a', value_name = "PID")]
    pub attach: Option<String>,

    /// Add to cgroup
    #[arg(short = 'g', value_name = "GROUP")]
    pub group: Option<String>,

    /// Run with SCHED_RR (usually requires -g)
    #[arg(short = 'r', value_name = "RTPRIO")]
    pub rtprio: Option<i32>,

    /// Mount root of the cgroup controller hierarchies
    #[arg(long, env = "MNEXEC_CGROUP_ROOT", value_name = "DIR", default_value = CGROUP_ROOT)]
    pub cgroup_root: PathBuf,

    /// Enable debug logging on stderr
    #[arg(long)]
    pub verbose: bool,

    /// Print version
    #[arg(short = 'v', long = "version")]
    pub print_version: bool,

    /// Command to run, followed by its arguments
    #[arg(trailing_var_arg = true, value_name = "CMD")]
    pub command: Vec<String>,
}
