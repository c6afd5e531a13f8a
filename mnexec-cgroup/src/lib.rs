//! Resource confinement: cgroup task membership and real-time scheduling
//!
//! Membership is written to the per-controller `tasks` files of the
//! cgroup v1 hierarchies mounted under [`CGROUP_ROOT`].

#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod controller;
pub mod sched;

pub use controller::CgroupTarget;
pub use sched::set_realtime;

// Re-export commonly used types
pub use mnexec_core::{CgroupName, RtPriority};

/// Default mount root of the controller hierarchies
pub const CGROUP_ROOT: &str = "/sys/fs/cgroup";

/// Controllers a group is joined in
pub const CONTROLLERS: [&str; 3] = ["cpu", "cpuacct", "cpuset"];
