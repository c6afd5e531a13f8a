//! Cgroup task membership

use std::fs::OpenOptions;
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

use mnexec_core::{CgroupName, Error, ProcessId, Result};
use tracing::{debug, info, warn};

/// A group to join, across every controller in [`CONTROLLERS`](crate::CONTROLLERS)
///
/// Paths look like `<root>/<controller>/<group>/tasks`, e.g.
/// `/sys/fs/cgroup/cpu/h1/tasks`.
#[derive(Debug, Clone)]
pub struct CgroupTarget {
    /// Mount root of the controller hierarchies
    root: PathBuf,

    /// Validated group name
    name: CgroupName,
}

impl CgroupTarget {
    /// Target `name` under the default root, `/sys/fs/cgroup`
    #[must_use]
    pub fn new(name: CgroupName) -> Self {
        Self::with_root(crate::CGROUP_ROOT, name)
    }

    /// Target `name` under a custom root
    #[must_use]
    pub fn with_root(root: impl Into<PathBuf>, name: CgroupName) -> Self {
        Self {
            root: root.into(),
            name,
        }
    }

    /// Task file of one controller
    #[must_use]
    pub fn tasks_path(&self, controller: &str) -> PathBuf {
        self.root
            .join(controller)
            .join(self.name.relative())
            .join("tasks")
    }

    /// Add `pid` to the group in every controller that accepts it
    ///
    /// A controller whose task file is missing or refuses the pid is
    /// skipped; an unconfigured cpuset, for one, rejects every write.
    /// Returns the number of controllers that accepted the pid.
    ///
    /// # Errors
    /// Returns [`Error::CgroupUnavailable`] if no controller accepted it
    pub fn add_process(&self, pid: ProcessId) -> Result<usize> {
        let mut joined = 0;

        for controller in crate::CONTROLLERS {
            let path = self.tasks_path(controller);

            match write_task(&path, pid) {
                Ok(()) => {
                    debug!(%pid, controller, path = %path.display(), "Added process to cgroup");
                    joined += 1;
                }
                Err(e) if is_missing(&e) => {
                    debug!(controller, path = %path.display(), "Controller not available, skipping");
                }
                Err(e) => {
                    warn!(%pid, controller, path = %path.display(), error = %e, "Controller rejected process, skipping");
                }
            }
        }

        if joined == 0 {
            return Err(Error::CgroupUnavailable {
                group: self.name.to_string(),
            });
        }

        info!(%pid, group = %self.name, controllers = joined, "Joined cgroup");
        Ok(joined)
    }

    /// Add the current process to the group
    ///
    /// # Errors
    /// See [`CgroupTarget::add_process`]
    pub fn join(&self) -> Result<usize> {
        self.add_process(ProcessId::current())
    }
}

/// The file is opened without `create`: a group that does not exist in this
/// controller shows up as `NotFound` or `ENOTDIR`.
fn write_task(path: &Path, pid: ProcessId) -> io::Result<()> {
    let mut file = OpenOptions::new().write(true).open(path)?;
    writeln!(file, "{pid}")
}

fn is_missing(e: &io::Error) -> bool {
    e.kind() == ErrorKind::NotFound || e.raw_os_error() == Some(libc::ENOTDIR)
}
