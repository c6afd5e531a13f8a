//! Namespace creation and attachment

use std::path::Path;

use mnexec_core::{ProcessId, Result};
use tracing::{debug, info};

use crate::backend::{KernelBackend, NamespaceBackend, PseudoFs, root_path};
use crate::config::{NamespaceKind, NamespaceMode, NamespaceRequest, NamespaceSet};

/// What is left to do once the namespaces are in place
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Binding {
    needs_fork: bool,
    deferred_proc: bool,
}

impl Binding {
    /// A PID namespace was created or joined; only a forked child runs inside it
    #[must_use]
    pub const fn needs_fork(&self) -> bool {
        self.needs_fork
    }

    /// `/proc` still has to be remounted by the forked child
    #[must_use]
    pub const fn deferred_proc(&self) -> bool {
        self.deferred_proc
    }
}

/// Establishes namespace membership for the current process
#[derive(Debug, Default)]
pub struct NamespaceBinder<B = KernelBackend> {
    backend: B,
}

impl NamespaceBinder<KernelBackend> {
    /// Binder that talks to the kernel
    #[must_use]
    pub const fn kernel() -> Self {
        Self {
            backend: KernelBackend,
        }
    }
}

impl<B: NamespaceBackend> NamespaceBinder<B> {
    /// Create a binder on top of the given backend
    #[must_use]
    pub const fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Get the backend
    #[must_use]
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// Create or join the requested namespaces
    ///
    /// # Errors
    /// Returns error on the first failing step. Effects of earlier steps stay
    /// in place; the caller is expected to exit.
    pub fn bind(&self, request: &NamespaceRequest) -> Result<Binding> {
        if request.is_empty() {
            debug!("No namespaces requested");
            return Ok(Binding::default());
        }

        match request.mode {
            NamespaceMode::Create => self.create(request.kinds),
            NamespaceMode::Attach(pid) => self.attach(pid, request.kinds),
        }
    }

    /// Work that must run in the forked child of a PID namespace
    ///
    /// # Errors
    /// Returns error if `/proc` cannot be remounted
    pub fn settle_child(&self, binding: &Binding) -> Result<()> {
        if binding.deferred_proc {
            self.backend.remount(PseudoFs::Proc)?;
            debug!("Remounted /proc inside new PID namespace");
        }

        Ok(())
    }

    /// All kinds go to the kernel in one unshare(2): it either creates every
    /// one of them or none.
    fn create(&self, kinds: NamespaceSet) -> Result<Binding> {
        info!(namespaces = ?kinds.names(), "Creating namespaces");

        self.backend.unshare(kinds.to_clone_flags())?;

        let mut binding = Binding {
            needs_fork: kinds.contains(NamespaceKind::Pid),
            deferred_proc: false,
        };

        if kinds.contains(NamespaceKind::Mount) {
            self.backend.make_private()?;
            debug!("Mount hierarchy marked private");

            if kinds.contains(NamespaceKind::Network) {
                self.backend.remount(PseudoFs::Sys)?;
                debug!("Remounted /sys for new network namespace");
            }

            // proc shows the PID namespace of whoever mounts it, which is
            // the child after the fork
            if binding.needs_fork {
                binding.deferred_proc = true;
            } else {
                self.backend.remount(PseudoFs::Proc)?;
                debug!("Remounted /proc");
            }
        }

        Ok(binding)
    }

    fn attach(&self, pid: ProcessId, kinds: NamespaceSet) -> Result<Binding> {
        info!(%pid, namespaces = ?kinds.names(), "Attaching to namespaces");

        let cwd = if kinds.contains(NamespaceKind::Mount) {
            Some(self.backend.current_dir()?)
        } else {
            None
        };

        // Open everything up front, while /proc/<pid> still resolves in our
        // own mount table.
        let mut handles = Vec::new();
        let mut mount_handle = None;
        for kind in kinds.iter() {
            if kind == NamespaceKind::Mount {
                mount_handle = Some(self.backend.open(pid, kind));
            } else {
                handles.push((kind, self.backend.open(pid, kind)?));
            }
        }

        for (kind, handle) in handles {
            self.backend.join(handle, kind)?;
            debug!(%pid, %kind, "Joined namespace");
        }

        if let (Some(handle), Some(cwd)) = (mount_handle, cwd) {
            self.enter_mount(pid, handle, &cwd)?;
        }

        Ok(Binding {
            needs_fork: kinds.contains(NamespaceKind::Pid),
            deferred_proc: false,
        })
    }

    /// setns into the mount namespace, or chroot into the target's root when
    /// that is not possible. Either way the working directory captured
    /// beforehand is restored.
    fn enter_mount(&self, pid: ProcessId, handle: Result<B::Handle>, cwd: &Path) -> Result<()> {
        let joined = handle.and_then(|handle| self.backend.join(handle, NamespaceKind::Mount));

        match joined {
            Ok(()) => debug!(%pid, "Joined mount namespace"),
            Err(e) => {
                let root = root_path(pid);
                info!(%pid, error = %e, root = %root.display(), "Cannot join mount namespace, changing root instead");
                self.backend.change_root(&root)?;
            }
        }

        self.backend.change_dir(cwd)?;
        debug!(cwd = %cwd.display(), "Restored working directory");

        Ok(())
    }
}
