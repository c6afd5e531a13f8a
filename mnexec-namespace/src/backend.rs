//! Kernel backend trait for pluggable implementations

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use mnexec_core::{Error, ProcessId, Result};
use nix::mount::{MsFlags, mount};
use nix::sched::CloneFlags;

use crate::config::NamespaceKind;

/// Pseudo-filesystems that are remounted after creating a mount namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PseudoFs {
    /// `/proc`, reflects the PID namespace of the mounting process
    Proc,
    /// `/sys`, reflects the network namespace of the mounting process
    Sys,
}

impl PseudoFs {
    /// Filesystem type, also used as the mount source
    #[must_use]
    pub const fn fstype(self) -> &'static str {
        match self {
            Self::Proc => "proc",
            Self::Sys => "sysfs",
        }
    }

    /// Mount point
    #[must_use]
    pub const fn target(self) -> &'static str {
        match self {
            Self::Proc => "/proc",
            Self::Sys => "/sys",
        }
    }

    fn flags(self) -> MsFlags {
        match self {
            Self::Proc => MsFlags::MS_NOSUID | MsFlags::MS_NODEV | MsFlags::MS_NOEXEC,
            Self::Sys => MsFlags::empty(),
        }
    }
}

/// Trait for the namespace-related system calls
///
/// This allows for different implementations:
/// - [`KernelBackend`] - Production, talks to the kernel
/// - [`MockBackend`] - Testing without privileges, with failure injection
pub trait NamespaceBackend {
    /// Handle identifying one namespace of a target process
    type Handle;

    /// Detach from the current namespaces of every kind in `flags` at once
    ///
    /// # Errors
    /// Returns error if unshare(2) fails
    fn unshare(&self, flags: CloneFlags) -> Result<()>;

    /// Open `pid`'s namespace of the given kind
    ///
    /// # Errors
    /// Returns error if the namespace file cannot be opened
    fn open(&self, pid: ProcessId, kind: NamespaceKind) -> Result<Self::Handle>;

    /// Join the namespace behind `handle`
    ///
    /// # Errors
    /// Returns error if setns(2) fails
    fn join(&self, handle: Self::Handle, kind: NamespaceKind) -> Result<()>;

    /// Change the root directory
    ///
    /// # Errors
    /// Returns error if chroot(2) fails
    fn change_root(&self, path: &Path) -> Result<()>;

    /// Current working directory
    ///
    /// # Errors
    /// Returns error if getcwd(3) fails
    fn current_dir(&self) -> Result<PathBuf>;

    /// Change the working directory
    ///
    /// # Errors
    /// Returns error if chdir(2) fails
    fn change_dir(&self, path: &Path) -> Result<()>;

    /// Mark the whole mount hierarchy recursively private
    ///
    /// # Errors
    /// Returns error if mount(2) fails
    fn make_private(&self) -> Result<()>;

    /// Mount a fresh instance of a pseudo-filesystem over its mount point
    ///
    /// # Errors
    /// Returns error if mount(2) fails
    fn remount(&self, fs: PseudoFs) -> Result<()>;
}

/// Path of `pid`'s namespace file for `kind`
#[must_use]
pub fn namespace_path(pid: ProcessId, kind: NamespaceKind) -> PathBuf {
    PathBuf::from(format!("/proc/{pid}/ns/{}", kind.proc_name()))
}

/// Path of `pid`'s root directory, used when a mount namespace cannot be joined
#[must_use]
pub fn root_path(pid: ProcessId) -> PathBuf {
    PathBuf::from(format!("/proc/{pid}/root"))
}

/// Production backend
#[derive(Debug, Clone, Copy, Default)]
pub struct KernelBackend;

impl NamespaceBackend for KernelBackend {
    type Handle = File;

    fn unshare(&self, flags: CloneFlags) -> Result<()> {
        nix::sched::unshare(flags).map_err(Error::syscall("unshare"))
    }

    fn open(&self, pid: ProcessId, kind: NamespaceKind) -> Result<File> {
        let path = namespace_path(pid, kind);
        File::open(&path).map_err(Error::path(path))
    }

    fn join(&self, handle: File, kind: NamespaceKind) -> Result<()> {
        nix::sched::setns(handle, kind.clone_flag()).map_err(Error::syscall(format!("setns {kind}")))
    }

    fn change_root(&self, path: &Path) -> Result<()> {
        nix::unistd::chroot(path).map_err(Error::syscall(format!("chroot {}", path.display())))
    }

    fn current_dir(&self) -> Result<PathBuf> {
        nix::unistd::getcwd().map_err(Error::syscall("getcwd"))
    }

    fn change_dir(&self, path: &Path) -> Result<()> {
        nix::unistd::chdir(path).map_err(Error::syscall(format!("chdir {}", path.display())))
    }

    fn make_private(&self) -> Result<()> {
        mount(
            None::<&str>,
            "/",
            None::<&str>,
            MsFlags::MS_REC | MsFlags::MS_PRIVATE,
            None::<&str>,
        )
        .map_err(Error::syscall("set / to private"))
    }

    fn remount(&self, fs: PseudoFs) -> Result<()> {
        mount(
            Some(fs.fstype()),
            fs.target(),
            Some(fs.fstype()),
            fs.flags(),
            None::<&str>,
        )
        .map_err(Error::syscall(format!("mount {}", fs.target())))
    }
}

/// A backend call recorded by [`MockBackend`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    /// unshare(2)
    Unshare(CloneFlags),
    /// Namespace file opened
    Open(ProcessId, NamespaceKind),
    /// setns(2)
    Join(NamespaceKind),
    /// chroot(2)
    ChangeRoot(PathBuf),
    /// getcwd(3)
    CurrentDir,
    /// chdir(2)
    ChangeDir(PathBuf),
    /// Mount propagation set to private
    MakePrivate,
    /// Pseudo-filesystem mounted
    Remount(PseudoFs),
}

/// Mock backend for testing (doesn't touch the kernel)
///
/// Every call is recorded. Failures can be injected per operation, and the
/// working directory is reset to `/` whenever the root or mount namespace
/// changes, the way a real chroot or setns can leave it.
///
/// # Example
/// ```
/// use mnexec_namespace::backend::{Call, MockBackend, NamespaceBackend};
/// use nix::sched::CloneFlags;
///
/// let backend = MockBackend::new();
/// backend.unshare(CloneFlags::CLONE_NEWNET).unwrap();
///
/// assert_eq!(backend.calls(), vec![Call::Unshare(CloneFlags::CLONE_NEWNET)]);
/// ```
#[derive(Clone)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

struct MockState {
    calls: Vec<Call>,
    cwd: PathBuf,
    fail_unshare: bool,
    fail_open: Vec<NamespaceKind>,
    fail_join: Vec<NamespaceKind>,
    fail_change_root: bool,
    fail_make_private: bool,
    fail_remount: Vec<PseudoFs>,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            calls: Vec::new(),
            cwd: PathBuf::from("/"),
            fail_unshare: false,
            fail_open: Vec::new(),
            fail_join: Vec::new(),
            fail_change_root: false,
            fail_make_private: false,
            fail_remount: Vec::new(),
        }
    }
}

impl MockBackend {
    /// Create a new mock backend
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start in the given working directory
    #[must_use]
    pub fn with_cwd(self, cwd: impl Into<PathBuf>) -> Self {
        self.state().cwd = cwd.into();
        self
    }

    /// Make unshare(2) fail with `EPERM`
    #[must_use]
    pub fn failing_unshare(self) -> Self {
        self.state().fail_unshare = true;
        self
    }

    /// Make opening the namespace file of `kind` fail with `ENOENT`
    #[must_use]
    pub fn failing_open(self, kind: NamespaceKind) -> Self {
        self.state().fail_open.push(kind);
        self
    }

    /// Make setns(2) for `kind` fail with `EINVAL`
    #[must_use]
    pub fn failing_join(self, kind: NamespaceKind) -> Self {
        self.state().fail_join.push(kind);
        self
    }

    /// Make chroot(2) fail with `EPERM`
    #[must_use]
    pub fn failing_change_root(self) -> Self {
        self.state().fail_change_root = true;
        self
    }

    /// Make the recursive private remount of `/` fail with `EPERM`
    #[must_use]
    pub fn failing_make_private(self) -> Self {
        self.state().fail_make_private = true;
        self
    }

    /// Make mounting `fs` fail with `EPERM`
    #[must_use]
    pub fn failing_remount(self, fs: PseudoFs) -> Self {
        self.state().fail_remount.push(fs);
        self
    }

    /// Calls made so far, in order
    #[must_use]
    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    /// Working directory as the mock currently sees it
    #[must_use]
    pub fn cwd(&self) -> PathBuf {
        self.state().cwd.clone()
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MockBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockBackend").finish_non_exhaustive()
    }
}

impl NamespaceBackend for MockBackend {
    type Handle = NamespaceKind;

    fn unshare(&self, flags: CloneFlags) -> Result<()> {
        let mut state = self.state();
        state.calls.push(Call::Unshare(flags));

        if state.fail_unshare {
            return Err(Error::syscall("unshare")(nix::Error::EPERM));
        }

        tracing::debug!(?flags, "Mock: unshare");
        Ok(())
    }

    fn open(&self, pid: ProcessId, kind: NamespaceKind) -> Result<NamespaceKind> {
        let mut state = self.state();
        state.calls.push(Call::Open(pid, kind));

        if state.fail_open.contains(&kind) {
            let source = std::io::Error::from(std::io::ErrorKind::NotFound);
            return Err(Error::path(namespace_path(pid, kind))(source));
        }

        Ok(kind)
    }

    fn join(&self, handle: NamespaceKind, kind: NamespaceKind) -> Result<()> {
        let mut state = self.state();
        state.calls.push(Call::Join(kind));

        if state.fail_join.contains(&handle) {
            return Err(Error::syscall(format!("setns {kind}"))(nix::Error::EINVAL));
        }

        if kind == NamespaceKind::Mount {
            state.cwd = PathBuf::from("/");
        }

        tracing::debug!(%kind, "Mock: joined namespace");
        Ok(())
    }

    fn change_root(&self, path: &Path) -> Result<()> {
        let mut state = self.state();
        state.calls.push(Call::ChangeRoot(path.to_path_buf()));

        if state.fail_change_root {
            return Err(Error::syscall(format!("chroot {}", path.display()))(
                nix::Error::EPERM,
            ));
        }

        state.cwd = PathBuf::from("/");
        Ok(())
    }

    fn current_dir(&self) -> Result<PathBuf> {
        let mut state = self.state();
        state.calls.push(Call::CurrentDir);
        Ok(state.cwd.clone())
    }

    fn change_dir(&self, path: &Path) -> Result<()> {
        let mut state = self.state();
        state.calls.push(Call::ChangeDir(path.to_path_buf()));
        state.cwd = path.to_path_buf();
        Ok(())
    }

    fn make_private(&self) -> Result<()> {
        let mut state = self.state();
        state.calls.push(Call::MakePrivate);

        if state.fail_make_private {
            return Err(Error::syscall("set / to private")(nix::Error::EPERM));
        }

        Ok(())
    }

    fn remount(&self, fs: PseudoFs) -> Result<()> {
        let mut state = self.state();
        state.calls.push(Call::Remount(fs));

        if state.fail_remount.contains(&fs) {
            return Err(Error::syscall(format!("mount {}", fs.target()))(nix::Error::EPERM));
        }

        Ok(())
    }
}
