//! Namespace selection

use std::fmt;

use mnexec_core::ProcessId;
use nix::sched::CloneFlags;

/// The namespace kinds mnexec knows how to create or join
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NamespaceKind {
    /// Network stack
    Network,
    /// Hostname and domain name
    Uts,
    /// Process ids
    Pid,
    /// Mount table
    Mount,
}

impl NamespaceKind {
    /// Join order for attach mode.
    ///
    /// Mount goes last: once the mount table changes, `/proc` may no longer
    /// describe the process we are attaching to.
    pub const ALL: [Self; 4] = [Self::Network, Self::Uts, Self::Pid, Self::Mount];

    /// Name of the entry under `/proc/<pid>/ns`
    #[must_use]
    pub const fn proc_name(self) -> &'static str {
        match self {
            Self::Network => "net",
            Self::Uts => "uts",
            Self::Pid => "pid",
            Self::Mount => "mnt",
        }
    }

    /// Clone flag used by unshare(2) and setns(2)
    #[must_use]
    pub const fn clone_flag(self) -> CloneFlags {
        match self {
            Self::Network => CloneFlags::CLONE_NEWNET,
            Self::Uts => CloneFlags::CLONE_NEWUTS,
            Self::Pid => CloneFlags::CLONE_NEWPID,
            Self::Mount => CloneFlags::CLONE_NEWNS,
        }
    }

    const fn bit(self) -> u8 {
        match self {
            Self::Network => 0b0001,
            Self::Uts => 0b0010,
            Self::Pid => 0b0100,
            Self::Mount => 0b1000,
        }
    }
}

impl fmt::Display for NamespaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.proc_name())
    }
}

/// Set of requested namespace kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NamespaceSet(u8);

impl NamespaceSet {
    /// No namespaces
    pub const NONE: Self = Self(0);

    /// Network and mount, the default attach set
    pub const NET_MNT: Self = Self(0b1001);

    /// Create an empty set
    #[must_use]
    pub const fn new() -> Self {
        Self::NONE
    }

    /// Add a namespace kind
    #[must_use]
    pub const fn with(self, kind: NamespaceKind) -> Self {
        Self(self.0 | kind.bit())
    }

    /// Add a namespace kind when `enable` is set
    #[must_use]
    pub const fn with_if(self, kind: NamespaceKind, enable: bool) -> Self {
        if enable { self.with(kind) } else { self }
    }

    /// Check if a kind is requested
    #[must_use]
    pub const fn contains(self, kind: NamespaceKind) -> bool {
        self.0 & kind.bit() != 0
    }

    /// Check if nothing is requested
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Requested kinds, in join order
    pub fn iter(self) -> impl Iterator<Item = NamespaceKind> {
        NamespaceKind::ALL
            .into_iter()
            .filter(move |kind| self.contains(*kind))
    }

    /// Convert to clone flags for unshare(2)
    #[must_use]
    pub fn to_clone_flags(self) -> CloneFlags {
        self.iter()
            .fold(CloneFlags::empty(), |flags, kind| flags | kind.clone_flag())
    }

    /// Get list of enabled namespace names
    #[must_use]
    pub fn names(self) -> Vec<&'static str> {
        self.iter().map(NamespaceKind::proc_name).collect()
    }
}

impl FromIterator<NamespaceKind> for NamespaceSet {
    fn from_iter<I: IntoIterator<Item = NamespaceKind>>(iter: I) -> Self {
        iter.into_iter().fold(Self::NONE, Self::with)
    }
}

/// How the requested namespaces are established
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamespaceMode {
    /// unshare(2) fresh namespaces
    Create,
    /// setns(2) into the namespaces of a running process
    Attach(ProcessId),
}

/// Namespace work for one invocation
///
/// Creating and attaching are exclusive by construction: one mode applies to
/// every requested kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamespaceRequest {
    /// Requested kinds
    pub kinds: NamespaceSet,
    /// Create or attach
    pub mode: NamespaceMode,
}

impl NamespaceRequest {
    /// Create fresh namespaces of the given kinds
    #[must_use]
    pub const fn create(kinds: NamespaceSet) -> Self {
        Self {
            kinds,
            mode: NamespaceMode::Create,
        }
    }

    /// Attach to `pid`'s namespaces. An empty set means network and mount.
    #[must_use]
    pub const fn attach(pid: ProcessId, kinds: NamespaceSet) -> Self {
        let kinds = if kinds.is_empty() {
            NamespaceSet::NET_MNT
        } else {
            kinds
        };

        Self {
            kinds,
            mode: NamespaceMode::Attach(pid),
        }
    }

    /// Whether a fork is needed to actually run inside a PID namespace
    #[must_use]
    pub const fn involves_pid(&self) -> bool {
        self.kinds.contains(NamespaceKind::Pid)
    }

    /// Whether there is anything to do
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}
