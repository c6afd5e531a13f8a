//! Core type definitions with strong typing and validation

use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// Process identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct ProcessId(i32);

impl ProcessId {
    /// Create from raw PID
    #[must_use]
    pub const fn from_raw(pid: i32) -> Self {
        Self(pid)
    }

    /// Get the current process ID
    ///
    /// Inside a PID namespace this is the namespace-local id.
    #[must_use]
    pub fn current() -> Self {
        nix::unistd::getpid().into()
    }

    /// Convert to `nix::unistd::Pid`
    #[must_use]
    pub const fn as_nix_pid(self) -> nix::unistd::Pid {
        nix::unistd::Pid::from_raw(self.0)
    }

    /// Get raw PID value
    #[must_use]
    pub const fn as_raw(self) -> i32 {
        self.0
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ProcessId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.parse::<i32>() {
            Ok(pid) if pid > 0 => Ok(Self(pid)),
            _ => Err(Error::InvalidConfig {
                message: format!("invalid pid: {s}"),
            }),
        }
    }
}

impl From<nix::unistd::Pid> for ProcessId {
    fn from(pid: nix::unistd::Pid) -> Self {
        Self(pid.as_raw())
    }
}

impl From<ProcessId> for nix::unistd::Pid {
    fn from(pid: ProcessId) -> Self {
        Self::from_raw(pid.0)
    }
}

/// Cgroup group name, restricted to `[A-Za-z0-9/]+`
///
/// The name is joined onto controller directories, so anything that could
/// escape the hierarchy (`.`, `..`, spaces, shell metacharacters) is refused
/// up front.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct CgroupName(String);

impl CgroupName {
    /// Create a new `CgroupName` with validation
    ///
    /// # Errors
    /// Returns [`Error::InvalidCgroupName`] if the name is empty or contains
    /// a character other than an ASCII letter, digit or `/`
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        Self::validate(&name)?;
        Ok(Self(name))
    }

    fn validate(name: &str) -> Result<()> {
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '/') {
            return Err(Error::InvalidCgroupName {
                path: name.to_string(),
            });
        }

        Ok(())
    }

    /// Get the name as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name with leading slashes removed, suitable for `Path::join`
    #[must_use]
    pub fn relative(&self) -> &str {
        self.0.trim_start_matches('/')
    }
}

impl fmt::Display for CgroupName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for CgroupName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

/// Real-time (`SCHED_RR`) priority
///
/// Only positivity is checked here; the kernel enforces the upper bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtPriority(i32);

impl RtPriority {
    /// Create a new priority
    ///
    /// # Errors
    /// Returns error if the priority is not positive
    pub fn new(priority: i32) -> Result<Self> {
        if priority < 1 {
            return Err(Error::InvalidConfig {
                message: format!("rt priority must be positive, got {priority}"),
            });
        }

        Ok(Self(priority))
    }

    /// Get raw priority value
    #[must_use]
    pub const fn as_raw(self) -> i32 {
        self.0
    }
}

impl fmt::Display for RtPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
