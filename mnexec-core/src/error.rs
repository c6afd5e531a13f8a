//! Error types for mnexec

use std::path::PathBuf;

use thiserror::Error;

/// mnexec error types
///
/// Every variant renders as a single line; the binary prints it verbatim
/// before exiting with status 1.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Cgroup name contains something other than `[A-Za-z0-9/]`
    #[error("invalid path: {path}")]
    InvalidCgroupName {
        /// The rejected name
        path: String,
    },

    /// Invalid configuration
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Error message
        message: String,
    },

    /// A system call failed
    #[error("{operation}: {source}")]
    Syscall {
        /// Operation that failed, e.g. `unshare` or `setns net`
        operation: String,
        /// Underlying errno
        #[source]
        source: nix::Error,
    },

    /// Opening or writing a file failed
    #[error("{}: {source}", path.display())]
    Path {
        /// File that could not be accessed
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// None of the cgroup controllers accepted the process
    #[error("cgroup: could not add to cgroup {group}")]
    CgroupUnavailable {
        /// Requested group name
        group: String,
    },

    /// The target command could not be executed
    #[error("{command}: {source}")]
    Exec {
        /// Command that was passed to execvp
        command: String,
        /// Underlying errno
        #[source]
        source: nix::Error,
    },

    /// Writing to standard output failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns a mapper that tags an errno with the failing operation.
    ///
    /// ```
    /// use mnexec_core::Error;
    ///
    /// let err = Err::<(), _>(nix::Error::EPERM).map_err(Error::syscall("unshare"));
    /// assert!(err.unwrap_err().to_string().starts_with("unshare: "));
    /// ```
    pub fn syscall(operation: impl Into<String>) -> impl FnOnce(nix::Error) -> Self {
        let operation = operation.into();
        move |source| Self::Syscall { operation, source }
    }

    /// Returns a mapper that tags an I/O error with the file it concerns.
    pub fn path(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Path { path, source }
    }

    /// Whether this error was raised while resolving configuration,
    /// i.e. before any side effect took place.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::InvalidCgroupName { .. } | Self::InvalidConfig { .. })
    }
}

/// Result type alias for mnexec operations
pub type Result<T> = std::result::Result<T, Error>;
