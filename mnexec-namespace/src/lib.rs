//! Namespace entry and process lifecycle for mnexec
//!
//! This crate places the current process into its execution context:
//! - [`binder`] - create namespaces with unshare(2) or join a running
//!   process's namespaces with setns(2), chroot fallback for mount
//! - [`supervisor`] - the fork that puts a child inside a PID namespace
//! - [`executor`] - descriptor closing, tty detaching, pid marker, exec
//!
//! Namespace system calls go through [`NamespaceBackend`], so the sequencing
//! can be tested against [`MockBackend`] without privileges.

#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]

pub mod backend;
pub mod binder;
pub mod config;
pub mod executor;
pub mod supervisor;

pub use backend::{KernelBackend, MockBackend, NamespaceBackend, PseudoFs};
pub use binder::{Binding, NamespaceBinder};
pub use config::{NamespaceKind, NamespaceMode, NamespaceRequest, NamespaceSet};
pub use executor::{Detach, PID_MARKER};
pub use supervisor::{Checkpoint, ProcessHandle};
