//! mnexec core - shared error type and validated value types
//!
//! This crate provides the foundation used by the namespace, cgroup and CLI crates.

#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{CgroupName, ProcessId, RtPriority};
