//! Worker package management and process launching.
//!
//! This module owns everything between the supervisor and the worker
//! subprocess:
//! - **Version reconciliation**: [`PackageManager`] probes the installed
//!   worker version and installs the required one from its git repository.
//! - **Launch**: [`launcher::launch`] forks the worker and delivers the
//!   identity and settings startup messages over its stdin channel.
//!
//! The worker itself is opaque: after the two startup messages no further
//! communication happens, and its exit (any status) hands control back to
//! the supervisor loop.

pub mod launcher;
pub mod package;

pub use launcher::WorkerHandle;
pub use package::PackageManager;
