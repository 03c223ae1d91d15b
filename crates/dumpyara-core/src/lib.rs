//! Dumpyara core: `/dump` parsing and Jenkins build reconciliation.
//!
//! The bot front-end hands command arguments to [`parse_dump_args`] and the
//! resulting [`DumpCommand`] to a [`Reconciler`]. The reconciler looks for an
//! equivalent build in the job history before it starts a new one.
//!
//! ## Key Components
//!
//! - [`BuildRequest`]: validated URL plus dumper/blacklist/private flags
//! - [`BuildServer`]: the CI seam, implemented over HTTP by [`JenkinsClient`]
//!   and in memory by [`fakes::MemoryBuildServer`]
//! - [`Reconciler`]: dedup check, trigger and cancel
//! - [`Settings`]: read-only process configuration

pub mod access;
pub mod config;
mod error;
pub mod fakes;
pub mod jenkins;
pub mod reconcile;
pub mod request;
pub mod telemetry;

pub use config::{JenkinsConfig, Settings};
pub use error::{BridgeError, DUMP_USAGE};
pub use jenkins::{BuildParameter, BuildRecord, BuildResult, BuildServer, JenkinsClient};
pub use reconcile::{classify, find_matching, BuildStatus, CancelOutcome, DumpOutcome, Reconciler};
pub use request::{
    job_name, parse_cancel_args, parse_dump_args, BuildRequest, CancelCommand, DumpCommand,
    DumpFlags, CANCEL_USAGE,
};
pub use telemetry::init_tracing;

/// Result type for bridge operations
pub type BridgeResult<T> = std::result::Result<T, BridgeError>;
