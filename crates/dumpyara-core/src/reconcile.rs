//! Build reconciliation: check the job history before starting a duplicate.
//!
//! Policy for a `/dump`:
//! 1. unless forced, list the job's builds and take the first one whose
//!    parameters match the request;
//! 2. a running or successful match is reported and nothing is started;
//! 3. otherwise a new build is triggered.

use std::fmt;

use serde_json::Value;
use tracing::{error, info, instrument, warn};

use crate::jenkins::{BuildParameter, BuildRecord, BuildResult, BuildServer};
use crate::request::{BuildRequest, DumpCommand};
use crate::BridgeResult;

/// Reply text after a successful trigger.
pub const JOB_STARTED: &str = "Job started";

/// Reply text when no build matches.
pub const NO_MATCH: &str = "No matching build found. A new build will be started.";

/// Disposition of an existing build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildStatus {
    /// `true` when no new build is needed
    pub exists_conclusively: bool,
    pub message: String,
}

/// Classify a matching build.
///
/// Running and successful builds are conclusive; any other result means
/// the caller should start over.
pub fn classify(build: &BuildRecord) -> BuildStatus {
    match &build.result {
        None => BuildStatus {
            exists_conclusively: true,
            message: format!(
                "Build #{} is currently in progress for this URL and settings.",
                build.number
            ),
        },
        Some(BuildResult::Success) => BuildStatus {
            exists_conclusively: true,
            message: format!(
                "Build #{} has already successfully completed for this URL and settings.",
                build.number
            ),
        },
        Some(result) => BuildStatus {
            exists_conclusively: false,
            message: format!(
                "Build #{} exists for this URL and settings, but result was {}. A new build will be started.",
                build.number, result
            ),
        },
    }
}

/// First build, in server order, whose parameters match `request`.
///
/// Compares `URL`, `USE_ALT_DUMPER` and `ADD_BLACKLIST`. Private mode only
/// picks the job and is not compared. Only the first parameter-bearing
/// action of a build is looked at, so parameters recorded in a later
/// action are never seen.
pub fn find_matching<'a>(
    builds: &'a [BuildRecord],
    request: &BuildRequest,
) -> Option<&'a BuildRecord> {
    builds.iter().find(|build| is_matching_build(build, request))
}

fn is_matching_build(build: &BuildRecord, request: &BuildRequest) -> bool {
    let Some(params) = build.parameters() else {
        return false;
    };

    param(params, "URL") == Some(&Value::String(request.url_text().to_string()))
        && param(params, "USE_ALT_DUMPER") == Some(&Value::Bool(request.use_alt_dumper()))
        && param(params, "ADD_BLACKLIST") == Some(&Value::Bool(request.add_blacklist()))
}

// Later duplicates win, as when the list is read into a map.
fn param<'a>(params: &'a [BuildParameter], name: &str) -> Option<&'a Value> {
    params.iter().rev().find(|p| p.name == name).map(|p| &p.value)
}

/// Result of a `/cancel`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The running build was stopped
    Cancelled { id: u64 },
    /// The build had not started and was dropped from the queue
    Dequeued { id: u64 },
    /// Neither call succeeded; `status` is the last code seen
    Failed { id: u64, status: u16 },
}

impl fmt::Display for CancelOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelOutcome::Cancelled { id } => {
                write!(f, "Job with ID {} has been cancelled.", id)
            }
            CancelOutcome::Dequeued { id } => {
                write!(f, "Job with ID {} has been removed from the queue.", id)
            }
            CancelOutcome::Failed { id, status } => write!(
                f,
                "Failed to cancel job with ID {}. Status code: {}.",
                id, status
            ),
        }
    }
}

/// Result of a `/dump`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DumpOutcome {
    /// A matching build is running or already succeeded
    Existing(BuildStatus),
    /// A new build was triggered. `previous` holds the non-conclusive
    /// match, if there was one.
    Started {
        previous: Option<BuildStatus>,
        confirmation: String,
    },
}

impl DumpOutcome {
    /// Text to send back to the chat.
    pub fn reply(&self) -> &str {
        match self {
            DumpOutcome::Existing(status) => &status.message,
            DumpOutcome::Started { confirmation, .. } => confirmation,
        }
    }

    pub fn started(&self) -> bool {
        matches!(self, DumpOutcome::Started { .. })
    }
}

/// Runs the reconciliation policy against a [`BuildServer`].
pub struct Reconciler<S> {
    server: S,
}

impl<S: BuildServer> Reconciler<S> {
    pub fn new(server: S) -> Self {
        Self { server }
    }

    pub fn server(&self) -> &S {
        &self.server
    }

    /// All builds of `job_name`.
    pub async fn list_builds(&self, job_name: &str) -> BridgeResult<Vec<BuildRecord>> {
        self.server.list_builds(job_name).await.map_err(|e| {
            error!(job = job_name, "listing builds failed: {}", e);
            e
        })
    }

    /// Disposition of the first matching build, or the no-match status.
    pub async fn check_existing(&self, request: &BuildRequest) -> BridgeResult<BuildStatus> {
        let builds = self.list_builds(request.job_name()).await?;

        Ok(match find_matching(&builds, request) {
            Some(build) => classify(build),
            None => BuildStatus {
                exists_conclusively: false,
                message: NO_MATCH.to_string(),
            },
        })
    }

    /// Start a build of the request's job.
    pub async fn trigger(&self, request: &BuildRequest) -> BridgeResult<String> {
        self.server
            .trigger_build(request.job_name(), request)
            .await
            .map_err(|e| {
                error!(job = request.job_name(), "trigger failed: {}", e);
                e
            })?;
        Ok(JOB_STARTED.to_string())
    }

    /// Stop build `job_id`, or drop it from the queue if it is not running.
    #[instrument(skip(self))]
    pub async fn cancel(&self, job_name: &str, job_id: u64) -> BridgeResult<CancelOutcome> {
        let status = self.server.stop_build(job_name, job_id).await?;
        if status == 200 {
            info!("running build stopped");
            return Ok(CancelOutcome::Cancelled { id: job_id });
        }
        if status != 404 {
            warn!(status, "stop refused");
            return Ok(CancelOutcome::Failed { id: job_id, status });
        }

        let status = self.server.cancel_queue_item(job_id).await?;
        if status == 204 {
            info!("queued build removed");
            Ok(CancelOutcome::Dequeued { id: job_id })
        } else {
            Ok(CancelOutcome::Failed { id: job_id, status })
        }
    }

    /// Full `/dump` policy.
    #[instrument(skip(self, command), fields(job = command.request.job_name(), force = command.force))]
    pub async fn dump(&self, command: &DumpCommand) -> BridgeResult<DumpOutcome> {
        let request = &command.request;

        let previous = if command.force {
            info!("force flag set, skipping existing build check");
            None
        } else {
            let status = self.check_existing(request).await?;
            info!("{}", status.message);
            if status.exists_conclusively {
                return Ok(DumpOutcome::Existing(status));
            }
            Some(status)
        };

        let confirmation = self.trigger(request).await?;
        Ok(DumpOutcome::Started {
            previous,
            confirmation,
        })
    }
}
