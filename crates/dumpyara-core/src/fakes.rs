//! In-memory [`BuildServer`] for tests.
//!
//! `MemoryBuildServer` serves scripted build histories and status codes and
//! records every call so tests can assert what reached the server.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::BridgeError;
use crate::jenkins::{BuildRecord, BuildServer};
use crate::request::BuildRequest;
use crate::BridgeResult;

/// A call that reached the fake server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerCall {
    ListBuilds { job: String },
    Trigger { job: String, request: BuildRequest },
    Stop { job: String, id: u64 },
    CancelQueueItem { id: u64 },
}

#[derive(Debug)]
struct Script {
    builds: HashMap<String, Vec<BuildRecord>>,
    unreachable: bool,
    trigger_fails: bool,
    stop_status: u16,
    queue_status: u16,
}

/// Scripted build server.
#[derive(Debug)]
pub struct MemoryBuildServer {
    script: Mutex<Script>,
    calls: Mutex<Vec<ServerCall>>,
}

impl Default for MemoryBuildServer {
    fn default() -> Self {
        Self {
            script: Mutex::new(Script {
                builds: HashMap::new(),
                unreachable: false,
                trigger_fails: false,
                stop_status: 200,
                queue_status: 204,
            }),
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl MemoryBuildServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `builds` as the history of `job`.
    pub fn with_builds(self, job: &str, builds: Vec<BuildRecord>) -> Self {
        self.script
            .lock()
            .unwrap()
            .builds
            .insert(job.to_string(), builds);
        self
    }

    /// Fail every call as if the network were down.
    pub fn unreachable(self) -> Self {
        self.script.lock().unwrap().unreachable = true;
        self
    }

    /// Answer triggers with a non-2xx status.
    pub fn rejecting_triggers(self) -> Self {
        self.script.lock().unwrap().trigger_fails = true;
        self
    }

    /// Status codes for the stop and queue-cancel endpoints.
    pub fn with_cancel_statuses(self, stop: u16, queue: u16) -> Self {
        {
            let mut script = self.script.lock().unwrap();
            script.stop_status = stop;
            script.queue_status = queue;
        }
        self
    }

    /// Every call so far, oldest first.
    pub fn calls(&self) -> Vec<ServerCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Triggers so far.
    pub fn triggers(&self) -> Vec<ServerCall> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, ServerCall::Trigger { .. }))
            .collect()
    }

    fn record(&self, call: ServerCall) -> BridgeResult<()> {
        self.calls.lock().unwrap().push(call);
        if self.script.lock().unwrap().unreachable {
            return Err(BridgeError::UpstreamUnavailable(
                "connection refused".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl BuildServer for MemoryBuildServer {
    async fn list_builds(&self, job: &str) -> BridgeResult<Vec<BuildRecord>> {
        self.record(ServerCall::ListBuilds {
            job: job.to_string(),
        })?;
        let script = self.script.lock().unwrap();
        Ok(script.builds.get(job).cloned().unwrap_or_default())
    }

    async fn trigger_build(&self, job: &str, request: &BuildRequest) -> BridgeResult<()> {
        self.record(ServerCall::Trigger {
            job: job.to_string(),
            request: request.clone(),
        })?;
        if self.script.lock().unwrap().trigger_fails {
            return Err(BridgeError::UpstreamUnavailable(
                "HTTP status server error (500 Internal Server Error)".to_string(),
            ));
        }
        Ok(())
    }

    async fn stop_build(&self, job: &str, id: u64) -> BridgeResult<u16> {
        self.record(ServerCall::Stop {
            job: job.to_string(),
            id,
        })?;
        Ok(self.script.lock().unwrap().stop_status)
    }

    async fn cancel_queue_item(&self, id: u64) -> BridgeResult<u16> {
        self.record(ServerCall::CancelQueueItem { id })?;
        Ok(self.script.lock().unwrap().queue_status)
    }
}
