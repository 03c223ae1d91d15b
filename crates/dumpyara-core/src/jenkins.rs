//! Jenkins API: wire model, the [`BuildServer`] seam and its reqwest client.
//!
//! Endpoints used:
//! - `GET  /job/{job}/api/json?tree=allBuilds[...]`: build history
//! - `POST /job/{job}/buildWithParameters`: start a build
//! - `POST /job/{job}/{id}/stop`: stop a running build
//! - `POST /queue/cancelItem?id={id}`: drop a queued build

use std::fmt;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::config::JenkinsConfig;
use crate::error::BridgeError;
use crate::request::BuildRequest;
use crate::BridgeResult;

/// Tree filter for the build history query.
pub const BUILDS_TREE: &str = "allBuilds[number,result,actions[parameters[name,value]]]";

static AGENT: &str = concat!("dumpyara-bot/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Wire model
// ---------------------------------------------------------------------------

/// Terminal outcome of a Jenkins build.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum BuildResult {
    Success,
    Unstable,
    Failure,
    NotBuilt,
    Aborted,
    /// Any result name Jenkins adds later
    Other(String),
}

impl From<String> for BuildResult {
    fn from(s: String) -> Self {
        match s.as_str() {
            "SUCCESS" => BuildResult::Success,
            "UNSTABLE" => BuildResult::Unstable,
            "FAILURE" => BuildResult::Failure,
            "NOT_BUILT" => BuildResult::NotBuilt,
            "ABORTED" => BuildResult::Aborted,
            _ => BuildResult::Other(s),
        }
    }
}

impl fmt::Display for BuildResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BuildResult::Success => "SUCCESS",
            BuildResult::Unstable => "UNSTABLE",
            BuildResult::Failure => "FAILURE",
            BuildResult::NotBuilt => "NOT_BUILT",
            BuildResult::Aborted => "ABORTED",
            BuildResult::Other(s) => s,
        };
        f.write_str(name)
    }
}

/// A `{name, value}` build parameter.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BuildParameter {
    pub name: String,
    #[serde(default)]
    pub value: Value,
}

/// One entry of a build's `actions` array.
///
/// Most actions are empty objects under the tree filter; only parameter
/// actions carry `parameters`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct BuildAction {
    #[serde(default)]
    pub parameters: Option<Vec<BuildParameter>>,
}

/// A build as reported by Jenkins. `result` is `None` while it runs.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BuildRecord {
    pub number: u64,
    #[serde(default)]
    pub result: Option<BuildResult>,
    #[serde(default)]
    pub actions: Vec<Option<BuildAction>>,
}

impl BuildRecord {
    /// Parameters of the first action that has any.
    pub fn parameters(&self) -> Option<&[BuildParameter]> {
        self.actions
            .iter()
            .flatten()
            .find_map(|action| action.parameters.as_deref())
    }

    pub fn is_running(&self) -> bool {
        self.result.is_none()
    }
}

/// Body of the build history query.
#[derive(Debug, Deserialize)]
pub struct JobBuilds {
    #[serde(rename = "allBuilds", default)]
    pub all_builds: Vec<BuildRecord>,
}

// ---------------------------------------------------------------------------
// BuildServer
// ---------------------------------------------------------------------------

/// The subset of a CI server the bridge talks to.
///
/// `stop_build` and `cancel_queue_item` hand back the raw status code; the
/// caller decides what each code means. Transport failures are errors.
#[async_trait]
pub trait BuildServer: Send + Sync {
    /// All builds of `job`, in server order.
    async fn list_builds(&self, job: &str) -> BridgeResult<Vec<BuildRecord>>;

    /// Start a build of `job` with the request's parameters.
    async fn trigger_build(&self, job: &str, request: &BuildRequest) -> BridgeResult<()>;

    /// Ask `job` to stop build `id`.
    async fn stop_build(&self, job: &str, id: u64) -> BridgeResult<u16>;

    /// Remove item `id` from the build queue.
    async fn cancel_queue_item(&self, id: u64) -> BridgeResult<u16>;
}

// ---------------------------------------------------------------------------
// JenkinsClient
// ---------------------------------------------------------------------------

/// Jenkins client over HTTP basic authentication
pub struct JenkinsClient {
    config: JenkinsConfig,
    http_client: reqwest::Client,
}

impl JenkinsClient {
    /// Create a new Jenkins client
    pub fn new(config: JenkinsConfig) -> BridgeResult<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(AGENT)
            .timeout(config.timeout)
            .build()?;

        Ok(JenkinsClient {
            config,
            http_client,
        })
    }

    /// Absolute URL for an API path starting with `/`.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.url.as_str().trim_end_matches('/'), path)
    }

    fn post(&self, url: &str) -> reqwest::RequestBuilder {
        self.http_client
            .post(url)
            .basic_auth(&self.config.user_name, Some(&self.config.user_token))
    }
}

/// Reject anything outside 2xx. Redirects reqwest did not follow land here too.
fn ensure_success(response: reqwest::Response) -> BridgeResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        warn!(status = status.as_u16(), url = %response.url(), "unexpected status");
        Err(BridgeError::UpstreamUnavailable(format!("HTTP {}", status)))
    }
}

/// Query pairs for `buildWithParameters`.
pub fn trigger_params(request: &BuildRequest) -> [(&'static str, String); 3] {
    [
        ("URL", request.url_text().to_string()),
        ("USE_ALT_DUMPER", request.use_alt_dumper().to_string()),
        ("ADD_BLACKLIST", request.add_blacklist().to_string()),
    ]
}

#[async_trait]
impl BuildServer for JenkinsClient {
    #[instrument(skip(self))]
    async fn list_builds(&self, job: &str) -> BridgeResult<Vec<BuildRecord>> {
        let url = self.endpoint(&format!("/job/{}/api/json", job));
        debug!("fetching build history: {}", url);

        let response = self
            .http_client
            .get(&url)
            .query(&[("tree", BUILDS_TREE)])
            .basic_auth(&self.config.user_name, Some(&self.config.user_token))
            .send()
            .await?;
        let response = ensure_success(response)?;

        let body: JobBuilds = response.json().await?;
        debug!("{} builds listed", body.all_builds.len());
        Ok(body.all_builds)
    }

    #[instrument(skip(self, request), fields(url = %request.url_text()))]
    async fn trigger_build(&self, job: &str, request: &BuildRequest) -> BridgeResult<()> {
        let url = self.endpoint(&format!("/job/{}/buildWithParameters", job));

        let response = self.post(&url).query(&trigger_params(request)).send().await?;
        ensure_success(response)?;

        info!("build triggered");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn stop_build(&self, job: &str, id: u64) -> BridgeResult<u16> {
        let url = self.endpoint(&format!("/job/{}/{}/stop", job, id));
        let status = self.post(&url).send().await?.status().as_u16();

        debug!(status, "stop answered");
        Ok(status)
    }

    #[instrument(skip(self))]
    async fn cancel_queue_item(&self, id: u64) -> BridgeResult<u16> {
        let url = self.endpoint("/queue/cancelItem");
        let status = self
            .post(&url)
            .query(&[("id", id)])
            .send()
            .await?
            .status()
            .as_u16();

        if status != 204 {
            warn!(status, "queue cancel refused");
        }
        Ok(status)
    }
}
