//! Error types for dumpyara-core

use thiserror::Error;

/// Usage line shown whenever a `/dump` command cannot be parsed.
pub const DUMP_USAGE: &str = "Usage: /dump <URL> [a][f][b][p]\n\
     a: use alternate dumper\n\
     f: force a new build, skip the existing build check\n\
     b: add the firmware to the blacklist\n\
     p: private dump, the command message is deleted";

/// Errors surfaced by the bridge
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Malformed or missing command argument (usually the URL)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Network failure or non-2xx answer from the Jenkins server
    #[error("Jenkins unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Command issued outside an allowed chat or by a non-administrator
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Missing or malformed setting
    #[error("Configuration error: {0}")]
    Config(String),
}

impl BridgeError {
    /// Reply text sent back to the chat for this error.
    pub fn user_message(&self) -> String {
        match self {
            BridgeError::InvalidArgument(_) => format!("Invalid URL\n\n{}", DUMP_USAGE),
            BridgeError::UpstreamUnavailable(_) => {
                "Failed to reach the build server, please try again later.".to_string()
            }
            BridgeError::Unauthorized(reason) => reason.clone(),
            BridgeError::Config(_) => "An error occurred".to_string(),
        }
    }
}

impl From<reqwest::Error> for BridgeError {
    fn from(err: reqwest::Error) -> Self {
        BridgeError::UpstreamUnavailable(err.to_string())
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        BridgeError::UpstreamUnavailable(format!("malformed response: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_argument_reply_carries_usage() {
        let msg = BridgeError::InvalidArgument("no url".into()).user_message();
        assert!(msg.starts_with("Invalid URL"));
        assert!(msg.contains("/dump <URL>"));
    }

    #[test]
    fn test_upstream_reply_hides_the_cause() {
        let msg = BridgeError::UpstreamUnavailable("connection refused".into()).user_message();
        assert!(!msg.contains("connection refused"));
    }

    #[test]
    fn test_unauthorized_reply_is_the_reason() {
        let err = BridgeError::Unauthorized("You can't use this here".into());
        assert_eq!(err.user_message(), "You can't use this here");
    }
}
