//! Process settings, read once at startup.
//!
//! Values come from the environment (the binary loads `.env` first).
//! Id lists accept either a JSON array (`[1, 2]`) or a comma-separated
//! string (`1,2`).

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use reqwest::Url;
use serde::de::DeserializeOwned;

use crate::error::BridgeError;
use crate::request::parse_url;
use crate::BridgeResult;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Connection details for the Jenkins server.
#[derive(Clone)]
pub struct JenkinsConfig {
    /// Base URL, e.g. `https://jenkins.example.com`
    pub url: Url,
    pub user_name: String,
    /// API token used for basic authentication
    pub user_token: String,
    /// Upper bound for a single request
    pub timeout: Duration,
}

impl JenkinsConfig {
    pub fn new(url: Url, user_name: impl Into<String>, user_token: impl Into<String>) -> Self {
        Self {
            url,
            user_name: user_name.into(),
            user_token: user_token.into(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Set the per-request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl fmt::Debug for JenkinsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JenkinsConfig")
            .field("url", &self.url.as_str())
            .field("user_name", &self.user_name)
            .field("user_token", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Read-only bot settings shared by every command handler.
#[derive(Clone)]
pub struct Settings {
    pub telegram_bot_token: String,
    pub jenkins: JenkinsConfig,
    /// Users allowed to run administrative commands in any allowed chat
    pub sudo_users: Vec<u64>,
    /// Chats the bot answers in
    pub allowed_chats: Vec<i64>,
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("telegram_bot_token", &"<redacted>")
            .field("jenkins", &self.jenkins)
            .field("sudo_users", &self.sudo_users)
            .field("allowed_chats", &self.allowed_chats)
            .finish()
    }
}

impl Settings {
    /// Read settings from the process environment.
    pub fn from_env() -> BridgeResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> BridgeResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| BridgeError::Config(format!("{} not set", key)))
        };

        let telegram_bot_token = required("TELEGRAM_BOT_TOKEN")?;

        let raw_url = required("JENKINS_URL")?;
        let url = parse_url(&raw_url)
            .map_err(|e| BridgeError::Config(format!("JENKINS_URL: {}", e)))?;

        let timeout = match lookup("JENKINS_TIMEOUT_SECS") {
            Some(raw) => raw.trim().parse::<u64>().map_err(|e| {
                BridgeError::Config(format!("JENKINS_TIMEOUT_SECS: {}", e))
            })?,
            None => DEFAULT_TIMEOUT_SECS,
        };

        let jenkins = JenkinsConfig::new(
            url,
            required("JENKINS_USER_NAME")?,
            required("JENKINS_USER_TOKEN")?,
        )
        .with_timeout(Duration::from_secs(timeout));

        let allowed_chats = parse_id_list("ALLOWED_CHATS", &required("ALLOWED_CHATS")?)?;
        let sudo_users = match lookup("SUDO_USERS") {
            Some(raw) => parse_id_list("SUDO_USERS", &raw)?,
            None => Vec::new(),
        };

        Ok(Settings {
            telegram_bot_token,
            jenkins,
            sudo_users,
            allowed_chats,
        })
    }
}

fn parse_id_list<T>(key: &str, raw: &str) -> BridgeResult<Vec<T>>
where
    T: FromStr + DeserializeOwned,
    T::Err: fmt::Display,
{
    let raw = raw.trim();
    if raw.starts_with('[') {
        return serde_json::from_str(raw)
            .map_err(|e| BridgeError::Config(format!("{}: {}", key, e)));
    }

    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<T>()
                .map_err(|e| BridgeError::Config(format!("{}: {:?}: {}", key, s, e)))
        })
        .collect()
}
