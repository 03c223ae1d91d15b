//! Command parsing: `/dump` arguments into a [`BuildRequest`].
//!
//! The first token is the firmware URL. Every following token is joined and
//! scanned one character at a time for option letters:
//!
//! - `a`: use the alternate dumper
//! - `f`: force, skip the existing build check
//! - `b`: add the firmware to the blacklist
//! - `p`: private mode, dumped through the private job
//!
//! Anything else is ignored, so `afb` and `a f b` are the same request.

use reqwest::Url;

use crate::error::BridgeError;
use crate::BridgeResult;

/// Jenkins job used for regular dumps.
pub const DEFAULT_JOB: &str = "dumpyara";

/// Jenkins job used for private-mode dumps.
pub const PRIVATE_JOB: &str = "privdump";

/// A validated dump request.
///
/// Built fresh for every command and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    url: Url,
    use_alt_dumper: bool,
    add_blacklist: bool,
    private: bool,
}

impl BuildRequest {
    /// Create a request from a raw URL and its flags.
    pub fn new(
        url: &str,
        use_alt_dumper: bool,
        add_blacklist: bool,
        private: bool,
    ) -> BridgeResult<Self> {
        Ok(Self {
            url: parse_url(url)?,
            use_alt_dumper,
            add_blacklist,
            private,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Normalised URL text, as sent to and compared against Jenkins.
    pub fn url_text(&self) -> &str {
        self.url.as_str()
    }

    pub fn use_alt_dumper(&self) -> bool {
        self.use_alt_dumper
    }

    pub fn add_blacklist(&self) -> bool {
        self.add_blacklist
    }

    pub fn is_private(&self) -> bool {
        self.private
    }

    /// Name of the Jenkins job this request belongs to.
    pub fn job_name(&self) -> &'static str {
        job_name(self.private)
    }
}

/// Jenkins job for the given private-mode flag.
pub fn job_name(private: bool) -> &'static str {
    if private {
        PRIVATE_JOB
    } else {
        DEFAULT_JOB
    }
}

/// Option letters found after the URL.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DumpFlags {
    pub alt_dumper: bool,
    pub force: bool,
    pub blacklist: bool,
    pub private: bool,
}

impl DumpFlags {
    /// Scan `text` for option letters. Only lowercase letters count.
    pub fn scan(text: &str) -> Self {
        let mut flags = DumpFlags::default();
        for c in text.chars() {
            match c {
                'a' => flags.alt_dumper = true,
                'f' => flags.force = true,
                'b' => flags.blacklist = true,
                'p' => flags.private = true,
                _ => {}
            }
        }
        flags
    }
}

/// Parsed `/dump` command.
///
/// `force` steers the reconciler and is not part of the request itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpCommand {
    pub request: BuildRequest,
    pub force: bool,
}

/// Parse the argument tokens of a `/dump` command.
pub fn parse_dump_args<S: AsRef<str>>(args: &[S]) -> BridgeResult<DumpCommand> {
    let (first, rest) = args
        .split_first()
        .ok_or_else(|| BridgeError::InvalidArgument("missing URL".to_string()))?;

    let options: String = rest.iter().map(|s| s.as_ref()).collect();
    let flags = DumpFlags::scan(&options);

    let request = BuildRequest::new(
        first.as_ref(),
        flags.alt_dumper,
        flags.blacklist,
        flags.private,
    )?;

    Ok(DumpCommand {
        request,
        force: flags.force,
    })
}

/// Usage line for `/cancel`.
pub const CANCEL_USAGE: &str = "Usage: /cancel <job_id> [p]\n\
     p: cancel a job of the private dump job";

/// Parsed `/cancel` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancelCommand {
    pub job_id: u64,
    pub private: bool,
}

impl CancelCommand {
    pub fn job_name(&self) -> &'static str {
        job_name(self.private)
    }
}

/// Parse the argument tokens of a `/cancel` command: a numeric build or
/// queue id, then option letters where only `p` means anything.
pub fn parse_cancel_args<S: AsRef<str>>(args: &[S]) -> BridgeResult<CancelCommand> {
    let (first, rest) = args
        .split_first()
        .ok_or_else(|| BridgeError::InvalidArgument("missing job id".to_string()))?;

    let job_id = first
        .as_ref()
        .trim()
        .parse::<u64>()
        .map_err(|_| BridgeError::InvalidArgument(format!("not a job id: {}", first.as_ref())))?;

    let options: String = rest.iter().map(|s| s.as_ref()).collect();
    Ok(CancelCommand {
        job_id,
        private: DumpFlags::scan(&options).private,
    })
}

/// Validate an absolute http(s) URL with a host.
pub fn parse_url(raw: &str) -> BridgeResult<Url> {
    let url = Url::parse(raw.trim())
        .map_err(|e| BridgeError::InvalidArgument(format!("{}: {}", raw, e)))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(BridgeError::InvalidArgument(format!(
            "unsupported scheme: {}",
            url.scheme()
        )));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(BridgeError::InvalidArgument(format!("missing host: {}", raw)));
    }

    Ok(url)
}
