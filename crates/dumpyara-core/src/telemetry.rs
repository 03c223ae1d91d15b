//! Tracing setup for the bot binary.
//!
//! Call [`init_tracing`] once at startup. Later calls are ignored, since the
//! global subscriber can only be set once per process.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Crates whose debug output drowns the bot's own during long polling.
const QUIET_TARGETS: &[&str] = &["hyper", "hyper_util", "reqwest", "rustls"];

/// Default filter directives for `level`, used when `RUST_LOG` is unset.
pub fn default_directives(level: Level) -> String {
    let mut directives = level.as_str().to_ascii_lowercase();
    if level > Level::INFO {
        for target in QUIET_TARGETS {
            directives.push_str(&format!(",{}=info", target));
        }
    }
    directives
}

/// Initialise the global tracing subscriber.
///
/// `json` switches to one JSON object per line for log shippers.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(fmt::layer().with_target(false).json())
            .try_init()
            .ok();
    } else {
        registry.with(fmt::layer()).try_init().ok();
    }
}
