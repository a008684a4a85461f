//! Tracing initialisation for the `xtiming` binaries.
//!
//! Pipeline crates log at the requested level; dependencies stay at `warn`
//! unless `RUST_LOG` says otherwise. Logs always go to stderr so the JSON
//! summaries on stdout stay machine-readable.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Crates whose events follow the CLI verbosity.
pub const PIPELINE_TARGETS: [&str; 3] = ["xtiming", "xtiming_core", "xtiming_store"];

/// Filter directives used when `RUST_LOG` is unset.
pub fn default_directives(level: Level) -> String {
    let level = level.as_str().to_ascii_lowercase();
    std::iter::once("warn".to_string())
        .chain(PIPELINE_TARGETS.iter().map(|t| format!("{t}={level}")))
        .collect::<Vec<_>>()
        .join(",")
}

/// Install the global subscriber. Returns `false` when one was already
/// installed, in which case the call changes nothing.
///
/// `json` selects newline-delimited JSON records with the observation span
/// attached; otherwise human-readable lines.
pub fn init_tracing(json: bool, level: Level) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));
    let registry = tracing_subscriber::registry().with(filter);

    let installed = if json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
    };
    installed.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dependencies_stay_quiet_by_default() {
        assert_eq!(
            default_directives(Level::DEBUG),
            "warn,xtiming=debug,xtiming_core=debug,xtiming_store=debug"
        );
    }

    #[test]
    fn directives_parse() {
        assert!(EnvFilter::try_new(default_directives(Level::INFO)).is_ok());
    }
}
