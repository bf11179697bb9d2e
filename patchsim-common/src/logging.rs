//! Tracing subscriber setup shared by the patchsim binaries

use crate::{Error, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Crates whose log level `--debug` raises
const WORKSPACE_CRATES: [&str; 2] = ["patchsim_audio", "patchsim_common"];

/// Filter directive used when `RUST_LOG` is not set
pub fn fallback_directive(level: &str, debug: bool) -> String {
    if debug {
        WORKSPACE_CRATES
            .iter()
            .map(|krate| format!("{}=debug", krate))
            .collect::<Vec<_>>()
            .join(",")
    } else {
        level.to_string()
    }
}

/// Install the global subscriber.
///
/// `--debug` wins over `RUST_LOG`; otherwise `RUST_LOG` wins over the
/// configured level.
pub fn init_tracing(level: &str, debug: bool) -> Result<()> {
    let directive = fallback_directive(level, debug);

    let filter = if debug {
        EnvFilter::try_new(&directive)
    } else {
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&directive))
    }
    .map_err(|e| Error::Logging(format!("Invalid log filter '{}': {}", directive, e)))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .map_err(|e| Error::Logging(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_uses_configured_level() {
        assert_eq!(fallback_directive("warn", false), "warn");
    }

    #[test]
    fn test_debug_flag_targets_workspace_crates() {
        let directive = fallback_directive("warn", true);
        assert_eq!(directive, "patchsim_audio=debug,patchsim_common=debug");
    }
}
