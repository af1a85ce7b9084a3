//! tracing subscriber setup for hosts embedding the bridge.

use tracing_subscriber::EnvFilter;

use crate::error::BridgeError;

/// Set to `1` for JSON log lines instead of the human-readable format.
pub const LOG_JSON_ENV: &str = "SOCIALBAR_LOG_JSON";

/// Install a global fmt subscriber honouring `RUST_LOG`, with
/// `socialbar_core=info` added as a baseline.
///
/// Calling this when a subscriber is already installed is a no-op.
pub fn init() -> Result<(), BridgeError> {
    let json_logs = json_requested(std::env::var(LOG_JSON_ENV).ok().as_deref());
    let filter = EnvFilter::from_default_env().add_directive("socialbar_core=info".parse()?);
    let installed = if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .try_init()
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).try_init()
    };
    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
    Ok(())
}

fn json_requested(value: Option<&str>) -> bool {
    value.map(str::trim) == Some("1")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_flag() {
        assert!(json_requested(Some("1")));
        assert!(json_requested(Some(" 1\n")));
        assert!(!json_requested(Some("0")));
        assert!(!json_requested(Some("")));
        assert!(!json_requested(None));
    }

    #[test]
    fn test_init_twice_is_harmless() {
        init().unwrap();
        init().unwrap();
    }
}
