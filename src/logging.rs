//! Tracing setup and a level bridge for native callers

use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is not set
pub const DEFAULT_FILTER: &str = "capture_session=info";

/// Install the global fmt subscriber
///
/// `RUST_LOG` takes precedence over `default_filter`. Returns false if a
/// subscriber was already installed.
pub fn init(default_filter: &str) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}

/// Map a native level code (0 = error .. 4 = trace) to a tracing level
pub fn level_from_code(code: i32) -> Level {
    match code {
        i32::MIN..=0 => Level::ERROR,
        1 => Level::WARN,
        2 => Level::INFO,
        3 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Forward a message from native code into the tracing pipeline
pub fn forward(level: Level, message: &str) {
    if level == Level::ERROR {
        tracing::error!(target: "capture_session::native", "{}", message);
    } else if level == Level::WARN {
        tracing::warn!(target: "capture_session::native", "{}", message);
    } else if level == Level::INFO {
        tracing::info!(target: "capture_session::native", "{}", message);
    } else if level == Level::DEBUG {
        tracing::debug!(target: "capture_session::native", "{}", message);
    } else {
        tracing::trace!(target: "capture_session::native", "{}", message);
    }
}
