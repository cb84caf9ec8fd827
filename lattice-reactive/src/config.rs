//! Runtime Configuration
//!
//! Tunables for the reactive engine. Configuration is per thread, matching
//! the thread-local tracking context: each event loop owns its own graph.
//!
//! ```json
//! { "max_update_count": 100, "async_mode": true, "dev_mode": true }
//! ```
//!
//! All fields are optional when deserializing and fall back to defaults.

use std::cell::Cell;

use serde::{Deserialize, Serialize};

use crate::error::{ReactiveError, Result};

/// Engine-wide behaviour switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// How many times one watcher may run within a single flush before it is
    /// reported as an infinite update loop.
    pub max_update_count: usize,

    /// When false, queued watchers flush synchronously and subscribers are
    /// notified in ascending id order.
    pub async_mode: bool,

    /// Enables warnings, loop detection and debugger events.
    pub dev_mode: bool,

    /// Suppresses warnings even in dev mode.
    pub silent: bool,

    /// Server-side rendering: `observe()` only creates (mock) observers when
    /// explicitly asked to.
    pub server_rendering: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_update_count: 100,
            async_mode: true,
            dev_mode: cfg!(debug_assertions),
            silent: false,
            server_rendering: false,
        }
    }
}

impl Config {
    /// Parse a configuration document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| ReactiveError::Config(e.to_string()))
    }
}

thread_local! {
    static CONFIG: Cell<Config> = Cell::new(Config::default());
    static SHOULD_OBSERVE: Cell<bool> = const { Cell::new(true) };
}

/// Current configuration for this thread.
pub fn config() -> Config {
    CONFIG.with(Cell::get)
}

/// Replace the configuration for this thread.
pub fn set_config(config: Config) {
    CONFIG.with(|c| c.set(config));
}

/// Edit the configuration in place.
pub fn configure(f: impl FnOnce(&mut Config)) {
    CONFIG.with(|c| {
        let mut config = c.get();
        f(&mut config);
        c.set(config);
    });
}

/// Globally enable or disable creation of new observers.
///
/// Used while initializing props whose values are owned by a parent.
pub fn toggle_observing(value: bool) {
    SHOULD_OBSERVE.with(|c| c.set(value));
}

pub fn should_observe() -> bool {
    SHOULD_OBSERVE.with(Cell::get)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_documents_use_defaults() {
        let cfg = Config::from_json_str(r#"{ "max_update_count": 7 }"#).unwrap();
        assert_eq!(cfg.max_update_count, 7);
        assert!(cfg.async_mode);
        assert!(!cfg.server_rendering);
    }

    #[test]
    fn malformed_documents_are_rejected() {
        let err = Config::from_json_str("{ max_update_count").unwrap_err();
        assert!(matches!(err, ReactiveError::Config(_)));
    }

    #[test]
    fn configure_edits_in_place() {
        configure(|c| c.async_mode = false);
        assert!(!config().async_mode);
        set_config(Config::default());
        assert!(config().async_mode);
    }
}
