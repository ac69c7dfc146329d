//! Debug bridge configuration.

use std::time::Duration;

use serde::Deserialize;

/// Default feed endpoint path on the development server.
pub const DEFAULT_FEED_PATH: &str = "/$pilet-api";

/// Default debounce window for change notifications.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(150);

fn default_load_flag() -> String {
    "on".to_string()
}

fn default_true() -> bool {
    true
}

fn default_debounce_ms() -> u64 {
    // Keep in sync with DEFAULT_DEBOUNCE.
    150
}

/// Configuration for the live-update bridge.
#[derive(Debug, Clone, Deserialize)]
pub struct DebugConfig {
    /// HTTP endpoint returning the initial tile set (a descriptor or
    /// an array of descriptors).
    pub feed_url: String,
    /// WebSocket endpoint for change notifications.
    pub ws_url: String,
    /// Debounce window in milliseconds; notifications for the same
    /// tile inside the window coalesce.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Session flag: tiles load only when this is `"on"`.
    #[serde(default = "default_load_flag")]
    pub load: String,
    /// Session flag: when false, every change escalates to a full
    /// application reload instead of a partial tile reload.
    #[serde(default = "default_true")]
    pub partial_reload: bool,
}

impl DebugConfig {
    /// Build a config for a development server base URL, deriving the
    /// feed and WebSocket endpoints from it.
    #[must_use]
    pub fn for_base(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        let ws_base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            format!("ws://{base}")
        };
        Self {
            feed_url: format!("{base}{DEFAULT_FEED_PATH}"),
            ws_url: format!("{ws_base}{DEFAULT_FEED_PATH}"),
            debounce_ms: default_debounce_ms(),
            load: default_load_flag(),
            partial_reload: true,
        }
    }

    /// Whether the initial tile set should load at all.
    #[must_use]
    pub fn load_enabled(&self) -> bool {
        self.load == "on"
    }

    /// The debounce window as a [`Duration`].
    #[must_use]
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self::for_base("http://localhost:9000")
    }
}
