use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_REALTIME_INTERVAL_MS: u64 = 1_000;
pub const DEFAULT_REALTIME_TIMEOUT_MS: u64 = 500;
pub const DEFAULT_DEBOUNCE_MS: u64 = 16;
pub const DEFAULT_EVENT_BUFFER: usize = 512;

/// Tuning for the integrator, the realtime poller and the debounce lanes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegratorConfig {
    pub realtime_enabled: bool,
    pub realtime_interval_ms: u64,
    pub realtime_timeout_ms: u64,
    pub debounce_ms: u64,
    pub event_buffer: usize,
}

impl Default for IntegratorConfig {
    fn default() -> Self {
        Self {
            realtime_enabled: true,
            realtime_interval_ms: DEFAULT_REALTIME_INTERVAL_MS,
            realtime_timeout_ms: DEFAULT_REALTIME_TIMEOUT_MS,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}

impl IntegratorConfig {
    /// Apply `AUDION_*` environment overrides on top of the current values.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(enabled) = resolve_flag("AUDION_REALTIME") {
            self.realtime_enabled = enabled;
        }
        if let Some(ms) = resolve_millis("AUDION_REALTIME_INTERVAL_MS") {
            self.realtime_interval_ms = ms;
        }
        if let Some(ms) = resolve_millis("AUDION_REALTIME_TIMEOUT_MS") {
            self.realtime_timeout_ms = ms;
        }
        if let Some(ms) = resolve_millis("AUDION_DEBOUNCE_MS") {
            self.debounce_ms = ms;
        }
        self
    }

    pub fn realtime_interval(&self) -> Duration {
        Duration::from_millis(self.realtime_interval_ms.max(1))
    }

    pub fn realtime_timeout(&self) -> Duration {
        Duration::from_millis(self.realtime_timeout_ms.max(1))
    }

    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

fn resolve_flag(key: &str) -> Option<bool> {
    // "0", "false", "no", "off" disable; anything else non-empty enables
    let value = env::var(key).ok()?;
    let lower = value.trim().to_ascii_lowercase();
    if lower.is_empty() {
        return None;
    }
    Some(!matches!(lower.as_str(), "0" | "false" | "no" | "off"))
}

fn resolve_millis(key: &str) -> Option<u64> {
    env::var(key).ok()?.trim().parse().ok()
}
