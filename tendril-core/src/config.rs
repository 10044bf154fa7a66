//! Runtime Configuration
//!
//! Tunables for the batch scheduler and error escalation.
//!
//! A process-wide default is kept behind a lock so hosts can configure the
//! runtime once at startup. Because every thread owns its own reactive
//! runtime, a thread may also override the default for itself; tests rely on
//! this to tweak behavior without affecting each other.

use std::cell::Cell;
use std::sync::OnceLock;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Default cap on flush rounds before the scheduler gives up.
pub const DEFAULT_MAX_FLUSH_ROUNDS: usize = 100;

/// Configuration consulted by the runtime on every flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Maximum number of flush rounds in one batch.
    ///
    /// Effects that write signals they depend on schedule themselves again;
    /// this bounds such feedback loops.
    pub max_flush_rounds: usize,

    /// Whether unhandled effect failures are re-raised once the batch
    /// settles. When `false` they are only logged at `error` level.
    pub escalate_unhandled: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_flush_rounds: DEFAULT_MAX_FLUSH_ROUNDS,
            escalate_unhandled: true,
        }
    }
}

static GLOBAL_DEFAULT: OnceLock<RwLock<RuntimeConfig>> = OnceLock::new();

thread_local! {
    static THREAD_OVERRIDE: Cell<Option<RuntimeConfig>> = const { Cell::new(None) };
}

fn global_default() -> &'static RwLock<RuntimeConfig> {
    GLOBAL_DEFAULT.get_or_init(|| RwLock::new(RuntimeConfig::default()))
}

impl RuntimeConfig {
    /// Set the flush round limit.
    pub fn with_max_flush_rounds(mut self, rounds: usize) -> Self {
        self.max_flush_rounds = rounds.max(1);
        self
    }

    /// Choose whether unhandled effect failures are re-raised.
    pub fn with_escalate_unhandled(mut self, escalate: bool) -> Self {
        self.escalate_unhandled = escalate;
        self
    }

    /// The configuration in effect on the calling thread.
    ///
    /// A flush round limit of zero, from a deserialized or hand-built value,
    /// is read as one.
    pub fn current() -> Self {
        let config = THREAD_OVERRIDE
            .with(Cell::get)
            .unwrap_or_else(|| *global_default().read());
        config.with_max_flush_rounds(config.max_flush_rounds)
    }

    /// Replace the process-wide default.
    ///
    /// Threads that installed an override keep using it.
    pub fn set_global_default(config: RuntimeConfig) {
        *global_default().write() = config;
    }

    /// Override the configuration for the calling thread's runtime.
    pub fn set_for_thread(config: RuntimeConfig) {
        THREAD_OVERRIDE.with(|cell| cell.set(Some(config)));
    }

    /// Drop the calling thread's override, falling back to the global default.
    pub fn clear_thread_override() {
        THREAD_OVERRIDE.with(|cell| cell.set(None));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.max_flush_rounds, DEFAULT_MAX_FLUSH_ROUNDS);
        assert!(config.escalate_unhandled);
    }

    #[test]
    fn thread_override_wins() {
        let custom = RuntimeConfig::default()
            .with_max_flush_rounds(3)
            .with_escalate_unhandled(false);
        RuntimeConfig::set_for_thread(custom);
        assert_eq!(RuntimeConfig::current(), custom);

        RuntimeConfig::clear_thread_override();
        assert_eq!(
            RuntimeConfig::current().max_flush_rounds,
            global_default().read().max_flush_rounds
        );
    }

    #[test]
    fn zero_rounds_is_clamped() {
        assert_eq!(RuntimeConfig::default().with_max_flush_rounds(0).max_flush_rounds, 1);
    }

    #[test]
    fn zero_rounds_from_any_source_is_clamped_when_read() {
        let config: RuntimeConfig = serde_json::from_str(r#"{ "max_flush_rounds": 0 }"#).unwrap();
        assert_eq!(config.max_flush_rounds, 0);

        RuntimeConfig::set_for_thread(config);
        assert_eq!(RuntimeConfig::current().max_flush_rounds, 1);

        RuntimeConfig::set_for_thread(RuntimeConfig {
            max_flush_rounds: 0,
            escalate_unhandled: false,
        });
        assert_eq!(RuntimeConfig::current().max_flush_rounds, 1);
        RuntimeConfig::clear_thread_override();
    }

    #[test]
    fn partial_config_deserializes_with_defaults() {
        let config: RuntimeConfig = serde_json::from_str(r#"{ "max_flush_rounds": 8 }"#).unwrap();
        assert_eq!(config.max_flush_rounds, 8);
        assert!(config.escalate_unhandled);
    }
}
