//! Configuration types.
//!
//! All types implement [`Default`] for compile-time fallback values.

use super::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default capacity of an end-user mailbox and of each argument queue.
pub const DEFAULT_MAIL_BOX_SIZE: usize = 64;

/// Main runtime configuration.
///
/// This is the unified configuration after merging all layers.
///
/// # Example
///
/// ```
/// use rmts_core::config::RuntimeConfig;
///
/// let config = RuntimeConfig::default();
/// assert_eq!(config.mailbox.size, 64);
/// assert_eq!(config.proxy.heartbeat_ms, 2000);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Sizing of end-user mailboxes.
    pub mailbox: MailboxConfig,

    /// Task runner timing.
    pub task: TaskConfig,

    /// Network proxy settings.
    pub proxy: ProxyConfig,
}

impl RuntimeConfig {
    /// Creates a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serializes to TOML string.
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Deserializes from TOML string.
    ///
    /// # Errors
    ///
    /// Returns error if deserialization fails.
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(toml_str)
    }

    /// Merges another config into this one.
    ///
    /// Values from `other` override values in `self` only if they
    /// differ from the default.
    pub fn merge(&mut self, other: &Self) {
        self.mailbox.merge(&other.mailbox);
        self.task.merge(&other.task);
        self.proxy.merge(&other.proxy);
    }

    /// Rejects values no runtime can work with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mailbox.size == 0 {
            return Err(ConfigError::invalid_value("mailbox.size", "must be > 0"));
        }
        if self.mailbox.argument_queue_size == 0 {
            return Err(ConfigError::invalid_value(
                "mailbox.argument_queue_size",
                "must be > 0",
            ));
        }
        if self.proxy.max_frame_bytes < 64 {
            return Err(ConfigError::invalid_value(
                "proxy.max_frame_bytes",
                "must be >= 64",
            ));
        }
        if self.proxy.outbound_queue == 0 {
            return Err(ConfigError::invalid_value(
                "proxy.outbound_queue",
                "must be > 0",
            ));
        }
        Ok(())
    }
}

/// Mailbox sizing applied to end-user clones created after loading.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MailboxConfig {
    /// Maximum pending entries per clone mailbox.
    pub size: usize,

    /// Maximum pending argument copies per queued write command.
    pub argument_queue_size: usize,
}

impl Default for MailboxConfig {
    fn default() -> Self {
        Self {
            size: DEFAULT_MAIL_BOX_SIZE,
            argument_queue_size: DEFAULT_MAIL_BOX_SIZE,
        }
    }
}

impl MailboxConfig {
    fn merge(&mut self, other: &Self) {
        let default = Self::default();

        if other.size != default.size {
            self.size = other.size;
        }
        if other.argument_queue_size != default.argument_queue_size {
            self.argument_queue_size = other.argument_queue_size;
        }
    }
}

/// Task runner timing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TaskConfig {
    /// Period of periodic tasks that do not set their own.
    pub default_period_ms: u64,

    /// Longest sleep of an event-driven task between wake-ups.
    pub idle_wait_ms: u64,

    /// How long `stop_all` waits for a task thread to finish.
    pub shutdown_timeout_ms: u64,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            default_period_ms: 10,
            idle_wait_ms: 50,
            shutdown_timeout_ms: 2_000,
        }
    }
}

impl TaskConfig {
    fn merge(&mut self, other: &Self) {
        let default = Self::default();

        if other.default_period_ms != default.default_period_ms {
            self.default_period_ms = other.default_period_ms;
        }
        if other.idle_wait_ms != default.idle_wait_ms {
            self.idle_wait_ms = other.idle_wait_ms;
        }
        if other.shutdown_timeout_ms != default.shutdown_timeout_ms {
            self.shutdown_timeout_ms = other.shutdown_timeout_ms;
        }
    }

    /// Default period as a [`Duration`].
    #[must_use]
    pub fn default_period(&self) -> Duration {
        Duration::from_millis(self.default_period_ms)
    }

    /// Idle wait as a [`Duration`].
    #[must_use]
    pub fn idle_wait(&self) -> Duration {
        Duration::from_millis(self.idle_wait_ms)
    }

    /// Shutdown timeout as a [`Duration`].
    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

/// Network proxy settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listen address of `rmts serve`.
    pub bind: String,

    /// Interval between heartbeat pushes on every connection.
    pub heartbeat_ms: u64,

    /// Upper bound for a VoidReturn/WriteReturn relay and for client calls.
    pub request_timeout_ms: u64,

    /// Largest accepted frame body.
    pub max_frame_bytes: u32,

    /// Capacity of each connection's outbound frame queue.
    pub outbound_queue: usize,

    /// Events a client keeps before dropping the oldest.
    pub event_buffer: usize,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:7420".into(),
            heartbeat_ms: 2_000,
            request_timeout_ms: 5_000,
            max_frame_bytes: 4 * 1024 * 1024,
            outbound_queue: 256,
            event_buffer: 256,
        }
    }
}

impl ProxyConfig {
    fn merge(&mut self, other: &Self) {
        let default = Self::default();

        if other.bind != default.bind {
            self.bind.clone_from(&other.bind);
        }
        if other.heartbeat_ms != default.heartbeat_ms {
            self.heartbeat_ms = other.heartbeat_ms;
        }
        if other.request_timeout_ms != default.request_timeout_ms {
            self.request_timeout_ms = other.request_timeout_ms;
        }
        if other.max_frame_bytes != default.max_frame_bytes {
            self.max_frame_bytes = other.max_frame_bytes;
        }
        if other.outbound_queue != default.outbound_queue {
            self.outbound_queue = other.outbound_queue;
        }
        if other.event_buffer != default.event_buffer {
            self.event_buffer = other.event_buffer;
        }
    }

    /// Heartbeat interval as a [`Duration`].
    #[must_use]
    pub fn heartbeat(&self) -> Duration {
        Duration::from_millis(self.heartbeat_ms)
    }

    /// Request timeout as a [`Duration`].
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}
