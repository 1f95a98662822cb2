//! Runtime configuration with hierarchical layering.
//!
//! # Architecture
//!
//! ```text
//! Priority (highest to lowest):
//!
//! ┌─────────────────────────────────────────┐
//! │  1. Environment Variables (RMTS_*)      │  Runtime override
//! ├─────────────────────────────────────────┤
//! │  2. Explicit file (--config)            │  Per invocation
//! ├─────────────────────────────────────────┤
//! │  3. Project Config (.rmts/config.toml)  │  Project-specific
//! ├─────────────────────────────────────────┤
//! │  4. Global Config (~/.rmts/config.toml) │  User defaults
//! ├─────────────────────────────────────────┤
//! │  5. Default Values (compile-time)       │  Fallback
//! └─────────────────────────────────────────┘
//! ```
//!
//! Mailbox sizes are read when an end-user clone is created, so changes
//! only affect clones created afterwards.
//!
//! # Environment Variables
//!
//! | Variable | Config Field | Type |
//! |----------|--------------|------|
//! | `RMTS_MAILBOX_SIZE` | `mailbox.size` | usize |
//! | `RMTS_ARGUMENT_QUEUE_SIZE` | `mailbox.argument_queue_size` | usize |
//! | `RMTS_PROXY_BIND` | `proxy.bind` | String |
//! | `RMTS_HEARTBEAT_MS` | `proxy.heartbeat_ms` | u64 |
//! | `RMTS_REQUEST_TIMEOUT_MS` | `proxy.request_timeout_ms` | u64 |
//!
//! # Example Configuration
//!
//! ```toml
//! # ~/.rmts/config.toml
//!
//! [mailbox]
//! size = 64
//! argument_queue_size = 64
//!
//! [task]
//! default_period_ms = 10
//! idle_wait_ms = 50
//! shutdown_timeout_ms = 2000
//!
//! [proxy]
//! bind = "127.0.0.1:7420"
//! heartbeat_ms = 2000
//! request_timeout_ms = 5000
//! max_frame_bytes = 4194304
//! outbound_queue = 256
//! event_buffer = 256
//! ```

mod error;
mod loader;
mod types;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use types::{MailboxConfig, ProxyConfig, RuntimeConfig, TaskConfig, DEFAULT_MAIL_BOX_SIZE};

/// Default global config directory.
pub fn default_config_dir() -> std::path::PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join(".rmts")
}

/// Default global config file path.
pub fn default_config_path() -> std::path::PathBuf {
    default_config_dir().join("config.toml")
}

/// Project config directory name.
pub const PROJECT_CONFIG_DIR: &str = ".rmts";

/// Project config file name.
pub const PROJECT_CONFIG_FILE: &str = "config.toml";
