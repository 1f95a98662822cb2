//! Configuration loader with hierarchical merging.
//!
//! # Load Order
//!
//! 1. Default values (compile-time)
//! 2. Global config (`~/.rmts/config.toml`)
//! 3. Project config (`.rmts/config.toml`)
//! 4. Explicit file (`--config <path>`)
//! 5. Environment variables (`RMTS_*`)
//!
//! Each layer overrides the previous.

use super::{default_config_path, ConfigError, RuntimeConfig, PROJECT_CONFIG_DIR, PROJECT_CONFIG_FILE};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Helper macro for parsing numeric environment variables.
macro_rules! parse_env_num {
    ($field:expr, $var:literal) => {
        if let Ok(val) = std::env::var($var) {
            $field = val
                .trim()
                .parse()
                .map_err(|_| ConfigError::invalid_env_var($var, "expected unsigned integer"))?;
        }
    };
}

/// Configuration loader with builder pattern.
///
/// # Example
///
/// ```no_run
/// use rmts_core::config::ConfigLoader;
///
/// let config = ConfigLoader::new()
///     .with_project_root("/path/to/project")
///     .skip_env_vars()
///     .load()
///     .expect("config should load");
/// assert!(config.mailbox.size > 0);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    /// Global config file path (defaults to ~/.rmts/config.toml).
    global_config_path: Option<PathBuf>,

    /// Project root directory.
    project_root: Option<PathBuf>,

    /// Explicit config file, applied after the project layer.
    explicit_file: Option<PathBuf>,

    /// Skip environment variable loading.
    skip_env: bool,

    /// Skip global config loading.
    skip_global: bool,

    /// Skip project config loading.
    skip_project: bool,
}

impl ConfigLoader {
    /// Creates a new loader with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a custom global config path.
    #[must_use]
    pub fn with_global_config(mut self, path: impl Into<PathBuf>) -> Self {
        self.global_config_path = Some(path.into());
        self
    }

    /// Sets the project root directory.
    ///
    /// Project config will be loaded from `<project_root>/.rmts/config.toml`.
    #[must_use]
    pub fn with_project_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.project_root = Some(path.into());
        self
    }

    /// Adds an explicit config file layer.
    ///
    /// Unlike the global and project files, a missing explicit file is an
    /// error.
    #[must_use]
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.explicit_file = Some(path.into());
        self
    }

    /// Skips environment variable loading.
    ///
    /// Useful for testing with deterministic config.
    #[must_use]
    pub fn skip_env_vars(mut self) -> Self {
        self.skip_env = true;
        self
    }

    /// Skips global config loading.
    #[must_use]
    pub fn skip_global_config(mut self) -> Self {
        self.skip_global = true;
        self
    }

    /// Skips project config loading.
    #[must_use]
    pub fn skip_project_config(mut self) -> Self {
        self.skip_project = true;
        self
    }

    /// Loads, merges and validates configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if any config file exists but cannot be
    /// parsed, an environment variable is malformed, or the merged result
    /// fails validation. Missing global/project files are silently ignored.
    pub fn load(&self) -> Result<RuntimeConfig, ConfigError> {
        let mut config = RuntimeConfig::default();

        if !self.skip_global {
            let global_path = self
                .global_config_path
                .clone()
                .unwrap_or_else(default_config_path);

            if let Some(global_config) = Self::load_file(&global_path)? {
                debug!(path = %global_path.display(), "Loaded global config");
                config.merge(&global_config);
            }
        }

        if !self.skip_project {
            if let Some(ref project_root) = self.project_root {
                let project_config_path = project_root
                    .join(PROJECT_CONFIG_DIR)
                    .join(PROJECT_CONFIG_FILE);

                if let Some(project_config) = Self::load_file(&project_config_path)? {
                    debug!(
                        path = %project_config_path.display(),
                        project = %project_root.display(),
                        "Loaded project config"
                    );
                    config.merge(&project_config);
                }
            }
        }

        if let Some(ref explicit) = self.explicit_file {
            let content = std::fs::read_to_string(explicit)
                .map_err(|e| ConfigError::read_file(explicit, e))?;
            let explicit_config = RuntimeConfig::from_toml(&content)
                .map_err(|e| ConfigError::parse_toml(explicit, e))?;
            debug!(path = %explicit.display(), "Loaded explicit config");
            config.merge(&explicit_config);
        }

        if !self.skip_env {
            Self::apply_env_vars(&mut config)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Loads a config file, returning None if it doesn't exist.
    fn load_file(path: &Path) -> Result<Option<RuntimeConfig>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;

        let config =
            RuntimeConfig::from_toml(&content).map_err(|e| ConfigError::parse_toml(path, e))?;

        Ok(Some(config))
    }

    /// Applies environment variable overrides.
    fn apply_env_vars(config: &mut RuntimeConfig) -> Result<(), ConfigError> {
        parse_env_num!(config.mailbox.size, "RMTS_MAILBOX_SIZE");
        parse_env_num!(config.mailbox.argument_queue_size, "RMTS_ARGUMENT_QUEUE_SIZE");
        parse_env_num!(config.proxy.heartbeat_ms, "RMTS_HEARTBEAT_MS");
        parse_env_num!(config.proxy.request_timeout_ms, "RMTS_REQUEST_TIMEOUT_MS");

        if let Ok(val) = std::env::var("RMTS_PROXY_BIND") {
            config.proxy.bind = val;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_config_file(dir: &Path, content: &str) -> PathBuf {
        let path = dir.join("config.toml");
        std::fs::write(&path, content).expect("write config file");
        path
    }

    #[test]
    fn load_defaults_only() {
        let config = ConfigLoader::new()
            .skip_global_config()
            .skip_project_config()
            .skip_env_vars()
            .load()
            .expect("defaults load");

        assert_eq!(config, RuntimeConfig::default());
    }

    #[test]
    fn load_global_config() {
        let temp = TempDir::new().expect("tempdir");
        let config_path = create_config_file(
            temp.path(),
            r#"
[mailbox]
size = 32

[proxy]
heartbeat_ms = 500
"#,
        );

        let config = ConfigLoader::new()
            .with_global_config(&config_path)
            .skip_project_config()
            .skip_env_vars()
            .load()
            .expect("global config loads");

        assert_eq!(config.mailbox.size, 32);
        assert_eq!(config.proxy.heartbeat_ms, 500);
    }

    #[test]
    fn load_project_overrides_global() {
        let global_temp = TempDir::new().expect("tempdir");
        let project_temp = TempDir::new().expect("tempdir");

        let rmts_dir = project_temp.path().join(".rmts");
        std::fs::create_dir_all(&rmts_dir).expect("create .rmts");

        let global_path = create_config_file(
            global_temp.path(),
            r#"
[mailbox]
size = 32
argument_queue_size = 16
"#,
        );

        create_config_file(
            &rmts_dir,
            r#"
[mailbox]
argument_queue_size = 8
"#,
        );

        let config = ConfigLoader::new()
            .with_global_config(&global_path)
            .with_project_root(project_temp.path())
            .skip_env_vars()
            .load()
            .expect("layered config loads");

        // size from global (not overridden in project)
        assert_eq!(config.mailbox.size, 32);
        assert_eq!(config.mailbox.argument_queue_size, 8);
    }

    #[test]
    fn explicit_file_wins_over_project() {
        let project_temp = TempDir::new().expect("tempdir");
        let rmts_dir = project_temp.path().join(".rmts");
        std::fs::create_dir_all(&rmts_dir).expect("create .rmts");
        create_config_file(&rmts_dir, "[proxy]\nbind = \"127.0.0.1:1\"\n");

        let explicit_temp = TempDir::new().expect("tempdir");
        let explicit = create_config_file(explicit_temp.path(), "[proxy]\nbind = \"127.0.0.1:2\"\n");

        let config = ConfigLoader::new()
            .skip_global_config()
            .with_project_root(project_temp.path())
            .with_file(&explicit)
            .skip_env_vars()
            .load()
            .expect("explicit config loads");

        assert_eq!(config.proxy.bind, "127.0.0.1:2");
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let err = ConfigLoader::new()
            .skip_global_config()
            .skip_project_config()
            .with_file("/nonexistent/rmts.toml")
            .skip_env_vars()
            .load()
            .expect_err("missing explicit file must fail");

        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }

    #[test]
    fn missing_config_files_ok() {
        let config = ConfigLoader::new()
            .with_global_config("/nonexistent/path/config.toml")
            .with_project_root("/nonexistent/project")
            .skip_env_vars()
            .load()
            .expect("missing files are ignored");

        assert_eq!(config, RuntimeConfig::default());
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let temp = TempDir::new().expect("tempdir");
        let path = create_config_file(temp.path(), "[mailbox\nsize = ");

        let err = ConfigLoader::new()
            .with_global_config(&path)
            .skip_project_config()
            .skip_env_vars()
            .load()
            .expect_err("broken toml must fail");

        assert!(matches!(err, ConfigError::ParseToml { .. }));
    }

    #[test]
    fn zero_mailbox_fails_validation() {
        let temp = TempDir::new().expect("tempdir");
        let path = create_config_file(temp.path(), "[mailbox]\nsize = 0\n");

        let err = ConfigLoader::new()
            .with_global_config(&path)
            .skip_project_config()
            .skip_env_vars()
            .load()
            .expect_err("zero mailbox must fail");

        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn env_var_override() {
        // This test modifies env vars, run in isolation
        std::env::set_var("RMTS_MAILBOX_SIZE", "12");
        std::env::set_var("RMTS_PROXY_BIND", "127.0.0.1:9999");

        let config = ConfigLoader::new()
            .skip_global_config()
            .skip_project_config()
            .load();

        std::env::remove_var("RMTS_MAILBOX_SIZE");
        std::env::remove_var("RMTS_PROXY_BIND");

        let config = config.expect("env config loads");
        assert_eq!(config.mailbox.size, 12);
        assert_eq!(config.proxy.bind, "127.0.0.1:9999");
    }
}
