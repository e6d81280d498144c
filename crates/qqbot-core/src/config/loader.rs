//! Configuration loading and persistence.

use super::BotConfig;
use crate::error::ConfigError;
use crate::paths;
use std::fs;
use std::path::{Path, PathBuf};

impl BotConfig {
    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = paths::config_file()?;
        Self::load(&path)
    }

    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from a string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        json5::from_str(content).map_err(|e| ConfigError::Json5(e.to_string()))
    }

    /// Save configuration to a file path.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::Parse(e.to_string()))?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Write atomically
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, &content)?;
        fs::rename(&temp_path, path)?;

        Ok(())
    }

    /// Check that the bot can authenticate at all.
    ///
    /// Failures here are fatal: the runtime refuses to start.
    pub fn validate_credentials(&self) -> Result<(), ConfigError> {
        let creds = &self.credentials;
        if creds.app_id.trim().is_empty() {
            return Err(ConfigError::Credentials("app_id is empty".to_string()));
        }

        let has_token = creds.token.as_ref().is_some_and(|t| !t.is_blank());
        let has_secret = creds.secret.as_ref().is_some_and(|s| !s.is_blank());
        if !has_token && !has_secret {
            return Err(ConfigError::Credentials(
                "either credentials.token or credentials.secret must be set".to_string(),
            ));
        }

        Ok(())
    }

    /// Validate the configuration, collecting all errors before returning.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_credentials()?;

        let mut errors = Vec::new();

        if self.api.max_concurrency == 0 {
            errors.push("api.max_concurrency must be greater than 0".to_string());
        }
        if self.api.timeout_secs == 0 {
            errors.push("api.timeout_secs must be greater than 0".to_string());
        }
        if let Some(url) = &self.api.base_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                errors.push(format!("api.base_url '{}' must be an http(s) URL", url));
            }
        }

        if self.gateway.shard_total == Some(0) {
            errors.push("gateway.shard_total must be at least 1".to_string());
        }
        if self.gateway.idle_timeout_secs == 0 {
            errors.push("gateway.idle_timeout_secs must be greater than 0".to_string());
        }
        if self.gateway.dedup_capacity == 0 {
            errors.push("gateway.dedup_capacity must be greater than 0".to_string());
        }
        if self.gateway.invalid_session_delay_min_ms > self.gateway.invalid_session_delay_max_ms {
            errors.push(format!(
                "gateway.invalid_session_delay_min_ms ({}) exceeds max ({})",
                self.gateway.invalid_session_delay_min_ms,
                self.gateway.invalid_session_delay_max_ms
            ));
        }

        if self.dispatch.worker_threads == 0 {
            errors.push("dispatch.worker_threads must be greater than 0".to_string());
        }

        if self.session.sweep_interval_ms == 0 {
            errors.push("session.sweep_interval_ms must be greater than 0".to_string());
        }
        if self.session.snapshot_every_ticks == 0 {
            errors.push("session.snapshot_every_ticks must be greater than 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors.join("; ")))
        }
    }

    /// Directory session snapshots are committed to.
    pub fn session_commit_dir(&self) -> Result<PathBuf, ConfigError> {
        match &self.session.commit_dir {
            Some(dir) => Ok(paths::expand_tilde(&dir.to_string_lossy())),
            None => paths::sessions_dir(),
        }
    }
}
