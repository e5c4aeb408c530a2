//! Configuration file loader.

use super::error::{ConfigError, ConfigResult};
use super::types::DispatcherConfig;
use crate::modules::load_balancer::{BackendsFile, StrategyContainer};
use std::path::Path;

/// Loads and validates dispatcher configuration.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConfigLoader;

impl ConfigLoader {
    /// Create a new configuration loader.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Load configuration from a file path.
    ///
    /// When `balancer.backends_file` is set, its entries replace any inline
    /// `[[balancer.backends]]`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file does not exist
    /// - The file cannot be read
    /// - The TOML is malformed
    /// - Validation fails
    pub fn load<P: AsRef<Path>>(&self, path: P) -> ConfigResult<DispatcherConfig> {
        let content = read(path.as_ref())?;
        let mut config = self.load_str(&content)?;

        if let Some(backends_file) = &config.balancer.backends_file {
            config.balancer.backends = self.load_backends_file(backends_file)?.backends;
        }

        Ok(config)
    }

    /// Load configuration from a TOML string.
    ///
    /// The backends file is not read here.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The TOML is malformed
    /// - Validation fails
    pub fn load_str(&self, content: &str) -> ConfigResult<DispatcherConfig> {
        let config: DispatcherConfig = toml::from_str(content)?;
        self.validate(&config)?;
        Ok(config)
    }

    /// Load a `[[backends]]` file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, unreadable or malformed.
    pub fn load_backends_file<P: AsRef<Path>>(&self, path: P) -> ConfigResult<BackendsFile> {
        let content = read(path.as_ref())?;
        Ok(toml::from_str(&content)?)
    }

    /// Validate a configuration.
    ///
    /// # Errors
    ///
    /// Returns every problem found, joined with `; `.
    pub fn validate(&self, config: &DispatcherConfig) -> ConfigResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = config.http.validate() {
            errors.push(format!("http: {e}"));
        }
        if let Err(e) = config.retry.validate() {
            errors.push(format!("retry: {e}"));
        }
        if let Err(e) = StrategyContainer::from_name(&config.balancer.strategy) {
            errors.push(format!("balancer: {e}"));
        }
        if config.balancer.health_check_interval.is_zero() {
            errors.push("balancer: health_check_interval must be greater than 0".to_string());
        }
        if config.balancer.watch_backends && config.balancer.backends_file.is_none() {
            errors.push("balancer: watch_backends requires backends_file".to_string());
        }
        if config.balancer.watch_interval.is_zero() {
            errors.push("balancer: watch_interval must be greater than 0".to_string());
        }
        if let Err(e) = config.bucket.validate() {
            errors.push(format!("bucket: {e}"));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::ValidationError(errors.join("; ")))
        }
    }
}

fn read(path: &Path) -> ConfigResult<String> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })
}
