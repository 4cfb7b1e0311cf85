//! Core types shared by the kernel and the actor runtime

use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ConfigError, ConfigResult};

/// Default number of interpreter steps before a computation yields
pub const DEFAULT_TIME_SLICE: usize = 10_000;

/// Actor address - unique within an actor system
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address(Arc<str>);

impl Address {
    /// Create an address from a path such as `"system/counter"`
    pub fn new(path: impl AsRef<str>) -> Self {
        Address(Arc::from(path.as_ref()))
    }

    /// Generate a fresh address with the given prefix
    pub fn generate(prefix: &str) -> Self {
        Address::new(format!("{}-{}", prefix, Uuid::new_v4()))
    }

    /// Get the address path
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Address {
    fn from(path: &str) -> Self {
        Address::new(path)
    }
}

/// Runtime configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KlvmConfig {
    /// Name of the actor system
    pub system_name: String,
    /// Interpreter steps per time slice
    pub time_slice: usize,
    /// Number of executor worker threads
    pub worker_threads: usize,
    /// Default wait for an ask response in milliseconds
    pub ask_timeout_ms: u64,
    /// Step bound for synchronous computations run outside an actor
    pub configure_step_limit: usize,
}

impl Default for KlvmConfig {
    fn default() -> Self {
        KlvmConfig {
            system_name: "klvm".to_string(),
            time_slice: DEFAULT_TIME_SLICE,
            worker_threads: num_cpus::get(),
            ask_timeout_ms: 5_000,
            configure_step_limit: 1_000_000,
        }
    }
}

impl KlvmConfig {
    /// Parse a configuration from TOML text
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: KlvmConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    /// Render the configuration as TOML
    pub fn to_toml_string(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check value ranges
    pub fn validate(&self) -> ConfigResult<()> {
        if self.time_slice == 0 {
            return Err(ConfigError::Invalid("time_slice must be positive".to_string()));
        }
        if self.worker_threads == 0 {
            return Err(ConfigError::Invalid("worker_threads must be positive".to_string()));
        }
        if self.configure_step_limit == 0 {
            return Err(ConfigError::Invalid("configure_step_limit must be positive".to_string()));
        }
        Ok(())
    }

    /// Builder-style override of the worker thread count
    pub fn with_worker_threads(mut self, worker_threads: usize) -> Self {
        self.worker_threads = worker_threads;
        self
    }

    /// Builder-style override of the time slice
    pub fn with_time_slice(mut self, time_slice: usize) -> Self {
        self.time_slice = time_slice;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = KlvmConfig::default();
        assert_eq!(config.time_slice, 10_000);
        assert!(config.worker_threads > 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = KlvmConfig::from_toml_str("time_slice = 64\n").unwrap();
        assert_eq!(config.time_slice, 64);
        assert_eq!(config.ask_timeout_ms, 5_000);
        assert_eq!(config.system_name, "klvm");
    }

    #[test]
    fn test_zero_time_slice_rejected() {
        let result = KlvmConfig::from_toml_str("time_slice = 0\n");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_config_toml_round_trip() {
        let config = KlvmConfig::default().with_worker_threads(3);
        let text = config.to_toml_string().unwrap();
        let parsed = KlvmConfig::from_toml_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_address_display() {
        let address = Address::new("system/counter");
        assert_eq!(address.to_string(), "system/counter");
        let generated = Address::generate("actor");
        assert!(generated.as_str().starts_with("actor-"));
    }
}
