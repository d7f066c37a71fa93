//! Loader and device configuration
//!
//! Defaults can be overridden through environment variables, read once.

use std::sync::OnceLock;
use std::time::Duration;

/// Hard ceiling on the transcoding worker pool size.
pub const DEFAULT_MAX_WORKERS: usize = 4;

/// Worker pool size override from `MIPFORGE_MAX_WORKERS`.
pub fn max_workers_from_env() -> Option<usize> {
    static MAX_WORKERS: OnceLock<Option<usize>> = OnceLock::new();
    *MAX_WORKERS.get_or_init(|| {
        std::env::var("MIPFORGE_MAX_WORKERS")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|&v| v > 0)
    })
}

/// Configuration for the texture loader
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Maximum number of transcoding workers
    pub max_workers: usize,

    /// Thread name prefix for workers (`<prefix>-<index>`)
    pub worker_thread_prefix: String,

    /// Timeout for remote URL fetches
    pub http_timeout: Duration,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            max_workers: max_workers_from_env().unwrap_or(DEFAULT_MAX_WORKERS),
            worker_thread_prefix: "mipforge-worker".to_string(),
            http_timeout: Duration::from_secs(30),
        }
    }
}

impl LoaderConfig {
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_workers == 0 {
            return Err(ConfigError::NoWorkers);
        }

        if self.worker_thread_prefix.is_empty() {
            return Err(ConfigError::EmptyThreadPrefix);
        }

        Ok(())
    }
}

/// Adapter selection for the wgpu device
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Explicit adapter index; `None` picks the best scoring adapter
    pub gpu_index: Option<usize>,

    pub backends: wgpu::Backends,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            gpu_index: None,
            backends: wgpu::Backends::VULKAN | wgpu::Backends::DX12 | wgpu::Backends::METAL,
        }
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("max_workers must be at least 1")]
    NoWorkers,

    #[error("worker thread prefix must not be empty")]
    EmptyThreadPrefix,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = LoaderConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.max_workers >= 1);
    }

    #[test]
    fn test_zero_workers_rejected() {
        let config = LoaderConfig::default().with_max_workers(0);
        assert_eq!(config.validate(), Err(ConfigError::NoWorkers));
    }

    #[test]
    fn test_empty_prefix_rejected() {
        let mut config = LoaderConfig::default();
        config.worker_thread_prefix.clear();
        assert_eq!(config.validate(), Err(ConfigError::EmptyThreadPrefix));
    }
}
