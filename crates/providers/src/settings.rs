//! Provider credentials and timing, loaded from the environment.

use std::time::Duration;

use kiara_core::registry::ProviderService;

use crate::error::ProviderError;
use crate::supervisor::PollConfig;

/// Base URL and credential for one upstream service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub base_url: String,
    /// `None` when the key env var is unset.
    pub api_key: Option<String>,
    /// Env var name, used in error messages.
    pub key_var: &'static str,
}

impl ServiceConfig {
    fn from_env(key_var: &'static str, url_var: &str, default_url: &str) -> Self {
        let base_url = std::env::var(url_var)
            .unwrap_or_else(|_| default_url.into())
            .trim_end_matches('/')
            .to_string();
        let api_key = std::env::var(key_var)
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());
        Self {
            base_url,
            api_key,
            key_var,
        }
    }

    /// The API key, or a configuration error naming the missing variable.
    pub fn require_key(&self) -> Result<&str, ProviderError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| ProviderError::Configuration(format!("{} is not set", self.key_var)))
    }
}

/// Settings for every upstream service plus shared HTTP and poll timing.
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub wavespeed: ServiceConfig,
    pub fal: ServiceConfig,
    pub replicate: ServiceConfig,
    pub runninghub: ServiceConfig,
    /// Timeout applied to each individual provider HTTP call.
    pub http_timeout: Duration,
    pub poll: PollConfig,
}

impl ProviderSettings {
    /// Load provider settings from environment variables with defaults.
    ///
    /// | Env Var                     | Default                          |
    /// |-----------------------------|----------------------------------|
    /// | `WAVESPEED_API_KEY`         | unset                            |
    /// | `WAVESPEED_BASE_URL`        | `https://api.wavespeed.ai/api/v3`|
    /// | `FAL_API_KEY`               | unset                            |
    /// | `FAL_BASE_URL`              | `https://fal.run`                |
    /// | `REPLICATE_API_KEY`         | unset                            |
    /// | `REPLICATE_BASE_URL`        | `https://api.replicate.com/v1`   |
    /// | `RUNNINGHUB_API_KEY`        | unset                            |
    /// | `RUNNINGHUB_BASE_URL`       | `https://www.runninghub.ai`      |
    /// | `PROVIDER_HTTP_TIMEOUT_SECS`| `60`                             |
    /// | `POLL_INTERVAL_MS`          | `1200`                           |
    /// | `POLL_TIMEOUT_SECS`         | `180`                            |
    pub fn from_env() -> Self {
        let http_timeout_secs: u64 = std::env::var("PROVIDER_HTTP_TIMEOUT_SECS")
            .unwrap_or_else(|_| "60".into())
            .parse()
            .expect("PROVIDER_HTTP_TIMEOUT_SECS must be a valid u64");

        let poll_interval_ms: u64 = std::env::var("POLL_INTERVAL_MS")
            .unwrap_or_else(|_| "1200".into())
            .parse()
            .expect("POLL_INTERVAL_MS must be a valid u64");

        let poll_timeout_secs: u64 = std::env::var("POLL_TIMEOUT_SECS")
            .unwrap_or_else(|_| "180".into())
            .parse()
            .expect("POLL_TIMEOUT_SECS must be a valid u64");

        Self {
            wavespeed: ServiceConfig::from_env(
                "WAVESPEED_API_KEY",
                "WAVESPEED_BASE_URL",
                "https://api.wavespeed.ai/api/v3",
            ),
            fal: ServiceConfig::from_env("FAL_API_KEY", "FAL_BASE_URL", "https://fal.run"),
            replicate: ServiceConfig::from_env(
                "REPLICATE_API_KEY",
                "REPLICATE_BASE_URL",
                "https://api.replicate.com/v1",
            ),
            runninghub: ServiceConfig::from_env(
                "RUNNINGHUB_API_KEY",
                "RUNNINGHUB_BASE_URL",
                "https://www.runninghub.ai",
            ),
            http_timeout: Duration::from_secs(http_timeout_secs),
            poll: PollConfig {
                interval: Duration::from_millis(poll_interval_ms),
                timeout: Duration::from_secs(poll_timeout_secs),
            },
        }
    }

    /// Settings for every service pointed at one base URL with a fixed key.
    pub fn for_base_url(base_url: &str, api_key: &str) -> Self {
        let service = |key_var| ServiceConfig {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: Some(api_key.to_string()),
            key_var,
        };
        Self {
            wavespeed: service("WAVESPEED_API_KEY"),
            fal: service("FAL_API_KEY"),
            replicate: service("REPLICATE_API_KEY"),
            runninghub: service("RUNNINGHUB_API_KEY"),
            http_timeout: Duration::from_secs(60),
            poll: PollConfig::default(),
        }
    }

    pub fn service(&self, service: ProviderService) -> &ServiceConfig {
        match service {
            ProviderService::Wavespeed => &self.wavespeed,
            ProviderService::Fal => &self.fal,
            ProviderService::Replicate => &self.replicate,
            ProviderService::Runninghub => &self.runninghub,
        }
    }
}
