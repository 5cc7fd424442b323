#![allow(dead_code)]

use std::time::Duration;

use kiara_core::registry::{ModelConfig, ModelRegistry};
use kiara_providers::{build_adapter, PollConfig, ProviderAdapter, ProviderSettings};
use serde_json::Value;

pub const API_KEY: &str = "test-api-key";

/// Parse a single registry entry.
pub fn model(entry: Value) -> ModelConfig {
    let id = entry["model_id"].as_str().unwrap_or("m").to_string();
    let json = serde_json::json!({ "models": [entry] }).to_string();
    ModelRegistry::from_json(&json)
        .unwrap()
        .resolve(&id)
        .unwrap()
        .clone()
}

/// Adapter for `model` with every service pointed at `base_url`.
pub fn adapter(base_url: &str, model: &ModelConfig) -> Box<dyn ProviderAdapter> {
    let settings = ProviderSettings::for_base_url(base_url, API_KEY);
    build_adapter(&reqwest::Client::new(), &settings, model).unwrap()
}

/// Short poll cadence so tests finish quickly.
pub fn fast_polls(timeout: Duration) -> PollConfig {
    PollConfig {
        interval: Duration::from_millis(10),
        timeout,
    }
}
