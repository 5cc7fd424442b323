#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use kiara_core::registry::ModelRegistry;
use kiara_core::request::GenerationRequest;
use kiara_core::types::DbId;
use kiara_pipeline::memory::MemoryStore;
use kiara_pipeline::{GenerationGateway, RateLimit};
use kiara_providers::{PollConfig, ProviderSettings};
use serde_json::{json, Value};

pub const USER: DbId = 42;
pub const API_KEY: &str = "test-api-key";

/// Registry with one model per provider family.
pub fn registry() -> ModelRegistry {
    let doc = json!({ "models": [
        {
            "model_id": "flux-dev",
            "provider": "direct-sync",
            "service": "fal",
            "endpoint_template": "fal-ai/flux/dev",
            "param_schema": {
                "num_images": { "type": "integer", "minimum": 1, "maximum": 4 },
                "guidance_scale": { "type": "number", "minimum": 1, "maximum": 20 }
            },
            "max_images": 4,
            "cost": { "base": 10 }
        },
        {
            "model_id": "ltx-video",
            "provider": "async-poll",
            "service": "replicate",
            "endpoint_template": "lightricks/ltx-video",
            "cost": { "base": 10 }
        },
        {
            "model_id": "kiara-z-max",
            "provider": "node-graph",
            "service": "runninghub",
            "endpoint_template": "",
            "param_schema": {
                "num_images": { "type": "integer", "minimum": 1 },
                "seed": { "type": "integer" }
            },
            "max_images": 4,
            "cost": {
                "base": 5,
                "scale_param": "num_images",
                "multipliers": { "2": 2.0, "3": 3.0, "4": 4.0 }
            },
            "node_graph": {
                "workflow_id": "1987",
                "prompt_node_id": "6",
                "seed_node_id": "3"
            }
        },
        {
            "model_id": "empty-graph",
            "provider": "node-graph",
            "service": "runninghub",
            "endpoint_template": "",
            "cost": { "base": 5 },
            "node_graph": { "workflow_id": "1988" }
        }
    ]});
    ModelRegistry::from_json(&doc.to_string()).unwrap()
}

/// Short poll cadence so tests finish quickly.
pub fn settings(base_url: &str, poll_timeout: Duration) -> ProviderSettings {
    let mut settings = ProviderSettings::for_base_url(base_url, API_KEY);
    settings.poll = PollConfig {
        interval: Duration::from_millis(10),
        timeout: poll_timeout,
    };
    settings
}

/// Gateway over `store` with every provider pointed at `base_url`.
pub fn gateway(base_url: &str, store: Arc<MemoryStore>) -> GenerationGateway {
    gateway_with(settings(base_url, Duration::from_secs(5)), store, RateLimit::disabled())
}

pub fn gateway_with(
    settings: ProviderSettings,
    store: Arc<MemoryStore>,
    rate_limit: RateLimit,
) -> GenerationGateway {
    GenerationGateway::new(
        Arc::new(registry()),
        store,
        settings,
        reqwest::Client::new(),
        rate_limit,
    )
}

/// Parse a public request body.
pub fn request(body: Value) -> GenerationRequest {
    serde_json::from_value(body).unwrap()
}

/// Net ledger movement across every transaction in `store`.
pub fn net_ledger(store: &MemoryStore) -> i64 {
    store.transactions().iter().map(|t| t.amount).sum()
}
