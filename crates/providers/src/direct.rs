//! Direct-sync adapter: one POST whose response carries the outputs
//! (WaveSpeed, fal).

use async_trait::async_trait;
use kiara_core::coercion::CoercedParams;
use kiara_core::normalize::normalize;
use kiara_core::registry::{ModelConfig, ProviderKind, VARIANT_PARAM};
use serde_json::{Map, Value};

use crate::adapter::{JobHandle, JobRequest, PollStatus, ProviderAdapter};
use crate::error::ProviderError;
use crate::http::{first_id, provider_message, ServiceClient};

/// Build the semantic request body shared by direct-sync and prediction
/// providers: `{prompt, ...params, negative_prompt?, reference images?}`.
///
/// `negative_prompt` is only sent when the schema declares it or the model
/// has no schema. Reference images go to `image_url`, `image_urls`, or
/// `images` depending on which the schema declares; without a declaration
/// one image goes to `image_url` and several to `image_urls`.
pub fn request_body(
    model: &ModelConfig,
    prompt: &str,
    negative_prompt: Option<&str>,
    reference_images: &[String],
    params: &CoercedParams,
) -> Value {
    let mut body: Map<String, Value> = params.clone();
    body.remove(VARIANT_PARAM);
    body.insert("prompt".into(), Value::String(prompt.to_string()));

    let schema = &model.param_schema;
    if let Some(negative) = negative_prompt {
        if schema.is_empty() || schema.contains_key("negative_prompt") {
            body.insert("negative_prompt".into(), Value::String(negative.to_string()));
        }
    }

    if !reference_images.is_empty() {
        let list = || Value::from(reference_images.to_vec());
        if schema.contains_key("image_url") {
            body.insert("image_url".into(), Value::String(reference_images[0].clone()));
        } else if schema.contains_key("image_urls") {
            body.insert("image_urls".into(), list());
        } else if schema.contains_key("images") {
            body.insert("images".into(), list());
        } else if reference_images.len() == 1 {
            body.insert("image_url".into(), Value::String(reference_images[0].clone()));
        } else {
            body.insert("image_urls".into(), list());
        }
    }

    Value::Object(body)
}

/// Adapter for providers that answer a single POST with outputs.
pub struct DirectSyncAdapter {
    http: ServiceClient,
    /// Body `code` that marks success, when the provider wraps responses.
    success_code: Option<i64>,
}

impl DirectSyncAdapter {
    pub fn new(http: ServiceClient, success_code: Option<i64>) -> Self {
        Self { http, success_code }
    }

    fn check_code(&self, body: &Value) -> Result<(), ProviderError> {
        let Some(expected) = self.success_code else {
            return Ok(());
        };
        let code = body.get("code").and_then(Value::as_i64);
        if code == Some(expected) {
            return Ok(());
        }
        Err(ProviderError::Rejected {
            code,
            message: provider_message(body)
                .unwrap_or_else(|| format!("unexpected response code {code:?}")),
        })
    }
}

#[async_trait]
impl ProviderAdapter for DirectSyncAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::DirectSync
    }

    async fn submit(&self, request: &JobRequest) -> Result<JobHandle, ProviderError> {
        let JobRequest::Http { endpoint, body } = request else {
            return Err(ProviderError::Configuration(
                "direct-sync providers take an HTTP request body".into(),
            ));
        };

        let response = self.http.post_json(endpoint, body).await?;
        self.check_code(&response)?;

        let task_id = first_id(&response, &["data.id", "id", "request_id"]);
        tracing::debug!(endpoint = %endpoint, task_id = ?task_id, "Direct provider call completed");

        Ok(JobHandle::Completed {
            task_id,
            output_urls: normalize(&response),
        })
    }

    async fn check_status(&self, _task_id: &str) -> Result<PollStatus, ProviderError> {
        Err(ProviderError::Configuration(
            "direct-sync providers have no status endpoint".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use kiara_core::registry::ModelRegistry;
    use serde_json::json;

    use super::*;

    fn model(schema: Value) -> ModelConfig {
        let json = json!({ "models": [{
            "model_id": "m",
            "provider": "direct-sync",
            "service": "fal",
            "endpoint_template": "fal-ai/flux/dev",
            "param_schema": schema,
            "supports_reference_images": true,
            "cost": { "base": 1 }
        }]});
        ModelRegistry::from_json(&json.to_string())
            .unwrap()
            .resolve("m")
            .unwrap()
            .clone()
    }

    fn refs(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("https://r/{i}")).collect()
    }

    #[test]
    fn body_merges_params_and_prompt() {
        let mut params = CoercedParams::new();
        params.insert("num_images".into(), json!(2));
        params.insert("variant".into(), json!("edit"));
        let body = request_body(&model(json!({})), "a fox", None, &[], &params);
        assert_eq!(body, json!({ "prompt": "a fox", "num_images": 2 }));
    }

    #[test]
    fn negative_prompt_needs_schema_declaration() {
        let declared = model(json!({ "negative_prompt": { "type": "string" } }));
        let undeclared = model(json!({ "seed": { "type": "integer" } }));
        let none = model(json!({}));
        let params = CoercedParams::new();

        assert_eq!(
            request_body(&declared, "p", Some("ugly"), &[], &params)["negative_prompt"],
            "ugly"
        );
        assert!(request_body(&undeclared, "p", Some("ugly"), &[], &params)
            .get("negative_prompt")
            .is_none());
        assert_eq!(
            request_body(&none, "p", Some("ugly"), &[], &params)["negative_prompt"],
            "ugly"
        );
    }

    #[test]
    fn reference_images_follow_schema() {
        let params = CoercedParams::new();
        let single = model(json!({ "image_url": { "type": "string" } }));
        assert_eq!(
            request_body(&single, "p", None, &refs(2), &params)["image_url"],
            "https://r/0"
        );

        let list = model(json!({ "image_urls": { "type": "array" } }));
        assert_eq!(
            request_body(&list, "p", None, &refs(1), &params)["image_urls"],
            json!(["https://r/0"])
        );
    }

    #[test]
    fn reference_images_without_schema_depend_on_count() {
        let params = CoercedParams::new();
        let m = model(json!({}));
        let one = request_body(&m, "p", None, &refs(1), &params);
        assert_eq!(one["image_url"], "https://r/0");
        assert!(one.get("image_urls").is_none());

        let many = request_body(&m, "p", None, &refs(2), &params);
        assert_eq!(many["image_urls"], json!(["https://r/0", "https://r/1"]));
    }
}
