//! Inbound generation request.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use validator::{Validate, ValidationError};

use crate::error::CoreError;
use crate::registry::{ModelConfig, NodeId};

/// Optional LoRA override for node-graph workflows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoraOverride {
    pub name: String,
    #[serde(default)]
    pub strength: Option<f64>,
    #[serde(default, alias = "nodeId")]
    pub node_id: Option<NodeId>,
}

/// A caller's request to generate media with one model.
///
/// Deserializes from the public request body: `reference_image_urls` and
/// `image_urls` are aliases of `reference_images`, a nested `params` object
/// and any unrecognized top-level keys are gathered into `raw_params`
/// (top-level keys win on conflict).
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(from = "RawGenerationRequest")]
pub struct GenerationRequest {
    #[validate(length(min = 1, max = 128, message = "model_id is required"))]
    pub model_id: String,
    #[validate(custom(function = "not_blank"), length(max = 8000))]
    pub prompt: String,
    #[validate(length(max = 8000))]
    pub negative_prompt: Option<String>,
    #[validate(length(max = 16))]
    pub reference_images: Vec<String>,
    pub lora: Option<LoraOverride>,
    pub raw_params: Map<String, Value>,
}

#[derive(Deserialize)]
struct RawGenerationRequest {
    #[serde(default)]
    model_id: String,
    #[serde(default)]
    prompt: Option<String>,
    #[serde(default)]
    negative_prompt: Option<String>,
    #[serde(default, alias = "reference_image_urls", alias = "image_urls")]
    reference_images: Option<Vec<String>>,
    #[serde(default)]
    lora: Option<LoraOverride>,
    #[serde(default)]
    params: Option<Map<String, Value>>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl From<RawGenerationRequest> for GenerationRequest {
    fn from(raw: RawGenerationRequest) -> Self {
        let mut raw_params = raw.params.unwrap_or_default();
        raw_params.extend(raw.extra);
        Self {
            model_id: raw.model_id.trim().to_string(),
            prompt: raw.prompt.unwrap_or_default(),
            negative_prompt: raw.negative_prompt.filter(|n| !n.trim().is_empty()),
            reference_images: raw
                .reference_images
                .unwrap_or_default()
                .into_iter()
                .filter(|r| !r.trim().is_empty())
                .collect(),
            lora: raw.lora,
            raw_params,
        }
    }
}

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("prompt is required".into());
        return Err(err);
    }
    Ok(())
}

impl GenerationRequest {
    /// Check the request shape and its compatibility with `model`.
    pub fn validate_for(&self, model: &ModelConfig) -> Result<(), CoreError> {
        self.validate()
            .map_err(|e| CoreError::Validation(e.to_string()))?;

        if !self.reference_images.is_empty() && !model.supports_reference_images {
            return Err(CoreError::Validation(format!(
                "Model '{}' does not accept reference images",
                model.model_id
            )));
        }
        Ok(())
    }

    /// Negative prompt, falling back to the model default.
    pub fn effective_negative_prompt<'a>(&'a self, model: &'a ModelConfig) -> Option<&'a str> {
        self.negative_prompt
            .as_deref()
            .or(model.negative_prompt_default.as_deref())
            .filter(|n| !n.trim().is_empty())
    }

    /// Reference images capped at the model's limit.
    pub fn reference_images_for(&self, model: &ModelConfig) -> &[String] {
        let limit = model.reference_image_limit(self.reference_images.len());
        &self.reference_images[..limit]
    }
}
