//! Model registry: the config-driven map from `model_id` to [`ModelConfig`].
//!
//! The registry is deserialized once at startup from a JSON document of the
//! form `{"models": [...]}` and is read-only afterwards. Lookups are O(1).

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::coercion::CoercedParams;
use crate::error::CoreError;
use crate::pricing::CostModel;

/// Placeholder in `endpoint_template` replaced by the selected variant path.
pub const VARIANT_TOKEN: &str = "{{variant}}";

/// Coerced parameter carrying the caller's variant choice.
pub const VARIANT_PARAM: &str = "variant";

// ---------------------------------------------------------------------------
// Provider selection
// ---------------------------------------------------------------------------

/// The wire-protocol family a model is dispatched through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    /// One HTTP call whose response carries the outputs.
    DirectSync,
    /// Submit returns a task id that must be polled.
    AsyncPoll,
    /// Workflow execution fed by node field assignments, polled like
    /// [`ProviderKind::AsyncPoll`].
    NodeGraph,
}

impl ProviderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DirectSync => "direct-sync",
            Self::AsyncPoll => "async-poll",
            Self::NodeGraph => "node-graph",
        }
    }
}

/// The upstream service whose base URL and credentials a model uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderService {
    Wavespeed,
    Fal,
    Replicate,
    Runninghub,
}

impl ProviderService {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Wavespeed => "wavespeed",
            Self::Fal => "fal",
            Self::Replicate => "replicate",
            Self::Runninghub => "runninghub",
        }
    }
}

// ---------------------------------------------------------------------------
// Parameter schema
// ---------------------------------------------------------------------------

/// Declared type of a schema parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    Number,
    Integer,
    Boolean,
    String,
    Array,
    Object,
}

/// Declaration of one accepted parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamSpec {
    #[serde(rename = "type")]
    pub param_type: ParamType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    #[serde(default, rename = "enum", skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(
        default,
        rename = "maxItems",
        alias = "max_items",
        skip_serializing_if = "Option::is_none"
    )]
    pub max_items: Option<usize>,
}

/// Parameter name -> declaration. Names are case-sensitive.
pub type ParamSchema = BTreeMap<String, ParamSpec>;

// ---------------------------------------------------------------------------
// Node-graph configuration
// ---------------------------------------------------------------------------

/// A workflow node identifier. Accepts both `"6"` and `6` in config files.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "RawNodeId")]
pub struct NodeId(pub String);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawNodeId {
    Text(String),
    Number(i64),
}

impl From<RawNodeId> for NodeId {
    fn from(raw: RawNodeId) -> Self {
        match raw {
            RawNodeId::Text(s) => NodeId(s),
            RawNodeId::Number(n) => NodeId(n.to_string()),
        }
    }
}

impl NodeId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Maps `reference_images[index]` onto a node field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceImageMapping {
    #[serde(alias = "nodeId")]
    pub node_id: NodeId,
    #[serde(default = "default_image_field", alias = "fieldName")]
    pub field_name: String,
    #[serde(default, alias = "ref_index")]
    pub index: usize,
}

/// A fixed node field value, used by dimension presets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeOverride {
    #[serde(alias = "nodeId")]
    pub node_id: NodeId,
    #[serde(alias = "fieldName")]
    pub field_name: String,
    pub value: Value,
}

/// Workflow wiring for a node-graph model.
///
/// Every field except `workflow_id` is optional; an absent field simply
/// contributes no assignments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeGraphConfig {
    pub workflow_id: String,
    /// Raw assignment templates; string values may contain `{{token}}`s.
    #[serde(default, alias = "nodeInfoList")]
    pub node_info_list: Vec<Value>,
    #[serde(default)]
    pub prompt_node_id: Option<NodeId>,
    #[serde(default = "default_text_field")]
    pub prompt_field_name: String,
    #[serde(default)]
    pub negative_prompt_node_id: Option<NodeId>,
    #[serde(default = "default_text_field")]
    pub negative_prompt_field_name: String,
    #[serde(default)]
    pub reference_image_node_mappings: Vec<ReferenceImageMapping>,
    #[serde(default)]
    pub reference_image_node_ids: Vec<NodeId>,
    #[serde(default = "default_image_field")]
    pub reference_image_field_name: String,
    #[serde(default)]
    pub seed_node_id: Option<NodeId>,
    #[serde(default)]
    pub lora_node_id: Option<NodeId>,
    /// `resolution -> aspect_ratio -> overrides`.
    #[serde(default)]
    pub dimension_presets: BTreeMap<String, BTreeMap<String, Vec<NodeOverride>>>,
}

fn default_text_field() -> String {
    "text".to_string()
}

fn default_image_field() -> String {
    "image".to_string()
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Model config
// ---------------------------------------------------------------------------

/// Immutable description of how a `model_id` maps onto a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub model_id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub provider: ProviderKind,
    pub service: ProviderService,
    /// Path appended to the service base URL. May contain [`VARIANT_TOKEN`].
    pub endpoint_template: String,
    /// Variant name -> path fragment substituted for [`VARIANT_TOKEN`].
    #[serde(default)]
    pub variants: BTreeMap<String, String>,
    #[serde(default)]
    pub default_variant: Option<String>,
    #[serde(default)]
    pub param_schema: ParamSchema,
    /// Merged under caller parameters before coercion.
    #[serde(default)]
    pub default_params: Map<String, Value>,
    #[serde(default)]
    pub max_images: Option<u32>,
    #[serde(default)]
    pub prompt_template: Option<String>,
    #[serde(default)]
    pub negative_prompt_default: Option<String>,
    #[serde(default)]
    pub supports_reference_images: bool,
    #[serde(default)]
    pub max_reference_images: Option<usize>,
    #[serde(default)]
    pub min_width: Option<u32>,
    #[serde(default)]
    pub max_width: Option<u32>,
    #[serde(default)]
    pub min_height: Option<u32>,
    #[serde(default)]
    pub max_height: Option<u32>,
    /// Body `code` that marks success for direct-sync providers.
    #[serde(default)]
    pub success_code: Option<i64>,
    pub cost: CostModel,
    #[serde(default)]
    pub node_graph: Option<NodeGraphConfig>,
    #[serde(default = "default_true")]
    pub active: bool,
}

impl ModelConfig {
    /// Resolve the endpoint path, substituting the selected variant.
    ///
    /// The variant comes from the coerced `variant` parameter, falling back
    /// to `default_variant`. Templates without [`VARIANT_TOKEN`] are
    /// returned unchanged.
    pub fn resolve_endpoint(&self, params: &CoercedParams) -> Result<String, CoreError> {
        if !self.endpoint_template.contains(VARIANT_TOKEN) {
            return Ok(self.endpoint_template.clone());
        }

        let selected = params
            .get(VARIANT_PARAM)
            .and_then(Value::as_str)
            .or(self.default_variant.as_deref())
            .ok_or_else(|| {
                CoreError::Validation(format!(
                    "Model '{}' requires a variant (one of: {})",
                    self.model_id,
                    self.variant_names().join(", ")
                ))
            })?;

        let fragment = self.variants.get(selected).ok_or_else(|| {
            CoreError::Validation(format!(
                "Unknown variant '{selected}' for model '{}' (expected one of: {})",
                self.model_id,
                self.variant_names().join(", ")
            ))
        })?;

        Ok(self.endpoint_template.replace(VARIANT_TOKEN, fragment))
    }

    /// Maximum number of reference images forwarded to the provider.
    pub fn reference_image_limit(&self, supplied: usize) -> usize {
        self.max_reference_images
            .map_or(supplied, |max| max.min(supplied))
    }

    fn variant_names(&self) -> Vec<&str> {
        self.variants.keys().map(String::as_str).collect()
    }

    /// Check structural requirements that serde alone cannot express.
    fn validate(&self) -> Result<(), CoreError> {
        if self.model_id.trim().is_empty() {
            return Err(CoreError::Validation(
                "Model entry has an empty model_id".to_string(),
            ));
        }
        if self.endpoint_template.contains(VARIANT_TOKEN) && self.variants.is_empty() {
            return Err(CoreError::Validation(format!(
                "Model '{}' uses {VARIANT_TOKEN} but declares no variants",
                self.model_id
            )));
        }
        if let Some(default) = &self.default_variant {
            if !self.variants.contains_key(default) {
                return Err(CoreError::Validation(format!(
                    "Model '{}' default_variant '{default}' is not a declared variant",
                    self.model_id
                )));
            }
        }
        if self.provider == ProviderKind::NodeGraph {
            match &self.node_graph {
                Some(graph) if !graph.workflow_id.trim().is_empty() => {}
                _ => {
                    return Err(CoreError::Validation(format!(
                        "Node-graph model '{}' requires node_graph.workflow_id",
                        self.model_id
                    )));
                }
            }
        }
        if self.max_images == Some(0) {
            return Err(CoreError::Validation(format!(
                "Model '{}' max_images must be at least 1",
                self.model_id
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct RegistryDocument {
    models: Vec<ModelConfig>,
}

/// Read-only lookup table of model configurations.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    models: HashMap<String, ModelConfig>,
}

impl ModelRegistry {
    /// Build a registry, rejecting duplicate ids and malformed entries.
    pub fn from_models(models: Vec<ModelConfig>) -> Result<Self, CoreError> {
        let mut map = HashMap::with_capacity(models.len());
        for model in models {
            model.validate()?;
            if map.contains_key(&model.model_id) {
                return Err(CoreError::Validation(format!(
                    "Duplicate model_id '{}' in registry",
                    model.model_id
                )));
            }
            map.insert(model.model_id.clone(), model);
        }
        Ok(Self { models: map })
    }

    /// Parse a `{"models": [...]}` JSON document.
    pub fn from_json(json: &str) -> Result<Self, CoreError> {
        let doc: RegistryDocument = serde_json::from_str(json)
            .map_err(|e| CoreError::Validation(format!("Invalid model registry: {e}")))?;
        Self::from_models(doc.models)
    }

    /// Load the registry from a JSON file on disk.
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            CoreError::Internal(format!(
                "Failed to read model registry {}: {e}",
                path.display()
            ))
        })?;
        Self::from_json(&json)
    }

    /// Look up an active model by id.
    pub fn resolve(&self, model_id: &str) -> Result<&ModelConfig, CoreError> {
        self.models
            .get(model_id)
            .filter(|m| m.active)
            .ok_or_else(|| CoreError::UnknownModel(model_id.to_string()))
    }

    /// All active models, sorted by id.
    pub fn list(&self) -> Vec<&ModelConfig> {
        let mut models: Vec<&ModelConfig> = self.models.values().filter(|m| m.active).collect();
        models.sort_by(|a, b| a.model_id.cmp(&b.model_id));
        models
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    fn registry_json(models: Value) -> String {
        json!({ "models": models }).to_string()
    }

    fn direct_model(id: &str) -> Value {
        json!({
            "model_id": id,
            "provider": "direct-sync",
            "service": "wavespeed",
            "endpoint_template": "wavespeed-ai/wan-2.1/text-to-image-lora",
            "cost": { "base": 10 }
        })
    }

    // -- Loading --

    #[test]
    fn loads_and_resolves_model() {
        let registry = ModelRegistry::from_json(&registry_json(json!([direct_model("wan-2.1")])))
            .unwrap();
        let model = registry.resolve("wan-2.1").unwrap();
        assert_eq!(model.provider, ProviderKind::DirectSync);
        assert_eq!(model.service, ProviderService::Wavespeed);
        assert_eq!(model.cost.base, 10);
        assert!(model.active);
    }

    #[test]
    fn unknown_model_is_reported_by_id() {
        let registry = ModelRegistry::from_json(&registry_json(json!([]))).unwrap();
        assert_matches!(
            registry.resolve("missing-model"),
            Err(CoreError::UnknownModel(id)) if id == "missing-model"
        );
    }

    #[test]
    fn inactive_model_is_not_resolvable() {
        let mut model = direct_model("old");
        model["active"] = json!(false);
        let registry = ModelRegistry::from_json(&registry_json(json!([model]))).unwrap();
        assert_matches!(registry.resolve("old"), Err(CoreError::UnknownModel(_)));
        assert!(registry.list().is_empty());
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let json = registry_json(json!([direct_model("a"), direct_model("a")]));
        assert_matches!(
            ModelRegistry::from_json(&json),
            Err(CoreError::Validation(msg)) if msg.contains("Duplicate")
        );
    }

    #[test]
    fn node_graph_without_workflow_is_rejected() {
        let model = json!({
            "model_id": "graph",
            "provider": "node-graph",
            "service": "runninghub",
            "endpoint_template": "",
            "cost": { "base": 10 }
        });
        assert_matches!(
            ModelRegistry::from_json(&registry_json(json!([model]))),
            Err(CoreError::Validation(_))
        );
    }

    #[test]
    fn node_ids_accept_numbers_and_strings() {
        let model = json!({
            "model_id": "graph",
            "provider": "node-graph",
            "service": "runninghub",
            "endpoint_template": "",
            "cost": { "base": 10 },
            "node_graph": {
                "workflow_id": "1987",
                "prompt_node_id": 6,
                "reference_image_node_ids": ["10", 11]
            }
        });
        let registry = ModelRegistry::from_json(&registry_json(json!([model]))).unwrap();
        let graph = registry.resolve("graph").unwrap().node_graph.as_ref().unwrap();
        assert_eq!(graph.prompt_node_id, Some(NodeId("6".into())));
        assert_eq!(
            graph.reference_image_node_ids,
            vec![NodeId("10".into()), NodeId("11".into())]
        );
        assert_eq!(graph.prompt_field_name, "text");
        assert_eq!(graph.reference_image_field_name, "image");
    }

    #[test]
    fn list_is_sorted_by_id() {
        let json = registry_json(json!([direct_model("b"), direct_model("a")]));
        let registry = ModelRegistry::from_json(&json).unwrap();
        let ids: Vec<&str> = registry.list().iter().map(|m| m.model_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    // -- Endpoint variants --

    fn variant_model() -> ModelConfig {
        let json = registry_json(json!([{
            "model_id": "seedream-v4.5",
            "provider": "direct-sync",
            "service": "wavespeed",
            "endpoint_template": "bytedance/seedream-v4.5{{variant}}",
            "variants": { "text-to-image": "", "edit": "/edit" },
            "default_variant": "edit",
            "cost": { "base": 15 }
        }]));
        ModelRegistry::from_json(&json)
            .unwrap()
            .resolve("seedream-v4.5")
            .unwrap()
            .clone()
    }

    #[test]
    fn endpoint_uses_default_variant() {
        let model = variant_model();
        assert_eq!(
            model.resolve_endpoint(&CoercedParams::new()).unwrap(),
            "bytedance/seedream-v4.5/edit"
        );
    }

    #[test]
    fn endpoint_uses_selected_variant() {
        let model = variant_model();
        let mut params = CoercedParams::new();
        params.insert(VARIANT_PARAM.into(), json!("text-to-image"));
        assert_eq!(
            model.resolve_endpoint(&params).unwrap(),
            "bytedance/seedream-v4.5"
        );
    }

    #[test]
    fn endpoint_rejects_unknown_variant() {
        let model = variant_model();
        let mut params = CoercedParams::new();
        params.insert(VARIANT_PARAM.into(), json!("inpaint"));
        assert_matches!(model.resolve_endpoint(&params), Err(CoreError::Validation(_)));
    }

    #[test]
    fn variant_token_requires_variants_table() {
        let mut model = direct_model("broken");
        model["endpoint_template"] = json!("x{{variant}}");
        assert_matches!(
            ModelRegistry::from_json(&registry_json(json!([model]))),
            Err(CoreError::Validation(_))
        );
    }

    #[test]
    fn reference_limit_caps_supplied_count() {
        let mut model = variant_model();
        assert_eq!(model.reference_image_limit(5), 5);
        model.max_reference_images = Some(2);
        assert_eq!(model.reference_image_limit(5), 2);
        assert_eq!(model.reference_image_limit(1), 1);
    }

    // -- Shipped catalog --

    #[test]
    fn shipped_catalog_loads() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config/models.json");
        let registry = ModelRegistry::load(&path).unwrap();
        assert_eq!(registry.len(), 5);

        let seedream = registry.resolve("seedream-v4.5").unwrap();
        assert_eq!(
            seedream.resolve_endpoint(&CoercedParams::new()).unwrap(),
            "bytedance/seedream-v4.5"
        );
        assert!(registry.resolve("kiara-z-max").unwrap().node_graph.is_some());
    }
}
