//! Template interpolation for node-graph workflows.
//!
//! Node-graph providers accept a flat list of `{nodeId, fieldName,
//! fieldValue}` assignments instead of a semantic request body. This module
//! builds that list from a model's [`NodeGraphConfig`] and a request's token
//! map. Nothing here fails: missing optional configuration and unmatched
//! tokens degrade to "no assignment" and empty string respectively.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::coercion::{to_number, CoercedParams};
use crate::registry::NodeGraphConfig;
use crate::request::LoraOverride;

/// Compiled `{{ token }}` matcher. Whitespace inside the braces is allowed.
static TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([a-zA-Z0-9_]+)\s*\}\}").expect("valid regex"));

/// Default dimension preset keys.
pub const DEFAULT_RESOLUTION: &str = "1k";
pub const DEFAULT_ASPECT_RATIO: &str = "1:1";

/// Default LoRA model strength when the request does not supply one.
pub const DEFAULT_LORA_STRENGTH: f64 = 0.8;

/// Flat substitution values: `prompt`, `negative_prompt`, `reference_image_N`.
pub type TokenMap = HashMap<String, String>;

/// One node field assignment in provider wire format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeAssignment {
    #[serde(rename = "nodeId")]
    pub node_id: String,
    #[serde(rename = "fieldName")]
    pub field_name: String,
    #[serde(rename = "fieldValue")]
    pub field_value: Value,
}

impl NodeAssignment {
    pub fn new(node_id: impl Into<String>, field_name: impl Into<String>, value: Value) -> Self {
        Self {
            node_id: node_id.into(),
            field_name: field_name.into(),
            field_value: value,
        }
    }
}

// ---------------------------------------------------------------------------
// Token map and interpolation
// ---------------------------------------------------------------------------

/// Build the token map for a request.
pub fn build_token_map(
    prompt: &str,
    negative_prompt: Option<&str>,
    reference_images: &[String],
) -> TokenMap {
    let mut tokens = TokenMap::with_capacity(2 + reference_images.len());
    tokens.insert("prompt".to_string(), prompt.to_string());
    tokens.insert(
        "negative_prompt".to_string(),
        negative_prompt.unwrap_or_default().to_string(),
    );
    for (i, url) in reference_images.iter().enumerate() {
        tokens.insert(format!("reference_image_{i}"), url.clone());
    }
    tokens
}

/// Replace every `{{token}}` in `text`. Unknown tokens become `""`.
pub fn replace_tokens(text: &str, tokens: &TokenMap) -> String {
    TOKEN_RE
        .replace_all(text, |caps: &regex::Captures<'_>| {
            match tokens.get(&caps[1]) {
                Some(value) => value.clone(),
                None => {
                    tracing::debug!(token = &caps[1], "Unmatched template token");
                    String::new()
                }
            }
        })
        .into_owned()
}

/// Recursively interpolate every string inside `value`.
pub fn interpolate(value: &Value, tokens: &TokenMap) -> Value {
    match value {
        Value::String(s) => Value::String(replace_tokens(s, tokens)),
        Value::Array(items) => Value::Array(items.iter().map(|v| interpolate(v, tokens)).collect()),
        Value::Object(obj) => Value::Object(
            obj.iter()
                .map(|(k, v)| (k.clone(), interpolate(v, tokens)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Apply a model prompt template.
///
/// `{prompt}` / `{{prompt}}` placeholders are substituted; a template with
/// no placeholder is prepended, separated by a blank line.
pub fn apply_prompt_template(prompt: &str, template: Option<&str>) -> String {
    match template.map(str::trim) {
        Some(t) if !t.is_empty() => {
            if t.contains("{prompt}") {
                // `{{prompt}}` first so its inner `{prompt}` is not replaced twice.
                t.replace("{{prompt}}", prompt).replace("{prompt}", prompt)
            } else {
                format!("{t}\n\n{prompt}")
            }
        }
        _ => prompt.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Assignment construction
// ---------------------------------------------------------------------------

/// Build the base assignment list for a workflow.
///
/// Sources are appended in a fixed order:
/// 1. `node_info_list` templates, interpolated;
/// 2. the prompt node, carrying the prompt interpolated against the same
///    token map;
/// 3. the negative-prompt node, if a negative prompt is present;
/// 4. indexed reference-image mappings that point at an existing image;
/// 5. bare reference-image node ids zipped with the images.
pub fn build_assignments(
    config: &NodeGraphConfig,
    prompt: &str,
    negative_prompt: Option<&str>,
    reference_images: &[String],
) -> Vec<NodeAssignment> {
    let tokens = build_token_map(prompt, negative_prompt, reference_images);
    let mut out: Vec<NodeAssignment> = config
        .node_info_list
        .iter()
        .filter_map(|raw| assignment_from_template(raw, &tokens))
        .collect();

    if let Some(node) = &config.prompt_node_id {
        out.push(NodeAssignment::new(
            node.as_str(),
            config.prompt_field_name.as_str(),
            Value::String(replace_tokens(prompt, &tokens)),
        ));
    }

    if let (Some(node), Some(negative)) = (
        &config.negative_prompt_node_id,
        negative_prompt.filter(|n| !n.is_empty()),
    ) {
        out.push(NodeAssignment::new(
            node.as_str(),
            config.negative_prompt_field_name.as_str(),
            Value::String(negative.to_string()),
        ));
    }

    for mapping in &config.reference_image_node_mappings {
        match reference_images.get(mapping.index) {
            Some(url) => out.push(NodeAssignment::new(
                mapping.node_id.as_str(),
                mapping.field_name.as_str(),
                Value::String(url.clone()),
            )),
            None => tracing::debug!(
                node_id = %mapping.node_id.as_str(),
                index = mapping.index,
                "Skipping reference mapping with no image at index"
            ),
        }
    }

    for (node, url) in config.reference_image_node_ids.iter().zip(reference_images) {
        out.push(NodeAssignment::new(
            node.as_str(),
            config.reference_image_field_name.as_str(),
            Value::String(url.clone()),
        ));
    }

    out
}

/// Normalize one raw `node_info_list` entry.
///
/// Accepts camelCase and snake_case keys; `value` is an alias of the field
/// value. Entries missing any of the three parts are skipped.
fn assignment_from_template(raw: &Value, tokens: &TokenMap) -> Option<NodeAssignment> {
    let item = raw.as_object()?;
    let node_id = first_of(item, &["nodeId", "node_id"]).and_then(scalar_to_string)?;
    let field_name = first_of(item, &["fieldName", "field_name"]).and_then(scalar_to_string)?;
    let field_value = first_of(item, &["fieldValue", "field_value", "value"])?;
    Some(NodeAssignment {
        node_id,
        field_name,
        field_value: interpolate(field_value, tokens),
    })
}

fn first_of<'a>(item: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| item.get(*k))
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Post-base overrides
// ---------------------------------------------------------------------------

/// Width/height overrides for the coerced `resolution` and `aspect_ratio`.
///
/// Returns nothing when the model has no matching preset.
pub fn dimension_overrides(config: &NodeGraphConfig, params: &CoercedParams) -> Vec<NodeAssignment> {
    let resolution = params
        .get("resolution")
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_RESOLUTION)
        .to_lowercase();
    let aspect_ratio = params
        .get("aspect_ratio")
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_ASPECT_RATIO);

    config
        .dimension_presets
        .get(&resolution)
        .and_then(|by_ratio| by_ratio.get(aspect_ratio))
        .map(|overrides| {
            overrides
                .iter()
                .map(|o| {
                    NodeAssignment::new(
                        o.node_id.as_str(),
                        o.field_name.as_str(),
                        Value::String(stringify(&o.value)),
                    )
                })
                .collect()
        })
        .unwrap_or_default()
}

/// LoRA name and strength assignments for a requested override.
///
/// The node comes from the request, falling back to the model's
/// `lora_node_id`; without either the override is skipped.
pub fn lora_overrides(config: &NodeGraphConfig, lora: Option<&LoraOverride>) -> Vec<NodeAssignment> {
    let Some(lora) = lora.filter(|l| !l.name.trim().is_empty()) else {
        return Vec::new();
    };
    let Some(node) = lora.node_id.as_ref().or(config.lora_node_id.as_ref()) else {
        tracing::debug!(lora = %lora.name, "Skipping LoRA override with no target node");
        return Vec::new();
    };
    let strength = lora.strength.unwrap_or(DEFAULT_LORA_STRENGTH);
    vec![
        NodeAssignment::new(node.as_str(), "lora_name", Value::String(lora.name.clone())),
        NodeAssignment::new(node.as_str(), "strength_model", Value::String(strength.to_string())),
    ]
}

/// Per-run seed assignment: run `i` receives `seed + i`.
pub fn seed_assignment(
    config: &NodeGraphConfig,
    params: &CoercedParams,
    run_index: u32,
) -> Option<NodeAssignment> {
    let node = config.seed_node_id.as_ref()?;
    let seed = params.get("seed").and_then(to_number)? as i64;
    Some(NodeAssignment::new(
        node.as_str(),
        "seed",
        Value::String(seed.saturating_add(i64::from(run_index)).to_string()),
    ))
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
