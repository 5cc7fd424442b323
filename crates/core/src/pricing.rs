//! Credit cost model.
//!
//! A model's cost is its base price, optionally scaled by the value of one
//! coerced parameter (typically output resolution). Cost is always computed
//! from [`CoercedParams`], never from raw caller input.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::coercion::CoercedParams;

/// Per-model pricing declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostModel {
    /// Credits charged when no multiplier applies.
    pub base: i64,
    /// Coerced parameter whose value selects a multiplier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_param: Option<String>,
    /// Stringified parameter value -> multiplier applied to `base`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub multipliers: BTreeMap<String, f64>,
}

impl CostModel {
    pub fn flat(base: i64) -> Self {
        Self {
            base,
            scale_param: None,
            multipliers: BTreeMap::new(),
        }
    }
}

/// Compute the credit cost for a generation.
///
/// The result is rounded up and never negative.
pub fn compute_cost(model: &CostModel, params: &CoercedParams) -> i64 {
    let multiplier = model
        .scale_param
        .as_deref()
        .and_then(|name| params.get(name))
        .and_then(pricing_key)
        .and_then(|key| model.multipliers.get(&key).copied())
        .filter(|m| m.is_finite() && *m >= 0.0)
        .unwrap_or(1.0);

    let cost = (model.base as f64 * multiplier).ceil() as i64;
    cost.max(0)
}

/// Render a coerced value as a multiplier lookup key.
///
/// Size objects (`{"width": W, "height": H}`) render as `"W*H"`, matching
/// the provider size notation.
fn pricing_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Object(obj) => {
            let width = obj.get("width").and_then(Value::as_f64)?;
            let height = obj.get("height").and_then(Value::as_f64)?;
            Some(format!("{}*{}", width as i64, height as i64))
        }
        _ => None,
    }
}
