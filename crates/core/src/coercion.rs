//! Parameter coercion against a model's declared schema.
//!
//! Malformed or unknown optional parameters are dropped rather than
//! rejected. The output only ever contains keys declared in the schema, and
//! numeric values always respect the declared bounds.

use serde_json::{Map, Number, Value};

use crate::registry::{ModelConfig, ParamSchema, ParamSpec, ParamType};

/// Schema-conformant parameter map.
pub type CoercedParams = Map<String, Value>;

/// Output-count parameters clamped by `max_images`.
pub const COUNT_PARAMS: &[&str] = &["num_images", "num_outputs"];

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Full parameter preparation for one model.
///
/// Merges `default_params` under the caller's values, normalizes image
/// sizes, coerces against the schema, then applies generation limits.
pub fn prepare_params(model: &ModelConfig, raw: &Map<String, Value>) -> CoercedParams {
    let mut merged = model.default_params.clone();
    for (key, value) in raw {
        merged.insert(key.clone(), value.clone());
    }

    let sized = normalize_image_size(merged, model);
    let coerced = coerce(&sized, &model.param_schema);
    apply_generation_limits(coerced, model.max_images)
}

/// Coerce `raw` against `schema`, dropping anything that does not conform.
pub fn coerce(raw: &Map<String, Value>, schema: &ParamSchema) -> CoercedParams {
    let mut out = CoercedParams::new();
    for (key, value) in raw {
        let Some(spec) = schema.get(key) else {
            tracing::debug!(param = %key, "Dropping parameter not declared in schema");
            continue;
        };
        match coerce_value(value, spec).and_then(|v| apply_enum(v, spec)) {
            Some(coerced) => {
                out.insert(key.clone(), coerced);
            }
            None => {
                tracing::debug!(param = %key, "Dropping malformed parameter");
            }
        }
    }
    out
}

/// Clamp output-count parameters to `[1, max_images]`.
pub fn apply_generation_limits(mut params: CoercedParams, max_images: Option<u32>) -> CoercedParams {
    let Some(max) = max_images else {
        return params;
    };
    for key in COUNT_PARAMS {
        if let Some(n) = params.get(*key).and_then(to_number) {
            let clamped = n.round().clamp(1.0, f64::from(max.max(1)));
            params.insert((*key).to_string(), Value::from(clamped as i64));
        }
    }
    params
}

/// Convert a `size` string (`"W*H"` or `"WxH"`) into an `image_size` object
/// and clamp width/height to the model's bounds.
///
/// An explicit `image_size` object takes precedence over `size`.
pub fn normalize_image_size(mut params: Map<String, Value>, model: &ModelConfig) -> Map<String, Value> {
    if let Some(Value::Object(size)) = params.get("image_size") {
        let width = size.get("width").and_then(to_number);
        let height = size.get("height").and_then(to_number);
        if let (Some(w), Some(h)) = (width, height) {
            let clamped = clamp_dimensions(w, h, model);
            params.insert("image_size".to_string(), clamped);
        }
        return params;
    }

    let parsed = params
        .get("size")
        .and_then(Value::as_str)
        .and_then(parse_size);
    if let Some((w, h)) = parsed {
        params.insert("image_size".to_string(), clamp_dimensions(w, h, model));
        params.remove("size");
    }
    params
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn coerce_value(value: &Value, spec: &ParamSpec) -> Option<Value> {
    match spec.param_type {
        ParamType::Number | ParamType::Integer => {
            let n = to_number(value)?;
            let clamped = clamp(n, spec.minimum, spec.maximum);
            if spec.param_type == ParamType::Integer {
                Some(Value::from(round_within(clamped, spec.minimum, spec.maximum)))
            } else {
                Number::from_f64(clamped).map(Value::Number)
            }
        }
        ParamType::Boolean => match value {
            Value::Bool(b) => Some(Value::Bool(*b)),
            Value::String(s) if s == "true" => Some(Value::Bool(true)),
            Value::String(s) if s == "false" => Some(Value::Bool(false)),
            _ => None,
        },
        ParamType::String => match value {
            Value::String(s) => Some(Value::String(s.clone())),
            Value::Null => None,
            other => Some(Value::String(other.to_string())),
        },
        ParamType::Array => match value {
            Value::Array(items) => {
                let limit = spec.max_items.unwrap_or(items.len());
                Some(Value::Array(items.iter().take(limit).cloned().collect()))
            }
            _ => None,
        },
        ParamType::Object => match value {
            Value::Object(obj) => Some(Value::Object(obj.clone())),
            _ => None,
        },
    }
}

/// Replace a non-member value with the declared default, or drop it.
fn apply_enum(value: Value, spec: &ParamSpec) -> Option<Value> {
    let Some(allowed) = &spec.allowed else {
        return Some(value);
    };
    if allowed.iter().any(|candidate| values_equal(candidate, &value)) {
        Some(value)
    } else {
        spec.default.clone()
    }
}

/// Equality that treats `4` and `4.0` as the same number.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// Parse a JSON number or a numeric string.
pub(crate) fn to_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) if !s.trim().is_empty() => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

fn clamp(value: f64, min: Option<f64>, max: Option<f64>) -> f64 {
    let mut next = value;
    if let Some(min) = min {
        next = next.max(min);
    }
    if let Some(max) = max {
        next = next.min(max);
    }
    next
}

/// Round to an integer without leaving fractional bounds.
fn round_within(value: f64, min: Option<f64>, max: Option<f64>) -> i64 {
    let mut rounded = value.round();
    if let Some(max) = max {
        if rounded > max {
            rounded = max.floor();
        }
    }
    if let Some(min) = min {
        if rounded < min {
            rounded = min.ceil();
        }
    }
    rounded as i64
}

fn parse_size(size: &str) -> Option<(f64, f64)> {
    let (w, h) = size.split_once('*').or_else(|| size.split_once('x'))?;
    let width = w.trim().parse::<f64>().ok()?;
    let height = h.trim().parse::<f64>().ok()?;
    Some((width, height))
}

fn clamp_dimensions(width: f64, height: f64, model: &ModelConfig) -> Value {
    let w = clamp(
        width,
        model.min_width.map(f64::from),
        model.max_width.map(f64::from),
    );
    let h = clamp(
        height,
        model.min_height.map(f64::from),
        model.max_height.map(f64::from),
    );
    serde_json::json!({ "width": w.round() as i64, "height": h.round() as i64 })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
