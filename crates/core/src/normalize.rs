//! Result normalization: provider payload -> ordered output URLs.
//!
//! Providers disagree about where outputs live. Extractors are tried in a
//! fixed order and the first one that yields a non-empty list wins. An empty
//! result is a normalization miss; it is the caller's job to treat that as a
//! failure rather than a success with zero outputs.

use std::collections::HashSet;

use serde_json::Value;

/// Keys that hold a single output URL inside an object.
const URL_KEYS: &[&str] = &["fileUrl", "file_url", "imageUrl", "image_url", "url"];

type Extractor = fn(&Value) -> Vec<String>;

/// Ordered shape matchers. First non-empty match wins.
const EXTRACTORS: &[(&str, Extractor)] = &[
    ("images", images_array),
    ("image", single_image),
    ("output", output_field),
    ("data.outputs", data_outputs),
];

/// Extract output URLs from a provider payload.
///
/// Order is preserved and duplicates are removed. Returns an empty list
/// when no extractor matches.
pub fn normalize(payload: &Value) -> Vec<String> {
    for (shape, extract) in EXTRACTORS {
        let urls = dedupe(extract(payload));
        if !urls.is_empty() {
            tracing::trace!(shape, count = urls.len(), "Normalized provider payload");
            return urls;
        }
    }
    Vec::new()
}

/// Deep search for URLs anywhere in `value`.
///
/// Used for node-graph output listings, whose layout varies by workflow.
/// Any `http(s)` string counts, as does the value of a known URL key.
pub fn collect_urls(value: &Value) -> Vec<String> {
    let mut out = Vec::new();
    walk(value, &mut out);
    dedupe(out)
}

fn walk(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) if is_http(s) => out.push(s.clone()),
        Value::Array(items) => items.iter().for_each(|v| walk(v, out)),
        Value::Object(obj) => {
            for key in URL_KEYS {
                if let Some(Value::String(s)) = obj.get(*key) {
                    if !s.is_empty() {
                        out.push(s.clone());
                    }
                }
            }
            for (key, v) in obj {
                if URL_KEYS.contains(&key.as_str()) && v.is_string() {
                    continue;
                }
                walk(v, out);
            }
        }
        _ => {}
    }
}

// ---------------------------------------------------------------------------
// Extractors
// ---------------------------------------------------------------------------

/// `{"images": [{"url": ...} | "..."]}`
fn images_array(payload: &Value) -> Vec<String> {
    payload
        .get("images")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(url_of).collect())
        .unwrap_or_default()
}

/// `{"image": {"url": ...}}` or `{"image_url": "..."}`
fn single_image(payload: &Value) -> Vec<String> {
    payload
        .get("image")
        .and_then(url_of)
        .or_else(|| payload.get("image_url").and_then(non_empty_str))
        .into_iter()
        .collect()
}

/// `{"output": "..." | [...]}`
fn output_field(payload: &Value) -> Vec<String> {
    payload.get("output").map(one_or_many).unwrap_or_default()
}

/// `{"data": {"outputs": "..." | [...]}}`
fn data_outputs(payload: &Value) -> Vec<String> {
    payload
        .get("data")
        .and_then(|d| d.get("outputs"))
        .map(one_or_many)
        .unwrap_or_default()
}

fn one_or_many(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(url_of).collect(),
        single => url_of(single).into_iter().collect(),
    }
}

/// A bare string or an object with a `url` field.
fn url_of(value: &Value) -> Option<String> {
    match value {
        Value::String(_) => non_empty_str(value),
        Value::Object(obj) => obj.get("url").and_then(non_empty_str),
        _ => None,
    }
}

fn non_empty_str(value: &Value) -> Option<String> {
    value.as_str().filter(|s| !s.is_empty()).map(str::to_string)
}

fn is_http(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

fn dedupe(urls: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::with_capacity(urls.len());
    urls.into_iter().filter(|u| seen.insert(u.clone())).collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
