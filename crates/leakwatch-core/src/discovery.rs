//! Field Discovery: ranks email/username candidates and enumerates visible
//! password inputs for one frame, each returned with a fully-qualified
//! cross-frame [`ElementIdentifier`].

use std::time::{SystemTime, UNIX_EPOCH};

use leakwatch_protocol::{BoundingBox, ElementIdentifier, FieldAttributes, FieldType, SelectorChain};
use leakwatch_runtime::{BrowserDriver, FrameId, JsValue};
use serde_json::Value as Json;

use crate::error::Result;

/// Walks `frame`'s ancestor chain, returning frame URLs innermost first
/// (including `frame` itself) — the frame-stack half of an identifier.
pub async fn frame_stack(driver: &dyn BrowserDriver, frame: FrameId) -> Result<Vec<String>> {
    let mut stack = vec![driver.url(frame).await?];
    let mut current = frame;
    while let Some(parent) = driver.parent(current).await? {
        stack.push(driver.url(parent).await?);
        current = parent;
    }
    Ok(stack)
}

fn js_value_to_json(v: &JsValue) -> Json {
    match v {
        JsValue::Null | JsValue::Undefined => Json::Null,
        JsValue::Bool(b) => Json::Bool(*b),
        JsValue::Number(n) => serde_json::Number::from_f64(*n)
            .map(Json::Number)
            .unwrap_or(Json::Null),
        JsValue::String(s) => Json::String(s.clone()),
        JsValue::Array(items) => Json::Array(items.iter().map(js_value_to_json).collect()),
        JsValue::Object(map) => {
            Json::Object(map.iter().map(|(k, v)| (k.clone(), js_value_to_json(v))).collect())
        }
        // The page script's snapshot() never returns element handles, so
        // this branch is unreachable in practice; treated as absent rather
        // than a hard failure.
        JsValue::Opaque(_) => Json::Null,
    }
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSnapshot {
    selector_chain: SelectorChain,
    tag: String,
    id: Option<String>,
    class: Option<String>,
    name: Option<String>,
    input_type: Option<String>,
    href: Option<String>,
    inner_text: Option<String>,
    aria_label: Option<String>,
    placeholder: Option<String>,
    owning_form: Option<SelectorChain>,
    on_top: bool,
    in_viewport: bool,
    visible: bool,
    bounding_box: BoundingBox,
    heuristic_score: Option<f64>,
}

fn to_field(raw: RawSnapshot, field_type: FieldType, frame_stack: &[String], now_ms: u64) -> FieldAttributes {
    FieldAttributes {
        identifier: ElementIdentifier::new(frame_stack.to_vec(), raw.selector_chain),
        field_type,
        tag: raw.tag,
        id: raw.id,
        class: raw.class,
        name: raw.name,
        input_type: raw.input_type,
        href: raw.href,
        inner_text: raw.inner_text,
        aria_label: raw.aria_label,
        placeholder: raw.placeholder,
        owning_form: raw.owning_form,
        on_top: raw.on_top,
        in_viewport: raw.in_viewport,
        visible: raw.visible,
        bounding_box: raw.bounding_box,
        heuristic_score: raw.heuristic_score,
        filled: false,
        submitted: false,
        discovered_at_ms: now_ms,
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Discovers visible email and password candidates in `frame`. Invisible
/// candidates are dropped; callers dedup against already-known identifiers.
pub async fn discover_fields(driver: &dyn BrowserDriver, frame: FrameId) -> Result<Vec<FieldAttributes>> {
    let stack = frame_stack(driver, frame).await?;
    let now = now_ms();

    let email_raw = driver
        .evaluate_value(
            frame,
            "() => window.__leakwatch_v1__.collectEmailCandidates(document)",
            &[],
        )
        .await?;
    let password_raw = driver
        .evaluate_value(
            frame,
            "() => window.__leakwatch_v1__.collectPasswordFields(document)",
            &[],
        )
        .await?;

    let mut fields = Vec::new();
    for (value, field_type) in [(email_raw, FieldType::Email), (password_raw, FieldType::Password)] {
        let Json::Array(items) = js_value_to_json(&value) else {
            continue;
        };
        for item in items {
            let raw: RawSnapshot = match serde_json::from_value(item) {
                Ok(raw) => raw,
                Err(e) => {
                    tracing::warn!(error = %e, "malformed field snapshot from page script, skipping");
                    continue;
                }
            };
            if !raw.visible {
                continue;
            }
            fields.push(to_field(raw, field_type, &stack, now));
        }
    }
    Ok(fields)
}
