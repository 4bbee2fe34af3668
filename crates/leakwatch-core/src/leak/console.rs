//! Console leak detector: scans every `console.*` call's arguments
//! (including previews of opaque objects) for an encoded password variant,
//! falling back to a synthesized stringification when a preview alone isn't
//! conclusive.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use leakwatch_protocol::{ConsoleLeak, UseSourceMaps};
use leakwatch_runtime::{CallFrameInfo, CdpSession, ConsoleApiCall, JsValue};
use serde_json::Value as Json;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::sourcemap::{ResolvedFrame, SourceMapCache};

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn contains_variant(text: &str, variants: &[String]) -> bool {
    variants.iter().any(|v| text.contains(v.as_str()))
}

fn scan_json(value: &Json, variants: &[String]) -> bool {
    match value {
        Json::String(s) => contains_variant(s, variants),
        Json::Array(items) => items.iter().any(|v| scan_json(v, variants)),
        Json::Object(map) => map
            .iter()
            .any(|(k, v)| contains_variant(k, variants) || scan_json(v, variants)),
        _ => false,
    }
}

fn scan_value(value: &JsValue, variants: &[String]) -> bool {
    match value {
        JsValue::String(s) => contains_variant(s, variants),
        JsValue::Array(items) => items.iter().any(|v| scan_value(v, variants)),
        JsValue::Object(map) => map
            .iter()
            .any(|(k, v)| contains_variant(k, variants) || scan_value(v, variants)),
        _ => false,
    }
}

/// Scans a single console call's arguments and previews. Arguments that
/// neither materialize as a string/object/array nor have a conclusive
/// preview are stringified on demand via `Runtime.callFunctionOn` and
/// rescanned, matching the "not found in preview" fallback.
async fn call_matches(session: &dyn CdpSession, call: &ConsoleApiCall, variants: &[String]) -> Result<bool> {
    if call.args.iter().any(|a| scan_value(a, variants)) {
        return Ok(true);
    }
    if call.previews.iter().any(|p| scan_json(p, variants)) {
        return Ok(true);
    }
    for arg in &call.args {
        if let JsValue::Opaque(handle) = arg {
            let stringified = session
                .call_function_on(&handle.object_id, "function() { try { return String(this); } catch (e) { return ''; } }")
                .await?;
            if scan_json(&stringified, variants) {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

fn render_message(call: &ConsoleApiCall) -> String {
    call.args
        .iter()
        .map(render_arg)
        .collect::<Vec<_>>()
        .join(" ")
}

fn render_arg(arg: &JsValue) -> String {
    match arg {
        JsValue::Null => "null".to_string(),
        JsValue::Undefined => "undefined".to_string(),
        JsValue::Bool(b) => b.to_string(),
        JsValue::Number(n) => n.to_string(),
        JsValue::String(s) => s.clone(),
        JsValue::Array(items) => format!("[{}]", items.iter().map(render_arg).collect::<Vec<_>>().join(", ")),
        JsValue::Object(_) => "[object Object]".to_string(),
        JsValue::Opaque(handle) => format!("[{}]", handle.class_name),
    }
}

async fn resolve_stack(
    session: &dyn CdpSession,
    mode: UseSourceMaps,
    sourcemaps: &SourceMapCache,
    call_frames: &[CallFrameInfo],
) -> Option<String> {
    if call_frames.is_empty() {
        return None;
    }
    let mut rendered = Vec::with_capacity(call_frames.len());
    for frame in call_frames {
        let resolved = sourcemaps
            .resolve(
                session,
                mode,
                ResolvedFrame {
                    function_name: if frame.function_name.is_empty() {
                        "<anonymous>".to_string()
                    } else {
                        frame.function_name.clone()
                    },
                    url: frame.url.clone(),
                    line: frame.line_number,
                    column: frame.column_number,
                },
            )
            .await;
        rendered.push(resolved.render());
    }
    Some(rendered.join("\n"))
}

/// Drives the `Runtime.consoleAPICalled` subscription until the channel
/// closes; intended to be `tokio::spawn`ed per page.
pub async fn watch(
    session: Arc<dyn CdpSession>,
    mode: UseSourceMaps,
    sourcemaps: Arc<SourceMapCache>,
    variants: Vec<String>,
    tx: mpsc::UnboundedSender<ConsoleLeak>,
) -> Result<()> {
    session.enable_runtime().await?;
    let mut calls = session.console_api_called().await?;
    while let Some(call) = calls.recv().await {
        if !call_matches(&*session, &call, &variants).await? {
            continue;
        }
        let stack = match &call.stack {
            Some(frames) => resolve_stack(&*session, mode, &sourcemaps, frames).await,
            None => None,
        };
        let leak = ConsoleLeak {
            time_ms: now_ms(),
            kind: call.kind,
            rendered_message: render_message(&call),
            stack,
        };
        let _ = tx.send(leak);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_variant_in_plain_string() {
        let variants = vec!["The--P@s5w0rd".to_string()];
        assert!(scan_value(&JsValue::String("leaked: The--P@s5w0rd".into()), &variants));
    }

    #[test]
    fn ignores_unrelated_strings() {
        let variants = vec!["The--P@s5w0rd".to_string()];
        assert!(!scan_value(&JsValue::String("hello world".into()), &variants));
    }
}
