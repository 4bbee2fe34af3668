//! Typed handle unwrap for values returned from `evaluateHandle`.
//!
//! Scalar primitives, arrays, and plain objects are materialized host-side
//! by recursively walking the CDP `Runtime.RemoteObject` the page returned.
//! Elements, other `Node`s, functions, symbols, typed arrays, dates,
//! regexps, promises, maps, and sets remain as opaque handles the host
//! never tries to interpret.

use std::collections::BTreeMap;

use downcast_rs::{impl_downcast, Downcast};
use serde_json::Value as Json;

/// An opaque, non-materializable remote value: the host holds only its CDP
/// `objectId` and a type tag, and must route any further interaction
/// through `evaluate`/`evaluateHandle` rather than reading its contents
/// directly.
#[derive(Debug, Clone)]
pub struct OpaqueHandle {
    pub object_id: String,
    pub class_name: &'static str,
}

/// Trait implemented by opaque handle payloads so callers can attempt a
/// typed downcast (`ElementHandle`, `NodeHandle`, ...) the way the core's
/// field discovery does when it receives a handle back from the page
/// script.
pub trait HandlePayload: Downcast + Send + Sync + std::fmt::Debug {}
impl_downcast!(HandlePayload);

/// Result of materializing a `Runtime.RemoteObject`.
#[derive(Debug, Clone)]
pub enum JsValue {
    Null,
    Undefined,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<JsValue>),
    Object(BTreeMap<String, JsValue>),
    /// Element, Node, Function, Symbol, TypedArray, Date, RegExp, Promise,
    /// Map, or Set — kept opaque rather than materialized.
    Opaque(OpaqueHandle),
}

impl JsValue {
    /// Recursively walks a deserialized CDP `RemoteObject`-shaped JSON value
    /// (as produced by `Runtime.callFunctionOn` with `returnByValue: true`
    /// for the primitive/array/object cases, and by-reference for the rest)
    /// into a [`JsValue`].
    ///
    /// `classify` decides, for a `{"objectId": ..., "className": ...}`
    /// reference, whether the value should be treated as opaque; it is the
    /// seam the chromiumoxide-backed driver hooks to tag element/node
    /// handles distinctly from plain unresolved objects.
    pub fn from_remote(value: &Json, object_id: Option<&str>, class_name: Option<&str>) -> Self {
        if let (Some(object_id), Some(class_name)) = (object_id, class_name) {
            if is_opaque_class(class_name) {
                return JsValue::Opaque(OpaqueHandle {
                    object_id: object_id.to_string(),
                    class_name: canonical_class_name(class_name),
                });
            }
        }
        Self::from_value(value)
    }

    fn from_value(value: &Json) -> Self {
        match value {
            Json::Null => JsValue::Null,
            Json::Bool(b) => JsValue::Bool(*b),
            Json::Number(n) => JsValue::Number(n.as_f64().unwrap_or(f64::NAN)),
            Json::String(s) => JsValue::String(s.clone()),
            Json::Array(items) => JsValue::Array(items.iter().map(Self::from_value).collect()),
            Json::Object(map) => JsValue::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Self::from_value(v)))
                    .collect(),
            ),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            JsValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            JsValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            JsValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn is_opaque(&self) -> bool {
        matches!(self, JsValue::Opaque(_))
    }
}

fn is_opaque_class(class_name: &str) -> bool {
    matches!(
        canonical_class_name(class_name),
        "Element" | "Node" | "Function" | "Symbol" | "Date" | "RegExp" | "Promise" | "Map" | "Set"
    ) || class_name.ends_with("Array") && class_name != "Array"
}

fn canonical_class_name(class_name: &str) -> &'static str {
    match class_name {
        "HTMLInputElement" | "HTMLFormElement" | "HTMLAnchorElement" | "HTMLButtonElement"
        | "HTMLElement" | "Element" | "ShadowRoot" => "Element",
        "Function" | "AsyncFunction" => "Function",
        "Symbol" => "Symbol",
        "Date" => "Date",
        "RegExp" => "RegExp",
        "Promise" => "Promise",
        "Map" => "Map",
        "Set" => "Set",
        other if other.ends_with("Array") => "TypedArray",
        _ => "Node",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitives_materialize_by_value() {
        let v = JsValue::from_remote(&serde_json::json!(42.0), None, None);
        assert_eq!(v.as_f64(), Some(42.0));
    }

    #[test]
    fn objects_recurse() {
        let v = JsValue::from_remote(
            &serde_json::json!({"a": 1, "b": {"c": "x"}}),
            None,
            None,
        );
        match v {
            JsValue::Object(map) => {
                assert_eq!(map.get("a").and_then(JsValue::as_f64), Some(1.0));
                match map.get("b") {
                    Some(JsValue::Object(inner)) => {
                        assert_eq!(inner.get("c").and_then(|v| v.as_str()), Some("x"))
                    }
                    other => panic!("expected nested object, got {other:?}"),
                }
            }
            other => panic!("expected object, got {other:?}"),
        }
    }

    #[test]
    fn elements_stay_opaque() {
        let v = JsValue::from_remote(
            &serde_json::json!({}),
            Some("obj-1"),
            Some("HTMLInputElement"),
        );
        assert!(v.is_opaque());
    }
}
