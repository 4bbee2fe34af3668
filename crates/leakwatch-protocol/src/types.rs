//! Core data model shared between the core engine and its consumers.
//!
//! These types represent snapshots of browser-side state (elements, leaks,
//! events) captured at a point in time; none of them hold a live handle into
//! the browser. See `leakwatch-core::registry` for the live, host-side
//! counterparts (`Page`, `Frame`) that produce these snapshots.

use serde::{Deserialize, Serialize};

/// Ordered sequence of per-root CSS selectors that together navigate from the
/// topmost document, through zero or more nested shadow roots, to a single
/// target element.
///
/// Invariant: if `resolve(chain)` succeeds in the frame it was produced in,
/// `chain` round-trips through `formSelectorChain(resolved)` (checked in
/// debug mode, see `leakwatch-core::discovery`).
pub type SelectorChain = Vec<String>;

/// Identifies a single element across async boundaries: the stack of frame
/// URLs it lives behind (innermost first) plus the selector chain that
/// locates it inside the innermost frame's document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementIdentifier {
    /// Frame URLs, innermost (the frame directly containing the element) first.
    pub frame_stack: Vec<String>,
    pub selector_chain: SelectorChain,
}

impl ElementIdentifier {
    pub fn new(frame_stack: Vec<String>, selector_chain: SelectorChain) -> Self {
        Self {
            frame_stack,
            selector_chain,
        }
    }

    /// Stable string encoding used as the key of `FieldsMap` and the entries
    /// of `ProcessedFields`.
    pub fn encode(&self) -> String {
        format!("{}::{}", self.frame_stack.join(">"), self.selector_chain.join(">"))
    }
}

/// Whether a discovered input is the email/username candidate or the
/// password field of a form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Email,
    Password,
}

/// Element snapshot taken at discovery time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldAttributes {
    pub identifier: ElementIdentifier,
    pub field_type: FieldType,
    pub tag: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inner_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aria_label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    /// Selector chain of the owning `<form>`, if any; `None` means the field
    /// belongs to the synthetic "no form" group.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owning_form: Option<SelectorChain>,
    pub on_top: bool,
    pub in_viewport: bool,
    pub visible: bool,
    pub bounding_box: BoundingBox,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heuristic_score: Option<f64>,
    pub filled: bool,
    pub submitted: bool,
    pub discovered_at_ms: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Anchor/button/span/div discovered by the link finder as a likely
/// login/register link.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkAttributes {
    pub identifier: ElementIdentifier,
    pub tag: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inner_text: Option<String>,
    /// Which of the three strategies (`exact`, `loose`, `coordinate`) matched.
    pub match_strategy: &'static str,
    pub on_top: bool,
    pub in_viewport: bool,
}

/// A leak of the marker password into a DOM attribute.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomPasswordLeak {
    pub time_ms: u64,
    pub attribute: String,
    pub identifier: ElementIdentifier,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleMessageKind {
    Log,
    Debug,
    Info,
    Warning,
    Error,
    Trace,
}

/// A leak of the marker password as an argument to a console API call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleLeak {
    pub time_ms: u64,
    pub kind: ConsoleMessageKind,
    pub rendered_message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Page,
    BackgroundPage,
    Worker,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitedTarget {
    pub url: String,
    pub kind: TargetKind,
    pub time_ms: u64,
}

/// Orchestrator decisions, in the order they occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    Fill,
    Submit,
    FbButton,
    Return,
    Link,
    Navigate,
    Screenshot,
    Interact,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub kind: EventKind,
    pub time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<ElementIdentifier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl Event {
    pub fn new(kind: EventKind, time_ms: u64) -> Self {
        Self {
            kind,
            time_ms,
            identifier: None,
            context: None,
        }
    }

    pub fn with_identifier(mut self, identifier: ElementIdentifier) -> Self {
        self.identifier = Some(identifier);
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    pub time_ms: u64,
    pub level: ErrorLevel,
    pub message: String,
    /// Frame-URL breadcrumbs leading to whatever raised this, innermost first.
    pub breadcrumbs: Vec<String>,
}
