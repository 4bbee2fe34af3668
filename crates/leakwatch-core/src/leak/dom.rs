//! DOM attribute leak detector: the in-page `MutationObserver` wiring
//! (reporting via an exposed host callback) plus host-side `DOMDebugger`
//! attribute-modified breakpoints with stack-trace capture.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use leakwatch_protocol::{DomPasswordLeak, ElementIdentifier, SelectorChain, UseSourceMaps};
use leakwatch_runtime::{BrowserDriver, CallFrameInfo, CdpNodeId, CdpSession, HostFn, JsValue, PageId};
use serde_json::Value as Json;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::sourcemap::{ResolvedFrame, SourceMapCache};

/// The raw password, its single- and double-URI-encoded forms, and its
/// JSON-quoted form — everything the detector watches DOM attributes for.
pub fn password_variants(password: &str) -> Vec<String> {
    let once = urlencoding::encode(password).into_owned();
    let twice = urlencoding::encode(&once).into_owned();
    let quoted = serde_json::to_string(password).unwrap_or_default();
    vec![password.to_string(), once, twice, quoted]
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Installs the in-page `MutationObserver` side of the detector across every
/// frame of `page`, idempotent via the driver's own idempotent `expose`
/// (callers additionally gate this on `FrameRegistry::should_install_dom_leak_detector`
/// so the page script's own installer, which is itself idempotent, is only
/// asked once per page).
///
/// `resolve_frame_stack` maps an observing document's own URL to the full
/// frame-stack (innermost first); the page script only knows its own
/// document, not its ancestors.
pub async fn install_mutation_observer(
    driver: &Arc<dyn BrowserDriver>,
    page: PageId,
    host_fn_name: &str,
    variants: Vec<String>,
    resolve_frame_stack: Arc<dyn Fn(&str) -> Vec<String> + Send + Sync>,
    tx: mpsc::UnboundedSender<DomPasswordLeak>,
) -> Result<()> {
    let host_fn: HostFn = Arc::new(move |args: Json| {
        let resolve_frame_stack = resolve_frame_stack.clone();
        let tx = tx.clone();
        Box::pin(async move {
            let Json::Array(parts) = args else {
                return Ok(Json::Null);
            };
            let mut it = parts.into_iter();
            let chain: SelectorChain = it
                .next()
                .and_then(|v| serde_json::from_value(v).ok())
                .unwrap_or_default();
            let attribute = it
                .next()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default();
            let frame_url = it
                .next()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default();
            let leak = DomPasswordLeak {
                time_ms: now_ms(),
                attribute,
                identifier: ElementIdentifier::new(resolve_frame_stack(&frame_url), chain),
                stack: None,
            };
            let _ = tx.send(leak);
            Ok(Json::Null)
        })
    });
    driver.expose(page, host_fn_name, host_fn).await?;

    let variants_json = serde_json::to_value(&variants)?;
    let install_expr = format!(
        "(variants) => window.__leakwatch_v1__.installDomLeakDetector(variants, (chain, attr, url) => window.{host_fn_name}(chain, attr, url))"
    );
    for frame in driver.frames(page).await? {
        driver.evaluate(frame, &install_expr, &[variants_json.clone()]).await?;
    }
    Ok(())
}

#[derive(Default)]
struct WatcherState {
    identifiers: HashMap<CdpNodeId, ElementIdentifier>,
    seen_attrs: HashMap<CdpNodeId, HashSet<String>>,
}

/// Host-side half: arms a `DOMDebugger` attribute-modified breakpoint on a
/// password field and its form siblings, and resolves a stack trace (with
/// optional source-map lookup) whenever one of them fires.
///
/// `watch` and `run` take `&self` rather than `&mut self`/`self` so a single
/// instance can be shared behind an `Arc`: one task drives `run`'s pause loop
/// for the lifetime of the page while other tasks keep arming breakpoints on
/// newly discovered fields through `watch`.
pub struct DomBreakpointWatcher {
    session: Arc<dyn CdpSession>,
    state: tokio::sync::Mutex<WatcherState>,
}

impl DomBreakpointWatcher {
    pub fn new(session: Arc<dyn CdpSession>) -> Self {
        Self {
            session,
            state: tokio::sync::Mutex::new(WatcherState::default()),
        }
    }

    /// Arms a breakpoint on the element behind `handle`, identified for
    /// reporting purposes as `identifier`. A no-op if already watched — CDP
    /// `DOM.requestNode` ids are stable for the observation's lifetime, so
    /// they're requested once and retained rather than re-fetched.
    pub async fn watch(&self, handle: &JsValue, identifier: ElementIdentifier) -> Result<()> {
        let node = self.session.request_node(handle).await?;
        if self.state.lock().await.identifiers.contains_key(&node) {
            return Ok(());
        }
        self.session.enable_debugger().await?;
        self.session.set_attribute_breakpoint(node).await?;
        let attrs = self.session.get_attributes(node).await.unwrap_or_default();
        let mut state = self.state.lock().await;
        state
            .seen_attrs
            .insert(node, attrs.into_iter().map(|(name, _)| name).collect());
        state.identifiers.insert(node, identifier);
        Ok(())
    }

    /// Drives the pause-handling loop until the driver's event channel
    /// closes; intended to be `tokio::spawn`ed per page. Every previously
    /// unseen attribute on a watched node, observed at a DOM pause, is
    /// reported with a resolved stack.
    pub async fn run(
        &self,
        mode: UseSourceMaps,
        sourcemaps: Arc<SourceMapCache>,
        tx: mpsc::UnboundedSender<DomPasswordLeak>,
    ) -> Result<()> {
        let mut paused = self.session.debugger_paused().await?;
        while let Some(pause) = paused.recv().await {
            if !pause.reason.to_ascii_lowercase().contains("dom") {
                let _ = self.session.resume().await;
                continue;
            }
            let targets: Vec<CdpNodeId> = {
                let state = self.state.lock().await;
                match pause.node_id {
                    Some(node) if state.identifiers.contains_key(&node) => vec![node],
                    // The pause event didn't carry a node id (or it wasn't one we
                    // armed); fall back to re-checking every watched node.
                    _ => state.identifiers.keys().copied().collect(),
                }
            };
            for node in targets {
                let Ok(attrs) = self.session.get_attributes(node).await else {
                    continue;
                };
                let newly_seen: Vec<String> = {
                    let mut state = self.state.lock().await;
                    let Some(_) = state.identifiers.get(&node) else {
                        continue;
                    };
                    let seen = state.seen_attrs.entry(node).or_default();
                    attrs
                        .iter()
                        .filter(|(name, _)| seen.insert(name.clone()))
                        .map(|(name, _)| name.clone())
                        .collect()
                };
                if newly_seen.is_empty() {
                    continue;
                }
                let identifier = match self.state.lock().await.identifiers.get(&node).cloned() {
                    Some(identifier) => identifier,
                    None => continue,
                };
                for name in newly_seen {
                    let stack = resolve_stack(&*self.session, mode, &sourcemaps, &pause.call_frames).await;
                    let leak = DomPasswordLeak {
                        time_ms: now_ms(),
                        attribute: name,
                        identifier: identifier.clone(),
                        stack: Some(stack),
                    };
                    let _ = tx.send(leak);
                }
            }
            self.session.resume().await?;
        }
        Ok(())
    }
}

async fn resolve_stack(
    session: &dyn CdpSession,
    mode: UseSourceMaps,
    sourcemaps: &SourceMapCache,
    call_frames: &[CallFrameInfo],
) -> String {
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
    rendered.join("\n")
}
