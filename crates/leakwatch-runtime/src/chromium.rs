//! `chromiumoxide`-backed implementation of [`BrowserDriver`].
//!
//! leakwatch talks Chrome DevTools Protocol directly rather than through a
//! higher-level automation protocol: the leak observers need raw `DOM.*` /
//! `DOMDebugger.*` / `Debugger.*` access that a Playwright-style wire
//! protocol does not expose. `chromiumoxide` is a native CDP client (see
//! `DESIGN.md` for why this dependency choice departs from the rest of the
//! workspace's stack).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::dom::{GetAttributesParams, NodeId, RequestNodeParams};
use chromiumoxide::cdp::browser_protocol::dom_debugger::{
    DomBreakpointType, SetDomBreakpointParams,
};
use chromiumoxide::cdp::browser_protocol::io::{CloseParams as IoCloseParams, ReadParams as IoReadParams};
use chromiumoxide::cdp::browser_protocol::network::LoadNetworkResourceParams;
use chromiumoxide::cdp::js_protocol::debugger::{
    EnableParams as DebuggerEnableParams, EventPaused, ResumeParams,
};
use chromiumoxide::cdp::js_protocol::runtime::{
    CallFunctionOnParams, EnableParams as RuntimeEnableParams, EventConsoleApiCalled,
    RemoteObjectId,
};
use chromiumoxide::page::Page;
use dashmap::DashMap;
use futures_util::StreamExt;
use serde_json::Value as Json;
use tokio::sync::mpsc;

use crate::driver::{
    BoxFuture, BrowserDriver, CallFrameInfo, CdpNodeId, CdpSession, ConsoleApiCall, DebuggerPause,
    FrameId, HostFn, PageId,
};
use crate::error::{Error, Result};
use crate::handle::JsValue;

/// Driver backed by a live `chromiumoxide::Browser`.
///
/// Pages and frames are assigned small opaque integer ids on first
/// observation; the registry maps those back to the `chromiumoxide` handles
/// needed to actually act on them.
pub struct ChromiumDriver {
    browser: Arc<chromiumoxide::Browser>,
    pages: DashMap<PageId, Arc<Page>>,
    next_page_id: AtomicU64,
    frames: DashMap<FrameId, FrameEntry>,
    next_frame_id: AtomicU64,
    exposed: DashMap<(PageId, String), ()>,
}

struct FrameEntry {
    page: PageId,
    parent: Option<FrameId>,
    frame_id: chromiumoxide::cdp::browser_protocol::page::FrameId,
}

impl ChromiumDriver {
    pub fn new(browser: Arc<chromiumoxide::Browser>) -> Self {
        Self {
            browser,
            pages: DashMap::new(),
            next_page_id: AtomicU64::new(1),
            frames: DashMap::new(),
            next_frame_id: AtomicU64::new(1),
            exposed: DashMap::new(),
        }
    }

    /// Registers a newly observed page, returning the id it was assigned
    /// (or its existing id, if already known).
    pub fn register_page(&self, page: Arc<Page>) -> PageId {
        for entry in self.pages.iter() {
            if Arc::ptr_eq(entry.value(), &page) {
                return *entry.key();
            }
        }
        let id = PageId(self.next_page_id.fetch_add(1, Ordering::SeqCst));
        self.pages.insert(id, page);
        id
    }

    /// Registers a frame belonging to `page`, idempotently: re-registering
    /// the same `chromiumoxide` frame id returns the same [`FrameId`].
    pub fn register_frame(
        &self,
        page: PageId,
        parent: Option<FrameId>,
        raw: chromiumoxide::cdp::browser_protocol::page::FrameId,
    ) -> FrameId {
        for entry in self.frames.iter() {
            if entry.value().frame_id == raw {
                return *entry.key();
            }
        }
        let id = FrameId(self.next_frame_id.fetch_add(1, Ordering::SeqCst));
        self.frames.insert(
            id,
            FrameEntry {
                page,
                parent,
                frame_id: raw,
            },
        );
        id
    }

    /// Opens a new top-level page at `url` and registers both it and its
    /// main frame, the way an embedder bootstraps a crawl: the main frame's
    /// id is resolved eagerly at page-construction time rather than waiting
    /// for a `frameAttached` event, since the main frame always exists
    /// before navigation starts.
    pub async fn new_page(&self, url: &str) -> Result<(PageId, FrameId)> {
        let page = self
            .browser
            .new_page(url)
            .await
            .map_err(|e| Error::Protocol(e.to_string()))?;
        let page = Arc::new(page);
        let page_id = self.register_page(page.clone());
        let raw_frame = page
            .mainframe()
            .await
            .map_err(|e| Error::Protocol(e.to_string()))?
            .ok_or_else(|| Error::Protocol("page has no main frame yet".into()))?;
        let frame_id = self.register_frame(page_id, None, raw_frame);
        Ok((page_id, frame_id))
    }

    fn page_handle(&self, id: PageId) -> Result<Arc<Page>> {
        self.pages
            .get(&id)
            .map(|e| e.value().clone())
            .ok_or_else(|| Error::TargetClosed {
                target_type: "page".into(),
                context: format!("{id:?} is not registered"),
            })
    }

    fn frame_page(&self, frame: FrameId) -> Result<Arc<Page>> {
        let entry = self.frames.get(&frame).ok_or_else(|| {
            Error::FrameDetached(format!("{frame:?} is not registered"))
        })?;
        self.page_handle(entry.page)
    }
}

#[async_trait]
impl BrowserDriver for ChromiumDriver {
    async fn evaluate(&self, frame: FrameId, expression: &str, args: &[Json]) -> Result<()> {
        self.evaluate_value(frame, expression, args).await.map(|_| ())
    }

    async fn evaluate_value(&self, frame: FrameId, expression: &str, args: &[Json]) -> Result<JsValue> {
        let page = self.frame_page(frame)?;
        let call = wrap_call(expression, args);
        let result: Json = page
            .evaluate(call)
            .await
            .map_err(|e| Error::EvaluationFailed(e.to_string()))?
            .into_value()
            .map_err(|e| Error::EvaluationFailed(e.to_string()))?;
        Ok(JsValue::from_remote(&result, None, None))
    }

    async fn expose(&self, page: PageId, name: &str, host_fn: HostFn) -> Result<()> {
        let key = (page, name.to_string());
        if self.exposed.contains_key(&key) {
            return Ok(());
        }
        let handle = self.page_handle(page)?;
        handle
            .expose_function(name, move |arg: Json| {
                let host_fn = host_fn.clone();
                async move { host_fn(arg).await.unwrap_or(Json::Null) }
            })
            .await
            .map_err(|e| Error::Protocol(e.to_string()))?;
        self.exposed.insert(key, ());
        Ok(())
    }

    async fn pages(&self) -> Result<Vec<PageId>> {
        Ok(self.pages.iter().map(|e| *e.key()).collect())
    }

    async fn frames(&self, page: PageId) -> Result<Vec<FrameId>> {
        Ok(self
            .frames
            .iter()
            .filter(|e| e.value().page == page)
            .map(|e| *e.key())
            .collect())
    }

    async fn parent(&self, frame: FrameId) -> Result<Option<FrameId>> {
        Ok(self
            .frames
            .get(&frame)
            .and_then(|e| e.value().parent))
    }

    async fn url(&self, frame: FrameId) -> Result<String> {
        let page = self.frame_page(frame)?;
        page.url()
            .await
            .map_err(|e| Error::Protocol(e.to_string()))?
            .ok_or_else(|| Error::Protocol("frame has no URL yet".into()))
    }

    async fn detached(&self, frame: FrameId) -> Result<bool> {
        Ok(!self.frames.contains_key(&frame))
    }

    async fn query(&self, frame: FrameId, selector: &str) -> Result<Vec<JsValue>> {
        let page = self.frame_page(frame)?;
        let script = format!(
            "{SHADOW_PIERCING_QUERY}\n__leakwatchShadowQuery(document, {selector:?})",
            SHADOW_PIERCING_QUERY = SHADOW_PIERCING_QUERY_JS,
        );
        let result: Json = page
            .evaluate(script)
            .await
            .map_err(|e| Error::EvaluationFailed(e.to_string()))?
            .into_value()
            .map_err(|e| Error::EvaluationFailed(e.to_string()))?;
        match result {
            Json::Array(items) => Ok(items
                .iter()
                .map(|v| JsValue::from_remote(v, None, Some("Element")))
                .collect()),
            _ => Ok(vec![]),
        }
    }

    async fn new_cdp_session(&self, page: PageId) -> Result<Arc<dyn CdpSession>> {
        let handle = self.page_handle(page)?;
        Ok(Arc::new(ChromiumCdpSession { page: handle }))
    }

    async fn goto(&self, frame: FrameId, url: &str) -> Result<()> {
        let page = self.frame_page(frame)?;
        page.goto(url).await.map_err(|e| {
            if e.to_string().to_ascii_lowercase().contains("timeout") {
                Error::NavigationTimeout {
                    url: url.to_string(),
                    duration_ms: 0,
                }
            } else {
                Error::Protocol(e.to_string())
            }
        })?;
        Ok(())
    }

    async fn bring_to_front(&self, page: PageId) -> Result<()> {
        let handle = self.page_handle(page)?;
        handle
            .bring_to_front()
            .await
            .map_err(|e| Error::Protocol(e.to_string()))?;
        Ok(())
    }

    async fn screenshot(&self, page: PageId) -> Result<Vec<u8>> {
        let handle = self.page_handle(page)?;
        let params = chromiumoxide::page::ScreenshotParams::builder()
            .format(chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat::Png)
            .full_page(true)
            .build();
        handle
            .screenshot(params)
            .await
            .map_err(|e| Error::Protocol(e.to_string()))
    }

    async fn close_page(&self, page: PageId) -> Result<()> {
        let handle = self.page_handle(page)?;
        handle.close().await.map_err(|e| Error::Protocol(e.to_string()))?;
        self.pages.remove(&page);
        Ok(())
    }
}

/// Wraps `expression` as an IIFE invoked with `args`, so callers can write
/// plain JS without worrying about argument splicing themselves.
fn wrap_call(expression: &str, args: &[Json]) -> String {
    let args_json = serde_json::to_string(&Json::Array(args.to_vec())).unwrap_or_else(|_| "[]".into());
    format!("(({expression}))(...({args_json}))")
}

/// Injected once per `query` call: a descendant query that pierces open and
/// closed shadow roots via `TreeWalker`, capturing `Element.prototype`'s
/// `shadowRoot` getter and `matches` function once to dodge prototype
/// tampering by page scripts.
const SHADOW_PIERCING_QUERY_JS: &str = r#"
function __leakwatchShadowQuery(root, selector) {
    const proto = window.Element.prototype;
    const shadowRootGetter = Object.getOwnPropertyDescriptor(proto, 'shadowRoot').get;
    const matches = proto.matches;
    const found = [];
    const visit = (node) => {
        if (node.nodeType === Node.ELEMENT_NODE && matches.call(node, selector)) {
            found.push(node);
        }
        const shadow = node.nodeType === Node.ELEMENT_NODE ? shadowRootGetter.call(node) : null;
        const walker = document.createTreeWalker(
            shadow || node,
            NodeFilter.SHOW_ELEMENT,
        );
        let current = shadow ? walker.currentNode : walker.nextNode();
        if (shadow) visit(shadow.firstElementChild);
        while (current) {
            visit(current);
            current = walker.nextNode();
        }
    };
    visit(root.documentElement || root);
    return found;
}
"#;

/// A CDP session scoped to one page.
struct ChromiumCdpSession {
    page: Arc<Page>,
}

#[async_trait]
impl CdpSession for ChromiumCdpSession {
    async fn request_node(&self, handle: &JsValue) -> Result<CdpNodeId> {
        let JsValue::Opaque(opaque) = handle else {
            return Err(Error::InvalidArgument("request_node needs an element handle".into()));
        };
        let params = RequestNodeParams::new(RemoteObjectId::new(opaque.object_id.clone()));
        let resp = self
            .page
            .execute(params)
            .await
            .map_err(|e| Error::Protocol(e.to_string()))?;
        Ok(CdpNodeId(resp.node_id.inner().clone() as i64))
    }

    async fn set_attribute_breakpoint(&self, node: CdpNodeId) -> Result<()> {
        let params = SetDomBreakpointParams::new(NodeId::new(node.0 as u64), DomBreakpointType::AttributeModified);
        self.page
            .execute(params)
            .await
            .map_err(|e| Error::Protocol(e.to_string()))?;
        Ok(())
    }

    async fn enable_debugger(&self) -> Result<()> {
        self.page
            .execute(DebuggerEnableParams::default())
            .await
            .map_err(|e| Error::Protocol(e.to_string()))?;
        Ok(())
    }

    async fn enable_runtime(&self) -> Result<()> {
        self.page
            .execute(RuntimeEnableParams::default())
            .await
            .map_err(|e| Error::Protocol(e.to_string()))?;
        Ok(())
    }

    async fn debugger_paused(&self) -> Result<mpsc::UnboundedReceiver<DebuggerPause>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut events = self
            .page
            .event_listener::<EventPaused>()
            .await
            .map_err(|e| Error::Protocol(e.to_string()))?;
        tokio::spawn(async move {
            while let Some(event) = events.next().await {
                let node_id = event
                    .data
                    .as_ref()
                    .and_then(|data| serde_json::to_value(data).ok())
                    .and_then(|v| v.get("nodeId").and_then(|n| n.as_i64()))
                    .map(|n| CdpNodeId(n));
                let pause = DebuggerPause {
                    reason: format!("{:?}", event.reason),
                    call_frames: event
                        .call_frames
                        .iter()
                        .map(|f| CallFrameInfo {
                            function_name: f.function_name.clone(),
                            url: f.url.clone(),
                            line_number: f.location.line_number as u32,
                            column_number: f.location.column_number.unwrap_or(0) as u32,
                        })
                        .collect(),
                    node_id,
                };
                if tx.send(pause).is_err() {
                    break;
                }
            }
        });
        Ok(rx)
    }

    async fn resume(&self) -> Result<()> {
        self.page
            .execute(ResumeParams::default())
            .await
            .map_err(|e| Error::Protocol(e.to_string()))?;
        Ok(())
    }

    async fn get_attributes(&self, node: CdpNodeId) -> Result<Vec<(String, String)>> {
        let params = GetAttributesParams::new(NodeId::new(node.0 as u64));
        let resp = self
            .page
            .execute(params)
            .await
            .map_err(|e| Error::Protocol(e.to_string()))?;
        Ok(resp
            .attributes
            .chunks_exact(2)
            .map(|pair| (pair[0].clone(), pair[1].clone()))
            .collect())
    }

    async fn console_api_called(&self) -> Result<mpsc::UnboundedReceiver<ConsoleApiCall>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut events = self
            .page
            .event_listener::<EventConsoleApiCalled>()
            .await
            .map_err(|e| Error::Protocol(e.to_string()))?;
        tokio::spawn(async move {
            while let Some(event) = events.next().await {
                let kind = console_kind(&format!("{:?}", event.r#type));
                let args = event
                    .args
                    .iter()
                    .map(|arg| {
                        let value = arg.value.clone().unwrap_or(Json::Null);
                        JsValue::from_remote(
                            &value,
                            arg.object_id.as_ref().map(|id| id.inner().as_str()),
                            arg.class_name.as_deref(),
                        )
                    })
                    .collect();
                let previews = event
                    .args
                    .iter()
                    .filter_map(|arg| arg.preview.as_ref())
                    .map(|p| serde_json::to_value(p).unwrap_or(Json::Null))
                    .collect();
                let call = ConsoleApiCall {
                    kind,
                    args,
                    previews,
                    stack: event.stack_trace.as_ref().map(|st| {
                        st.call_frames
                            .iter()
                            .map(|f| CallFrameInfo {
                                function_name: f.function_name.clone(),
                                url: f.url.clone(),
                                line_number: f.line_number as u32,
                                column_number: f.column_number as u32,
                            })
                            .collect()
                    }),
                };
                if tx.send(call).is_err() {
                    break;
                }
            }
        });
        Ok(rx)
    }

    async fn call_function_on(&self, object_id: &str, function_declaration: &str) -> Result<Json> {
        let params = CallFunctionOnParams::builder()
            .object_id(RemoteObjectId::new(object_id.to_string()))
            .function_declaration(function_declaration.to_string())
            .return_by_value(true)
            .build()
            .map_err(|e| Error::InvalidArgument(e))?;
        let resp = self
            .page
            .execute(params)
            .await
            .map_err(|e| Error::Protocol(e.to_string()))?;
        Ok(resp.result.value.clone().unwrap_or(Json::Null))
    }

    async fn load_network_resource(&self, url: &str) -> Result<Vec<u8>> {
        let params = LoadNetworkResourceParams::builder()
            .url(url.to_string())
            .build()
            .map_err(|e| Error::InvalidArgument(e))?;
        let resp = self
            .page
            .execute(params)
            .await
            .map_err(|e| Error::Protocol(e.to_string()))?;
        let Some(stream) = resp.resource.stream.clone() else {
            return Err(Error::Protocol(format!("no stream for resource {url}")));
        };
        let mut bytes = Vec::new();
        loop {
            let chunk = self
                .page
                .execute(IoReadParams::builder().handle(stream.clone()).build())
                .await
                .map_err(|e| Error::Protocol(e.to_string()))?;
            if chunk.base64_encoded.unwrap_or(false) {
                use base64::Engine;
                bytes.extend(
                    base64::engine::general_purpose::STANDARD
                        .decode(&chunk.data)
                        .unwrap_or_default(),
                );
            } else {
                bytes.extend(chunk.data.as_bytes());
            }
            if chunk.eof {
                break;
            }
        }
        let _ = self
            .page
            .execute(IoCloseParams::builder().handle(stream).build())
            .await;
        Ok(bytes)
    }
}

fn console_kind(raw: &str) -> leakwatch_protocol::ConsoleMessageKind {
    use leakwatch_protocol::ConsoleMessageKind::*;
    match raw.to_ascii_lowercase().as_str() {
        s if s.contains("error") => Error,
        s if s.contains("warn") => Warning,
        s if s.contains("debug") => Debug,
        s if s.contains("info") => Info,
        s if s.contains("trace") => Trace,
        _ => Log,
    }
}
