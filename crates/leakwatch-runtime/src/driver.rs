//! The Browser Driver Facade: the capability surface the core engine
//! requires from whatever browser automation library backs it.
//! `leakwatch-core` is written entirely against these traits; the
//! `chromiumoxide`-backed implementation in [`crate::chromium`] is one
//! possible binding, swappable for another platform's automation library
//! without touching the core.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value as Json;

use crate::error::Result;
use crate::handle::JsValue;

/// Opaque, copyable identifier for a page (top-level browsing context).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageId(pub u64);

/// Opaque, copyable identifier for a frame (browsing context inside a page).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(pub u64);

/// A new browsing context observed by the driver: a page, worker, or other
/// target kind, passed to `Orchestrator::add_target`.
#[derive(Debug, Clone)]
pub struct TargetInfo {
    pub page: PageId,
    pub url: String,
    pub kind: leakwatch_protocol::TargetKind,
}

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A host function exposed into the page's global scope via `expose`.
/// Invoked with the JSON arguments the page script passed; its result (if
/// any) is serialized back as the call's return value.
pub type HostFn = Arc<dyn Fn(Json) -> BoxFuture<'static, Result<Json>> + Send + Sync>;

/// The capability surface the core engine drives a browser through.
///
/// All methods may suspend: every call here is a CDP/driver round trip and
/// should be assumed to race against navigations and page closures.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// Evaluates `expression` in `frame`'s execution context, discarding any
    /// return value. `args` are JSON-encoded and spliced into the call.
    async fn evaluate(&self, frame: FrameId, expression: &str, args: &[Json]) -> Result<()>;

    /// Evaluates `expression` in `frame` and materializes the result,
    /// keeping elements/functions/etc. opaque (see [`crate::handle`]).
    async fn evaluate_value(&self, frame: FrameId, expression: &str, args: &[Json]) -> Result<JsValue>;

    /// Installs `name` as a globally-callable function in `page`, forwarding
    /// calls to `host_fn`. Idempotent: re-exposing the same name on the same
    /// page is a no-op.
    async fn expose(&self, page: PageId, name: &str, host_fn: HostFn) -> Result<()>;

    /// All pages currently open in the browser context.
    async fn pages(&self) -> Result<Vec<PageId>>;

    /// All frames (including the main frame) belonging to `page`.
    async fn frames(&self, page: PageId) -> Result<Vec<FrameId>>;

    /// The parent of `frame`, or `None` if it is a page's main frame.
    async fn parent(&self, frame: FrameId) -> Result<Option<FrameId>>;

    /// The frame's current URL.
    async fn url(&self, frame: FrameId) -> Result<String>;

    /// Whether `frame` has been detached from the page tree.
    async fn detached(&self, frame: FrameId) -> Result<bool>;

    /// Shadow-piercing descendant query: walks a `TreeWalker` rooted at
    /// `frame`'s document and recurses into every `shadowRoot`, returning
    /// opaque element handles for every match of `selector`. The
    /// `shadowRoot` getter and `matches` function are captured once and
    /// reused rather than re-read per call, to dodge prototype tampering.
    async fn query(&self, frame: FrameId, selector: &str) -> Result<Vec<JsValue>>;

    /// Opens a CDP session scoped to `page`, for the low-level DOM/Debugger/
    /// Runtime/Network/IO access the DOM and console leak observers need.
    async fn new_cdp_session(&self, page: PageId) -> Result<Arc<dyn CdpSession>>;

    /// Navigates `frame` to `about:blank` then `url`... actually navigates
    /// directly to `url`; kept distinct from `evaluate`-based navigation so
    /// the facade can wait on the driver's own load-lifecycle events.
    async fn goto(&self, frame: FrameId, url: &str) -> Result<()>;

    /// Brings `page` to the foreground (used before humanized interaction).
    async fn bring_to_front(&self, page: PageId) -> Result<()>;

    /// Captures a full-page PNG screenshot of `page`.
    async fn screenshot(&self, page: PageId) -> Result<Vec<u8>>;

    /// Closes `page`.
    async fn close_page(&self, page: PageId) -> Result<()>;
}

/// A CDP session scoped to a single page. Mirrors the subset of the
/// protocol the leak observers need: `DOM.*`, `DOMDebugger.setDOMBreakpoint`,
/// `Debugger.{enable, paused, resume}`, `Runtime.{enable, consoleAPICalled,
/// callFunctionOn}`, `Network.loadNetworkResource`, `IO.{read,close}`.
#[async_trait]
pub trait CdpSession: Send + Sync {
    /// `DOM.requestNode` for the element behind `handle`, returning a CDP
    /// `NodeId` stable for the lifetime of the observation: requested once
    /// and retained, since a later `DOM.getDocument` would invalidate a
    /// freshly requested id.
    async fn request_node(&self, handle: &JsValue) -> Result<CdpNodeId>;

    /// `DOMDebugger.setDOMBreakpoint` with type `attribute-modified`.
    async fn set_attribute_breakpoint(&self, node: CdpNodeId) -> Result<()>;

    /// `Debugger.enable`, idempotent.
    async fn enable_debugger(&self) -> Result<()>;

    /// `Runtime.enable`, idempotent.
    async fn enable_runtime(&self) -> Result<()>;

    /// Subscribes to `Debugger.paused`, returning a stream of pause events
    /// (filtered to `reason == "DOM"` / `"attribute-modified"` by the
    /// caller; the session forwards every pause so ordinary breakpoints set
    /// elsewhere are not silently swallowed).
    async fn debugger_paused(&self) -> Result<tokio::sync::mpsc::UnboundedReceiver<DebuggerPause>>;

    /// `Debugger.resume`.
    async fn resume(&self) -> Result<()>;

    /// Current attribute map for `node`, via `DOM.getAttributes`.
    async fn get_attributes(&self, node: CdpNodeId) -> Result<Vec<(String, String)>>;

    /// Subscribes to `Runtime.consoleAPICalled`.
    async fn console_api_called(&self) -> Result<tokio::sync::mpsc::UnboundedReceiver<ConsoleApiCall>>;

    /// `Runtime.callFunctionOn`, used to synthesize a stringification of a
    /// console argument when its preview didn't contain enough information.
    async fn call_function_on(&self, object_id: &str, function_declaration: &str) -> Result<Json>;

    /// Fetches a script's source text via `Network.loadNetworkResource` +
    /// `IO.read`/`IO.close`, used by the source-map resolver.
    async fn load_network_resource(&self, url: &str) -> Result<Vec<u8>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CdpNodeId(pub i64);

#[derive(Debug, Clone)]
pub struct DebuggerPause {
    pub reason: String,
    pub call_frames: Vec<CallFrameInfo>,
    /// The node the DOM breakpoint fired on, when `reason` is a DOM variant;
    /// CDP reports this via the pause event's auxiliary data rather than as
    /// a first-class field.
    pub node_id: Option<CdpNodeId>,
}

#[derive(Debug, Clone)]
pub struct CallFrameInfo {
    pub function_name: String,
    pub url: String,
    pub line_number: u32,
    pub column_number: u32,
}

#[derive(Debug, Clone)]
pub struct ConsoleApiCall {
    pub kind: leakwatch_protocol::ConsoleMessageKind,
    pub args: Vec<JsValue>,
    pub previews: Vec<Json>,
    pub stack: Option<Vec<CallFrameInfo>>,
}
