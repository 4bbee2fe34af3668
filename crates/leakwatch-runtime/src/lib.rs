//! Browser driver facade for leakwatch.
//!
//! This crate is the swappable seam: the core engine in `leakwatch-core` is
//! written only against [`BrowserDriver`] and [`CdpSession`];
//! [`chromium::ChromiumDriver`] is this workspace's one concrete binding,
//! built on `chromiumoxide`.

pub mod chromium;
pub mod driver;
pub mod error;
pub mod handle;

pub use chromium::ChromiumDriver;
pub use driver::{
    BrowserDriver, CallFrameInfo, CdpNodeId, CdpSession, ConsoleApiCall, DebuggerPause, FrameId,
    HostFn, PageId, TargetInfo,
};
pub use error::{Error, Result};
pub use handle::{HandlePayload, JsValue, OpaqueHandle};
