//! The two leak-detection channels: DOM attribute mutation and console
//! argument scanning, plus the dedup pass their findings go through before
//! landing in [`leakwatch_protocol::CrawlResult`].

pub mod console;
pub mod dedup;
pub mod dom;

pub use dedup::DomLeakDedup;
pub use dom::{password_variants, DomBreakpointWatcher};
