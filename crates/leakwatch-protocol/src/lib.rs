//! Wire types for the leakwatch credential-leak auditor.
//!
//! This crate holds the data that crosses the boundary between the core
//! engine (`leakwatch-core`) and its consumers: the configuration a crawl is
//! run with, and the result structure a crawl produces. Types here are
//! plain data, with no browser-driving behavior.

pub mod options;
pub mod result;
pub mod types;

pub use options::{
    CoreOptions, CoreOptionsBuilder, FillOptions, InteractChain, InteractStep, ScreenshotOptions,
    ScreenshotTrigger, SkipExternal, SleepMsOptions, StopEarly, TimeoutMsOptions, UseSourceMaps,
};
pub use result::CrawlResult;
pub use types::{
    ConsoleLeak, ConsoleMessageKind, DomPasswordLeak, ElementIdentifier, Event, EventKind,
    FieldAttributes, FieldType, ErrorRecord, ErrorLevel, LinkAttributes, TargetKind,
    VisitedTarget,
};
