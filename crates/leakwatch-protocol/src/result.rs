//! The result structure returned by a completed crawl.

use serde::{Deserialize, Serialize};

use crate::types::{
    ConsoleLeak, DomPasswordLeak, ErrorRecord, Event, FieldAttributes, LinkAttributes,
    VisitedTarget,
};

/// The `getData()` result structure returned by a completed crawl.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlResult {
    pub visited_targets: Vec<VisitedTarget>,
    pub fields: Vec<FieldAttributes>,
    /// `None` when the link finder never ran (e.g. `maxLinks: 0`).
    pub links: Option<Vec<LinkAttributes>>,
    pub dom_leaks: Vec<DomPasswordLeak>,
    pub console_leaks: Vec<ConsoleLeak>,
    pub events: Vec<Event>,
    pub errors: Vec<ErrorRecord>,
}
