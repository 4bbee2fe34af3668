//! Configuration structs for a leakwatch crawl.
//!
//! These are designed for deserialization from TOML (see
//! `leakwatch-cli::config`) as well as programmatic construction via the
//! builder.

use serde::{Deserialize, Serialize};

/// `skipExternal` - whether following links/frames off the landing page's
/// registrable domain is allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkipExternal {
    Frames,
    Pages,
    #[serde(rename = "false")]
    Off,
}

impl Default for SkipExternal {
    fn default() -> Self {
        SkipExternal::Off
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StopEarly {
    FirstPageWithForm,
    #[serde(rename = "false")]
    Off,
}

impl Default for StopEarly {
    fn default() -> Self {
        StopEarly::Off
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UseSourceMaps {
    True,
    False,
    Aggressive,
}

impl Default for UseSourceMaps {
    fn default() -> Self {
        UseSourceMaps::False
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScreenshotTrigger {
    Loaded,
    Filled,
    Submitted,
    LinkClicked,
    InteractChainExecuted,
    NewPage,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeoutMsOptions {
    #[serde(default = "default_reload_timeout")]
    pub reload: u64,
    #[serde(default = "default_follow_link_timeout")]
    pub follow_link: u64,
    #[serde(default = "default_submit_field_timeout")]
    pub submit_field: u64,
}

fn default_reload_timeout() -> u64 {
    30_000
}
fn default_follow_link_timeout() -> u64 {
    15_000
}
fn default_submit_field_timeout() -> u64 {
    15_000
}

impl TimeoutMsOptions {
    pub fn new() -> Self {
        Self {
            reload: default_reload_timeout(),
            follow_link: default_follow_link_timeout(),
            submit_field: default_submit_field_timeout(),
        }
    }
}

/// Fill-specific keystroke timing. `None` disables the delay entirely.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FillSleepMsOptions {
    pub click_dwell: u64,
    pub key_dwell: u64,
    pub between_keys: u64,
}

impl Default for FillSleepMsOptions {
    fn default() -> Self {
        Self {
            click_dwell: 50,
            key_dwell: 50,
            between_keys: 50,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SleepMsOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_fill: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_facebook_button_click: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_navigate: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fill: Option<FillSleepMsOptions>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FillOptions {
    pub email: String,
    #[serde(default)]
    pub append_domain_to_email: bool,
    pub password: String,
    #[serde(default)]
    pub simulate_show_password: bool,
    #[serde(default = "default_true")]
    pub submit: bool,
    #[serde(default)]
    pub add_facebook_button: bool,
    #[serde(default = "default_max_fields")]
    pub max_fields: usize,
}

fn default_true() -> bool {
    true
}
fn default_max_fields() -> usize {
    50
}

impl Default for FillOptions {
    fn default() -> Self {
        Self {
            email: "leak-detector@example.com".to_string(),
            append_domain_to_email: false,
            password: "The--P@s5w0rd".to_string(),
            simulate_show_password: false,
            submit: true,
            add_facebook_button: true,
            max_fields: default_max_fields(),
        }
    }
}

/// One pre-flight interaction chain: a list of JS expressions, each
/// returning an element to click in order, re-run whenever `cleanPage` is
/// invoked within its scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractChain {
    pub steps: Vec<InteractStep>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum InteractStep {
    /// A JS expression evaluated in the page's main frame, expected to
    /// return the element (or selector) to click.
    Expression { source: String },
    /// One step of a recorded browser-devtools "user flow", with navigation
    /// steps already stripped by the loader.
    RecordedClick { selector: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenshotOptions {
    pub triggers: Vec<ScreenshotTrigger>,
    /// Directory screenshots are written to; `None` means the host callback
    /// target is used instead (out of scope for the core engine itself).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_dir: Option<String>,
}

impl Default for ScreenshotOptions {
    fn default() -> Self {
        Self {
            triggers: vec![],
            target_dir: None,
        }
    }
}

/// Root configuration for one crawl.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoreOptions {
    #[serde(default)]
    pub timeout_ms: TimeoutMsOptions,
    #[serde(default)]
    pub sleep_ms: SleepMsOptions,
    #[serde(default)]
    pub skip_external: SkipExternal,
    #[serde(default = "default_max_links")]
    pub max_links: usize,
    #[serde(default)]
    pub stop_early: StopEarly,
    pub fill: FillOptions,
    #[serde(default)]
    pub immediately_inject_dom_leak_detection: bool,
    #[serde(default)]
    pub disable_closed_shadow_dom: bool,
    #[serde(default)]
    pub interact_chains: Vec<InteractChain>,
    #[serde(default)]
    pub screenshot: ScreenshotOptions,
    #[serde(default)]
    pub use_source_maps: UseSourceMaps,
    #[serde(default)]
    pub debug: bool,
}

fn default_max_links() -> usize {
    5
}

impl Default for CoreOptions {
    fn default() -> Self {
        Self {
            timeout_ms: TimeoutMsOptions::new(),
            sleep_ms: SleepMsOptions::default(),
            skip_external: SkipExternal::default(),
            max_links: default_max_links(),
            stop_early: StopEarly::default(),
            fill: FillOptions::default(),
            immediately_inject_dom_leak_detection: false,
            disable_closed_shadow_dom: false,
            interact_chains: vec![],
            screenshot: ScreenshotOptions::default(),
            use_source_maps: UseSourceMaps::default(),
            debug: false,
        }
    }
}

impl CoreOptions {
    pub fn builder() -> CoreOptionsBuilder {
        CoreOptionsBuilder::default()
    }
}

/// Fluent builder for [`CoreOptions`].
#[derive(Debug, Clone, Default)]
pub struct CoreOptionsBuilder {
    inner: CoreOptionsPartial,
}

#[derive(Debug, Clone, Default)]
struct CoreOptionsPartial {
    max_links: Option<usize>,
    skip_external: Option<SkipExternal>,
    stop_early: Option<StopEarly>,
    fill: Option<FillOptions>,
    debug: Option<bool>,
    disable_closed_shadow_dom: Option<bool>,
    immediately_inject_dom_leak_detection: Option<bool>,
}

impl CoreOptionsBuilder {
    pub fn fill(mut self, fill: FillOptions) -> Self {
        self.inner.fill = Some(fill);
        self
    }

    pub fn max_links(mut self, max_links: usize) -> Self {
        self.inner.max_links = Some(max_links);
        self
    }

    pub fn skip_external(mut self, skip_external: SkipExternal) -> Self {
        self.inner.skip_external = Some(skip_external);
        self
    }

    pub fn stop_early(mut self, stop_early: StopEarly) -> Self {
        self.inner.stop_early = Some(stop_early);
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.inner.debug = Some(debug);
        self
    }

    pub fn disable_closed_shadow_dom(mut self, disable: bool) -> Self {
        self.inner.disable_closed_shadow_dom = Some(disable);
        self
    }

    pub fn immediately_inject_dom_leak_detection(mut self, immediate: bool) -> Self {
        self.inner.immediately_inject_dom_leak_detection = Some(immediate);
        self
    }

    pub fn build(self) -> CoreOptions {
        let defaults = CoreOptions::default();
        CoreOptions {
            fill: self.inner.fill.unwrap_or(defaults.fill),
            max_links: self.inner.max_links.unwrap_or(defaults.max_links),
            skip_external: self.inner.skip_external.unwrap_or(defaults.skip_external),
            stop_early: self.inner.stop_early.unwrap_or(defaults.stop_early),
            debug: self.inner.debug.unwrap_or(defaults.debug),
            disable_closed_shadow_dom: self
                .inner
                .disable_closed_shadow_dom
                .unwrap_or(defaults.disable_closed_shadow_dom),
            immediately_inject_dom_leak_detection: self
                .inner
                .immediately_inject_dom_leak_detection
                .unwrap_or(defaults.immediately_inject_dom_leak_detection),
            ..defaults
        }
    }
}
