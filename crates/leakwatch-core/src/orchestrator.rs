//! The Orchestrator: the *discover → fill → submit → reload → continue*
//! state machine, page cleanup scoping, budget enforcement, and result
//! aggregation.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use leakwatch_protocol::{
    CoreOptions, CrawlResult, Event, EventKind, FieldAttributes, FieldType, InteractStep,
    LinkAttributes, ScreenshotTrigger, SkipExternal, TargetKind, VisitedTarget,
};
use leakwatch_runtime::{BrowserDriver, FrameId, PageId};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::domain::registrable_domain;
use crate::error::{CoreError, Result};
use crate::leak::{self, DomLeakDedup};
use crate::navigation::{self, NavigationWinner};
use crate::registry::FrameRegistry;
use crate::screenshot::{self, ScreenshotSequencer};
use crate::sourcemap::SourceMapCache;
use crate::{discovery, fill, links, PAGE_SCRIPT_JS};

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Mapping from encoded `ElementIdentifier` to `FieldAttributes`, preserving
/// discovery order; re-discovering a known key updates it in place rather
/// than reordering or duplicating it.
#[derive(Default)]
struct FieldsMap {
    order: Vec<String>,
    by_id: HashMap<String, FieldAttributes>,
}

impl FieldsMap {
    fn upsert_if_absent(&mut self, field: FieldAttributes) {
        let key = field.identifier.encode();
        if !self.by_id.contains_key(&key) {
            self.order.push(key.clone());
            self.by_id.insert(key, field);
        }
    }

    fn get(&self, key: &str) -> Option<&FieldAttributes> {
        self.by_id.get(key)
    }

    fn get_mut(&mut self, key: &str) -> Option<&mut FieldAttributes> {
        self.by_id.get_mut(key)
    }

    fn ordered(&self) -> Vec<FieldAttributes> {
        self.order
            .iter()
            .filter_map(|k| self.by_id.get(k).cloned())
            .collect()
    }
}

#[derive(Default)]
struct SessionState {
    fields: FieldsMap,
    processed: HashSet<String>,
    links: Option<Vec<LinkAttributes>>,
    events: Vec<Event>,
    errors: Vec<leakwatch_protocol::ErrorRecord>,
    visited_targets: Vec<VisitedTarget>,
    dom_leaks: DomLeakDedup,
    console_leaks: Vec<leakwatch_protocol::ConsoleLeak>,
    links_followed: usize,
    any_form_page_seen: bool,
}

/// The root context for auditing one URL: owns every collection the crawl
/// produces and drives the browser through the full discovery/fill/submit
/// cycle.
pub struct CrawlSession {
    driver: Arc<dyn BrowserDriver>,
    options: CoreOptions,
    registry: FrameRegistry,
    landing_origin: Option<String>,
    sourcemaps: Arc<SourceMapCache>,
    state: Mutex<SessionState>,
    dom_tx: mpsc::UnboundedSender<leakwatch_protocol::DomPasswordLeak>,
    dom_rx: Mutex<mpsc::UnboundedReceiver<leakwatch_protocol::DomPasswordLeak>>,
    console_tx: mpsc::UnboundedSender<leakwatch_protocol::ConsoleLeak>,
    console_rx: Mutex<mpsc::UnboundedReceiver<leakwatch_protocol::ConsoleLeak>>,
    console_watchers_started: Mutex<HashSet<PageId>>,
    dom_breakpoint_watchers: Mutex<HashMap<PageId, Arc<leak::DomBreakpointWatcher>>>,
    screenshots: ScreenshotSequencer,
    page_load_ms: Option<u64>,
}

impl CrawlSession {
    /// Creates a session for auditing `landing_url`. Fails only if the
    /// page-script injection bundle is missing — the one fatal
    /// initialization error the core surfaces (everything else is
    /// downgraded to a recorded, non-fatal error).
    ///
    /// `landing_page_load_ms`, when the harness measured how long the
    /// landing page itself took to load, feeds `navigation::effective_timeout_ms`
    /// so later navigation waits scale with this site's observed load time
    /// rather than relying solely on the configured minimum.
    pub fn new(
        driver: Arc<dyn BrowserDriver>,
        options: CoreOptions,
        landing_url: &str,
        landing_page_load_ms: Option<u64>,
    ) -> Result<Self> {
        if PAGE_SCRIPT_JS.trim().is_empty() {
            return Err(CoreError::Fatal("missing page-script injection bundle".into()));
        }
        let (dom_tx, dom_rx) = mpsc::unbounded_channel();
        let (console_tx, console_rx) = mpsc::unbounded_channel();
        Ok(Self {
            driver,
            landing_origin: registrable_domain(landing_url),
            options,
            registry: FrameRegistry::new(),
            sourcemaps: Arc::new(SourceMapCache::new()),
            state: Mutex::new(SessionState::default()),
            dom_tx,
            dom_rx: Mutex::new(dom_rx),
            console_tx,
            console_rx: Mutex::new(console_rx),
            console_watchers_started: Mutex::new(HashSet::new()),
            dom_breakpoint_watchers: Mutex::new(HashMap::new()),
            screenshots: ScreenshotSequencer::new(),
            page_load_ms: landing_page_load_ms,
        })
    }

    fn effective_timeout_ms(&self, configured_min_ms: u64) -> u64 {
        navigation::effective_timeout_ms(configured_min_ms, self.page_load_ms)
    }

    /// Stable identifier for this collector, reported upstream.
    pub fn id(&self) -> &'static str {
        "leakwatch"
    }

    /// Records a newly observed browsing context. Called by the harness for
    /// every target (page, worker, other) it sees open.
    pub fn add_target(&self, info: leakwatch_runtime::TargetInfo) {
        self.registry.observe_page(info.page);
        let mut state = self.state.lock();
        state.visited_targets.push(VisitedTarget {
            url: info.url,
            kind: info.kind,
            time_ms: now_ms(),
        });
    }

    fn emit(&self, event: Event) {
        self.state.lock().events.push(event);
    }

    fn drain_leak_channels(&self) {
        let mut dom_rx = self.dom_rx.lock();
        let mut state = self.state.lock();
        while let Ok(leak) = dom_rx.try_recv() {
            state.dom_leaks.offer(leak);
        }
        drop(dom_rx);
        let mut console_rx = self.console_rx.lock();
        while let Ok(leak) = console_rx.try_recv() {
            state.console_leaks.push(leak);
        }
    }

    async fn sleep_opt(&self, ms: Option<u64>) {
        if let Some(ms) = ms {
            if ms > 0 {
                tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
            }
        }
    }

    async fn ensure_frame_injected(&self, frame: FrameId) -> Result<()> {
        self.registry.observe_frame(frame);
        if self.registry.mark_injected(frame) {
            return Ok(());
        }
        self.driver.evaluate(frame, PAGE_SCRIPT_JS, &[]).await?;
        if self.options.disable_closed_shadow_dom {
            self.driver
                .evaluate(frame, "() => window.__leakwatch_v1__.coerceOpenShadow()", &[])
                .await?;
        }
        Ok(())
    }

    async fn inject_all_frames(&self, page: PageId) -> Result<()> {
        for frame in self.driver.frames(page).await? {
            self.ensure_frame_injected(frame).await?;
        }
        Ok(())
    }

    async fn build_frame_stack_resolver(
        &self,
        page: PageId,
    ) -> Result<Arc<dyn Fn(&str) -> Vec<String> + Send + Sync>> {
        let mut map = HashMap::new();
        for frame in self.driver.frames(page).await? {
            if let Ok(url) = self.driver.url(frame).await {
                let stack = discovery::frame_stack(&*self.driver, frame)
                    .await
                    .unwrap_or_else(|_| vec![url.clone()]);
                map.insert(url, stack);
            }
        }
        Ok(Arc::new(move |url: &str| {
            map.get(url).cloned().unwrap_or_else(|| vec![url.to_string()])
        }))
    }

    /// Runs one step of a pre-flight interact chain against `frame`: an
    /// `Expression` step is evaluated for the selector it resolves to, a
    /// `RecordedClick` step already names its selector directly. Either way
    /// the resolved selector is clicked through the same page-script click
    /// primitive `fill::fill_field` drives its own clicks through.
    async fn run_interact_step(&self, frame: FrameId, step: &InteractStep) -> Result<()> {
        let selector = match step {
            InteractStep::Expression { source } => {
                match self.driver.evaluate_value(frame, source, &[]).await?.as_str() {
                    Some(s) => s.to_string(),
                    None => return Ok(()),
                }
            }
            InteractStep::RecordedClick { selector } => selector.clone(),
        };
        let chain = vec![selector];
        let chain_json = serde_json::to_value(&chain)?;
        self.driver
            .evaluate(frame, "(chain) => window.__leakwatch_v1__.mouseClick(chain)", &[chain_json])
            .await
    }

    /// Runs the interact chain at `chain_index` against `page`'s main frame,
    /// step by step, emitting an `Interact` event and the
    /// `InteractChainExecuted` screenshot trigger once the whole chain has
    /// run. Step failures are recorded and abort the rest of that chain
    /// (later steps usually assume earlier ones succeeded) but never fail
    /// page processing outright.
    async fn run_interact_chain(&self, page: PageId, main_frame: FrameId, chain_index: usize) {
        let Some(chain) = self.options.interact_chains.get(chain_index).cloned() else {
            return;
        };
        for step in &chain.steps {
            if let Err(e) = self.run_interact_step(main_frame, step).await {
                self.record_error(leakwatch_protocol::ErrorLevel::Warn, format!("interact chain step failed: {e}"));
                return;
            }
            self.sleep_opt(self.options.sleep_ms.post_navigate).await;
        }
        self.emit(Event::new(EventKind::Interact, now_ms()));
        self.maybe_screenshot(page, ScreenshotTrigger::InteractChainExecuted).await;
    }

    /// Runs every configured interact chain once, in order, against `page`
    /// before normal field discovery — each chain stays "active" under a
    /// clean-page scope afterward, so a later `clean_page` reload knows to
    /// re-run it via `rerun_active_interact_chain`.
    async fn run_interact_chains(&self, page: PageId, main_frame: FrameId) {
        for (index, _) in self.options.interact_chains.iter().enumerate() {
            self.run_interact_chain(page, main_frame, index).await;
            self.registry.push_clean_scope(page, index);
        }
    }

    /// Re-runs whichever interact chain is active in `page`'s top clean-page
    /// scope, if any — called right after a `clean_page` reload, since that
    /// reload throws away whatever UI state the chain produced.
    async fn rerun_active_interact_chain(&self, page: PageId, main_frame: FrameId) {
        if let Some(chain_index) = self.registry.active_chain_scope(page) {
            self.run_interact_chain(page, main_frame, chain_index).await;
        }
    }

    /// Installs the in-page MutationObserver leak detector on `page`, once.
    async fn ensure_dom_leak_detector(&self, page: PageId) -> Result<()> {
        if !self.registry.should_install_dom_leak_detector(page) {
            return Ok(());
        }
        let variants = leak::password_variants(&self.options.fill.password);
        let resolver = self.build_frame_stack_resolver(page).await?;
        leak::dom::install_mutation_observer(
            &self.driver,
            page,
            "__leakwatch_dom_report__",
            variants,
            resolver,
            self.dom_tx.clone(),
        )
        .await
    }

    /// Returns `page`'s `DomBreakpointWatcher`, spawning its pause-handling
    /// loop the first time it's asked for. Later callers share the same
    /// instance so newly discovered password fields keep arming breakpoints
    /// on the watcher the earlier ones already started driving.
    async fn dom_breakpoint_watcher(&self, page: PageId) -> Result<Arc<leak::DomBreakpointWatcher>> {
        if let Some(watcher) = self.dom_breakpoint_watchers.lock().get(&page).cloned() {
            return Ok(watcher);
        }
        let session = self.driver.new_cdp_session(page).await?;
        let watcher = Arc::new(leak::DomBreakpointWatcher::new(session));
        self.dom_breakpoint_watchers.lock().insert(page, watcher.clone());

        let spawned = watcher.clone();
        let mode = self.options.use_source_maps;
        let sourcemaps = self.sourcemaps.clone();
        let tx = self.dom_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = spawned.run(mode, sourcemaps, tx).await {
                tracing::warn!(error = %e, "dom breakpoint watcher exited");
            }
        });
        Ok(watcher)
    }

    /// Arms a DOM breakpoint on `field`, resolving a live element handle
    /// through the driver's shadow-piercing query so the watcher's stack
    /// resolution has something to attach to.
    async fn watch_dom_breakpoint(&self, page: PageId, frame: FrameId, field: &FieldAttributes) -> Result<()> {
        let Some(selector) = field.identifier.selector_chain.last() else {
            return Ok(());
        };
        let watcher = self.dom_breakpoint_watcher(page).await?;
        let handles = self.driver.query(frame, selector).await?;
        let Some(handle) = handles.into_iter().next() else {
            return Ok(());
        };
        watcher.watch(&handle, field.identifier.clone()).await
    }

    /// Spawns the console-leak watcher for `page`'s CDP session, once.
    async fn ensure_console_watcher(&self, page: PageId) -> Result<()> {
        {
            let mut started = self.console_watchers_started.lock();
            if started.contains(&page) {
                return Ok(());
            }
            started.insert(page);
        }
        let session = self.driver.new_cdp_session(page).await?;
        let variants = leak::password_variants(&self.options.fill.password);
        let mode = self.options.use_source_maps;
        let sourcemaps = self.sourcemaps.clone();
        let tx = self.console_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = leak::console::watch(session, mode, sourcemaps, variants, tx).await {
                tracing::warn!(error = %e, "console leak watcher exited");
            }
        });
        Ok(())
    }

    fn value_for(&self, field: &FieldAttributes) -> String {
        match field.field_type {
            FieldType::Email => {
                let host = self
                    .landing_origin
                    .clone()
                    .unwrap_or_default();
                fill::email_value(&self.options, &host)
            }
            FieldType::Password => self.options.fill.password.clone(),
        }
    }

    fn budget_exhausted(&self) -> bool {
        let state = self.state.lock();
        state.processed.len() >= self.options.fill.max_fields
    }

    fn stop_early_satisfied(&self) -> bool {
        matches!(self.options.stop_early, leakwatch_protocol::StopEarly::FirstPageWithForm)
            && self.state.lock().any_form_page_seen
    }

    /// Groups field keys by owning form, real forms first (password-bearing
    /// forms before plain ones, each group otherwise in discovery order),
    /// the synthetic "no form" group always last.
    fn group_fields(&self, keys: &[String]) -> Vec<Vec<String>> {
        let state = self.state.lock();
        let mut form_order: Vec<String> = Vec::new();
        let mut forms: HashMap<String, Vec<String>> = HashMap::new();
        let mut no_form: Vec<String> = Vec::new();

        for key in keys {
            let Some(field) = state.fields.get(key) else { continue };
            match &field.owning_form {
                Some(chain) => {
                    let form_key = chain.join(">");
                    if !forms.contains_key(&form_key) {
                        form_order.push(form_key.clone());
                    }
                    forms.entry(form_key).or_default().push(key.clone());
                }
                None => no_form.push(key.clone()),
            }
        }

        let has_password = |group: &[String]| {
            group
                .iter()
                .any(|k| state.fields.get(k).map(|f| f.field_type == FieldType::Password).unwrap_or(false))
        };
        form_order.sort_by_key(|k| if has_password(&forms[k]) { 0 } else { 1 });

        let mut groups: Vec<Vec<String>> = form_order.into_iter().map(|k| forms.remove(&k).unwrap()).collect();
        if !no_form.is_empty() {
            groups.push(no_form);
        }
        groups
    }

    /// Discovers and processes one pass of `frame`'s fields: fills every
    /// not-yet-filled field group by group, optionally probes the Facebook
    /// button, and submits the first not-yet-processed field of the first
    /// group with outstanding work. Returns the frame's full field snapshot,
    /// whether the frame has no more actionable work, and whether a
    /// submission actually went through this call.
    async fn process_fields(
        &self,
        page: PageId,
        main_frame: FrameId,
        frame: FrameId,
    ) -> Result<(Vec<FieldAttributes>, bool, bool)> {
        let discovered = match discovery::discover_fields(&*self.driver, frame).await {
            Ok(d) => d,
            Err(e) => {
                self.record_error(leakwatch_protocol::ErrorLevel::Warn, format!("field discovery failed: {e}"));
                return Ok((vec![], true, false));
            }
        };
        if discovered.is_empty() {
            return Ok((vec![], true, false));
        }

        let keys: Vec<String> = discovered.iter().map(|f| f.identifier.encode()).collect();
        {
            let mut state = self.state.lock();
            for field in discovered {
                state.fields.upsert_if_absent(field);
            }
            state.any_form_page_seen = true;
        }

        let groups = self.group_fields(&keys);
        let mut submitted_this_call = false;

        'groups: for group in &groups {
            for key in group {
                let (already_filled, field) = {
                    let state = self.state.lock();
                    let f = state.fields.get(key).cloned();
                    (f.as_ref().map(|f| f.filled).unwrap_or(true), f)
                };
                let Some(field) = field else { continue };
                if already_filled {
                    continue;
                }
                if field.field_type == FieldType::Password {
                    if !self.options.immediately_inject_dom_leak_detection {
                        if let Err(e) = self.ensure_dom_leak_detector(page).await {
                            self.record_error(leakwatch_protocol::ErrorLevel::Warn, format!("dom leak detector install failed: {e}"));
                        }
                    }
                    if let Err(e) = self.watch_dom_breakpoint(page, frame, &field).await {
                        self.record_error(leakwatch_protocol::ErrorLevel::Warn, format!("dom breakpoint arm failed: {e}"));
                    }
                }
                let value = self.value_for(&field);
                if let Err(e) = fill::fill_field(
                    &*self.driver,
                    page,
                    frame,
                    field.field_type,
                    &field.identifier.selector_chain,
                    &value,
                    &self.options,
                )
                .await
                {
                    self.record_error(leakwatch_protocol::ErrorLevel::Warn, format!("fill failed: {e}"));
                    continue;
                }
                {
                    let mut state = self.state.lock();
                    if let Some(f) = state.fields.get_mut(key) {
                        f.filled = true;
                    }
                }
                self.emit(Event::new(EventKind::Fill, now_ms()).with_identifier(field.identifier.clone()));
                self.sleep_opt(self.options.sleep_ms.post_fill).await;
            }
            self.maybe_screenshot(page, ScreenshotTrigger::Filled).await;

            let unprocessed: Vec<String> = {
                let state = self.state.lock();
                group.iter().filter(|k| !state.processed.contains(*k)).cloned().collect()
            };
            if unprocessed.is_empty() {
                continue;
            }

            if self.options.fill.add_facebook_button {
                if let Err(e) = fill::click_facebook_button(&*self.driver, frame).await {
                    self.record_error(leakwatch_protocol::ErrorLevel::Warn, format!("facebook-button probe failed: {e}"));
                } else {
                    self.emit(Event::new(EventKind::FbButton, now_ms()));
                    self.sleep_opt(self.options.sleep_ms.post_facebook_button_click).await;
                }
            }

            if !self.options.fill.submit {
                let mut state = self.state.lock();
                for key in &unprocessed {
                    state.processed.insert(key.clone());
                }
                continue;
            }

            let submit_key = unprocessed[0].clone();
            let submit_field = {
                let state = self.state.lock();
                state.fields.get(&submit_key).cloned()
            };
            let Some(submit_field) = submit_field else { break 'groups };

            if let Err(e) = fill::press_enter(&*self.driver, frame, &submit_field.identifier.selector_chain).await {
                self.record_error(leakwatch_protocol::ErrorLevel::Warn, format!("submit failed: {e}"));
                let mut state = self.state.lock();
                state.processed.insert(submit_key);
                break 'groups;
            }
            self.emit(Event::new(EventKind::Submit, now_ms()).with_identifier(submit_field.identifier.clone()));
            self.registry.set_dirty(page);

            match navigation::race_navigation(
                &*self.driver,
                frame,
                main_frame,
                page,
                self.effective_timeout_ms(self.options.timeout_ms.submit_field),
            )
            .await
            {
                Ok(_) => {
                    self.emit(Event::new(EventKind::Navigate, now_ms()));
                    self.registry.clear_injected(frame);
                    self.registry.clear_injected(main_frame);
                }
                Err(e) if e.is_timeout() => {
                    self.record_error(leakwatch_protocol::ErrorLevel::Info, "submit navigation wait timed out".into());
                }
                Err(e) => {
                    self.record_error(leakwatch_protocol::ErrorLevel::Warn, format!("submit navigation wait failed: {e}"));
                }
            }
            self.maybe_screenshot(page, ScreenshotTrigger::Submitted).await;
            let _ = fill::blur_refocus(&*self.driver, frame, &submit_field.identifier.selector_chain).await;

            {
                let mut state = self.state.lock();
                state.processed.insert(submit_key.clone());
                if let Some(f) = state.fields.get_mut(&submit_key) {
                    f.submitted = true;
                }
            }
            submitted_this_call = true;
            break 'groups;
        }

        let done = if submitted_this_call {
            false
        } else {
            let state = self.state.lock();
            keys.iter().all(|k| state.processed.contains(k))
        };
        let snapshot = { self.state.lock().fields.ordered() };
        Ok((snapshot, done, submitted_this_call))
    }

    /// Captures a screenshot if `trigger` is in `options.screenshot.triggers`,
    /// writing it under `screenshot.targetDir` (when configured) and always
    /// emitting the event on success.
    async fn maybe_screenshot(&self, page: PageId, trigger: ScreenshotTrigger) {
        if !self.options.screenshot.triggers.contains(&trigger) {
            return;
        }
        match self.driver.screenshot(page).await {
            Ok(bytes) => {
                if let Some(dir) = &self.options.screenshot.target_dir {
                    let name = self.screenshots.file_name(trigger);
                    if let Err(e) = std::fs::write(std::path::Path::new(dir).join(&name), &bytes) {
                        self.record_error(
                            leakwatch_protocol::ErrorLevel::Warn,
                            format!("failed to write screenshot {name}: {e}"),
                        );
                    }
                }
                self.emit(Event::new(EventKind::Screenshot, now_ms()).with_context(screenshot::trigger_label(trigger)));
            }
            Err(e) => {
                self.record_error(leakwatch_protocol::ErrorLevel::Warn, format!("screenshot capture failed: {e}"));
            }
        }
    }

    fn record_error(&self, level: leakwatch_protocol::ErrorLevel, message: String) {
        tracing::warn!(%message, "recording crawl error");
        self.state.lock().errors.push(leakwatch_protocol::ErrorRecord {
            time_ms: now_ms(),
            level,
            message,
            breadcrumbs: vec![],
        });
    }

    /// Runs the discover → fill → submit → reload → continue loop for one
    /// page until no submission occurs in a full pass over its frames.
    async fn process_page(&self, page: PageId, main_frame: FrameId) -> Result<()> {
        self.registry.observe_page(page);
        if self.registry.start_url(page).is_none() {
            if let Ok(url) = self.driver.url(main_frame).await {
                self.registry.set_start_url(page, url);
            }
        }
        self.inject_all_frames(page).await?;
        if let Err(e) = self.ensure_console_watcher(page).await {
            self.record_error(leakwatch_protocol::ErrorLevel::Warn, format!("console watcher setup failed: {e}"));
        }
        if self.options.immediately_inject_dom_leak_detection {
            let _ = self.ensure_dom_leak_detector(page).await;
        }
        if self.registry.should_run_interact_chains(page) {
            self.run_interact_chains(page, main_frame).await;
        }
        if self.registry.clean_page(&*self.driver, page, main_frame).await? {
            self.emit(Event::new(EventKind::Return, now_ms()));
            self.rerun_active_interact_chain(page, main_frame).await;
        }
        self.maybe_screenshot(page, ScreenshotTrigger::Loaded).await;

        let mut completed_frames: HashSet<String> = HashSet::new();
        let mut any_submission = false;

        loop {
            let mut submitted_this_pass = false;
            let frames = self.driver.frames(page).await?;
            for frame in frames {
                let Ok(url) = self.driver.url(frame).await else { continue };
                if url.is_empty() || completed_frames.contains(&url) {
                    continue;
                }
                if let Err(e) = self.ensure_frame_injected(frame).await {
                    self.record_error(leakwatch_protocol::ErrorLevel::Warn, format!("frame injection failed: {e}"));
                    continue;
                }
                let (fields, done, submitted) = self.process_fields(page, main_frame, frame).await?;
                if submitted {
                    any_submission = true;
                }
                if done {
                    completed_frames.insert(url);
                }
                if !fields.is_empty() && self.options.fill.submit {
                    submitted_this_pass = true;
                    break;
                }
                if self.budget_exhausted() {
                    break;
                }
            }
            self.drain_leak_channels();
            if !submitted_this_pass || self.budget_exhausted() {
                break;
            }
            if self.registry.clean_page(&*self.driver, page, main_frame).await? {
                self.emit(Event::new(EventKind::Return, now_ms()));
                self.rerun_active_interact_chain(page, main_frame).await;
            }
        }

        if !any_submission {
            if let Err(e) = fill::blur_refocus_page(&*self.driver, main_frame).await {
                self.record_error(leakwatch_protocol::ErrorLevel::Warn, format!("post-page blur/refocus failed: {e}"));
            }
        }
        Ok(())
    }

    async fn record_visited(&self, page: PageId, frame: FrameId) {
        if let Ok(url) = self.driver.url(frame).await {
            self.state.lock().visited_targets.push(VisitedTarget {
                url,
                kind: TargetKind::Page,
                time_ms: now_ms(),
            });
        }
        self.registry.observe_page(page);
        self.maybe_screenshot(page, ScreenshotTrigger::NewPage).await;
    }

    /// Entry point: audits `landing_page`/`landing_frame`, then follows
    /// login/register links (subject to `maxLinks` and `skipExternal`)
    /// across any newly opened pages, repeating the discover/fill/submit
    /// cycle on each.
    pub async fn run(&self, landing_page: PageId, landing_frame: FrameId) -> Result<()> {
        let mut queue: VecDeque<(PageId, FrameId)> = VecDeque::new();
        queue.push_back((landing_page, landing_frame));
        self.record_visited(landing_page, landing_frame).await;

        let mut known_pages: HashSet<PageId> = HashSet::new();
        known_pages.insert(landing_page);

        while let Some((page, frame)) = queue.pop_front() {
            if let Err(e) = self.process_page(page, frame).await {
                self.record_error(leakwatch_protocol::ErrorLevel::Error, format!("page processing failed: {e}"));
                continue;
            }
            if self.budget_exhausted() || self.stop_early_satisfied() {
                break;
            }

            if self.state.lock().links_followed >= self.options.max_links {
                continue;
            }

            let link_candidates = links::discover_links(&*self.driver, frame).await.unwrap_or_default();
            {
                let mut state = self.state.lock();
                state.links.get_or_insert_with(Vec::new);
            }

            for link in link_candidates {
                if self.state.lock().links_followed >= self.options.max_links {
                    break;
                }
                if links::should_skip_external(&link, self.options.skip_external, self.landing_origin.as_deref()) {
                    continue;
                }
                {
                    let mut state = self.state.lock();
                    state.links.get_or_insert_with(Vec::new).push(link.clone());
                }

                let pages_before: HashSet<PageId> = self.driver.pages().await?.into_iter().collect();
                if let Err(e) = links::click_link(&*self.driver, frame, &link.identifier.selector_chain).await {
                    self.record_error(leakwatch_protocol::ErrorLevel::Warn, format!("link click failed: {e}"));
                    continue;
                }
                self.emit(Event::new(EventKind::Link, now_ms()).with_identifier(link.identifier.clone()));
                self.state.lock().links_followed += 1;
                self.maybe_screenshot(page, ScreenshotTrigger::LinkClicked).await;

                match navigation::race_navigation(
                    &*self.driver,
                    frame,
                    frame,
                    page,
                    self.effective_timeout_ms(self.options.timeout_ms.follow_link),
                )
                .await
                {
                    Ok(NavigationWinner::NewPage) => {
                        self.emit(Event::new(EventKind::Navigate, now_ms()));
                        if let Ok(pages) = self.driver.pages().await {
                            for new_page in pages.into_iter().filter(|p| !pages_before.contains(p)) {
                                if known_pages.insert(new_page) {
                                    if let Ok(frames) = self.driver.frames(new_page).await {
                                        if let Some(&new_main) = frames.first() {
                                            self.record_visited(new_page, new_main).await;
                                            queue.push_back((new_page, new_main));
                                        }
                                    }
                                }
                            }
                        }
                    }
                    Ok(_) => {
                        self.emit(Event::new(EventKind::Navigate, now_ms()));
                        self.registry.clear_injected(frame);
                        queue.push_back((page, frame));
                    }
                    Err(e) if e.is_timeout() => {
                        self.record_error(leakwatch_protocol::ErrorLevel::Info, "link-follow navigation wait timed out".into());
                    }
                    Err(e) => {
                        self.record_error(leakwatch_protocol::ErrorLevel::Warn, format!("link-follow navigation wait failed: {e}"));
                    }
                }
            }
        }

        self.drain_leak_channels();
        Ok(())
    }

    /// The accumulated result, in the shape returned upstream.
    pub fn get_data(&self) -> CrawlResult {
        self.drain_leak_channels();
        let state = self.state.lock();
        CrawlResult {
            visited_targets: state.visited_targets.clone(),
            fields: state.fields.ordered(),
            links: state.links.clone(),
            dom_leaks: state.dom_leaks.leaks().to_vec(),
            console_leaks: state.console_leaks.clone(),
            events: state.events.clone(),
            errors: state.errors.clone(),
        }
    }
}
