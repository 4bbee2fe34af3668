//! Frame/Page Registry: per-page dirty/start-URL/clean-scope bookkeeping
//! and per-frame injected-script idempotency, layered over the opaque ids
//! the browser driver hands out. None of this state lives in the browser;
//! it is the host's mirror of what has already been done to each page.

use dashmap::DashMap;
use leakwatch_runtime::{BrowserDriver, FrameId, PageId};
use parking_lot::Mutex;

use crate::error::Result;

struct PageEntry {
    start_url: Mutex<Option<String>>,
    dirty: Mutex<bool>,
    dom_leak_installed: Mutex<bool>,
    interact_chains_run: Mutex<bool>,
    /// Stack of active interact-chain indices; `clean_page` re-runs the one
    /// on top, if any, leaving the actual re-execution to the orchestrator.
    clean_scopes: Mutex<Vec<usize>>,
}

impl Default for PageEntry {
    fn default() -> Self {
        Self {
            start_url: Mutex::new(None),
            dirty: Mutex::new(false),
            dom_leak_installed: Mutex::new(false),
            interact_chains_run: Mutex::new(false),
            clean_scopes: Mutex::new(Vec::new()),
        }
    }
}

#[derive(Default)]
struct FrameEntry {
    injected: Mutex<bool>,
}

/// Tracks pages and frames observed during one crawl session.
#[derive(Default)]
pub struct FrameRegistry {
    pages: DashMap<PageId, PageEntry>,
    frames: DashMap<FrameId, FrameEntry>,
}

impl FrameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe_page(&self, page: PageId) {
        self.pages.entry(page).or_default();
    }

    pub fn observe_frame(&self, frame: FrameId) {
        self.frames.entry(frame).or_default();
    }

    /// Marks `frame`'s page script as injected, returning whether it was
    /// already injected (i.e. this call is a no-op for the caller).
    pub fn mark_injected(&self, frame: FrameId) -> bool {
        let entry = self.frames.entry(frame).or_default();
        let mut injected = entry.injected.lock();
        let was = *injected;
        *injected = true;
        was
    }

    /// Forgets that `frame`'s page script was injected. Frame ids survive a
    /// same-frame navigation (the browsing context is the same; the document
    /// inside it is not), so every navigation that replaces a frame's
    /// document has to clear this or the next `ensure_frame_injected` call
    /// skips re-injecting into a document that was never touched.
    pub fn clear_injected(&self, frame: FrameId) {
        let entry = self.frames.entry(frame).or_default();
        *entry.injected.lock() = false;
    }

    pub fn set_start_url(&self, page: PageId, url: String) {
        let entry = self.pages.entry(page).or_default();
        let mut start = entry.start_url.lock();
        if start.is_none() {
            *start = Some(url);
        }
    }

    pub fn start_url(&self, page: PageId) -> Option<String> {
        self.pages.get(&page).and_then(|e| e.start_url.lock().clone())
    }

    pub fn set_dirty(&self, page: PageId) {
        let entry = self.pages.entry(page).or_default();
        *entry.dirty.lock() = true;
    }

    pub fn is_dirty(&self, page: PageId) -> bool {
        self.pages.get(&page).map(|e| *e.dirty.lock()).unwrap_or(false)
    }

    fn clear_dirty(&self, page: PageId) {
        if let Some(e) = self.pages.get(&page) {
            *e.dirty.lock() = false;
        }
    }

    /// The interact-chain index active at the top of `page`'s clean-scope
    /// stack, if any.
    pub fn active_chain_scope(&self, page: PageId) -> Option<usize> {
        self.pages
            .get(&page)
            .and_then(|e| e.clean_scopes.lock().last().copied())
    }

    pub fn push_clean_scope(&self, page: PageId, chain_index: usize) {
        let entry = self.pages.entry(page).or_default();
        entry.clean_scopes.lock().push(chain_index);
    }

    pub fn pop_clean_scope(&self, page: PageId) {
        if let Some(e) = self.pages.get(&page) {
            e.clean_scopes.lock().pop();
        }
    }

    /// Whether the DOM attribute leak detector still needs installing on
    /// `page`; marks it installed as a side effect (idempotent).
    pub fn should_install_dom_leak_detector(&self, page: PageId) -> bool {
        let entry = self.pages.entry(page).or_default();
        let mut installed = entry.dom_leak_installed.lock();
        if *installed {
            false
        } else {
            *installed = true;
            true
        }
    }

    /// Whether `page`'s configured interact chains still need their initial
    /// run; marks them run as a side effect (idempotent). Re-navigations
    /// within the same page go through `clean_page`/`active_chain_scope`
    /// instead of running again here.
    pub fn should_run_interact_chains(&self, page: PageId) -> bool {
        let entry = self.pages.entry(page).or_default();
        let mut run = entry.interact_chains_run.lock();
        if *run {
            false
        } else {
            *run = true;
            true
        }
    }

    /// Navigates `page`'s main frame back to its recorded start URL if
    /// dirty. A clean page is left untouched (idempotent).
    pub async fn clean_page(
        &self,
        driver: &dyn BrowserDriver,
        page: PageId,
        main_frame: FrameId,
    ) -> Result<bool> {
        if !self.is_dirty(page) {
            return Ok(false);
        }
        let Some(url) = self.start_url(page) else {
            return Ok(false);
        };
        driver.goto(main_frame, &url).await?;
        self.clear_dirty(page);
        self.clear_injected(main_frame);
        Ok(true)
    }
}
