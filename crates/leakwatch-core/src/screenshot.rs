//! Screenshot capture: per-trigger filenames under `screenshot.targetDir`,
//! numbered so the files on disk sort in the same order as the event log.

use std::sync::atomic::{AtomicU64, Ordering};

use leakwatch_protocol::ScreenshotTrigger;

pub fn trigger_label(trigger: ScreenshotTrigger) -> &'static str {
    match trigger {
        ScreenshotTrigger::Loaded => "loaded",
        ScreenshotTrigger::Filled => "filled",
        ScreenshotTrigger::Submitted => "submitted",
        ScreenshotTrigger::LinkClicked => "link-clicked",
        ScreenshotTrigger::InteractChainExecuted => "interact-chain-executed",
        ScreenshotTrigger::NewPage => "new-page",
    }
}

#[derive(Default)]
pub struct ScreenshotSequencer {
    next: AtomicU64,
}

impl ScreenshotSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// `{seq:04}-{label}.png`, bumping the sequence counter as a side effect.
    pub fn file_name(&self, trigger: ScreenshotTrigger) -> String {
        let seq = self.next.fetch_add(1, Ordering::SeqCst);
        format!("{seq:04}-{}.png", trigger_label(trigger))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_names_are_sequential_and_labeled() {
        let seq = ScreenshotSequencer::new();
        assert_eq!(seq.file_name(ScreenshotTrigger::Loaded), "0000-loaded.png");
        assert_eq!(seq.file_name(ScreenshotTrigger::Filled), "0001-filled.png");
        assert_eq!(seq.file_name(ScreenshotTrigger::NewPage), "0002-new-page.png");
    }

    #[test]
    fn labels_match_kebab_case_wire_names() {
        assert_eq!(trigger_label(ScreenshotTrigger::LinkClicked), "link-clicked");
        assert_eq!(
            trigger_label(ScreenshotTrigger::InteractChainExecuted),
            "interact-chain-executed"
        );
    }
}
