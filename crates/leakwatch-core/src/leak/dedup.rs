//! Collapses DOM attribute leaks observed within a 100ms window on the same
//! `{frameStack, selectorChain, attribute}`, preferring whichever entry
//! carries a resolved stack.

use std::collections::HashMap;

use leakwatch_protocol::DomPasswordLeak;

const WINDOW_MS: u64 = 100;

#[derive(Default)]
pub struct DomLeakDedup {
    index: HashMap<String, usize>,
    leaks: Vec<DomPasswordLeak>,
}

impl DomLeakDedup {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(leak: &DomPasswordLeak) -> String {
        format!("{}::{}", leak.identifier.encode(), leak.attribute)
    }

    /// Folds `leak` in: collapses into the prior entry on the same key if it
    /// arrived within the dedup window, upgrading it with a stack if the new
    /// sighting has one and the prior one didn't. Otherwise records a new
    /// entry.
    pub fn offer(&mut self, leak: DomPasswordLeak) {
        let key = Self::key(&leak);
        if let Some(&idx) = self.index.get(&key) {
            let existing = &mut self.leaks[idx];
            if leak.time_ms.saturating_sub(existing.time_ms) < WINDOW_MS {
                if existing.stack.is_none() && leak.stack.is_some() {
                    existing.stack = leak.stack;
                }
                return;
            }
        }
        self.index.insert(key, self.leaks.len());
        self.leaks.push(leak);
    }

    pub fn into_leaks(self) -> Vec<DomPasswordLeak> {
        self.leaks
    }

    pub fn leaks(&self) -> &[DomPasswordLeak] {
        &self.leaks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use leakwatch_protocol::ElementIdentifier;

    fn leak(time_ms: u64, stack: Option<&str>) -> DomPasswordLeak {
        DomPasswordLeak {
            time_ms,
            attribute: "value".to_string(),
            identifier: ElementIdentifier::new(vec!["https://x/".into()], vec!["input".into()]),
            stack: stack.map(str::to_string),
        }
    }

    #[test]
    fn collapses_within_window() {
        let mut dedup = DomLeakDedup::new();
        dedup.offer(leak(0, None));
        dedup.offer(leak(50, None));
        assert_eq!(dedup.leaks().len(), 1);
    }

    #[test]
    fn separate_entries_outside_window() {
        let mut dedup = DomLeakDedup::new();
        dedup.offer(leak(0, None));
        dedup.offer(leak(150, None));
        assert_eq!(dedup.leaks().len(), 2);
    }

    #[test]
    fn prefers_stack_carrying_entry() {
        let mut dedup = DomLeakDedup::new();
        dedup.offer(leak(0, None));
        dedup.offer(leak(10, Some("at foo (x.js:1:1)")));
        let leaks = dedup.into_leaks();
        assert_eq!(leaks.len(), 1);
        assert_eq!(leaks[0].stack.as_deref(), Some("at foo (x.js:1:1)"));
    }
}
