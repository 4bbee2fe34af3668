//! Navigation-wait race: after an action that might trigger navigation
//! (submit, link click), races the frame's own navigation, its top page's
//! navigation, and a new page target opening, against a timeout computed
//! from the observed page-load duration.

use std::time::Duration;

use leakwatch_runtime::{BrowserDriver, FrameId, PageId};
use tokio::time::{sleep, timeout};

use crate::error::{CoreError, Result};

const POLL_INTERVAL_MS: u64 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationWinner {
    Frame,
    TopPage,
    NewPage,
}

/// Effective wait timeout: `max(configured_min, 2 × observed_page_load_ms)`.
pub fn effective_timeout_ms(configured_min_ms: u64, observed_page_load_ms: Option<u64>) -> u64 {
    match observed_page_load_ms {
        Some(observed) => configured_min_ms.max(observed.saturating_mul(2)),
        None => configured_min_ms,
    }
}

/// Races the frame's own navigation, the top page's main-frame navigation,
/// and a new page target opening. Returns the winner, or a timeout error if
/// none fires within `timeout_ms`.
///
/// When more than one arm could plausibly fire in the same tick (e.g. a
/// child frame's submit also navigates its top page), the frame-navigation
/// arm wins, since it is checked first on every poll.
pub async fn race_navigation(
    driver: &dyn BrowserDriver,
    frame: FrameId,
    top_frame: FrameId,
    page: PageId,
    timeout_ms: u64,
) -> Result<NavigationWinner> {
    let frame_url_before = driver.url(frame).await.ok();
    let top_url_before = driver.url(top_frame).await.ok();
    let pages_before = driver.pages().await?.len();
    let _ = page;

    let race = async {
        loop {
            if driver.detached(frame).await.unwrap_or(true) {
                return NavigationWinner::Frame;
            }
            if let Ok(url) = driver.url(frame).await {
                if Some(&url) != frame_url_before.as_ref() {
                    return NavigationWinner::Frame;
                }
            }
            if let Ok(url) = driver.url(top_frame).await {
                if Some(&url) != top_url_before.as_ref() {
                    return NavigationWinner::TopPage;
                }
            }
            if let Ok(pages) = driver.pages().await {
                if pages.len() > pages_before {
                    return NavigationWinner::NewPage;
                }
            }
            sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
        }
    };

    timeout(Duration::from_millis(timeout_ms), race)
        .await
        .map_err(|_| CoreError::Driver(leakwatch_runtime::Error::Timeout(timeout_ms)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_timeout_uses_observed_when_larger() {
        assert_eq!(effective_timeout_ms(15_000, Some(10_000)), 20_000);
    }

    #[test]
    fn effective_timeout_falls_back_to_configured_minimum() {
        assert_eq!(effective_timeout_ms(15_000, Some(2_000)), 15_000);
        assert_eq!(effective_timeout_ms(15_000, None), 15_000);
    }
}
