//! Fill/Submit Engine: the humanized focus → scroll → hover → click → type
//! → blur sequence for one element, and Enter-submission.

use std::time::Duration;

use leakwatch_protocol::{CoreOptions, FieldType, SelectorChain};
use leakwatch_runtime::{BrowserDriver, FrameId, PageId};
use rand::Rng;
use serde_json::Value as Json;

use crate::error::Result;

/// The configured email value, optionally with `+<host-without-www>`
/// appended to the local part.
pub fn email_value(options: &CoreOptions, landing_host: &str) -> String {
    let email = &options.fill.email;
    if !options.fill.append_domain_to_email {
        return email.clone();
    }
    let host = landing_host.strip_prefix("www.").unwrap_or(landing_host);
    match email.split_once('@') {
        Some((local, domain)) => format!("{local}+{host}@{domain}"),
        None => email.clone(),
    }
}

async fn sleep_ms(ms: u64) {
    if ms > 0 {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}

/// A uniform delay in `[0, max_exclusive)`, collapsing to zero when the
/// configured ceiling is zero.
fn jitter(max_exclusive: u64) -> u64 {
    if max_exclusive == 0 {
        0
    } else {
        rand::rng().random_range(0..max_exclusive)
    }
}

async fn call(driver: &dyn BrowserDriver, frame: FrameId, page_fn: &str, args: &[Json]) -> Result<()> {
    let expr = format!("(...a) => window.__leakwatch_v1__.{page_fn}(...a)");
    driver.evaluate(frame, &expr, args).await?;
    Ok(())
}

/// Runs the full humanized sequence against one field, using the timing
/// parameters from `options.sleep_ms.fill`.
pub async fn fill_field(
    driver: &dyn BrowserDriver,
    page: PageId,
    frame: FrameId,
    field_type: FieldType,
    chain: &SelectorChain,
    value: &str,
    options: &CoreOptions,
) -> Result<()> {
    let chain_json = serde_json::to_value(chain)?;
    let fill_sleep = options.sleep_ms.fill.unwrap_or_default();

    driver.bring_to_front(page).await?;
    call(driver, frame, "scrollIntoView", &[chain_json.clone()]).await?;
    call(driver, frame, "hover", &[chain_json.clone()]).await?;
    call(driver, frame, "mouseClick", &[chain_json.clone()]).await?;
    sleep_ms(fill_sleep.click_dwell).await;

    if field_type == FieldType::Password && options.fill.simulate_show_password {
        call(driver, frame, "maybeShowPassword", &[chain_json.clone()]).await?;
    }

    for ch in value.chars() {
        call(
            driver,
            frame,
            "typeChar",
            &[chain_json.clone(), Json::String(ch.to_string())],
        )
        .await?;
        sleep_ms(jitter(fill_sleep.key_dwell)).await;
        sleep_ms(jitter(fill_sleep.between_keys)).await;
    }

    call(driver, frame, "blurWithTab", &[chain_json]).await?;
    Ok(())
}

/// Focuses the field and presses Enter, submitting its owning `<form>` if
/// `requestSubmit` is available.
pub async fn press_enter(driver: &dyn BrowserDriver, frame: FrameId, chain: &SelectorChain) -> Result<()> {
    let chain_json = serde_json::to_value(chain)?;
    call(driver, frame, "pressEnter", &[chain_json]).await
}

/// Blur-then-refocus dance performed after submission so visibility-based
/// beacons on the field fire even when no navigation occurred.
pub async fn blur_refocus(driver: &dyn BrowserDriver, frame: FrameId, chain: &SelectorChain) -> Result<()> {
    let chain_json = serde_json::to_value(chain)?;
    call(driver, frame, "refocus", &[chain_json]).await
}

/// Blur-then-refocus fallback for a page on which no field was submitted:
/// retargets whatever currently has focus rather than a specific field.
pub async fn blur_refocus_page(driver: &dyn BrowserDriver, frame: FrameId) -> Result<()> {
    driver
        .evaluate(frame, "() => window.__leakwatch_v1__.refocusActive()", &[])
        .await?;
    Ok(())
}

/// Clicks the Facebook-button probe, a synthetic element with class
/// `button` used to trigger generic-selector trackers without real
/// submission.
pub async fn click_facebook_button(driver: &dyn BrowserDriver, frame: FrameId) -> Result<()> {
    driver
        .evaluate(frame, "() => window.__leakwatch_v1__.clickFacebookButton()", &[])
        .await?;
    Ok(())
}
