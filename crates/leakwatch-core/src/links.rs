//! Link Finder & Follower: discovers likely login/register links, filters
//! them against `skipExternal`, and follows them up to `maxLinks`.

use leakwatch_protocol::{BoundingBox, ElementIdentifier, LinkAttributes, SelectorChain, SkipExternal};
use leakwatch_runtime::{BrowserDriver, FrameId, JsValue};
use serde_json::Value as Json;

use crate::discovery::frame_stack;
use crate::domain::same_site;
use crate::error::Result;

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawLink {
    selector_chain: SelectorChain,
    tag: String,
    href: Option<String>,
    inner_text: Option<String>,
    match_strategy: String,
    on_top: bool,
    in_viewport: bool,
    #[allow(dead_code)]
    bounding_box: BoundingBox,
}

fn strategy_name(s: &str) -> &'static str {
    match s {
        "exact" => "exact",
        "coordinate" => "coordinate",
        _ => "loose",
    }
}

fn js_value_to_json(v: &JsValue) -> Json {
    match v {
        JsValue::Null | JsValue::Undefined => Json::Null,
        JsValue::Bool(b) => Json::Bool(*b),
        JsValue::Number(n) => serde_json::Number::from_f64(*n)
            .map(Json::Number)
            .unwrap_or(Json::Null),
        JsValue::String(s) => Json::String(s.clone()),
        JsValue::Array(items) => Json::Array(items.iter().map(js_value_to_json).collect()),
        JsValue::Object(map) => {
            Json::Object(map.iter().map(|(k, v)| (k.clone(), js_value_to_json(v))).collect())
        }
        JsValue::Opaque(_) => Json::Null,
    }
}

/// Discovers login/register link candidates in `frame`, ranked by the page
/// script's own stable sort (tag, then on-top, then in-viewport).
pub async fn discover_links(driver: &dyn BrowserDriver, frame: FrameId) -> Result<Vec<LinkAttributes>> {
    let stack = frame_stack(driver, frame).await?;
    let raw = driver
        .evaluate_value(frame, "() => window.__leakwatch_v1__.getLoginLinks(document)", &[])
        .await?;
    let Json::Array(items) = js_value_to_json(&raw) else {
        return Ok(vec![]);
    };
    let mut links = Vec::with_capacity(items.len());
    for item in items {
        let raw: RawLink = match serde_json::from_value(item) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "malformed link snapshot from page script, skipping");
                continue;
            }
        };
        links.push(LinkAttributes {
            identifier: ElementIdentifier::new(stack.clone(), raw.selector_chain),
            tag: raw.tag,
            href: raw.href,
            inner_text: raw.inner_text,
            match_strategy: strategy_name(&raw.match_strategy),
            on_top: raw.on_top,
            in_viewport: raw.in_viewport,
        });
    }
    Ok(links)
}

/// Whether `link` should be skipped under `skip_external`, relative to
/// `landing_origin` (the crawl's starting registrable domain).
pub fn should_skip_external(
    link: &LinkAttributes,
    skip_external: SkipExternal,
    landing_origin: Option<&str>,
) -> bool {
    if skip_external == SkipExternal::Off {
        return false;
    }
    match &link.href {
        Some(href) => !same_site(landing_origin, href),
        None => false,
    }
}

/// Scrolls to and clicks the element behind `chain` — the scripted
/// scroll-into-view + synthetic-click fallback; the driver facade has no
/// separate "real" click primitive to prefer over it.
pub async fn click_link(driver: &dyn BrowserDriver, frame: FrameId, chain: &SelectorChain) -> Result<()> {
    let chain_json = serde_json::to_value(chain)?;
    driver
        .evaluate(
            frame,
            "(chain) => window.__leakwatch_v1__.scrollIntoView(chain)",
            &[chain_json.clone()],
        )
        .await?;
    driver
        .evaluate(frame, "(chain) => window.__leakwatch_v1__.mouseClick(chain)", &[chain_json])
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(href: &str) -> LinkAttributes {
        LinkAttributes {
            identifier: ElementIdentifier::new(vec!["https://example.com/".into()], vec!["a".into()]),
            tag: "a".into(),
            href: Some(href.into()),
            inner_text: Some("Log in".into()),
            match_strategy: "exact",
            on_top: true,
            in_viewport: true,
        }
    }

    #[test]
    fn off_never_skips() {
        assert!(!should_skip_external(
            &link("https://tracker.net/"),
            SkipExternal::Off,
            Some("example.com")
        ));
    }

    #[test]
    fn skips_cross_site_links() {
        assert!(should_skip_external(
            &link("https://tracker.net/"),
            SkipExternal::Pages,
            Some("example.com")
        ));
    }

    #[test]
    fn keeps_same_site_links() {
        assert!(!should_skip_external(
            &link("https://accounts.example.com/login"),
            SkipExternal::Pages,
            Some("example.com")
        ));
    }
}
