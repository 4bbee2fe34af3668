//! Source-map resolution for captured stack frames. Caching is per session,
//! per source-map URL. `true` mode resolves a script's own declared
//! `//# sourceMappingURL=` comment; `aggressive` mode additionally guesses
//! `.map` appended to the script URL when the script declares none. Fetch
//! or parse failures are swallowed rather than surfaced, per the
//! non-fatal-by-default error policy.

use dashmap::DashMap;
use leakwatch_protocol::UseSourceMaps;
use leakwatch_runtime::CdpSession;
use oxc_sourcemap::SourceMap;

const SOURCE_MAPPING_URL_PREFIXES: [&str; 2] = ["//# sourceMappingURL=", "//@ sourceMappingURL="];

/// Finds a script's own declared source-map comment, if any, and resolves
/// it against the script's URL (maps are conventionally referenced
/// relative to the script that declares them).
fn declared_map_url(script_url: &str, script_source: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(script_source);
    let declared = text.lines().rev().find_map(|line| {
        let line = line.trim();
        SOURCE_MAPPING_URL_PREFIXES
            .iter()
            .find_map(|prefix| line.strip_prefix(prefix))
    })?;
    match url::Url::parse(script_url).and_then(|base| base.join(declared)) {
        Ok(resolved) => Some(resolved.to_string()),
        Err(_) => Some(declared.to_string()),
    }
}

/// `aggressive` mode's blind fallback guess, used only once a script's own
/// source turned up no declared `sourceMappingURL`.
fn blind_guess_url(script_url: &str) -> Option<String> {
    if script_url.ends_with(".js") || script_url.ends_with(".jsm") {
        Some(format!("{script_url}.map"))
    } else {
        None
    }
}

/// One stack frame, before or after source-map resolution.
#[derive(Debug, Clone)]
pub struct ResolvedFrame {
    pub function_name: String,
    pub url: String,
    pub line: u32,
    pub column: u32,
}

impl ResolvedFrame {
    pub fn render(&self) -> String {
        format!("{} ({}:{}:{})", self.function_name, self.url, self.line, self.column)
    }
}

/// Caches parsed source maps by the map's own URL, and declared map URLs by
/// the script that declared them (so a script's source is only fetched and
/// scanned for its `sourceMappingURL` comment once).
#[derive(Default)]
pub struct SourceMapCache {
    maps: DashMap<String, Option<SourceMap>>,
    declared: DashMap<String, Option<String>>,
}

impl SourceMapCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The declared `sourceMappingURL` for `script_url`, fetching and
    /// scanning the script's source the first time it's asked about.
    async fn declared_map_url_for(&self, session: &dyn CdpSession, script_url: &str) -> Option<String> {
        if let Some(cached) = self.declared.get(script_url) {
            return cached.value().clone();
        }
        let declared = match session.load_network_resource(script_url).await {
            Ok(source) => declared_map_url(script_url, &source),
            Err(_) => None,
        };
        self.declared.insert(script_url.to_string(), declared.clone());
        declared
    }

    /// Which map URL (if any) to resolve `script_url` against, under `mode`.
    /// `true` only ever resolves a script's own declared map; `aggressive`
    /// falls back to guessing `.map` appended to the script URL when the
    /// script declared none.
    async fn map_url_for(&self, session: &dyn CdpSession, script_url: &str, mode: UseSourceMaps) -> Option<String> {
        match mode {
            UseSourceMaps::False => None,
            UseSourceMaps::True => self.declared_map_url_for(session, script_url).await,
            UseSourceMaps::Aggressive => {
                if let Some(declared) = self.declared_map_url_for(session, script_url).await {
                    return Some(declared);
                }
                blind_guess_url(script_url)
            }
        }
    }

    async fn fetch(&self, session: &dyn CdpSession, map_url: &str) -> Option<SourceMap> {
        if let Some(cached) = self.maps.get(map_url) {
            return cached.value().clone();
        }
        let parsed = match session.load_network_resource(map_url).await {
            Ok(bytes) => SourceMap::from_slice(&bytes).ok(),
            Err(_) => None,
        };
        self.maps.insert(map_url.to_string(), parsed.clone());
        parsed
    }

    /// Best-effort resolution of `frame`'s original source location. Returns
    /// `frame` unchanged when no map is configured, none was fetchable, or
    /// the map has no token at that position.
    pub async fn resolve(&self, session: &dyn CdpSession, mode: UseSourceMaps, frame: ResolvedFrame) -> ResolvedFrame {
        let Some(map_url) = self.map_url_for(session, &frame.url, mode).await else {
            return frame;
        };
        let Some(map) = self.fetch(session, &map_url).await else {
            return frame;
        };
        match map.lookup_token(frame.line, frame.column) {
            Some(token) => ResolvedFrame {
                function_name: frame.function_name,
                url: token.get_source().map(|s| s.to_string()).unwrap_or(frame.url),
                line: token.get_src_line(),
                column: token.get_src_col(),
            },
            None => frame,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blind_guess_appends_map_suffix_to_scripts_only() {
        assert_eq!(blind_guess_url("https://x/y.js"), Some("https://x/y.js.map".to_string()));
        assert_eq!(blind_guess_url("https://x/y.jsm"), Some("https://x/y.jsm.map".to_string()));
        assert_eq!(blind_guess_url("https://x/y.css"), None);
    }

    #[test]
    fn declared_url_resolved_relative_to_script() {
        let source = b"console.log(1);\n//# sourceMappingURL=y.js.map\n";
        assert_eq!(
            declared_map_url("https://x/dist/y.js", source),
            Some("https://x/dist/y.js.map".to_string())
        );
    }

    #[test]
    fn declared_url_at_a_different_path_is_not_clobbered_by_a_blind_guess() {
        let source = b"console.log(1);\n//# sourceMappingURL=/maps/abc123.map\n";
        assert_eq!(
            declared_map_url("https://x/dist/y.min.js", source),
            Some("https://x/maps/abc123.map".to_string())
        );
    }

    #[test]
    fn legacy_sourcemappingurl_comment_prefix_is_recognized() {
        let source = b"console.log(1);\n//@ sourceMappingURL=y.js.map\n";
        assert_eq!(
            declared_map_url("https://x/y.js", source),
            Some("https://x/y.js.map".to_string())
        );
    }

    #[test]
    fn no_declared_comment_yields_none() {
        let source = b"console.log(1);\n";
        assert_eq!(declared_map_url("https://x/y.js", source), None);
    }
}
