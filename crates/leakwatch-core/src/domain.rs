//! Registrable-domain (eTLD+1) computation.
//!
//! No public-suffix-list crate is pulled in for this (see `DESIGN.md`): IPs
//! and `localhost` have no registrable domain, and everything else is
//! reduced to its last two labels except for a short embedded list of
//! well-known multi-label suffixes.

use url::{Host, Url};

/// Multi-label public suffixes common enough to be worth special-casing
/// rather than silently mis-grouping `example.co.uk` under `co.uk`.
const MULTI_LABEL_SUFFIXES: &[&str] = &[
    "co.uk", "org.uk", "ac.uk", "gov.uk", "com.au", "net.au", "org.au", "co.jp", "co.nz",
    "github.io", "gitlab.io", "pages.dev", "web.app", "vercel.app",
];

/// Returns the registrable domain (eTLD+1) of `url`, or `None` for
/// localhost and IP-literal hosts.
pub fn registrable_domain(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    match parsed.host()? {
        Host::Ipv4(_) | Host::Ipv6(_) => None,
        Host::Domain(domain) => {
            if domain == "localhost" || domain.ends_with(".localhost") {
                return None;
            }
            Some(reduce_to_registrable(domain))
        }
    }
}

fn reduce_to_registrable(domain: &str) -> String {
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() <= 2 {
        return domain.to_string();
    }
    for suffix in MULTI_LABEL_SUFFIXES {
        let suffix_labels: Vec<&str> = suffix.split('.').collect();
        if labels.len() > suffix_labels.len() && domain.ends_with(suffix) {
            let take = suffix_labels.len() + 1;
            return labels[labels.len() - take..].join(".");
        }
    }
    labels[labels.len() - 2..].join(".")
}

/// Whether `candidate` shares a registrable domain with `origin` (both
/// non-`None`); used by `skipExternal` checks.
pub fn same_site(origin: Option<&str>, candidate: &str) -> bool {
    match origin {
        None => true,
        Some(origin) => registrable_domain(candidate).as_deref() == Some(origin),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn localhost_has_no_registrable_domain() {
        assert_eq!(registrable_domain("http://localhost:3000/login"), None);
    }

    #[test]
    fn ip_has_no_registrable_domain() {
        assert_eq!(registrable_domain("http://127.0.0.1:8080/"), None);
    }

    #[test]
    fn simple_domain_reduces_to_last_two_labels() {
        assert_eq!(
            registrable_domain("https://accounts.example.com/login"),
            Some("example.com".to_string())
        );
    }

    #[test]
    fn multi_label_suffix_keeps_three_labels() {
        assert_eq!(
            registrable_domain("https://www.example.co.uk/register"),
            Some("example.co.uk".to_string())
        );
    }

    #[test]
    fn same_site_matches_registrable_domain() {
        let origin = registrable_domain("https://example.com/");
        assert!(same_site(origin.as_deref(), "https://accounts.example.com/login"));
        assert!(!same_site(origin.as_deref(), "https://tracker.net/pixel"));
    }
}
