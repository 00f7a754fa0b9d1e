//! URL canonicalization and page-equivalence rules.
//!
//! Two discoveries that normalize to the same string are the same page
//! and must never produce two graph nodes. Normalization is idempotent:
//! `normalize(normalize(u)) == normalize(u)`.

use std::collections::HashMap;
use tracing::debug;
use url::Url;

/// Query parameters stripped during normalization unless a domain rule
/// keeps them.
pub const DEFAULT_TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "fbclid",
    "gclid",
    "msclkid",
    "_ga",
    "_gac",
    "_gl",
    "mc_cid",
    "mc_eid",
    "ref",
    "referrer",
    "source",
];

/// Encoded `&` inside the path parameter of an SPA redirect URL.
const SPA_AMP_TOKEN: &str = "~and~";

#[derive(Debug, Clone)]
pub struct UrlNormalizer {
    tracking_params: Vec<String>,
    /// Per-domain allow-list: parameters kept even when they appear in
    /// the tracking list. Keyed by hostname without a `www.` prefix.
    domain_keep: HashMap<String, Vec<String>>,
}

impl Default for UrlNormalizer {
    fn default() -> Self {
        Self {
            tracking_params: DEFAULT_TRACKING_PARAMS
                .iter()
                .map(|p| p.to_string())
                .collect(),
            domain_keep: HashMap::new(),
        }
    }
}

impl UrlNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tracking_params(mut self, params: Vec<String>) -> Self {
        self.tracking_params = params;
        self
    }

    pub fn with_domain_keep(mut self, domain: &str, params: Vec<String>) -> Self {
        self.domain_keep
            .insert(domain.trim_start_matches("www.").to_string(), params);
        self
    }

    /// Canonicalize a URL: reconstruct SPA-redirect shapes, strip
    /// tracking parameters and the trailing slash, drop the fragment.
    ///
    /// Unparseable input is returned unchanged.
    pub fn normalize(&self, url: &str) -> String {
        let Ok(parsed) = Url::parse(url) else {
            return url.to_string();
        };

        // Static hosts that can't serve deep routes encode the original
        // path in a `/?/path` query with `~and~` standing in for `&`.
        // Reconstruct and re-normalize recursively.
        if let Some(original) = reconstruct_spa_redirect(&parsed) {
            debug!(url, original, "reconstructed SPA redirect URL");
            return self.normalize(&original);
        }

        let host = parsed
            .host_str()
            .unwrap_or("")
            .trim_start_matches("www.")
            .to_string();
        let keep = self.domain_keep.get(&host);

        let surviving: Vec<(String, String)> = parsed
            .query_pairs()
            .filter(|(k, _)| {
                let tracked = self.tracking_params.iter().any(|p| p == k.as_ref());
                let kept = keep.map(|ps| ps.iter().any(|p| p == k.as_ref())).unwrap_or(false);
                !tracked || kept
            })
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        let mut out = parsed.clone();
        out.set_fragment(None);
        if surviving.is_empty() {
            out.set_query(None);
        } else {
            out.query_pairs_mut().clear().extend_pairs(surviving);
        }

        let path = out.path().to_string();
        if path.len() > 1 && path.ends_with('/') {
            out.set_path(path.trim_end_matches('/'));
        }

        out.to_string()
    }

    /// Whether two URLs refer to the same page: equal canonical forms,
    /// or equal origin+path ignoring query and fragment.
    pub fn is_same_page(&self, u1: &str, u2: &str) -> bool {
        let n1 = self.normalize(u1);
        let n2 = self.normalize(u2);
        if n1 == n2 {
            return true;
        }
        match (Url::parse(&n1), Url::parse(&n2)) {
            (Ok(a), Ok(b)) => a.origin() == b.origin() && a.path() == b.path(),
            _ => false,
        }
    }

    /// Whether two URLs share an origin (scheme + host + port).
    pub fn same_origin(&self, u1: &str, u2: &str) -> bool {
        match (Url::parse(u1), Url::parse(u2)) {
            (Ok(a), Ok(b)) => a.origin() == b.origin(),
            _ => false,
        }
    }
}

/// Detect the SPA-redirect URL shape and rebuild the original URL,
/// or None when the shape doesn't match.
fn reconstruct_spa_redirect(url: &Url) -> Option<String> {
    if url.path() != "/" {
        return None;
    }
    let path_param = url
        .query_pairs()
        .find(|(k, _)| k == "/")
        .map(|(_, v)| v.into_owned())?;
    if path_param.is_empty() {
        return None;
    }
    let original_path = path_param.replace(SPA_AMP_TOKEN, "&");
    let origin = &url[..url::Position::BeforePath];
    Some(format!("{}{}", origin, original_path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_is_idempotent() {
        let norm = UrlNormalizer::new();
        let inputs = [
            "https://x.example/a/?utm_source=tw&q=1#frag",
            "https://x.example/",
            "https://x.example/a/b/",
            "https://x.example/?/deep/route~and~id=3",
        ];
        for input in inputs {
            let once = norm.normalize(input);
            assert_eq!(norm.normalize(&once), once, "input: {}", input);
        }
    }

    #[test]
    fn tracking_params_and_trailing_slash_collapse() {
        let norm = UrlNormalizer::new();
        assert_eq!(
            norm.normalize("https://x.example/docs/?utm_source=mail"),
            norm.normalize("https://x.example/docs")
        );
    }

    #[test]
    fn root_slash_is_preserved() {
        let norm = UrlNormalizer::new();
        assert_eq!(norm.normalize("https://x.example/"), "https://x.example/");
    }

    #[test]
    fn fragment_only_difference_is_same_page() {
        let norm = UrlNormalizer::new();
        assert!(norm.is_same_page("https://x.example/a", "https://x.example/a#section"));
    }

    #[test]
    fn query_difference_on_same_path_is_same_page() {
        let norm = UrlNormalizer::new();
        assert!(norm.is_same_page("https://x.example/a?p=1", "https://x.example/a?p=2"));
        assert!(!norm.is_same_page("https://x.example/a", "https://x.example/b"));
    }

    #[test]
    fn spa_redirect_is_reconstructed() {
        let norm = UrlNormalizer::new();
        assert_eq!(
            norm.normalize("https://x.example/?/guide/install~and~lang=en"),
            "https://x.example/guide/install?lang=en"
        );
    }

    #[test]
    fn spa_reconstruction_strips_tracking_too() {
        let norm = UrlNormalizer::new();
        assert_eq!(
            norm.normalize("https://x.example/?/page~and~utm_source=x"),
            "https://x.example/page"
        );
    }

    #[test]
    fn domain_keep_list_wins_over_tracking_list() {
        let norm =
            UrlNormalizer::new().with_domain_keep("x.example", vec!["ref".to_string()]);
        assert_eq!(
            norm.normalize("https://www.x.example/a?ref=nav&utm_source=tw"),
            "https://www.x.example/a?ref=nav"
        );
    }

    #[test]
    fn unparseable_urls_pass_through() {
        let norm = UrlNormalizer::new();
        assert_eq!(norm.normalize("not a url"), "not a url");
    }
}
