//! Configuration scope derivation for remote URLs.
//!
//! A "scope" is a URI-prefix-derived string used as a configuration lookup
//! key. Scopes are ordered most specific first: the path is unfolded
//! right-to-left, then the host is unfolded left-to-right by sub-domain.
//! The bare top-level domain is never yielded.

use url::Url;

/// Derive the ordered configuration scopes for a remote URL.
///
/// For `https://a.b.example.com/x/y` the result is exactly:
/// `["https://a.b.example.com/x/y", "https://a.b.example.com/x",
///   "https://a.b.example.com", "https://b.example.com",
///   "https://example.com"]`.
pub fn config_scopes(url: &Url) -> Vec<String> {
    let scheme = url.scheme();
    let Some(full_host) = url.host_str() else {
        return Vec::new();
    };

    let mut scopes = Vec::new();

    // Unfold the path by component, right-to-left.
    let mut path = url.path().trim_matches('/').to_string();
    while !path.is_empty() {
        scopes.push(format!("{scheme}://{full_host}/{path}"));
        match path.rfind('/') {
            Some(index) => path.truncate(index),
            None => path.clear(),
        }
    }

    // Unfold the host by sub-domain, left-to-right. A host without a "."
    // would be the bare TLD, which is never emitted.
    let mut host = full_host;
    while !host.is_empty() {
        if host.contains('.') {
            scopes.push(format!("{scheme}://{host}"));
        }
        match host.find('.') {
            Some(index) => host = &host[index + 1..],
            None => break,
        }
    }

    scopes
}

/// Strip the `scheme://` prefix from a scope, if present.
///
/// Consumers probe each scope twice: scheme-qualified first, then
/// scheme-less. This keeps the two-candidate generation in one place.
pub fn without_scheme(scope: &str) -> &str {
    scope.split_once("://").map_or(scope, |(_, rest)| rest)
}
