//! Built-in host providers.
//!
//! Registration order matters: the generic provider matches any HTTP(S)
//! remote and must come last.

pub mod azure;
pub mod generic;
pub mod github;

pub use azure::AzureReposProvider;
pub use generic::GenericProvider;
pub use github::GitHubProvider;

use crate::input::InputRequest;

/// Shared support-predicate building block: the request names an HTTP(S)
/// remote with a host.
pub(crate) fn is_http_like(input: &InputRequest) -> bool {
    let protocol_ok = matches!(
        input.protocol.as_deref(),
        Some(protocol) if protocol.eq_ignore_ascii_case("http") || protocol.eq_ignore_ascii_case("https")
    );
    protocol_ok && input.host.as_deref().is_some_and(|host| !host.is_empty())
}
