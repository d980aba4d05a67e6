//! Effective-setting resolution from the environment and Git configuration.
//!
//! Precedence, highest first: environment variable, URL-scoped configuration
//! (most specific scope first, scheme-qualified before scheme-less at each
//! level), unscoped configuration. Lookups never fail; unresolved settings
//! are empty and the caller applies a default.

use std::sync::Arc;

use url::Url;

use crate::git::GitConfiguration;
use crate::scope;

/// Environment variable names understood by the broker.
pub mod envars {
    pub const PROVIDER: &str = "KEYBRIDGE_PROVIDER";
    pub const AUTHORITY: &str = "KEYBRIDGE_AUTHORITY";
    pub const INTERACTIVE: &str = "KEYBRIDGE_INTERACTIVE";
    pub const HELPER: &str = "KEYBRIDGE_HELPER";
    pub const TRACE: &str = "KEYBRIDGE_TRACE";
    pub const DEBUG: &str = "KEYBRIDGE_DEBUG";
    pub const GIT_TERMINAL_PROMPT: &str = "GIT_TERMINAL_PROMPT";
    pub const GIT_SSL_NO_VERIFY: &str = "GIT_SSL_NO_VERIFY";
    pub const CURL_HTTPS_PROXY: &str = "HTTPS_PROXY";
    pub const CURL_HTTP_PROXY: &str = "HTTP_PROXY";
    pub const CURL_ALL_PROXY: &str = "ALL_PROXY";
    /// Deprecated; prefer the standard cURL variables.
    pub const LEGACY_HTTP_PROXY: &str = "KEYBRIDGE_HTTP_PROXY";
}

/// Git configuration section and property names.
pub mod gitcfg {
    pub const CREDENTIAL_SECTION: &str = "credential";
    pub const PROVIDER: &str = "provider";
    pub const AUTHORITY: &str = "authority";
    pub const INTERACTIVE: &str = "interactive";
    pub const HELPER_TOOL: &str = "helperTool";
    pub const HTTP_PROXY: &str = "httpProxy";
    pub const HTTPS_PROXY: &str = "httpsProxy";
    pub const USE_HTTP_PATH: &str = "useHttpPath";

    pub const HTTP_SECTION: &str = "http";
    pub const PROXY: &str = "proxy";
    pub const SSL_VERIFY: &str = "sslVerify";
}

/// Process environment accessor. External collaborator contract.
pub trait Environment: Send + Sync {
    fn get(&self, name: &str) -> Option<String>;
}

/// The real process environment.
pub struct ProcessEnvironment;

impl Environment for ProcessEnvironment {
    fn get(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// Interpret a configuration value as a boolean.
///
/// Truthy: `1`, `true`, `yes`, `on`. Falsey: `0`, `false`, `no`, `off`.
/// Anything else is `None` and the caller's default applies; an
/// unrecognized value is never an error.
pub fn parse_booleany(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// A resolved proxy configuration.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub url: Url,
    /// True when the value came from a deprecated source.
    pub is_deprecated: bool,
}

/// Settings for the broker as found in the environment and Git
/// configuration, scoped to one remote URL.
#[derive(Clone)]
pub struct Settings {
    env: Arc<dyn Environment>,
    git: Arc<dyn GitConfiguration>,
    remote_url: Option<Url>,
}

impl Settings {
    pub fn new(env: Arc<dyn Environment>, git: Arc<dyn GitConfiguration>) -> Self {
        Self {
            env,
            git,
            remote_url: None,
        }
    }

    /// Scope subsequent lookups to a remote URL.
    pub fn with_remote_url(mut self, url: Url) -> Self {
        self.remote_url = Some(url);
        self
    }

    pub fn remote_url(&self) -> Option<&Url> {
        self.remote_url.as_ref()
    }

    /// All values for a setting, in precedence order. The first value wins
    /// for single-value semantics; multi-candidate consumers (such as proxy
    /// resolution) iterate the full sequence.
    pub fn setting_values(
        &self,
        env_var: Option<&str>,
        section: Option<&str>,
        property: Option<&str>,
    ) -> Vec<String> {
        let mut values = Vec::new();

        if let Some(name) = env_var {
            if let Some(value) = self.env.get(name) {
                values.push(value);
            }
        }

        if let (Some(section), Some(property)) = (section, property) {
            if let Some(url) = &self.remote_url {
                for scoped in scope::config_scopes(url) {
                    // Scheme-qualified entry first: it is more specific.
                    if let Some(value) = self.git.try_get_scoped(section, &scoped, property) {
                        values.push(value);
                    }
                    let bare = scope::without_scheme(&scoped);
                    if let Some(value) = self.git.try_get_scoped(section, bare, property) {
                        values.push(value);
                    }
                }
            }

            if let Some(value) = self.git.try_get(section, property) {
                values.push(value);
            }
        }

        values
    }

    /// The highest-precedence value for a setting, if any.
    pub fn try_get_setting(
        &self,
        env_var: Option<&str>,
        section: Option<&str>,
        property: Option<&str>,
    ) -> Option<String> {
        self.setting_values(env_var, section, property)
            .into_iter()
            .next()
    }

    fn get_bool_or(
        &self,
        env_var: Option<&str>,
        section: Option<&str>,
        property: Option<&str>,
        default: bool,
    ) -> bool {
        self.try_get_setting(env_var, section, property)
            .and_then(|value| parse_booleany(&value))
            .unwrap_or(default)
    }

    /// The host provider configured to override auto-detection, if any.
    pub fn provider_override(&self) -> Option<String> {
        self.try_get_setting(
            Some(envars::PROVIDER),
            Some(gitcfg::CREDENTIAL_SECTION),
            Some(gitcfg::PROVIDER),
        )
    }

    /// The legacy authority id configured to override auto-detection.
    pub fn legacy_authority_override(&self) -> Option<String> {
        self.try_get_setting(
            Some(envars::AUTHORITY),
            Some(gitcfg::CREDENTIAL_SECTION),
            Some(gitcfg::AUTHORITY),
        )
    }

    /// Whether any user interaction is permitted.
    pub fn is_interaction_allowed(&self) -> bool {
        self.get_bool_or(
            Some(envars::INTERACTIVE),
            Some(gitcfg::CREDENTIAL_SECTION),
            Some(gitcfg::INTERACTIVE),
            true,
        )
    }

    /// Whether prompting on the terminal is permitted.
    pub fn is_terminal_prompts_enabled(&self) -> bool {
        self.env
            .get(envars::GIT_TERMINAL_PROMPT)
            .and_then(|value| parse_booleany(&value))
            .unwrap_or(true)
    }

    pub fn is_debug_enabled(&self) -> bool {
        self.env
            .get(envars::DEBUG)
            .and_then(|value| parse_booleany(&value))
            .unwrap_or(false)
    }

    /// An explicit helper executable override. `Some("")` disables helpers.
    pub fn helper_override(&self) -> Option<String> {
        self.try_get_setting(
            Some(envars::HELPER),
            Some(gitcfg::CREDENTIAL_SECTION),
            Some(gitcfg::HELPER_TOOL),
        )
    }

    /// Whether TLS certificates should be verified.
    pub fn is_certificate_verification_enabled(&self) -> bool {
        // The environment variable is an inverted switch and wins outright.
        if let Some(value) = self.env.get(envars::GIT_SSL_NO_VERIFY) {
            return !parse_booleany(&value).unwrap_or(false);
        }
        self.get_bool_or(
            None,
            Some(gitcfg::HTTP_SECTION),
            Some(gitcfg::SSL_VERIFY),
            true,
        )
    }

    /// Resolve the proxy to use, if any.
    ///
    /// Several configuration mechanisms are supported, in order of
    /// preference:
    ///
    ///   1. broker Git configuration (deprecated):
    ///      `credential.httpsProxy`, `credential.httpProxy`
    ///   2. standard Git configuration: `http.proxy`
    ///   3. cURL environment variables: `HTTPS_PROXY`, `HTTP_PROXY`,
    ///      `ALL_PROXY`
    ///   4. broker environment variable (deprecated): `KEYBRIDGE_HTTP_PROXY`
    ///
    /// For HTTPS remotes the HTTPS variants are checked before the HTTP
    /// ones; for HTTP remotes only the HTTP variants apply. The first
    /// mechanism that yields a value parsing as an absolute URL wins.
    pub fn proxy_configuration(&self) -> Option<ProxyConfig> {
        let is_https = self
            .remote_url
            .as_ref()
            .is_some_and(|url| url.scheme().eq_ignore_ascii_case("https"));

        let first_url = |env_var: Option<&str>, section: Option<&str>, property: Option<&str>| {
            self.setting_values(env_var, section, property)
                .iter()
                .find_map(|value| Url::parse(value).ok())
        };

        let deprecated_config = (is_https)
            .then(|| {
                first_url(
                    None,
                    Some(gitcfg::CREDENTIAL_SECTION),
                    Some(gitcfg::HTTPS_PROXY),
                )
            })
            .flatten()
            .or_else(|| {
                first_url(
                    None,
                    Some(gitcfg::CREDENTIAL_SECTION),
                    Some(gitcfg::HTTP_PROXY),
                )
            });
        if let Some(url) = deprecated_config {
            tracing::warn!(
                "the credential.httpProxy/httpsProxy settings are deprecated; use http.proxy"
            );
            return Some(ProxyConfig {
                url,
                is_deprecated: true,
            });
        }

        if let Some(url) = first_url(None, Some(gitcfg::HTTP_SECTION), Some(gitcfg::PROXY)) {
            return Some(ProxyConfig {
                url,
                is_deprecated: false,
            });
        }

        let curl_proxy = (is_https)
            .then(|| first_url(Some(envars::CURL_HTTPS_PROXY), None, None))
            .flatten()
            .or_else(|| first_url(Some(envars::CURL_HTTP_PROXY), None, None))
            .or_else(|| first_url(Some(envars::CURL_ALL_PROXY), None, None));
        if let Some(url) = curl_proxy {
            return Some(ProxyConfig {
                url,
                is_deprecated: false,
            });
        }

        if let Some(url) = first_url(Some(envars::LEGACY_HTTP_PROXY), None, None) {
            tracing::warn!("the KEYBRIDGE_HTTP_PROXY variable is deprecated; use HTTPS_PROXY");
            return Some(ProxyConfig {
                url,
                is_deprecated: true,
            });
        }

        None
    }
}
