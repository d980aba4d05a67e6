//! Authentication mode negotiation.

pub mod helper;
pub mod terminal;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use url::Url;

use crate::credential::Credential;
use crate::error::{Error, Result};

/// One authentication method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    Basic,
    OAuth,
}

/// A set of allowed authentication modes.
///
/// Explicit set operations instead of bit arithmetic; the empty set is an
/// error once capability narrowing has been applied, never a valid outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AuthModes {
    basic: bool,
    oauth: bool,
}

impl AuthModes {
    pub const NONE: Self = Self {
        basic: false,
        oauth: false,
    };
    pub const BASIC: Self = Self {
        basic: true,
        oauth: false,
    };
    pub const OAUTH: Self = Self {
        basic: false,
        oauth: true,
    };
    pub const ALL: Self = Self {
        basic: true,
        oauth: true,
    };

    pub fn contains(self, mode: AuthMode) -> bool {
        match mode {
            AuthMode::Basic => self.basic,
            AuthMode::OAuth => self.oauth,
        }
    }

    pub fn union(self, other: Self) -> Self {
        Self {
            basic: self.basic || other.basic,
            oauth: self.oauth || other.oauth,
        }
    }

    pub fn intersect(self, other: Self) -> Self {
        Self {
            basic: self.basic && other.basic,
            oauth: self.oauth && other.oauth,
        }
    }

    pub fn without(self, mode: AuthMode) -> Self {
        match mode {
            AuthMode::Basic => Self {
                basic: false,
                ..self
            },
            AuthMode::OAuth => Self {
                oauth: false,
                ..self
            },
        }
    }

    pub fn is_empty(self) -> bool {
        !self.basic && !self.oauth
    }

    /// The single remaining mode, if exactly one remains.
    pub fn as_single(self) -> Option<AuthMode> {
        match (self.basic, self.oauth) {
            (true, false) => Some(AuthMode::Basic),
            (false, true) => Some(AuthMode::OAuth),
            _ => None,
        }
    }
}

impl fmt::Display for AuthModes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.basic, self.oauth) {
            (false, false) => write!(f, "none"),
            (true, false) => write!(f, "basic"),
            (false, true) => write!(f, "oauth"),
            (true, true) => write!(f, "basic, oauth"),
        }
    }
}

impl FromStr for AuthModes {
    type Err = Error;

    /// Parse a comma- or whitespace-separated mode list, e.g. `basic,oauth`.
    fn from_str(s: &str) -> Result<Self> {
        let mut modes = Self::NONE;
        for token in s.split([',', ' ']).filter(|t| !t.is_empty()) {
            match token.to_ascii_lowercase().as_str() {
                "basic" => modes = modes.union(Self::BASIC),
                "oauth" => modes = modes.union(Self::OAUTH),
                "none" => {}
                other => {
                    return Err(Error::InvalidInput(format!(
                        "unknown authentication mode '{other}'"
                    )));
                }
            }
        }
        Ok(modes)
    }
}

/// Environment capabilities that constrain mode negotiation.
#[derive(Debug, Clone, Copy)]
pub struct Capabilities {
    /// An interactive desktop session (browser launch possible) is present.
    pub desktop_session: bool,
    /// The target's OAuth stack supports the device authorization grant.
    pub device_code_supported: bool,
}

impl Capabilities {
    /// Detect the ambient desktop capability. Device-code support is a
    /// per-target flag and is filled in by the coordinator.
    pub fn detect() -> Self {
        Self {
            desktop_session: is_desktop_session(),
            device_code_supported: false,
        }
    }
}

#[cfg(target_os = "linux")]
fn is_desktop_session() -> bool {
    std::env::var_os("DISPLAY").is_some() || std::env::var_os("WAYLAND_DISPLAY").is_some()
}

#[cfg(not(target_os = "linux"))]
fn is_desktop_session() -> bool {
    true
}

/// Narrow the requested modes against environment capabilities.
///
/// OAuth requires either a desktop session (browser redirect) or a target
/// that supports the device authorization grant; without both it is dropped.
/// An empty result is an error, not a valid outcome.
pub fn narrow_modes(requested: AuthModes, capabilities: Capabilities) -> Result<AuthModes> {
    let mut modes = requested;

    if modes.contains(AuthMode::OAuth)
        && !capabilities.desktop_session
        && !capabilities.device_code_supported
    {
        tracing::debug!(
            "dropping OAuth: no interactive desktop session and the target \
             does not support the device authorization grant"
        );
        modes = modes.without(AuthMode::OAuth);
    }

    if modes.is_empty() {
        return Err(Error::InvalidAuthenticationModes);
    }

    Ok(modes)
}

/// Result of an interactive mode prompt.
#[derive(Debug)]
pub enum PromptResult {
    /// The user chose (and supplied) basic credentials.
    Basic(Credential),
    /// The user chose OAuth; a flow still has to run.
    OAuth,
}

/// Interactive prompting capability with two variants: an external helper
/// process, or terminal prompting. The coordinator selects a variant once;
/// flow logic never branches on helper presence.
#[async_trait]
pub trait InteractiveAuthenticator: Send + Sync {
    /// Prompt for an authentication mode (and basic credentials if chosen).
    async fn prompt(&self, target: &Url, modes: AuthModes) -> Result<PromptResult>;

    /// Prompt for a two-factor authentication code.
    async fn two_factor_code(&self, target: &Url, via_sms: bool) -> Result<String>;
}
