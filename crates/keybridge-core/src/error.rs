use std::fmt;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// An authorization or token error reported by the OAuth2 server,
/// carrying the provider's error code (RFC 6749 §5.2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuth2ServerError {
    pub error: String,
    pub description: Option<String>,
}

impl fmt::Display for OAuth2ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OAuth2 server error '{}'", self.error)?;
        if let Some(description) = &self.description {
            write!(f, ": {description}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("no credential provider matches the remote URL")]
    NoProviderFound,

    #[error("no credential provider is registered with id '{0}'")]
    ProviderNotFound(String),

    #[error("user interaction is disabled; cannot prompt for credentials")]
    InteractionDisabled,

    #[error("at least one authentication mode must remain after negotiation")]
    InvalidAuthenticationModes,

    #[error("no usable authentication mode: {0}")]
    UnsupportedAuthenticationMode(String),

    /// A collaborator (helper process or OAuth server) violated its response
    /// contract, including a state-nonce mismatch on the redirect callback.
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("{0}")]
    OAuth2(OAuth2ServerError),

    #[error("the device authorization grant expired before it was approved")]
    Expired,

    #[error("operation cancelled")]
    Cancelled,

    #[error("credential store error: {0}")]
    Store(String),

    #[error("git configuration error: {0}")]
    Git(String),

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
