//! OAuth2 flow engine.
//!
//! Two grant flows share one client configuration: authorization-code with a
//! local browser redirect (RFC 6749 §4.1 + PKCE), and device-code (RFC
//! 8628). Each flow invocation is single-use: state nonce, PKCE verifier,
//! and device code are confined to one invocation and never reused.

pub mod callback_server;
pub mod device;
pub mod pkce;
pub mod transport;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::{Error, OAuth2ServerError, Result};
use crate::oauth::callback_server::CallbackListener;
use crate::oauth::transport::{HttpRequest, HttpResponse, HttpTransport};
use crate::oauth::types::{TokenResponse, WireError};

/// How long to wait for the user to complete authorization in the browser.
const AUTHORIZATION_TIMEOUT: Duration = Duration::from_secs(300);

/// Launches the system web browser. External collaborator contract.
pub trait Browser: Send + Sync {
    fn open(&self, url: &Url) -> Result<()>;
}

/// The user's default browser.
pub struct SystemBrowser;

impl Browser for SystemBrowser {
    fn open(&self, url: &Url) -> Result<()> {
        open::that(url.as_str())?;
        Ok(())
    }
}

/// Per-target OAuth2 endpoint and client configuration.
///
/// Long-lived per target host and stateless across flow invocations; the
/// HTTP transport is injected by the coordinator.
#[derive(Clone)]
pub struct OAuth2Client {
    authorization_endpoint: Url,
    token_endpoint: Url,
    device_authorization_endpoint: Option<Url>,
    client_id: String,
    client_secret: Option<String>,
    transport: Arc<dyn HttpTransport>,
}

impl OAuth2Client {
    pub fn new(
        authorization_endpoint: Url,
        token_endpoint: Url,
        client_id: impl Into<String>,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        Self {
            authorization_endpoint,
            token_endpoint,
            device_authorization_endpoint: None,
            client_id: client_id.into(),
            client_secret: None,
            transport,
        }
    }

    /// Declare device authorization grant support for this target.
    pub fn with_device_endpoint(mut self, endpoint: Url) -> Self {
        self.device_authorization_endpoint = Some(endpoint);
        self
    }

    /// Set a client secret (confidential clients only).
    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Device-code support is a static per-target capability: the presence
    /// of a device authorization endpoint.
    pub fn supports_device_code(&self) -> bool {
        self.device_authorization_endpoint.is_some()
    }

    pub(crate) fn device_endpoint(&self) -> Result<Url> {
        self.device_authorization_endpoint.clone().ok_or_else(|| {
            Error::UnsupportedAuthenticationMode(
                "the target does not support the device authorization grant".to_string(),
            )
        })
    }

    /// Run the authorization-code grant end to end.
    ///
    /// Generates a fresh state nonce and PKCE pair, binds a loopback
    /// redirect listener, opens the browser, waits (cancellable, bounded)
    /// for the callback, validates the returned state exactly, and
    /// exchanges the code. The listener is released on every exit path.
    pub async fn authorization_code_flow(
        &self,
        scopes: &[String],
        browser: &dyn Browser,
        cancel: &CancellationToken,
    ) -> Result<TokenResponse> {
        let pkce = pkce::generate_pkce();
        let state = pkce::generate_state();

        let mut listener = CallbackListener::bind(state.clone()).await?;
        let redirect_uri = listener.redirect_uri();

        let authorization_url =
            self.authorization_url(scopes, &redirect_uri, &state, &pkce.challenge)?;
        browser.open(&authorization_url)?;
        tracing::debug!(port = listener.port(), "waiting for authorization redirect");

        let callback = tokio::select! {
            result = listener.recv() => result?,
            () = cancel.cancelled() => return Err(Error::Cancelled),
            () = tokio::time::sleep(AUTHORIZATION_TIMEOUT) => {
                tracing::debug!("timed out waiting for the authorization redirect");
                return Err(Error::Cancelled);
            }
        };
        drop(listener);

        self.exchange_authorization_code(&callback.code, &redirect_uri, &pkce.verifier, cancel)
            .await
    }

    /// Build the authorization endpoint URL for one flow invocation.
    pub fn authorization_url(
        &self,
        scopes: &[String],
        redirect_uri: &Url,
        state: &str,
        code_challenge: &str,
    ) -> Result<Url> {
        let query = serde_urlencoded::to_string([
            ("response_type", "code"),
            ("client_id", self.client_id.as_str()),
            ("redirect_uri", redirect_uri.as_str()),
            ("scope", scopes.join(" ").as_str()),
            ("state", state),
            ("code_challenge", code_challenge),
            ("code_challenge_method", "S256"),
        ])
        .map_err(|e| Error::Protocol(format!("cannot encode authorization query: {e}")))?;

        Url::parse(&format!("{}?{query}", self.authorization_endpoint))
            .map_err(|e| Error::Protocol(format!("cannot build authorization URL: {e}")))
    }

    /// Exchange an authorization code for a token (RFC 6749 §4.1.3).
    pub async fn exchange_authorization_code(
        &self,
        code: &str,
        redirect_uri: &Url,
        code_verifier: &str,
        cancel: &CancellationToken,
    ) -> Result<TokenResponse> {
        let mut form = vec![
            ("grant_type".to_string(), "authorization_code".to_string()),
            ("code".to_string(), code.to_string()),
            ("redirect_uri".to_string(), redirect_uri.to_string()),
            ("client_id".to_string(), self.client_id.clone()),
            ("code_verifier".to_string(), code_verifier.to_string()),
        ];
        self.append_client_secret(&mut form);

        let response = self.post(self.token_endpoint.clone(), form, cancel).await?;
        parse_token_response(&response)
    }

    /// Exchange a refresh token for a new access token (RFC 6749 §6).
    pub async fn refresh_token(
        &self,
        refresh_token: &str,
        cancel: &CancellationToken,
    ) -> Result<TokenResponse> {
        let mut form = vec![
            ("grant_type".to_string(), "refresh_token".to_string()),
            ("refresh_token".to_string(), refresh_token.to_string()),
            ("client_id".to_string(), self.client_id.clone()),
        ];
        self.append_client_secret(&mut form);

        let response = self.post(self.token_endpoint.clone(), form, cancel).await?;
        parse_token_response(&response)
    }

    pub(crate) fn append_client_secret(&self, form: &mut Vec<(String, String)>) {
        if let Some(secret) = &self.client_secret {
            form.push(("client_secret".to_string(), secret.clone()));
        }
    }

    pub(crate) async fn post(
        &self,
        url: Url,
        form: Vec<(String, String)>,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse> {
        let request = HttpRequest {
            url,
            headers: Vec::new(),
            form,
        };
        tokio::select! {
            result = self.transport.post_form(request) => result,
            () = cancel.cancelled() => Err(Error::Cancelled),
        }
    }

    pub(crate) fn token_endpoint(&self) -> &Url {
        &self.token_endpoint
    }
}

/// Parse a token endpoint response, mapping non-2xx to the server's error.
pub(crate) fn parse_token_response(response: &HttpResponse) -> Result<TokenResponse> {
    if (200..300).contains(&response.status) {
        serde_json::from_str(&response.body)
            .map_err(|e| Error::Protocol(format!("malformed token response: {e}")))
    } else {
        Err(server_error(response))
    }
}

/// Map an error response body to [`Error::OAuth2`], falling back to a
/// protocol error when the body is not a recognizable OAuth2 error.
pub(crate) fn server_error(response: &HttpResponse) -> Error {
    match serde_json::from_str::<WireError>(&response.body) {
        Ok(wire) => Error::OAuth2(OAuth2ServerError {
            error: wire.error,
            description: wire.error_description,
        }),
        Err(_) => Error::Protocol(format!(
            "endpoint returned status {} with an unrecognized body",
            response.status
        )),
    }
}
