//! GitHub host provider.
//!
//! Supports github.com and gist.github.com. Allowed modes come from
//! configuration (basic and OAuth by default); basic returns the prompted
//! credential directly, OAuth drives the flow engine and wraps the access
//! token as a credential.

use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

use crate::auth::AuthModes;
use crate::coordinator::{Authentication, AuthenticationCoordinator};
use crate::credential::Credential;
use crate::error::{Error, Result};
use crate::input::InputRequest;
use crate::oauth::OAuth2Client;
use crate::providers::is_http_like;
use crate::registry::{HostProvider, RequestContext};
use crate::settings::Settings;

pub const GITHUB_HOST: &str = "github.com";
pub const GIST_HOST: &str = "gist.github.com";

/// Username paired with an OAuth access token.
const OAUTH_TOKEN_USERNAME: &str = "oauth2";

const OAUTH_CLIENT_ID: &str = "b9a0d2c41e7f5a83d6b1";
const OAUTH_CLIENT_SECRET: &str = "4c1f9e2ab7d85306f41e9c2d7a0b8e635f92d1c4";
const OAUTH_SCOPES: &[&str] = &["repo", "gist", "workflow"];

mod envars {
    pub const AUTH_MODES: &str = "KEYBRIDGE_GITHUB_AUTHMODES";
    pub const DEV_CLIENT_ID: &str = "KEYBRIDGE_DEV_GITHUB_CLIENTID";
    pub const DEV_CLIENT_SECRET: &str = "KEYBRIDGE_DEV_GITHUB_CLIENTSECRET";
}

mod gitcfg {
    pub const AUTH_MODES: &str = "gitHubAuthModes";
    pub const DEV_CLIENT_ID: &str = "gitHubDevClientId";
    pub const DEV_CLIENT_SECRET: &str = "gitHubDevClientSecret";
}

pub struct GitHubProvider {
    coordinator: Arc<AuthenticationCoordinator>,
}

impl GitHubProvider {
    pub fn new(coordinator: Arc<AuthenticationCoordinator>) -> Self {
        Self { coordinator }
    }

    fn is_github_dot_com(host: &str) -> bool {
        host.eq_ignore_ascii_case(GITHUB_HOST) || host.eq_ignore_ascii_case(GIST_HOST)
    }

    /// Allowed modes from configuration; unparseable values fall back to
    /// the default rather than failing the request.
    fn allowed_modes(settings: &Settings) -> AuthModes {
        let Some(raw) = settings.try_get_setting(
            Some(envars::AUTH_MODES),
            Some(crate::settings::gitcfg::CREDENTIAL_SECTION),
            Some(gitcfg::AUTH_MODES),
        ) else {
            return AuthModes::ALL;
        };

        match raw.parse::<AuthModes>() {
            Ok(modes) if !modes.is_empty() => modes,
            _ => {
                tracing::warn!(value = %raw, "invalid authentication mode list; using defaults");
                AuthModes::ALL
            }
        }
    }

    fn oauth_client(&self, ctx: &RequestContext) -> Result<OAuth2Client> {
        let client_id = ctx
            .settings
            .try_get_setting(
                Some(envars::DEV_CLIENT_ID),
                Some(crate::settings::gitcfg::CREDENTIAL_SECTION),
                Some(gitcfg::DEV_CLIENT_ID),
            )
            .unwrap_or_else(|| OAUTH_CLIENT_ID.to_string());
        let client_secret = ctx
            .settings
            .try_get_setting(
                Some(envars::DEV_CLIENT_SECRET),
                Some(crate::settings::gitcfg::CREDENTIAL_SECTION),
                Some(gitcfg::DEV_CLIENT_SECRET),
            )
            .unwrap_or_else(|| OAUTH_CLIENT_SECRET.to_string());

        let base = format!("https://{GITHUB_HOST}");
        let endpoint = |path: &str| {
            Url::parse(&format!("{base}{path}"))
                .map_err(|e| Error::InvalidInput(format!("invalid endpoint: {e}")))
        };

        Ok(OAuth2Client::new(
            endpoint("/login/oauth/authorize")?,
            endpoint("/login/oauth/access_token")?,
            client_id,
            self.coordinator.transport(),
        )
        .with_client_secret(client_secret)
        .with_device_endpoint(endpoint("/login/device/code")?))
    }
}

#[async_trait]
impl HostProvider for GitHubProvider {
    fn id(&self) -> &'static str {
        "github"
    }

    fn name(&self) -> &'static str {
        "GitHub"
    }

    fn supported_authorities(&self) -> &'static [&'static str] {
        &["github"]
    }

    fn is_supported(&self, input: &InputRequest) -> bool {
        is_http_like(input)
            && Self::is_github_dot_com(input.host.as_deref().unwrap_or_default())
    }

    async fn generate_credential(&self, ctx: &RequestContext) -> Result<Credential> {
        let modes = Self::allowed_modes(&ctx.settings);
        let client = self.oauth_client(ctx)?;
        let scopes: Vec<String> = OAUTH_SCOPES.iter().map(ToString::to_string).collect();

        let authentication = self
            .coordinator
            .authenticate(
                &ctx.settings,
                &ctx.remote_url,
                modes,
                &client,
                &scopes,
                None,
            )
            .await?;

        match authentication {
            Authentication::Basic(credential) => Ok(credential),
            Authentication::OAuth(token) => Ok(Credential::new(
                OAUTH_TOKEN_USERNAME,
                token.access_token,
            )),
        }
    }
}
