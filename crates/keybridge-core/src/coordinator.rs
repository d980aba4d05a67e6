//! Request-scoped authentication orchestration.
//!
//! The coordinator glues mode negotiation to the OAuth2 flow engine: it
//! selects an interactive prompt variant (helper process or terminal),
//! narrows the requested modes, and dispatches OAuth to whichever grant the
//! environment supports. It owns the HTTP transport and the cancellation
//! token for the lifetime of one request; there is no ambient global client.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use url::Url;

use crate::auth::helper::{self, HelperAuthenticator};
use crate::auth::terminal::{Terminal, TerminalAuthenticator};
use crate::auth::{
    AuthModes, Capabilities, InteractiveAuthenticator, PromptResult, narrow_modes,
};
use crate::credential::Credential;
use crate::error::{Error, Result};
use crate::oauth::transport::HttpTransport;
use crate::oauth::types::TokenResponse;
use crate::oauth::{Browser, OAuth2Client};
use crate::settings::Settings;

/// Outcome of a full authentication round.
#[derive(Debug)]
pub enum Authentication {
    /// Captured basic credentials; no OAuth2 flow was involved.
    Basic(Credential),
    /// A token produced by one of the OAuth2 grants.
    OAuth(TokenResponse),
}

pub struct AuthenticationCoordinator {
    transport: Arc<dyn HttpTransport>,
    terminal: Arc<dyn Terminal>,
    browser: Arc<dyn Browser>,
    capabilities: Capabilities,
    cancel: CancellationToken,
}

impl AuthenticationCoordinator {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        terminal: Arc<dyn Terminal>,
        browser: Arc<dyn Browser>,
    ) -> Self {
        Self {
            transport,
            terminal,
            browser,
            capabilities: Capabilities::detect(),
            cancel: CancellationToken::new(),
        }
    }

    /// Override the detected capabilities (tests, forced device flow).
    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Thread an external cancellation signal through every flow.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn transport(&self) -> Arc<dyn HttpTransport> {
        self.transport.clone()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Prompt for an authentication mode, narrowing the requested set
    /// against environment capabilities first.
    ///
    /// Fails with [`Error::InteractionDisabled`] before attempting any
    /// prompt path when interaction is switched off, or when no helper is
    /// available and terminal prompting is disabled.
    pub async fn prompt(
        &self,
        settings: &Settings,
        target: &Url,
        requested: AuthModes,
        device_code_supported: bool,
        enterprise_url: Option<Url>,
    ) -> Result<PromptResult> {
        if !settings.is_interaction_allowed() {
            return Err(Error::InteractionDisabled);
        }

        let capabilities = Capabilities {
            device_code_supported,
            ..self.capabilities
        };
        let modes = narrow_modes(requested, capabilities)?;

        let authenticator: Box<dyn InteractiveAuthenticator> = match helper::find_helper(settings)
        {
            Some(path) => {
                tracing::debug!(helper = %path.display(), "delegating prompt to helper");
                let mut helper = HelperAuthenticator::new(path);
                if let Some(url) = enterprise_url {
                    helper = helper.with_enterprise_url(url);
                }
                Box::new(helper)
            }
            None => {
                if !settings.is_terminal_prompts_enabled() {
                    return Err(Error::InteractionDisabled);
                }
                Box::new(TerminalAuthenticator::new(self.terminal.clone()))
            }
        };

        authenticator.prompt(target, modes).await
    }

    /// Drive whichever OAuth2 grant the environment supports: the browser
    /// flow when a desktop session exists, otherwise device-code when the
    /// target advertises support.
    pub async fn oauth_token(
        &self,
        settings: &Settings,
        client: &OAuth2Client,
        scopes: &[String],
    ) -> Result<TokenResponse> {
        if !settings.is_interaction_allowed() {
            return Err(Error::InteractionDisabled);
        }

        if self.capabilities.desktop_session {
            self.terminal
                .write_line("info: please complete authentication in your browser...");
            return client
                .authorization_code_flow(scopes, self.browser.as_ref(), &self.cancel)
                .await;
        }

        if client.supports_device_code() {
            if !settings.is_terminal_prompts_enabled() {
                return Err(Error::InteractionDisabled);
            }

            let device = client.device_authorization(scopes, &self.cancel).await?;
            self.terminal.write_line(&format!(
                "To complete authentication please visit {} and enter the code: {}",
                device.verification_uri, device.user_code
            ));
            return client.device_token(&device, &self.cancel).await;
        }

        Err(Error::UnsupportedAuthenticationMode(
            "OAuth requires an interactive desktop session or a target that supports \
             the device authorization grant"
                .to_string(),
        ))
    }

    /// Full round: negotiate a mode, then produce a credential or token.
    pub async fn authenticate(
        &self,
        settings: &Settings,
        target: &Url,
        requested: AuthModes,
        client: &OAuth2Client,
        scopes: &[String],
        enterprise_url: Option<Url>,
    ) -> Result<Authentication> {
        let prompt = self
            .prompt(
                settings,
                target,
                requested,
                client.supports_device_code(),
                enterprise_url,
            )
            .await?;

        match prompt {
            PromptResult::Basic(credential) => Ok(Authentication::Basic(credential)),
            PromptResult::OAuth => {
                let token = self.oauth_token(settings, client, scopes).await?;
                Ok(Authentication::OAuth(token))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::MemoryConfiguration;
    use crate::oauth::transport::MockTransport;
    use crate::test_support::{RecordingBrowser, ScriptedTerminal, StaticEnvironment};

    fn coordinator(
        transport: Arc<MockTransport>,
        terminal: Arc<ScriptedTerminal>,
        capabilities: Capabilities,
    ) -> AuthenticationCoordinator {
        AuthenticationCoordinator::new(transport, terminal, Arc::new(RecordingBrowser::new()))
            .with_capabilities(capabilities)
    }

    fn settings(env: &[(&str, &str)]) -> Settings {
        Settings::new(
            Arc::new(StaticEnvironment::from_pairs(env)),
            Arc::new(MemoryConfiguration::new()),
        )
    }

    fn no_desktop() -> Capabilities {
        Capabilities {
            desktop_session: false,
            device_code_supported: false,
        }
    }

    fn target() -> Url {
        Url::parse("https://example.com").unwrap()
    }

    fn oauth_client(transport: Arc<MockTransport>) -> OAuth2Client {
        OAuth2Client::new(
            Url::parse("https://auth.example.com/authorize").unwrap(),
            Url::parse("https://auth.example.com/token").unwrap(),
            "client-123",
            transport,
        )
    }

    #[tokio::test]
    async fn interaction_disabled_fails_before_any_prompt() {
        let transport = Arc::new(MockTransport::new());
        let terminal = Arc::new(ScriptedTerminal::with_responses(&["alice", "pw"]));
        let coordinator = coordinator(transport, terminal.clone(), no_desktop());

        let settings = settings(&[("KEYBRIDGE_INTERACTIVE", "0")]);
        let result = coordinator
            .prompt(&settings, &target(), AuthModes::BASIC, false, None)
            .await;

        assert!(matches!(result, Err(Error::InteractionDisabled)));
        assert!(terminal.transcript().is_empty());
    }

    #[tokio::test]
    async fn terminal_prompts_disabled_without_helper_is_interaction_disabled() {
        let transport = Arc::new(MockTransport::new());
        let terminal = Arc::new(ScriptedTerminal::with_responses(&[]));
        let coordinator = coordinator(transport, terminal, no_desktop());

        let settings = settings(&[("GIT_TERMINAL_PROMPT", "0")]);
        let result = coordinator
            .prompt(&settings, &target(), AuthModes::BASIC, false, None)
            .await;

        assert!(matches!(result, Err(Error::InteractionDisabled)));
    }

    #[tokio::test]
    async fn narrowing_happens_before_prompting() {
        let transport = Arc::new(MockTransport::new());
        let terminal = Arc::new(ScriptedTerminal::with_responses(&[]));
        let coordinator = coordinator(transport, terminal, no_desktop());

        let settings = settings(&[]);
        let result = coordinator
            .prompt(&settings, &target(), AuthModes::OAUTH, false, None)
            .await;

        assert!(matches!(result, Err(Error::InvalidAuthenticationModes)));
    }

    #[tokio::test]
    async fn basic_and_oauth_without_capabilities_narrows_to_basic_prompt() {
        let transport = Arc::new(MockTransport::new());
        let terminal = Arc::new(ScriptedTerminal::with_responses(&["alice", "pw"]));
        let coordinator = coordinator(transport, terminal, no_desktop());

        let settings = settings(&[]);
        let result = coordinator
            .prompt(&settings, &target(), AuthModes::ALL, false, None)
            .await
            .unwrap();

        // Basic is the only mode left, so no menu is shown.
        match result {
            PromptResult::Basic(credential) => assert_eq!(credential.username, "alice"),
            PromptResult::OAuth => panic!("expected basic credentials"),
        }
    }

    #[tokio::test]
    async fn oauth_without_desktop_or_device_support_is_unsupported() {
        let transport = Arc::new(MockTransport::new());
        let terminal = Arc::new(ScriptedTerminal::with_responses(&[]));
        let coordinator = coordinator(transport.clone(), terminal, no_desktop());

        let settings = settings(&[]);
        let client = oauth_client(transport);
        let result = coordinator.oauth_token(&settings, &client, &[]).await;

        assert!(matches!(
            result,
            Err(Error::UnsupportedAuthenticationMode(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn oauth_without_desktop_uses_device_flow() {
        let transport = Arc::new(MockTransport::new());
        transport.push_json(
            200,
            &serde_json::json!({
                "device_code": "dc-1",
                "user_code": "ABCD-EFGH",
                "verification_uri": "https://auth.example.com/activate",
                "expires_in": 900,
                "interval": 1
            }),
        );
        transport.push_json(
            200,
            &serde_json::json!({"access_token": "tok", "token_type": "bearer"}),
        );

        let terminal = Arc::new(ScriptedTerminal::with_responses(&[]));
        let coordinator = coordinator(transport.clone(), terminal.clone(), no_desktop());

        let settings = settings(&[]);
        let client = oauth_client(transport)
            .with_device_endpoint(Url::parse("https://auth.example.com/device").unwrap());
        let token = coordinator
            .oauth_token(&settings, &client, &["repo".to_string()])
            .await
            .unwrap();

        assert_eq!(token.access_token, "tok");
        // The user was shown where to go and which code to enter.
        let transcript = terminal.transcript().join("\n");
        assert!(transcript.contains("https://auth.example.com/activate"));
        assert!(transcript.contains("ABCD-EFGH"));
    }
}
