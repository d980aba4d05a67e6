//! Terminal-backed interactive authentication.
//!
//! Terminal I/O and menu rendering live outside the core; this module only
//! defines the collaborator contract and the prompt logic on top of it.

use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

use crate::auth::{AuthMode, AuthModes, InteractiveAuthenticator, PromptResult};
use crate::credential::Credential;
use crate::error::{Error, Result};

/// Terminal I/O collaborator.
pub trait Terminal: Send + Sync {
    /// Write an informational line (not part of the credential output).
    fn write_line(&self, message: &str);

    /// Prompt for a line of input.
    fn prompt(&self, label: &str) -> Result<String>;

    /// Prompt for a secret (input not echoed).
    fn prompt_secret(&self, label: &str) -> Result<String>;
}

/// Interactive authenticator that prompts on the terminal.
pub struct TerminalAuthenticator {
    terminal: Arc<dyn Terminal>,
}

impl TerminalAuthenticator {
    pub fn new(terminal: Arc<dyn Terminal>) -> Self {
        Self { terminal }
    }

    /// Resolve a single mode from the remaining set, asking the user when
    /// more than one remains.
    fn choose_mode(&self, target: &Url, modes: AuthModes) -> Result<AuthMode> {
        if let Some(mode) = modes.as_single() {
            return Ok(mode);
        }

        self.terminal
            .write_line(&format!("Select an authentication method for '{target}':"));
        self.terminal.write_line("  1. Web browser");
        self.terminal.write_line("  2. Username/password");

        let choice = self.terminal.prompt("option (default 1)")?;
        match choice.trim() {
            "" | "1" => Ok(AuthMode::OAuth),
            "2" => Ok(AuthMode::Basic),
            other => Err(Error::InvalidInput(format!(
                "unrecognized menu option '{other}'"
            ))),
        }
    }
}

#[async_trait]
impl InteractiveAuthenticator for TerminalAuthenticator {
    async fn prompt(&self, target: &Url, modes: AuthModes) -> Result<PromptResult> {
        // Resolve one mode first, then dispatch exactly once on it.
        let mode = self.choose_mode(target, modes)?;

        match mode {
            AuthMode::OAuth => Ok(PromptResult::OAuth),
            AuthMode::Basic => {
                self.terminal
                    .write_line(&format!("Enter credentials for '{target}'..."));
                let username = self.terminal.prompt("Username")?;
                let password = self.terminal.prompt_secret("Password")?;
                Ok(PromptResult::Basic(Credential::new(username, password)))
            }
        }
    }

    async fn two_factor_code(&self, _target: &Url, via_sms: bool) -> Result<String> {
        self.terminal
            .write_line("Two-factor authentication is enabled and an authentication code is required.");
        if via_sms {
            self.terminal
                .write_line("An SMS containing the authentication code has been sent to your registered device.");
        } else {
            self.terminal
                .write_line("Use your registered authentication app to generate an authentication code.");
        }
        self.terminal.prompt("Authentication code")
    }
}
