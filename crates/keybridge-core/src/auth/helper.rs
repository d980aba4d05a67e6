//! External helper-process-backed interactive authentication.
//!
//! The helper speaks a line-oriented protocol over stdio: it is invoked with
//! a request verb (`prompt`, `2fa`, `store`, `erase`) plus flags, and
//! answers with `key=value` lines on stdout. A response missing a required
//! field is a protocol violation, not a user error.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use url::Url;

use crate::auth::{AuthMode, AuthModes, InteractiveAuthenticator, PromptResult};
use crate::credential::Credential;
use crate::error::{Error, Result};
use crate::settings::Settings;

/// Helper executable searched for next to the broker binary when no
/// explicit override is configured.
const DEFAULT_HELPER_NAME: &str = "keybridge-prompt";

/// Locate the helper executable, if any.
///
/// An explicit setting wins; an empty value disables helpers entirely.
/// Otherwise the default helper name is looked up next to the current
/// executable. Absence is a capability gap, not an error.
pub fn find_helper(settings: &Settings) -> Option<PathBuf> {
    if let Some(configured) = settings.helper_override() {
        let trimmed = configured.trim();
        if trimmed.is_empty() {
            tracing::debug!("helper executable disabled by configuration");
            return None;
        }
        let path = PathBuf::from(trimmed);
        if path.is_file() {
            return Some(path);
        }
        tracing::warn!(path = %path.display(), "configured helper executable not found");
        return None;
    }

    let exe = std::env::current_exe().ok()?;
    let directory = exe.parent()?;
    let mut name = DEFAULT_HELPER_NAME.to_string();
    if cfg!(windows) {
        name.push_str(".exe");
    }
    let candidate = directory.join(name);
    if candidate.is_file() {
        Some(candidate)
    } else {
        tracing::debug!(path = %candidate.display(), "no helper executable found");
        None
    }
}

/// Interactive authenticator that delegates prompting to a helper process.
pub struct HelperAuthenticator {
    path: PathBuf,
    enterprise_url: Option<Url>,
}

impl HelperAuthenticator {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            enterprise_url: None,
        }
    }

    /// Pass an enterprise URL so the helper can show which instance the
    /// prompt is for.
    pub fn with_enterprise_url(mut self, url: Url) -> Self {
        self.enterprise_url = Some(url);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn invoke(&self, args: &[String]) -> Result<BTreeMap<String, String>> {
        tracing::debug!(helper = %self.path.display(), verb = %args[0], "invoking helper");

        let output = tokio::process::Command::new(&self.path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .output()
            .await?;

        if !output.status.success() {
            return Err(Error::Protocol(format!(
                "helper '{}' exited with {}",
                self.path.display(),
                output.status
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut response = BTreeMap::new();
        for line in stdout.lines() {
            let line = line.trim_end();
            if line.is_empty() {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                return Err(Error::Protocol(format!(
                    "malformed helper response line '{line}'"
                )));
            };
            response.insert(key.to_string(), value.to_string());
        }
        Ok(response)
    }

    fn required<'a>(
        response: &'a BTreeMap<String, String>,
        field: &str,
    ) -> Result<&'a String> {
        response
            .get(field)
            .ok_or_else(|| Error::Protocol(format!("helper response is missing '{field}'")))
    }
}

#[async_trait]
impl InteractiveAuthenticator for HelperAuthenticator {
    async fn prompt(&self, _target: &Url, modes: AuthModes) -> Result<PromptResult> {
        let mut args = vec!["prompt".to_string()];
        if modes.contains(AuthMode::Basic) {
            args.push("--basic".to_string());
        }
        if modes.contains(AuthMode::OAuth) {
            args.push("--oauth".to_string());
        }
        if let Some(url) = &self.enterprise_url {
            args.push("--enterprise-url".to_string());
            args.push(url.to_string());
        }

        let response = self.invoke(&args).await?;
        let mode = Self::required(&response, "mode")?;

        match mode.to_ascii_lowercase().as_str() {
            "oauth" => Ok(PromptResult::OAuth),
            "basic" => {
                let username = Self::required(&response, "username")?;
                let password = Self::required(&response, "password")?;
                Ok(PromptResult::Basic(Credential::new(
                    username.clone(),
                    password.clone(),
                )))
            }
            other => Err(Error::Protocol(format!(
                "helper returned unknown mode '{other}'"
            ))),
        }
    }

    async fn two_factor_code(&self, _target: &Url, _via_sms: bool) -> Result<String> {
        let response = self.invoke(&["2fa".to_string()]).await?;
        Ok(Self::required(&response, "code")?.clone())
    }
}
