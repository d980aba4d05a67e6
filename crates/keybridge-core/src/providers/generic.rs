//! Catch-all provider for any HTTP(S) remote.
//!
//! Interactive basic prompting only. Must be registered last: its support
//! predicate matches every HTTP(S) request.

use std::sync::Arc;

use async_trait::async_trait;

use crate::auth::{AuthModes, PromptResult};
use crate::coordinator::AuthenticationCoordinator;
use crate::credential::Credential;
use crate::error::{Error, Result};
use crate::input::InputRequest;
use crate::providers::is_http_like;
use crate::registry::{HostProvider, RequestContext};

pub struct GenericProvider {
    coordinator: Arc<AuthenticationCoordinator>,
}

impl GenericProvider {
    pub fn new(coordinator: Arc<AuthenticationCoordinator>) -> Self {
        Self { coordinator }
    }
}

#[async_trait]
impl HostProvider for GenericProvider {
    fn id(&self) -> &'static str {
        "generic"
    }

    fn name(&self) -> &'static str {
        "Generic"
    }

    fn is_supported(&self, input: &InputRequest) -> bool {
        is_http_like(input)
    }

    async fn generate_credential(&self, ctx: &RequestContext) -> Result<Credential> {
        if ctx.remote_url.scheme().eq_ignore_ascii_case("http") {
            tracing::warn!(
                host = %ctx.remote_url.host_str().unwrap_or_default(),
                "credentials will be sent over unencrypted HTTP"
            );
        }

        let prompt = self
            .coordinator
            .prompt(&ctx.settings, &ctx.remote_url, AuthModes::BASIC, false, None)
            .await?;

        match prompt {
            PromptResult::Basic(credential) => Ok(credential),
            PromptResult::OAuth => Err(Error::UnsupportedAuthenticationMode(
                "this remote only supports basic authentication".to_string(),
            )),
        }
    }
}
