//! Host provider registration and resolution.
//!
//! The registry maps an incoming request to exactly one backend: an explicit
//! override wins, then the deprecated authority override, then the first
//! registered provider whose support predicate matches.

use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

use crate::credential::Credential;
use crate::error::{Error, Result};
use crate::git::GitConfiguration;
use crate::input::InputRequest;
use crate::settings::Settings;
use crate::store::CredentialStore;

/// Sentinel override value meaning "use auto-detection".
pub const PROVIDER_ID_AUTO: &str = "auto";
pub const AUTHORITY_ID_AUTO: &str = "auto";

/// Context assembled for a single credential request.
pub struct RequestContext {
    pub input: InputRequest,
    pub remote_url: Url,
    pub settings: Settings,
}

impl RequestContext {
    /// Validate the input and scope the settings to its remote URL.
    pub fn new(input: InputRequest, settings: Settings) -> Result<Self> {
        let remote_url = input.remote_url()?;
        let settings = settings.with_remote_url(remote_url.clone());
        Ok(Self {
            input,
            remote_url,
            settings,
        })
    }
}

/// A backend implementing host-specific credential acquisition.
#[async_trait]
pub trait HostProvider: Send + Sync {
    /// Stable identifier matched by the explicit override setting.
    fn id(&self) -> &'static str;

    /// Human-readable name for diagnostics.
    fn name(&self) -> &'static str;

    /// Deprecated authority ids this provider answers for.
    fn supported_authorities(&self) -> &'static [&'static str] {
        &[]
    }

    /// Pure predicate over the request: no network, no I/O. Connectivity
    /// and protocol problems are deferred to credential acquisition.
    fn is_supported(&self, input: &InputRequest) -> bool;

    /// Storage key for credentials belonging to this request.
    fn credential_key(&self, ctx: &RequestContext) -> String {
        format!("git:{}", ctx.remote_url)
    }

    /// Acquire a brand-new credential for the request.
    async fn generate_credential(&self, ctx: &RequestContext) -> Result<Credential>;

    /// Return the stored credential for the request, acquiring a new one on
    /// a store miss.
    async fn get_credential(
        &self,
        ctx: &RequestContext,
        store: &dyn CredentialStore,
    ) -> Result<Credential> {
        let key = self.credential_key(ctx);
        if let Some(credential) = store.get(&key).await? {
            tracing::debug!(key = %key, "returning stored credential");
            return Ok(credential);
        }

        tracing::debug!(key = %key, "no stored credential; acquiring a new one");
        self.generate_credential(ctx).await
    }

    /// Persist the credential Git handed back after a successful fetch.
    async fn store_credential(
        &self,
        ctx: &RequestContext,
        store: &dyn CredentialStore,
    ) -> Result<()> {
        let (Some(username), Some(password)) = (&ctx.input.username, &ctx.input.password) else {
            return Err(Error::InvalidInput(
                "'username' and 'password' are required to store a credential".to_string(),
            ));
        };

        store
            .add_or_update(
                &self.credential_key(ctx),
                &Credential::new(username.clone(), password.clone()),
            )
            .await
    }

    /// Erase any stored credential for the request.
    async fn erase_credential(
        &self,
        ctx: &RequestContext,
        store: &dyn CredentialStore,
    ) -> Result<()> {
        let key = self.credential_key(ctx);
        if !store.remove(&key).await? {
            tracing::debug!(key = %key, "no stored credential to erase");
        }
        Ok(())
    }

    /// Hook run by `configure`; providers write any Git configuration they
    /// need to operate.
    async fn configure(&self, _git: &dyn GitConfiguration) -> Result<()> {
        Ok(())
    }

    /// Hook run by `unconfigure`; reverses [`HostProvider::configure`].
    async fn unconfigure(&self, _git: &dyn GitConfiguration) -> Result<()> {
        Ok(())
    }
}

/// Ordered collection of registered providers.
#[derive(Default)]
pub struct HostProviderRegistry {
    providers: Vec<Arc<dyn HostProvider>>,
}

impl HostProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider. Registration order is the auto-detection order.
    pub fn register(&mut self, provider: Arc<dyn HostProvider>) {
        self.providers.push(provider);
    }

    pub fn providers(&self) -> &[Arc<dyn HostProvider>] {
        &self.providers
    }

    /// Resolve the single provider that should handle this request.
    pub fn resolve(&self, ctx: &RequestContext) -> Result<Arc<dyn HostProvider>> {
        // 1. Explicit override, unless it is the "auto" sentinel. An
        //    unregistered id is an error regardless of auto-detection.
        if let Some(id) = ctx.settings.provider_override() {
            if !id.trim().is_empty() && !id.eq_ignore_ascii_case(PROVIDER_ID_AUTO) {
                tracing::debug!(provider = %id, "provider override in effect");
                return self
                    .providers
                    .iter()
                    .find(|provider| provider.id().eq_ignore_ascii_case(&id))
                    .cloned()
                    .ok_or(Error::ProviderNotFound(id));
            }
        }

        // 2. Deprecated authority override; an unknown authority falls
        //    through to auto-detection.
        if let Some(authority) = ctx.settings.legacy_authority_override() {
            if !authority.trim().is_empty() && !authority.eq_ignore_ascii_case(AUTHORITY_ID_AUTO) {
                tracing::warn!(
                    "the 'authority' setting is deprecated; use the provider override instead"
                );
                if let Some(provider) = self.providers.iter().find(|provider| {
                    provider
                        .supported_authorities()
                        .iter()
                        .any(|candidate| candidate.eq_ignore_ascii_case(&authority))
                }) {
                    return Ok(provider.clone());
                }
            }
        }

        // 3. Auto-detection in registration order.
        self.providers
            .iter()
            .find(|provider| provider.is_supported(&ctx.input))
            .cloned()
            .ok_or(Error::NoProviderFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::MemoryConfiguration;
    use crate::test_support::StaticEnvironment;

    struct StubProvider {
        id: &'static str,
        authorities: &'static [&'static str],
        supports: fn(&InputRequest) -> bool,
    }

    #[async_trait]
    impl HostProvider for StubProvider {
        fn id(&self) -> &'static str {
            self.id
        }

        fn name(&self) -> &'static str {
            "Stub"
        }

        fn supported_authorities(&self) -> &'static [&'static str] {
            self.authorities
        }

        fn is_supported(&self, input: &InputRequest) -> bool {
            (self.supports)(input)
        }

        async fn generate_credential(&self, _ctx: &RequestContext) -> Result<Credential> {
            Ok(Credential::new("stub", "stub"))
        }
    }

    fn always(_: &InputRequest) -> bool {
        true
    }

    fn never(_: &InputRequest) -> bool {
        false
    }

    fn registry_of(providers: Vec<StubProvider>) -> HostProviderRegistry {
        let mut registry = HostProviderRegistry::new();
        for provider in providers {
            registry.register(Arc::new(provider));
        }
        registry
    }

    fn context(env: &[(&str, &str)]) -> RequestContext {
        let input = InputRequest::from_pairs([("protocol", "https"), ("host", "example.com")]);
        let settings = Settings::new(
            Arc::new(StaticEnvironment::from_pairs(env)),
            Arc::new(MemoryConfiguration::new()),
        );
        RequestContext::new(input, settings).unwrap()
    }

    #[test]
    fn auto_detection_respects_registration_order() {
        let registry = registry_of(vec![
            StubProvider {
                id: "first",
                authorities: &[],
                supports: always,
            },
            StubProvider {
                id: "second",
                authorities: &[],
                supports: always,
            },
        ]);

        let provider = registry.resolve(&context(&[])).unwrap();
        assert_eq!(provider.id(), "first");
    }

    #[test]
    fn no_matching_provider_fails() {
        let registry = registry_of(vec![StubProvider {
            id: "only",
            authorities: &[],
            supports: never,
        }]);

        let result = registry.resolve(&context(&[]));
        assert!(matches!(result, Err(Error::NoProviderFound)));
    }

    #[test]
    fn override_selects_by_id_even_when_unsupported() {
        let registry = registry_of(vec![
            StubProvider {
                id: "detected",
                authorities: &[],
                supports: always,
            },
            StubProvider {
                id: "wanted",
                authorities: &[],
                supports: never,
            },
        ]);

        let ctx = context(&[("KEYBRIDGE_PROVIDER", "wanted")]);
        let provider = registry.resolve(&ctx).unwrap();
        assert_eq!(provider.id(), "wanted");
    }

    #[test]
    fn override_to_unregistered_id_always_fails() {
        let registry = registry_of(vec![StubProvider {
            id: "supported",
            authorities: &[],
            supports: always,
        }]);

        let ctx = context(&[("KEYBRIDGE_PROVIDER", "does-not-exist")]);
        match registry.resolve(&ctx) {
            Err(Error::ProviderNotFound(id)) => assert_eq!(id, "does-not-exist"),
            other => panic!("expected ProviderNotFound, got {:?}", other.map(|p| p.id())),
        }
    }

    #[test]
    fn auto_sentinel_falls_back_to_detection() {
        let registry = registry_of(vec![StubProvider {
            id: "detected",
            authorities: &[],
            supports: always,
        }]);

        let ctx = context(&[("KEYBRIDGE_PROVIDER", "auto")]);
        assert_eq!(registry.resolve(&ctx).unwrap().id(), "detected");
    }

    #[test]
    fn legacy_authority_selects_matching_provider() {
        let registry = registry_of(vec![
            StubProvider {
                id: "detected",
                authorities: &[],
                supports: always,
            },
            StubProvider {
                id: "legacy",
                authorities: &["corp-sso"],
                supports: never,
            },
        ]);

        let ctx = context(&[("KEYBRIDGE_AUTHORITY", "corp-sso")]);
        assert_eq!(registry.resolve(&ctx).unwrap().id(), "legacy");
    }

    #[test]
    fn unknown_legacy_authority_falls_through_to_detection() {
        let registry = registry_of(vec![StubProvider {
            id: "detected",
            authorities: &[],
            supports: always,
        }]);

        let ctx = context(&[("KEYBRIDGE_AUTHORITY", "unknown")]);
        assert_eq!(registry.resolve(&ctx).unwrap().id(), "detected");
    }

    #[test]
    fn resolution_is_idempotent() {
        let registry = registry_of(vec![StubProvider {
            id: "detected",
            authorities: &[],
            supports: always,
        }]);

        let ctx = context(&[]);
        let first = registry.resolve(&ctx).unwrap().id();
        let second = registry.resolve(&ctx).unwrap().id();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn store_credential_requires_username_and_password() {
        let provider = StubProvider {
            id: "stub",
            authorities: &[],
            supports: always,
        };
        let store = crate::store::MemoryStore::new();
        let ctx = context(&[]);

        let result = provider.store_credential(&ctx, &store).await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn get_credential_prefers_the_store() {
        let provider = StubProvider {
            id: "stub",
            authorities: &[],
            supports: always,
        };
        let store = crate::store::MemoryStore::new();
        let ctx = context(&[]);

        let key = provider.credential_key(&ctx);
        store
            .add_or_update(&key, &Credential::new("stored", "value"))
            .await
            .unwrap();

        let credential = provider.get_credential(&ctx, &store).await.unwrap();
        assert_eq!(credential.username, "stored");
    }
}
