//! Command implementations: thin routing over the core.

mod configure;
mod erase;
mod get;
mod store;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use keybridge_core::coordinator::AuthenticationCoordinator;
use keybridge_core::git::{GitConfiguration, GitProcessConfiguration};
use keybridge_core::input::InputRequest;
use keybridge_core::oauth::SystemBrowser;
use keybridge_core::oauth::transport::ReqwestTransport;
use keybridge_core::providers::azure::HttpDevOpsApi;
use keybridge_core::providers::{AzureReposProvider, GenericProvider, GitHubProvider};
use keybridge_core::registry::{HostProviderRegistry, RequestContext};
use keybridge_core::settings::{Environment, ProcessEnvironment, Settings};
use keybridge_core::store::{CredentialStore, KeyringStore};

use crate::terminal::StdTerminal;

/// The production object graph. Request-scoped pieces (settings, transport,
/// coordinator) are constructed per invocation; the broker processes one
/// credential request at a time.
pub struct App {
    env: Arc<dyn Environment>,
    git: Arc<dyn GitConfiguration>,
    store: Arc<dyn CredentialStore>,
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

impl App {
    pub fn new() -> Self {
        Self {
            env: Arc::new(ProcessEnvironment),
            git: Arc::new(GitProcessConfiguration::new(None)),
            store: Arc::new(KeyringStore::default()),
        }
    }

    pub(crate) fn git(&self) -> &dyn GitConfiguration {
        self.git.as_ref()
    }

    pub(crate) fn credential_store(&self) -> &dyn CredentialStore {
        self.store.as_ref()
    }

    pub(crate) fn base_settings(&self) -> Settings {
        Settings::new(self.env.clone(), self.git.clone())
    }

    /// Read the `key=value` request block Git wrote on stdin.
    pub(crate) fn read_request(&self) -> eyre::Result<RequestContext> {
        let input = InputRequest::read_from(std::io::stdin().lock())?;
        Ok(RequestContext::new(input, self.base_settings())?)
    }

    /// Build the provider registry for one request. The transport honors
    /// the proxy and TLS settings resolved for the request's remote, and a
    /// Ctrl-C cancels every in-flight flow.
    pub(crate) fn registry_for(&self, settings: &Settings) -> eyre::Result<HostProviderRegistry> {
        let transport = Arc::new(ReqwestTransport::from_settings(settings)?);
        let http = transport.client().clone();

        let cancel = CancellationToken::new();
        {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::debug!("interrupt received; cancelling");
                    cancel.cancel();
                }
            });
        }

        let coordinator = Arc::new(
            AuthenticationCoordinator::new(
                transport,
                Arc::new(StdTerminal),
                Arc::new(SystemBrowser),
            )
            .with_cancellation(cancel),
        );

        let mut registry = HostProviderRegistry::new();
        registry.register(Arc::new(AzureReposProvider::new(
            coordinator.clone(),
            Arc::new(HttpDevOpsApi::new(http)),
        )));
        registry.register(Arc::new(GitHubProvider::new(coordinator.clone())));
        // The generic provider matches any HTTP(S) remote; keep it last.
        registry.register(Arc::new(GenericProvider::new(coordinator)));
        Ok(registry)
    }

    pub async fn get(&self) -> eyre::Result<()> {
        get::run(self).await
    }

    pub async fn store(&self) -> eyre::Result<()> {
        store::run(self).await
    }

    pub async fn erase(&self) -> eyre::Result<()> {
        erase::run(self).await
    }

    pub async fn configure(&self) -> eyre::Result<()> {
        configure::run(self, true).await
    }

    pub async fn unconfigure(&self) -> eyre::Result<()> {
        configure::run(self, false).await
    }
}
