//! End-to-end Azure Repos scenarios against a fully mocked backend.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use url::Url;

use keybridge_core::auth::Capabilities;
use keybridge_core::coordinator::AuthenticationCoordinator;
use keybridge_core::credential::PERSONAL_ACCESS_TOKEN_USERNAME;
use keybridge_core::error::{Error, Result};
use keybridge_core::git::MemoryConfiguration;
use keybridge_core::input::InputRequest;
use keybridge_core::oauth::transport::MockTransport;
use keybridge_core::providers::azure::{DEFAULT_AUTHORITY, DevOpsApi};
use keybridge_core::providers::{AzureReposProvider, GenericProvider, GitHubProvider};
use keybridge_core::registry::{HostProvider, HostProviderRegistry, RequestContext};
use keybridge_core::settings::Settings;
use keybridge_core::store::{CredentialStore, MemoryStore};
use keybridge_core::test_support::{RecordingBrowser, ScriptedTerminal, StaticEnvironment};

/// Records the access token it was handed and mints a fixed PAT.
struct MockDevOpsApi {
    issued_pat: String,
    seen_tokens: Mutex<Vec<String>>,
    seen_organizations: Mutex<Vec<Url>>,
}

impl MockDevOpsApi {
    fn new(issued_pat: &str) -> Self {
        Self {
            issued_pat: issued_pat.to_string(),
            seen_tokens: Mutex::new(Vec::new()),
            seen_organizations: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl DevOpsApi for MockDevOpsApi {
    async fn authority(&self, organization_url: &Url) -> Result<String> {
        self.seen_organizations
            .lock()
            .unwrap()
            .push(organization_url.clone());
        Ok(DEFAULT_AUTHORITY.to_string())
    }

    async fn create_personal_access_token(
        &self,
        _organization_url: &Url,
        access_token: &str,
        _scopes: &[&str],
    ) -> Result<String> {
        self.seen_tokens
            .lock()
            .unwrap()
            .push(access_token.to_string());
        Ok(self.issued_pat.clone())
    }
}

struct Fixture {
    registry: HostProviderRegistry,
    transport: Arc<MockTransport>,
    api: Arc<MockDevOpsApi>,
    store: MemoryStore,
    settings: Settings,
}

fn fixture() -> Fixture {
    let transport = Arc::new(MockTransport::new());
    let terminal = Arc::new(ScriptedTerminal::with_responses(&[]));
    let browser = Arc::new(RecordingBrowser::new());

    // No desktop session: OAuth goes through the device grant.
    let coordinator = Arc::new(
        AuthenticationCoordinator::new(transport.clone(), terminal, browser).with_capabilities(
            Capabilities {
                desktop_session: false,
                device_code_supported: false,
            },
        ),
    );

    let api = Arc::new(MockDevOpsApi::new("PERSONAL-ACCESS-TOKEN"));

    let mut registry = HostProviderRegistry::new();
    registry.register(Arc::new(AzureReposProvider::new(
        coordinator.clone(),
        api.clone(),
    )));
    registry.register(Arc::new(GitHubProvider::new(coordinator.clone())));
    registry.register(Arc::new(GenericProvider::new(coordinator)));

    let settings = Settings::new(
        Arc::new(StaticEnvironment::from_pairs(&[])),
        Arc::new(MemoryConfiguration::new()),
    );

    Fixture {
        registry,
        transport,
        api,
        store: MemoryStore::new(),
        settings,
    }
}

fn script_device_grant(transport: &MockTransport, access_token: &str) {
    transport.push_json(
        200,
        &serde_json::json!({
            "device_code": "dc-1",
            "user_code": "ABCD-EFGH",
            "verification_uri": "https://login.example.com/activate",
            "expires_in": 900,
            "interval": 1
        }),
    );
    transport.push_json(
        200,
        &serde_json::json!({"access_token": access_token, "token_type": "bearer"}),
    );
}

#[tokio::test(start_paused = true)]
async fn https_request_resolves_to_azure_and_yields_a_pat_credential() {
    let fixture = fixture();
    script_device_grant(&fixture.transport, "aad-access-token");

    let input = InputRequest::from_pairs([
        ("protocol", "https"),
        ("host", "dev.azure.com"),
        ("path", "org/proj/_git/repo"),
    ]);
    let ctx = RequestContext::new(input, fixture.settings.clone()).unwrap();

    let provider = fixture.registry.resolve(&ctx).unwrap();
    assert_eq!(provider.id(), "azure-repos");

    let credential = provider.get_credential(&ctx, &fixture.store).await.unwrap();
    assert_eq!(credential.username, PERSONAL_ACCESS_TOKEN_USERNAME);
    assert_eq!(credential.password, "PERSONAL-ACCESS-TOKEN");

    // The PAT was minted with the token issued by the mocked backend, for
    // the organization derived from the request path.
    assert_eq!(
        fixture.api.seen_tokens.lock().unwrap().as_slice(),
        ["aad-access-token"]
    );
    assert_eq!(
        fixture.api.seen_organizations.lock().unwrap()[0].as_str(),
        "https://dev.azure.com/org"
    );
}

#[tokio::test]
async fn http_request_is_supported_but_acquisition_fails() {
    let fixture = fixture();

    let input = InputRequest::from_pairs([
        ("protocol", "http"),
        ("host", "dev.azure.com"),
        ("path", "org/proj/_git/repo"),
    ]);
    let ctx = RequestContext::new(input, fixture.settings.clone()).unwrap();

    // The support check accepts unencrypted HTTP so that the error below is
    // raised with a useful message instead of "no provider found".
    let provider = fixture.registry.resolve(&ctx).unwrap();
    assert_eq!(provider.id(), "azure-repos");

    let result = provider.get_credential(&ctx, &fixture.store).await;
    match result {
        Err(Error::InvalidInput(message)) => {
            assert!(message.to_lowercase().contains("unencrypted"));
        }
        other => panic!("expected an unencrypted-HTTP failure, got {other:?}"),
    }

    // No flow ran and no PAT was minted.
    assert!(fixture.transport.requests().is_empty());
    assert!(fixture.api.seen_tokens.lock().unwrap().is_empty());
}

#[tokio::test]
async fn resolution_is_idempotent_without_configuration_changes() {
    let fixture = fixture();

    let input = InputRequest::from_pairs([
        ("protocol", "https"),
        ("host", "dev.azure.com"),
        ("path", "org/proj/_git/repo"),
    ]);
    let ctx = RequestContext::new(input, fixture.settings.clone()).unwrap();

    let first = fixture.registry.resolve(&ctx).unwrap().id();
    let second = fixture.registry.resolve(&ctx).unwrap().id();
    assert_eq!(first, second);
}

#[tokio::test(start_paused = true)]
async fn stored_credentials_short_circuit_acquisition() {
    let fixture = fixture();

    let input = InputRequest::from_pairs([
        ("protocol", "https"),
        ("host", "dev.azure.com"),
        ("path", "org/proj/_git/repo"),
    ]);
    let ctx = RequestContext::new(input, fixture.settings.clone()).unwrap();
    let provider = fixture.registry.resolve(&ctx).unwrap();

    // Seed the store under the provider's organization-wide key.
    fixture
        .store
        .add_or_update(
            &provider.credential_key(&ctx),
            &keybridge_core::Credential::new("cached", "credential"),
        )
        .await
        .unwrap();

    let credential = provider.get_credential(&ctx, &fixture.store).await.unwrap();
    assert_eq!(credential.username, "cached");
    // Nothing touched the network.
    assert!(fixture.transport.requests().is_empty());
}

#[tokio::test]
async fn provider_override_to_unregistered_id_fails() {
    let fixture = fixture();

    let input = InputRequest::from_pairs([
        ("protocol", "https"),
        ("host", "dev.azure.com"),
        ("path", "org/proj/_git/repo"),
    ]);
    let settings = Settings::new(
        Arc::new(StaticEnvironment::from_pairs(&[(
            "KEYBRIDGE_PROVIDER",
            "bitbucket",
        )])),
        Arc::new(MemoryConfiguration::new()),
    );
    let ctx = RequestContext::new(input, settings).unwrap();

    match fixture.registry.resolve(&ctx) {
        Err(Error::ProviderNotFound(id)) => assert_eq!(id, "bitbucket"),
        other => panic!(
            "expected ProviderNotFound, got {:?}",
            other.map(|provider| provider.id())
        ),
    }
}
