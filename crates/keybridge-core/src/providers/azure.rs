//! Azure Repos host provider.
//!
//! Acquisition runs the OAuth2 flow against the organization's authority
//! and then mints a personal access token through the Azure DevOps REST
//! backend; the resulting credential carries the fixed PAT username.

use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

use crate::coordinator::AuthenticationCoordinator;
use crate::credential::{Credential, PERSONAL_ACCESS_TOKEN_USERNAME};
use crate::error::{Error, Result};
use crate::git::GitConfiguration;
use crate::input::InputRequest;
use crate::oauth::OAuth2Client;
use crate::providers::is_http_like;
use crate::registry::{HostProvider, RequestContext};

pub const AZURE_DEVOPS_HOST: &str = "dev.azure.com";
pub const VSTS_HOST_SUFFIX: &str = ".visualstudio.com";

/// OAuth client registration used for Azure DevOps sign-in.
const CLIENT_ID: &str = "c6f73cb1-7a5d-4d41-b1d9-0f3a8f2e6c54";
/// Delegated scope requested for minting personal access tokens.
const DEVOPS_RESOURCE_SCOPE: &str = "https://app.vssps.visualstudio.com/.default";
/// Authority used when the organization does not advertise one.
pub const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com/common";

/// PAT scopes requested for Git fetch/push plus artifact restore.
const PAT_SCOPES: &[&str] = &["vso.code_write", "vso.packaging"];

/// REST surface of the Azure DevOps backend consumed during acquisition.
/// Implemented over HTTP in production; mocked in tests.
#[async_trait]
pub trait DevOpsApi: Send + Sync {
    /// Discover the OAuth authority for an organization.
    async fn authority(&self, organization_url: &Url) -> Result<String>;

    /// Mint a personal access token using a bearer access token.
    async fn create_personal_access_token(
        &self,
        organization_url: &Url,
        access_token: &str,
        scopes: &[&str],
    ) -> Result<String>;
}

pub struct AzureReposProvider {
    coordinator: Arc<AuthenticationCoordinator>,
    api: Arc<dyn DevOpsApi>,
}

impl AzureReposProvider {
    pub fn new(coordinator: Arc<AuthenticationCoordinator>, api: Arc<dyn DevOpsApi>) -> Self {
        Self { coordinator, api }
    }

    /// The organization URL for a request: `https://dev.azure.com/{org}` or
    /// `https://{org}.visualstudio.com`.
    fn organization_url(ctx: &RequestContext) -> Result<Url> {
        let host = ctx.remote_url.host_str().unwrap_or_default();

        if host.eq_ignore_ascii_case(AZURE_DEVOPS_HOST) {
            let organization = ctx
                .remote_url
                .path_segments()
                .and_then(|mut segments| segments.next())
                .filter(|segment| !segment.is_empty())
                .ok_or_else(|| {
                    Error::InvalidInput(
                        "cannot determine the organization from the remote URL; \
                         a path of the form '{organization}/...' is required"
                            .to_string(),
                    )
                })?;
            return Url::parse(&format!("https://{AZURE_DEVOPS_HOST}/{organization}"))
                .map_err(|e| Error::InvalidInput(format!("invalid organization URL: {e}")));
        }

        Url::parse(&format!("https://{host}"))
            .map_err(|e| Error::InvalidInput(format!("invalid organization URL: {e}")))
    }

    fn oauth_client(&self, authority: &str) -> Result<OAuth2Client> {
        let parse = |suffix: &str| {
            Url::parse(&format!("{}/{suffix}", authority.trim_end_matches('/')))
                .map_err(|e| Error::InvalidInput(format!("invalid authority '{authority}': {e}")))
        };

        Ok(OAuth2Client::new(
            parse("oauth2/authorize")?,
            parse("oauth2/token")?,
            CLIENT_ID,
            self.coordinator.transport(),
        )
        .with_device_endpoint(parse("oauth2/devicecode")?))
    }
}

#[async_trait]
impl HostProvider for AzureReposProvider {
    fn id(&self) -> &'static str {
        "azure-repos"
    }

    fn name(&self) -> &'static str {
        "Azure Repos"
    }

    fn supported_authorities(&self) -> &'static [&'static str] {
        &["msa", "aad", "azure-devops"]
    }

    fn is_supported(&self, input: &InputRequest) -> bool {
        if !is_http_like(input) {
            return false;
        }
        // Unencrypted HTTP is accepted here so acquisition can fail with a
        // clear error instead of a silent non-match.
        let host = input.host.as_deref().unwrap_or_default();
        host.eq_ignore_ascii_case(AZURE_DEVOPS_HOST)
            || (host.len() > VSTS_HOST_SUFFIX.len()
                && host
                    .to_ascii_lowercase()
                    .ends_with(VSTS_HOST_SUFFIX))
    }

    /// Azure Repos credentials are organization-wide, not repository-wide.
    fn credential_key(&self, ctx: &RequestContext) -> String {
        match Self::organization_url(ctx) {
            Ok(organization) => format!("git:{organization}"),
            Err(_) => format!("git:{}", ctx.remote_url),
        }
    }

    async fn generate_credential(&self, ctx: &RequestContext) -> Result<Credential> {
        if !ctx.remote_url.scheme().eq_ignore_ascii_case("https") {
            return Err(Error::InvalidInput(
                "unencrypted HTTP is not supported for Azure Repos; use HTTPS".to_string(),
            ));
        }

        let organization_url = Self::organization_url(ctx)?;
        let authority = self.api.authority(&organization_url).await?;
        tracing::debug!(%organization_url, %authority, "acquiring Azure DevOps access token");

        let client = self.oauth_client(&authority)?;
        let token = self
            .coordinator
            .oauth_token(
                &ctx.settings,
                &client,
                &[DEVOPS_RESOURCE_SCOPE.to_string()],
            )
            .await?;

        let pat = self
            .api
            .create_personal_access_token(&organization_url, &token.access_token, PAT_SCOPES)
            .await?;

        Ok(Credential::new(PERSONAL_ACCESS_TOKEN_USERNAME, pat))
    }

    async fn configure(&self, git: &dyn GitConfiguration) -> Result<()> {
        // Azure Repos needs the request path to identify the organization.
        let scope = format!("https://{AZURE_DEVOPS_HOST}");
        let existing = git.try_get_scoped("credential", &scope, "useHttpPath");
        if existing
            .as_deref()
            .and_then(crate::settings::parse_booleany)
            == Some(true)
        {
            return Ok(());
        }
        git.set_global(&format!("credential.{scope}.useHttpPath"), "true")
    }

    async fn unconfigure(&self, git: &dyn GitConfiguration) -> Result<()> {
        git.unset_global(&format!("credential.https://{AZURE_DEVOPS_HOST}.useHttpPath"))
    }
}

/// Production [`DevOpsApi`] over HTTP.
pub struct HttpDevOpsApi {
    client: reqwest::Client,
}

impl HttpDevOpsApi {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DevOpsApi for HttpDevOpsApi {
    async fn authority(&self, organization_url: &Url) -> Result<String> {
        // An unauthenticated probe advertises the authority in the
        // WWW-Authenticate challenge; fall back to the common endpoint.
        let response = self
            .client
            .head(organization_url.clone())
            .send()
            .await?;

        if let Some(challenge) = response
            .headers()
            .get(reqwest::header::WWW_AUTHENTICATE)
            .and_then(|value| value.to_str().ok())
        {
            if let Some(authority) = challenge
                .split(',')
                .flat_map(|part| part.trim().strip_prefix("authorization_uri="))
                .next()
            {
                return Ok(authority.trim_matches('"').to_string());
            }
        }

        Ok(DEFAULT_AUTHORITY.to_string())
    }

    async fn create_personal_access_token(
        &self,
        organization_url: &Url,
        access_token: &str,
        scopes: &[&str],
    ) -> Result<String> {
        #[derive(serde::Serialize)]
        #[serde(rename_all = "camelCase")]
        struct PatRequest<'a> {
            display_name: &'a str,
            scope: String,
        }

        #[derive(serde::Deserialize)]
        struct PatResponse {
            token: String,
        }

        let endpoint = Url::parse(&format!(
            "{}/_apis/token/sessiontokens?api-version=1.0&tokentype=compact",
            organization_url.as_str().trim_end_matches('/')
        ))
        .map_err(|e| Error::InvalidInput(format!("invalid organization URL: {e}")))?;

        let response = self
            .client
            .post(endpoint)
            .bearer_auth(access_token)
            .json(&PatRequest {
                display_name: "keybridge",
                scope: scopes.join(" "),
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::Protocol(format!(
                "personal access token request failed with status {}",
                response.status()
            )));
        }

        let pat: PatResponse = response
            .json()
            .await
            .map_err(|e| Error::Protocol(format!("malformed personal access token response: {e}")))?;
        Ok(pat.token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::InputRequest;

    fn provider() -> AzureReposProvider {
        use crate::oauth::transport::MockTransport;
        use crate::test_support::{RecordingBrowser, ScriptedTerminal};

        let coordinator = AuthenticationCoordinator::new(
            Arc::new(MockTransport::new()),
            Arc::new(ScriptedTerminal::with_responses(&[])),
            Arc::new(RecordingBrowser::new()),
        );

        struct NoApi;

        #[async_trait]
        impl DevOpsApi for NoApi {
            async fn authority(&self, _organization_url: &Url) -> Result<String> {
                Ok(DEFAULT_AUTHORITY.to_string())
            }

            async fn create_personal_access_token(
                &self,
                _organization_url: &Url,
                _access_token: &str,
                _scopes: &[&str],
            ) -> Result<String> {
                Ok("unused".to_string())
            }
        }

        AzureReposProvider::new(Arc::new(coordinator), Arc::new(NoApi))
    }

    fn input(protocol: &str, host: &str, path: Option<&str>) -> InputRequest {
        let mut pairs = vec![("protocol", protocol), ("host", host)];
        if let Some(path) = path {
            pairs.push(("path", path));
        }
        InputRequest::from_pairs(pairs)
    }

    #[test]
    fn supports_azure_host_with_path() {
        assert!(provider().is_supported(&input("https", "dev.azure.com", Some("org/proj/_git/repo"))));
    }

    #[test]
    fn supports_azure_host_missing_path() {
        assert!(provider().is_supported(&input("https", "dev.azure.com", None)));
    }

    #[test]
    fn supports_visualstudio_host() {
        assert!(provider().is_supported(&input("https", "org.visualstudio.com", None)));
    }

    #[test]
    fn supports_unencrypted_http_so_acquisition_can_fail_clearly() {
        assert!(provider().is_supported(&input("http", "dev.azure.com", Some("org/proj/_git/repo"))));
        assert!(provider().is_supported(&input("http", "org.visualstudio.com", None)));
    }

    #[test]
    fn rejects_visualstudio_host_without_organization() {
        assert!(!provider().is_supported(&input("https", "visualstudio.com", None)));
    }

    #[test]
    fn rejects_other_hosts_and_protocols() {
        assert!(!provider().is_supported(&input("https", "example.com", Some("org/proj/_git/repo"))));
        assert!(!provider().is_supported(&input("ssh", "dev.azure.com", None)));
    }

    #[test]
    fn organization_url_from_path_or_host() {
        let ctx = |protocol: &str, host: &str, path: Option<&str>| {
            use crate::git::MemoryConfiguration;
            use crate::settings::Settings;
            use crate::test_support::StaticEnvironment;

            RequestContext::new(
                input(protocol, host, path),
                Settings::new(
                    Arc::new(StaticEnvironment::from_pairs(&[])),
                    Arc::new(MemoryConfiguration::new()),
                ),
            )
            .unwrap()
        };

        let org = AzureReposProvider::organization_url(&ctx(
            "https",
            "dev.azure.com",
            Some("org/proj/_git/repo"),
        ))
        .unwrap();
        assert_eq!(org.as_str(), "https://dev.azure.com/org");

        let org =
            AzureReposProvider::organization_url(&ctx("https", "org.visualstudio.com", None))
                .unwrap();
        assert_eq!(org.as_str(), "https://org.visualstudio.com/");

        let missing = AzureReposProvider::organization_url(&ctx("https", "dev.azure.com", None));
        assert!(matches!(missing, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn configure_writes_use_http_path_once() {
        use crate::git::{GitConfiguration, MemoryConfiguration};

        let git = MemoryConfiguration::new();
        provider().configure(&git).await.unwrap();
        assert_eq!(
            git.try_get_scoped("credential", "https://dev.azure.com", "useHttpPath"),
            Some("true".to_string())
        );

        // A second run leaves the existing setting alone.
        provider().configure(&git).await.unwrap();

        provider().unconfigure(&git).await.unwrap();
        assert_eq!(
            git.try_get_scoped("credential", "https://dev.azure.com", "useHttpPath"),
            None
        );
    }
}
