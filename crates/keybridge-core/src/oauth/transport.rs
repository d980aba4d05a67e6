//! HTTP transport injection for the OAuth2 flow engine.
//!
//! The flow engine never talks to an ambient global HTTP client: the
//! coordinator constructs one transport per request and injects it. All
//! OAuth2 endpoint interactions are form-encoded POSTs expecting JSON back.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use url::Url;

use crate::error::{Error, Result};
use crate::settings::Settings;

/// A single form-encoded POST exchange.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub form: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn post_form(&self, request: HttpRequest) -> Result<HttpResponse>;
}

/// Production transport backed by reqwest, honoring the proxy and
/// certificate-verification settings resolved for the remote.
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: Self::builder().build()?,
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let mut builder = Self::builder();

        if let Some(proxy) = settings.proxy_configuration() {
            tracing::debug!(proxy = %proxy.url, "using configured proxy");
            builder = builder.proxy(reqwest::Proxy::all(proxy.url.as_str())?);
        }

        if !settings.is_certificate_verification_enabled() {
            tracing::warn!("TLS certificate verification is disabled");
            builder = builder.danger_accept_invalid_certs(true);
        }

        Ok(Self {
            client: builder.build()?,
        })
    }

    fn builder() -> reqwest::ClientBuilder {
        reqwest::Client::builder()
            .user_agent(concat!("keybridge/", env!("CARGO_PKG_VERSION")))
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn post_form(&self, request: HttpRequest) -> Result<HttpResponse> {
        let mut builder = self
            .client
            .post(request.url.clone())
            .header(reqwest::header::ACCEPT, "application/json");
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }

        let response = builder.form(&request.form).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        Ok(HttpResponse { status, body })
    }
}

/// Scripted transport for tests: queued responses, recorded requests.
#[derive(Default)]
pub struct MockTransport {
    responses: Mutex<VecDeque<HttpResponse>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_response(&self, status: u16, body: impl Into<String>) -> &Self {
        self.responses.lock().unwrap().push_back(HttpResponse {
            status,
            body: body.into(),
        });
        self
    }

    pub fn push_json(&self, status: u16, body: &serde_json::Value) -> &Self {
        self.push_response(status, body.to_string())
    }

    /// Every request sent so far, in order.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn post_form(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| Error::Protocol("mock transport has no scripted response".to_string()))
    }
}

/// Convenience for asserting on recorded form fields.
pub fn form_value<'a>(request: &'a HttpRequest, name: &str) -> Option<&'a str> {
    request
        .form
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.as_str())
}
