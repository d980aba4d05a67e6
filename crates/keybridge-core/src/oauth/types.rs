//! OAuth2 wire types (RFC 6749, RFC 8628).

use std::fmt;

use serde::{Deserialize, Serialize};

/// Successful token endpoint response (RFC 6749 §5.1).
///
/// A token result is a secret and is never logged in full; `Debug` redacts
/// the token fields.
#[derive(Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
}

impl fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenResponse")
            .field("access_token", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("scope", &self.scope)
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Device authorization response (RFC 8628 §3.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceAuthorizationResponse {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_uri_complete: Option<String>,
    pub expires_in: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<u64>,
}

/// Error payload returned by OAuth2 endpoints (RFC 6749 §5.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct WireError {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_response_parses_optional_fields() {
        let body = r#"{"access_token":"tok","token_type":"bearer"}"#;
        let token: TokenResponse = serde_json::from_str(body).unwrap();
        assert_eq!(token.access_token, "tok");
        assert!(token.refresh_token.is_none());
        assert!(token.expires_in.is_none());
    }

    #[test]
    fn token_debug_redacts_secrets() {
        let token = TokenResponse {
            access_token: "top-secret".to_string(),
            token_type: "bearer".to_string(),
            scope: Some("repo".to_string()),
            refresh_token: Some("also-secret".to_string()),
            expires_in: Some(3600),
        };

        let rendered = format!("{token:?}");
        assert!(!rendered.contains("top-secret"));
        assert!(!rendered.contains("also-secret"));
        assert!(rendered.contains("bearer"));
    }

    #[test]
    fn device_response_defaults_interval_to_none() {
        let body = r#"{
            "device_code": "dc",
            "user_code": "ABCD-EFGH",
            "verification_uri": "https://example.com/device",
            "expires_in": 900
        }"#;
        let response: DeviceAuthorizationResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.user_code, "ABCD-EFGH");
        assert!(response.interval.is_none());
    }
}
