//! Device authorization grant (RFC 8628).
//!
//! The polling loop is the only place in the broker with built-in retry:
//! `authorization_pending` continues at the current interval, `slow_down`
//! widens it, and everything else ends the flow.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::oauth::types::{DeviceAuthorizationResponse, TokenResponse, WireError};
use crate::oauth::{OAuth2Client, server_error};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
// Interval increase applied on slow_down (RFC 8628 §3.5).
const SLOW_DOWN_STEP: Duration = Duration::from_secs(5);

const DEVICE_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:device_code";

enum PollOutcome {
    Success(TokenResponse),
    Pending,
    SlowDown,
    Failed(Error),
}

impl OAuth2Client {
    /// Request device and user codes (RFC 8628 §3.1).
    pub async fn device_authorization(
        &self,
        scopes: &[String],
        cancel: &CancellationToken,
    ) -> Result<DeviceAuthorizationResponse> {
        let endpoint = self.device_endpoint()?;

        let mut form = vec![("client_id".to_string(), self.client_id().to_string())];
        if !scopes.is_empty() {
            form.push(("scope".to_string(), scopes.join(" ")));
        }

        let response = self.post(endpoint, form, cancel).await?;
        if (200..300).contains(&response.status) {
            serde_json::from_str(&response.body).map_err(|e| {
                Error::Protocol(format!("malformed device authorization response: {e}"))
            })
        } else {
            Err(server_error(&response))
        }
    }

    /// Poll the token endpoint until the grant is approved, expires, or is
    /// cancelled.
    pub async fn device_token(
        &self,
        device: &DeviceAuthorizationResponse,
        cancel: &CancellationToken,
    ) -> Result<TokenResponse> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(device.expires_in);
        let mut interval = device
            .interval
            .map_or(DEFAULT_POLL_INTERVAL, Duration::from_secs);

        loop {
            if tokio::time::Instant::now() >= deadline {
                return Err(Error::Expired);
            }

            tokio::select! {
                () = tokio::time::sleep(interval) => {}
                () = cancel.cancelled() => return Err(Error::Cancelled),
            }

            // Never poll past the grant's lifetime.
            if tokio::time::Instant::now() >= deadline {
                return Err(Error::Expired);
            }

            match self.poll_device_once(&device.device_code, cancel).await? {
                PollOutcome::Success(token) => return Ok(token),
                PollOutcome::Pending => {}
                PollOutcome::SlowDown => {
                    interval += SLOW_DOWN_STEP;
                    tracing::debug!(?interval, "server asked to slow down device polling");
                }
                PollOutcome::Failed(error) => return Err(error),
            }
        }
    }

    async fn poll_device_once(
        &self,
        device_code: &str,
        cancel: &CancellationToken,
    ) -> Result<PollOutcome> {
        let mut form = vec![
            ("grant_type".to_string(), DEVICE_GRANT_TYPE.to_string()),
            ("device_code".to_string(), device_code.to_string()),
            ("client_id".to_string(), self.client_id().to_string()),
        ];
        self.append_client_secret(&mut form);

        let response = self.post(self.token_endpoint().clone(), form, cancel).await?;

        if (200..300).contains(&response.status) {
            let token = serde_json::from_str(&response.body)
                .map_err(|e| Error::Protocol(format!("malformed token response: {e}")))?;
            return Ok(PollOutcome::Success(token));
        }

        // 4xx during polling is expected; the error code drives the loop.
        match serde_json::from_str::<WireError>(&response.body) {
            Ok(wire) => Ok(match wire.error.as_str() {
                "authorization_pending" => PollOutcome::Pending,
                "slow_down" => PollOutcome::SlowDown,
                "expired_token" => PollOutcome::Failed(Error::Expired),
                _ => PollOutcome::Failed(server_error(&response)),
            }),
            Err(_) => Ok(PollOutcome::Failed(Error::Protocol(format!(
                "token endpoint returned status {} with an unrecognized body",
                response.status
            )))),
        }
    }
}
