//! Credential exchange
//!
//! Trades the user's secret for a short-lived session token with a single
//! `GET /auth` request. The secret is only held for the duration of the call.

use std::fmt;
use std::time::Duration;

use reqwest::{StatusCode, Url};
use tracing::{debug, info, warn};

use crate::endpoint::Endpoints;
use crate::error::{Error, Result};
use crate::protocol::{ErrorResponse, TokenResponse};

/// Header carrying the user secret
pub const PASSWORD_HEADER: &str = "X-Connection-Password";

/// Shown when neither the server nor the transport said anything useful
pub const UNKNOWN_ERROR: &str = "an unknown error occurred";

/// Opaque bearer token authorizing one socket connection
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionToken(..)")
    }
}

/// Client for the auth endpoint
#[derive(Debug, Clone)]
pub struct CredentialExchanger {
    client: reqwest::Client,
    auth_url: Url,
}

impl CredentialExchanger {
    pub fn new(endpoints: &Endpoints, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Transport(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            auth_url: endpoints.auth_url()?,
        })
    }

    /// Exchange a secret for a session token.
    ///
    /// Every failure comes back as [`Error::Auth`] carrying user-facing text.
    /// No retry is attempted.
    pub async fn exchange(&self, secret: &str) -> Result<SessionToken> {
        debug!(url = %self.auth_url, "Requesting session token");

        let response = self
            .client
            .get(self.auth_url.clone())
            .header(PASSWORD_HEADER, secret)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "Auth request failed");
                Error::Auth(non_empty_or_unknown(e.to_string()))
            })?;

        let status = response.status();
        debug!(status = %status, "Auth response received");

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, "Failed to read auth response body");
                if status.is_success() {
                    return Err(Error::Auth(non_empty_or_unknown(e.to_string())));
                }
                String::new()
            }
        };

        if !status.is_success() {
            let message = failure_message(status, &body);
            info!(status = %status, "Credential exchange rejected");
            return Err(Error::Auth(message));
        }

        let parsed: TokenResponse = serde_json::from_str(&body).map_err(|e| {
            warn!(error = %e, "Malformed auth response");
            Error::Auth(format!("malformed auth response: {}", e))
        })?;

        if parsed.token.is_empty() {
            return Err(Error::Auth("auth response carried an empty token".into()));
        }

        info!("Session token acquired");
        Ok(SessionToken(parsed.token))
    }
}

/// Server-provided message if present, else a status description
fn failure_message(status: StatusCode, body: &str) -> String {
    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(err) if !err.message.is_empty() => err.message,
        _ => non_empty_or_unknown(format!("server responded with status {}", status)),
    }
}

fn non_empty_or_unknown(message: String) -> String {
    if message.trim().is_empty() {
        UNKNOWN_ERROR.to_string()
    } else {
        message
    }
}
