//! Server endpoint URLs
//!
//! A single base URL (`http://host:port[/prefix]`) yields both the auth
//! endpoint (`{base}/auth`) and the chat socket (`ws://host:port[/prefix]/chat?token=...`).

use std::str::FromStr;

use reqwest::Url;

use crate::error::{Error, Result};

/// Auth endpoint path segment
const AUTH_PATH: &str = "auth";

/// Chat socket path segment
const CHAT_PATH: &str = "chat";

/// Query parameter carrying the session token
const TOKEN_PARAM: &str = "token";

/// Parsed server base URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    base: Url,
}

impl Endpoints {
    /// Parse from a base URL string
    pub fn parse(s: &str) -> Result<Self> {
        let mut base = Url::parse(s)
            .map_err(|e| Error::InvalidEndpoint(format!("bad server URL '{}': {}", s, e)))?;

        match base.scheme() {
            "http" | "https" => {}
            other => {
                return Err(Error::InvalidEndpoint(format!(
                    "unsupported scheme '{}', expected http or https",
                    other
                )))
            }
        }

        if base.cannot_be_a_base() || base.host_str().is_none() {
            return Err(Error::InvalidEndpoint(format!("'{}' has no host", s)));
        }

        // Joining relative segments needs a trailing slash on the prefix
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        base.set_query(None);
        base.set_fragment(None);

        Ok(Self { base })
    }

    /// URL of the credential exchange endpoint
    pub fn auth_url(&self) -> Result<Url> {
        self.base
            .join(AUTH_PATH)
            .map_err(|e| Error::InvalidEndpoint(e.to_string()))
    }

    /// WebSocket URL carrying the session token as a query parameter
    pub fn socket_url(&self, token: &str) -> Result<Url> {
        let mut url = self
            .base
            .join(CHAT_PATH)
            .map_err(|e| Error::InvalidEndpoint(e.to_string()))?;

        let scheme = if self.base.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|_| Error::InvalidEndpoint(format!("cannot switch to {}", scheme)))?;
        url.query_pairs_mut().append_pair(TOKEN_PARAM, token);

        Ok(url)
    }
}

impl std::fmt::Display for Endpoints {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.base)
    }
}

impl FromStr for Endpoints {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
