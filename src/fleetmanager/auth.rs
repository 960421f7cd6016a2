// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Bearer-token sources for Fleet Manager requests.
//!
//! Three flows are supported, selected by `AUTH_TYPE`:
//!
//! - **OCM**: an offline refresh token exchanged at the OCM SSO endpoint
//! - **RHSSO**: service-account client credentials
//! - **`STATIC_TOKEN`**: a fixed token, mostly for development
//!
//! Exchanged access tokens are cached until shortly before they expire.

use crate::config::{AuthType, Config};
use crate::constants::{OCM_CLIENT_ID, TOKEN_EXPIRY_LEEWAY_SECS};
use crate::errors::{Error, Result};
use crate::reconcilers::retry::is_retryable_http_status;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

/// Produces the bearer token attached to every Fleet Manager request.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Return a currently valid access token.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FleetManager`] when the token endpoint rejects the exchange
    /// or cannot be reached.
    async fn token(&self) -> Result<String>;
}

/// Fixed token.
pub struct StaticToken(String);

impl StaticToken {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        StaticToken(token.into())
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn token(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: Option<Instant>,
}

impl CachedToken {
    fn is_valid(&self) -> bool {
        self.expires_at.is_none_or(|at| Instant::now() < at)
    }
}

/// Grant exchanged at the token endpoint.
#[derive(Debug, Clone)]
enum Grant {
    RefreshToken { refresh_token: String },
    ClientCredentials { client_id: String, client_secret: String },
}

impl Grant {
    fn form_body(&self) -> String {
        let mut form = url::form_urlencoded::Serializer::new(String::new());
        match self {
            Grant::RefreshToken { refresh_token } => {
                form.append_pair("grant_type", "refresh_token")
                    .append_pair("client_id", OCM_CLIENT_ID)
                    .append_pair("refresh_token", refresh_token);
            }
            Grant::ClientCredentials {
                client_id,
                client_secret,
            } => {
                form.append_pair("grant_type", "client_credentials")
                    .append_pair("client_id", client_id)
                    .append_pair("client_secret", client_secret)
                    .append_pair("scope", "openid");
            }
        }
        form.finish()
    }
}

/// OAuth2 token exchange with an in-memory cache.
pub struct ExchangedToken {
    http: reqwest::Client,
    token_url: String,
    grant: Grant,
    cached: Mutex<Option<CachedToken>>,
}

impl ExchangedToken {
    /// OCM offline-token flow.
    #[must_use]
    pub fn ocm(http: reqwest::Client, token_url: &str, refresh_token: &str) -> Self {
        Self::with_grant(
            http,
            token_url,
            Grant::RefreshToken {
                refresh_token: refresh_token.to_string(),
            },
        )
    }

    /// Client-credentials flow against Red Hat SSO.
    #[must_use]
    pub fn client_credentials(
        http: reqwest::Client,
        token_url: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Self {
        Self::with_grant(
            http,
            token_url,
            Grant::ClientCredentials {
                client_id: client_id.to_string(),
                client_secret: client_secret.to_string(),
            },
        )
    }

    fn with_grant(http: reqwest::Client, token_url: &str, grant: Grant) -> Self {
        ExchangedToken {
            http,
            token_url: token_url.to_string(),
            grant,
            cached: Mutex::new(None),
        }
    }

    async fn exchange(&self) -> Result<CachedToken> {
        let response = self
            .http
            .post(&self.token_url)
            .header(
                reqwest::header::CONTENT_TYPE,
                "application/x-www-form-urlencoded",
            )
            .body(self.grant.form_body())
            .send()
            .await
            .map_err(|e| Error::FleetManager {
                operation: "exchange token",
                message: e.to_string(),
                retryable: true,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::FleetManager {
                operation: "exchange token",
                message: format!("token endpoint returned {status}: {body}"),
                retryable: is_retryable_http_status(status),
            });
        }

        let token: TokenResponse = response.json().await.map_err(|e| Error::FleetManager {
            operation: "exchange token",
            message: format!("invalid token response: {e}"),
            retryable: false,
        })?;

        let expires_at = token.expires_in.map(|secs| {
            Instant::now() + Duration::from_secs(secs.saturating_sub(TOKEN_EXPIRY_LEEWAY_SECS))
        });
        debug!(expires_in = ?token.expires_in, "Exchanged Fleet Manager access token");

        Ok(CachedToken {
            access_token: token.access_token,
            expires_at,
        })
    }
}

#[async_trait]
impl TokenSource for ExchangedToken {
    async fn token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.is_valid()) {
            return Ok(token.access_token.clone());
        }
        let fresh = self.exchange().await?;
        let access_token = fresh.access_token.clone();
        *cached = Some(fresh);
        Ok(access_token)
    }
}

/// Build the token source selected by the configuration.
///
/// # Errors
///
/// Returns [`Error::Config`] when a setting required by the selected flow is missing.
pub fn token_source(config: &Config, http: reqwest::Client) -> Result<Arc<dyn TokenSource>> {
    let missing = |name: &str| Error::Config(format!("{name} must be set"));
    let source: Arc<dyn TokenSource> = match config.auth_type {
        AuthType::StaticToken => Arc::new(StaticToken::new(
            config
                .static_token
                .clone()
                .ok_or_else(|| missing("STATIC_TOKEN"))?,
        )),
        AuthType::Ocm => Arc::new(ExchangedToken::ocm(
            http,
            &config.ocm_token_url,
            config.ocm_token.as_deref().ok_or_else(|| missing("OCM_TOKEN"))?,
        )),
        AuthType::Rhsso => Arc::new(ExchangedToken::client_credentials(
            http,
            config
                .rhsso_token_url
                .as_deref()
                .ok_or_else(|| missing("RHSSO_TOKEN_URL"))?,
            config
                .rhsso_client_id
                .as_deref()
                .ok_or_else(|| missing("RHSSO_CLIENT_ID"))?,
            config
                .rhsso_client_secret
                .as_deref()
                .ok_or_else(|| missing("RHSSO_CLIENT_SECRET"))?,
        )),
    };
    Ok(source)
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod auth_tests;
