// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Client of a tenant's own API.
//!
//! Tenants serve self-signed certificates on their in-cluster service, so all
//! calls go through one process-wide client that skips certificate
//! verification. It is built once at startup by [`insecure_http_client`] and
//! shared through the reconciler context.
//!
//! The agent only uses the API to install the Red Hat SSO auth provider and its
//! default groups, authenticating as the `admin` user.

use crate::constants::{CENTRAL_ADMIN_USER, CENTRAL_SERVICE_NAME, UI_REACHABILITY_TIMEOUT};
use crate::errors::{Error, Result};
use crate::reconcilers::retry::is_retryable_http_status;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

const AUTH_PROVIDERS_PATH: &str = "/v1/authProviders";
const GROUPS_PATH: &str = "/v1/groups";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Build the shared client for tenant-internal calls.
///
/// # Errors
///
/// Returns [`Error::Config`] when the TLS backend cannot be initialised.
pub fn insecure_http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .danger_accept_invalid_certs(true)
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| Error::Config(format!("cannot build tenant http client: {e}")))
}

/// Where and as whom to call a tenant's API.
#[derive(Debug, Clone, PartialEq)]
pub struct TenantEndpoint {
    pub base_url: String,
    pub username: String,
    pub password: String,
}

impl TenantEndpoint {
    /// In-cluster service of the tenant in `namespace`.
    #[must_use]
    pub fn in_namespace(namespace: &str, password: &str) -> Self {
        TenantEndpoint {
            base_url: format!("https://{CENTRAL_SERVICE_NAME}.{namespace}.svc"),
            username: CENTRAL_ADMIN_USER.to_string(),
            password: password.to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url.trim_end_matches('/'))
    }
}

/// Attribute an SSO token must carry to log in.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RequiredAttribute {
    pub attribute_key: String,
    pub attribute_value: String,
}

/// OIDC auth provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuthProviderRequest {
    pub name: String,
    #[serde(rename = "type")]
    pub provider_type: String,
    pub ui_endpoint: String,
    pub enabled: bool,
    pub active: bool,
    pub config: BTreeMap<String, String>,
    pub required_attributes: Vec<RequiredAttribute>,
    pub claim_mappings: BTreeMap<String, String>,
}

/// Role binding of users matching a property.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GroupProperties {
    pub auth_provider_id: String,
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GroupRequest {
    pub props: GroupProperties,
    pub role_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthProviderSummary {
    #[serde(default)]
    id: String,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthProviderList {
    #[serde(default)]
    auth_providers: Vec<AuthProviderSummary>,
}

#[derive(Debug, Deserialize)]
struct GroupList {
    #[serde(default)]
    groups: Vec<GroupRequest>,
}

/// Calls made against a tenant's API.
#[async_trait]
pub trait TenantApi: Send + Sync {
    /// ID of the auth provider named `name`, if it exists.
    async fn find_auth_provider(
        &self,
        endpoint: &TenantEndpoint,
        name: &str,
    ) -> Result<Option<String>>;

    /// Create an auth provider and return its ID.
    async fn create_auth_provider(
        &self,
        endpoint: &TenantEndpoint,
        request: &AuthProviderRequest,
    ) -> Result<String>;

    /// Groups bound to the auth provider `provider_id`.
    async fn list_groups(
        &self,
        endpoint: &TenantEndpoint,
        provider_id: &str,
    ) -> Result<Vec<GroupRequest>>;

    async fn create_group(&self, endpoint: &TenantEndpoint, group: &GroupRequest) -> Result<()>;

    /// Whether `url` answers with a success status within the probe timeout.
    async fn probe(&self, url: &str) -> bool;
}

/// `reqwest`-backed [`TenantApi`].
#[derive(Clone)]
pub struct HttpTenantApi {
    http: reqwest::Client,
}

impl HttpTenantApi {
    #[must_use]
    pub fn new(http: reqwest::Client) -> Self {
        HttpTenantApi { http }
    }

    async fn check(
        operation: &'static str,
        result: std::result::Result<reqwest::Response, reqwest::Error>,
    ) -> Result<reqwest::Response> {
        let response = result.map_err(|e| Error::TenantApi {
            operation,
            message: e.to_string(),
            retryable: true,
        })?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(Error::TenantApi {
            operation,
            message: format!("{status}: {body}"),
            retryable: is_retryable_http_status(status),
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        endpoint: &TenantEndpoint,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        let url = url::Url::parse_with_params(&endpoint.url(path), query).map_err(|e| {
            Error::TenantApi {
                operation,
                message: e.to_string(),
                retryable: false,
            }
        })?;
        let result = self
            .http
            .get(url)
            .basic_auth(&endpoint.username, Some(&endpoint.password))
            .send()
            .await;
        let response = Self::check(operation, result).await?;
        response.json().await.map_err(|e| Error::TenantApi {
            operation,
            message: format!("invalid response body: {e}"),
            retryable: false,
        })
    }
}

#[async_trait]
impl TenantApi for HttpTenantApi {
    async fn find_auth_provider(
        &self,
        endpoint: &TenantEndpoint,
        name: &str,
    ) -> Result<Option<String>> {
        let operation = "list auth providers";
        let list: AuthProviderList = self
            .get_json(operation, endpoint, AUTH_PROVIDERS_PATH, &[("name", name)])
            .await?;
        Ok(list
            .auth_providers
            .into_iter()
            .find(|p| p.name == name)
            .map(|p| p.id))
    }

    async fn list_groups(
        &self,
        endpoint: &TenantEndpoint,
        provider_id: &str,
    ) -> Result<Vec<GroupRequest>> {
        let list: GroupList = self
            .get_json(
                "list groups",
                endpoint,
                GROUPS_PATH,
                &[("authProviderId", provider_id)],
            )
            .await?;
        Ok(list
            .groups
            .into_iter()
            .filter(|g| g.props.auth_provider_id == provider_id)
            .collect())
    }

    async fn create_auth_provider(
        &self,
        endpoint: &TenantEndpoint,
        request: &AuthProviderRequest,
    ) -> Result<String> {
        let operation = "create auth provider";
        let result = self
            .http
            .post(endpoint.url(AUTH_PROVIDERS_PATH))
            .basic_auth(&endpoint.username, Some(&endpoint.password))
            .json(request)
            .send()
            .await;
        let response = Self::check(operation, result).await?;
        let created: AuthProviderSummary =
            response.json().await.map_err(|e| Error::TenantApi {
                operation,
                message: format!("invalid response body: {e}"),
                retryable: false,
            })?;
        debug!(id = %created.id, name = %request.name, "Created auth provider");
        Ok(created.id)
    }

    async fn create_group(&self, endpoint: &TenantEndpoint, group: &GroupRequest) -> Result<()> {
        let result = self
            .http
            .post(endpoint.url(GROUPS_PATH))
            .basic_auth(&endpoint.username, Some(&endpoint.password))
            .json(group)
            .send()
            .await;
        Self::check("create group", result).await?;
        Ok(())
    }

    async fn probe(&self, url: &str) -> bool {
        match self
            .http
            .get(url)
            .timeout(UI_REACHABILITY_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(url, error = %e, "Reachability probe failed");
                false
            }
        }
    }
}

#[cfg(test)]
#[path = "tenant_api_tests.rs"]
mod tenant_api_tests;
