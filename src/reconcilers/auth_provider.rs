// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! SSO auth provider of a tenant.
//!
//! Once Central is ready, an OIDC auth provider named `Red Hat SSO` is created
//! through the tenant's own API, authenticated as `admin` with the password the
//! operator generated into `central-htpasswd`. Members of the owning
//! organisation get the `Admin` role; everybody else gets `None`.
//!
//! Every run looks up the provider and its groups before creating anything, so
//! an interrupted run resumes where it stopped: a provider created earlier is
//! never duplicated and groups still missing are created. The tenant reconciler
//! only caches the result once the provider and both groups exist.

use super::pipeline::{Step, SubReconciler, TenantRun};
use crate::constants::{
    AUTH_PROVIDER_DEFAULT_ROLE, AUTH_PROVIDER_NAME, AUTH_PROVIDER_ORG_ROLE,
    AUTH_PROVIDER_POLL_INTERVAL, AUTH_PROVIDER_POLL_TIMEOUT, CENTRAL_HTPASSWD_PASSWORD_KEY,
    CENTRAL_HTPASSWD_SECRET_NAME,
};
use crate::context::Context;
use crate::errors::{Error, KubeResultExt, Result};
use crate::model::ManagedCentral;
use crate::tenant_api::{
    AuthProviderRequest, GroupProperties, GroupRequest, RequiredAttribute, TenantApi,
    TenantEndpoint,
};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::Api;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Provider type of the SSO auth provider
pub const OIDC_PROVIDER_TYPE: &str = "oidc";

/// Attribute carrying the organisation ID in the tenant's auth model
pub const ORG_ID_ATTRIBUTE: &str = "orgid";

/// Token claim carrying the organisation ID
pub const ORG_ID_CLAIM: &str = "org_id";

/// Auth provider request of a tenant.
#[must_use]
pub fn auth_provider_request(central: &ManagedCentral) -> AuthProviderRequest {
    let auth = &central.spec.auth;
    AuthProviderRequest {
        name: AUTH_PROVIDER_NAME.to_string(),
        provider_type: OIDC_PROVIDER_TYPE.to_string(),
        ui_endpoint: central.spec.ui_endpoint.host.clone(),
        enabled: true,
        active: true,
        config: BTreeMap::from([
            ("issuer".to_string(), auth.issuer.clone()),
            ("client_id".to_string(), auth.client_id.clone()),
            ("client_secret".to_string(), auth.client_secret.clone()),
            ("mode".to_string(), "post".to_string()),
            (
                "disable_offline_access_scope".to_string(),
                "true".to_string(),
            ),
        ]),
        required_attributes: vec![RequiredAttribute {
            attribute_key: ORG_ID_ATTRIBUTE.to_string(),
            attribute_value: auth.owner_org_id.clone(),
        }],
        claim_mappings: BTreeMap::from([(ORG_ID_CLAIM.to_string(), ORG_ID_ATTRIBUTE.to_string())]),
    }
}

/// Default and organisation groups of a provider.
#[must_use]
pub fn group_requests(central: &ManagedCentral, provider_id: &str) -> [GroupRequest; 2] {
    [
        GroupRequest {
            props: GroupProperties {
                auth_provider_id: provider_id.to_string(),
                key: String::new(),
                value: String::new(),
            },
            role_name: AUTH_PROVIDER_DEFAULT_ROLE.to_string(),
        },
        GroupRequest {
            props: GroupProperties {
                auth_provider_id: provider_id.to_string(),
                key: ORG_ID_ATTRIBUTE.to_string(),
                value: central.spec.auth.owner_org_id.clone(),
            },
            role_name: AUTH_PROVIDER_ORG_ROLE.to_string(),
        },
    ]
}

/// Poll until the provider is listed, checking once before every sleep.
/// Returns the provider ID.
///
/// # Errors
///
/// Returns [`Error::NotReady`] after `timeout`, [`Error::Cancelled`] when
/// `cancel` fires, or the tenant API error of a failed check.
pub async fn wait_for_provider(
    api: &dyn TenantApi,
    endpoint: &TenantEndpoint,
    interval: Duration,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<String> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(id) = api.find_auth_provider(endpoint, AUTH_PROVIDER_NAME).await? {
            return Ok(id);
        }
        if Instant::now() + interval > deadline {
            return Err(Error::NotReady(format!(
                "auth provider {AUTH_PROVIDER_NAME} not visible after {timeout:?}"
            )));
        }
        tokio::select! {
            () = cancel.cancelled() => return Err(Error::Cancelled),
            () = tokio::time::sleep(interval) => {}
        }
    }
}

/// Create the groups of `provider_id` that do not exist yet. Returns how many
/// were created.
///
/// # Errors
///
/// Returns the tenant API error of the listing or of the first failed creation.
pub async fn ensure_groups(
    api: &dyn TenantApi,
    endpoint: &TenantEndpoint,
    central: &ManagedCentral,
    provider_id: &str,
) -> Result<usize> {
    let existing = api.list_groups(endpoint, provider_id).await?;
    let mut created = 0;
    for group in group_requests(central, provider_id) {
        if existing.iter().any(|g| g.props == group.props) {
            continue;
        }
        api.create_group(endpoint, &group).await?;
        debug!(provider = %provider_id, role = %group.role_name, "Created auth provider group");
        created += 1;
    }
    Ok(created)
}

async fn admin_password(ctx: &Context, namespace: &str) -> Result<String> {
    let api: Api<Secret> = Api::namespaced(ctx.client.clone(), namespace);
    let secret = api.get_opt(CENTRAL_HTPASSWD_SECRET_NAME).await.with_context(
        "get",
        format!("Secret {namespace}/{CENTRAL_HTPASSWD_SECRET_NAME}"),
    )?;
    secret
        .and_then(|s| s.data)
        .and_then(|data| data.get(CENTRAL_HTPASSWD_PASSWORD_KEY).cloned())
        .and_then(|password| String::from_utf8(password.0).ok())
        .filter(|password| !password.is_empty())
        .ok_or_else(|| {
            Error::NotReady(format!(
                "secret {CENTRAL_HTPASSWD_SECRET_NAME} has no admin password yet"
            ))
        })
}

pub struct AuthProviderReconciler;

#[async_trait]
impl SubReconciler for AuthProviderReconciler {
    fn name(&self) -> &'static str {
        "auth-provider"
    }

    async fn ensure_present(&self, ctx: &Context, run: &mut TenantRun<'_>) -> Result<Step> {
        if !ctx.options.create_auth_provider || run.has_auth_provider {
            return Ok(Step::Continue);
        }

        let password = admin_password(ctx, &run.namespace).await?;
        let endpoint = TenantEndpoint::in_namespace(&run.namespace, &password);
        let api = ctx.tenant_api.as_ref();

        let provider_id = match api.find_auth_provider(&endpoint, AUTH_PROVIDER_NAME).await? {
            Some(id) => {
                debug!(tenant = %run.tenant_id, provider = %id, "Auth provider already exists");
                id
            }
            None => {
                let created = api
                    .create_auth_provider(&endpoint, &auth_provider_request(run.central))
                    .await?;
                info!(tenant = %run.tenant_id, provider = %created, "Created auth provider");
                wait_for_provider(
                    api,
                    &endpoint,
                    AUTH_PROVIDER_POLL_INTERVAL,
                    AUTH_PROVIDER_POLL_TIMEOUT,
                    &ctx.cancel,
                )
                .await?
            }
        };

        let created = ensure_groups(api, &endpoint, run.central, &provider_id).await?;
        if created > 0 {
            info!(tenant = %run.tenant_id, provider = %provider_id, created, "Created auth provider groups");
        }
        run.has_auth_provider = true;
        Ok(Step::Continue)
    }
}

#[cfg(test)]
#[path = "auth_provider_tests.rs"]
mod auth_provider_tests;
