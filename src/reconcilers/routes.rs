// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! OpenShift routes of a tenant.
//!
//! Two routes expose Central:
//!
//! - `managed-central-reencrypt` serves the UI host. The router terminates TLS
//!   with the tenant's UI certificate and re-encrypts towards Central, trusting
//!   the CA from the operator-generated `central-tls` secret.
//! - `managed-central-passthrough` serves the data host. TLS is passed through
//!   to Central untouched.
//!
//! [`RoutesReconciler`] writes both routes. [`RouteDiscovery`] runs last in the
//! pipeline and reports the admitted hosts upstream.

use super::pipeline::{Completion, Step, SubReconciler, TenantRun};
use crate::config::RouteParameters;
use crate::constants::{
    CENTRAL_SERVICE_NAME, CENTRAL_SERVICE_PORT_NAME, CENTRAL_TLS_CA_KEY, CENTRAL_TLS_SECRET_NAME,
    FIELD_MANAGER, PASSTHROUGH_ROUTE_NAME, REENCRYPT_ROUTE_NAME, ROUTE_ADMITTED_CONDITION,
};
use crate::context::Context;
use crate::crd::{termination, Route, RouteIngress, RoutePort, RouteSpec, RouteTargetReference, TlsConfig};
use crate::errors::{is_not_found, Error, KubeResultExt, Result};
use crate::labels::{
    is_owned_by, merge_additive, ownership_labels, ROUTE_RATE_LIMIT_CONCURRENT_TCP,
    ROUTE_RATE_LIMIT_ENABLED, ROUTE_RATE_LIMIT_RATE_HTTP, ROUTE_RATE_LIMIT_RATE_TCP,
    ROUTE_TIMEOUT,
};
use crate::metrics::{record_resource_created, record_resource_deleted, record_resource_updated};
use crate::model::{DataPlaneRoute, ManagedCentral};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::{DeleteParams, ObjectMeta, PostParams};
use kube::{Api, Client, ResourceExt};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Whether every entry of `subset` is present with the same value in `map`.
fn contains_all(map: &BTreeMap<String, String>, subset: &BTreeMap<String, String>) -> bool {
    subset.iter().all(|(key, value)| map.get(key) == Some(value))
}

/// Whether `existing` already has the spec of `desired`. TLS termination
/// names are compared case-insensitively.
#[must_use]
pub fn spec_matches(existing: &RouteSpec, desired: &RouteSpec) -> bool {
    fn normalized(spec: &RouteSpec) -> RouteSpec {
        let mut spec = spec.clone();
        if let Some(tls) = spec.tls.as_mut() {
            tls.termination.make_ascii_lowercase();
        }
        spec
    }
    normalized(existing) == normalized(desired)
}

fn route_annotations(params: &RouteParameters, reencrypt: bool) -> BTreeMap<String, String> {
    let mut annotations = BTreeMap::new();
    if params.throttling_enabled {
        annotations.insert(ROUTE_RATE_LIMIT_ENABLED.to_string(), "true".to_string());
        annotations.insert(
            ROUTE_RATE_LIMIT_CONCURRENT_TCP.to_string(),
            params.concurrent_tcp.to_string(),
        );
        annotations.insert(
            ROUTE_RATE_LIMIT_RATE_HTTP.to_string(),
            params.rate_http.to_string(),
        );
        annotations.insert(
            ROUTE_RATE_LIMIT_RATE_TCP.to_string(),
            params.rate_tcp.to_string(),
        );
    }
    if reencrypt {
        annotations.insert(
            ROUTE_TIMEOUT.to_string(),
            format!("{}s", params.reencrypt_timeout.as_secs()),
        );
    }
    annotations
}

fn route(
    central: &ManagedCentral,
    namespace: &str,
    name: &str,
    host: &str,
    tls: TlsConfig,
    annotations: BTreeMap<String, String>,
) -> Route {
    let mut route = Route::new(
        name,
        RouteSpec {
            host: host.to_string(),
            port: Some(RoutePort {
                target_port: IntOrString::String(CENTRAL_SERVICE_PORT_NAME.to_string()),
            }),
            to: RouteTargetReference {
                kind: "Service".to_string(),
                name: CENTRAL_SERVICE_NAME.to_string(),
                weight: Some(100),
            },
            tls: Some(tls),
        },
    );
    route.metadata = ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        labels: Some(ownership_labels(&central.id)),
        annotations: Some(annotations),
        ..ObjectMeta::default()
    };
    route
}

/// Re-encrypt route of the UI host, trusting `central_ca` towards Central.
#[must_use]
pub fn reencrypt_route(
    central: &ManagedCentral,
    namespace: &str,
    central_ca: &str,
    params: &RouteParameters,
) -> Route {
    let endpoint = &central.spec.ui_endpoint;
    let tls = TlsConfig {
        termination: termination::REENCRYPT.to_string(),
        certificate: Some(endpoint.tls.cert.clone()).filter(|c| !c.is_empty()),
        key: Some(endpoint.tls.key.clone()).filter(|k| !k.is_empty()),
        destination_ca_certificate: Some(central_ca.to_string()),
        insecure_edge_termination_policy: None,
    };
    route(
        central,
        namespace,
        REENCRYPT_ROUTE_NAME,
        &endpoint.host,
        tls,
        route_annotations(params, true),
    )
}

/// Passthrough route of the data host.
#[must_use]
pub fn passthrough_route(
    central: &ManagedCentral,
    namespace: &str,
    params: &RouteParameters,
) -> Route {
    let tls = TlsConfig {
        termination: termination::PASSTHROUGH.to_string(),
        ..TlsConfig::default()
    };
    route(
        central,
        namespace,
        PASSTHROUGH_ROUTE_NAME,
        &central.spec.data_endpoint.host,
        tls,
        route_annotations(params, false),
    )
}

/// First ingress of a route the router reports as `Admitted=True`.
#[must_use]
pub fn admitted_ingress(route: &Route) -> Option<&RouteIngress> {
    route.status.as_ref()?.ingress.iter().find(|ingress| {
        ingress
            .conditions
            .iter()
            .any(|c| c.r#type == ROUTE_ADMITTED_CONDITION && c.status == "True")
    })
}

/// Route operations in one tenant namespace.
#[derive(Clone)]
pub struct RouteService {
    api: Api<Route>,
    namespace: String,
    tenant_id: String,
}

impl RouteService {
    #[must_use]
    pub fn new(client: Client, namespace: &str, tenant_id: &str) -> Self {
        RouteService {
            api: Api::namespaced(client, namespace),
            namespace: namespace.to_string(),
            tenant_id: tenant_id.to_string(),
        }
    }

    fn key(&self, name: &str) -> String {
        format!("Route {}/{name}", self.namespace)
    }

    pub async fn get(&self, name: &str) -> Result<Option<Route>> {
        self.api.get_opt(name).await.with_context("get", self.key(name))
    }

    /// Create `desired` or update the existing route when its spec or any
    /// desired label or annotation differs. Returns whether anything was written.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotOwned`] when a route of that name exists without this
    /// tenant's ownership labels, or the wrapped Kubernetes error.
    pub async fn ensure(&self, desired: Route) -> Result<bool> {
        let name = desired.name_any();
        let key = self.key(&name);
        let params = PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..PostParams::default()
        };

        let Some(existing) = self.get(&name).await? else {
            self.api
                .create(&params, &desired)
                .await
                .with_context("create", &key)?;
            record_resource_created("Route");
            info!(key = %key, host = %desired.spec.host, "Created route");
            return Ok(true);
        };

        if !is_owned_by(existing.labels(), &self.tenant_id) {
            return Err(Error::NotOwned {
                key,
                tenant: self.tenant_id.clone(),
            });
        }

        if spec_matches(&existing.spec, &desired.spec)
            && contains_all(existing.labels(), desired.labels())
            && contains_all(existing.annotations(), desired.annotations())
        {
            debug!(key = %key, "Route up to date");
            return Ok(false);
        }

        let mut updated = existing.clone();
        updated.spec = desired.spec.clone();
        updated.metadata.labels = Some(merge_additive(
            existing.metadata.labels.as_ref(),
            desired.labels(),
        ));
        updated.metadata.annotations = Some(merge_additive(
            existing.metadata.annotations.as_ref(),
            desired.annotations(),
        ));
        self.api
            .replace(&name, &params, &updated)
            .await
            .with_context("replace", &key)?;
        record_resource_updated("Route");
        info!(key = %key, "Updated route");
        Ok(true)
    }

    /// Delete a route. Returns whether it was still present.
    ///
    /// # Errors
    ///
    /// Returns the wrapped Kubernetes error.
    pub async fn delete(&self, name: &str) -> Result<bool> {
        match self.api.delete(name, &DeleteParams::background()).await {
            Ok(_) => {
                record_resource_deleted("Route");
                info!(key = %self.key(name), "Deleted route");
                Ok(true)
            }
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(Error::kube("delete", self.key(name), e)),
        }
    }
}

/// CA certificate from `central-tls`, if the operator has created it yet.
async fn central_ca(ctx: &Context, namespace: &str) -> Result<Option<String>> {
    let api: Api<Secret> = Api::namespaced(ctx.client.clone(), namespace);
    let secret = api.get_opt(CENTRAL_TLS_SECRET_NAME).await.with_context(
        "get",
        format!("Secret {namespace}/{CENTRAL_TLS_SECRET_NAME}"),
    )?;
    Ok(secret
        .and_then(|s| s.data)
        .and_then(|data| data.get(CENTRAL_TLS_CA_KEY).cloned())
        .and_then(|ca| String::from_utf8(ca.0).ok())
        .filter(|ca| !ca.is_empty()))
}

pub struct RoutesReconciler;

#[async_trait]
impl SubReconciler for RoutesReconciler {
    fn name(&self) -> &'static str {
        "routes"
    }

    async fn ensure_present(&self, ctx: &Context, run: &mut TenantRun<'_>) -> Result<Step> {
        if !ctx.options.use_routes {
            return Ok(Step::Continue);
        }
        let params = &ctx.options.routes;
        let routes = RouteService::new(ctx.client.clone(), &run.namespace, run.tenant_id);

        match central_ca(ctx, &run.namespace).await? {
            Some(ca) => {
                routes
                    .ensure(reencrypt_route(run.central, &run.namespace, &ca, params))
                    .await?;
            }
            None => run.defer(format!(
                "secret {CENTRAL_TLS_SECRET_NAME} with {CENTRAL_TLS_CA_KEY} not found yet"
            )),
        }

        routes
            .ensure(passthrough_route(run.central, &run.namespace, params))
            .await?;
        Ok(Step::Continue)
    }

    async fn ensure_absent(&self, ctx: &Context, run: &mut TenantRun<'_>) -> Result<Completion> {
        if !ctx.options.use_routes {
            return Ok(Completion::Done);
        }
        let routes = RouteService::new(ctx.client.clone(), &run.namespace, run.tenant_id);
        for name in [REENCRYPT_ROUTE_NAME, PASSTHROUGH_ROUTE_NAME] {
            if let Some(existing) = routes.get(name).await? {
                if is_owned_by(existing.labels(), run.tenant_id) {
                    routes.delete(name).await?;
                }
            }
        }
        Ok(Completion::Done)
    }
}

/// Collects the admitted hosts of both routes for the status report.
pub struct RouteDiscovery;

#[async_trait]
impl SubReconciler for RouteDiscovery {
    fn name(&self) -> &'static str {
        "route-discovery"
    }

    async fn ensure_present(&self, ctx: &Context, run: &mut TenantRun<'_>) -> Result<Step> {
        if !ctx.options.use_routes || run.central.is_ready_upstream() || !run.deferred.is_empty() {
            return Ok(Step::Continue);
        }
        let routes = RouteService::new(ctx.client.clone(), &run.namespace, run.tenant_id);

        let mut discovered = Vec::new();
        for name in [REENCRYPT_ROUTE_NAME, PASSTHROUGH_ROUTE_NAME] {
            let route = routes
                .get(name)
                .await?
                .ok_or_else(|| Error::NotReady(format!("route {name} not found")))?;
            let ingress = admitted_ingress(&route)
                .ok_or_else(|| Error::NotReady(format!("route {name} not admitted yet")))?;
            let domain = if ingress.host.is_empty() {
                route.spec.host.clone()
            } else {
                ingress.host.clone()
            };
            discovered.push(DataPlaneRoute {
                domain,
                router: ingress.router_canonical_hostname.clone(),
            });
        }
        debug!(tenant = %run.tenant_id, routes = ?discovered, "Discovered admitted routes");
        run.routes = discovered;
        Ok(Step::Continue)
    }
}

#[cfg(test)]
#[path = "routes_tests.rs"]
mod routes_tests;
