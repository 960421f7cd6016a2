// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Rendering of the tenant-resources bundle.
//!
//! The tenant pipeline treats rendering as an opaque step: values go in, a list
//! of [`DynamicObject`]s comes out, and the object tracker applies them. Every
//! rendered object carries the release label `app.kubernetes.io/instance` so the
//! deletion pipeline can find it again by label alone.
//!
//! The built-in [`TenantResourcesRenderer`] produces the tenant's network
//! policies and, when an egress-proxy image is configured, the egress proxy.

use crate::constants::TENANT_RESOURCES_RELEASE;
use crate::errors::{Error, Result};
use crate::labels::{ownership_labels, K8S_INSTANCE, K8S_NAME};
use kube::api::{ApiResource, DynamicObject, GroupVersionKind};
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// Inputs of one render.
#[derive(Debug, Clone)]
pub struct RenderRequest<'a> {
    pub tenant_id: &'a str,
    pub namespace: &'a str,
    /// Tenant-specific values from Fleet Manager, `null` when absent
    pub values: &'a Value,
}

/// Turns values into cluster objects.
pub trait ChartRenderer: Send + Sync {
    /// Release name, also the value of the release label.
    fn release(&self) -> &str;

    /// Kinds this renderer may produce. Deletion and garbage collection only
    /// look at these kinds.
    fn owned_kinds(&self) -> Vec<GroupVersionKind>;

    /// Render the objects of one tenant.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Render`] when the values cannot be rendered.
    fn render(&self, request: &RenderRequest<'_>) -> Result<Vec<DynamicObject>>;
}

/// Parse the group, version and kind of a rendered object.
///
/// # Errors
///
/// Returns [`Error::Render`] when the object has no type information.
pub fn gvk_of(object: &DynamicObject) -> Result<GroupVersionKind> {
    let types = object.types.as_ref().ok_or_else(|| Error::Render {
        chart: object.metadata.name.clone().unwrap_or_default(),
        message: "rendered object has no apiVersion/kind".into(),
    })?;
    let (group, version) = match types.api_version.split_once('/') {
        Some((group, version)) => (group, version),
        None => ("", types.api_version.as_str()),
    };
    Ok(GroupVersionKind::gvk(group, version, &types.kind))
}

/// [`ApiResource`] of a rendered object.
///
/// # Errors
///
/// Returns [`Error::Render`] when the object has no type information.
pub fn api_resource_of(object: &DynamicObject) -> Result<ApiResource> {
    Ok(ApiResource::from_gvk(&gvk_of(object)?))
}

const EGRESS_PROXY_NAME: &str = "egress-proxy";
const EGRESS_PROXY_PORT: i32 = 3128;
const CENTRAL_APP: &str = "central";
const DEFAULT_RDS_CIDR: &str = "10.1.0.0/16";

/// Built-in renderer of the `tenant-resources` release.
#[derive(Debug, Clone, Default)]
pub struct TenantResourcesRenderer {
    egress_proxy_image: Option<String>,
}

impl TenantResourcesRenderer {
    #[must_use]
    pub fn new(egress_proxy_image: Option<String>) -> Self {
        TenantResourcesRenderer { egress_proxy_image }
    }

    fn labels(&self, request: &RenderRequest<'_>, name: &str) -> BTreeMap<String, String> {
        let mut labels = ownership_labels(request.tenant_id);
        if let Some(extra) = request.values.get("labels").and_then(Value::as_object) {
            for (key, value) in extra {
                if let Some(value) = value.as_str() {
                    labels.insert(key.clone(), value.to_string());
                }
            }
        }
        labels.insert(K8S_INSTANCE.to_string(), TENANT_RESOURCES_RELEASE.to_string());
        labels.insert(K8S_NAME.to_string(), name.to_string());
        labels
    }

    fn object(&self, request: &RenderRequest<'_>, mut value: Value) -> Result<DynamicObject> {
        let name = value["metadata"]["name"].as_str().unwrap_or_default().to_string();
        value["metadata"]["namespace"] = json!(request.namespace);
        value["metadata"]["labels"] = json!(self.labels(request, &name));
        serde_json::from_value(value).map_err(|e| Error::Render {
            chart: TENANT_RESOURCES_RELEASE.to_string(),
            message: format!("{name}: {e}"),
        })
    }

    fn network_policies(&self, request: &RenderRequest<'_>) -> Vec<Value> {
        let rds_cidr = request
            .values
            .get("centralRdsCidrBlock")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_RDS_CIDR);

        vec![
            json!({
                "apiVersion": "networking.k8s.io/v1",
                "kind": "NetworkPolicy",
                "metadata": {"name": "default-deny-all-except-dns"},
                "spec": {
                    "podSelector": {},
                    "policyTypes": ["Ingress", "Egress"],
                    "egress": [{
                        "ports": [
                            {"protocol": "UDP", "port": 53},
                            {"protocol": "TCP", "port": 53},
                            {"protocol": "UDP", "port": 5353},
                            {"protocol": "TCP", "port": 5353}
                        ]
                    }]
                }
            }),
            json!({
                "apiVersion": "networking.k8s.io/v1",
                "kind": "NetworkPolicy",
                "metadata": {"name": "tenant-allow-same-namespace"},
                "spec": {
                    "podSelector": {},
                    "policyTypes": ["Ingress", "Egress"],
                    "ingress": [{"from": [{"podSelector": {}}]}],
                    "egress": [{"to": [{"podSelector": {}}]}]
                }
            }),
            json!({
                "apiVersion": "networking.k8s.io/v1",
                "kind": "NetworkPolicy",
                "metadata": {"name": "central-allow-router"},
                "spec": {
                    "podSelector": {"matchLabels": {"app": CENTRAL_APP}},
                    "policyTypes": ["Ingress"],
                    "ingress": [{
                        "from": [{
                            "namespaceSelector": {
                                "matchLabels": {"network.openshift.io/policy-group": "ingress"}
                            }
                        }],
                        "ports": [{"protocol": "TCP", "port": 8443}]
                    }]
                }
            }),
            json!({
                "apiVersion": "networking.k8s.io/v1",
                "kind": "NetworkPolicy",
                "metadata": {"name": "central-allow-egress"},
                "spec": {
                    "podSelector": {"matchLabels": {"app": CENTRAL_APP}},
                    "policyTypes": ["Egress"],
                    "egress": [
                        {"ports": [{"protocol": "TCP", "port": 443}, {"protocol": "TCP", "port": 6443}]},
                        {
                            "to": [{"ipBlock": {"cidr": rds_cidr}}],
                            "ports": [{"protocol": "TCP", "port": 5432}]
                        }
                    ]
                }
            }),
        ]
    }

    fn egress_proxy(&self, image: &str) -> Vec<Value> {
        let selector = json!({"app": EGRESS_PROXY_NAME});
        vec![
            json!({
                "apiVersion": "v1",
                "kind": "ConfigMap",
                "metadata": {"name": format!("{EGRESS_PROXY_NAME}-config")},
                "data": {
                    "squid.conf": format!(
                        "http_port {EGRESS_PROXY_PORT}\nhttp_access allow localnet\nhttp_access deny all\n"
                    )
                }
            }),
            json!({
                "apiVersion": "apps/v1",
                "kind": "Deployment",
                "metadata": {"name": EGRESS_PROXY_NAME},
                "spec": {
                    "replicas": 3,
                    "selector": {"matchLabels": selector},
                    "template": {
                        "metadata": {"labels": selector},
                        "spec": {
                            "containers": [{
                                "name": EGRESS_PROXY_NAME,
                                "image": image,
                                "ports": [{"name": "proxy", "containerPort": EGRESS_PROXY_PORT}],
                                "volumeMounts": [{"name": "config", "mountPath": "/etc/squid"}]
                            }],
                            "volumes": [{
                                "name": "config",
                                "configMap": {"name": format!("{EGRESS_PROXY_NAME}-config")}
                            }]
                        }
                    }
                }
            }),
            json!({
                "apiVersion": "v1",
                "kind": "Service",
                "metadata": {"name": EGRESS_PROXY_NAME},
                "spec": {
                    "selector": selector,
                    "ports": [{"name": "proxy", "port": EGRESS_PROXY_PORT, "targetPort": "proxy"}]
                }
            }),
        ]
    }
}

impl ChartRenderer for TenantResourcesRenderer {
    fn release(&self) -> &str {
        TENANT_RESOURCES_RELEASE
    }

    fn owned_kinds(&self) -> Vec<GroupVersionKind> {
        vec![
            GroupVersionKind::gvk("networking.k8s.io", "v1", "NetworkPolicy"),
            GroupVersionKind::gvk("", "v1", "ConfigMap"),
            GroupVersionKind::gvk("apps", "v1", "Deployment"),
            GroupVersionKind::gvk("", "v1", "Service"),
        ]
    }

    fn render(&self, request: &RenderRequest<'_>) -> Result<Vec<DynamicObject>> {
        if !(request.values.is_null() || request.values.is_object()) {
            return Err(Error::Render {
                chart: TENANT_RESOURCES_RELEASE.to_string(),
                message: "values must be an object".into(),
            });
        }

        let mut manifests = self.network_policies(request);
        if let Some(image) = self.egress_proxy_image.as_deref() {
            manifests.extend(self.egress_proxy(image));
        }

        manifests
            .into_iter()
            .map(|manifest| self.object(request, manifest))
            .collect()
    }
}

#[cfg(test)]
#[path = "charts_tests.rs"]
mod charts_tests;
