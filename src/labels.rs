// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Common label and annotation constants used across all sub-reconcilers.
//!
//! This module defines the ownership labels every managed object carries and the
//! tenant-specific labels/annotations, plus helpers to build and check them.

use std::collections::BTreeMap;

// ============================================================================
// Kubernetes Standard Labels
// https://kubernetes.io/docs/concepts/overview/working-with-objects/common-labels/
// ============================================================================

/// Standard label for the tool being used to manage the operation of an application
pub const K8S_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Standard label for a unique name identifying the instance of an application
pub const K8S_INSTANCE: &str = "app.kubernetes.io/instance";

/// Standard label for the name of the application
pub const K8S_NAME: &str = "app.kubernetes.io/name";

/// Value for `app.kubernetes.io/managed-by` on every object this agent owns
pub const MANAGED_BY_FLEETSHARD: &str = "rhacs-fleetshard";

// ============================================================================
// Tenant Labels
// ============================================================================

/// Label carrying the tenant ID
pub const TENANT_LABEL: &str = "rhacs.redhat.com/tenant";

/// Label carrying the owner organisation ID
pub const ORG_ID_LABEL: &str = "rhacs.redhat.com/org-id";

/// Label distinguishing internal from standard tenants
pub const INSTANCE_TYPE_LABEL: &str = "rhacs.redhat.com/instance-type";

/// `instance-type` value for internal tenants
pub const INSTANCE_TYPE_INTERNAL: &str = "internal";

/// `instance-type` value for customer tenants
pub const INSTANCE_TYPE_STANDARD: &str = "standard";

// ============================================================================
// Annotations
// ============================================================================

/// Owner organisation display name
pub const ORG_NAME_ANNOTATION: &str = "rhacs.redhat.com/org-name";

/// Timestamp after which the tenant is expired
pub const EXPIRED_AT_ANNOTATION: &str = "rhacs.redhat.com/expired-at";

/// Content hash of a tracker-applied object
pub const OBJECT_HASH_ANNOTATION: &str = "rhacs.redhat.com/object-hash";

/// Revision counter of the Central custom resource
pub const REVISION_ANNOTATION: &str = "rhacs.redhat.com/revision";

/// Operator annotation suspending reconciliation of a Central
pub const PAUSE_RECONCILE_ANNOTATION: &str = "stackrox.io/pause-reconcile";

/// Marks a Central as managed by the service
pub const MANAGED_SERVICES_ANNOTATION: &str = "platform.stackrox.io/managed-services";

/// Distinguishes the bootstrap superuser from the runtime user on the DB secret
pub const DB_USER_TYPE_ANNOTATION: &str = "user-type";

/// `user-type` of the bootstrap superuser
pub const DB_USER_TYPE_MASTER: &str = "master";

/// `user-type` of the least-privileged runtime user
pub const DB_USER_TYPE_CENTRAL: &str = "central";

// ============================================================================
// Route annotations
// ============================================================================

/// Enables HAProxy rate limiting on a route
pub const ROUTE_RATE_LIMIT_ENABLED: &str = "haproxy.router.openshift.io/rate-limit-connections";

/// Concurrent TCP connections per source IP
pub const ROUTE_RATE_LIMIT_CONCURRENT_TCP: &str =
    "haproxy.router.openshift.io/rate-limit-connections.concurrent-tcp";

/// HTTP requests per source IP per 3 seconds
pub const ROUTE_RATE_LIMIT_RATE_HTTP: &str =
    "haproxy.router.openshift.io/rate-limit-connections.rate-http";

/// TCP connections per source IP per 3 seconds
pub const ROUTE_RATE_LIMIT_RATE_TCP: &str =
    "haproxy.router.openshift.io/rate-limit-connections.rate-tcp";

/// Server-side timeout of a route
pub const ROUTE_TIMEOUT: &str = "haproxy.router.openshift.io/timeout";

/// Build the ownership label pair for a tenant.
#[must_use]
pub fn ownership_labels(tenant_id: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (K8S_MANAGED_BY.to_string(), MANAGED_BY_FLEETSHARD.to_string()),
        (TENANT_LABEL.to_string(), tenant_id.to_string()),
    ])
}

/// Check whether a label set carries the full ownership pair for `tenant_id`.
///
/// Deletion paths call this before touching any object; an object missing either
/// label is never deleted.
#[must_use]
pub fn is_owned_by(labels: &BTreeMap<String, String>, tenant_id: &str) -> bool {
    labels.get(K8S_MANAGED_BY).map(String::as_str) == Some(MANAGED_BY_FLEETSHARD)
        && labels.get(TENANT_LABEL).map(String::as_str) == Some(tenant_id)
}

/// Label selector matching every object managed by this agent.
#[must_use]
pub fn managed_selector() -> String {
    format!("{K8S_MANAGED_BY}={MANAGED_BY_FLEETSHARD}")
}

/// Label selector matching every object of one tenant.
#[must_use]
pub fn tenant_selector(tenant_id: &str) -> String {
    format!("{K8S_MANAGED_BY}={MANAGED_BY_FLEETSHARD},{TENANT_LABEL}={tenant_id}")
}

/// Additively merge `desired` into `existing`.
///
/// Desired keys overwrite same-named existing keys, existing keys absent from
/// `desired` are preserved.
#[must_use]
pub fn merge_additive(
    existing: Option<&BTreeMap<String, String>>,
    desired: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut merged = existing.cloned().unwrap_or_default();
    for (key, value) in desired {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

#[cfg(test)]
#[path = "labels_tests.rs"]
mod labels_tests;
