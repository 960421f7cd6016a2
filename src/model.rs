// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Wire types exchanged with Fleet Manager.
//!
//! A [`ManagedCentral`] describes one tenant owned by this cluster. Fleet Manager
//! returns them in a [`ManagedCentralList`] and receives one
//! [`DataPlaneCentralStatus`] per tenant in return.

use crate::constants::TENANT_NAMESPACE_PREFIX;
use crate::status_reasons::{
    CONDITION_STATUS_FALSE, CONDITION_STATUS_TRUE, CONDITION_TYPE_READY,
    FORCE_RECONCILE_ALWAYS, REASON_DELETED, REASON_ERROR, REASON_INSTALLING,
    REQUEST_STATUS_PROVISIONING, REQUEST_STATUS_READY,
};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// List of tenants assigned to this cluster.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ManagedCentralList {
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub items: Vec<ManagedCentral>,
}

/// One tenant as declared by Fleet Manager.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ManagedCentral {
    /// Stable tenant ID
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub kind: String,

    #[serde(default)]
    pub metadata: ManagedCentralMetadata,

    #[serde(default)]
    pub spec: ManagedCentralSpec,

    /// Fleet Manager side lifecycle state (`provisioning`, `ready`, ...)
    #[serde(default)]
    pub request_status: String,

    /// `always` disables the unchanged short-circuit
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub force_reconcile: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ManagedCentralMetadata {
    /// Tenant display name, also the name of the Central CR
    #[serde(default)]
    pub name: String,

    /// Target namespace; empty means `rhacs-<id>`
    #[serde(default)]
    pub namespace: String,

    /// Empty means desired-present
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub deletion_timestamp: String,

    /// Internal tenants skip telemetry and the final DB snapshot
    #[serde(default)]
    pub internal: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expired_at: Option<String>,

    /// Names of secrets whose encrypted bodies Fleet Manager stores
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secrets_stored: Vec<String>,

    /// Encrypted secret bodies, only present when fetched explicitly
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub secrets: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ManagedCentralSpec {
    #[serde(default)]
    pub owners: Vec<String>,

    #[serde(default)]
    pub auth: CentralAuth,

    #[serde(default)]
    pub ui_endpoint: UiEndpoint,

    #[serde(default)]
    pub data_endpoint: DataEndpoint,

    #[serde(default)]
    pub central: CentralComponent,

    #[serde(default)]
    pub scanner: ScannerComponent,

    /// Values handed to the tenant-resources renderer
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub tenant_resources_values: serde_json::Value,
}

/// SSO client and owner information of a tenant.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CentralAuth {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub owner_user_id: String,
    #[serde(default)]
    pub owner_org_id: String,
    #[serde(default)]
    pub owner_org_name: String,
    #[serde(default)]
    pub issuer: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UiEndpoint {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub tls: EndpointTls,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EndpointTls {
    #[serde(default)]
    pub cert: String,
    #[serde(default)]
    pub key: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DataEndpoint {
    #[serde(default)]
    pub host: String,
}

/// Resource requests and limits as quantity strings.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRequirements {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub requests: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub limits: BTreeMap<String, String>,
}

impl ResourceRequirements {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty() && self.limits.is_empty()
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CentralComponent {
    #[serde(default)]
    pub resources: ResourceRequirements,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScannerComponent {
    #[serde(default)]
    pub analyzer: ScannerAnalyzer,
    #[serde(default)]
    pub db: ScannerDb,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScannerAnalyzer {
    #[serde(default)]
    pub resources: ResourceRequirements,
    #[serde(default)]
    pub scaling: ScannerScaling,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScannerScaling {
    /// `Enabled` or `Disabled`
    #[serde(default)]
    pub auto_scaling: String,
    #[serde(default)]
    pub replicas: i32,
    #[serde(default)]
    pub min_replicas: i32,
    #[serde(default)]
    pub max_replicas: i32,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScannerDb {
    #[serde(default)]
    pub resources: ResourceRequirements,
}

impl ManagedCentral {
    /// Namespace the tenant lives in.
    #[must_use]
    pub fn namespace(&self) -> String {
        if self.metadata.namespace.is_empty() {
            format!("{TENANT_NAMESPACE_PREFIX}{}", self.id)
        } else {
            self.metadata.namespace.clone()
        }
    }

    /// Name of the tenant's Central CR.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Whether Fleet Manager wants the tenant gone.
    #[must_use]
    pub fn is_deleting(&self) -> bool {
        !self.metadata.deletion_timestamp.is_empty()
    }

    #[must_use]
    pub fn is_internal(&self) -> bool {
        self.metadata.internal
    }

    /// Whether Fleet Manager already considers the tenant ready.
    #[must_use]
    pub fn is_ready_upstream(&self) -> bool {
        self.request_status
            .eq_ignore_ascii_case(REQUEST_STATUS_READY)
    }

    #[must_use]
    pub fn is_provisioning_upstream(&self) -> bool {
        self.request_status
            .eq_ignore_ascii_case(REQUEST_STATUS_PROVISIONING)
    }

    #[must_use]
    pub fn force_reconcile_always(&self) -> bool {
        self.force_reconcile == FORCE_RECONCILE_ALWAYS
    }

    /// Synthetic deletion request for a tenant whose namespace is still labelled
    /// on the cluster but no longer listed by Fleet Manager.
    #[must_use]
    pub fn orphaned(id: &str, namespace: &str) -> Self {
        ManagedCentral {
            id: id.to_string(),
            metadata: ManagedCentralMetadata {
                namespace: namespace.to_string(),
                deletion_timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

/// Status of one tenant as reported to Fleet Manager.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DataPlaneCentralStatus {
    #[serde(default)]
    pub conditions: Vec<DataPlaneCondition>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<DataPlaneRoute>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DataPlaneCondition {
    #[serde(rename = "type")]
    pub r#type: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

/// Admitted route of a tenant.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub struct DataPlaneRoute {
    /// Hostname served by the route
    pub domain: String,
    /// Canonical hostname of the router that admitted it
    pub router: String,
}

impl DataPlaneCentralStatus {
    fn with_ready(status: &str, reason: &str, message: &str) -> Self {
        DataPlaneCentralStatus {
            conditions: vec![DataPlaneCondition {
                r#type: CONDITION_TYPE_READY.to_string(),
                status: status.to_string(),
                reason: reason.to_string(),
                message: message.to_string(),
            }],
            routes: Vec::new(),
        }
    }

    /// `Ready=True`.
    #[must_use]
    pub fn ready() -> Self {
        Self::with_ready(CONDITION_STATUS_TRUE, "", "")
    }

    /// `Ready=False, Reason=Installing`.
    #[must_use]
    pub fn installing(message: &str) -> Self {
        Self::with_ready(CONDITION_STATUS_FALSE, REASON_INSTALLING, message)
    }

    /// `Ready=False, Reason=Deleted`.
    #[must_use]
    pub fn deleted() -> Self {
        Self::with_ready(CONDITION_STATUS_FALSE, REASON_DELETED, "")
    }

    /// `Ready=False, Reason=Error`.
    #[must_use]
    pub fn error(message: &str) -> Self {
        Self::with_ready(CONDITION_STATUS_FALSE, REASON_ERROR, message)
    }

    #[must_use]
    pub fn with_routes(mut self, routes: Vec<DataPlaneRoute>) -> Self {
        self.routes = routes;
        self
    }

    fn ready_condition(&self) -> Option<&DataPlaneCondition> {
        self.conditions
            .iter()
            .find(|c| c.r#type == CONDITION_TYPE_READY)
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready_condition()
            .is_some_and(|c| c.status == CONDITION_STATUS_TRUE)
    }

    /// Reason of the `Ready` condition, empty when absent.
    #[must_use]
    pub fn reason(&self) -> &str {
        self.ready_condition().map_or("", |c| c.reason.as_str())
    }
}

#[cfg(test)]
#[path = "model_tests.rs"]
mod model_tests;
