// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! `Central` custom resource of a tenant.
//!
//! # Dry-run diff
//!
//! The operator's admission webhook defaults fields of every `Central`, so a
//! desired spec never equals the stored one field by field. Before writing,
//! the merged desired object is sent as a server-side dry-run replace and the
//! result (defaulted the same way as the stored object) is compared with the
//! existing CR. Only a difference in spec, labels or annotations triggers a
//! real replace.
//!
//! # Revision
//!
//! Every real write increments the `rhacs.redhat.com/revision` annotation,
//! starting at `1` on create. A non-integer revision written out of band is
//! reported as [`Error::InvalidState`] rather than overwritten.

use super::pipeline::{Completion, Step, SubReconciler, TenantRun};
use super::tracker::Removal;
use crate::cloud::DbConnection;
use crate::constants::{DB_PASSWORD_SECRET_NAME, FIELD_MANAGER};
use crate::context::Context;
use crate::crd::{
    Central, CentralComponentSpec, CentralDbSpec, CentralSpec, EnabledFlag, ExposureSpec,
    LocalSecretReference, MonitoringSpec, Resources, ScannerAnalyzerSpec, ScannerComponentSpec,
    ScannerDbSpec, ScannerScalingSpec, TelemetrySpec,
};
use crate::errors::{Error, KubeResultExt, Result};
use crate::labels::{
    merge_additive, ownership_labels, tenant_selector, EXPIRED_AT_ANNOTATION,
    MANAGED_SERVICES_ANNOTATION, ORG_NAME_ANNOTATION, PAUSE_RECONCILE_ANNOTATION,
    REVISION_ANNOTATION,
};
use crate::metrics::{record_resource_created, record_resource_updated};
use crate::model::{ManagedCentral, ResourceRequirements, ScannerScaling};
use async_trait::async_trait;
use kube::api::{ListParams, ObjectMeta, Patch, PatchParams, PostParams};
use kube::{Api, ResourceExt};
use serde_json::json;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// `isEnabled` value of an external database
const DB_ENABLED: &str = "Enabled";

fn resources(requirements: &ResourceRequirements) -> Option<Resources> {
    (!requirements.is_empty()).then(|| Resources {
        requests: requirements.requests.clone(),
        limits: requirements.limits.clone(),
    })
}

fn scaling(scaling: &ScannerScaling) -> Option<ScannerScalingSpec> {
    (!scaling.auto_scaling.is_empty()).then(|| ScannerScalingSpec {
        auto_scaling: Some(scaling.auto_scaling.clone()),
        replicas: Some(scaling.replicas),
        min_replicas: Some(scaling.min_replicas),
        max_replicas: Some(scaling.max_replicas),
    })
}

/// Desired `Central` of a tenant, without the revision annotation.
///
/// # Errors
///
/// Returns [`Error::InvalidState`] when the tenant has no name.
pub fn desired_central(
    central: &ManagedCentral,
    namespace: &str,
    db: Option<&DbConnection>,
) -> Result<Central> {
    if central.name().is_empty() {
        return Err(Error::InvalidState(format!(
            "tenant {} has no name for its Central",
            central.id
        )));
    }

    let mut annotations = BTreeMap::from([
        (MANAGED_SERVICES_ANNOTATION.to_string(), "true".to_string()),
        (
            ORG_NAME_ANNOTATION.to_string(),
            central.spec.auth.owner_org_name.clone(),
        ),
    ]);
    if let Some(expired_at) = &central.metadata.expired_at {
        annotations.insert(EXPIRED_AT_ANNOTATION.to_string(), expired_at.clone());
    }

    let scanner = &central.spec.scanner;
    let spec = CentralSpec {
        central: Some(CentralComponentSpec {
            exposure: Some(ExposureSpec {
                route: Some(EnabledFlag { enabled: false }),
            }),
            db: db.map(|connection| CentralDbSpec {
                is_enabled: Some(DB_ENABLED.to_string()),
                connection_string: Some(connection.connection_string()),
                password_secret: Some(LocalSecretReference {
                    name: DB_PASSWORD_SECRET_NAME.to_string(),
                }),
            }),
            resources: resources(&central.spec.central.resources),
            telemetry: Some(TelemetrySpec {
                enabled: !central.is_internal(),
            }),
        }),
        scanner: Some(ScannerComponentSpec {
            analyzer: Some(ScannerAnalyzerSpec {
                resources: resources(&scanner.analyzer.resources),
                scaling: scaling(&scanner.analyzer.scaling),
            }),
            db: Some(ScannerDbSpec {
                resources: resources(&scanner.db.resources),
            }),
        }),
        monitoring: Some(MonitoringSpec {
            openshift: Some(EnabledFlag { enabled: false }),
        }),
    };

    let mut cr = Central::new(central.name(), spec);
    cr.metadata = ObjectMeta {
        name: Some(central.name().to_string()),
        namespace: Some(namespace.to_string()),
        labels: Some(ownership_labels(&central.id)),
        annotations: Some(annotations),
        ..ObjectMeta::default()
    };
    Ok(cr)
}

/// Revision annotation of an existing `Central`; absent counts as `0`.
///
/// # Errors
///
/// Returns [`Error::InvalidState`] when the annotation is not an integer.
pub fn parse_revision(cr: &Central) -> Result<u64> {
    match cr.annotations().get(REVISION_ANNOTATION) {
        None => Ok(0),
        Some(value) => value.trim().parse().map_err(|_| {
            Error::InvalidState(format!(
                "Central {} has invalid {REVISION_ANNOTATION} annotation '{value}'",
                cr.name_any()
            ))
        }),
    }
}

fn set_revision(cr: &mut Central, revision: u64) {
    cr.annotations_mut()
        .insert(REVISION_ANNOTATION.to_string(), revision.to_string());
}

/// `desired` merged onto `existing`: additive labels and annotations, the
/// existing revision and resource version.
#[must_use]
pub fn merge_onto(existing: &Central, mut desired: Central, revision: u64) -> Central {
    desired.metadata.labels = Some(merge_additive(
        existing.metadata.labels.as_ref(),
        desired.labels(),
    ));
    desired.metadata.annotations = Some(merge_additive(
        existing.metadata.annotations.as_ref(),
        desired.annotations(),
    ));
    set_revision(&mut desired, revision);
    desired.metadata.resource_version = existing.metadata.resource_version.clone();
    desired
}

/// Whether two stored `Central`s differ in anything the agent manages.
#[must_use]
pub fn differs(left: &Central, right: &Central) -> bool {
    left.spec != right.spec
        || left.labels() != right.labels()
        || left.annotations() != right.annotations()
}

fn params(dry_run: bool) -> PostParams {
    PostParams {
        dry_run,
        field_manager: Some(FIELD_MANAGER.to_string()),
    }
}

pub struct CentralReconciler;

#[async_trait]
impl SubReconciler for CentralReconciler {
    fn name(&self) -> &'static str {
        "central"
    }

    async fn ensure_present(&self, ctx: &Context, run: &mut TenantRun<'_>) -> Result<Step> {
        if ctx.managed_database().is_some() && run.db_connection.is_none() {
            debug!(tenant = %run.tenant_id, "No database connection yet, leaving Central untouched");
            return Ok(Step::Continue);
        }
        let mut desired =
            desired_central(run.central, &run.namespace, run.db_connection.as_ref())?;
        let name = desired.name_any();
        let key = format!("Central {}/{name}", run.namespace);
        let api: Api<Central> = Api::namespaced(ctx.client.clone(), &run.namespace);

        let Some(existing) = api.get_opt(&name).await.with_context("get", &key)? else {
            set_revision(&mut desired, 1);
            api.create(&params(false), &desired)
                .await
                .with_context("create", &key)?;
            record_resource_created("Central");
            info!(key = %key, revision = 1, "Created Central");
            return Ok(Step::Continue);
        };

        if !run.tracker().owns(&existing) {
            return Err(Error::NotOwned {
                key,
                tenant: run.tenant_id.to_string(),
            });
        }

        let revision = parse_revision(&existing)?;
        let mut merged = merge_onto(&existing, desired, revision);
        let normalized = api
            .replace(&name, &params(true), &merged)
            .await
            .with_context("dry-run replace", &key)?;

        if !differs(&normalized, &existing) {
            debug!(key = %key, revision, "Central unchanged");
            return Ok(Step::Continue);
        }

        set_revision(&mut merged, revision + 1);
        api.replace(&name, &params(false), &merged)
            .await
            .with_context("replace", &key)?;
        record_resource_updated("Central");
        info!(key = %key, revision = revision + 1, "Updated Central");
        Ok(Step::Continue)
    }

    async fn ensure_absent(&self, ctx: &Context, run: &mut TenantRun<'_>) -> Result<Completion> {
        let api: Api<Central> = Api::namespaced(ctx.client.clone(), &run.namespace);
        let selector = tenant_selector(run.tenant_id);
        let centrals = api
            .list(&ListParams::default().labels(&selector))
            .await
            .with_context("list", format!("Central {}", run.namespace))?;

        let mut pending = Vec::new();
        for cr in centrals.items {
            let name = cr.name_any();
            if cr
                .annotations()
                .get(PAUSE_RECONCILE_ANNOTATION)
                .is_some_and(|value| value == "true")
            {
                let patch = json!({"metadata": {"annotations": {PAUSE_RECONCILE_ANNOTATION: "false"}}});
                let patch_params = PatchParams {
                    field_manager: Some(FIELD_MANAGER.to_string()),
                    ..PatchParams::default()
                };
                api.patch(&name, &patch_params, &Patch::Merge(&patch))
                    .await
                    .with_context("unpause", format!("Central {}/{name}", run.namespace))?;
                info!(namespace = %run.namespace, name = %name, "Unpaused Central before deletion");
            }
            if run.tracker().delete(&api, &(), &name).await? == Removal::Pending {
                pending.push(name);
            }
        }

        if pending.is_empty() {
            Ok(Completion::Done)
        } else {
            Ok(Completion::Pending(format!(
                "Central {} terminating",
                pending.join(", ")
            )))
        }
    }
}

#[cfg(test)]
#[path = "central_tests.rs"]
mod central_tests;
