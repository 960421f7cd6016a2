// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Tenant-resources release.
//!
//! Rendered objects are applied through the object tracker. Objects of the
//! renderer's owned kinds that carry the release label but were not rendered
//! this time are pruned. Deletion removes everything carrying the release label
//! and gives up with [`Error::DeletionTimeout`] after
//! [`TENANT_RESOURCES_DELETION_TIMEOUT`].

use super::pipeline::{Completion, Step, SubReconciler, TenantRun};
use crate::charts::{api_resource_of, gvk_of, ChartRenderer, RenderRequest};
use crate::constants::TENANT_RESOURCES_DELETION_TIMEOUT;
use crate::context::Context;
use crate::errors::{Error, Result};
use crate::labels::{tenant_selector, K8S_INSTANCE};
use async_trait::async_trait;
use kube::api::{ApiResource, DynamicObject, GroupVersionKind};
use kube::{Api, ResourceExt};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info};

/// Selector of every object of `release` owned by `tenant_id`.
#[must_use]
pub fn release_selector(tenant_id: &str, release: &str) -> String {
    format!("{},{K8S_INSTANCE}={release}", tenant_selector(tenant_id))
}

fn dynamic_api(ctx: &Context, namespace: &str, resource: &ApiResource) -> Api<DynamicObject> {
    Api::namespaced_with(ctx.client.clone(), namespace, resource)
}

/// Delete owned release objects not named in `keep`, per kind. Returns how many
/// objects are still terminating.
async fn prune(
    ctx: &Context,
    run: &TenantRun<'_>,
    charts: &dyn ChartRenderer,
    keep: &HashMap<GroupVersionKind, BTreeSet<String>>,
) -> Result<usize> {
    let selector = release_selector(run.tenant_id, charts.release());
    let empty = BTreeSet::new();
    let mut remaining = 0;
    for gvk in charts.owned_kinds() {
        let resource = ApiResource::from_gvk(&gvk);
        let api = dynamic_api(ctx, &run.namespace, &resource);
        let names = keep.get(&gvk).unwrap_or(&empty);
        remaining += run
            .tracker()
            .delete_matching(&api, &resource, &selector, names)
            .await?;
    }
    Ok(remaining)
}

pub struct TenantResourcesReconciler;

#[async_trait]
impl SubReconciler for TenantResourcesReconciler {
    fn name(&self) -> &'static str {
        "tenant-resources"
    }

    async fn ensure_present(&self, ctx: &Context, run: &mut TenantRun<'_>) -> Result<Step> {
        let charts = ctx.charts.as_ref();
        let objects = charts.render(&RenderRequest {
            tenant_id: run.tenant_id,
            namespace: &run.namespace,
            values: &run.central.spec.tenant_resources_values,
        })?;
        debug!(
            namespace = %run.namespace,
            release = charts.release(),
            count = objects.len(),
            "Rendered tenant resources"
        );

        let mut keep: HashMap<GroupVersionKind, BTreeSet<String>> = HashMap::new();
        for object in objects {
            let gvk = gvk_of(&object)?;
            let resource = api_resource_of(&object)?;
            let name = object.name_any();
            let api = dynamic_api(ctx, &run.namespace, &resource);
            run.tracker().apply(&api, &resource, object).await?;
            keep.entry(gvk).or_default().insert(name);
        }

        let stale = prune(ctx, run, charts, &keep).await?;
        if stale > 0 {
            info!(namespace = %run.namespace, stale, "Pruning stale tenant resources");
        }
        Ok(Step::Continue)
    }

    async fn ensure_absent(&self, ctx: &Context, run: &mut TenantRun<'_>) -> Result<Completion> {
        let remaining = prune(ctx, run, ctx.charts.as_ref(), &HashMap::new()).await?;
        if remaining == 0 {
            return Ok(Completion::Done);
        }
        if run.deletion_started.elapsed() > TENANT_RESOURCES_DELETION_TIMEOUT {
            return Err(Error::DeletionTimeout {
                what: format!("tenant resources in {}", run.namespace),
                after: TENANT_RESOURCES_DELETION_TIMEOUT,
            });
        }
        Ok(Completion::Pending(format!(
            "{remaining} tenant resources still terminating"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReconcilerOptions;
    use crate::labels::ownership_labels;
    use crate::testing::{client_context, scripted_client, test_central};
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_deletion_times_out_after_fifteen_minutes() {
        let (client, _) = scripted_client(|_: &http::Method, _: &str| {
            let mut labels = ownership_labels("cb45");
            labels.insert(K8S_INSTANCE.into(), "tenant-resources".into());
            (
                200,
                json!({
                    "apiVersion": "v1",
                    "kind": "List",
                    "metadata": {},
                    "items": [{
                        "apiVersion": "v1",
                        "kind": "ConfigMap",
                        "metadata": {
                            "name": "stuck",
                            "namespace": "rhacs-cb45",
                            "labels": labels,
                            "deletionTimestamp": "2006-01-02T15:04:05Z"
                        }
                    }]
                }),
            )
        });
        let ctx = client_context(client, ReconcilerOptions::default());
        let central = test_central();
        let mut run = TenantRun::new(&central);

        tokio::time::advance(Duration::from_secs(14 * 60)).await;
        let completion = TenantResourcesReconciler
            .ensure_absent(&ctx, &mut run)
            .await
            .unwrap();
        assert!(matches!(completion, Completion::Pending(_)));

        tokio::time::advance(Duration::from_secs(2 * 60)).await;
        let err = TenantResourcesReconciler
            .ensure_absent(&ctx, &mut run)
            .await
            .unwrap_err();
        assert!(
            matches!(err, Error::DeletionTimeout { after, .. } if after == TENANT_RESOURCES_DELETION_TIMEOUT),
            "unexpected error {err:?}"
        );
    }

    #[test]
    fn test_release_selector() {
        assert_eq!(
            release_selector("cb45", "tenant-resources"),
            "app.kubernetes.io/managed-by=rhacs-fleetshard,rhacs.redhat.com/tenant=cb45,app.kubernetes.io/instance=tenant-resources"
        );
    }
}
