// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Readiness of a tenant.
//!
//! A tenant is ready once the `central` deployment has at least one available
//! replica and, when the reachability check is enabled, its UI host answers
//! through the public route. Until then the run finishes early with
//! `Ready=False, Reason=Installing`.
//!
//! A tenant Fleet Manager still lists as `provisioning` whose payload did not
//! change since the last run is not reported again: the status upstream is
//! already `Installing`, so the run finishes with [`Outcome::Unchanged`].

use super::pipeline::{Outcome, Step, SubReconciler, TenantRun};
use crate::constants::CENTRAL_DEPLOYMENT_NAME;
use crate::context::Context;
use crate::errors::{KubeResultExt, Result};
use crate::model::DataPlaneCentralStatus;
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use kube::Api;
use tracing::debug;

/// Message reported while the deployment has no available replica
pub const DEPLOYMENT_NOT_READY: &str = "central deployment is not ready";

/// Message reported while the UI host does not answer
pub const UI_NOT_REACHABLE: &str = "central UI is not reachable";

/// Whether a deployment has at least one available replica.
#[must_use]
pub fn deployment_ready(deployment: &Deployment) -> bool {
    deployment
        .status
        .as_ref()
        .and_then(|status| status.available_replicas)
        .is_some_and(|available| available >= 1)
}

/// Step result for a tenant that is not ready yet.
#[must_use]
pub fn not_ready(run: &TenantRun<'_>, message: &str) -> Step {
    if run.central.is_provisioning_upstream() && run.hash_unchanged {
        Step::Finish(Outcome::Unchanged)
    } else {
        Step::Finish(Outcome::Status(DataPlaneCentralStatus::installing(message)))
    }
}

pub struct ReadinessReconciler;

#[async_trait]
impl SubReconciler for ReadinessReconciler {
    fn name(&self) -> &'static str {
        "readiness"
    }

    async fn ensure_present(&self, ctx: &Context, run: &mut TenantRun<'_>) -> Result<Step> {
        let api: Api<Deployment> = Api::namespaced(ctx.client.clone(), &run.namespace);
        let deployment = api.get_opt(CENTRAL_DEPLOYMENT_NAME).await.with_context(
            "get",
            format!("Deployment {}/{CENTRAL_DEPLOYMENT_NAME}", run.namespace),
        )?;

        if !deployment.as_ref().is_some_and(deployment_ready) {
            debug!(tenant = %run.tenant_id, "Central deployment not ready");
            return Ok(not_ready(run, DEPLOYMENT_NOT_READY));
        }

        if ctx.options.ui_reachability_check {
            let url = format!("https://{}/", run.central.spec.ui_endpoint.host);
            if !ctx.tenant_api.probe(&url).await {
                debug!(tenant = %run.tenant_id, url = %url, "Central UI not reachable");
                return Ok(not_ready(run, UI_NOT_REACHABLE));
            }
        }
        Ok(Step::Continue)
    }
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod status_tests;
