// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Tenant namespace.
//!
//! The namespace carries the ownership labels plus the organisation and
//! instance-type labels. A namespace observed as `Terminating` is never written
//! to; the tenant stays retryable until the old namespace is gone.

use super::pipeline::{Completion, Step, SubReconciler, TenantRun};
use super::tracker::Removal;
use crate::constants::NAMESPACE_DELETION_TIMEOUT;
use crate::context::Context;
use crate::errors::{Error, KubeResultExt, Result};
use crate::labels::{
    EXPIRED_AT_ANNOTATION, INSTANCE_TYPE_INTERNAL, INSTANCE_TYPE_LABEL, INSTANCE_TYPE_STANDARD,
    ORG_ID_LABEL, ORG_NAME_ANNOTATION,
};
use crate::model::ManagedCentral;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Namespace;
use kube::api::ObjectMeta;
use kube::Api;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Desired namespace of a tenant. Ownership labels are added by the tracker.
#[must_use]
pub fn desired_namespace(central: &ManagedCentral, namespace: &str) -> Namespace {
    let instance_type = if central.is_internal() {
        INSTANCE_TYPE_INTERNAL
    } else {
        INSTANCE_TYPE_STANDARD
    };
    let labels = BTreeMap::from([
        (ORG_ID_LABEL.to_string(), central.spec.auth.owner_org_id.clone()),
        (INSTANCE_TYPE_LABEL.to_string(), instance_type.to_string()),
    ]);

    let mut annotations = BTreeMap::from([(
        ORG_NAME_ANNOTATION.to_string(),
        central.spec.auth.owner_org_name.clone(),
    )]);
    if let Some(expired_at) = &central.metadata.expired_at {
        annotations.insert(EXPIRED_AT_ANNOTATION.to_string(), expired_at.clone());
    }

    Namespace {
        metadata: ObjectMeta {
            name: Some(namespace.to_string()),
            labels: Some(labels),
            annotations: Some(annotations),
            ..ObjectMeta::default()
        },
        ..Namespace::default()
    }
}

pub struct NamespaceReconciler;

#[async_trait]
impl SubReconciler for NamespaceReconciler {
    fn name(&self) -> &'static str {
        "namespace"
    }

    async fn ensure_present(&self, ctx: &Context, run: &mut TenantRun<'_>) -> Result<Step> {
        let api: Api<Namespace> = Api::all(ctx.client.clone());
        let existing = api
            .get_opt(&run.namespace)
            .await
            .with_context("get", format!("Namespace {}", run.namespace))?;

        if existing.is_some_and(|ns| ns.metadata.deletion_timestamp.is_some()) {
            warn!(namespace = %run.namespace, "Namespace is terminating, waiting before re-creating it");
            return Err(Error::NotReady(format!(
                "namespace {} is terminating",
                run.namespace
            )));
        }

        run.tracker()
            .apply(&api, &(), desired_namespace(run.central, &run.namespace))
            .await?;
        Ok(Step::Continue)
    }

    async fn ensure_absent(&self, ctx: &Context, run: &mut TenantRun<'_>) -> Result<Completion> {
        let api: Api<Namespace> = Api::all(ctx.client.clone());
        match run.tracker().delete(&api, &(), &run.namespace).await? {
            Removal::Gone => {
                debug!(namespace = %run.namespace, "Namespace is gone");
                Ok(Completion::Done)
            }
            Removal::Pending if run.deletion_started.elapsed() > NAMESPACE_DELETION_TIMEOUT => {
                Err(Error::DeletionTimeout {
                    what: format!("namespace {}", run.namespace),
                    after: NAMESPACE_DELETION_TIMEOUT,
                })
            }
            Removal::Pending => Ok(Completion::Pending(format!(
                "namespace {} is terminating",
                run.namespace
            ))),
        }
    }
}

#[cfg(test)]
#[path = "namespace_tests.rs"]
mod namespace_tests;
