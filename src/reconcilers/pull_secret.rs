// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Image pull secret of a tenant.

use super::pipeline::{Step, SubReconciler, TenantRun};
use crate::constants::PULL_SECRET_NAME;
use crate::context::Context;
use crate::errors::Result;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::api::ObjectMeta;
use kube::Api;
use std::collections::BTreeMap;
use tracing::debug;

const DOCKER_CONFIG_JSON_TYPE: &str = "kubernetes.io/dockerconfigjson";
const DOCKER_CONFIG_JSON_KEY: &str = ".dockerconfigjson";

/// Pull secret holding `docker_config` in namespace `namespace`.
#[must_use]
pub fn desired_pull_secret(namespace: &str, docker_config: &[u8]) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(PULL_SECRET_NAME.to_string()),
            namespace: Some(namespace.to_string()),
            ..ObjectMeta::default()
        },
        type_: Some(DOCKER_CONFIG_JSON_TYPE.to_string()),
        data: Some(BTreeMap::from([(
            DOCKER_CONFIG_JSON_KEY.to_string(),
            ByteString(docker_config.to_vec()),
        )])),
        ..Secret::default()
    }
}

pub struct PullSecretReconciler;

#[async_trait]
impl SubReconciler for PullSecretReconciler {
    fn name(&self) -> &'static str {
        "pull-secret"
    }

    async fn ensure_present(&self, ctx: &Context, run: &mut TenantRun<'_>) -> Result<Step> {
        let api: Api<Secret> = Api::namespaced(ctx.client.clone(), &run.namespace);
        let payload = &ctx.options.image_pull_secret;

        if payload.is_empty() {
            debug!(namespace = %run.namespace, "No pull secret configured, ensuring absent");
            run.tracker().delete(&api, &(), PULL_SECRET_NAME).await?;
            return Ok(Step::Continue);
        }

        run.tracker()
            .apply(&api, &(), desired_pull_secret(&run.namespace, payload))
            .await?;
        Ok(Step::Continue)
    }
}
