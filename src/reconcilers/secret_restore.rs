// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Restore of secrets backed up in Fleet Manager.
//!
//! A tenant lists in `secretsStored` the secrets Fleet Manager keeps encrypted
//! copies of. When any of them is missing from the namespace (for example
//! after a cluster migration), the tenant is fetched with its `secrets` map,
//! each missing payload is decrypted and the secret is recreated as it was.

use super::pipeline::{Step, SubReconciler, TenantRun};
use crate::cipher::decrypt_encoded;
use crate::constants::FIELD_MANAGER;
use crate::context::Context;
use crate::errors::{is_conflict, Error, KubeResultExt, Result};
use crate::labels::ownership_labels;
use crate::metrics::record_resource_created;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{ObjectMeta, PostParams};
use kube::Api;
use tracing::{debug, info};

/// Turn a decrypted secret into one that can be created in `namespace`.
///
/// Server-populated metadata (UID, resource version, owner references, managed
/// fields) is dropped; labels gain the ownership pair.
#[must_use]
pub fn restorable_secret(mut secret: Secret, name: &str, namespace: &str, tenant_id: &str) -> Secret {
    let mut labels = secret.metadata.labels.take().unwrap_or_default();
    labels.extend(ownership_labels(tenant_id));
    secret.metadata = ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        labels: Some(labels),
        annotations: secret.metadata.annotations.take(),
        ..ObjectMeta::default()
    };
    secret
}

pub struct SecretRestoreReconciler;

#[async_trait]
impl SubReconciler for SecretRestoreReconciler {
    fn name(&self) -> &'static str {
        "secret-restore"
    }

    async fn ensure_present(&self, ctx: &Context, run: &mut TenantRun<'_>) -> Result<Step> {
        let stored = &run.central.metadata.secrets_stored;
        if stored.is_empty() {
            return Ok(Step::Continue);
        }

        let api: Api<Secret> = Api::namespaced(ctx.client.clone(), &run.namespace);
        let mut missing = Vec::new();
        for name in stored {
            let key = format!("Secret {}/{name}", run.namespace);
            if api.get_opt(name).await.with_context("get", key)?.is_none() {
                missing.push(name.as_str());
            }
        }
        if missing.is_empty() {
            debug!(namespace = %run.namespace, "All stored secrets present");
            return Ok(Step::Continue);
        }

        info!(namespace = %run.namespace, missing = ?missing, "Restoring secrets from Fleet Manager");
        let remote = ctx.fleet_manager.get_central(run.tenant_id).await?;
        let params = PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..PostParams::default()
        };

        for name in missing {
            let encoded = remote.metadata.secrets.get(name).ok_or_else(|| {
                Error::NotReady(format!("fleet manager returned no payload for secret {name}"))
            })?;
            let plaintext = decrypt_encoded(ctx.cipher.as_ref(), encoded)
                .await
                .map_err(|e| Error::Cipher {
                    secret: name.to_string(),
                    message: e.to_string(),
                })?;
            let secret: Secret = serde_json::from_slice(&plaintext)?;
            let secret = restorable_secret(secret, name, &run.namespace, run.tenant_id);

            let key = format!("Secret {}/{name}", run.namespace);
            match api.create(&params, &secret).await {
                Ok(_) => {
                    record_resource_created("Secret");
                    info!(namespace = %run.namespace, name, "Restored secret");
                }
                Err(e) if is_conflict(&e) => debug!(key = %key, "Secret restored concurrently"),
                Err(e) => return Err(Error::kube("create", key, e)),
            }
        }
        Ok(Step::Continue)
    }
}
