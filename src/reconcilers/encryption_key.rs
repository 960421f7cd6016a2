// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Encryption key-chain secret.
//!
//! Central encrypts sensitive data at rest with keys from a key chain stored in
//! the secret `central-encryption-key-chain`. The secret is only ever created;
//! an existing key chain is never touched since rotating it would make existing
//! data unreadable.

use super::pipeline::{Step, SubReconciler, TenantRun};
use crate::constants::{
    ENCRYPTION_KEY_CHAIN_FILE, ENCRYPTION_KEY_LEN, ENCRYPTION_KEY_SECRET_NAME, FIELD_MANAGER,
};
use crate::context::Context;
use crate::errors::{is_conflict, Error, KubeResultExt, Result};
use crate::labels::ownership_labels;
use crate::metrics::record_resource_created;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::api::{ObjectMeta, PostParams};
use kube::Api;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Key chain document as read by Central.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyChain {
    /// Base64 keys by index
    pub key_map: BTreeMap<u32, String>,
    pub active_key_index: u32,
}

impl KeyChain {
    /// A chain holding one freshly generated AES-256 key at index 0.
    #[must_use]
    pub fn generate() -> Self {
        let mut key = [0u8; ENCRYPTION_KEY_LEN];
        rand::thread_rng().fill(&mut key[..]);
        KeyChain {
            key_map: BTreeMap::from([(0, BASE64.encode(key))]),
            active_key_index: 0,
        }
    }

    /// Serialise as the YAML document stored in the secret.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] when YAML serialisation fails.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self)
            .map_err(|e| Error::InvalidState(format!("cannot serialise key chain: {e}")))
    }
}

pub struct EncryptionKeyReconciler;

#[async_trait]
impl SubReconciler for EncryptionKeyReconciler {
    fn name(&self) -> &'static str {
        "encryption-key"
    }

    async fn ensure_present(&self, ctx: &Context, run: &mut TenantRun<'_>) -> Result<Step> {
        let api: Api<Secret> = Api::namespaced(ctx.client.clone(), &run.namespace);
        let key = format!("Secret {}/{ENCRYPTION_KEY_SECRET_NAME}", run.namespace);

        if api
            .get_opt(ENCRYPTION_KEY_SECRET_NAME)
            .await
            .with_context("get", &key)?
            .is_some()
        {
            debug!(namespace = %run.namespace, "Encryption key chain exists");
            return Ok(Step::Continue);
        }

        let chain = KeyChain::generate().to_yaml()?;
        let secret = Secret {
            metadata: ObjectMeta {
                name: Some(ENCRYPTION_KEY_SECRET_NAME.to_string()),
                namespace: Some(run.namespace.clone()),
                labels: Some(ownership_labels(run.tenant_id)),
                ..ObjectMeta::default()
            },
            data: Some(BTreeMap::from([(
                ENCRYPTION_KEY_CHAIN_FILE.to_string(),
                ByteString(chain.into_bytes()),
            )])),
            ..Secret::default()
        };
        let params = PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..PostParams::default()
        };

        match api.create(&params, &secret).await {
            Ok(_) => {
                record_resource_created("Secret");
                info!(namespace = %run.namespace, "Created encryption key chain");
            }
            Err(e) if is_conflict(&e) => {
                debug!(namespace = %run.namespace, "Encryption key chain created concurrently");
            }
            Err(e) => return Err(Error::kube("create", key, e)),
        }
        Ok(Step::Continue)
    }
}
