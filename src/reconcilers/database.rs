// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Managed database of a tenant.
//!
//! # Credentials
//!
//! The secret `central-db-password` holds the active credential. Its
//! `user-type` annotation tells which:
//!
//! - `master`: bootstrap superuser, only present until the first provision
//!   succeeds. Legacy secrets without the annotation count as `master`.
//! - `central`: least-privileged runtime user. The database is fully
//!   initialised and only its connection is looked up.
//!
//! After a successful first provision the secret is rewritten with the tenant
//! password and `user-type=central`; the master password is not kept.
//!
//! # Database ID
//!
//! Defaults to the tenant ID. The `ConfigMap` `central-db-override` may name a
//! different database (key `databaseID`), e.g. after a restore.

use super::pipeline::{Completion, Step, SubReconciler, TenantRun};
use crate::cloud::{DatabaseProvisioner, DbConnection, Deprovision};
use crate::constants::{
    DB_OVERRIDE_CONFIGMAP_NAME, DB_OVERRIDE_ID_KEY, DB_PASSWORD_KEY, DB_PASSWORD_LENGTH,
    DB_PASSWORD_SECRET_NAME, FIELD_MANAGER,
};
use crate::context::Context;
use crate::errors::{DatabaseError, Error, KubeResultExt, Result};
use crate::labels::{
    ownership_labels, DB_USER_TYPE_ANNOTATION, DB_USER_TYPE_CENTRAL, DB_USER_TYPE_MASTER,
};
use crate::metrics::{record_resource_created, record_resource_updated};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use k8s_openapi::ByteString;
use kube::api::{ObjectMeta, PostParams};
use kube::{Api, ResourceExt};
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Random alphanumeric password of `length` characters.
#[must_use]
pub fn generate_password(length: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

/// `user-type` of a credential secret; absent means `master`.
#[must_use]
pub fn user_type(secret: &Secret) -> &str {
    secret
        .annotations()
        .get(DB_USER_TYPE_ANNOTATION)
        .map_or(DB_USER_TYPE_MASTER, String::as_str)
}

/// Password stored in a credential secret.
///
/// # Errors
///
/// Returns [`Error::InvalidState`] when the key is missing or not UTF-8.
pub fn stored_password(secret: &Secret) -> Result<String> {
    let bytes = secret
        .data
        .as_ref()
        .and_then(|data| data.get(DB_PASSWORD_KEY))
        .ok_or_else(|| {
            Error::InvalidState(format!(
                "secret {DB_PASSWORD_SECRET_NAME} has no key {DB_PASSWORD_KEY}"
            ))
        })?;
    String::from_utf8(bytes.0.clone()).map_err(|_| {
        Error::InvalidState(format!("secret {DB_PASSWORD_SECRET_NAME} password is not UTF-8"))
    })
}

/// Credential secret holding `password` of the given user type.
#[must_use]
pub fn credential_secret(namespace: &str, password: &str, user_type: &str) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(DB_PASSWORD_SECRET_NAME.to_string()),
            namespace: Some(namespace.to_string()),
            annotations: Some(BTreeMap::from([(
                DB_USER_TYPE_ANNOTATION.to_string(),
                user_type.to_string(),
            )])),
            ..ObjectMeta::default()
        },
        data: Some(BTreeMap::from([(
            DB_PASSWORD_KEY.to_string(),
            ByteString(password.as_bytes().to_vec()),
        )])),
        ..Secret::default()
    }
}

/// `existing` rewritten to hold only the tenant user's password.
#[must_use]
pub fn rotated_secret(mut existing: Secret, tenant_id: &str, tenant_password: &str) -> Secret {
    existing.labels_mut().extend(ownership_labels(tenant_id));
    existing.annotations_mut().insert(
        DB_USER_TYPE_ANNOTATION.to_string(),
        DB_USER_TYPE_CENTRAL.to_string(),
    );
    existing.data = Some(BTreeMap::from([(
        DB_PASSWORD_KEY.to_string(),
        ByteString(tenant_password.as_bytes().to_vec()),
    )]));
    existing.string_data = None;
    existing
}

fn write_params() -> PostParams {
    PostParams {
        field_manager: Some(FIELD_MANAGER.to_string()),
        ..PostParams::default()
    }
}

fn secret_key(run: &TenantRun<'_>) -> String {
    format!("Secret {}/{DB_PASSWORD_SECRET_NAME}", run.namespace)
}

/// Database ID of the tenant, honouring the override `ConfigMap`.
async fn database_id(ctx: &Context, run: &TenantRun<'_>) -> Result<String> {
    let api: Api<ConfigMap> = Api::namespaced(ctx.client.clone(), &run.namespace);
    let override_id = api
        .get_opt(DB_OVERRIDE_CONFIGMAP_NAME)
        .await
        .with_context(
            "get",
            format!("ConfigMap {}/{DB_OVERRIDE_CONFIGMAP_NAME}", run.namespace),
        )?
        .and_then(|cm| cm.data)
        .and_then(|data| data.get(DB_OVERRIDE_ID_KEY).cloned())
        .filter(|id| !id.trim().is_empty());

    match override_id {
        Some(id) => {
            debug!(tenant = %run.tenant_id, database_id = %id, "Using database ID override");
            Ok(id)
        }
        None => Ok(run.tenant_id.to_string()),
    }
}

/// Connection of an initialised database. A missing cluster means it is being
/// restored: provisioning with an empty password waits for it to appear, and
/// `None` is returned while it is still missing.
async fn existing_connection(
    ctx: &Context,
    db: &dyn DatabaseProvisioner,
    database_id: &str,
) -> Result<Option<DbConnection>> {
    match db.get_db_connection(database_id).await {
        Err(Error::Database(DatabaseError::NotFound { .. })) => {
            warn!(database_id, "Initialised database not found, waiting for restore");
            match db.ensure_db_provisioned(database_id, "", "", &ctx.cancel).await {
                Ok(()) => db.get_db_connection(database_id).await.map(Some),
                Err(Error::Database(DatabaseError::NotFound { .. })) => Ok(None),
                Err(e) => Err(e),
            }
        }
        result => result.map(Some),
    }
}

pub struct DatabaseReconciler;

#[async_trait]
impl SubReconciler for DatabaseReconciler {
    fn name(&self) -> &'static str {
        "database"
    }

    async fn ensure_present(&self, ctx: &Context, run: &mut TenantRun<'_>) -> Result<Step> {
        let Some(db) = ctx.managed_database() else {
            return Ok(Step::Continue);
        };
        let database_id = database_id(ctx, run).await?;
        let api: Api<Secret> = Api::namespaced(ctx.client.clone(), &run.namespace);
        let existing = api
            .get_opt(DB_PASSWORD_SECRET_NAME)
            .await
            .with_context("get", secret_key(run))?;

        if existing
            .as_ref()
            .is_some_and(|secret| user_type(secret) == DB_USER_TYPE_CENTRAL)
        {
            match existing_connection(ctx, db.as_ref(), &database_id).await? {
                Some(connection) => run.db_connection = Some(connection),
                None => run.defer(format!("database {database_id} is being restored")),
            }
            return Ok(Step::Continue);
        }

        let (secret, master_password) = match existing {
            Some(secret) => {
                let password = stored_password(&secret)?;
                (secret, password)
            }
            None => {
                let password = generate_password(DB_PASSWORD_LENGTH);
                let mut secret = credential_secret(&run.namespace, &password, DB_USER_TYPE_MASTER);
                secret.labels_mut().extend(ownership_labels(run.tenant_id));
                let created = api
                    .create(&write_params(), &secret)
                    .await
                    .with_context("create", secret_key(run))?;
                record_resource_created("Secret");
                info!(namespace = %run.namespace, "Created database master credential");
                (created, password)
            }
        };

        let tenant_password = generate_password(DB_PASSWORD_LENGTH);
        info!(tenant = %run.tenant_id, database_id = %database_id, "Provisioning managed database");
        db.ensure_db_provisioned(&database_id, &master_password, &tenant_password, &ctx.cancel)
            .await?;

        if master_password.is_empty() {
            debug!(database_id = %database_id, "No master password, keeping credential secret");
        } else {
            let rotated = rotated_secret(secret, run.tenant_id, &tenant_password);
            api.replace(DB_PASSWORD_SECRET_NAME, &write_params(), &rotated)
                .await
                .with_context("replace", secret_key(run))?;
            record_resource_updated("Secret");
            info!(namespace = %run.namespace, "Rotated database credential to the tenant user");
        }

        run.db_connection = Some(db.get_db_connection(&database_id).await?);
        Ok(Step::Continue)
    }

    async fn ensure_absent(&self, ctx: &Context, run: &mut TenantRun<'_>) -> Result<Completion> {
        let Some(db) = ctx.managed_database() else {
            return Ok(Completion::Done);
        };
        let database_id = database_id(ctx, run).await?;

        match db
            .ensure_db_deprovisioned(&database_id, run.central.is_internal())
            .await
        {
            Ok(Deprovision::Initiated) => Ok(Completion::Pending(format!(
                "database {database_id} is being deprovisioned"
            ))),
            Ok(Deprovision::Done) => {
                let api: Api<Secret> = Api::namespaced(ctx.client.clone(), &run.namespace);
                run.tracker()
                    .delete(&api, &(), DB_PASSWORD_SECRET_NAME)
                    .await?;
                Ok(Completion::Done)
            }
            Err(Error::Database(DatabaseError::BackupInProgress { cluster })) => {
                Ok(Completion::Pending(format!("database cluster {cluster} is backing up")))
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
#[path = "database_tests.rs"]
mod database_tests;
