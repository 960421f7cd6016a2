// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Hash-tracked create/update/skip of tenant objects.
//!
//! Every object the tracker writes carries the annotation
//! `rhacs.redhat.com/object-hash` holding the hex digest of the desired object.
//! On the next reconcile:
//!
//! - **absent**: create
//! - **same hash**: skip, no write
//! - **different hash**: replace, preserving `resourceVersion`
//!
//! Objects without the tenant's ownership labels are never written or deleted.
//! Labels and annotations set by others are preserved on update.

use crate::constants::FIELD_MANAGER;
use crate::errors::{Error, KubeResultExt, Result};
use crate::labels::{is_owned_by, merge_additive, ownership_labels, OBJECT_HASH_ANNOTATION};
use crate::metrics::{record_resource_created, record_resource_deleted, record_resource_updated};
use kube::api::{DeleteParams, ListParams, PostParams};
use kube::{Api, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fmt::Debug;
use tracing::{debug, info, warn};

/// Length of a content hash in bytes.
pub const HASH_LEN: usize = 16;

/// Truncated SHA-256 over the canonical JSON of `value`.
///
/// JSON objects are serialised with sorted keys, so equal values hash equally
/// regardless of field order.
///
/// # Errors
///
/// Returns [`Error::Serialization`] when `value` cannot be serialised.
pub fn content_hash<T: Serialize>(value: &T) -> Result<[u8; HASH_LEN]> {
    let canonical = serde_json::to_vec(&serde_json::to_value(value)?)?;
    let digest = Sha256::digest(&canonical);
    let mut hash = [0u8; HASH_LEN];
    hash.copy_from_slice(&digest[..HASH_LEN]);
    Ok(hash)
}

/// Lowercase hex of a hash.
#[must_use]
pub fn hash_hex(hash: &[u8]) -> String {
    use std::fmt::Write as _;
    hash.iter().fold(String::with_capacity(hash.len() * 2), |mut out, b| {
        let _ = write!(out, "{b:02x}");
        out
    })
}

/// What [`ObjectTracker::apply`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Created,
    Updated,
    Unchanged,
}

/// Progress of a deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    /// Nothing left that this tenant owns
    Gone,
    /// Deletion requested, the object still exists
    Pending,
}

/// `kind namespace/name` for logs and errors.
pub fn object_key<K: Resource>(dt: &K::DynamicType, object: &K) -> String {
    let meta = object.meta();
    let name = meta.name.as_deref().unwrap_or_default();
    match meta.namespace.as_deref() {
        Some(ns) => format!("{} {ns}/{name}", K::kind(dt)),
        None => format!("{} {name}", K::kind(dt)),
    }
}

/// Applies and deletes objects on behalf of one tenant.
#[derive(Debug, Clone, Copy)]
pub struct ObjectTracker<'a> {
    tenant_id: &'a str,
}

impl<'a> ObjectTracker<'a> {
    #[must_use]
    pub fn new(tenant_id: &'a str) -> Self {
        ObjectTracker { tenant_id }
    }

    /// Whether the object carries this tenant's ownership labels.
    pub fn owns<K: Resource>(&self, object: &K) -> bool {
        object
            .meta()
            .labels
            .as_ref()
            .is_some_and(|labels| is_owned_by(labels, self.tenant_id))
    }

    /// Create, replace or skip `desired`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotOwned`] when an object of the same name exists without
    /// this tenant's ownership labels, or the wrapped Kubernetes error.
    pub async fn apply<K>(&self, api: &Api<K>, dt: &K::DynamicType, mut desired: K) -> Result<Applied>
    where
        K: Resource + Clone + Debug + Serialize + DeserializeOwned,
    {
        let key = object_key(dt, &desired);
        let name = desired
            .meta()
            .name
            .clone()
            .ok_or_else(|| Error::InvalidState(format!("{key} has no name")))?;

        let labels = desired.labels_mut();
        labels.extend(ownership_labels(self.tenant_id));
        desired.annotations_mut().remove(OBJECT_HASH_ANNOTATION);
        let hash = hash_hex(&content_hash(&desired)?);
        desired
            .annotations_mut()
            .insert(OBJECT_HASH_ANNOTATION.to_string(), hash.clone());

        let kind = K::kind(dt).to_string();
        let params = PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..PostParams::default()
        };

        let Some(existing) = api.get_opt(&name).await.with_context("get", &key)? else {
            debug!(key = %key, "Creating object");
            api.create(&params, &desired).await.with_context("create", &key)?;
            record_resource_created(&kind);
            info!(key = %key, "Created object");
            return Ok(Applied::Created);
        };

        if !self.owns(&existing) {
            return Err(Error::NotOwned {
                key,
                tenant: self.tenant_id.to_string(),
            });
        }

        if existing.annotations().get(OBJECT_HASH_ANNOTATION) == Some(&hash) {
            debug!(key = %key, "Object unchanged, skipping");
            return Ok(Applied::Unchanged);
        }

        let merged_labels = merge_additive(existing.meta().labels.as_ref(), desired.labels());
        let merged_annotations =
            merge_additive(existing.meta().annotations.as_ref(), desired.annotations());
        let meta = desired.meta_mut();
        meta.labels = Some(merged_labels);
        meta.annotations = Some(merged_annotations);
        meta.resource_version = existing.meta().resource_version.clone();

        api.replace(&name, &params, &desired)
            .await
            .with_context("replace", &key)?;
        record_resource_updated(&kind);
        info!(key = %key, "Updated object");
        Ok(Applied::Updated)
    }

    /// Delete the named object if this tenant owns it.
    ///
    /// Objects missing the ownership labels are left alone and reported as
    /// [`Removal::Gone`].
    ///
    /// # Errors
    ///
    /// Returns the wrapped Kubernetes error.
    pub async fn delete<K>(&self, api: &Api<K>, dt: &K::DynamicType, name: &str) -> Result<Removal>
    where
        K: Resource + Clone + Debug + DeserializeOwned,
    {
        let Some(existing) = api.get_opt(name).await.with_context("get", name)? else {
            return Ok(Removal::Gone);
        };
        self.delete_existing(api, dt, &existing).await
    }

    async fn delete_existing<K>(&self, api: &Api<K>, dt: &K::DynamicType, existing: &K) -> Result<Removal>
    where
        K: Resource + Clone + Debug + DeserializeOwned,
    {
        let key = object_key(dt, existing);
        if !self.owns(existing) {
            warn!(key = %key, "Not deleting object without ownership labels");
            return Ok(Removal::Gone);
        }
        if existing.meta().deletion_timestamp.is_some() {
            debug!(key = %key, "Object is terminating");
            return Ok(Removal::Pending);
        }

        let name = existing.name_any();
        match api.delete(&name, &DeleteParams::background()).await {
            Ok(response) if response.is_left() => {
                record_resource_deleted(K::kind(dt).as_ref());
                info!(key = %key, "Deletion of object started");
                Ok(Removal::Pending)
            }
            Ok(_) => {
                record_resource_deleted(K::kind(dt).as_ref());
                info!(key = %key, "Deleted object");
                Ok(Removal::Gone)
            }
            Err(e) if crate::errors::is_not_found(&e) => Ok(Removal::Gone),
            Err(e) => Err(Error::kube("delete", key, e)),
        }
    }

    /// Delete every owned object matching `selector`, skipping names in `keep`.
    /// Returns how many matching objects still exist.
    ///
    /// # Errors
    ///
    /// Returns the wrapped Kubernetes error.
    pub async fn delete_matching<K>(
        &self,
        api: &Api<K>,
        dt: &K::DynamicType,
        selector: &str,
        keep: &BTreeSet<String>,
    ) -> Result<usize>
    where
        K: Resource + Clone + Debug + DeserializeOwned,
    {
        let listed = api
            .list(&ListParams::default().labels(selector))
            .await
            .with_context("list", format!("{} {selector}", K::kind(dt)))?;

        let mut remaining = 0;
        for object in listed.items {
            if keep.contains(&object.name_any()) {
                continue;
            }
            if self.delete_existing(api, dt, &object).await? == Removal::Pending {
                remaining += 1;
            }
        }
        Ok(remaining)
    }
}

#[cfg(test)]
#[path = "tracker_tests.rs"]
mod tracker_tests;
