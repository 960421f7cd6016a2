// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Ordered sub-reconciler pipeline of one tenant.
//!
//! A [`Pipeline`] holds two ordered lists of [`SubReconciler`]s: one run while
//! the tenant is desired present, one run while it is desired absent. Steps
//! share a [`TenantRun`] carrying what earlier steps learned (database
//! connection, discovered routes, deferred conditions).
//!
//! # Present
//!
//! Steps run strictly in order. An error short-circuits the pipeline and is
//! returned unchanged. A step may also finish the run early with an
//! [`Outcome`], e.g. readiness reporting `Installing`.
//!
//! # Absent
//!
//! Steps are non-blocking. The pipeline stops at the first step whose deletion
//! is still pending, so later steps never observe a half-deleted predecessor:
//! the namespace is only deleted after the database is gone, keeping the
//! database override `ConfigMap` readable for as long as it is needed.

use super::tracker::ObjectTracker;
use crate::cloud::DbConnection;
use crate::context::Context;
use crate::errors::Result;
use crate::model::{DataPlaneCentralStatus, DataPlaneRoute, ManagedCentral};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::debug;

/// State shared by the steps of one reconcile.
#[derive(Debug)]
pub struct TenantRun<'a> {
    pub central: &'a ManagedCentral,
    pub tenant_id: &'a str,
    pub namespace: String,
    /// The tenant payload hashes equal to the last successful run
    pub hash_unchanged: bool,
    /// Set by the database step when a managed database is in use
    pub db_connection: Option<DbConnection>,
    /// Admitted routes found by route discovery
    pub routes: Vec<DataPlaneRoute>,
    /// Conditions that let the run continue but keep the tenant `Installing`
    pub deferred: Vec<String>,
    /// The tenant's auth provider is known to exist
    pub has_auth_provider: bool,
    /// When this tenant's deletion was first observed
    pub deletion_started: Instant,
}

impl<'a> TenantRun<'a> {
    #[must_use]
    pub fn new(central: &'a ManagedCentral) -> Self {
        TenantRun {
            central,
            tenant_id: &central.id,
            namespace: central.namespace(),
            hash_unchanged: false,
            db_connection: None,
            routes: Vec::new(),
            deferred: Vec::new(),
            has_auth_provider: false,
            deletion_started: Instant::now(),
        }
    }

    #[must_use]
    pub fn tracker(&self) -> ObjectTracker<'a> {
        ObjectTracker::new(self.tenant_id)
    }

    /// Record a condition that keeps the tenant from being reported ready.
    pub fn defer(&mut self, note: impl Into<String>) {
        let note = note.into();
        debug!(tenant = %self.tenant_id, note = %note, "Deferring readiness");
        self.deferred.push(note);
    }
}

/// Final result of a run that did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Report this status
    Status(DataPlaneCentralStatus),
    /// Nothing to report
    Unchanged,
}

/// Result of one present step.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Continue,
    Finish(Outcome),
}

/// Result of one absent step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Done,
    /// Deletion requested but not observed complete
    Pending(String),
}

/// One resource class of a tenant.
#[async_trait]
pub trait SubReconciler: Send + Sync {
    fn name(&self) -> &'static str;

    /// Converge the resource class towards the tenant's desired state.
    async fn ensure_present(&self, _ctx: &Context, _run: &mut TenantRun<'_>) -> Result<Step> {
        Ok(Step::Continue)
    }

    /// Request removal of the resource class without waiting for it.
    async fn ensure_absent(&self, _ctx: &Context, _run: &mut TenantRun<'_>) -> Result<Completion> {
        Ok(Completion::Done)
    }
}

/// Ordered sub-reconcilers of a tenant.
#[derive(Clone)]
pub struct Pipeline {
    present: Vec<Arc<dyn SubReconciler>>,
    absent: Vec<Arc<dyn SubReconciler>>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("present", &self.present_steps())
            .field("absent", &self.absent_steps())
            .finish()
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::standard()
    }
}

impl Pipeline {
    #[must_use]
    pub fn new(present: Vec<Arc<dyn SubReconciler>>, absent: Vec<Arc<dyn SubReconciler>>) -> Self {
        Pipeline { present, absent }
    }

    /// The production pipeline.
    #[must_use]
    pub fn standard() -> Self {
        use super::{
            auth_provider::AuthProviderReconciler, central::CentralReconciler,
            database::DatabaseReconciler, encryption_key::EncryptionKeyReconciler,
            namespace::NamespaceReconciler, pull_secret::PullSecretReconciler,
            routes::{RouteDiscovery, RoutesReconciler},
            secret_restore::SecretRestoreReconciler, status::ReadinessReconciler,
            tenant_resources::TenantResourcesReconciler,
        };

        let namespace: Arc<dyn SubReconciler> = Arc::new(NamespaceReconciler);
        let tenant_resources: Arc<dyn SubReconciler> = Arc::new(TenantResourcesReconciler);
        let database: Arc<dyn SubReconciler> = Arc::new(DatabaseReconciler);
        let central: Arc<dyn SubReconciler> = Arc::new(CentralReconciler);
        let routes: Arc<dyn SubReconciler> = Arc::new(RoutesReconciler);

        Pipeline {
            present: vec![
                namespace.clone(),
                Arc::new(PullSecretReconciler),
                tenant_resources.clone(),
                Arc::new(EncryptionKeyReconciler),
                Arc::new(SecretRestoreReconciler),
                database.clone(),
                central.clone(),
                routes.clone(),
                Arc::new(ReadinessReconciler),
                Arc::new(AuthProviderReconciler),
                Arc::new(RouteDiscovery),
            ],
            absent: vec![routes, central, database, tenant_resources, namespace],
        }
    }

    #[must_use]
    pub fn present_steps(&self) -> Vec<&'static str> {
        self.present.iter().map(|step| step.name()).collect()
    }

    #[must_use]
    pub fn absent_steps(&self) -> Vec<&'static str> {
        self.absent.iter().map(|step| step.name()).collect()
    }

    /// Run the present steps. `None` means every step continued.
    ///
    /// # Errors
    ///
    /// Returns the first step error unchanged.
    pub async fn ensure_present(
        &self,
        ctx: &Context,
        run: &mut TenantRun<'_>,
    ) -> Result<Option<Outcome>> {
        for step in &self.present {
            debug!(tenant = %run.tenant_id, step = step.name(), "Ensuring present");
            if let Step::Finish(outcome) = step.ensure_present(ctx, run).await? {
                debug!(tenant = %run.tenant_id, step = step.name(), "Step finished the run");
                return Ok(Some(outcome));
            }
        }
        Ok(None)
    }

    /// Run the absent steps up to the first pending one. `None` means every
    /// step is done, otherwise the pending step is described.
    ///
    /// # Errors
    ///
    /// Returns the first step error unchanged.
    pub async fn ensure_absent(
        &self,
        ctx: &Context,
        run: &mut TenantRun<'_>,
    ) -> Result<Option<String>> {
        for step in &self.absent {
            debug!(tenant = %run.tenant_id, step = step.name(), "Ensuring absent");
            if let Completion::Pending(what) = step.ensure_absent(ctx, run).await? {
                return Ok(Some(format!("{}: {what}", step.name())));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod pipeline_tests;
