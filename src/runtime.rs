// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Runtime poll loop.
//!
//! Every tick the runtime:
//!
//! 1. lists the tenants of this cluster from Fleet Manager
//! 2. reconciles each tenant on a bounded worker pool, skipping tenants whose
//!    reconciler is still busy
//! 3. reports the resulting statuses in one batch
//! 4. garbage-collects labelled namespaces Fleet Manager no longer lists
//! 5. updates the tenant and database quota gauges
//!
//! A failed list backs the loop off exponentially (see
//! [`RetryTicker`](crate::reconcilers::retry::RetryTicker)); any other failure
//! only affects the tenant it belongs to.
//!
//! # Garbage collection
//!
//! A namespace carrying both ownership labels whose tenant is missing from the
//! list for `gc_absent_ticks` consecutive ticks is deleted through the regular
//! absent pipeline of a synthetic deleting tenant. Its statuses are not
//! reported since Fleet Manager no longer knows the tenant.

use crate::config::RuntimeOptions;
use crate::context::Context;
use crate::errors::{Error, ErrorKind, KubeResultExt, Result};
use crate::fleetmanager::FleetManagerApi;
use crate::labels::{is_owned_by, managed_selector, TENANT_LABEL};
use crate::metrics::{set_db_account_quota, set_tenant_counts};
use crate::model::{DataPlaneCentralStatus, ManagedCentral};
use crate::reconcilers::pipeline::Pipeline;
use crate::reconcilers::retry::{http_backoff, retry_call, RetryTicker};
use crate::reconcilers::tenant::TenantReconciler;
use k8s_openapi::api::core::v1::Namespace;
use kube::api::ListParams;
use kube::{Api, ResourceExt};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// What one tick did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    /// Tenants listed by Fleet Manager
    pub listed: usize,
    /// Statuses sent upstream
    pub reported: BTreeMap<String, DataPlaneCentralStatus>,
    /// Tenants skipped because their reconciler was busy
    pub busy: usize,
    /// Orphaned tenants whose deletion ran this tick
    pub collected: Vec<String>,
}

/// Status to report for one reconcile result, `None` for sentinels.
#[must_use]
pub fn reportable(result: Result<DataPlaneCentralStatus>) -> Option<DataPlaneCentralStatus> {
    match result {
        Ok(status) => Some(status),
        Err(e) => match e.kind() {
            ErrorKind::Busy | ErrorKind::Unchanged | ErrorKind::DeletionInProgress => None,
            ErrorKind::Retryable => Some(DataPlaneCentralStatus::installing(&e.to_string())),
            ErrorKind::FatalToTenant | ErrorKind::FatalToProcess => {
                Some(DataPlaneCentralStatus::error(&e.to_string()))
            }
        },
    }
}

/// Tenant ID of a namespace carrying both ownership labels.
#[must_use]
pub fn namespace_tenant(namespace: &Namespace) -> Option<String> {
    let tenant = namespace.labels().get(TENANT_LABEL)?;
    (!tenant.is_empty() && is_owned_by(namespace.labels(), tenant)).then(|| tenant.clone())
}

/// Owns the reconciler registry and drives the poll loop.
pub struct Runtime {
    ctx: Context,
    fleet_manager: Arc<dyn FleetManagerApi>,
    options: RuntimeOptions,
    pipeline: Arc<Pipeline>,
    reconcilers: HashMap<String, Arc<TenantReconciler>>,
    /// Consecutive ticks an orphaned namespace's tenant was missing, by tenant ID
    absent_ticks: HashMap<String, u32>,
}

impl Runtime {
    #[must_use]
    pub fn new(ctx: Context, fleet_manager: Arc<dyn FleetManagerApi>, options: RuntimeOptions) -> Self {
        Runtime {
            ctx,
            fleet_manager,
            options,
            pipeline: Arc::new(Pipeline::standard()),
            reconcilers: HashMap::new(),
            absent_ticks: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_pipeline(mut self, pipeline: Pipeline) -> Self {
        self.pipeline = Arc::new(pipeline);
        self
    }

    /// Token cancelled by [`Runtime::stop`].
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.ctx.cancel.clone()
    }

    /// Cancel the loop and every in-flight reconcile.
    pub fn stop(&self) {
        info!("Stopping runtime");
        self.ctx.cancel.cancel();
    }

    /// Reconciler of a tenant, if one was created.
    #[must_use]
    pub fn reconciler(&self, tenant_id: &str) -> Option<Arc<TenantReconciler>> {
        self.reconcilers.get(tenant_id).cloned()
    }

    fn reconciler_for(&mut self, tenant_id: &str) -> Arc<TenantReconciler> {
        self.reconcilers
            .entry(tenant_id.to_string())
            .or_insert_with(|| {
                debug!(tenant = tenant_id, "Creating tenant reconciler");
                Arc::new(TenantReconciler::new(tenant_id, self.pipeline.clone()))
            })
            .clone()
    }

    /// Run ticks until stopped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when a tick fails fatally for the process.
    pub async fn start(&mut self) -> Result<()> {
        info!(
            cluster_id = %self.options.cluster_id,
            poll_period = ?self.options.poll_period,
            workers = self.options.workers,
            "Starting runtime"
        );
        let mut ticker = RetryTicker::new(self.options.poll_period);

        loop {
            let delay = match self.tick().await {
                Ok(report) => {
                    debug!(
                        listed = report.listed,
                        reported = report.reported.len(),
                        busy = report.busy,
                        collected = report.collected.len(),
                        "Tick complete"
                    );
                    ticker.succeeded()
                }
                Err(Error::Cancelled) => break,
                Err(e) if e.kind() == ErrorKind::FatalToProcess => return Err(e),
                Err(e) => {
                    let delay = ticker.failed();
                    warn!(
                        error = %e,
                        failures = ticker.consecutive_failures(),
                        retry_after = ?delay,
                        "Tick failed"
                    );
                    delay
                }
            };

            tokio::select! {
                () = self.ctx.cancel.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
            }
        }
        info!("Runtime stopped");
        Ok(())
    }

    /// One pass of the loop.
    ///
    /// # Errors
    ///
    /// Returns the Fleet Manager error when listing tenants fails, or
    /// [`Error::Cancelled`] when stopped mid-tick.
    pub async fn tick(&mut self) -> Result<TickReport> {
        let centrals = tokio::select! {
            () = self.ctx.cancel.cancelled() => return Err(Error::Cancelled),
            list = self.fleet_manager.list_centrals() => list?.items,
        };
        let mut report = TickReport {
            listed: centrals.len(),
            ..TickReport::default()
        };

        let (results, busy) = self.reconcile_all(centrals.clone()).await;
        report.busy = busy;
        for (id, result) in results {
            if let Some(status) = reportable(result) {
                report.reported.insert(id, status);
            }
        }
        if self.ctx.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        self.report(&report.reported).await;
        if self.ctx.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let listed: HashSet<&str> = centrals.iter().map(|c| c.id.as_str()).collect();
        report.collected = self.collect_garbage(&listed).await?;

        let ready = centrals
            .iter()
            .filter(|c| !c.is_deleting() && c.is_ready_upstream())
            .count();
        set_tenant_counts(centrals.len(), ready);
        self.update_quotas().await;
        Ok(report)
    }

    /// Reconcile every non-busy tenant on the worker pool and wait for all of
    /// them. Returns each result and the number of busy tenants skipped.
    async fn reconcile_all(
        &mut self,
        centrals: Vec<ManagedCentral>,
    ) -> (Vec<(String, Result<DataPlaneCentralStatus>)>, usize) {
        let semaphore = Arc::new(Semaphore::new(self.options.workers.max(1)));
        let mut workers = JoinSet::new();
        let mut busy = 0;

        for central in centrals {
            let reconciler = self.reconciler_for(&central.id);
            if reconciler.is_busy() {
                debug!(tenant = %central.id, "Reconciler busy, skipping");
                busy += 1;
                continue;
            }
            let ctx = self.ctx.clone();
            let semaphore = Arc::clone(&semaphore);
            workers.spawn(async move {
                let result = match semaphore.acquire().await {
                    Ok(_permit) => reconciler.reconcile(&ctx, &central).await,
                    Err(_) => Err(Error::Cancelled),
                };
                (central.id, result)
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => error!(error = %e, "Tenant worker panicked"),
            }
        }
        (results, busy)
    }

    async fn report(&self, statuses: &BTreeMap<String, DataPlaneCentralStatus>) {
        if statuses.is_empty() {
            return;
        }
        let fleet_manager = &self.fleet_manager;
        let result = retry_call(
            http_backoff(),
            "update statuses",
            &self.ctx.cancel,
            |e: &Error| e.kind() == ErrorKind::Retryable,
            || fleet_manager.update_statuses(statuses),
        )
        .await;
        match result {
            Ok(()) => debug!(count = statuses.len(), "Reported tenant statuses"),
            Err(e) => warn!(error = %e, count = statuses.len(), "Failed to report tenant statuses"),
        }
    }

    /// Tenant ID and namespace of every labelled namespace.
    async fn managed_namespaces(&self) -> Result<Vec<(String, String)>> {
        let api: Api<Namespace> = Api::all(self.ctx.client.clone());
        let namespaces = api
            .list(&ListParams::default().labels(&managed_selector()))
            .await
            .with_context("list", "Namespace")?;
        Ok(namespaces
            .items
            .iter()
            .filter_map(|ns| namespace_tenant(ns).map(|id| (id, ns.name_any())))
            .collect())
    }

    /// Delete tenants whose namespace outlived their listing. Returns the IDs
    /// whose deletion ran this tick.
    async fn collect_garbage(&mut self, listed: &HashSet<&str>) -> Result<Vec<String>> {
        let orphans: Vec<(String, String)> = self
            .managed_namespaces()
            .await?
            .into_iter()
            .filter(|(id, _)| !listed.contains(id.as_str()))
            .collect();

        let orphan_ids: HashSet<&str> = orphans.iter().map(|(id, _)| id.as_str()).collect();
        self.absent_ticks.retain(|id, _| orphan_ids.contains(id.as_str()));
        self.reconcilers.retain(|id, reconciler| {
            listed.contains(id.as_str()) || orphan_ids.contains(id.as_str()) || reconciler.is_busy()
        });

        let mut due = Vec::new();
        for (id, namespace) in &orphans {
            let ticks = self.absent_ticks.entry(id.clone()).or_insert(0);
            *ticks += 1;
            if *ticks >= self.options.gc_absent_ticks {
                due.push(ManagedCentral::orphaned(id, namespace));
            } else {
                debug!(tenant = %id, namespace = %namespace, ticks = *ticks, "Namespace not listed upstream");
            }
        }

        let collected: Vec<String> = due.iter().map(|c| c.id.clone()).collect();
        if !due.is_empty() {
            info!(tenants = ?collected, "Deleting tenants no longer listed upstream");
        }
        let (results, _) = self.reconcile_all(due).await;
        for (id, result) in results {
            match result {
                Ok(_) => info!(tenant = %id, "Orphaned tenant deleted"),
                Err(e) if !e.kind().is_reported() => {
                    debug!(tenant = %id, outcome = e.metric_label(), "Orphaned tenant deletion continues");
                }
                Err(e) => warn!(tenant = %id, error = %e, "Orphaned tenant deletion failed"),
            }
        }
        Ok(collected)
    }

    async fn update_quotas(&self) {
        if !self.options.managed_db_enabled {
            return;
        }
        let Some(db) = self.ctx.managed_database() else {
            return;
        };
        match db.get_account_quotas().await {
            Ok(quotas) => {
                for quota in quotas {
                    set_db_account_quota(&quota.name, quota.used, quota.max);
                }
            }
            Err(e) => warn!(error = %e, "Failed to read database account quotas"),
        }
    }
}

#[cfg(test)]
#[path = "runtime_tests.rs"]
mod runtime_tests;
