// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Per-tenant reconciler.
//!
//! One [`TenantReconciler`] exists per tenant ID for the lifetime of the
//! process. It owns the tenant's in-memory state:
//!
//! - a busy flag acquired by compare-and-swap, so at most one pipeline of a
//!   tenant runs at any time
//! - the content hash of the last fully successful run
//! - whether the tenant's auth provider is known to exist
//! - when deletion of the tenant was first observed
//!
//! # Change detection
//!
//! A tenant Fleet Manager reports `ready` whose payload hashes equal to the
//! last fully successful run is skipped with [`Error::Unchanged`], unless it
//! asks to be reconciled always or its auth provider is still missing. The
//! hash only advances when a run converges completely; errors and deferred
//! conditions leave it untouched.

use super::pipeline::{Outcome, Pipeline, TenantRun};
use super::tracker::{content_hash, HASH_LEN};
use crate::context::Context;
use crate::errors::{Error, Result};
use crate::metrics::{
    record_reconciliation_error, record_reconciliation_started, record_reconciliation_success,
};
use crate::model::{DataPlaneCentralStatus, ManagedCentral};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};

type Hash = [u8; HASH_LEN];

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Releases the busy flag when dropped.
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Reconciler of one tenant.
pub struct TenantReconciler {
    tenant_id: String,
    pipeline: Arc<Pipeline>,
    busy: AtomicBool,
    /// Hash of the last fully converged run
    last_hash: Mutex<Option<Hash>>,
    /// Hash of the last run that completed without error
    last_seen_hash: Mutex<Option<Hash>>,
    has_auth_provider: AtomicBool,
    deletion_started: Mutex<Option<Instant>>,
    deleted: AtomicBool,
}

impl std::fmt::Debug for TenantReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantReconciler")
            .field("tenant_id", &self.tenant_id)
            .field("busy", &self.is_busy())
            .field("deleted", &self.is_deleted())
            .finish_non_exhaustive()
    }
}

impl TenantReconciler {
    #[must_use]
    pub fn new(tenant_id: &str, pipeline: Arc<Pipeline>) -> Self {
        TenantReconciler {
            tenant_id: tenant_id.to_string(),
            pipeline,
            busy: AtomicBool::new(false),
            last_hash: Mutex::new(None),
            last_seen_hash: Mutex::new(None),
            has_auth_provider: AtomicBool::new(false),
            deletion_started: Mutex::new(None),
            deleted: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    /// Whether a pipeline of this tenant is running.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Whether the last run completed the deletion of this tenant.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::Acquire)
    }

    fn try_acquire(&self) -> Result<BusyGuard<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| BusyGuard(&self.busy))
            .map_err(|_| Error::Busy {
                tenant: self.tenant_id.clone(),
            })
    }

    /// Drive the tenant towards the state described by `central`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Busy`], [`Error::Unchanged`] or
    /// [`Error::DeletionInProgress`] as control-flow sentinels, [`Error::Cancelled`]
    /// when the root token fires, or the first failing step's error.
    pub async fn reconcile(
        &self,
        ctx: &Context,
        central: &ManagedCentral,
    ) -> Result<DataPlaneCentralStatus> {
        let _guard = self.try_acquire()?;
        record_reconciliation_started();
        let started = Instant::now();

        let span = info_span!("reconcile", tenant = %self.tenant_id, namespace = %central.namespace());
        let result = tokio::select! {
            () = ctx.cancel.cancelled() => Err(Error::Cancelled),
            result = self.run(ctx, central).instrument(span) => result,
        };

        match &result {
            Ok(status) => {
                record_reconciliation_success(started.elapsed());
                debug!(tenant = %self.tenant_id, reason = status.reason(), ready = status.is_ready(), "Reconciled tenant");
            }
            Err(e) if !e.kind().is_reported() => {
                record_reconciliation_success(started.elapsed());
                debug!(tenant = %self.tenant_id, outcome = e.metric_label(), "Tenant skipped");
            }
            Err(e) => {
                record_reconciliation_error(e.metric_label(), started.elapsed());
                warn!(tenant = %self.tenant_id, error = %e, "Reconciliation failed");
            }
        }
        result
    }

    async fn run(&self, ctx: &Context, central: &ManagedCentral) -> Result<DataPlaneCentralStatus> {
        if central.is_deleting() {
            return self.remove(ctx, central).await;
        }
        *lock(&self.deletion_started) = None;
        self.deleted.store(false, Ordering::Release);

        let hash = content_hash(central)?;
        let converged = *lock(&self.last_hash) == Some(hash);
        let auth_satisfied =
            !ctx.options.create_auth_provider || self.has_auth_provider.load(Ordering::Acquire);
        if central.is_ready_upstream()
            && !central.force_reconcile_always()
            && converged
            && auth_satisfied
        {
            return Err(Error::Unchanged {
                tenant: self.tenant_id.clone(),
            });
        }

        let mut run = TenantRun::new(central);
        run.hash_unchanged = *lock(&self.last_seen_hash) == Some(hash);
        run.has_auth_provider = self.has_auth_provider.load(Ordering::Acquire);

        let outcome = self.pipeline.ensure_present(ctx, &mut run).await;
        if run.has_auth_provider {
            self.has_auth_provider.store(true, Ordering::Release);
        }
        let outcome = outcome?;
        *lock(&self.last_seen_hash) = Some(hash);

        match outcome {
            Some(Outcome::Status(status)) => Ok(status),
            Some(Outcome::Unchanged) => Err(Error::Unchanged {
                tenant: self.tenant_id.clone(),
            }),
            None if !run.deferred.is_empty() => {
                let message = run.deferred.join("; ");
                info!(tenant = %self.tenant_id, message = %message, "Tenant converged with deferred conditions");
                Ok(DataPlaneCentralStatus::installing(&message))
            }
            None => {
                *lock(&self.last_hash) = Some(hash);
                Ok(DataPlaneCentralStatus::ready().with_routes(run.routes))
            }
        }
    }

    async fn remove(&self, ctx: &Context, central: &ManagedCentral) -> Result<DataPlaneCentralStatus> {
        let started = *lock(&self.deletion_started).get_or_insert_with(Instant::now);
        let mut run = TenantRun::new(central);
        run.deletion_started = started;

        match self.pipeline.ensure_absent(ctx, &mut run).await? {
            Some(pending) => {
                debug!(tenant = %self.tenant_id, pending = %pending, "Deletion in progress");
                Err(Error::DeletionInProgress {
                    tenant: self.tenant_id.clone(),
                    pending,
                })
            }
            None => {
                if !self.deleted.swap(true, Ordering::AcqRel) {
                    info!(tenant = %self.tenant_id, "Tenant deleted");
                }
                *lock(&self.last_hash) = None;
                *lock(&self.last_seen_hash) = None;
                self.has_auth_provider.store(false, Ordering::Release);
                Ok(DataPlaneCentralStatus::deleted())
            }
        }
    }
}

#[cfg(test)]
#[path = "tenant_tests.rs"]
mod tenant_tests;
