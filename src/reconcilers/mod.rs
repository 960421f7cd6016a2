// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Tenant reconciliation.
//!
//! Each tenant is driven by one [`tenant::TenantReconciler`], which runs an
//! ordered [`pipeline::Pipeline`] of sub-reconcilers. Every sub-reconciler owns
//! one resource class and implements `ensure_present` / `ensure_absent`.
//!
//! # Sub-reconcilers
//!
//! ## Present order
//!
//! 1. [`namespace`] - tenant namespace with organisation labels
//! 2. [`pull_secret`] - image pull secret
//! 3. [`tenant_resources`] - rendered network policies and egress proxy
//! 4. [`encryption_key`] - key-chain secret, created once
//! 5. [`secret_restore`] - secrets restored from Fleet Manager backups
//! 6. [`database`] - managed Postgres database and its credential
//! 7. [`central`] - the `Central` custom resource
//! 8. [`routes`] - re-encrypt and passthrough routes
//! 9. [`status`] - deployment readiness and UI reachability
//! 10. [`auth_provider`] - SSO auth provider inside the tenant
//! 11. [`routes::RouteDiscovery`] - admitted hosts for the status report
//!
//! ## Absent order
//!
//! Routes, Central, database, tenant resources, namespace. The pipeline stops
//! at the first step whose deletion is still pending.
//!
//! # Support
//!
//! - [`tracker`] - hash-tracked apply and ownership-safe delete
//! - [`retry`] - exponential backoff and the runtime's retry ticker

pub mod auth_provider;
pub mod central;
pub mod database;
pub mod encryption_key;
pub mod namespace;
pub mod pipeline;
pub mod pull_secret;
pub mod retry;
pub mod routes;
pub mod secret_restore;
pub mod status;
pub mod tenant;
pub mod tenant_resources;
pub mod tracker;

pub use pipeline::{Pipeline, SubReconciler, TenantRun};
pub use tenant::TenantReconciler;
