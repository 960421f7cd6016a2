// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

#![allow(unexpected_cfgs)]

//! # fleetshard-sync - RHACS tenant control-plane agent
//!
//! One agent runs on every data-plane cluster of the managed RHACS service. It
//! polls Fleet Manager for the tenants ("centrals") assigned to its cluster,
//! drives each tenant's declared state into existence on the cluster and
//! reports the observed status back.
//!
//! ## Overview
//!
//! Per tenant the agent manages:
//!
//! - the tenant namespace, image pull secret and encryption key chain
//! - network policies and the egress proxy rendered from the tenant-resources release
//! - secrets restored from Fleet Manager backups
//! - an Aurora Postgres database with a least-privileged user
//! - the `Central` custom resource reconciled by the downstream operator
//! - re-encrypt and passthrough OpenShift routes
//! - an SSO auth provider inside the tenant
//!
//! ## Modules
//!
//! - [`runtime`] - poll loop, worker pool, status reporting and namespace GC
//! - [`reconcilers`] - per-tenant reconciler and its sub-reconcilers
//! - [`fleetmanager`] - Fleet Manager client and its token sources
//! - [`cloud`] - managed-database provisioner
//! - [`crd`] - `Central` and `Route` resource types
//! - [`model`] - Fleet Manager wire types
//! - [`config`] - environment configuration
//! - [`metrics`] - Prometheus metrics and the `/metrics` endpoint
//!
//! ## Example
//!
//! ```rust,no_run
//! use fleetshard_sync::config::Config;
//! use fleetshard_sync::context::Context;
//! use fleetshard_sync::fleetmanager::FleetManagerApi;
//! use fleetshard_sync::runtime::Runtime;
//! use std::sync::Arc;
//!
//! async fn run(fleet_manager: Arc<dyn FleetManagerApi>) -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let client = kube::Client::try_default().await?;
//!     let ctx = Context::new(client, fleet_manager.clone(), config.reconciler_options())?;
//!     let mut runtime = Runtime::new(ctx, fleet_manager, config.runtime_options());
//!     runtime.start().await?;
//!     Ok(())
//! }
//! ```

pub mod charts;
pub mod cipher;
pub mod cloud;
pub mod config;
pub mod constants;
pub mod context;
pub mod crd;
pub mod duration;
pub mod errors;
pub mod fleetmanager;
pub mod labels;
pub mod metrics;
pub mod model;
pub mod reconcilers;
pub mod runtime;
pub mod status_reasons;
pub mod tenant_api;

#[cfg(test)]
pub(crate) mod testing;
