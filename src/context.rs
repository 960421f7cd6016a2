// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared context for all tenant reconcilers.
//!
//! The runtime builds one [`Context`] at startup and hands it to every tenant
//! reconciler. It bundles:
//! - Kubernetes client
//! - Fleet Manager client (secret restore)
//! - secret cipher, chart renderer, tenant API client
//! - managed-database provisioner, when enabled
//! - reconciler options and the root cancellation token

use crate::charts::{ChartRenderer, TenantResourcesRenderer};
use crate::cipher::{Base64Cipher, SecretCipher};
use crate::cloud::DatabaseProvisioner;
use crate::config::ReconcilerOptions;
use crate::errors::Result;
use crate::fleetmanager::FleetManagerApi;
use crate::tenant_api::{insecure_http_client, HttpTenantApi, TenantApi};
use kube::Client;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Dependencies shared by every tenant reconciler.
#[derive(Clone)]
pub struct Context {
    /// Kubernetes client for API operations
    pub client: Client,

    /// Fleet Manager client, used to fetch encrypted secrets for restore
    pub fleet_manager: Arc<dyn FleetManagerApi>,

    /// Cipher for restored secrets
    pub cipher: Arc<dyn SecretCipher>,

    /// Renderer of the tenant-resources release
    pub charts: Arc<dyn ChartRenderer>,

    /// Tenant-internal API, backed by the shared insecure HTTP client
    pub tenant_api: Arc<dyn TenantApi>,

    /// Managed-database provisioner, `None` when managed DBs are disabled
    pub database: Option<Arc<dyn DatabaseProvisioner>>,

    pub options: ReconcilerOptions,

    /// Root cancellation token; cancelled by `Runtime::stop`
    pub cancel: CancellationToken,
}

impl Context {
    /// Context with the built-in renderer, the base64 cipher and no database.
    ///
    /// # Errors
    ///
    /// Returns an error when the shared tenant HTTP client cannot be built.
    pub fn new(
        client: Client,
        fleet_manager: Arc<dyn FleetManagerApi>,
        options: ReconcilerOptions,
    ) -> Result<Self> {
        let charts = Arc::new(TenantResourcesRenderer::new(
            options.egress_proxy_image.clone(),
        ));
        Ok(Context {
            client,
            fleet_manager,
            cipher: Arc::new(Base64Cipher),
            charts,
            tenant_api: Arc::new(HttpTenantApi::new(insecure_http_client()?)),
            database: None,
            options,
            cancel: CancellationToken::new(),
        })
    }

    #[must_use]
    pub fn with_cipher(mut self, cipher: Arc<dyn SecretCipher>) -> Self {
        self.cipher = cipher;
        self
    }

    #[must_use]
    pub fn with_charts(mut self, charts: Arc<dyn ChartRenderer>) -> Self {
        self.charts = charts;
        self
    }

    #[must_use]
    pub fn with_tenant_api(mut self, tenant_api: Arc<dyn TenantApi>) -> Self {
        self.tenant_api = tenant_api;
        self
    }

    #[must_use]
    pub fn with_database(mut self, database: Arc<dyn DatabaseProvisioner>) -> Self {
        self.database = Some(database);
        self
    }

    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The provisioner, when managed databases are enabled and configured.
    #[must_use]
    pub fn managed_database(&self) -> Option<&Arc<dyn DatabaseProvisioner>> {
        if self.options.managed_db_enabled {
            self.database.as_ref()
        } else {
            None
        }
    }
}
