// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Fleet Manager client.
//!
//! Fleet Manager is the upstream control plane owning the authoritative tenant
//! list. The agent only needs three calls:
//!
//! - `GET  /api/rhacs/v1/agent-clusters/{cluster}/centrals` lists the tenants of this cluster
//! - `PUT  /api/rhacs/v1/agent-clusters/{cluster}/centrals/status` reports statuses in one batch
//! - `GET  /api/rhacs/v1/centrals/{id}` fetches a tenant with its encrypted secrets
//!
//! Every call is counted in the Fleet Manager request metrics.

pub mod auth;

use crate::constants::{FLEET_MANAGER_AGENT_CLUSTERS_PATH, FLEET_MANAGER_CENTRALS_PATH};
use crate::errors::{Error, Result};
use crate::metrics::record_fleet_manager_request;
use crate::model::{DataPlaneCentralStatus, ManagedCentral, ManagedCentralList};
use crate::reconcilers::retry::is_retryable_http_status;
use async_trait::async_trait;
use auth::TokenSource;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Calls the agent makes against Fleet Manager.
#[async_trait]
pub trait FleetManagerApi: Send + Sync {
    /// List the tenants assigned to this cluster.
    async fn list_centrals(&self) -> Result<ManagedCentralList>;

    /// Report tenant statuses keyed by tenant ID.
    async fn update_statuses(
        &self,
        statuses: &BTreeMap<String, DataPlaneCentralStatus>,
    ) -> Result<()>;

    /// Fetch one tenant including the `secrets` map.
    async fn get_central(&self, id: &str) -> Result<ManagedCentral>;
}

/// `reqwest`-backed [`FleetManagerApi`].
pub struct FleetManagerClient {
    http: reqwest::Client,
    endpoint: String,
    cluster_id: String,
    auth: Arc<dyn TokenSource>,
}

impl FleetManagerClient {
    #[must_use]
    pub fn new(
        http: reqwest::Client,
        endpoint: &str,
        cluster_id: &str,
        auth: Arc<dyn TokenSource>,
    ) -> Self {
        FleetManagerClient {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            cluster_id: cluster_id.to_string(),
            auth,
        }
    }

    fn centrals_url(&self) -> String {
        format!(
            "{}{FLEET_MANAGER_AGENT_CLUSTERS_PATH}/{}/centrals",
            self.endpoint, self.cluster_id
        )
    }

    async fn send(
        &self,
        operation: &'static str,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response> {
        let token = self.auth.token().await?;
        let result = request.bearer_auth(token).send().await;

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                record_fleet_manager_request(operation, true);
                return Err(Error::FleetManager {
                    operation,
                    message: e.to_string(),
                    retryable: true,
                });
            }
        };

        let status = response.status();
        if !status.is_success() {
            record_fleet_manager_request(operation, true);
            let body = response.text().await.unwrap_or_default();
            return Err(Error::FleetManager {
                operation,
                message: format!("{status}: {body}"),
                retryable: is_retryable_http_status(status),
            });
        }

        record_fleet_manager_request(operation, false);
        Ok(response)
    }

    async fn decode<T: DeserializeOwned>(
        operation: &'static str,
        response: reqwest::Response,
    ) -> Result<T> {
        response.json().await.map_err(|e| Error::FleetManager {
            operation,
            message: format!("invalid response body: {e}"),
            retryable: false,
        })
    }
}

#[async_trait]
impl FleetManagerApi for FleetManagerClient {
    async fn list_centrals(&self) -> Result<ManagedCentralList> {
        let operation = "list centrals";
        let response = self
            .send(operation, self.http.get(self.centrals_url()))
            .await?;
        let list: ManagedCentralList = Self::decode(operation, response).await?;
        debug!(count = list.items.len(), "Listed centrals from Fleet Manager");
        Ok(list)
    }

    async fn update_statuses(
        &self,
        statuses: &BTreeMap<String, DataPlaneCentralStatus>,
    ) -> Result<()> {
        let url = format!("{}/status", self.centrals_url());
        self.send("update statuses", self.http.put(url).json(statuses))
            .await?;
        debug!(count = statuses.len(), "Reported central statuses");
        Ok(())
    }

    async fn get_central(&self, id: &str) -> Result<ManagedCentral> {
        let operation = "get central";
        let url = format!("{}{FLEET_MANAGER_CENTRALS_PATH}/{id}", self.endpoint);
        let response = self.send(operation, self.http.get(url)).await?;
        Self::decode(operation, response).await
    }
}
