// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared helpers for unit tests.

use crate::cloud::{AccountQuota, DatabaseProvisioner, DbConnection, Deprovision};
use crate::config::ReconcilerOptions;
use crate::context::Context;
use crate::errors::{DatabaseError, Error, Result};
use crate::fleetmanager::FleetManagerApi;
use crate::model::{DataPlaneCentralStatus, ManagedCentral, ManagedCentralList};
use async_trait::async_trait;
use http_body_util::BodyExt;
use kube::client::Body;
use kube::Client;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// Kubernetes client answering every request with `404 Not Found`.
pub fn not_found_client() -> Client {
    scripted_client(|_, _| not_found_status()).0
}

/// One request received by a [`scripted_client`].
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: http::Method,
    pub path: String,
    pub body: Value,
}

/// Requests received by a [`scripted_client`], in order.
pub type Requests = Arc<Mutex<Vec<Recorded>>>;

/// Kubernetes client answering each request with `respond(method, path)` and
/// recording it. `path` excludes the query string.
pub fn scripted_client<F>(respond: F) -> (Client, Requests)
where
    F: Fn(&http::Method, &str) -> (u16, Value) + Clone + Send + Sync + 'static,
{
    let requests = Requests::default();
    let recorded = requests.clone();
    let service = tower::service_fn(move |req: http::Request<Body>| {
        let respond = respond.clone();
        let recorded = recorded.clone();
        async move {
            let (parts, body) = req.into_parts();
            let bytes = body
                .collect()
                .await
                .map(|collected| collected.to_bytes())
                .unwrap_or_default();
            let path = parts.uri.path().to_string();
            let (code, value) = respond(&parts.method, &path);
            recorded.lock().unwrap().push(Recorded {
                method: parts.method,
                path,
                body: serde_json::from_slice(&bytes).unwrap_or(Value::Null),
            });
            let response = http::Response::builder()
                .status(code)
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&value).unwrap_or_default()))
                .unwrap();
            Ok::<_, std::convert::Infallible>(response)
        }
    });
    (Client::new(service, "default"), requests)
}

/// `404 Not Found` status body.
pub fn not_found_status() -> (u16, Value) {
    (
        404,
        serde_json::json!({
            "kind": "Status",
            "apiVersion": "v1",
            "metadata": {},
            "status": "Failure",
            "message": "not found",
            "reason": "NotFound",
            "code": 404
        }),
    )
}

/// Fleet Manager that lists nothing and rejects lookups.
pub struct EmptyFleetManager;

#[async_trait]
impl FleetManagerApi for EmptyFleetManager {
    async fn list_centrals(&self) -> Result<ManagedCentralList> {
        Ok(ManagedCentralList::default())
    }

    async fn update_statuses(
        &self,
        _statuses: &BTreeMap<String, DataPlaneCentralStatus>,
    ) -> Result<()> {
        Ok(())
    }

    async fn get_central(&self, id: &str) -> Result<ManagedCentral> {
        Err(Error::FleetManager {
            operation: "get central",
            message: format!("{id} not found"),
            retryable: false,
        })
    }
}

/// Database account in which no cluster exists.
pub struct MissingDatabase;

#[async_trait]
impl DatabaseProvisioner for MissingDatabase {
    async fn ensure_db_provisioned(
        &self,
        database_id: &str,
        _master_password: &str,
        _tenant_password: &str,
        _cancel: &CancellationToken,
    ) -> Result<()> {
        Err(DatabaseError::NotFound {
            what: "cluster",
            id: database_id.to_string(),
        }
        .into())
    }

    async fn ensure_db_deprovisioned(&self, _database_id: &str, _: bool) -> Result<Deprovision> {
        Ok(Deprovision::Done)
    }

    async fn get_db_connection(&self, database_id: &str) -> Result<DbConnection> {
        Err(DatabaseError::NotFound {
            what: "cluster",
            id: database_id.to_string(),
        }
        .into())
    }

    async fn get_account_quotas(&self) -> Result<Vec<AccountQuota>> {
        Ok(Vec::new())
    }
}

/// Install the process-wide rustls provider; later calls are no-ops.
pub fn install_crypto_provider() {
    let _ = rustls::crypto::ring::default_provider().install_default();
}

/// Context over [`not_found_client`] and [`EmptyFleetManager`].
pub fn test_context(options: ReconcilerOptions) -> Context {
    client_context(not_found_client(), options)
}

/// Context over `client` and [`EmptyFleetManager`].
pub fn client_context(client: Client, options: ReconcilerOptions) -> Context {
    install_crypto_provider();
    Context::new(client, Arc::new(EmptyFleetManager), options).unwrap()
}

/// Tenant `cb45` in namespace `rhacs-cb45`.
pub fn test_central() -> ManagedCentral {
    let mut central = ManagedCentral {
        id: "cb45".into(),
        request_status: "provisioning".into(),
        ..ManagedCentral::default()
    };
    central.metadata.name = "test-central".into();
    central.metadata.namespace = "rhacs-cb45".into();
    central.spec.auth.owner_org_id = "12345".into();
    central.spec.auth.owner_org_name = "Example Org".into();
    central.spec.ui_endpoint.host = "acs-cb45.rhcloud.test".into();
    central.spec.data_endpoint.host = "acs-data-cb45.rhcloud.test".into();
    central
}
