// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared fixtures for integration tests.
//!
//! [`FakeApiServer`] is an in-memory Kubernetes API server served to a real
//! `kube::Client` through a `tower::service_fn`. It understands get, list with
//! equality label selectors, create, replace (honouring `resourceVersion` and
//! `dryRun=All`), merge patch and delete. Deleted namespaces stay terminating
//! until [`FakeApiServer::finish_terminations`] runs; routes are admitted as
//! soon as they are created.

#![allow(dead_code)]

use async_trait::async_trait;
use fleetshard_sync::cloud::rds::{
    CreateClusterParams, CreateInstanceParams, DatabaseInitializer, DbClusterInfo, DbInstanceInfo,
    RdsApi,
};
use fleetshard_sync::cloud::AccountQuota;
use fleetshard_sync::config::ReconcilerOptions;
use fleetshard_sync::constants::{CENTRAL_HTPASSWD_PASSWORD_KEY, CENTRAL_HTPASSWD_SECRET_NAME};
use fleetshard_sync::context::Context;
use fleetshard_sync::errors::{DatabaseError, Error, Result};
use fleetshard_sync::fleetmanager::FleetManagerApi;
use fleetshard_sync::model::{DataPlaneCentralStatus, ManagedCentral, ManagedCentralList};
use fleetshard_sync::tenant_api::{AuthProviderRequest, GroupRequest, TenantApi, TenantEndpoint};
use http::{Method, Request, Response};
use http_body_util::BodyExt;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentStatus};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::api::ObjectMeta;
use kube::client::Body;
use kube::{Client, Resource};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Canonical hostname of the router admitting every route.
pub const ROUTER_HOSTNAME: &str = "router-default.apps.test";

const NAMESPACES_PATH: &str = "/api/v1/namespaces";

/// One mutating request observed by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Write {
    pub verb: Method,
    pub path: String,
}

#[derive(Default)]
struct State {
    objects: BTreeMap<String, Value>,
    writes: Vec<Write>,
    requests: usize,
    resource_version: u64,
}

impl State {
    fn next_resource_version(&mut self) -> String {
        self.resource_version += 1;
        self.resource_version.to_string()
    }
}

/// In-memory Kubernetes API server.
#[derive(Clone, Default)]
pub struct FakeApiServer {
    state: Arc<Mutex<State>>,
    latency: Option<Duration>,
}

/// Path of an object of kind `K`.
pub fn object_path<K>(namespace: Option<&str>, name: &str) -> String
where
    K: Resource<DynamicType = ()>,
{
    format!("{}/{name}", K::url_path(&(), namespace))
}

fn status(code: u16, reason: &str, message: impl Into<String>) -> (u16, Value) {
    (
        code,
        json!({
            "kind": "Status",
            "apiVersion": "v1",
            "metadata": {},
            "status": "Failure",
            "message": message.into(),
            "reason": reason,
            "code": code
        }),
    )
}

/// Split a request path into its collection and, for object paths, the name.
fn split_path(path: &str) -> Option<(String, Option<String>)> {
    let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
    let prefix = match segments.first() {
        Some(&"api") => 2,
        Some(&"apis") => 3,
        _ => return None,
    };
    let rest = segments.len().checked_sub(prefix).filter(|n| *n > 0)?;
    if rest % 2 == 1 {
        return Some((path.to_string(), None));
    }
    let (collection, name) = path.rsplit_once('/')?;
    Some((collection.to_string(), Some(name.to_string())))
}

/// Namespace segment of a namespaced collection path.
fn path_namespace(collection: &str) -> Option<String> {
    let (_, rest) = collection.split_once("/namespaces/")?;
    rest.split_once('/').map(|(ns, _)| ns.to_string())
}

fn matches_selector(object: &Value, selector: Option<&String>) -> bool {
    let Some(selector) = selector.filter(|s| !s.is_empty()) else {
        return true;
    };
    let labels = &object["metadata"]["labels"];
    selector.split(',').all(|term| match term.split_once('=') {
        Some((key, value)) => labels[key].as_str() == Some(value),
        None => !labels[term].is_null(),
    })
}

fn merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = json!({});
    }
    if let Value::Object(fields) = target {
        for (key, value) in patch {
            if value.is_null() {
                fields.remove(key);
            } else {
                merge_patch(fields.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
    }
}

fn admit(route: &mut Value) {
    let host = route["spec"]["host"].clone();
    route["status"] = json!({
        "ingress": [{
            "host": host,
            "routerName": "default",
            "routerCanonicalHostname": ROUTER_HOSTNAME,
            "conditions": [{"type": "Admitted", "status": "True"}]
        }]
    });
}

fn is_route_collection(collection: &str) -> bool {
    collection.starts_with("/apis/route.openshift.io/") && collection.ends_with("/routes")
}

impl FakeApiServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every response, to keep reconciles in flight.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A client talking to this server.
    pub fn client(&self) -> Client {
        let server = self.clone();
        let service = tower::service_fn(move |req: Request<Body>| {
            let server = server.clone();
            async move { Ok::<_, Infallible>(server.handle(req).await) }
        });
        Client::new(service, "default")
    }

    async fn handle(&self, req: Request<Body>) -> Response<Body> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let (parts, body) = req.into_parts();
        let bytes = body
            .collect()
            .await
            .map(|collected| collected.to_bytes())
            .unwrap_or_default();
        let path = parts.uri.path().trim_end_matches('/').to_string();
        let query: BTreeMap<String, String> = parts
            .uri
            .query()
            .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
            .unwrap_or_default();
        let dry_run = query.contains_key("dryRun");
        let payload: Value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

        let (code, value) = {
            let mut state = self.lock();
            state.requests += 1;
            match split_path(&path) {
                None => status(404, "NotFound", format!("unknown path {path}")),
                Some((collection, None)) => match parts.method {
                    Method::GET => Self::list(&state, &collection, query.get("labelSelector")),
                    Method::POST => Self::create(&mut state, &collection, payload, dry_run),
                    _ => status(405, "MethodNotAllowed", path.clone()),
                },
                Some((collection, Some(name))) => {
                    let key = format!("{collection}/{name}");
                    match parts.method {
                        Method::GET => match state.objects.get(&key) {
                            Some(object) => (200, object.clone()),
                            None => status(404, "NotFound", format!("{name} not found")),
                        },
                        Method::PUT => Self::replace(&mut state, &key, payload, dry_run),
                        Method::PATCH => Self::patch(&mut state, &key, &payload),
                        Method::DELETE => Self::delete(&mut state, &collection, &name),
                        _ => status(405, "MethodNotAllowed", path.clone()),
                    }
                }
            }
        };

        Response::builder()
            .status(code)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&value).unwrap_or_default()))
            .unwrap()
    }

    fn list(state: &State, collection: &str, selector: Option<&String>) -> (u16, Value) {
        let prefix = format!("{collection}/");
        let items: Vec<Value> = state
            .objects
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .filter(|(key, _)| !key[prefix.len()..].contains('/'))
            .filter(|(_, object)| matches_selector(object, selector))
            .map(|(_, object)| object.clone())
            .collect();
        (
            200,
            json!({
                "kind": "List",
                "apiVersion": "v1",
                "metadata": {"resourceVersion": state.resource_version.to_string()},
                "items": items
            }),
        )
    }

    fn create(state: &mut State, collection: &str, mut object: Value, dry_run: bool) -> (u16, Value) {
        let Some(name) = object["metadata"]["name"].as_str().map(str::to_string) else {
            return status(422, "Invalid", "metadata.name is required");
        };
        let key = format!("{collection}/{name}");
        if state.objects.contains_key(&key) {
            return status(409, "AlreadyExists", format!("{name} already exists"));
        }

        let resource_version = state.next_resource_version();
        object["metadata"]["resourceVersion"] = json!(resource_version);
        object["metadata"]["uid"] = json!(format!("uid-{resource_version}"));
        object["metadata"]["creationTimestamp"] = json!("2025-01-01T00:00:00Z");
        if let Some(namespace) = path_namespace(collection) {
            object["metadata"]["namespace"] = json!(namespace);
        }
        if is_route_collection(collection) {
            admit(&mut object);
        }

        if !dry_run {
            state.objects.insert(key.clone(), object.clone());
            state.writes.push(Write {
                verb: Method::POST,
                path: key,
            });
        }
        (201, object)
    }

    fn replace(state: &mut State, key: &str, mut object: Value, dry_run: bool) -> (u16, Value) {
        let Some(existing) = state.objects.get(key).cloned() else {
            return status(404, "NotFound", format!("{key} not found"));
        };
        let current = existing["metadata"]["resourceVersion"].clone();
        let sent = &object["metadata"]["resourceVersion"];
        if !sent.is_null() && *sent != current {
            return status(409, "Conflict", format!("{key} was modified"));
        }

        for field in ["uid", "creationTimestamp", "deletionTimestamp"] {
            if !existing["metadata"][field].is_null() {
                object["metadata"][field] = existing["metadata"][field].clone();
            }
        }
        if !existing["status"].is_null() {
            object["status"] = existing["status"].clone();
        }

        if dry_run {
            return (200, object);
        }
        object["metadata"]["resourceVersion"] = json!(state.next_resource_version());
        state.objects.insert(key.to_string(), object.clone());
        state.writes.push(Write {
            verb: Method::PUT,
            path: key.to_string(),
        });
        (200, object)
    }

    fn patch(state: &mut State, key: &str, patch: &Value) -> (u16, Value) {
        let Some(mut object) = state.objects.get(key).cloned() else {
            return status(404, "NotFound", format!("{key} not found"));
        };
        merge_patch(&mut object, patch);
        object["metadata"]["resourceVersion"] = json!(state.next_resource_version());
        state.objects.insert(key.to_string(), object.clone());
        state.writes.push(Write {
            verb: Method::PATCH,
            path: key.to_string(),
        });
        (200, object)
    }

    fn delete(state: &mut State, collection: &str, name: &str) -> (u16, Value) {
        let key = format!("{collection}/{name}");
        let Some(mut object) = state.objects.get(&key).cloned() else {
            return status(404, "NotFound", format!("{name} not found"));
        };
        state.writes.push(Write {
            verb: Method::DELETE,
            path: key.clone(),
        });

        if collection == NAMESPACES_PATH {
            if object["metadata"]["deletionTimestamp"].is_null() {
                object["metadata"]["deletionTimestamp"] = json!("2025-01-01T00:00:00Z");
                object["metadata"]["resourceVersion"] = json!(state.next_resource_version());
                state.objects.insert(key, object.clone());
            }
            return (200, object);
        }

        state.objects.remove(&key);
        (
            200,
            json!({
                "kind": "Status",
                "apiVersion": "v1",
                "metadata": {},
                "status": "Success",
                "code": 200,
                "details": {"name": name}
            }),
        )
    }

    /// Store `object` as if it had been created by someone else.
    pub fn seed<K>(&self, object: &K)
    where
        K: Resource<DynamicType = ()> + Serialize,
    {
        let meta = object.meta();
        let path = object_path::<K>(
            meta.namespace.as_deref(),
            meta.name.as_deref().unwrap_or_default(),
        );
        let mut value = serde_json::to_value(object).unwrap();
        value["apiVersion"] = json!(K::api_version(&()));
        value["kind"] = json!(K::kind(&()));
        let mut state = self.lock();
        value["metadata"]["resourceVersion"] = json!(state.next_resource_version());
        state.objects.insert(path, value);
    }

    pub fn get<K>(&self, namespace: Option<&str>, name: &str) -> Option<K>
    where
        K: Resource<DynamicType = ()> + DeserializeOwned,
    {
        let path = object_path::<K>(namespace, name);
        self.lock()
            .objects
            .get(&path)
            .map(|value| serde_json::from_value(value.clone()).unwrap())
    }

    pub fn contains(&self, path: &str) -> bool {
        self.lock().objects.contains_key(path)
    }

    pub fn remove<K>(&self, namespace: Option<&str>, name: &str)
    where
        K: Resource<DynamicType = ()>,
    {
        let path = object_path::<K>(namespace, name);
        self.lock().objects.remove(&path);
    }

    pub fn writes(&self) -> Vec<Write> {
        self.lock().writes.clone()
    }

    pub fn clear_writes(&self) {
        self.lock().writes.clear();
    }

    pub fn requests(&self) -> usize {
        self.lock().requests
    }

    /// Complete every pending namespace deletion, dropping the namespaces'
    /// contents with them.
    pub fn finish_terminations(&self) {
        let mut state = self.lock();
        let terminating: Vec<String> = state
            .objects
            .iter()
            .filter(|(key, object)| {
                split_path(key).is_some_and(|(collection, _)| collection == NAMESPACES_PATH)
                    && !object["metadata"]["deletionTimestamp"].is_null()
            })
            .filter_map(|(_, object)| object["metadata"]["name"].as_str().map(str::to_string))
            .collect();

        for namespace in terminating {
            let scope = format!("/namespaces/{namespace}/");
            let own = format!("{NAMESPACES_PATH}/{namespace}");
            state
                .objects
                .retain(|key, _| *key != own && !key.contains(&scope));
        }
    }
}

/// Tenant `id` as listed by Fleet Manager, already `ready` upstream.
pub fn central(id: &str) -> ManagedCentral {
    let mut central = ManagedCentral {
        id: id.to_string(),
        request_status: "ready".into(),
        ..ManagedCentral::default()
    };
    central.metadata.name = "test-central".into();
    central.metadata.namespace = format!("rhacs-{id}");
    central.spec.auth.owner_org_id = "12345".into();
    central.spec.auth.owner_org_name = "Example Org".into();
    central.spec.auth.issuer = "https://sso.redhat.test/auth/realms/redhat-external".into();
    central.spec.ui_endpoint.host = format!("acs-{id}.rhcloud.test");
    central.spec.data_endpoint.host = format!("acs-data-{id}.rhcloud.test");
    central
}

/// Objects the downstream operator would have created for a tenant: the
/// `central-tls` secret and an available `central` deployment.
pub fn seed_operator_objects(server: &FakeApiServer, namespace: &str) {
    server.seed(&Secret {
        metadata: ObjectMeta {
            name: Some("central-tls".into()),
            namespace: Some(namespace.into()),
            ..ObjectMeta::default()
        },
        data: Some(BTreeMap::from([(
            "ca.pem".to_string(),
            ByteString(b"-----BEGIN CERTIFICATE-----\nfake\n-----END CERTIFICATE-----\n".to_vec()),
        )])),
        ..Secret::default()
    });
    server.seed(&Deployment {
        metadata: ObjectMeta {
            name: Some("central".into()),
            namespace: Some(namespace.into()),
            ..ObjectMeta::default()
        },
        status: Some(DeploymentStatus {
            available_replicas: Some(1),
            ..DeploymentStatus::default()
        }),
        ..Deployment::default()
    });
}

/// The `central-htpasswd` secret holding the tenant's admin password.
pub fn seed_admin_password(server: &FakeApiServer, namespace: &str) {
    server.seed(&Secret {
        metadata: ObjectMeta {
            name: Some(CENTRAL_HTPASSWD_SECRET_NAME.into()),
            namespace: Some(namespace.into()),
            ..ObjectMeta::default()
        },
        data: Some(BTreeMap::from([(
            CENTRAL_HTPASSWD_PASSWORD_KEY.to_string(),
            ByteString(b"letmein".to_vec()),
        )])),
        ..Secret::default()
    });
}

#[derive(Default)]
struct TenantApiState {
    providers: Vec<(String, AuthProviderRequest)>,
    groups: Vec<GroupRequest>,
    group_creates: usize,
}

/// Tenant API keeping auth providers and groups in memory. Providers are
/// visible as soon as they are created.
#[derive(Default)]
pub struct FakeTenantApi {
    state: Mutex<TenantApiState>,
    /// 1-based index of a group creation that fails with a 503
    failing_group_create: Option<usize>,
}

impl FakeTenantApi {
    /// Fail the `nth` group creation (1-based) with a retryable error.
    pub fn failing_group_create(nth: usize) -> Self {
        FakeTenantApi {
            failing_group_create: Some(nth),
            ..FakeTenantApi::default()
        }
    }

    fn state(&self) -> MutexGuard<'_, TenantApiState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn providers(&self) -> Vec<AuthProviderRequest> {
        self.state().providers.iter().map(|(_, p)| p.clone()).collect()
    }

    pub fn groups(&self) -> Vec<GroupRequest> {
        self.state().groups.clone()
    }

    /// Group creations attempted, failed ones included.
    pub fn group_creates(&self) -> usize {
        self.state().group_creates
    }
}

#[async_trait]
impl TenantApi for FakeTenantApi {
    async fn find_auth_provider(&self, _: &TenantEndpoint, name: &str) -> Result<Option<String>> {
        Ok(self
            .state()
            .providers
            .iter()
            .find(|(_, p)| p.name == name)
            .map(|(id, _)| id.clone()))
    }

    async fn create_auth_provider(
        &self,
        _: &TenantEndpoint,
        request: &AuthProviderRequest,
    ) -> Result<String> {
        let mut state = self.state();
        let id = format!("provider-{}", state.providers.len() + 1);
        state.providers.push((id.clone(), request.clone()));
        Ok(id)
    }

    async fn list_groups(&self, _: &TenantEndpoint, provider_id: &str) -> Result<Vec<GroupRequest>> {
        Ok(self
            .state()
            .groups
            .iter()
            .filter(|g| g.props.auth_provider_id == provider_id)
            .cloned()
            .collect())
    }

    async fn create_group(&self, _: &TenantEndpoint, group: &GroupRequest) -> Result<()> {
        let mut state = self.state();
        state.group_creates += 1;
        if self.failing_group_create == Some(state.group_creates) {
            return Err(Error::TenantApi {
                operation: "create group",
                message: "503 Service Unavailable".into(),
                retryable: true,
            });
        }
        state.groups.push(group.clone());
        Ok(())
    }

    async fn probe(&self, _: &str) -> bool {
        true
    }
}

/// Fleet Manager listing a fixed set of tenants and recording reports.
#[derive(Default)]
pub struct FakeFleetManager {
    pub centrals: Mutex<Vec<ManagedCentral>>,
    pub reports: Mutex<Vec<BTreeMap<String, DataPlaneCentralStatus>>>,
}

impl FakeFleetManager {
    pub fn listing(centrals: Vec<ManagedCentral>) -> Self {
        FakeFleetManager {
            centrals: Mutex::new(centrals),
            reports: Mutex::default(),
        }
    }

    pub fn reports(&self) -> Vec<BTreeMap<String, DataPlaneCentralStatus>> {
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl FleetManagerApi for FakeFleetManager {
    async fn list_centrals(&self) -> Result<ManagedCentralList> {
        let items = self
            .centrals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        Ok(ManagedCentralList {
            items,
            ..ManagedCentralList::default()
        })
    }

    async fn update_statuses(
        &self,
        statuses: &BTreeMap<String, DataPlaneCentralStatus>,
    ) -> Result<()> {
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(statuses.clone());
        Ok(())
    }

    async fn get_central(&self, id: &str) -> Result<ManagedCentral> {
        self.centrals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or_else(|| Error::FleetManager {
                operation: "get central",
                message: format!("{id} not found"),
                retryable: false,
            })
    }
}

/// Install the process-wide rustls provider; later calls are no-ops.
pub fn install_crypto_provider() {
    let _ = rustls::crypto::ring::default_provider().install_default();
}

/// Context over `server` with a fleet manager listing nothing.
pub fn context(server: &FakeApiServer, options: ReconcilerOptions) -> Context {
    install_crypto_provider();
    Context::new(
        server.client(),
        Arc::new(FakeFleetManager::default()),
        options,
    )
    .unwrap()
}

/// RDS account holding clusters and instances in memory. New clusters and
/// instances are available immediately.
#[derive(Default)]
pub struct FakeRds {
    pub clusters: Mutex<BTreeMap<String, DbClusterInfo>>,
    pub instances: Mutex<BTreeMap<String, DbInstanceInfo>>,
    pub cluster_creates: Mutex<Vec<CreateClusterParams>>,
    pub instance_creates: Mutex<Vec<CreateInstanceParams>>,
}

impl FakeRds {
    pub fn cluster_ids(&self) -> Vec<String> {
        self.clusters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    pub fn instance_ids(&self) -> Vec<String> {
        self.instances
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    pub fn cluster_creates(&self) -> Vec<CreateClusterParams> {
        self.cluster_creates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn instance_create_count(&self) -> usize {
        self.instance_creates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl RdsApi for FakeRds {
    async fn describe_cluster(
        &self,
        cluster_id: &str,
    ) -> std::result::Result<Option<DbClusterInfo>, DatabaseError> {
        Ok(self
            .clusters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(cluster_id)
            .cloned())
    }

    async fn describe_instance(
        &self,
        instance_id: &str,
    ) -> std::result::Result<Option<DbInstanceInfo>, DatabaseError> {
        Ok(self
            .instances
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(instance_id)
            .cloned())
    }

    async fn create_cluster(
        &self,
        params: &CreateClusterParams,
    ) -> std::result::Result<(), DatabaseError> {
        self.cluster_creates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(params.clone());
        self.clusters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                params.cluster_id.clone(),
                DbClusterInfo {
                    status: "available".into(),
                    endpoint: Some(format!(
                        "{}.cluster-abc.us-east-1.rds.amazonaws.com",
                        params.cluster_id
                    )),
                    port: Some(5432),
                },
            );
        Ok(())
    }

    async fn create_instance(
        &self,
        params: &CreateInstanceParams,
    ) -> std::result::Result<(), DatabaseError> {
        self.instance_creates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(params.clone());
        self.instances
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                params.instance_id.clone(),
                DbInstanceInfo {
                    status: "available".into(),
                },
            );
        Ok(())
    }

    async fn delete_instance(&self, instance_id: &str) -> std::result::Result<(), DatabaseError> {
        self.instances
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(instance_id);
        Ok(())
    }

    async fn delete_cluster(
        &self,
        cluster_id: &str,
        _skip_final_snapshot: bool,
        _final_snapshot_id: &str,
    ) -> std::result::Result<(), DatabaseError> {
        self.clusters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(cluster_id);
        Ok(())
    }

    async fn account_quotas(&self) -> std::result::Result<Vec<AccountQuota>, DatabaseError> {
        Ok(vec![AccountQuota {
            name: "DBClusters".into(),
            used: self
                .clusters
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .len() as f64,
            max: 40.0,
        }])
    }
}

/// One call of [`FakeInitializer::initialize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Initialization {
    pub host: String,
    pub port: u16,
    pub master_password: String,
    pub tenant_password: String,
}

/// Records user initialisation instead of connecting to Postgres.
#[derive(Default)]
pub struct FakeInitializer {
    pub calls: Mutex<Vec<Initialization>>,
}

impl FakeInitializer {
    pub fn calls(&self) -> Vec<Initialization> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl DatabaseInitializer for FakeInitializer {
    async fn initialize(
        &self,
        host: &str,
        port: u16,
        master_password: &str,
        tenant_password: &str,
    ) -> std::result::Result<(), DatabaseError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Initialization {
                host: host.to_string(),
                port,
                master_password: master_password.to_string(),
                tenant_password: tenant_password.to_string(),
            });
        Ok(())
    }
}
