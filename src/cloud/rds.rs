// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Aurora Postgres provisioner.
//!
//! # State machine
//!
//! ```text
//! absent ──create cluster──► cluster ──create instance──► creating ──poll──► available ──init users──► done
//! ```
//!
//! Every step checks the remote state first, so a call interrupted at any point
//! resumes where it stopped. Deprovisioning only requests deletion; a later call
//! observing that both cluster and instance are gone reports [`Deprovision::Done`].

use super::{
    cluster_id, instance_id, AccountQuota, DatabaseProvisioner, DbConnection, Deprovision,
};
use crate::constants::{
    DB_BACKUP_RETENTION_DAYS, DB_ENGINE, DB_ENGINE_VERSION, DB_FINAL_SNAPSHOT_SUFFIX,
    DB_INSTANCE_CLASS, DB_MASTER_USER, DB_MAX_CAPACITY_ACU, DB_MIN_CAPACITY_ACU, DB_PORT,
    DB_STATUS_AVAILABLE, DB_STATUS_BACKING_UP, DB_STATUS_DELETING, DB_STATUS_POLL_INTERVAL,
};
use crate::errors::{DatabaseError, Error, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Observed state of a DB cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbClusterInfo {
    pub status: String,
    /// Writer endpoint, absent until the cluster is created
    pub endpoint: Option<String>,
    pub port: Option<u16>,
}

/// Observed state of a DB instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbInstanceInfo {
    pub status: String,
}

/// Parameters of a new DB cluster.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateClusterParams {
    pub cluster_id: String,
    pub engine: String,
    pub engine_version: String,
    pub master_user: String,
    pub master_password: String,
    pub min_capacity: f64,
    pub max_capacity: f64,
    pub backup_retention_days: i32,
    pub storage_encrypted: bool,
    pub security_group: String,
    pub subnet_group: String,
    pub database_id: String,
}

/// Parameters of a new DB instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateInstanceParams {
    pub instance_id: String,
    pub cluster_id: String,
    pub instance_class: String,
    pub engine: String,
}

/// The slice of the RDS API the provisioner needs.
#[async_trait]
pub trait RdsApi: Send + Sync {
    /// `None` when the cluster does not exist.
    async fn describe_cluster(
        &self,
        cluster_id: &str,
    ) -> std::result::Result<Option<DbClusterInfo>, DatabaseError>;

    /// `None` when the instance does not exist.
    async fn describe_instance(
        &self,
        instance_id: &str,
    ) -> std::result::Result<Option<DbInstanceInfo>, DatabaseError>;

    async fn create_cluster(
        &self,
        params: &CreateClusterParams,
    ) -> std::result::Result<(), DatabaseError>;

    async fn create_instance(
        &self,
        params: &CreateInstanceParams,
    ) -> std::result::Result<(), DatabaseError>;

    async fn delete_instance(&self, instance_id: &str) -> std::result::Result<(), DatabaseError>;

    async fn delete_cluster(
        &self,
        cluster_id: &str,
        skip_final_snapshot: bool,
        final_snapshot_id: &str,
    ) -> std::result::Result<(), DatabaseError>;

    async fn account_quotas(&self) -> std::result::Result<Vec<AccountQuota>, DatabaseError>;
}

/// Creates the tenant user and database on a fresh cluster.
#[async_trait]
pub trait DatabaseInitializer: Send + Sync {
    /// Connect as the master user and create (or reset) the tenant user.
    /// Must be safe to call repeatedly.
    async fn initialize(
        &self,
        host: &str,
        port: u16,
        master_password: &str,
        tenant_password: &str,
    ) -> std::result::Result<(), DatabaseError>;
}

/// [`DatabaseProvisioner`] backed by Aurora Postgres.
pub struct RdsProvisioner {
    rds: Arc<dyn RdsApi>,
    initializer: Arc<dyn DatabaseInitializer>,
    security_group: String,
    subnet_group: String,
    poll_interval: Duration,
}

impl RdsProvisioner {
    #[must_use]
    pub fn new(
        rds: Arc<dyn RdsApi>,
        initializer: Arc<dyn DatabaseInitializer>,
        security_group: &str,
        subnet_group: &str,
    ) -> Self {
        RdsProvisioner {
            rds,
            initializer,
            security_group: security_group.to_string(),
            subnet_group: subnet_group.to_string(),
            poll_interval: DB_STATUS_POLL_INTERVAL,
        }
    }

    /// Override the status poll interval.
    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    async fn ensure_cluster(&self, database_id: &str, master_password: &str) -> Result<()> {
        let cluster = cluster_id(database_id);
        if self.rds.describe_cluster(&cluster).await?.is_some() {
            return Ok(());
        }
        if master_password.is_empty() {
            return Err(DatabaseError::NotFound {
                what: "cluster",
                id: cluster,
            }
            .into());
        }

        info!(cluster = %cluster, "Creating DB cluster");
        self.rds
            .create_cluster(&CreateClusterParams {
                cluster_id: cluster.clone(),
                engine: DB_ENGINE.to_string(),
                engine_version: DB_ENGINE_VERSION.to_string(),
                master_user: DB_MASTER_USER.to_string(),
                master_password: master_password.to_string(),
                min_capacity: DB_MIN_CAPACITY_ACU,
                max_capacity: DB_MAX_CAPACITY_ACU,
                backup_retention_days: DB_BACKUP_RETENTION_DAYS,
                storage_encrypted: true,
                security_group: self.security_group.clone(),
                subnet_group: self.subnet_group.clone(),
                database_id: database_id.to_string(),
            })
            .await?;
        Ok(())
    }

    async fn ensure_instance(&self, database_id: &str) -> Result<()> {
        let instance = instance_id(database_id);
        if self.rds.describe_instance(&instance).await?.is_some() {
            return Ok(());
        }

        info!(instance = %instance, "Creating DB instance");
        self.rds
            .create_instance(&CreateInstanceParams {
                instance_id: instance,
                cluster_id: cluster_id(database_id),
                instance_class: DB_INSTANCE_CLASS.to_string(),
                engine: DB_ENGINE.to_string(),
            })
            .await?;
        Ok(())
    }

    /// Poll until the instance is available and the cluster has an endpoint.
    async fn wait_available(
        &self,
        database_id: &str,
        cancel: &CancellationToken,
    ) -> Result<(String, u16)> {
        let cluster = cluster_id(database_id);
        let instance = instance_id(database_id);
        loop {
            let cluster_info = self.rds.describe_cluster(&cluster).await?;
            let instance_info = self.rds.describe_instance(&instance).await?;

            if let (Some(c), Some(i)) = (&cluster_info, &instance_info) {
                if i.status == DB_STATUS_AVAILABLE {
                    if let Some(endpoint) = c.endpoint.as_deref().filter(|e| !e.is_empty()) {
                        return Ok((endpoint.to_string(), c.port.unwrap_or(DB_PORT)));
                    }
                }
            }

            debug!(
                cluster = %cluster,
                cluster_status = ?cluster_info.as_ref().map(|c| c.status.as_str()),
                instance_status = ?instance_info.as_ref().map(|i| i.status.as_str()),
                "Waiting for DB to become available"
            );
            tokio::select! {
                () = cancel.cancelled() => return Err(Error::Cancelled),
                () = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }
}

#[async_trait]
impl DatabaseProvisioner for RdsProvisioner {
    async fn ensure_db_provisioned(
        &self,
        database_id: &str,
        master_password: &str,
        tenant_password: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.ensure_cluster(database_id, master_password).await?;
        self.ensure_instance(database_id).await?;
        let (host, port) = self.wait_available(database_id, cancel).await?;

        if master_password.is_empty() {
            debug!(database_id, "No master password, skipping user initialisation");
            return Ok(());
        }
        self.initializer
            .initialize(&host, port, master_password, tenant_password)
            .await?;
        info!(database_id, host = %host, "DB provisioned and initialised");
        Ok(())
    }

    async fn ensure_db_deprovisioned(
        &self,
        database_id: &str,
        skip_final_snapshot: bool,
    ) -> Result<Deprovision> {
        let cluster = cluster_id(database_id);
        let instance = instance_id(database_id);
        let cluster_info = self.rds.describe_cluster(&cluster).await?;
        let instance_info = self.rds.describe_instance(&instance).await?;

        if cluster_info.is_none() && instance_info.is_none() {
            return Ok(Deprovision::Done);
        }

        match &instance_info {
            Some(i) if i.status != DB_STATUS_DELETING => {
                info!(instance = %instance, "Deleting DB instance");
                self.rds.delete_instance(&instance).await?;
            }
            Some(_) => {}
            None => {
                // The cluster cannot be deleted while it still has an instance.
                if let Some(c) = &cluster_info {
                    if c.status == DB_STATUS_BACKING_UP {
                        return Err(DatabaseError::BackupInProgress { cluster }.into());
                    }
                    if c.status != DB_STATUS_DELETING {
                        info!(cluster = %cluster, skip_final_snapshot, "Deleting DB cluster");
                        let snapshot = format!("{cluster}{DB_FINAL_SNAPSHOT_SUFFIX}");
                        self.rds
                            .delete_cluster(&cluster, skip_final_snapshot, &snapshot)
                            .await?;
                    }
                }
            }
        }
        Ok(Deprovision::Initiated)
    }

    async fn get_db_connection(&self, database_id: &str) -> Result<DbConnection> {
        let cluster = cluster_id(database_id);
        let info = self
            .rds
            .describe_cluster(&cluster)
            .await?
            .ok_or_else(|| DatabaseError::NotFound {
                what: "cluster",
                id: cluster.clone(),
            })?;
        let endpoint = info
            .endpoint
            .filter(|e| !e.is_empty())
            .ok_or_else(|| DatabaseError::NotFound {
                what: "cluster endpoint",
                id: cluster,
            })?;
        Ok(DbConnection::for_central(
            &endpoint,
            info.port.unwrap_or(DB_PORT),
        ))
    }

    async fn get_account_quotas(&self) -> Result<Vec<AccountQuota>> {
        Ok(self.rds.account_quotas().await?)
    }
}

#[cfg(test)]
#[path = "rds_tests.rs"]
mod rds_tests;
