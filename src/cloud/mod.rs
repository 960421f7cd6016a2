// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Managed tenant databases.
//!
//! The tenant pipeline talks to a [`DatabaseProvisioner`] only. The production
//! provisioner ([`rds::RdsProvisioner`]) drives an Aurora Postgres cluster and
//! instance through the narrow [`rds::RdsApi`] and initialises users through a
//! [`rds::DatabaseInitializer`]; the AWS SDK and `sqlx` adapters live in
//! [`aws`] and [`postgres`].

pub mod aws;
pub mod postgres;
pub mod rds;

use crate::constants::{
    DB_CA_PATH_CENTRAL, DB_CENTRAL_DATABASE, DB_CENTRAL_USER, DB_CLUSTER_SUFFIX,
    DB_INSTANCE_SUFFIX, DB_SSL_MODE,
};
use crate::errors::Result;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Name of the DB cluster of a database ID.
#[must_use]
pub fn cluster_id(database_id: &str) -> String {
    format!("{database_id}{DB_CLUSTER_SUFFIX}")
}

/// Name of the DB instance of a database ID.
#[must_use]
pub fn instance_id(database_id: &str) -> String {
    format!("{database_id}{DB_INSTANCE_SUFFIX}")
}

/// Connection parameters of a tenant database as seen from the tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbConnection {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub database: String,
}

impl DbConnection {
    /// Connection for the least-privileged tenant user.
    #[must_use]
    pub fn for_central(host: &str, port: u16) -> Self {
        DbConnection {
            host: host.to_string(),
            port,
            user: DB_CENTRAL_USER.to_string(),
            database: DB_CENTRAL_DATABASE.to_string(),
        }
    }

    /// libpq keyword/value connection string handed to the Central CR.
    #[must_use]
    pub fn connection_string(&self) -> String {
        format!(
            "host={} port={} user={} dbname={} sslmode={DB_SSL_MODE} sslrootcert={DB_CA_PATH_CENTRAL}",
            self.host, self.port, self.user, self.database
        )
    }
}

/// Progress of an asynchronous deprovisioning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deprovision {
    /// Deletion was requested or is running
    Initiated,
    /// Neither cluster nor instance exists any more
    Done,
}

/// Usage of one cloud account quota.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountQuota {
    pub name: String,
    pub used: f64,
    pub max: f64,
}

/// Lifecycle of a tenant's managed database.
#[async_trait]
pub trait DatabaseProvisioner: Send + Sync {
    /// Create the cluster and instance if needed, wait until they are available
    /// and initialise the tenant user.
    ///
    /// An empty `master_password` never creates a cluster: the call waits for an
    /// existing (for example restored) cluster and skips initialisation.
    async fn ensure_db_provisioned(
        &self,
        database_id: &str,
        master_password: &str,
        tenant_password: &str,
        cancel: &CancellationToken,
    ) -> Result<()>;

    /// Request deletion of instance and cluster without waiting.
    async fn ensure_db_deprovisioned(
        &self,
        database_id: &str,
        skip_final_snapshot: bool,
    ) -> Result<Deprovision>;

    /// Connection of an existing, available cluster.
    async fn get_db_connection(&self, database_id: &str) -> Result<DbConnection>;

    async fn get_account_quotas(&self) -> Result<Vec<AccountQuota>>;
}
