// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for the fleetshard agent.
//!
//! This module contains all numeric and string constants used throughout the codebase.
//! Constants are organized by category for easy maintenance.

use std::time::Duration;

// ============================================================================
// Fleet Manager API
// ============================================================================

/// Base path of the private agent-cluster API
pub const FLEET_MANAGER_AGENT_CLUSTERS_PATH: &str = "/api/rhacs/v1/agent-clusters";

/// Base path of the public centrals API (used for secret restore)
pub const FLEET_MANAGER_CENTRALS_PATH: &str = "/api/rhacs/v1/centrals";

/// Default OCM refresh-token endpoint
pub const DEFAULT_OCM_TOKEN_URL: &str =
    "https://sso.redhat.com/auth/realms/redhat-external/protocol/openid-connect/token";

/// OAuth client used for the OCM refresh-token flow
pub const OCM_CLIENT_ID: &str = "cloud-services";

/// Refresh cached bearer tokens this long before they expire
pub const TOKEN_EXPIRY_LEEWAY_SECS: u64 = 30;

// ============================================================================
// Runtime
// ============================================================================

/// Default delay between two runtime ticks
pub const DEFAULT_POLL_PERIOD: Duration = Duration::from_secs(5);

/// Default size of the tenant worker pool
pub const DEFAULT_WORKER_POOL_SIZE: usize = 20;

/// Default number of consecutive ticks a labelled namespace must be missing from
/// the tenant list before it is garbage-collected
pub const DEFAULT_GC_ABSENT_TICKS: u32 = 3;

/// Initial delay after the first failed Fleet Manager poll
pub const POLL_BACKOFF_INITIAL_SECS: u64 = 5;

/// Growth factor between consecutive failed polls
pub const POLL_BACKOFF_MULTIPLIER: f64 = 3.0;

/// Randomization factor applied to every poll backoff (±10%)
pub const POLL_BACKOFF_RANDOMIZATION: f64 = 0.1;

/// Consecutive failed polls before the ticker falls back to the reset window
pub const POLL_BACKOFF_MAX_ATTEMPTS: u32 = 5;

/// Pause after `POLL_BACKOFF_MAX_ATTEMPTS` consecutive failures
pub const POLL_BACKOFF_RESET_WINDOW_SECS: u64 = 600;

// ============================================================================
// Tenant objects
// ============================================================================

/// Prefix of every tenant namespace (`rhacs-<id>`)
pub const TENANT_NAMESPACE_PREFIX: &str = "rhacs-";

/// Name of the tenant image pull secret
pub const PULL_SECRET_NAME: &str = "stackrox";

/// Name of the encryption key-chain secret
pub const ENCRYPTION_KEY_SECRET_NAME: &str = "central-encryption-key-chain";

/// Data key holding the key-chain document
pub const ENCRYPTION_KEY_CHAIN_FILE: &str = "key-chain.yaml";

/// Size of a generated AES-256 key in bytes
pub const ENCRYPTION_KEY_LEN: usize = 32;

/// Name of the TLS secret the operator creates for Central
pub const CENTRAL_TLS_SECRET_NAME: &str = "central-tls";

/// Data key of the CA certificate inside `central-tls`
pub const CENTRAL_TLS_CA_KEY: &str = "ca.pem";

/// Name of the Central deployment used for readiness checks
pub const CENTRAL_DEPLOYMENT_NAME: &str = "central";

/// Name of the Central service routes point at
pub const CENTRAL_SERVICE_NAME: &str = "central";

/// Name of the Central service port routes point at
pub const CENTRAL_SERVICE_PORT_NAME: &str = "https";

/// Secret holding the generated admin password of a tenant
pub const CENTRAL_HTPASSWD_SECRET_NAME: &str = "central-htpasswd";

/// Data key of the admin password inside `central-htpasswd`
pub const CENTRAL_HTPASSWD_PASSWORD_KEY: &str = "password";

/// User name for basic auth against the tenant API
pub const CENTRAL_ADMIN_USER: &str = "admin";

/// Release name of the tenant-resources chart
pub const TENANT_RESOURCES_RELEASE: &str = "tenant-resources";

// ============================================================================
// Routes
// ============================================================================

/// Re-encrypt route serving the UI endpoint
pub const REENCRYPT_ROUTE_NAME: &str = "managed-central-reencrypt";

/// Passthrough route serving the data endpoint
pub const PASSTHROUGH_ROUTE_NAME: &str = "managed-central-passthrough";

/// Route condition type marking an admitted ingress
pub const ROUTE_ADMITTED_CONDITION: &str = "Admitted";

// ============================================================================
// Managed database
// ============================================================================

/// Secret holding the currently active database credential
pub const DB_PASSWORD_SECRET_NAME: &str = "central-db-password";

/// Data key of the password inside `central-db-password`
pub const DB_PASSWORD_KEY: &str = "password";

/// `ConfigMap` overriding the database ID of a tenant
pub const DB_OVERRIDE_CONFIGMAP_NAME: &str = "central-db-override";

/// Key of the database ID inside `central-db-override`
pub const DB_OVERRIDE_ID_KEY: &str = "databaseID";

/// Length of generated database passwords
pub const DB_PASSWORD_LENGTH: usize = 25;

/// Suffix of the database cluster identifier
pub const DB_CLUSTER_SUFFIX: &str = "-db-cluster";

/// Suffix of the database instance identifier
pub const DB_INSTANCE_SUFFIX: &str = "-db-instance";

/// Suffix of the final snapshot taken when a cluster is deleted
pub const DB_FINAL_SNAPSHOT_SUFFIX: &str = "-final";

/// Database engine
pub const DB_ENGINE: &str = "aurora-postgresql";

/// Database engine version
pub const DB_ENGINE_VERSION: &str = "13.7";

/// Instance class of serverless v2 instances
pub const DB_INSTANCE_CLASS: &str = "db.serverless";

/// Minimum serverless v2 capacity (ACU)
pub const DB_MIN_CAPACITY_ACU: f64 = 0.5;

/// Maximum serverless v2 capacity (ACU)
pub const DB_MAX_CAPACITY_ACU: f64 = 16.0;

/// Backup retention in days
pub const DB_BACKUP_RETENTION_DAYS: i32 = 30;

/// Bootstrap superuser of every cluster
pub const DB_MASTER_USER: &str = "rhacs_master";

/// Least-privileged runtime user used by Central
pub const DB_CENTRAL_USER: &str = "rhacs_central";

/// Database Central connects to
pub const DB_CENTRAL_DATABASE: &str = "central_active";

/// Maintenance database used for the privileged bootstrap connection
pub const DB_BOOTSTRAP_DATABASE: &str = "postgres";

/// Postgres port
pub const DB_PORT: u16 = 5432;

/// TLS mode used by every database connection
pub const DB_SSL_MODE: &str = "verify-full";

/// CA bundle path used by the agent process itself
pub const DB_CA_PATH_FLEETSHARD: &str =
    "/usr/local/share/ca-certificates/aws-rds-ca-global-bundle.pem";

/// CA bundle path inside the Central pod
pub const DB_CA_PATH_CENTRAL: &str = "/usr/local/share/ca-certificates/00-rds-ca-bundle.crt";

/// Interval between two database status polls
pub const DB_STATUS_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// RDS status of an available instance
pub const DB_STATUS_AVAILABLE: &str = "available";

/// RDS status of an instance or cluster being deleted
pub const DB_STATUS_DELETING: &str = "deleting";

/// RDS status of a cluster taking a backup
pub const DB_STATUS_BACKING_UP: &str = "backing-up";

// ============================================================================
// Timeouts
// ============================================================================

/// Maximum time a namespace may stay in deletion
pub const NAMESPACE_DELETION_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Maximum time tenant-resources objects may stay in deletion
pub const TENANT_RESOURCES_DELETION_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// Timeout of a single UI reachability probe
pub const UI_REACHABILITY_TIMEOUT: Duration = Duration::from_secs(10);

/// Interval between auth-provider existence checks after creation
pub const AUTH_PROVIDER_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Upper bound of the auth-provider existence check
pub const AUTH_PROVIDER_POLL_TIMEOUT: Duration = Duration::from_secs(5 * 60);

// ============================================================================
// Auth provider
// ============================================================================

/// Display name of the tenant's SSO auth provider
pub const AUTH_PROVIDER_NAME: &str = "Red Hat SSO";

/// Role granted to members of the owning organisation
pub const AUTH_PROVIDER_ORG_ROLE: &str = "Admin";

/// Role granted to everyone else
pub const AUTH_PROVIDER_DEFAULT_ROLE: &str = "None";

// ============================================================================
// Metrics
// ============================================================================

/// Default metrics listen address
pub const DEFAULT_METRICS_ADDRESS: &str = ":8080";

/// Field manager recorded on server-side writes
pub const FIELD_MANAGER: &str = "fleetshard-sync";
