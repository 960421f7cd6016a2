// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Error taxonomy of the fleetshard agent.
//!
//! Every fallible library operation returns [`Result`]. The variants double as
//! control flow between the tenant pipeline and the runtime: [`Error::kind`]
//! classifies an error into one [`ErrorKind`], and the runtime decides from that
//! kind whether a tenant status is reported, retried or skipped.
//!
//! | Kind | Policy |
//! |------|--------|
//! | `Busy` | skip, do not report |
//! | `Unchanged` | skip, do not report |
//! | `DeletionInProgress` | retry next tick, do not report |
//! | `Retryable` | retry next tick, report `Installing` |
//! | `FatalToTenant` | report the error for this tenant only |
//! | `FatalToProcess` | exit the process |

use std::time::Duration;
use thiserror::Error;

/// Result alias used across the library.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Classification of an [`Error`] used by the runtime's reporting policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Another reconciliation of the same tenant is in flight.
    Busy,
    /// Nothing changed since the last successful reconciliation.
    Unchanged,
    /// An asynchronous deletion step has not completed yet.
    DeletionInProgress,
    /// Transient condition, the next tick retries.
    Retryable,
    /// The tenant's state is invalid; other tenants are unaffected.
    FatalToTenant,
    /// The process cannot continue.
    FatalToProcess,
}

impl ErrorKind {
    /// Whether the runtime reports a status upstream for this kind.
    #[must_use]
    pub fn is_reported(self) -> bool {
        !matches!(
            self,
            ErrorKind::Busy | ErrorKind::Unchanged | ErrorKind::DeletionInProgress
        )
    }
}

/// Errors surfaced by the fleetshard library.
#[derive(Error, Debug)]
pub enum Error {
    /// Single-flight guard of the tenant reconciler is held
    #[error("reconciler for tenant '{tenant}' is busy")]
    Busy {
        /// Tenant whose reconciler is busy
        tenant: String,
    },

    /// Tenant payload and observed state are unchanged since the last success
    #[error("tenant '{tenant}' unchanged since last reconciliation")]
    Unchanged {
        /// Tenant that was skipped
        tenant: String,
    },

    /// At least one deletion step is still running
    #[error("deletion of tenant '{tenant}' in progress: {pending}")]
    DeletionInProgress {
        /// Tenant being deleted
        tenant: String,
        /// Names of the steps that are not done yet
        pending: String,
    },

    /// The root cancellation token fired
    #[error("operation cancelled")]
    Cancelled,

    /// Kubernetes API call failed
    #[error("kubernetes {operation} of {key} failed: {source}")]
    Kube {
        /// Operation that failed (e.g. `get`, `create`, `replace`)
        operation: &'static str,
        /// Object key (`kind namespace/name`)
        key: String,
        /// Underlying client error
        #[source]
        source: kube::Error,
    },

    /// A precondition is not met yet (route not admitted, TLS secret missing, ...)
    #[error("not ready yet: {0}")]
    NotReady(String),

    /// Tenant state is invalid and cannot be converged without intervention
    #[error("invalid tenant state: {0}")]
    InvalidState(String),

    /// An object with the desired name exists but lacks the ownership labels
    #[error("refusing to modify {key}: missing ownership labels for tenant '{tenant}'")]
    NotOwned {
        /// Object key
        key: String,
        /// Tenant that attempted the write
        tenant: String,
    },

    /// Fleet Manager HTTP call failed
    #[error("fleet manager {operation} failed: {message}")]
    FleetManager {
        /// Operation (e.g. `list centrals`)
        operation: &'static str,
        /// Failure description
        message: String,
        /// Whether the failure is transient
        retryable: bool,
    },

    /// Tenant-internal API call failed
    #[error("tenant api {operation} failed: {message}")]
    TenantApi {
        /// Operation (e.g. `create auth provider`)
        operation: &'static str,
        /// Failure description
        message: String,
        /// Whether the failure is transient
        retryable: bool,
    },

    /// Managed database provisioning failed
    #[error(transparent)]
    Database(#[from] DatabaseError),

    /// Secret restore payload could not be decrypted
    #[error("cannot decrypt secret '{secret}': {message}")]
    Cipher {
        /// Name of the secret
        secret: String,
        /// Failure description
        message: String,
    },

    /// Chart rendering failed
    #[error("rendering chart '{chart}' failed: {message}")]
    Render {
        /// Chart or release name
        chart: String,
        /// Failure description
        message: String,
    },

    /// A deletion step did not finish within its deadline
    #[error("deletion of {what} did not finish within {after:?}")]
    DeletionTimeout {
        /// What is being deleted
        what: String,
        /// Deadline that elapsed
        after: Duration,
    },

    /// Serialization of a wire or cluster object failed
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration cannot be loaded or is inconsistent
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Errors of the managed-database provisioner.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// The cluster is taking a backup and cannot be deleted now
    #[error("database cluster '{cluster}' has a backup in progress")]
    BackupInProgress {
        /// Cluster identifier
        cluster: String,
    },

    /// The cluster or instance does not exist
    #[error("database {what} '{id}' not found")]
    NotFound {
        /// `cluster` or `instance`
        what: &'static str,
        /// Identifier looked up
        id: String,
    },

    /// Cloud credentials were rejected
    #[error("cloud provider rejected credentials: {0}")]
    Auth(String),

    /// Cloud API call failed
    #[error("cloud api {operation} failed: {message}")]
    Api {
        /// Operation (e.g. `create db cluster`)
        operation: &'static str,
        /// Failure description
        message: String,
        /// Whether the failure is transient
        retryable: bool,
    },

    /// User initialisation on the new cluster failed
    #[error("database initialisation failed: {0}")]
    Init(String),
}

impl DatabaseError {
    /// Classify a provisioner error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            DatabaseError::BackupInProgress { .. }
            | DatabaseError::NotFound { .. }
            | DatabaseError::Init(_) => ErrorKind::Retryable,
            DatabaseError::Auth(_) => ErrorKind::FatalToTenant,
            DatabaseError::Api { retryable, .. } => {
                if *retryable {
                    ErrorKind::Retryable
                } else {
                    ErrorKind::FatalToTenant
                }
            }
        }
    }
}

impl Error {
    /// Classify this error for the runtime's reporting policy.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Busy { .. } => ErrorKind::Busy,
            Error::Unchanged { .. } => ErrorKind::Unchanged,
            Error::DeletionInProgress { .. } => ErrorKind::DeletionInProgress,
            Error::Cancelled | Error::NotReady(_) => ErrorKind::Retryable,
            Error::Kube { source, .. } => {
                if is_retryable_kube_error(source) {
                    ErrorKind::Retryable
                } else {
                    ErrorKind::FatalToTenant
                }
            }
            Error::FleetManager { retryable, .. } | Error::TenantApi { retryable, .. } => {
                if *retryable {
                    ErrorKind::Retryable
                } else {
                    ErrorKind::FatalToTenant
                }
            }
            Error::Database(db) => db.kind(),
            Error::InvalidState(_)
            | Error::NotOwned { .. }
            | Error::Cipher { .. }
            | Error::Render { .. }
            | Error::DeletionTimeout { .. }
            | Error::Serialization(_) => ErrorKind::FatalToTenant,
            Error::Config(_) => ErrorKind::FatalToProcess,
        }
    }

    /// Stable label for the per-reason failure counter.
    #[must_use]
    pub fn metric_label(&self) -> &'static str {
        match self {
            Error::Busy { .. } => "busy",
            Error::Unchanged { .. } => "unchanged",
            Error::DeletionInProgress { .. } => "deletion_in_progress",
            Error::Cancelled => "cancelled",
            Error::Kube { .. } => "kubernetes",
            Error::NotReady(_) => "not_ready",
            Error::InvalidState(_) => "invalid_state",
            Error::NotOwned { .. } => "not_owned",
            Error::FleetManager { .. } => "fleet_manager",
            Error::TenantApi { .. } => "tenant_api",
            Error::Database(DatabaseError::BackupInProgress { .. }) => "db_backup_in_progress",
            Error::Database(_) => "database",
            Error::Cipher { .. } => "cipher",
            Error::Render { .. } => "render",
            Error::DeletionTimeout { .. } => "deletion_timeout",
            Error::Serialization(_) => "serialization",
            Error::Config(_) => "config",
        }
    }

    /// Wrap a Kubernetes client error with the operation and object key.
    pub fn kube(operation: &'static str, key: impl Into<String>, source: kube::Error) -> Self {
        Error::Kube {
            operation,
            key: key.into(),
            source,
        }
    }
}

/// Attach operation context to Kubernetes client results.
pub trait KubeResultExt<T> {
    /// Wrap the error, if any, into [`Error::Kube`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Kube`] when the underlying call failed.
    fn with_context(self, operation: &'static str, key: impl Into<String>) -> Result<T>;
}

impl<T> KubeResultExt<T> for std::result::Result<T, kube::Error> {
    fn with_context(self, operation: &'static str, key: impl Into<String>) -> Result<T> {
        self.map_err(|source| Error::kube(operation, key, source))
    }
}

/// Determine if a Kubernetes error is transient.
///
/// # Retryable Errors
///
/// - **HTTP 409** (Conflict) - stale `resourceVersion`, the next tick re-reads
/// - **HTTP 429** (Too Many Requests) - Rate limiting
/// - **HTTP 5xx** (Server Errors) - Temporary API server issues
/// - **Service/transport errors** - Network/connection issues
#[must_use]
pub fn is_retryable_kube_error(err: &kube::Error) -> bool {
    match err {
        kube::Error::Api(api_err) => {
            api_err.code == 409 || api_err.code == 429 || (api_err.code >= 500 && api_err.code < 600)
        }
        kube::Error::Service(_) | kube::Error::HyperError(_) => true,
        _ => false,
    }
}

/// Whether a Kubernetes error is a 404.
#[must_use]
pub fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(api_err) if api_err.code == 404)
}

/// Whether a Kubernetes error is a 409 `AlreadyExists` or `Conflict`.
#[must_use]
pub fn is_conflict(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(api_err) if api_err.code == 409)
}

#[cfg(test)]
#[path = "errors_tests.rs"]
mod errors_tests;
