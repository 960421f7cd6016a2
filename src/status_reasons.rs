// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Condition types, statuses and reasons reported to Fleet Manager.
//!
//! Every tenant status carries a single `Ready` condition. The reason explains why
//! a tenant is not ready:
//!
//! ```yaml
//! conditions:
//!   - type: Ready
//!     status: "False"
//!     reason: Installing
//!     message: "central deployment has no available replicas"
//! ```

// ============================================================================
// Condition Types
// ============================================================================

/// The single encompassing condition of a tenant status
pub const CONDITION_TYPE_READY: &str = "Ready";

// ============================================================================
// Condition Status Values
// ============================================================================

/// Condition holds
pub const CONDITION_STATUS_TRUE: &str = "True";

/// Condition does not hold
pub const CONDITION_STATUS_FALSE: &str = "False";

// ============================================================================
// Reasons
// ============================================================================

/// Tenant is being installed or a transient failure is being retried.
///
/// Reported with `status: False` while the pipeline has not fully converged.
pub const REASON_INSTALLING: &str = "Installing";

/// Tenant has been fully removed from the cluster.
///
/// Reported with `status: False` once every deletion step is done.
pub const REASON_DELETED: &str = "Deleted";

/// Tenant cannot converge without intervention.
///
/// Reported with `status: False` for fatal-to-tenant errors (invalid revision
/// annotation, deletion deadline exceeded, rejected cloud credentials).
pub const REASON_ERROR: &str = "Error";

// ============================================================================
// Request Status Values (Fleet Manager side)
// ============================================================================

/// Fleet Manager has accepted the tenant and waits for it to become ready
pub const REQUEST_STATUS_PROVISIONING: &str = "provisioning";

/// Fleet Manager considers the tenant ready
pub const REQUEST_STATUS_READY: &str = "ready";

/// `forceReconcile` value disabling the unchanged short-circuit
pub const FORCE_RECONCILE_ALWAYS: &str = "always";

#[cfg(test)]
#[path = "status_reasons_tests.rs"]
mod status_reasons_tests;
