// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `errors.rs`

#[cfg(test)]
mod tests {
    use super::super::*;
    use std::time::Duration;

    fn api_error(code: u16, reason: &str) -> kube::Error {
        kube::Error::Api(Box::new(kube::core::Status {
            status: Some(kube::core::response::StatusSummary::Failure),
            message: format!("{reason} ({code})"),
            reason: reason.to_string(),
            code,
            metadata: None,
            details: None,
        }))
    }

    // ========================================================================
    // Kubernetes error classification
    // ========================================================================

    #[test]
    fn test_conflict_and_throttling_are_retryable() {
        assert!(is_retryable_kube_error(&api_error(409, "Conflict")));
        assert!(is_retryable_kube_error(&api_error(429, "TooManyRequests")));
        assert!(is_retryable_kube_error(&api_error(503, "ServiceUnavailable")));
    }

    #[test]
    fn test_client_errors_are_not_retryable() {
        assert!(!is_retryable_kube_error(&api_error(400, "BadRequest")));
        assert!(!is_retryable_kube_error(&api_error(403, "Forbidden")));
        assert!(!is_retryable_kube_error(&api_error(404, "NotFound")));
    }

    #[test]
    fn test_not_found_and_conflict_helpers() {
        assert!(is_not_found(&api_error(404, "NotFound")));
        assert!(!is_not_found(&api_error(409, "AlreadyExists")));
        assert!(is_conflict(&api_error(409, "AlreadyExists")));
    }

    #[test]
    fn test_with_context_wraps_kube_error() {
        let result: std::result::Result<(), kube::Error> = Err(api_error(500, "InternalError"));
        let err = result
            .with_context("get", "Secret rhacs-cb45/stackrox")
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Retryable);
        assert!(err.to_string().contains("Secret rhacs-cb45/stackrox"));
        assert!(err.to_string().contains("get"));
    }

    #[test]
    fn test_forbidden_is_fatal_to_tenant() {
        let err = Error::kube("create", "Namespace rhacs-cb45", api_error(403, "Forbidden"));
        assert_eq!(err.kind(), ErrorKind::FatalToTenant);
    }

    // ========================================================================
    // Kind policy
    // ========================================================================

    #[test]
    fn test_sentinels_are_not_reported() {
        let busy = Error::Busy {
            tenant: "cb45".into(),
        };
        let unchanged = Error::Unchanged {
            tenant: "cb45".into(),
        };
        let deleting = Error::DeletionInProgress {
            tenant: "cb45".into(),
            pending: "namespace".into(),
        };

        assert!(!busy.kind().is_reported());
        assert!(!unchanged.kind().is_reported());
        assert!(!deleting.kind().is_reported());
    }

    #[test]
    fn test_cancelled_is_retryable() {
        assert_eq!(Error::Cancelled.kind(), ErrorKind::Retryable);
        assert!(Error::Cancelled.kind().is_reported());
    }

    #[test]
    fn test_invalid_state_is_fatal_to_tenant() {
        let err = Error::InvalidState("revision annotation 'abc' is not an integer".into());
        assert_eq!(err.kind(), ErrorKind::FatalToTenant);
        assert_eq!(err.metric_label(), "invalid_state");
    }

    #[test]
    fn test_config_is_fatal_to_process() {
        assert_eq!(
            Error::Config("CLUSTER_ID missing".into()).kind(),
            ErrorKind::FatalToProcess
        );
    }

    #[test]
    fn test_database_kinds() {
        let backup: Error = DatabaseError::BackupInProgress {
            cluster: "cb45-db-cluster".into(),
        }
        .into();
        assert_eq!(backup.kind(), ErrorKind::Retryable);
        assert_eq!(backup.metric_label(), "db_backup_in_progress");

        let auth: Error = DatabaseError::Auth("expired token".into()).into();
        assert_eq!(auth.kind(), ErrorKind::FatalToTenant);

        let throttled: Error = DatabaseError::Api {
            operation: "describe db cluster",
            message: "Throttling".into(),
            retryable: true,
        }
        .into();
        assert_eq!(throttled.kind(), ErrorKind::Retryable);
    }

    #[test]
    fn test_deletion_timeout_message() {
        let err = Error::DeletionTimeout {
            what: "namespace rhacs-cb45".into(),
            after: Duration::from_secs(1800),
        };
        assert_eq!(err.kind(), ErrorKind::FatalToTenant);
        assert!(err.to_string().contains("namespace rhacs-cb45"));
    }
}
