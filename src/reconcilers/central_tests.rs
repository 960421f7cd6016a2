// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `central.rs`

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::config::ReconcilerOptions;
    use crate::labels::ownership_labels;
    use crate::reconcilers::pipeline::{Completion, TenantRun};
    use crate::testing::{client_context, scripted_client, test_central, MissingDatabase};
    use std::sync::Arc;
    use serde_json::{json, Value};
    use std::collections::BTreeMap;

    const CENTRALS_PATH: &str = "/apis/platform.stackrox.io/v1alpha1/namespaces/rhacs-cb45/centrals";

    fn component(cr: &Central) -> &CentralComponentSpec {
        cr.spec.central.as_ref().unwrap()
    }

    #[test]
    fn test_desired_central_metadata() {
        let mut central = test_central();
        central.metadata.expired_at = Some("2026-01-01T00:00:00Z".into());

        let cr = desired_central(&central, "rhacs-cb45", None).unwrap();

        assert_eq!(cr.metadata.name.as_deref(), Some("test-central"));
        assert_eq!(cr.metadata.namespace.as_deref(), Some("rhacs-cb45"));
        assert!(crate::labels::is_owned_by(cr.labels(), "cb45"));
        let annotations = cr.annotations();
        assert_eq!(annotations[MANAGED_SERVICES_ANNOTATION], "true");
        assert_eq!(annotations[ORG_NAME_ANNOTATION], "Example Org");
        assert_eq!(annotations[EXPIRED_AT_ANNOTATION], "2026-01-01T00:00:00Z");
        assert!(!annotations.contains_key(REVISION_ANNOTATION));
    }

    #[test]
    fn test_desired_central_disables_operator_route_and_monitoring() {
        let cr = desired_central(&test_central(), "rhacs-cb45", None).unwrap();

        let exposure = component(&cr).exposure.as_ref().unwrap();
        assert_eq!(exposure.route, Some(EnabledFlag { enabled: false }));
        let monitoring = cr.spec.monitoring.as_ref().unwrap();
        assert_eq!(monitoring.openshift, Some(EnabledFlag { enabled: false }));
        assert!(component(&cr).db.is_none());
        assert!(component(&cr).resources.is_none());
    }

    #[test]
    fn test_telemetry_disabled_for_internal_tenants() {
        let mut central = test_central();
        let cr = desired_central(&central, "rhacs-cb45", None).unwrap();
        assert_eq!(component(&cr).telemetry, Some(TelemetrySpec { enabled: true }));

        central.metadata.internal = true;
        let cr = desired_central(&central, "rhacs-cb45", None).unwrap();
        assert_eq!(component(&cr).telemetry, Some(TelemetrySpec { enabled: false }));
    }

    #[test]
    fn test_desired_central_with_database() {
        let connection = DbConnection::for_central("cb45.cluster.rds.test", 5432);
        let cr = desired_central(&test_central(), "rhacs-cb45", Some(&connection)).unwrap();

        let db = component(&cr).db.as_ref().unwrap();
        assert_eq!(db.is_enabled.as_deref(), Some("Enabled"));
        assert_eq!(db.connection_string, Some(connection.connection_string()));
        assert_eq!(
            db.password_secret.as_ref().map(|s| s.name.as_str()),
            Some("central-db-password")
        );
    }

    #[test]
    fn test_desired_central_resources_and_scaling() {
        let mut central = test_central();
        central
            .spec
            .central
            .resources
            .requests
            .insert("cpu".into(), "2".into());
        central.spec.scanner.analyzer.scaling = ScannerScaling {
            auto_scaling: "Enabled".into(),
            replicas: 2,
            min_replicas: 1,
            max_replicas: 3,
        };

        let cr = desired_central(&central, "rhacs-cb45", None).unwrap();

        let resources = component(&cr).resources.as_ref().unwrap();
        assert_eq!(resources.requests["cpu"], "2");
        let analyzer = cr.spec.scanner.as_ref().unwrap().analyzer.as_ref().unwrap();
        let scaling = analyzer.scaling.as_ref().unwrap();
        assert_eq!(scaling.auto_scaling.as_deref(), Some("Enabled"));
        assert_eq!(scaling.max_replicas, Some(3));
        assert!(analyzer.resources.is_none());
    }

    #[test]
    fn test_desired_central_requires_name() {
        let mut central = test_central();
        central.metadata.name.clear();
        assert!(matches!(
            desired_central(&central, "rhacs-cb45", None),
            Err(Error::InvalidState(_))
        ));
    }

    #[test]
    fn test_parse_revision() {
        let mut cr = desired_central(&test_central(), "rhacs-cb45", None).unwrap();
        assert_eq!(parse_revision(&cr).unwrap(), 0);

        set_revision(&mut cr, 41);
        assert_eq!(parse_revision(&cr).unwrap(), 41);

        cr.annotations_mut()
            .insert(REVISION_ANNOTATION.into(), "forty-two".into());
        assert!(matches!(parse_revision(&cr), Err(Error::InvalidState(_))));
    }

    #[test]
    fn test_merge_onto_keeps_foreign_metadata() {
        let mut existing = desired_central(&test_central(), "rhacs-cb45", None).unwrap();
        existing.metadata.resource_version = Some("12".into());
        existing
            .labels_mut()
            .insert("team".into(), "platform".into());
        existing
            .annotations_mut()
            .insert(PAUSE_RECONCILE_ANNOTATION.into(), "true".into());

        let desired = desired_central(&test_central(), "rhacs-cb45", None).unwrap();
        let merged = merge_onto(&existing, desired, 3);

        assert_eq!(merged.metadata.resource_version.as_deref(), Some("12"));
        assert_eq!(merged.labels()["team"], "platform");
        assert_eq!(merged.annotations()[PAUSE_RECONCILE_ANNOTATION], "true");
        assert_eq!(merged.annotations()[REVISION_ANNOTATION], "3");
    }

    #[test]
    fn test_differs_ignores_resource_version() {
        let left = desired_central(&test_central(), "rhacs-cb45", None).unwrap();
        let mut right = left.clone();
        right.metadata.resource_version = Some("99".into());
        assert!(!differs(&left, &right));

        right
            .annotations_mut()
            .insert(ORG_NAME_ANNOTATION.into(), "Renamed Org".into());
        assert!(differs(&left, &right));

        let mut right = left.clone();
        right.spec.monitoring = None;
        assert!(differs(&left, &right));
    }

    fn owned_central(paused: &str) -> Value {
        let mut cr = Central::new("test-central", CentralSpec::default());
        cr.metadata.namespace = Some("rhacs-cb45".into());
        cr.metadata.labels = Some(ownership_labels("cb45"));
        cr.metadata.annotations = Some(BTreeMap::from([(
            PAUSE_RECONCILE_ANNOTATION.to_string(),
            paused.to_string(),
        )]));
        serde_json::to_value(cr).unwrap()
    }

    /// Serves one Central and answers its deletion with the terminating object.
    fn central_server(paused: &'static str) -> impl Fn(&http::Method, &str) -> (u16, Value) + Clone {
        move |method: &http::Method, path: &str| {
            let cr = owned_central(paused);
            match (method.as_str(), path) {
                ("GET", CENTRALS_PATH) => (
                    200,
                    json!({
                        "apiVersion": "platform.stackrox.io/v1alpha1",
                        "kind": "CentralList",
                        "metadata": {},
                        "items": [cr]
                    }),
                ),
                ("DELETE", _) => {
                    let mut cr = cr;
                    cr["metadata"]["deletionTimestamp"] = json!("2006-01-02T15:04:05Z");
                    (200, cr)
                }
                _ => (200, cr),
            }
        }
    }

    #[tokio::test]
    async fn test_paused_central_is_unpaused_before_delete() {
        let (client, requests) = scripted_client(central_server("true"));
        let ctx = client_context(client, ReconcilerOptions::default());
        let central = test_central();
        let mut run = TenantRun::new(&central);

        let completion = CentralReconciler.ensure_absent(&ctx, &mut run).await.unwrap();
        assert!(matches!(completion, Completion::Pending(_)));

        let requests = requests.lock().unwrap();
        let verbs: Vec<&str> = requests.iter().map(|r| r.method.as_str()).collect();
        assert_eq!(verbs, ["GET", "PATCH", "GET", "DELETE"]);
        assert_eq!(requests[1].path, format!("{CENTRALS_PATH}/test-central"));
        assert_eq!(
            requests[1].body["metadata"]["annotations"][PAUSE_RECONCILE_ANNOTATION],
            "false"
        );
    }

    #[tokio::test]
    async fn test_running_central_is_deleted_without_patch() {
        let (client, requests) = scripted_client(central_server("false"));
        let ctx = client_context(client, ReconcilerOptions::default());
        let central = test_central();
        let mut run = TenantRun::new(&central);

        let completion = CentralReconciler.ensure_absent(&ctx, &mut run).await.unwrap();
        assert!(matches!(completion, Completion::Pending(_)));

        let verbs: Vec<String> = requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.method.to_string())
            .collect();
        assert_eq!(verbs, ["GET", "GET", "DELETE"]);
    }

    #[tokio::test]
    async fn test_central_untouched_without_database_connection() {
        let (client, requests) = scripted_client(central_server("false"));
        let options = ReconcilerOptions {
            managed_db_enabled: true,
            ..ReconcilerOptions::default()
        };
        let ctx = client_context(client, options).with_database(Arc::new(MissingDatabase));
        let central = test_central();
        let mut run = TenantRun::new(&central);

        let step = CentralReconciler.ensure_present(&ctx, &mut run).await.unwrap();
        assert_eq!(step, Step::Continue);
        assert!(requests.lock().unwrap().is_empty());
    }
}
