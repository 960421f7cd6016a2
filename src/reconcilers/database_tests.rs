// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `database.rs`

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::cloud::AccountQuota;
    use crate::config::ReconcilerOptions;
    use crate::testing::{client_context, not_found_status, scripted_client, test_central};
    use std::sync::{Arc, Mutex};
    use tokio_util::sync::CancellationToken;

    /// Account whose clusters are all missing (restore still running) or, when
    /// `backing_up`, taking a backup.
    #[derive(Default)]
    struct RestoringDatabase {
        backing_up: bool,
        master_passwords: Mutex<Vec<String>>,
    }

    fn cluster_missing(database_id: &str) -> Error {
        DatabaseError::NotFound {
            what: "cluster",
            id: format!("rhacs-{database_id}"),
        }
        .into()
    }

    #[async_trait]
    impl DatabaseProvisioner for RestoringDatabase {
        async fn ensure_db_provisioned(
            &self,
            database_id: &str,
            master_password: &str,
            _tenant_password: &str,
            _cancel: &CancellationToken,
        ) -> Result<()> {
            self.master_passwords
                .lock()
                .unwrap()
                .push(master_password.to_string());
            Err(cluster_missing(database_id))
        }

        async fn ensure_db_deprovisioned(&self, database_id: &str, _: bool) -> Result<Deprovision> {
            if self.backing_up {
                return Err(DatabaseError::BackupInProgress {
                    cluster: format!("rhacs-{database_id}"),
                }
                .into());
            }
            Ok(Deprovision::Initiated)
        }

        async fn get_db_connection(&self, database_id: &str) -> Result<DbConnection> {
            Err(cluster_missing(database_id))
        }

        async fn get_account_quotas(&self) -> Result<Vec<AccountQuota>> {
            Ok(Vec::new())
        }
    }

    fn managed_db_context(client: kube::Client, db: Arc<RestoringDatabase>) -> Context {
        let options = ReconcilerOptions {
            managed_db_enabled: true,
            ..ReconcilerOptions::default()
        };
        client_context(client, options).with_database(db)
    }

    #[test]
    fn test_generate_password_is_alphanumeric() {
        let password = generate_password(25);
        assert_eq!(password.len(), 25);
        assert!(password.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(password, generate_password(25));
    }

    #[test]
    fn test_legacy_secret_is_master() {
        let mut secret = credential_secret("rhacs-cb45", "pw", DB_USER_TYPE_MASTER);
        secret.metadata.annotations = None;
        assert_eq!(user_type(&secret), DB_USER_TYPE_MASTER);
    }

    #[test]
    fn test_credential_secret_round_trip() {
        let secret = credential_secret("rhacs-cb45", "s3cret", DB_USER_TYPE_CENTRAL);
        assert_eq!(secret.metadata.name.as_deref(), Some("central-db-password"));
        assert_eq!(user_type(&secret), DB_USER_TYPE_CENTRAL);
        assert_eq!(stored_password(&secret).unwrap(), "s3cret");
    }

    #[test]
    fn test_rotated_secret_drops_master_password() {
        let mut master = credential_secret("rhacs-cb45", "master-pw", DB_USER_TYPE_MASTER);
        master.metadata.resource_version = Some("7".into());
        master.metadata.annotations = None;

        let rotated = rotated_secret(master, "cb45", "tenant-pw");

        assert_eq!(user_type(&rotated), DB_USER_TYPE_CENTRAL);
        assert_eq!(stored_password(&rotated).unwrap(), "tenant-pw");
        assert_eq!(rotated.metadata.resource_version.as_deref(), Some("7"));
        assert!(crate::labels::is_owned_by(rotated.labels(), "cb45"));
        let serialized = serde_json::to_string(&rotated).unwrap();
        assert!(!serialized.contains("master-pw"));
        assert!(!serialized.contains(&base64::Engine::encode(
            &base64::engine::general_purpose::STANDARD,
            "master-pw"
        )));
    }

    #[test]
    fn test_stored_password_missing_key() {
        let mut secret = credential_secret("rhacs-cb45", "s3cret", DB_USER_TYPE_MASTER);
        secret.data = None;
        assert!(matches!(
            stored_password(&secret),
            Err(Error::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_restoring_database_is_deferred() {
        let (client, requests) = scripted_client(|_: &http::Method, path: &str| {
            if path.ends_with(DB_PASSWORD_SECRET_NAME) {
                let secret = credential_secret("rhacs-cb45", "tenant-pw", DB_USER_TYPE_CENTRAL);
                (200, serde_json::to_value(secret).unwrap())
            } else {
                not_found_status()
            }
        });
        let db = Arc::new(RestoringDatabase::default());
        let ctx = managed_db_context(client, db.clone());
        let central = test_central();
        let mut run = TenantRun::new(&central);

        for _ in 0..2 {
            let step = DatabaseReconciler.ensure_present(&ctx, &mut run).await.unwrap();
            assert_eq!(step, Step::Continue);
        }

        assert!(run.db_connection.is_none());
        assert_eq!(run.deferred.len(), 2);
        assert!(run.deferred[0].contains("database cb45 is being restored"));
        assert_eq!(*db.master_passwords.lock().unwrap(), ["", ""]);
        assert!(requests
            .lock()
            .unwrap()
            .iter()
            .all(|r| r.method == http::Method::GET));
    }

    #[tokio::test]
    async fn test_backup_in_progress_keeps_deletion_pending() {
        let (client, _) = scripted_client(|_: &http::Method, _: &str| not_found_status());
        let db = Arc::new(RestoringDatabase {
            backing_up: true,
            ..RestoringDatabase::default()
        });
        let ctx = managed_db_context(client, db);
        let central = test_central();
        let mut run = TenantRun::new(&central);

        let completion = DatabaseReconciler.ensure_absent(&ctx, &mut run).await.unwrap();
        assert_eq!(
            completion,
            Completion::Pending("database cluster rhacs-cb45 is backing up".into())
        );
    }
}
