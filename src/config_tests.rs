// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `config.rs`

#[cfg(test)]
mod tests {
    use super::super::*;
    use std::time::Duration;

    fn parse(extra: &[&str]) -> Config {
        let mut args = vec![
            "fleetshard-sync",
            "--fleet-manager-endpoint",
            "https://fm.example.test",
            "--cluster-id",
            "cluster-1",
            "--auth-type",
            "STATIC_TOKEN",
            "--static-token",
            "token",
            "--secret-encryption-type",
            "base64",
        ];
        args.extend_from_slice(extra);
        Config::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = parse(&[]);

        assert_eq!(config.runtime_poll_period, Duration::from_secs(5));
        assert_eq!(config.runtime_workers, 20);
        assert_eq!(config.runtime_gc_absent_ticks, 3);
        assert!(config.use_routes);
        assert!(!config.managed_db_enabled);
        assert_eq!(config.route_reencrypt_timeout, Duration::from_secs(600));
        assert_eq!(config.aws_region, "us-east-1");
        config.validate().unwrap();
    }

    #[test]
    fn test_poll_period_parses_go_duration() {
        let config = parse(&["--runtime-poll-period", "250ms"]);
        assert_eq!(config.runtime_poll_period, Duration::from_millis(250));
    }

    #[test]
    fn test_bool_flags_take_values() {
        let config = parse(&["--use-routes", "false", "--create-auth-provider", "true"]);
        assert!(!config.use_routes);
        assert!(config.create_auth_provider);
    }

    #[test]
    fn test_rhsso_requires_client_credentials() {
        let mut config = parse(&[]);
        config.auth_type = AuthType::Rhsso;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("RHSSO_CLIENT_ID"));
    }

    #[test]
    fn test_managed_db_requires_networking() {
        let config = parse(&["--managed-db-enabled", "true"]);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("MANAGED_DB_SECURITY_GROUP"));
    }

    #[test]
    fn test_local_cipher_requires_key() {
        let mut config = parse(&[]);
        config.secret_encryption_type = SecretEncryptionType::Local;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_endpoint_is_rejected() {
        let mut config = parse(&[]);
        config.fleet_manager_endpoint = "not a url".into();
        assert!(matches!(config.validate(), Err(crate::errors::Error::Config(_))));
    }

    #[test]
    fn test_metrics_address_port_only() {
        let config = parse(&[]);
        assert_eq!(
            config.metrics_socket_addr().unwrap().to_string(),
            "0.0.0.0:8080"
        );
    }

    #[test]
    fn test_reconciler_options_from_config() {
        let config = parse(&[
            "--egress-proxy-image",
            "quay.io/proxy:1",
            "--tenant-image-pull-secret",
            "{\"auths\":{}}",
            "--route-rate-http",
            "64",
        ]);
        let options = config.reconciler_options();

        assert_eq!(options.egress_proxy_image.as_deref(), Some("quay.io/proxy:1"));
        assert_eq!(options.image_pull_secret, b"{\"auths\":{}}".to_vec());
        assert_eq!(options.routes.rate_http, 64);
        assert_eq!(options.routes.concurrent_tcp, 32);
    }
}
