// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Process configuration.
//!
//! Every setting is read from an environment variable (or the equivalent long
//! flag) by `clap`. [`Config::validate`] checks cross-field requirements, and
//! [`Config::reconciler_options`] derives the immutable options handed to every
//! tenant reconciler.

use crate::constants::{
    DEFAULT_GC_ABSENT_TICKS, DEFAULT_METRICS_ADDRESS, DEFAULT_OCM_TOKEN_URL, DEFAULT_POLL_PERIOD,
    DEFAULT_WORKER_POOL_SIZE,
};
use crate::duration::parse_duration;
use crate::errors::{Error, Result};
use clap::{ArgAction, Parser, ValueEnum};
use std::net::SocketAddr;
use std::time::Duration;

/// How the agent authenticates against Fleet Manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AuthType {
    /// OCM offline refresh token exchanged for access tokens
    #[value(name = "OCM")]
    Ocm,
    /// Service-account client credentials against Red Hat SSO
    #[value(name = "RHSSO")]
    Rhsso,
    /// Fixed bearer token
    #[value(name = "STATIC_TOKEN")]
    StaticToken,
}

/// Cipher used to decrypt secrets restored from Fleet Manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SecretEncryptionType {
    /// AES-256-GCM with a locally configured key
    #[value(name = "local")]
    Local,
    /// AWS KMS
    #[value(name = "kms")]
    Kms,
    /// Plain base64, development only
    #[value(name = "base64")]
    Base64,
}

fn duration_arg(value: &str) -> std::result::Result<Duration, String> {
    parse_duration(value).map_err(|e| e.to_string())
}

/// Agent configuration.
#[derive(Debug, Clone, Parser)]
#[command(name = "fleetshard-sync", version, about = "RHACS tenant control-plane agent")]
pub struct Config {
    /// Fleet Manager base URL
    #[arg(long, env = "FLEET_MANAGER_ENDPOINT")]
    pub fleet_manager_endpoint: String,

    /// ID of the data-plane cluster this agent runs on
    #[arg(long, env = "CLUSTER_ID")]
    pub cluster_id: String,

    #[arg(long, env = "RUNTIME_POLL_PERIOD", default_value = "5s", value_parser = duration_arg)]
    pub runtime_poll_period: Duration,

    #[arg(long, env = "RUNTIME_WORKERS", default_value_t = DEFAULT_WORKER_POOL_SIZE)]
    pub runtime_workers: usize,

    /// Consecutive ticks a labelled namespace must be missing from the tenant list
    /// before it is garbage-collected
    #[arg(long, env = "RUNTIME_GC_ABSENT_TICKS", default_value_t = DEFAULT_GC_ABSENT_TICKS)]
    pub runtime_gc_absent_ticks: u32,

    #[arg(long, env = "AUTH_TYPE", value_enum, ignore_case = true, default_value = "RHSSO")]
    pub auth_type: AuthType,

    #[arg(long, env = "OCM_TOKEN", hide_env_values = true)]
    pub ocm_token: Option<String>,

    #[arg(long, env = "OCM_TOKEN_URL", default_value = DEFAULT_OCM_TOKEN_URL)]
    pub ocm_token_url: String,

    #[arg(long, env = "RHSSO_CLIENT_ID")]
    pub rhsso_client_id: Option<String>,

    #[arg(long, env = "RHSSO_CLIENT_SECRET", hide_env_values = true)]
    pub rhsso_client_secret: Option<String>,

    #[arg(long, env = "RHSSO_TOKEN_URL")]
    pub rhsso_token_url: Option<String>,

    #[arg(long, env = "STATIC_TOKEN", hide_env_values = true)]
    pub static_token: Option<String>,

    #[arg(long, env = "MANAGED_DB_ENABLED", default_value_t = false, action = ArgAction::Set)]
    pub managed_db_enabled: bool,

    #[arg(long, env = "MANAGED_DB_SECURITY_GROUP")]
    pub managed_db_security_group: Option<String>,

    #[arg(long, env = "MANAGED_DB_SUBNET_GROUP")]
    pub managed_db_subnet_group: Option<String>,

    #[arg(long, env = "AWS_ROLE_ARN")]
    pub aws_role_arn: Option<String>,

    #[arg(long, env = "AWS_REGION", default_value = "us-east-1")]
    pub aws_region: String,

    #[arg(long, env = "CREATE_AUTH_PROVIDER", default_value_t = false, action = ArgAction::Set)]
    pub create_auth_provider: bool,

    #[arg(long, env = "EGRESS_PROXY_IMAGE")]
    pub egress_proxy_image: Option<String>,

    #[arg(long, env = "FLEETSHARD_METRICS_ADDRESS", default_value = DEFAULT_METRICS_ADDRESS)]
    pub metrics_address: String,

    #[arg(long, env = "USE_ROUTES", default_value_t = true, action = ArgAction::Set)]
    pub use_routes: bool,

    #[arg(long, env = "ROUTE_THROTTLING_ENABLED", default_value_t = true, action = ArgAction::Set)]
    pub route_throttling_enabled: bool,

    #[arg(long, env = "ROUTE_CONCURRENT_TCP", default_value_t = 32)]
    pub route_concurrent_tcp: u32,

    #[arg(long, env = "ROUTE_RATE_HTTP", default_value_t = 128)]
    pub route_rate_http: u32,

    #[arg(long, env = "ROUTE_RATE_TCP", default_value_t = 16)]
    pub route_rate_tcp: u32,

    #[arg(long, env = "ROUTE_REENCRYPT_TIMEOUT", default_value = "10m", value_parser = duration_arg)]
    pub route_reencrypt_timeout: Duration,

    /// Docker config JSON written into every tenant's pull secret
    #[arg(long, env = "TENANT_IMAGE_PULL_SECRET", default_value = "", hide_env_values = true)]
    pub tenant_image_pull_secret: String,

    #[arg(long, env = "SECRET_ENCRYPTION_TYPE", value_enum, default_value = "local")]
    pub secret_encryption_type: SecretEncryptionType,

    /// Base64-encoded AES-256 key for the `local` cipher
    #[arg(long, env = "SECRET_ENCRYPTION_KEY", hide_env_values = true)]
    pub secret_encryption_key: Option<String>,

    /// KMS key ID for the `kms` cipher
    #[arg(long, env = "SECRET_ENCRYPTION_KEY_ID")]
    pub secret_encryption_key_id: Option<String>,

    #[arg(long, env = "UI_REACHABILITY_CHECK", default_value_t = false, action = ArgAction::Set)]
    pub ui_reachability_check: bool,
}

fn require(value: Option<&String>, name: &str) -> Result<()> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(()),
        _ => Err(Error::Config(format!("{name} must be set"))),
    }
}

impl Config {
    /// Parse the process arguments and environment, then validate.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when parsing or validation fails.
    pub fn load() -> Result<Self> {
        let config = Self::try_parse().map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field requirements.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first missing or invalid setting.
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.fleet_manager_endpoint).map_err(|e| {
            Error::Config(format!(
                "FLEET_MANAGER_ENDPOINT '{}' is not a URL: {e}",
                self.fleet_manager_endpoint
            ))
        })?;

        if self.cluster_id.trim().is_empty() {
            return Err(Error::Config("CLUSTER_ID must be set".into()));
        }
        if self.runtime_workers == 0 {
            return Err(Error::Config("RUNTIME_WORKERS must be at least 1".into()));
        }
        if self.runtime_gc_absent_ticks == 0 {
            return Err(Error::Config(
                "RUNTIME_GC_ABSENT_TICKS must be at least 1".into(),
            ));
        }

        match self.auth_type {
            AuthType::Ocm => require(self.ocm_token.as_ref(), "OCM_TOKEN")?,
            AuthType::Rhsso => {
                require(self.rhsso_client_id.as_ref(), "RHSSO_CLIENT_ID")?;
                require(self.rhsso_client_secret.as_ref(), "RHSSO_CLIENT_SECRET")?;
                require(self.rhsso_token_url.as_ref(), "RHSSO_TOKEN_URL")?;
            }
            AuthType::StaticToken => require(self.static_token.as_ref(), "STATIC_TOKEN")?,
        }

        if self.managed_db_enabled {
            require(
                self.managed_db_security_group.as_ref(),
                "MANAGED_DB_SECURITY_GROUP",
            )?;
            require(
                self.managed_db_subnet_group.as_ref(),
                "MANAGED_DB_SUBNET_GROUP",
            )?;
        }

        match self.secret_encryption_type {
            SecretEncryptionType::Local => {
                require(self.secret_encryption_key.as_ref(), "SECRET_ENCRYPTION_KEY")?;
            }
            SecretEncryptionType::Kms => {
                require(
                    self.secret_encryption_key_id.as_ref(),
                    "SECRET_ENCRYPTION_KEY_ID",
                )?;
            }
            SecretEncryptionType::Base64 => {}
        }

        self.metrics_socket_addr()?;
        Ok(())
    }

    /// Metrics listen address; a bare `:port` binds all interfaces.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when the address cannot be parsed.
    pub fn metrics_socket_addr(&self) -> Result<SocketAddr> {
        let address = if self.metrics_address.starts_with(':') {
            format!("0.0.0.0{}", self.metrics_address)
        } else {
            self.metrics_address.clone()
        };
        address.parse().map_err(|e| {
            Error::Config(format!(
                "FLEETSHARD_METRICS_ADDRESS '{}' is invalid: {e}",
                self.metrics_address
            ))
        })
    }

    /// Options shared by every tenant reconciler.
    #[must_use]
    pub fn reconciler_options(&self) -> ReconcilerOptions {
        ReconcilerOptions {
            use_routes: self.use_routes,
            managed_db_enabled: self.managed_db_enabled,
            create_auth_provider: self.create_auth_provider,
            ui_reachability_check: self.ui_reachability_check,
            egress_proxy_image: self
                .egress_proxy_image
                .clone()
                .filter(|image| !image.is_empty()),
            image_pull_secret: self.tenant_image_pull_secret.clone().into_bytes(),
            routes: RouteParameters {
                throttling_enabled: self.route_throttling_enabled,
                concurrent_tcp: self.route_concurrent_tcp,
                rate_http: self.route_rate_http,
                rate_tcp: self.route_rate_tcp,
                reencrypt_timeout: self.route_reencrypt_timeout,
            },
        }
    }

    /// Runtime loop settings.
    #[must_use]
    pub fn runtime_options(&self) -> RuntimeOptions {
        RuntimeOptions {
            cluster_id: self.cluster_id.clone(),
            poll_period: self.runtime_poll_period,
            workers: self.runtime_workers,
            gc_absent_ticks: self.runtime_gc_absent_ticks,
            managed_db_enabled: self.managed_db_enabled,
        }
    }
}

/// Throttling and timeout settings of tenant routes.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteParameters {
    pub throttling_enabled: bool,
    pub concurrent_tcp: u32,
    pub rate_http: u32,
    pub rate_tcp: u32,
    pub reencrypt_timeout: Duration,
}

impl Default for RouteParameters {
    fn default() -> Self {
        RouteParameters {
            throttling_enabled: true,
            concurrent_tcp: 32,
            rate_http: 128,
            rate_tcp: 16,
            reencrypt_timeout: Duration::from_secs(600),
        }
    }
}

/// Immutable options of a tenant reconciler.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcilerOptions {
    pub use_routes: bool,
    pub managed_db_enabled: bool,
    pub create_auth_provider: bool,
    pub ui_reachability_check: bool,
    pub egress_proxy_image: Option<String>,
    /// Docker config JSON; empty means no pull secret
    pub image_pull_secret: Vec<u8>,
    pub routes: RouteParameters,
}

impl Default for ReconcilerOptions {
    fn default() -> Self {
        ReconcilerOptions {
            use_routes: true,
            managed_db_enabled: false,
            create_auth_provider: false,
            ui_reachability_check: false,
            egress_proxy_image: None,
            image_pull_secret: Vec::new(),
            routes: RouteParameters::default(),
        }
    }
}

/// Settings of the runtime poll loop.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeOptions {
    pub cluster_id: String,
    pub poll_period: Duration,
    pub workers: usize,
    pub gc_absent_ticks: u32,
    pub managed_db_enabled: bool,
}

impl RuntimeOptions {
    #[must_use]
    pub fn new(cluster_id: &str) -> Self {
        RuntimeOptions {
            cluster_id: cluster_id.to_string(),
            poll_period: DEFAULT_POLL_PERIOD,
            workers: DEFAULT_WORKER_POOL_SIZE,
            gc_absent_ticks: DEFAULT_GC_ABSENT_TICKS,
            managed_db_enabled: false,
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;
