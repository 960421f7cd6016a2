// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use anyhow::{Context as _, Result};
use fleetshard_sync::{
    cipher,
    cloud::{aws, postgres::SqlxInitializer, rds::RdsProvisioner, DatabaseProvisioner},
    config::{Config, SecretEncryptionType},
    context::Context,
    fleetmanager::{auth::token_source, FleetManagerApi, FleetManagerClient},
    metrics,
    runtime::Runtime,
};
use kube::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const FLEET_MANAGER_TIMEOUT: Duration = Duration::from_secs(30);

fn main() -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("fleetshard-sync")
        .enable_all()
        .build()?;

    runtime.block_on(async_main())
}

fn init_logging() {
    // RUST_LOG selects the filter, RUST_LOG_FORMAT=json switches to JSON output
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let log_format = std::env::var("RUST_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    match log_format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .with_ansi(true)
                .compact()
                .init();
        }
    }
}

async fn async_main() -> Result<()> {
    init_logging();

    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        debug!("rustls crypto provider already installed");
    }

    let config = Config::load()?;
    info!(
        cluster_id = %config.cluster_id,
        endpoint = %config.fleet_manager_endpoint,
        "Starting fleetshard-sync"
    );

    let client = Client::try_default()
        .await
        .context("failed to create Kubernetes client")?;
    debug!("Kubernetes client initialized");

    let http = reqwest::Client::builder()
        .timeout(FLEET_MANAGER_TIMEOUT)
        .build()
        .context("failed to build Fleet Manager HTTP client")?;
    let auth = token_source(&config, http.clone())?;
    let fleet_manager: Arc<dyn FleetManagerApi> = Arc::new(FleetManagerClient::new(
        http,
        &config.fleet_manager_endpoint,
        &config.cluster_id,
        auth,
    ));

    let needs_aws = config.managed_db_enabled
        || config.secret_encryption_type == SecretEncryptionType::Kms;
    let sdk_config = if needs_aws {
        Some(aws::load_sdk_config(&config.aws_region, config.aws_role_arn.as_deref()).await)
    } else {
        None
    };

    let kms = match (&sdk_config, config.secret_encryption_type) {
        (Some(sdk), SecretEncryptionType::Kms) => Some(aws_sdk_kms::Client::new(sdk)),
        _ => None,
    };
    let secret_cipher = cipher::from_config(&config, kms)?;

    let mut ctx = Context::new(client, fleet_manager.clone(), config.reconciler_options())?
        .with_cipher(secret_cipher);

    if config.managed_db_enabled {
        if let Some(sdk) = &sdk_config {
            let provisioner: Arc<dyn DatabaseProvisioner> = Arc::new(RdsProvisioner::new(
                Arc::new(aws::AwsRdsClient::new(sdk)),
                Arc::new(SqlxInitializer::default()),
                config.managed_db_security_group.as_deref().unwrap_or_default(),
                config.managed_db_subnet_group.as_deref().unwrap_or_default(),
            ));
            ctx = ctx.with_database(provisioner);
            info!("Managed databases enabled");
        }
    }

    let mut runtime = Runtime::new(ctx, fleet_manager, config.runtime_options());
    let shutdown = runtime.cancellation_token();

    let metrics_addr = config.metrics_socket_addr()?;
    let metrics_token = shutdown.clone();
    let metrics_task = tokio::spawn(async move {
        if let Err(e) = metrics::serve(metrics_addr, metrics_token).await {
            error!(error = %e, "Metrics server failed");
        }
    });

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Shutdown signal received, stopping runtime");
        signal_token.cancel();
    });

    let result = runtime.start().await;
    shutdown.cancel();
    if metrics_task.await.is_err() {
        warn!("Metrics server task panicked");
    }

    match result {
        Ok(()) => {
            info!("fleetshard-sync stopped");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "CRITICAL: runtime exited with an unrecoverable error");
            Err(e.into())
        }
    }
}

async fn wait_for_signal() {
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Cannot install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!(error = %e, "Cannot listen for Ctrl-C");
            }
        }
        () = terminate => {}
    }
}

