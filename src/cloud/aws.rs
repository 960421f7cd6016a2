// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! AWS SDK adapters.
//!
//! [`load_sdk_config`] resolves credentials from the default chain and, when
//! `AWS_ROLE_ARN` is set, assumes that role. [`AwsRdsClient`] implements
//! [`RdsApi`] on top of `aws-sdk-rds`.

use super::rds::{
    CreateClusterParams, CreateInstanceParams, DbClusterInfo, DbInstanceInfo, RdsApi,
};
use super::AccountQuota;
use crate::errors::DatabaseError;
use crate::labels::{K8S_MANAGED_BY, MANAGED_BY_FLEETSHARD};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_rds::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_rds::types::{ServerlessV2ScalingConfiguration, Tag};
use tracing::debug;

const SESSION_NAME: &str = "fleetshard-sync";

/// Error codes that mean the credentials themselves are rejected.
const AUTH_ERROR_CODES: &[&str] = &[
    "AccessDenied",
    "AccessDeniedException",
    "InvalidClientTokenId",
    "ExpiredToken",
    "UnrecognizedClientException",
];

const THROTTLING_CODES: &[&str] = &["Throttling", "ThrottlingException", "RequestLimitExceeded"];

/// Load the shared SDK configuration.
pub async fn load_sdk_config(region: &str, role_arn: Option<&str>) -> SdkConfig {
    let region = Region::new(region.to_string());
    let base = aws_config::defaults(BehaviorVersion::latest())
        .region(region.clone())
        .load()
        .await;

    let Some(role_arn) = role_arn.filter(|arn| !arn.is_empty()) else {
        return base;
    };

    debug!(role_arn, "Assuming AWS role");
    let provider = aws_config::sts::AssumeRoleProvider::builder(role_arn)
        .session_name(SESSION_NAME)
        .region(region.clone())
        .configure(&base)
        .build()
        .await;
    aws_config::defaults(BehaviorVersion::latest())
        .region(region)
        .credentials_provider(provider)
        .load()
        .await
}

fn api_error<E, R>(operation: &'static str, err: SdkError<E, R>) -> DatabaseError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let code = err.code().map(str::to_string);
    let message = DisplayErrorContext(&err).to_string();

    if code
        .as_deref()
        .is_some_and(|c| AUTH_ERROR_CODES.contains(&c))
    {
        return DatabaseError::Auth(message);
    }

    let retryable = matches!(
        err,
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_)
    ) || code
        .as_deref()
        .is_some_and(|c| THROTTLING_CODES.contains(&c));

    DatabaseError::Api {
        operation,
        message,
        retryable,
    }
}

/// [`RdsApi`] over `aws-sdk-rds`.
#[derive(Clone)]
pub struct AwsRdsClient {
    client: aws_sdk_rds::Client,
}

impl AwsRdsClient {
    #[must_use]
    pub fn new(config: &SdkConfig) -> Self {
        AwsRdsClient {
            client: aws_sdk_rds::Client::new(config),
        }
    }
}

#[async_trait]
impl RdsApi for AwsRdsClient {
    async fn describe_cluster(
        &self,
        cluster_id: &str,
    ) -> Result<Option<DbClusterInfo>, DatabaseError> {
        let result = self
            .client
            .describe_db_clusters()
            .db_cluster_identifier(cluster_id)
            .send()
            .await;
        match result {
            Ok(output) => Ok(output.db_clusters().first().map(|cluster| DbClusterInfo {
                status: cluster.status().unwrap_or_default().to_string(),
                endpoint: cluster.endpoint().map(str::to_string),
                port: cluster.port().and_then(|p| u16::try_from(p).ok()),
            })),
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_db_cluster_not_found_fault()) =>
            {
                Ok(None)
            }
            Err(err) => Err(api_error("describe db cluster", err)),
        }
    }

    async fn describe_instance(
        &self,
        instance_id: &str,
    ) -> Result<Option<DbInstanceInfo>, DatabaseError> {
        let result = self
            .client
            .describe_db_instances()
            .db_instance_identifier(instance_id)
            .send()
            .await;
        match result {
            Ok(output) => Ok(output.db_instances().first().map(|instance| DbInstanceInfo {
                status: instance.db_instance_status().unwrap_or_default().to_string(),
            })),
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_db_instance_not_found_fault()) =>
            {
                Ok(None)
            }
            Err(err) => Err(api_error("describe db instance", err)),
        }
    }

    async fn create_cluster(&self, params: &CreateClusterParams) -> Result<(), DatabaseError> {
        let scaling = ServerlessV2ScalingConfiguration::builder()
            .min_capacity(params.min_capacity)
            .max_capacity(params.max_capacity)
            .build();
        self.client
            .create_db_cluster()
            .db_cluster_identifier(&params.cluster_id)
            .engine(&params.engine)
            .engine_version(&params.engine_version)
            .master_username(&params.master_user)
            .master_user_password(&params.master_password)
            .vpc_security_group_ids(&params.security_group)
            .db_subnet_group_name(&params.subnet_group)
            .storage_encrypted(params.storage_encrypted)
            .backup_retention_period(params.backup_retention_days)
            .serverless_v2_scaling_configuration(scaling)
            .tags(
                Tag::builder()
                    .key("rhacs-database-id")
                    .value(&params.database_id)
                    .build(),
            )
            .tags(
                Tag::builder()
                    .key(K8S_MANAGED_BY)
                    .value(MANAGED_BY_FLEETSHARD)
                    .build(),
            )
            .send()
            .await
            .map_err(|e| api_error("create db cluster", e))?;
        Ok(())
    }

    async fn create_instance(&self, params: &CreateInstanceParams) -> Result<(), DatabaseError> {
        self.client
            .create_db_instance()
            .db_instance_identifier(&params.instance_id)
            .db_cluster_identifier(&params.cluster_id)
            .db_instance_class(&params.instance_class)
            .engine(&params.engine)
            .publicly_accessible(false)
            .send()
            .await
            .map_err(|e| api_error("create db instance", e))?;
        Ok(())
    }

    async fn delete_instance(&self, instance_id: &str) -> Result<(), DatabaseError> {
        self.client
            .delete_db_instance()
            .db_instance_identifier(instance_id)
            .send()
            .await
            .map_err(|e| api_error("delete db instance", e))?;
        Ok(())
    }

    async fn delete_cluster(
        &self,
        cluster_id: &str,
        skip_final_snapshot: bool,
        final_snapshot_id: &str,
    ) -> Result<(), DatabaseError> {
        let mut request = self
            .client
            .delete_db_cluster()
            .db_cluster_identifier(cluster_id)
            .skip_final_snapshot(skip_final_snapshot);
        if !skip_final_snapshot {
            request = request.final_db_snapshot_identifier(final_snapshot_id);
        }
        request
            .send()
            .await
            .map_err(|e| api_error("delete db cluster", e))?;
        Ok(())
    }

    async fn account_quotas(&self) -> Result<Vec<AccountQuota>, DatabaseError> {
        let output = self
            .client
            .describe_account_attributes()
            .send()
            .await
            .map_err(|e| api_error("describe account attributes", e))?;
        #[allow(clippy::cast_precision_loss)]
        let quotas = output
            .account_quotas()
            .iter()
            .map(|quota| AccountQuota {
                name: quota.account_quota_name().unwrap_or_default().to_string(),
                used: quota.used().unwrap_or_default() as f64,
                max: quota.max().unwrap_or_default() as f64,
            })
            .collect();
        Ok(quotas)
    }
}
