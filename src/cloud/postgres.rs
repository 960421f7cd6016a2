// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! First-run user initialisation of a tenant database over `sqlx`.

use super::rds::DatabaseInitializer;
use crate::constants::{
    DB_BOOTSTRAP_DATABASE, DB_CA_PATH_FLEETSHARD, DB_CENTRAL_DATABASE, DB_CENTRAL_USER,
    DB_MASTER_USER,
};
use crate::errors::DatabaseError;
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgConnection, PgSslMode};
use sqlx::Connection;
use tracing::{debug, info};

/// `duplicate_object`
const SQLSTATE_DUPLICATE_OBJECT: &str = "42710";
/// `duplicate_database`
const SQLSTATE_DUPLICATE_DATABASE: &str = "42P04";

/// Quote a string as an SQL literal. DDL statements do not accept bind
/// parameters.
fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn sqlstate(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db) => db.code().map(|c| c.to_string()),
        _ => None,
    }
}

fn init_error(step: &str, err: &sqlx::Error) -> DatabaseError {
    DatabaseError::Init(format!("{step}: {err}"))
}

/// [`DatabaseInitializer`] connecting with `sslmode=verify-full`.
#[derive(Debug, Clone)]
pub struct SqlxInitializer {
    ca_path: String,
}

impl Default for SqlxInitializer {
    fn default() -> Self {
        SqlxInitializer {
            ca_path: DB_CA_PATH_FLEETSHARD.to_string(),
        }
    }
}

impl SqlxInitializer {
    #[must_use]
    pub fn new(ca_path: &str) -> Self {
        SqlxInitializer {
            ca_path: ca_path.to_string(),
        }
    }

    fn options(&self, host: &str, port: u16, database: &str, password: &str) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(host)
            .port(port)
            .username(DB_MASTER_USER)
            .password(password)
            .database(database)
            .ssl_mode(PgSslMode::VerifyFull)
            .ssl_root_cert(&self.ca_path)
    }

    async fn connect(
        &self,
        host: &str,
        port: u16,
        database: &str,
        password: &str,
    ) -> Result<PgConnection, DatabaseError> {
        PgConnection::connect_with(&self.options(host, port, database, password))
            .await
            .map_err(|e| init_error("connect", &e))
    }

    async fn execute(
        conn: &mut PgConnection,
        step: &str,
        statement: &str,
    ) -> Result<(), sqlx::Error> {
        debug!(step, "Executing initialisation statement");
        sqlx::query(statement).execute(&mut *conn).await?;
        Ok(())
    }
}

#[async_trait]
impl DatabaseInitializer for SqlxInitializer {
    async fn initialize(
        &self,
        host: &str,
        port: u16,
        master_password: &str,
        tenant_password: &str,
    ) -> Result<(), DatabaseError> {
        let mut conn = self
            .connect(host, port, DB_BOOTSTRAP_DATABASE, master_password)
            .await?;

        let password = quote_literal(tenant_password);
        let create_role =
            format!("CREATE ROLE {DB_CENTRAL_USER} WITH LOGIN PASSWORD {password}");
        match Self::execute(&mut conn, "create role", &create_role).await {
            Ok(()) => {}
            Err(e) if sqlstate(&e).as_deref() == Some(SQLSTATE_DUPLICATE_OBJECT) => {
                let alter = format!("ALTER ROLE {DB_CENTRAL_USER} WITH PASSWORD {password}");
                Self::execute(&mut conn, "reset role password", &alter)
                    .await
                    .map_err(|e| init_error("reset role password", &e))?;
            }
            Err(e) => return Err(init_error("create role", &e)),
        }

        for statement in [
            format!("GRANT pg_signal_backend TO {DB_CENTRAL_USER}"),
            format!("GRANT pg_read_all_stats TO {DB_CENTRAL_USER}"),
            format!("GRANT {DB_CENTRAL_USER} TO {DB_MASTER_USER}"),
        ] {
            Self::execute(&mut conn, "grant", &statement)
                .await
                .map_err(|e| init_error("grant", &e))?;
        }

        let create_db = format!("CREATE DATABASE {DB_CENTRAL_DATABASE} OWNER {DB_CENTRAL_USER}");
        match Self::execute(&mut conn, "create database", &create_db).await {
            Ok(()) => {}
            Err(e) if sqlstate(&e).as_deref() == Some(SQLSTATE_DUPLICATE_DATABASE) => {}
            Err(e) => return Err(init_error("create database", &e)),
        }
        let _ = conn.close().await;

        let mut conn = self
            .connect(host, port, DB_CENTRAL_DATABASE, master_password)
            .await?;
        Self::execute(
            &mut conn,
            "create extension",
            "CREATE EXTENSION IF NOT EXISTS pg_stat_statements",
        )
        .await
        .map_err(|e| init_error("create extension", &e))?;
        let _ = conn.close().await;

        info!(host, "Initialised tenant database user");
        Ok(())
    }
}
