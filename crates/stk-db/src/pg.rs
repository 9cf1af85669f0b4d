use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::TryStreamExt;
use rust_decimal::Decimal;
use sqlx::postgres::{PgArguments, PgConnection, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{Column, Either, PgPool, Postgres, Row as _, Transaction, TypeInfo};
use tracing::{debug, warn};

use crate::error::{StoreError, StoreOp};
use crate::gateway::{Gateway, Session, UnitOfWork};
use crate::statement::{QueryOutput, Row, SqlValue, Statement};

pub const ENV_DB_URL: &str = "STK_DATABASE_URL";

/// Pool sizing handed to [`PgGateway::connect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSettings {
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 10,
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

/// PostgreSQL gateway over an owned `PgPool`.
///
/// The pool is opened by [`PgGateway::connect`] and closed by
/// [`PgGateway::close`]; repositories receive the gateway at construction.
#[derive(Debug, Clone)]
pub struct PgGateway {
    pool: PgPool,
}

impl PgGateway {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(url: &str, settings: PoolSettings) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(settings.acquire_timeout)
            .connect(url)
            .await
            .context("failed to connect to Postgres")?;
        Ok(Self { pool })
    }

    /// Connect using STK_DATABASE_URL with default pool settings.
    pub async fn connect_from_env() -> Result<Self> {
        let url = std::env::var(ENV_DB_URL)
            .with_context(|| format!("missing env var {ENV_DB_URL}"))?;
        Self::connect(&url, PoolSettings::default()).await
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Wait for checked-out connections to come back, then close the pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

pub struct PgSession {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl Session for PgSession {
    async fn query(&mut self, statement: Statement) -> Result<QueryOutput, StoreError> {
        run(&mut *self.tx, &statement).await
    }
}

#[async_trait]
impl Gateway for PgGateway {
    type Session = PgSession;

    async fn query(&self, statement: Statement) -> Result<QueryOutput, StoreError> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| StoreError::transaction(StoreOp::Connect, e))?;
        run(&mut *conn, &statement).await
    }

    async fn transaction<T, F>(&self, work: F) -> Result<T, StoreError>
    where
        T: Send,
        F: for<'s> FnOnce(&'s mut Self::Session) -> UnitOfWork<'s, T> + Send,
    {
        let tx = self.pool.begin().await.map_err(|e| {
            let op = match e {
                sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => StoreOp::Connect,
                _ => StoreOp::Begin,
            };
            StoreError::transaction(op, e)
        })?;
        let mut session = PgSession { tx };

        match work(&mut session).await {
            Ok(value) => {
                session
                    .tx
                    .commit()
                    .await
                    .map_err(|e| StoreError::transaction(StoreOp::Commit, e))?;
                Ok(value)
            }
            Err(err) => {
                // A failed rollback drops the connection, which aborts the tx server-side.
                if let Err(rollback_err) = session.tx.rollback().await {
                    warn!(error = %rollback_err, "rollback failed; connection discarded");
                }
                warn!(error = %err, "transaction rolled back");
                Err(err)
            }
        }
    }
}

async fn run(conn: &mut PgConnection, statement: &Statement) -> Result<QueryOutput, StoreError> {
    debug!(
        sql = statement.sql(),
        params = statement.params().len(),
        "executing statement"
    );

    let mut query = sqlx::query(statement.sql());
    for value in statement.params() {
        query = bind_value(query, value);
    }

    let mut output = QueryOutput::default();
    let mut results = query.fetch_many(conn);
    while let Some(step) = results
        .try_next()
        .await
        .map_err(|e| StoreError::transaction(StoreOp::Statement, e))?
    {
        match step {
            Either::Left(done) => output.rows_affected += done.rows_affected(),
            Either::Right(row) => output.rows.push(decode_row(&row)?),
        }
    }
    Ok(output)
}

fn bind_value<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: &SqlValue,
) -> Query<'q, Postgres, PgArguments> {
    match value {
        SqlValue::Null => query.bind(None::<String>),
        SqlValue::Bool(v) => query.bind(*v),
        SqlValue::Int(v) => query.bind(*v),
        SqlValue::Text(v) => query.bind(v.clone()),
        SqlValue::Decimal(v) => query.bind(*v),
        SqlValue::Timestamp(v) => query.bind(*v),
    }
}

fn decode_row(row: &PgRow) -> Result<Row, StoreError> {
    let mut out = Row::new();
    for column in row.columns() {
        let idx = column.ordinal();
        let value = match column.type_info().name() {
            "INT8" => row.try_get::<Option<i64>, _>(idx).map(|v| v.map(SqlValue::Int)),
            "INT4" => row
                .try_get::<Option<i32>, _>(idx)
                .map(|v| v.map(|n| SqlValue::Int(n.into()))),
            "INT2" => row
                .try_get::<Option<i16>, _>(idx)
                .map(|v| v.map(|n| SqlValue::Int(n.into()))),
            "BOOL" => row.try_get::<Option<bool>, _>(idx).map(|v| v.map(SqlValue::Bool)),
            "NUMERIC" => row
                .try_get::<Option<Decimal>, _>(idx)
                .map(|v| v.map(SqlValue::Decimal)),
            "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => row
                .try_get::<Option<String>, _>(idx)
                .map(|v| v.map(SqlValue::Text)),
            "TIMESTAMPTZ" => row
                .try_get::<Option<DateTime<Utc>>, _>(idx)
                .map(|v| v.map(SqlValue::Timestamp)),
            other => {
                return Err(StoreError::transaction(
                    StoreOp::Decode,
                    format!("column `{}` has unsupported type {other}", column.name()),
                ))
            }
        }
        .map_err(|e| StoreError::transaction(StoreOp::Decode, e))?;

        out.push(column.name(), value.unwrap_or(SqlValue::Null));
    }
    Ok(out)
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_products_table: bool,
    pub has_orders_table: bool,
}

/// Simple status query (connectivity + schema presence).
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;

    Ok(DbStatus {
        ok: one == 1,
        has_products_table: table_exists(pool, "products").await?,
        has_orders_table: table_exists(pool, "orders").await?,
    })
}

async fn table_exists(pool: &PgPool, table: &str) -> Result<bool> {
    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1
            from information_schema.tables
            where table_schema = 'public' and table_name = $1
        )
        "#,
    )
    .bind(table)
    .fetch_one(pool)
    .await
    .with_context(|| format!("status table-exists query failed for {table}"))?;
    Ok(exists)
}
