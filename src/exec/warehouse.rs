//! Live warehouse client.
//!
//! Redshift speaks the Postgres wire protocol, so the connection goes
//! through sqlx's Postgres driver. The session is opened read-only at the
//! driver level; validated SQL is the only thing that ever reaches
//! `execute`.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Column as SqlxColumn, Row as SqlxRow, TypeInfo};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::WarehouseConfig;
use crate::error::{AnalystError, Result};
use crate::exec::{ColumnInfo, ExecutionResult, QueryExecutor, ResultSource, Row, Value};

/// Hard cap on rows pulled into memory, matching the administrative LIMIT
/// ceiling. The LIMIT clause bounds well-formed statements; this bounds the
/// rest.
const MAX_ROWS: usize = 1000;

/// Live warehouse client.
#[derive(Debug, Clone)]
pub struct WarehouseClient {
    pool: PgPool,
    query_timeout: Duration,
}

impl WarehouseClient {
    /// Connects to the warehouse. A failure here is a `ServiceUnavailable`
    /// (drives mode resolution), except for plainly bad configuration.
    pub async fn connect(config: &WarehouseConfig) -> Result<Self> {
        let conn_str = config.to_connection_string()?;

        debug!("Connecting to warehouse {}", config.display_string());

        let pool = PgPoolOptions::new()
            .max_connections(2)
            .acquire_timeout(Duration::from_secs(10))
            .connect(&conn_str)
            .await
            .map_err(|e| map_connection_error(e, config))?;

        Ok(Self {
            pool,
            query_timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    /// Creates a client from an existing pool (for tests).
    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            query_timeout: Duration::from_secs(30),
        }
    }

    /// Closes the connection pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl QueryExecutor for WarehouseClient {
    async fn execute(&self, validated_sql: &str) -> Result<ExecutionResult> {
        let fetched = tokio::time::timeout(
            self.query_timeout,
            sqlx::query(validated_sql).fetch_all(&self.pool),
        )
        .await
        .map_err(|_| {
            AnalystError::unavailable(format!(
                "warehouse query timed out after {}s",
                self.query_timeout.as_secs()
            ))
        })?
        .map_err(map_query_error)?;

        let columns: Vec<ColumnInfo> = fetched
            .first()
            .map(|row| {
                row.columns()
                    .iter()
                    .map(|col| ColumnInfo::new(col.name(), col.type_info().name().to_lowercase()))
                    .collect()
            })
            .unwrap_or_default();

        let total = fetched.len();
        let truncated = total > MAX_ROWS;
        if truncated {
            warn!("Query returned {total} rows, truncating to {MAX_ROWS}");
        }

        let rows: Vec<Row> = fetched.iter().take(MAX_ROWS).map(convert_row).collect();

        let mut result = ExecutionResult::new(columns, rows, ResultSource::Live);
        if truncated {
            result = result.truncated();
        }
        Ok(result)
    }
}

/// Converts a sqlx row to the pipeline's row type.
fn convert_row(row: &PgRow) -> Row {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, col)| convert_value(row, i, col.type_info().name()))
        .collect()
}

/// Converts a single column value, falling back to text for types without a
/// dedicated decoding.
fn convert_value(row: &PgRow, index: usize, type_name: &str) -> Value {
    match type_name.to_uppercase().as_str() {
        "BOOL" | "BOOLEAN" => row
            .try_get::<Option<bool>, _>(index)
            .ok()
            .flatten()
            .map(Value::Bool)
            .unwrap_or(Value::Null),

        "INT2" | "SMALLINT" => row
            .try_get::<Option<i16>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Int(v as i64))
            .unwrap_or(Value::Null),

        "INT4" | "INT" | "INTEGER" => row
            .try_get::<Option<i32>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Int(v as i64))
            .unwrap_or(Value::Null),

        "INT8" | "BIGINT" => row
            .try_get::<Option<i64>, _>(index)
            .ok()
            .flatten()
            .map(Value::Int)
            .unwrap_or(Value::Null),

        "FLOAT4" | "REAL" => row
            .try_get::<Option<f32>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Float(v as f64))
            .unwrap_or(Value::Null),

        "FLOAT8" | "DOUBLE PRECISION" => row
            .try_get::<Option<f64>, _>(index)
            .ok()
            .flatten()
            .map(Value::Float)
            .unwrap_or(Value::Null),

        _ => row
            .try_get::<Option<String>, _>(index)
            .ok()
            .flatten()
            .map(Value::String)
            .unwrap_or(Value::Null),
    }
}

/// Maps sqlx connection errors to the pipeline taxonomy.
fn map_connection_error(error: sqlx::Error, config: &WarehouseConfig) -> AnalystError {
    let host = config.host.as_deref().unwrap_or("unset");
    let error_str = error.to_string().to_lowercase();

    if error_str.contains("password authentication failed")
        || error_str.contains("authentication failed")
    {
        AnalystError::config("Warehouse authentication failed. Check your credentials.")
    } else if error_str.contains("does not exist") && error_str.contains("database") {
        AnalystError::config(format!(
            "Database '{}' does not exist.",
            config.database.as_deref().unwrap_or("unset")
        ))
    } else {
        AnalystError::unavailable(format!("Cannot reach warehouse at {host}: {error}"))
    }
}

/// Maps a query-time failure. The full detail stays in the logs; callers
/// show a generic message.
fn map_query_error(error: sqlx::Error) -> AnalystError {
    if let Some(db_error) = error.as_database_error() {
        warn!("Warehouse rejected statement: {}", db_error.message());
        AnalystError::execution(db_error.message().to_string())
    } else {
        let error_str = error.to_string();
        if error_str.to_lowercase().contains("timed out") {
            AnalystError::unavailable(error_str)
        } else {
            AnalystError::execution(error_str)
        }
    }
}
