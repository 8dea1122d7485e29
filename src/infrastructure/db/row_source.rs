use super::RowSource;
use crate::application::use_cases::sql_guard::SafeQuery;
use crate::domain::error::{AppError, Result};
use crate::domain::listing::{ResultSet, Row};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row as _, ValueRef};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Executes guarded statements on connections that cannot write.
pub struct SqliteRowSource {
    pool: SqlitePool,
    query_timeout: Duration,
}

impl SqliteRowSource {
    pub async fn connect(db_path: &Path, max_connections: u32, query_timeout_secs: u64) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .pragma("query_only", "ON");

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to open read-only listings DB: {e}"))
            })?;

        Ok(Self {
            pool,
            query_timeout: Duration::from_secs(query_timeout_secs),
        })
    }

    async fn fetch(&self, sql: &str) -> Result<ResultSet> {
        let rows = tokio::time::timeout(self.query_timeout, sqlx::query(sql).fetch_all(&self.pool))
            .await
            .map_err(|_| {
                AppError::ExecutionError(format!(
                    "Query timed out after {} seconds",
                    self.query_timeout.as_secs()
                ))
            })?
            .map_err(|e| AppError::ExecutionError(e.to_string()))?;

        Ok(rows.iter().map(row_to_json).collect())
    }
}

#[async_trait]
impl RowSource for SqliteRowSource {
    async fn query_rows(&self, query: &SafeQuery) -> Result<ResultSet> {
        let rows = self.fetch(query.as_str()).await?;
        debug!(rows = rows.len(), "query executed");
        Ok(rows)
    }
}

/// Repeated column names, as in a self-join `SELECT *`, get a `_2`, `_3`...
/// suffix so no value is dropped.
fn row_to_json(row: &SqliteRow) -> Row {
    let mut map = Row::new();
    for (index, column) in row.columns().iter().enumerate() {
        let key = unique_key(&map, column.name());
        map.insert(key, column_value(row, index));
    }
    map
}

fn unique_key(map: &Row, name: &str) -> String {
    if !map.contains_key(name) {
        return name.to_string();
    }
    (2..)
        .map(|n| format!("{name}_{n}"))
        .find(|candidate| !map.contains_key(candidate))
        .unwrap_or_else(|| name.to_string())
}

/// SQLite values carry their own storage class, so try each in turn.
fn column_value(row: &SqliteRow, index: usize) -> Value {
    match row.try_get_raw(index) {
        Ok(raw) if raw.is_null() => return Value::Null,
        Err(_) => return Value::Null,
        _ => {}
    }

    if let Ok(v) = row.try_get::<i64, _>(index) {
        return Value::Number(v.into());
    }
    if let Ok(v) = row.try_get::<f64, _>(index) {
        return serde_json::Number::from_f64(v)
            .map(Value::Number)
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<String, _>(index) {
        return Value::String(v);
    }
    if let Ok(v) = row.try_get::<Vec<u8>, _>(index) {
        return Value::String(hex::encode(v));
    }

    Value::Null
}
