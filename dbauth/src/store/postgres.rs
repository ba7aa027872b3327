//! SQLx/PostgreSQL implementation of [`UserStore`].
//!
//! Rows are decoded dynamically from the Postgres type of each column, since
//! the query text (and therefore the column set) comes from configuration.
//! Types without a mapping below come back as [`ColumnValue::Unsupported`]:
//! a null claim, and a mapping error if the field schema reads that column.
//! Cast such columns to text in `querySQL` to return them as claims.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::Value;
use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{Column, Postgres, Row as _, TypeInfo, ValueRef};
use tracing::{instrument, warn};
use uuid::Uuid;

use super::{ColumnValue, Param, PlaceholderStyle, Row, StoreError, UserStore};
use crate::config::PoolSettings;

#[derive(Clone, Debug)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool with the configured settings.
    pub async fn connect(url: &str, settings: &PoolSettings) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .min_connections(settings.min_connections)
            .acquire_timeout(settings.acquire_timeout)
            .connect(url)
            .await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn bind_params<'q>(mut query: Query<'q, Postgres, PgArguments>, params: &'q [Param]) -> Query<'q, Postgres, PgArguments> {
    for param in params {
        query = match param {
            Param::Text(s) => query.bind(s.as_str()),
            Param::Timestamp(t) => query.bind(*t),
        };
    }
    query
}

fn decode_row(row: &PgRow) -> Result<Row, StoreError> {
    let mut decoded = Row::new();

    for column in row.columns() {
        let idx = column.ordinal();
        let raw = row.try_get_raw(idx)?;
        if raw.is_null() {
            decoded.set(column.name(), ColumnValue::Null);
            continue;
        }
        // extension types such as citext report their name in lower case
        let type_name = raw.type_info().name().to_ascii_uppercase();

        let value = match type_name.as_str() {
            "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => ColumnValue::Text(row.try_get::<String, _>(idx)?),
            "CITEXT" => ColumnValue::Text(row.try_get_unchecked::<String, _>(idx)?),
            "BYTEA" => ColumnValue::Bytes(row.try_get::<Vec<u8>, _>(idx)?),
            "INT2" => ColumnValue::Integer(row.try_get::<i16, _>(idx)?.into()),
            "INT4" => ColumnValue::Integer(row.try_get::<i32, _>(idx)?.into()),
            "INT8" => ColumnValue::Integer(row.try_get::<i64, _>(idx)?),
            "FLOAT4" => ColumnValue::Float(row.try_get::<f32, _>(idx)?.into()),
            "FLOAT8" => ColumnValue::Float(row.try_get::<f64, _>(idx)?),
            "BOOL" => ColumnValue::Bool(row.try_get::<bool, _>(idx)?),
            "TIMESTAMPTZ" => ColumnValue::Timestamp(row.try_get::<DateTime<Utc>, _>(idx)?),
            "TIMESTAMP" => ColumnValue::Timestamp(row.try_get::<NaiveDateTime, _>(idx)?.and_utc()),
            "DATE" => ColumnValue::Text(row.try_get::<NaiveDate, _>(idx)?.to_string()),
            "TIME" => ColumnValue::Text(row.try_get::<NaiveTime, _>(idx)?.to_string()),
            "JSON" | "JSONB" => ColumnValue::Json(row.try_get::<Value, _>(idx)?),
            "UUID" => ColumnValue::Text(row.try_get::<Uuid, _>(idx)?.to_string()),
            "TEXT[]" | "VARCHAR[]" | "BPCHAR[]" | "NAME[]" => {
                ColumnValue::Json(Value::from(row.try_get::<Vec<String>, _>(idx)?))
            }
            "INT4[]" => ColumnValue::Json(Value::from(row.try_get::<Vec<i32>, _>(idx)?)),
            "INT8[]" => ColumnValue::Json(Value::from(row.try_get::<Vec<i64>, _>(idx)?)),
            _ => {
                warn!(column = column.name(), type_name = %type_name, "column type not decoded, returned as null");
                ColumnValue::Unsupported { type_name }
            }
        };
        decoded.set(column.name(), value);
    }

    Ok(decoded)
}

#[async_trait::async_trait]
impl UserStore for PgUserStore {
    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::Numbered
    }

    #[instrument(skip(self, params), fields(params = params.len()), err)]
    async fn query(&self, sql: &str, params: &[Param]) -> Result<Vec<Row>, StoreError> {
        let rows = bind_params(sqlx::query(sql), params).fetch_all(&self.pool).await?;
        rows.iter().map(decode_row).collect()
    }

    #[instrument(skip(self, params), fields(params = params.len()), err)]
    async fn execute(&self, sql: &str, params: &[Param]) -> Result<u64, StoreError> {
        let result = bind_params(sqlx::query(sql), params).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}
