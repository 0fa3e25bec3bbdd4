//! PostgreSQL Backend Implementation
//!
//! Implements the connection seam over sqlx. Every `sqlx::Error` is mapped
//! onto a [`RawDatabaseError`] so that it can be routed through the active
//! error translator.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::{postgres::PgArguments, Column, PgPool, Postgres, Row, TypeInfo, ValueRef};

use crate::translation::RawDatabaseError;

use super::core::*;

type PgQuery<'q> = sqlx::query::Query<'q, Postgres, PgArguments>;

/// PostgreSQL connection implementation
pub struct PostgresConnection {
    conn: sqlx::pool::PoolConnection<Postgres>,
}

impl PostgresConnection {
    pub fn new(conn: sqlx::pool::PoolConnection<Postgres>) -> Self {
        Self { conn }
    }

    /// Acquire a connection from the pool
    pub async fn acquire(pool: &PgPool) -> Result<Self, RawDatabaseError> {
        let conn = pool.acquire().await.map_err(raw_error_from_sqlx)?;
        Ok(Self::new(conn))
    }
}

#[async_trait]
impl DatabaseConnection for PostgresConnection {
    async fn fetch_all(
        &mut self,
        sql: &str,
        params: &[DatabaseValue],
    ) -> Result<Vec<Box<dyn DatabaseRow>>, RawDatabaseError> {
        let mut query = sqlx::query(sql);

        for param in params {
            query = bind_database_value(query, param);
        }

        let rows = query
            .fetch_all(&mut *self.conn)
            .await
            .map_err(raw_error_from_sqlx)?;

        Ok(rows
            .into_iter()
            .map(|row| Box::new(PostgresRow::new(row)) as Box<dyn DatabaseRow>)
            .collect())
    }
}

/// PostgreSQL row implementation
pub struct PostgresRow {
    row: sqlx::postgres::PgRow,
}

impl PostgresRow {
    pub fn new(row: sqlx::postgres::PgRow) -> Self {
        Self { row }
    }
}

impl DatabaseRow for PostgresRow {
    fn get_by_index(&self, index: usize) -> Result<DatabaseValue, RawDatabaseError> {
        postgres_value_to_database_value(&self.row, index)
    }

    fn column_count(&self) -> usize {
        self.row.len()
    }
}

/// Map a sqlx failure onto the driver-neutral raw error.
///
/// Server errors keep their SQLSTATE and reported constraint; transport,
/// pool and protocol failures are given connection-class SQLSTATEs.
pub fn raw_error_from_sqlx(error: sqlx::Error) -> RawDatabaseError {
    let message = error.to_string();
    match error {
        sqlx::Error::Database(db) => {
            let mut raw = RawDatabaseError::new(db.message());
            if let Some(code) = db.code() {
                raw = raw.with_sql_state(code.as_ref());
            }
            if let Some(constraint) = db.constraint() {
                raw = raw.with_reported_constraint(constraint);
            }
            raw
        }
        sqlx::Error::Io(_) | sqlx::Error::Tls(_) => RawDatabaseError::new(message).with_sql_state("08006"),
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::WorkerCrashed => {
            RawDatabaseError::new(message).with_sql_state("08001")
        }
        sqlx::Error::Protocol(_) => RawDatabaseError::new(message).with_sql_state("08P01"),
        _ => RawDatabaseError::new(message),
    }
}

/// Bind a DatabaseValue to a sqlx query
fn bind_database_value<'q>(query: PgQuery<'q>, value: &DatabaseValue) -> PgQuery<'q> {
    match value {
        DatabaseValue::Null => query.bind(Option::<String>::None),
        DatabaseValue::Bool(b) => query.bind(*b),
        DatabaseValue::Int32(i) => query.bind(*i),
        DatabaseValue::Int64(i) => query.bind(*i),
        DatabaseValue::Float32(f) => query.bind(*f),
        DatabaseValue::Float64(f) => query.bind(*f),
        DatabaseValue::String(s) => query.bind(s.clone()),
        DatabaseValue::Bytes(b) => query.bind(b.clone()),
        DatabaseValue::Uuid(u) => query.bind(*u),
        DatabaseValue::DateTime(dt) => query.bind(*dt),
        DatabaseValue::Timestamp(ts) => query.bind(*ts),
        DatabaseValue::Date(d) => query.bind(*d),
        DatabaseValue::Time(t) => query.bind(*t),
        DatabaseValue::Json(j) => query.bind(j.clone()),
    }
}

/// How a column is decoded, chosen from its PostgreSQL type name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnDecoder {
    Bool,
    Int2,
    Int4,
    Int8,
    Float4,
    Float8,
    Bytes,
    Uuid,
    TimestampTz,
    Timestamp,
    Date,
    Time,
    Json,
    Text,
}

impl ColumnDecoder {
    fn for_type(type_name: &str) -> Self {
        match type_name {
            "BOOL" => Self::Bool,
            "INT2" => Self::Int2,
            "INT4" => Self::Int4,
            "INT8" => Self::Int8,
            "FLOAT4" => Self::Float4,
            "FLOAT8" => Self::Float8,
            "BYTEA" => Self::Bytes,
            "UUID" => Self::Uuid,
            "TIMESTAMPTZ" => Self::TimestampTz,
            // sqlx only decodes DateTime<Utc> from TIMESTAMPTZ
            "TIMESTAMP" => Self::Timestamp,
            "DATE" => Self::Date,
            "TIME" => Self::Time,
            "JSON" | "JSONB" => Self::Json,
            // TEXT, VARCHAR and anything without a dedicated variant
            _ => Self::Text,
        }
    }
}

/// Convert a PostgreSQL column value to DatabaseValue
fn postgres_value_to_database_value(
    row: &sqlx::postgres::PgRow,
    index: usize,
) -> Result<DatabaseValue, RawDatabaseError> {
    let column = row.columns().get(index).ok_or_else(|| {
        RawDatabaseError::new(format!(
            "column index {} out of bounds, row has {} columns",
            index,
            row.len()
        ))
    })?;

    let raw_value = row.try_get_raw(index).map_err(raw_error_from_sqlx)?;
    if raw_value.is_null() {
        return Ok(DatabaseValue::Null);
    }

    let value = match ColumnDecoder::for_type(column.type_info().name()) {
        ColumnDecoder::Bool => DatabaseValue::Bool(row.try_get(index).map_err(raw_error_from_sqlx)?),
        ColumnDecoder::Int2 => DatabaseValue::Int32(i32::from(
            row.try_get::<i16, _>(index).map_err(raw_error_from_sqlx)?,
        )),
        ColumnDecoder::Int4 => DatabaseValue::Int32(row.try_get(index).map_err(raw_error_from_sqlx)?),
        ColumnDecoder::Int8 => DatabaseValue::Int64(row.try_get(index).map_err(raw_error_from_sqlx)?),
        ColumnDecoder::Float4 => DatabaseValue::Float32(row.try_get(index).map_err(raw_error_from_sqlx)?),
        ColumnDecoder::Float8 => DatabaseValue::Float64(row.try_get(index).map_err(raw_error_from_sqlx)?),
        ColumnDecoder::Bytes => DatabaseValue::Bytes(row.try_get(index).map_err(raw_error_from_sqlx)?),
        ColumnDecoder::Uuid => DatabaseValue::Uuid(row.try_get(index).map_err(raw_error_from_sqlx)?),
        ColumnDecoder::TimestampTz => {
            DatabaseValue::DateTime(row.try_get(index).map_err(raw_error_from_sqlx)?)
        }
        ColumnDecoder::Timestamp => DatabaseValue::Timestamp(
            row.try_get::<chrono::NaiveDateTime, _>(index).map_err(raw_error_from_sqlx)?,
        ),
        ColumnDecoder::Date => DatabaseValue::Date(row.try_get(index).map_err(raw_error_from_sqlx)?),
        ColumnDecoder::Time => DatabaseValue::Time(row.try_get(index).map_err(raw_error_from_sqlx)?),
        ColumnDecoder::Json => {
            DatabaseValue::Json(row.try_get::<JsonValue, _>(index).map_err(raw_error_from_sqlx)?)
        }
        ColumnDecoder::Text => DatabaseValue::String(row.try_get(index).map_err(raw_error_from_sqlx)?),
    };

    Ok(value)
}
