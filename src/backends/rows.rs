//! Conversions between backend-native rows/parameters and JSON values.

use base64::Engine;
use serde_json::{Map, Number, Value};
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Column, Postgres, Row, Sqlite, TypeInfo, ValueRef};
use tracing::debug;

fn float(value: f64) -> Value {
    Number::from_f64(value).map(Value::Number).unwrap_or(Value::Null)
}

fn blob(bytes: &[u8]) -> Value {
    Value::String(base64::engine::general_purpose::STANDARD.encode(bytes))
}

/// Column names of a row
pub(crate) fn column_names<R: Row>(row: &R) -> Vec<String> {
    row.columns().iter().map(|c| c.name().to_string()).collect()
}

/// Decode a SQLite row. SQLite is dynamically typed, so decoding follows the
/// storage class of each value rather than the declared column type.
pub(crate) fn sqlite_row_to_json(row: &SqliteRow) -> Map<String, Value> {
    let mut object = Map::with_capacity(row.len());
    for (index, column) in row.columns().iter().enumerate() {
        let is_null = row.try_get_raw(index).map(|raw| raw.is_null()).unwrap_or(true);
        let value = if is_null {
            Value::Null
        } else if let Ok(v) = row.try_get::<i64, _>(index) {
            Value::from(v)
        } else if let Ok(v) = row.try_get::<f64, _>(index) {
            float(v)
        } else if let Ok(v) = row.try_get::<String, _>(index) {
            Value::String(v)
        } else if let Ok(v) = row.try_get::<Vec<u8>, _>(index) {
            blob(&v)
        } else {
            debug!(column = %column.name(), "Undecodable SQLite value");
            Value::Null
        };
        object.insert(column.name().to_string(), value);
    }
    object
}

/// Decode a PostgreSQL row by declared column type
pub(crate) fn pg_row_to_json(row: &PgRow) -> Map<String, Value> {
    let mut object = Map::with_capacity(row.len());
    for (index, column) in row.columns().iter().enumerate() {
        let is_null = row.try_get_raw(index).map(|raw| raw.is_null()).unwrap_or(true);
        let value = if is_null {
            Value::Null
        } else {
            decode_pg_value(row, index, column.type_info().name())
        };
        object.insert(column.name().to_string(), value);
    }
    object
}

fn decode_pg_value(row: &PgRow, index: usize, type_name: &str) -> Value {
    let decoded = match type_name {
        "BOOL" => row.try_get::<bool, _>(index).map(Value::Bool),
        "INT2" => row.try_get::<i16, _>(index).map(Value::from),
        "INT4" => row.try_get::<i32, _>(index).map(Value::from),
        "INT8" => row.try_get::<i64, _>(index).map(Value::from),
        "FLOAT4" => row.try_get::<f32, _>(index).map(|v| float(f64::from(v))),
        "FLOAT8" => row.try_get::<f64, _>(index).map(float),
        "JSON" | "JSONB" => row.try_get::<Value, _>(index),
        "UUID" => row.try_get::<uuid::Uuid, _>(index).map(|v| Value::String(v.to_string())),
        "TIMESTAMPTZ" => row
            .try_get::<chrono::DateTime<chrono::Utc>, _>(index)
            .map(|v| Value::String(v.to_rfc3339())),
        "TIMESTAMP" => row
            .try_get::<chrono::NaiveDateTime, _>(index)
            .map(|v| Value::String(v.to_string())),
        "DATE" => row.try_get::<chrono::NaiveDate, _>(index).map(|v| Value::String(v.to_string())),
        "BYTEA" => row.try_get::<Vec<u8>, _>(index).map(|v| blob(&v)),
        _ => row.try_get::<String, _>(index).map(Value::String),
    };

    decoded.unwrap_or_else(|e| {
        debug!(column_type = %type_name, error = %e, "Undecodable PostgreSQL value; cast it to text in the query");
        Value::Null
    })
}

/// Bind JSON parameters positionally to a SQLite query
pub(crate) fn bind_sqlite<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    params: &[Value],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for param in params {
        query = match param {
            Value::Null => query.bind(None::<String>),
            Value::Bool(b) => query.bind(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => query.bind(i),
                None => query.bind(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => query.bind(s.clone()),
            other => query.bind(other.to_string()),
        };
    }
    query
}

/// Bind JSON parameters positionally to a PostgreSQL query
pub(crate) fn bind_pg<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    params: &[Value],
) -> Query<'q, Postgres, PgArguments> {
    for param in params {
        query = match param {
            Value::Null => query.bind(None::<String>),
            Value::Bool(b) => query.bind(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => query.bind(i),
                None => query.bind(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => query.bind(s.clone()),
            other => query.bind(sqlx::types::Json(other.clone())),
        };
    }
    query
}

/// JSON parameter to a DuckDB value
pub(crate) fn duck_param(value: &Value) -> duckdb::types::Value {
    use duckdb::types::Value as Duck;
    match value {
        Value::Null => Duck::Null,
        Value::Bool(b) => Duck::Boolean(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Duck::BigInt(i),
            None => Duck::Double(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => Duck::Text(s.clone()),
        other => Duck::Text(other.to_string()),
    }
}

/// DuckDB value to JSON
pub(crate) fn duck_value_to_json(value: duckdb::types::Value) -> Value {
    use duckdb::types::Value as Duck;
    match value {
        Duck::Null => Value::Null,
        Duck::Boolean(b) => Value::Bool(b),
        Duck::TinyInt(v) => Value::from(v),
        Duck::SmallInt(v) => Value::from(v),
        Duck::Int(v) => Value::from(v),
        Duck::BigInt(v) => Value::from(v),
        Duck::HugeInt(v) => i64::try_from(v).map(Value::from).unwrap_or_else(|_| Value::String(v.to_string())),
        Duck::UTinyInt(v) => Value::from(v),
        Duck::USmallInt(v) => Value::from(v),
        Duck::UInt(v) => Value::from(v),
        Duck::UBigInt(v) => Value::from(v),
        Duck::Float(v) => float(f64::from(v)),
        Duck::Double(v) => float(v),
        Duck::Decimal(d) => Value::String(d.to_string()),
        Duck::Text(s) | Duck::Enum(s) => Value::String(s),
        Duck::Blob(bytes) => blob(&bytes),
        Duck::List(items) | Duck::Array(items) => {
            Value::Array(items.into_iter().map(duck_value_to_json).collect())
        }
        other => Value::String(format!("{:?}", other)),
    }
}
