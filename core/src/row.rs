//! 驱动行到 `Record` 的解码
//!
//! 列名直接成为记录的键（投影中已经 `AS` 成应用字段名），值按列类型解码为 JSON

#![cfg(any(feature = "postgres", feature = "sqlite"))]

use crate::error::Result;
use crate::record::Record;
use serde_json::Value;
use sqlx::{Column, Row, TypeInfo, ValueRef};

#[cfg(feature = "postgres")]
pub(crate) fn pg_row_to_record(row: &sqlx::postgres::PgRow) -> Result<Record> {
    use crate::error::SqlxRecordError;
    use crate::record::format_timestamp;
    use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

    let mut record = Record::new();
    for (i, column) in row.columns().iter().enumerate() {
        if row.try_get_raw(i)?.is_null() {
            record.insert(column.name().to_string(), Value::Null);
            continue;
        }
        let value = match column.type_info().name() {
            "BOOL" => Value::Bool(row.try_get::<bool, _>(i)?),
            "INT2" => Value::from(row.try_get::<i16, _>(i)?),
            "INT4" => Value::from(row.try_get::<i32, _>(i)?),
            "INT8" => Value::from(row.try_get::<i64, _>(i)?),
            "FLOAT4" => Value::from(row.try_get::<f32, _>(i)?),
            "FLOAT8" => Value::from(row.try_get::<f64, _>(i)?),
            "NUMERIC" => {
                let n: bigdecimal::BigDecimal = row.try_get(i)?;
                Value::String(n.to_string())
            }
            "TEXT" | "VARCHAR" | "BPCHAR" | "CHAR" | "NAME" => {
                Value::String(row.try_get::<String, _>(i)?)
            }
            "TIMESTAMPTZ" => {
                Value::String(format_timestamp(&row.try_get::<DateTime<Utc>, _>(i)?))
            }
            "TIMESTAMP" => {
                let t: NaiveDateTime = row.try_get(i)?;
                Value::String(format_timestamp(&t.and_utc()))
            }
            "DATE" => Value::String(row.try_get::<NaiveDate, _>(i)?.to_string()),
            "JSON" | "JSONB" => row.try_get::<Value, _>(i)?,
            other => {
                return Err(SqlxRecordError::UnsupportedColumn {
                    column: column.name().to_string(),
                    type_name: other.to_string(),
                })
            }
        };
        record.insert(column.name().to_string(), value);
    }
    Ok(record)
}

/// SQLite 按值的存储类型解码；声明为 BOOLEAN 的列解码为布尔值
#[cfg(feature = "sqlite")]
pub(crate) fn sqlite_row_to_record(row: &sqlx::sqlite::SqliteRow) -> Result<Record> {
    let mut record = Record::new();
    for (i, column) in row.columns().iter().enumerate() {
        let raw = row.try_get_raw(i)?;
        if raw.is_null() {
            record.insert(column.name().to_string(), Value::Null);
            continue;
        }
        let storage = raw.type_info().name().to_string();
        let declared = column.type_info().name().to_ascii_uppercase();

        let value = if declared == "BOOLEAN" {
            Value::Bool(row.try_get_unchecked::<bool, _>(i)?)
        } else {
            match storage.as_str() {
                "INTEGER" | "BOOLEAN" => Value::from(row.try_get_unchecked::<i64, _>(i)?),
                "REAL" => Value::from(row.try_get_unchecked::<f64, _>(i)?),
                "BLOB" => {
                    let bytes = row.try_get_unchecked::<Vec<u8>, _>(i)?;
                    Value::String(String::from_utf8_lossy(&bytes).into_owned())
                }
                _ => Value::String(row.try_get_unchecked::<String, _>(i)?),
            }
        };
        record.insert(column.name().to_string(), value);
    }
    Ok(record)
}
