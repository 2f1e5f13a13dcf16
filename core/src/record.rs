//! JSON 记录与绑定值之间的转换

use crate::db_pool::DbDriver;
use crate::error::{Result, SqlxRecordError};
use crate::query_builder::BindValue;
use crate::schema::{FieldKind, FieldMeta, RelationMeta};
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde_json::Value;

/// 应用层记录：字段名 -> JSON 值
pub type Record = serde_json::Map<String, Value>;

/// 主键 ID 类型
pub type Id = i64;

/// 按字段类型把 JSON 值转换为绑定值
pub fn to_bind_value(field: &FieldMeta, value: &Value) -> Result<BindValue> {
    if value.is_null() {
        return Ok(BindValue::Null(field.kind));
    }
    let mismatch = || {
        SqlxRecordError::InvalidField(format!(
            "Field '{}' expects {:?}, got {}",
            field.name, field.kind, value
        ))
    };
    match field.kind {
        FieldKind::Text => value
            .as_str()
            .map(|s| BindValue::String(s.to_string()))
            .ok_or_else(mismatch),
        FieldKind::Integer => value.as_i64().map(BindValue::Int64).ok_or_else(mismatch),
        FieldKind::Float => value.as_f64().map(BindValue::Float64).ok_or_else(mismatch),
        FieldKind::Bool => value.as_bool().map(BindValue::Bool).ok_or_else(mismatch),
        FieldKind::Timestamp => value
            .as_str()
            .and_then(parse_timestamp)
            .map(BindValue::Timestamp)
            .ok_or_else(mismatch),
        FieldKind::Json => Ok(BindValue::Json(value.clone())),
    }
}

/// 解析时间戳：RFC 3339（允许空格分隔），或按 UTC 处理的 `YYYY-MM-DD[ HH:MM:SS[.f]]`
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Some(t.with_timezone(&Utc));
    }
    if let Ok(t) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Some(t.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(t) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(t.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|t| t.and_utc())
}

pub fn format_timestamp(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// 按关系元数据整理驱动返回的行
///
/// SQLite 没有原生布尔、JSON 和时间类型，这里统一还原成与 PostgreSQL 相同的形状。
/// PostgreSQL 的行在解码时已经按列类型还原，原样返回，JSON 字段里的字符串不会被再解析
pub fn normalize_row(meta: &RelationMeta, driver: DbDriver, mut row: Record) -> Record {
    if driver == DbDriver::Postgres {
        return row;
    }
    for (key, value) in row.iter_mut() {
        let Some(field) = meta.field(key) else {
            continue;
        };
        let normalized = match (field.kind, &*value) {
            (FieldKind::Bool, Value::Number(n)) => n.as_i64().map(|i| Value::Bool(i != 0)),
            (FieldKind::Json, Value::String(s)) => serde_json::from_str(s).ok(),
            (FieldKind::Timestamp, Value::String(s)) => {
                parse_timestamp(s).map(|t| Value::String(format_timestamp(&t)))
            }
            _ => None,
        };
        if let Some(normalized) = normalized {
            *value = normalized;
        }
    }
    row
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Comparison;
    use chrono::TimeZone;
    use serde_json::json;

    const FIELDS: &[FieldMeta] = &[
        FieldMeta::new("id", FieldKind::Integer).read_only(),
        FieldMeta::new("title", FieldKind::Text).compare(Comparison::Like),
        FieldMeta::new("score", FieldKind::Float),
        FieldMeta::new("flag", FieldKind::Bool),
        FieldMeta::new("at", FieldKind::Timestamp),
        FieldMeta::new("body", FieldKind::Json),
    ];

    const META: RelationMeta = RelationMeta {
        table: "t",
        pk: "id",
        fields: FIELDS,
        order_by: &[],
        join: None,
    };

    fn field(name: &str) -> &'static FieldMeta {
        FIELDS.iter().find(|f| f.name == name).unwrap()
    }

    #[test]
    fn test_to_bind_value_kinds() {
        assert_eq!(
            to_bind_value(field("title"), &json!("a")).unwrap(),
            BindValue::String("a".into())
        );
        assert_eq!(
            to_bind_value(field("id"), &json!(3)).unwrap(),
            BindValue::Int64(3)
        );
        assert_eq!(
            to_bind_value(field("score"), &json!(1.5)).unwrap(),
            BindValue::Float64(1.5)
        );
        assert_eq!(
            to_bind_value(field("flag"), &json!(false)).unwrap(),
            BindValue::Bool(false)
        );
        assert_eq!(
            to_bind_value(field("body"), &json!([1, 2])).unwrap(),
            BindValue::Json(json!([1, 2]))
        );
        assert_eq!(
            to_bind_value(field("flag"), &Value::Null).unwrap(),
            BindValue::Null(FieldKind::Bool)
        );
    }

    #[test]
    fn test_to_bind_value_type_mismatch() {
        assert!(to_bind_value(field("title"), &json!(1)).is_err());
        assert!(to_bind_value(field("flag"), &json!("yes")).is_err());
        assert!(to_bind_value(field("at"), &json!("not a date")).is_err());
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2024-05-01T10:00:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2024-05-01T12:00:00+02:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-05-01 10:00:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-05-01 10:00:00+00:00"), Some(expected));
        assert_eq!(
            parse_timestamp("2024-05-01"),
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_timestamp("05/01/2024"), None);
    }

    #[test]
    fn test_normalize_row() {
        let row = json!({
            "id": 1,
            "flag": 1,
            "body": "{\"k\":true}",
            "at": "2024-05-01 10:00:00",
            "title": "{\"not\":\"json\"}",
            "extra": 0
        });
        let Value::Object(row) = row else { unreachable!() };
        let row = normalize_row(&META, DbDriver::Sqlite, row);
        assert_eq!(row["flag"], json!(true));
        assert_eq!(row["body"], json!({"k": true}));
        assert_eq!(row["at"], json!("2024-05-01T10:00:00Z"));
        assert_eq!(row["title"], json!("{\"not\":\"json\"}"));
        assert_eq!(row["extra"], json!(0));
    }

    #[test]
    fn test_normalize_row_keeps_postgres_json_strings() {
        let Value::Object(row) = json!({
            "id": 1,
            "body": "42",
            "title": "Demo"
        }) else {
            unreachable!()
        };
        let row = normalize_row(&META, DbDriver::Postgres, row);
        assert_eq!(row["body"], json!("42"));

        for text in ["true", "{\"k\":1}", "[1]", "null"] {
            let mut row = Record::new();
            row.insert("body".to_string(), json!(text));
            let row = normalize_row(&META, DbDriver::Postgres, row);
            assert_eq!(row["body"], json!(text));
        }
    }

    #[test]
    fn test_normalize_row_postgres_shape_unchanged() {
        let Value::Object(row) = json!({
            "id": 7,
            "flag": false,
            "score": 1.5,
            "at": "2024-05-01T10:00:00Z",
            "body": {"blocks": [{"text": "hello"}]},
            "title": null
        }) else {
            unreachable!()
        };
        let normalized = normalize_row(&META, DbDriver::Postgres, row.clone());
        assert_eq!(normalized, row);
    }

    #[test]
    fn test_normalize_row_sqlite_json_text() {
        let Value::Object(row) = json!({"body": "42", "flag": 0}) else {
            unreachable!()
        };
        let row = normalize_row(&META, DbDriver::Sqlite, row);
        assert_eq!(row["body"], json!(42));
        assert_eq!(row["flag"], json!(false));
    }
}
