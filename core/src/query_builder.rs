//! JSON 记录到参数化 SQL 片段的转换
//!
//! 所有构建函数都是纯函数：列名只来自 `RelationMeta` 的白名单，
//! 值全部追加到调用方传入的 `ParamList`，占位符编号由 `ParamList` 统一分配。
//! 多个片段（SET + WHERE）共用同一个 `ParamList` 时编号自然连续。

use crate::db_pool::DbDriver;
use crate::error::{Result, SqlxRecordError};
use crate::record::{to_bind_value, Record};
use crate::schema::{FieldKind, RelationMeta};
use serde_json::Value;
use std::fmt;

/// 绑定值，用于安全地传递参数
#[derive(Debug, Clone, PartialEq)]
pub enum BindValue {
    String(String),
    Int64(i64),
    Float64(f64),
    Bool(bool),
    Timestamp(chrono::DateTime<chrono::Utc>),
    Json(Value),
    /// 按字段类型绑定的 NULL
    Null(FieldKind),
}

impl fmt::Display for BindValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindValue::String(s) => write!(f, "'{}'", s.replace('\'', "''")),
            BindValue::Int64(i) => write!(f, "{}", i),
            BindValue::Float64(v) => write!(f, "{}", v),
            BindValue::Bool(b) => write!(f, "{}", b),
            BindValue::Timestamp(t) => write!(f, "'{}'", t.to_rfc3339()),
            BindValue::Json(v) => write!(f, "'{}'", v),
            BindValue::Null(_) => f.write_str("NULL"),
        }
    }
}

impl From<String> for BindValue {
    fn from(s: String) -> Self {
        BindValue::String(s)
    }
}

impl From<&str> for BindValue {
    fn from(s: &str) -> Self {
        BindValue::String(s.to_string())
    }
}

impl From<i64> for BindValue {
    fn from(i: i64) -> Self {
        BindValue::Int64(i)
    }
}

impl From<f64> for BindValue {
    fn from(f: f64) -> Self {
        BindValue::Float64(f)
    }
}

impl From<bool> for BindValue {
    fn from(b: bool) -> Self {
        BindValue::Bool(b)
    }
}

impl From<chrono::DateTime<chrono::Utc>> for BindValue {
    fn from(t: chrono::DateTime<chrono::Utc>) -> Self {
        BindValue::Timestamp(t)
    }
}

/// 有序的参数列表
///
/// `push` 追加一个值并返回它的占位符，占位符数量与绑定值数量始终相等
#[derive(Debug, Clone)]
pub struct ParamList {
    driver: DbDriver,
    binds: Vec<BindValue>,
}

impl ParamList {
    pub fn new(driver: DbDriver) -> Self {
        Self {
            driver,
            binds: Vec::new(),
        }
    }

    pub fn driver(&self) -> DbDriver {
        self.driver
    }

    /// 追加参数，返回对应的占位符（如 `$3`）
    pub fn push(&mut self, value: impl Into<BindValue>) -> String {
        let placeholder = self.driver.placeholder(self.binds.len());
        self.binds.push(value.into());
        placeholder
    }

    /// 下一个 `push` 将得到的 1 起始编号
    pub fn next_index(&self) -> usize {
        self.binds.len() + 1
    }

    pub fn len(&self) -> usize {
        self.binds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.binds.is_empty()
    }

    pub fn binds(&self) -> &[BindValue] {
        &self.binds
    }

    pub fn into_binds(self) -> Vec<BindValue> {
        self.binds
    }
}

/// INSERT 的列列表和值列表，均已带括号
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertClause {
    pub columns: String,
    pub placeholders: String,
}

/// 生成 INSERT 的 `(列...)` 与 `(占位符...)`，顺序与记录的键迭代顺序一致
pub fn build_insert(
    meta: &RelationMeta,
    record: &Record,
    params: &mut ParamList,
) -> Result<InsertClause> {
    if record.is_empty() {
        return Err(SqlxRecordError::EmptyRecord);
    }

    let driver = params.driver();
    let mut columns = Vec::with_capacity(record.len());
    let mut placeholders = Vec::with_capacity(record.len());

    for (key, value) in record {
        let field = meta.writable_field(key)?;
        let bind_value = to_bind_value(field, value)?;
        columns.push(driver.escape_identifier(field.column));
        placeholders.push(params.push(bind_value));
    }

    Ok(InsertClause {
        columns: format!("({})", columns.join(", ")),
        placeholders: format!("({})", placeholders.join(", ")),
    })
}

/// 生成部分更新的 SET 子句（不含 `SET` 关键字）
///
/// 只包含记录中出现的字段；调用方随后在同一个 `ParamList` 上追加主键值
pub fn build_update_set(
    meta: &RelationMeta,
    record: &Record,
    params: &mut ParamList,
) -> Result<String> {
    if record.is_empty() {
        return Err(SqlxRecordError::EmptyRecord);
    }

    let driver = params.driver();
    let mut set_parts = Vec::with_capacity(record.len());

    for (key, value) in record {
        let field = meta.writable_field(key)?;
        let bind_value = to_bind_value(field, value)?;
        let placeholder = params.push(bind_value);
        set_parts.push(format!(
            "{} = {}",
            driver.escape_identifier(field.column),
            placeholder
        ));
    }

    Ok(set_parts.join(", "))
}

/// 生成 WHERE 子句，过滤条件为空或缺省时返回空字符串
///
/// 比较方式取自字段的 `comparison`，JSON null 生成 `IS NULL`
pub fn build_where_filter(
    meta: &RelationMeta,
    filter: Option<&Record>,
    params: &mut ParamList,
) -> Result<String> {
    let filter = match filter {
        Some(filter) if !filter.is_empty() => filter,
        _ => return Ok(String::new()),
    };

    let driver = params.driver();
    let mut predicates = Vec::with_capacity(filter.len());

    for (key, value) in filter {
        let field = meta.filter_field(key)?;
        let column = driver.escape_identifier(field.column);
        if value.is_null() {
            predicates.push(format!("{} IS NULL", column));
            continue;
        }
        let bind_value = if field.comparison.is_fuzzy() {
            match value {
                Value::String(s) => BindValue::String(s.clone()),
                other => BindValue::String(other.to_string()),
            }
        } else {
            to_bind_value(field, value)?
        };
        let placeholder = params.push(bind_value);
        predicates.push(format!(
            "{} {} {}",
            column,
            field.comparison.to_sql(driver),
            placeholder
        ));
    }

    Ok(format!("WHERE {}", predicates.join(" AND ")))
}
