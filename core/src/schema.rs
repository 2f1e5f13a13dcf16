//! 关系元数据
//!
//! 每个关系用一份静态的 `RelationMeta` 描述：应用字段名到存储列名的映射、
//! 字段类型、可见性（普通 / 私有）、WHERE 比较方式以及关联表。
//! 字段列表是封闭的白名单，只有其中的列名会进入生成的 SQL。

use crate::db_pool::DbDriver;
use crate::error::{Result, SqlxRecordError};

/// 字段值类型，决定 JSON 值如何绑定以及结果如何还原
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Integer,
    Float,
    Bool,
    /// 时间戳，接受 RFC 3339、`YYYY-MM-DD HH:MM:SS` 或 `YYYY-MM-DD`
    Timestamp,
    /// 任意 JSON 值
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    /// 所有查询都会返回
    General,
    /// 只在特权查询中返回
    Private,
}

/// WHERE 条件中字段的比较方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    /// 等于: =
    Eq,
    /// LIKE 匹配
    Like,
    /// 大小写不敏感的 LIKE 匹配
    ILike,
}

impl Comparison {
    pub fn is_fuzzy(&self) -> bool {
        !matches!(self, Comparison::Eq)
    }

    pub(crate) fn to_sql(self, driver: DbDriver) -> &'static str {
        match self {
            Comparison::Eq => "=",
            Comparison::Like => "LIKE",
            Comparison::ILike => driver.ilike_operator(),
        }
    }
}

/// 字段元数据
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldMeta {
    /// 应用层字段名（camelCase）
    pub name: &'static str,
    /// 存储列名，与字段名相同时用 `new` 的默认值即可
    pub column: &'static str,
    pub kind: FieldKind,
    pub visibility: Visibility,
    pub comparison: Comparison,
    /// 是否允许出现在 INSERT / UPDATE 中（主键等为 false）
    pub writable: bool,
}

impl FieldMeta {
    pub const fn new(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            column: name,
            kind,
            visibility: Visibility::General,
            comparison: Comparison::Eq,
            writable: true,
        }
    }

    pub const fn column(mut self, column: &'static str) -> Self {
        self.column = column;
        self
    }

    pub const fn private(mut self) -> Self {
        self.visibility = Visibility::Private;
        self
    }

    pub const fn compare(mut self, comparison: Comparison) -> Self {
        self.comparison = comparison;
        self
    }

    pub const fn read_only(mut self) -> Self {
        self.writable = false;
        self
    }
}

/// 多对多关联表元数据：(secondary_column, record_column) 组成复合键
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinMeta {
    /// 关联表名
    pub table: &'static str,
    /// 指向父记录主键的列
    pub record_column: &'static str,
    /// 关联行中父记录 ID 的应用层名称
    pub record_field: &'static str,
    /// 指向另一实体的列
    pub secondary_column: &'static str,
    /// 关联条目中另一实体键的应用层名称，如 `username`
    pub secondary_field: &'static str,
    pub secondary_kind: FieldKind,
    /// create 时记录中承载关联列表的字段名，如 `contractSigned`
    pub list_field: &'static str,
}

/// 关系元数据
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelationMeta {
    /// 表名
    pub table: &'static str,
    /// 主键字段名（应用层名称）
    pub pk: &'static str,
    /// 字段白名单
    pub fields: &'static [FieldMeta],
    /// list 的固定排序：(字段名, 是否升序)
    pub order_by: &'static [(&'static str, bool)],
    pub join: Option<JoinMeta>,
}

impl RelationMeta {
    pub fn field(&self, name: &str) -> Option<&FieldMeta> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn pk_field(&self) -> Result<&FieldMeta> {
        self.field(self.pk).ok_or_else(|| {
            SqlxRecordError::InvalidField(format!(
                "Primary key field '{}' is not declared on '{}'",
                self.pk, self.table
            ))
        })
    }

    /// 可写入字段查找，未声明或只读的字段直接拒绝
    pub fn writable_field(&self, name: &str) -> Result<&FieldMeta> {
        let field = self.field(name).ok_or_else(|| self.unknown_field(name))?;
        if !field.writable {
            return Err(SqlxRecordError::InvalidField(format!(
                "Field '{}' of '{}' cannot be written",
                name, self.table
            )));
        }
        Ok(field)
    }

    /// 过滤字段查找，私有字段不能作为过滤条件
    pub fn filter_field(&self, name: &str) -> Result<&FieldMeta> {
        match self.field(name) {
            Some(field) if field.visibility == Visibility::General => Ok(field),
            _ => Err(self.unknown_field(name)),
        }
    }

    fn unknown_field(&self, name: &str) -> SqlxRecordError {
        SqlxRecordError::InvalidField(format!(
            "Field '{}' does not exist in relation '{}'",
            name, self.table
        ))
    }

    /// SELECT / RETURNING 投影，存储列在这里直接重命名为应用字段名
    pub fn projection(&self, driver: DbDriver, privileged: bool) -> String {
        self.fields
            .iter()
            .filter(|f| privileged || f.visibility == Visibility::General)
            .map(|f| {
                format!(
                    "{} AS {}",
                    driver.escape_identifier(f.column),
                    driver.escape_identifier(f.name)
                )
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// 固定排序子句，没有配置排序时返回空字符串
    pub fn order_by_sql(&self, driver: DbDriver) -> String {
        let parts: Vec<String> = self
            .order_by
            .iter()
            .filter_map(|(name, ascending)| {
                self.field(name).map(|f| {
                    let column = driver.escape_identifier(f.column);
                    if *ascending {
                        column
                    } else {
                        format!("{} DESC", column)
                    }
                })
            })
            .collect();
        if parts.is_empty() {
            String::new()
        } else {
            format!(" ORDER BY {}", parts.join(", "))
        }
    }

    /// 校验元数据：标识符安全、主键存在且可见、字段名不重复、排序字段已声明
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(SqlxRecordError::InvalidField(msg));

        if !is_safe_identifier(self.table) {
            return invalid(format!("Unsafe table name '{}'", self.table));
        }
        for (i, field) in self.fields.iter().enumerate() {
            if !is_safe_identifier(field.column) {
                return invalid(format!("Unsafe column name '{}'", field.column));
            }
            if !is_safe_identifier(field.name) {
                return invalid(format!("Unsafe field name '{}'", field.name));
            }
            if self.fields[..i].iter().any(|f| f.name == field.name) {
                return invalid(format!("Duplicate field '{}'", field.name));
            }
        }
        let pk = self.pk_field()?;
        if pk.visibility != Visibility::General {
            return invalid(format!("Primary key '{}' must be a general field", pk.name));
        }
        for (name, _) in self.order_by {
            if self.field(name).is_none() {
                return Err(self.unknown_field(name));
            }
        }
        if let Some(join) = &self.join {
            for ident in [
                join.table,
                join.record_column,
                join.record_field,
                join.secondary_column,
                join.secondary_field,
            ] {
                if !is_safe_identifier(ident) {
                    return invalid(format!("Unsafe join identifier '{}'", ident));
                }
            }
            if self.field(join.list_field).is_some() {
                return invalid(format!(
                    "Association list '{}' collides with a field",
                    join.list_field
                ));
            }
        }
        Ok(())
    }
}

/// 验证标识符是否安全：非空、字母或下划线开头、只含字母数字和下划线
pub fn is_safe_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
