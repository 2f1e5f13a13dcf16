//! 单个关系的 CRUD 操作
//!
//! 每个操作都是 准备 -> 执行 -> 解释结果或返回错误。
//! `create` 额外包含事务边界：BEGIN -> 插入父记录 -> 插入 0..n 条关联记录 -> COMMIT，
//! 中间任何一步失败都会 ROLLBACK。

use crate::db_pool::DbDriver;
use crate::error::{codes, Result, SqlxRecordError};
use crate::executor::{DbExecutor, DbTransaction};
use crate::query_builder::{
    build_insert, build_update_set, build_where_filter, BindValue, ParamList,
};
use crate::record::{normalize_row, to_bind_value, Id, Record};
use crate::schema::{FieldMeta, JoinMeta, RelationMeta};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// 分页结果
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub size: u64,
    pub pages: u64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: u64, page: u64, size: u64) -> Self {
        let pages = if size > 0 {
            total.div_ceil(size)
        } else {
            0
        };
        Self {
            items,
            total,
            page,
            size,
            pages,
        }
    }
}

/// 一个关系的数据访问模型
///
/// 数据库句柄由组合根创建后注入，模型本身不持有全局状态
#[derive(Clone)]
pub struct RecordModel {
    executor: Arc<dyn DbExecutor>,
    meta: &'static RelationMeta,
}

impl std::fmt::Debug for RecordModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordModel")
            .field("driver", &self.executor.driver())
            .field("table", &self.meta.table)
            .finish()
    }
}

impl RecordModel {
    /// 创建模型，元数据中的标识符在这里统一校验
    pub fn new(executor: Arc<dyn DbExecutor>, meta: &'static RelationMeta) -> Result<Self> {
        meta.validate()?;
        Ok(Self { executor, meta })
    }

    pub fn meta(&self) -> &'static RelationMeta {
        self.meta
    }

    fn driver(&self) -> DbDriver {
        self.executor.driver()
    }

    fn table(&self) -> String {
        self.driver().escape_identifier(self.meta.table)
    }

    fn join(&self) -> Result<&'static JoinMeta> {
        self.meta.join.as_ref().ok_or_else(|| {
            SqlxRecordError::InvalidField(format!(
                "Relation '{}' has no association table",
                self.meta.table
            ))
        })
    }

    /// 创建记录
    ///
    /// 关系配置了关联表时，记录中 `JoinMeta::list_field` 对应的数组会被取出作为关联列表
    pub async fn create(&self, record: &Record) -> Result<Record> {
        let list_field = self.meta.join.as_ref().map(|j| j.list_field);
        let mut parent = record.clone();
        let associations = match list_field.and_then(|name| parent.remove(name)) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items,
            Some(other) => {
                return Err(SqlxRecordError::InvalidField(format!(
                    "Association list must be an array, got {}",
                    other
                )))
            }
        };
        self.create_with_associations(&parent, &associations).await
    }

    /// 在一个事务中插入父记录和关联记录，返回父记录的普通字段
    ///
    /// 事务内任何失败都会回滚，并统一报告为 `multi_create_failed`
    pub async fn create_with_associations(
        &self,
        record: &Record,
        associations: &[Value],
    ) -> Result<Record> {
        let join = if associations.is_empty() {
            None
        } else {
            Some(self.join()?)
        };

        let mut params = ParamList::new(self.driver());
        let insert = build_insert(self.meta, record, &mut params)?;
        let sql = format!(
            "INSERT INTO {} {} VALUES {} RETURNING {}",
            self.table(),
            insert.columns,
            insert.placeholders,
            self.meta.projection(self.driver(), false)
        );

        let mut tx = self.executor.begin().await.map_err(|e| {
            tracing::warn!(table = self.meta.table, error = %e, "begin failed");
            SqlxRecordError::request_failed(codes::MULTI_CREATE_FAILED)
        })?;

        let result = self
            .insert_in_transaction(tx.as_mut(), &sql, params.binds(), join, associations)
            .await;

        match result {
            Ok(row) => {
                tx.commit().await.map_err(|e| {
                    tracing::warn!(table = self.meta.table, error = %e, "commit failed");
                    SqlxRecordError::request_failed(codes::MULTI_CREATE_FAILED)
                })?;
                Ok(row)
            }
            Err(e) => {
                tracing::warn!(table = self.meta.table, error = %e, "create failed, rolling back");
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(
                        table = self.meta.table,
                        error = %rollback_err,
                        "rollback failed"
                    );
                }
                Err(SqlxRecordError::request_failed(codes::MULTI_CREATE_FAILED))
            }
        }
    }

    async fn insert_in_transaction(
        &self,
        tx: &mut dyn DbTransaction,
        sql: &str,
        binds: &[BindValue],
        join: Option<&JoinMeta>,
        associations: &[Value],
    ) -> Result<Record> {
        let row = tx
            .fetch_all(sql, binds)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                SqlxRecordError::UnexpectedResult("INSERT returned no row".to_string())
            })?;
        let row = normalize_row(self.meta, self.driver(), row);

        let Some(join) = join else {
            return Ok(row);
        };
        let id = row
            .get(self.meta.pk)
            .and_then(Value::as_i64)
            .ok_or_else(|| {
                SqlxRecordError::UnexpectedResult("INSERT returned no primary key".to_string())
            })?;

        let driver = self.driver();
        let secondary = join_secondary_field(join);
        let sql_prefix = format!(
            "INSERT INTO {} ({}, {}) VALUES",
            driver.escape_identifier(join.table),
            driver.escape_identifier(join.secondary_column),
            driver.escape_identifier(join.record_column)
        );
        for entry in associations {
            let key = entry
                .get(join.secondary_field)
                .filter(|v| !v.is_null())
                .ok_or_else(|| {
                    SqlxRecordError::InvalidField(format!(
                        "Association entry is missing '{}'",
                        join.secondary_field
                    ))
                })?;
            let mut params = ParamList::new(driver);
            let secondary_ph = params.push(to_bind_value(&secondary, key)?);
            let record_ph = params.push(id);
            let sql = format!("{} ({}, {})", sql_prefix, secondary_ph, record_ph);
            tx.fetch_all(&sql, params.binds()).await?;
        }
        Ok(row)
    }

    /// 按过滤条件查询，模糊匹配字段的字符串值会被包装为 `%value%`
    pub async fn list(&self, filter: Option<&Record>) -> Result<Vec<Record>> {
        let filter = filter.map(|f| self.wrap_fuzzy(f));
        let mut params = ParamList::new(self.driver());
        let where_clause = build_where_filter(self.meta, filter.as_ref(), &mut params)?;
        let sql = format!(
            "SELECT {} FROM {}{}{}",
            self.meta.projection(self.driver(), false),
            self.table(),
            prefixed(&where_clause),
            self.meta.order_by_sql(self.driver())
        );
        self.fetch(&sql, params.binds()).await
    }

    /// 统计满足过滤条件的记录数量
    pub async fn count(&self, filter: Option<&Record>) -> Result<u64> {
        let filter = filter.map(|f| self.wrap_fuzzy(f));
        let mut params = ParamList::new(self.driver());
        let where_clause = build_where_filter(self.meta, filter.as_ref(), &mut params)?;
        let sql = format!(
            "SELECT COUNT(*) AS \"count\" FROM {}{}",
            self.table(),
            prefixed(&where_clause)
        );
        let rows = self.executor.fetch_all(&sql, params.binds()).await?;
        rows.first()
            .and_then(|row| row.get("count"))
            .and_then(Value::as_u64)
            .ok_or_else(|| {
                SqlxRecordError::UnexpectedResult(format!(
                    "COUNT on '{}' returned no integer count",
                    self.meta.table
                ))
            })
    }

    /// 分页查询，page 从 1 开始
    ///
    /// 偏移量溢出时返回 `InvalidField`，不会发出任何语句
    pub async fn paginate(
        &self,
        filter: Option<&Record>,
        page: u64,
        size: u64,
    ) -> Result<Page<Record>> {
        let page = page.max(1);
        let offset = (page - 1).checked_mul(size).ok_or_else(|| {
            SqlxRecordError::InvalidField(format!(
                "Page {} with size {} is out of range",
                page, size
            ))
        })?;
        let total = self.count(filter).await?;

        let filter = filter.map(|f| self.wrap_fuzzy(f));
        let mut params = ParamList::new(self.driver());
        let where_clause = build_where_filter(self.meta, filter.as_ref(), &mut params)?;
        let sql = format!(
            "SELECT {} FROM {}{}{} LIMIT {} OFFSET {}",
            self.meta.projection(self.driver(), false),
            self.table(),
            prefixed(&where_clause),
            self.meta.order_by_sql(self.driver()),
            size,
            offset
        );
        let items = self.fetch(&sql, params.binds()).await?;
        Ok(Page::new(items, total, page, size))
    }

    /// 根据 ID 查找记录（只含普通字段），不存在时返回 NotFound
    pub async fn get(&self, id: Id) -> Result<Record> {
        self.find_by_id(id, false).await
    }

    /// 根据 ID 查找记录（普通字段 + 私有字段）
    ///
    /// 调用方负责确认请求者有权查看私有字段
    pub async fn get_privileged(&self, id: Id) -> Result<Record> {
        self.find_by_id(id, true).await
    }

    async fn find_by_id(&self, id: Id, privileged: bool) -> Result<Record> {
        let pk = self.meta.pk_field()?;
        let mut params = ParamList::new(self.driver());
        let placeholder = params.push(id);
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = {}",
            self.meta.projection(self.driver(), privileged),
            self.table(),
            self.driver().escape_identifier(pk.column),
            placeholder
        );
        self.fetch(&sql, params.binds())
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| SqlxRecordError::not_found(self.meta.table, id))
    }

    /// 部分更新（Patch 语义）：只覆盖 `partial` 中出现的字段
    ///
    /// 先确认记录存在，不存在时不会发出 UPDATE
    pub async fn update(&self, id: Id, partial: &Record) -> Result<Record> {
        self.get(id).await?;

        let pk = self.meta.pk_field()?;
        let mut params = ParamList::new(self.driver());
        let set_clause = build_update_set(self.meta, partial, &mut params)?;
        let pk_placeholder = params.push(id);
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = {} RETURNING {}",
            self.table(),
            set_clause,
            self.driver().escape_identifier(pk.column),
            pk_placeholder,
            self.meta.projection(self.driver(), false)
        );

        let rows = self
            .executor
            .fetch_all(&sql, params.binds())
            .await
            .map_err(|e| write_failed(self.meta.table, e, codes::UPDATE_FAILED))?;
        rows.into_iter()
            .next()
            .map(|row| normalize_row(self.meta, self.driver(), row))
            .ok_or_else(|| SqlxRecordError::not_found(self.meta.table, id))
    }

    /// 按关联表的键类型把 JSON 值转换为绑定值
    pub fn association_key(&self, value: &Value) -> Result<BindValue> {
        to_bind_value(&join_secondary_field(self.join()?), value)
    }

    /// 删除一条关联记录 (id, secondary)，父记录保留
    pub async fn delete(&self, id: Id, secondary: impl Into<BindValue>) -> Result<()> {
        let join = self.join()?;
        let driver = self.driver();
        let secondary = secondary.into();
        let key = format!("({}, {})", id, secondary);

        let mut params = ParamList::new(driver);
        let record_ph = params.push(id);
        let secondary_ph = params.push(secondary);
        let record_column = driver.escape_identifier(join.record_column);
        let sql = format!(
            "DELETE FROM {} WHERE {} = {} AND {} = {} RETURNING {}",
            driver.escape_identifier(join.table),
            record_column,
            record_ph,
            driver.escape_identifier(join.secondary_column),
            secondary_ph,
            record_column
        );

        let rows = self.executor.fetch_all(&sql, params.binds()).await?;
        if rows.is_empty() {
            return Err(SqlxRecordError::not_found(join.table, key));
        }
        Ok(())
    }

    /// 查询一条记录的所有关联行
    pub async fn associations(&self, id: Id) -> Result<Vec<Record>> {
        let join = self.join()?;
        let driver = self.driver();
        let mut params = ParamList::new(driver);
        let placeholder = params.push(id);
        let record_column = driver.escape_identifier(join.record_column);
        let secondary_column = driver.escape_identifier(join.secondary_column);
        let sql = format!(
            "SELECT {} AS {}, {} AS {} FROM {} WHERE {} = {} ORDER BY {}",
            secondary_column,
            driver.escape_identifier(join.secondary_field),
            record_column,
            driver.escape_identifier(join.record_field),
            driver.escape_identifier(join.table),
            record_column,
            placeholder,
            secondary_column
        );
        self.executor.fetch_all(&sql, params.binds()).await
    }

    async fn fetch(&self, sql: &str, binds: &[BindValue]) -> Result<Vec<Record>> {
        let rows = self.executor.fetch_all(sql, binds).await?;
        Ok(rows
            .into_iter()
            .map(|row| normalize_row(self.meta, self.driver(), row))
            .collect())
    }

    /// 模糊匹配字段的字符串值包装为 `%value%`，其它字段原样保留
    fn wrap_fuzzy(&self, filter: &Record) -> Record {
        filter
            .iter()
            .map(|(key, value)| {
                let value = match (self.meta.field(key), value) {
                    (Some(field), Value::String(s)) if field.comparison.is_fuzzy() => {
                        Value::String(format!("%{}%", s))
                    }
                    _ => value.clone(),
                };
                (key.clone(), value)
            })
            .collect()
    }
}

fn prefixed(clause: &str) -> String {
    if clause.is_empty() {
        String::new()
    } else {
        format!(" {}", clause)
    }
}

fn join_secondary_field(join: &JoinMeta) -> FieldMeta {
    FieldMeta::new(join.secondary_field, join.secondary_kind).column(join.secondary_column)
}

/// 写入失败：数据库错误替换为失败码，原因只进日志
fn write_failed(table: &str, err: SqlxRecordError, code: &'static str) -> SqlxRecordError {
    match err {
        SqlxRecordError::DatabaseError(e) => {
            tracing::warn!(table, error = %e, code, "write rejected by database");
            SqlxRecordError::request_failed(code)
        }
        other => other,
    }
}
