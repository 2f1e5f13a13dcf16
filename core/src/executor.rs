use crate::db_pool::DbDriver;
use crate::error::Result;
use crate::query_builder::BindValue;
use crate::record::Record;

/// 将单个绑定值应用到 sqlx 查询中
///
/// NULL 按字段类型绑定，PostgreSQL 会根据参数类型检查目标列
#[macro_export]
macro_rules! apply_bind_value {
    ($query:expr, $bind:expr) => {
        match $bind {
            $crate::query_builder::BindValue::String(s) => {
                $query = $query.bind(s.clone());
            }
            $crate::query_builder::BindValue::Int64(i) => {
                $query = $query.bind(*i);
            }
            $crate::query_builder::BindValue::Float64(f) => {
                $query = $query.bind(*f);
            }
            $crate::query_builder::BindValue::Bool(b) => {
                $query = $query.bind(*b);
            }
            $crate::query_builder::BindValue::Timestamp(t) => {
                $query = $query.bind(*t);
            }
            $crate::query_builder::BindValue::Json(v) => {
                $query = $query.bind(v.clone());
            }
            $crate::query_builder::BindValue::Null(kind) => match kind {
                $crate::schema::FieldKind::Text => {
                    $query = $query.bind(Option::<String>::None);
                }
                $crate::schema::FieldKind::Integer => {
                    $query = $query.bind(Option::<i64>::None);
                }
                $crate::schema::FieldKind::Float => {
                    $query = $query.bind(Option::<f64>::None);
                }
                $crate::schema::FieldKind::Bool => {
                    $query = $query.bind(Option::<bool>::None);
                }
                $crate::schema::FieldKind::Timestamp => {
                    $query = $query.bind(Option::<chrono::DateTime<chrono::Utc>>::None);
                }
                $crate::schema::FieldKind::Json => {
                    $query = $query.bind(Option::<serde_json::Value>::None);
                }
            },
        }
    };
}

/// 数据库执行器 trait，RecordModel 通过它访问数据库
///
/// `DbPool` 是基于 sqlx 的实现；测试中可以替换为记录语句的替身
#[async_trait::async_trait]
pub trait DbExecutor: Send + Sync {
    /// 获取驱动类型，决定占位符和标识符的写法
    fn driver(&self) -> DbDriver;

    /// 执行参数化语句并返回所有结果行
    async fn fetch_all(&self, sql: &str, binds: &[BindValue]) -> Result<Vec<Record>>;

    /// 在一个独占连接上开始事务（BEGIN）
    async fn begin(&self) -> Result<Box<dyn DbTransaction>>;
}

/// 已开始的事务，语句都在同一个连接上执行
///
/// `commit` / `rollback` 之后再调用任何方法都会返回 `AlreadyConsumed`
#[async_trait::async_trait]
pub trait DbTransaction: Send {
    async fn fetch_all(&mut self, sql: &str, binds: &[BindValue]) -> Result<Vec<Record>>;

    async fn commit(&mut self) -> Result<()>;

    async fn rollback(&mut self) -> Result<()>;
}

#[cfg(feature = "postgres")]
pub(crate) async fn pg_fetch_all<'c, E>(
    executor: E,
    sql: &str,
    binds: &[BindValue],
) -> Result<Vec<Record>>
where
    E: sqlx::Executor<'c, Database = sqlx::Postgres>,
{
    let mut query = sqlx::query::<sqlx::Postgres>(sql);
    for bind in binds {
        crate::apply_bind_value!(query, bind);
    }
    let rows = query.fetch_all(executor).await?;
    rows.iter().map(crate::row::pg_row_to_record).collect()
}

#[cfg(feature = "sqlite")]
pub(crate) async fn sqlite_fetch_all<'c, E>(
    executor: E,
    sql: &str,
    binds: &[BindValue],
) -> Result<Vec<Record>>
where
    E: sqlx::Executor<'c, Database = sqlx::Sqlite>,
{
    let mut query = sqlx::query::<sqlx::Sqlite>(sql);
    for bind in binds {
        crate::apply_bind_value!(query, bind);
    }
    let rows = query.fetch_all(executor).await?;
    rows.iter().map(crate::row::sqlite_row_to_record).collect()
}
