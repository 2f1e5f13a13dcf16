use crate::error::{Result, SqlxRecordError};
use crate::executor::{DbExecutor, DbTransaction};
use crate::query_builder::BindValue;
use crate::record::Record;
use crate::transaction::Transaction;
#[cfg(any(feature = "postgres", feature = "sqlite"))]
use sqlx::{pool::PoolOptions, Pool};
use std::sync::Arc;

/// 默认连接池大小
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbDriver {
    Postgres,
    Sqlite,
}

impl DbDriver {
    pub fn from_url(url: &str) -> Result<Self> {
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            Ok(DbDriver::Postgres)
        } else if url.starts_with("sqlite://") || url.starts_with("sqlite:") {
            Ok(DbDriver::Sqlite)
        } else {
            Err(SqlxRecordError::UnsupportedDatabase(url.to_string()))
        }
    }

    /// 位置占位符，index 从 0 开始
    ///
    /// 两种驱动都使用显式编号（`$1` / `?1`），同一参数位置在 SQL 中的含义不依赖出现顺序
    pub fn placeholder(&self, index: usize) -> String {
        match self {
            DbDriver::Postgres => format!("${}", index + 1),
            DbDriver::Sqlite => format!("?{}", index + 1),
        }
    }

    /// 转义 SQL 标识符
    pub fn escape_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    /// 大小写不敏感的模糊匹配操作符，SQLite 的 LIKE 本身对 ASCII 不区分大小写
    pub fn ilike_operator(&self) -> &'static str {
        match self {
            DbDriver::Postgres => "ILIKE",
            DbDriver::Sqlite => "LIKE",
        }
    }
}

/// 连接配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbConfig {
    pub url: String,
    pub max_connections: u32,
}

impl DbConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }

    pub fn max_connections(mut self, n: u32) -> Self {
        self.max_connections = n;
        self
    }

    /// 从 `DATABASE_URL` 和 `DATABASE_MAX_CONNECTIONS` 读取配置，未设置 URL 时返回 None
    pub fn from_env() -> Option<Self> {
        let url = std::env::var("DATABASE_URL").ok()?;
        let max_connections = std::env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_MAX_CONNECTIONS);
        Some(Self {
            url,
            max_connections,
        })
    }
}

/// 连接池句柄，由进程的组合根持有并注入到各个 RecordModel
#[derive(Debug, Clone)]
pub struct DbPool {
    driver: DbDriver,
    #[cfg(feature = "postgres")]
    pg: Option<Arc<Pool<sqlx::Postgres>>>,
    #[cfg(feature = "sqlite")]
    sqlite: Option<Arc<Pool<sqlx::Sqlite>>>,
}

impl DbPool {
    /// 从数据库 URL 连接并创建 DbPool
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with(&DbConfig::new(url)).await
    }

    pub async fn connect_with(config: &DbConfig) -> Result<Self> {
        let driver = DbDriver::from_url(&config.url)?;
        tracing::info!(?driver, max_connections = config.max_connections, "connecting");

        match driver {
            #[cfg(feature = "postgres")]
            DbDriver::Postgres => {
                let pool = PoolOptions::<sqlx::Postgres>::new()
                    .max_connections(config.max_connections)
                    .connect(&config.url)
                    .await?;
                Ok(Self::from_postgres_pool(Arc::new(pool)))
            }
            #[cfg(feature = "sqlite")]
            DbDriver::Sqlite => {
                let pool = PoolOptions::<sqlx::Sqlite>::new()
                    .max_connections(config.max_connections)
                    .connect(&config.url)
                    .await?;
                Ok(Self::from_sqlite_pool(Arc::new(pool)))
            }
            #[allow(unreachable_patterns)]
            _ => Err(SqlxRecordError::UnsupportedDatabase(format!(
                "driver {:?} is not enabled in this build",
                driver
            ))),
        }
    }

    /// 从 PostgreSQL Pool 创建 DbPool
    #[cfg(feature = "postgres")]
    pub fn from_postgres_pool(pool: Arc<Pool<sqlx::Postgres>>) -> Self {
        Self {
            driver: DbDriver::Postgres,
            pg: Some(pool),
            #[cfg(feature = "sqlite")]
            sqlite: None,
        }
    }

    /// 从 SQLite Pool 创建 DbPool
    #[cfg(feature = "sqlite")]
    pub fn from_sqlite_pool(pool: Arc<Pool<sqlx::Sqlite>>) -> Self {
        Self {
            driver: DbDriver::Sqlite,
            #[cfg(feature = "postgres")]
            pg: None,
            sqlite: Some(pool),
        }
    }

    pub fn driver(&self) -> DbDriver {
        self.driver
    }

    #[cfg(feature = "postgres")]
    pub fn pg_pool(&self) -> Option<&Pool<sqlx::Postgres>> {
        self.pg.as_deref()
    }

    #[cfg(feature = "sqlite")]
    pub fn sqlite_pool(&self) -> Option<&Pool<sqlx::Sqlite>> {
        self.sqlite.as_deref()
    }

    pub async fn close(&self) {
        #[cfg(feature = "postgres")]
        if let Some(pool) = self.pg.as_deref() {
            pool.close().await;
        }
        #[cfg(feature = "sqlite")]
        if let Some(pool) = self.sqlite.as_deref() {
            pool.close().await;
        }
    }
}

#[async_trait::async_trait]
impl DbExecutor for DbPool {
    fn driver(&self) -> DbDriver {
        self.driver
    }

    async fn fetch_all(&self, sql: &str, binds: &[BindValue]) -> Result<Vec<Record>> {
        tracing::debug!(sql, binds = binds.len(), "fetch_all");
        match self.driver {
            #[cfg(feature = "postgres")]
            DbDriver::Postgres => {
                let pool = self.pg.as_deref().ok_or(SqlxRecordError::NoPoolAvailable)?;
                crate::executor::pg_fetch_all(pool, sql, binds).await
            }
            #[cfg(feature = "sqlite")]
            DbDriver::Sqlite => {
                let pool = self
                    .sqlite
                    .as_deref()
                    .ok_or(SqlxRecordError::NoPoolAvailable)?;
                crate::executor::sqlite_fetch_all(pool, sql, binds).await
            }
            #[allow(unreachable_patterns)]
            _ => Err(SqlxRecordError::NoPoolAvailable),
        }
    }

    async fn begin(&self) -> Result<Box<dyn DbTransaction>> {
        let tx = Transaction::begin(self).await?;
        Ok(Box::new(tx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_from_url() {
        assert_eq!(
            DbDriver::from_url("postgres://u:p@localhost/db").unwrap(),
            DbDriver::Postgres
        );
        assert_eq!(
            DbDriver::from_url("postgresql://localhost/db").unwrap(),
            DbDriver::Postgres
        );
        assert_eq!(
            DbDriver::from_url("sqlite::memory:").unwrap(),
            DbDriver::Sqlite
        );
        assert!(matches!(
            DbDriver::from_url("mysql://localhost/db"),
            Err(SqlxRecordError::UnsupportedDatabase(_))
        ));
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(DbDriver::Postgres.placeholder(0), "$1");
        assert_eq!(DbDriver::Postgres.placeholder(9), "$10");
        assert_eq!(DbDriver::Sqlite.placeholder(0), "?1");
        assert_eq!(DbDriver::Sqlite.placeholder(2), "?3");
    }

    #[test]
    fn test_escape_identifier() {
        assert_eq!(
            DbDriver::Postgres.escape_identifier("publish_date"),
            "\"publish_date\""
        );
        assert_eq!(DbDriver::Sqlite.escape_identifier("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn test_config_builder() {
        let config = DbConfig::new("sqlite::memory:").max_connections(1);
        assert_eq!(config.url, "sqlite::memory:");
        assert_eq!(config.max_connections, 1);
        assert_eq!(
            DbConfig::new("sqlite::memory:").max_connections,
            DEFAULT_MAX_CONNECTIONS
        );
    }
}
