use crate::db_pool::{DbDriver, DbPool};
use crate::error::{Result, SqlxRecordError};
use crate::executor::DbTransaction;
use crate::query_builder::BindValue;
use crate::record::Record;

#[derive(Debug)]
enum TransactionConn {
    #[cfg(feature = "postgres")]
    Postgres(sqlx::Transaction<'static, sqlx::Postgres>),
    #[cfg(feature = "sqlite")]
    Sqlite(sqlx::Transaction<'static, sqlx::Sqlite>),
}

/// 数据库事务包装器
///
/// 持有连接池中的一个连接直到提交或回滚；未提交就被丢弃时由 sqlx 自动回滚
#[derive(Debug)]
pub struct Transaction {
    driver: DbDriver,
    conn: Option<TransactionConn>,
}

impl Transaction {
    /// 开始一个事务
    pub async fn begin(pool: &DbPool) -> Result<Self> {
        let driver = pool.driver();
        let conn = match driver {
            #[cfg(feature = "postgres")]
            DbDriver::Postgres => {
                let pool = pool.pg_pool().ok_or(SqlxRecordError::NoPoolAvailable)?;
                TransactionConn::Postgres(pool.begin().await?)
            }
            #[cfg(feature = "sqlite")]
            DbDriver::Sqlite => {
                let pool = pool.sqlite_pool().ok_or(SqlxRecordError::NoPoolAvailable)?;
                TransactionConn::Sqlite(pool.begin().await?)
            }
            #[allow(unreachable_patterns)]
            _ => return Err(SqlxRecordError::NoPoolAvailable),
        };
        tracing::debug!(?driver, "BEGIN");
        Ok(Self {
            driver,
            conn: Some(conn),
        })
    }
}

#[async_trait::async_trait]
impl DbTransaction for Transaction {
    async fn fetch_all(&mut self, sql: &str, binds: &[BindValue]) -> Result<Vec<Record>> {
        tracing::debug!(sql, binds = binds.len(), "fetch_all in transaction");
        match self.conn.as_mut().ok_or(SqlxRecordError::AlreadyConsumed)? {
            #[cfg(feature = "postgres")]
            TransactionConn::Postgres(tx) => {
                crate::executor::pg_fetch_all(&mut **tx, sql, binds).await
            }
            #[cfg(feature = "sqlite")]
            TransactionConn::Sqlite(tx) => {
                crate::executor::sqlite_fetch_all(&mut **tx, sql, binds).await
            }
        }
    }

    /// 提交事务
    async fn commit(&mut self) -> Result<()> {
        match self.conn.take().ok_or(SqlxRecordError::AlreadyConsumed)? {
            #[cfg(feature = "postgres")]
            TransactionConn::Postgres(tx) => tx.commit().await?,
            #[cfg(feature = "sqlite")]
            TransactionConn::Sqlite(tx) => tx.commit().await?,
        }
        tracing::debug!(driver = ?self.driver, "COMMIT");
        Ok(())
    }

    /// 回滚事务
    async fn rollback(&mut self) -> Result<()> {
        match self.conn.take().ok_or(SqlxRecordError::AlreadyConsumed)? {
            #[cfg(feature = "postgres")]
            TransactionConn::Postgres(tx) => tx.rollback().await?,
            #[cfg(feature = "sqlite")]
            TransactionConn::Sqlite(tx) => tx.rollback().await?,
        }
        tracing::debug!(driver = ?self.driver, "ROLLBACK");
        Ok(())
    }
}
