use thiserror::Error;

/// 机器可读的失败码，由 HTTP 层映射为状态码
pub mod codes {
    pub const NOT_FOUND: &str = "not_found";
    /// 父记录 + 关联记录的事务写入失败
    pub const MULTI_CREATE_FAILED: &str = "multi_create_failed";
    pub const UPDATE_FAILED: &str = "update_failed";
    pub const INVALID_FIELD: &str = "invalid_field";
    pub const EMPTY_RECORD: &str = "empty_record";
    pub const DATABASE_ERROR: &str = "database_error";
}

#[derive(Debug, Error)]
pub enum SqlxRecordError {
    /// Lookup by identity (or by join-key pair) matched no row
    #[error("{relation} not found: {key}")]
    NotFound { relation: String, key: String },
    /// Write rejected by the store; the cause is logged, not exposed
    #[error("Request failed: {code}")]
    RequestFailed { code: &'static str },
    /// Invalid field error
    #[error("Invalid field: {0}")]
    InvalidField(String),
    #[error("Record has no fields")]
    EmptyRecord,
    #[error("Unsupported database URL: {0}")]
    UnsupportedDatabase(String),
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
    #[error("No connection pool available for driver")]
    NoPoolAvailable,
    /// Transaction has already been consumed (committed or rolled back)
    #[error("Transaction has already been consumed")]
    AlreadyConsumed,
    #[error("Unsupported type '{type_name}' for column '{column}'")]
    UnsupportedColumn { column: String, type_name: String },
    #[error("Unexpected result: {0}")]
    UnexpectedResult(String),
}

impl SqlxRecordError {
    pub fn not_found(relation: impl Into<String>, key: impl ToString) -> Self {
        Self::NotFound {
            relation: relation.into(),
            key: key.to_string(),
        }
    }

    pub fn request_failed(code: &'static str) -> Self {
        Self::RequestFailed { code }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// 请求本身有问题（约束冲突、非法字段、空记录），重试不会成功
    pub fn is_request_failed(&self) -> bool {
        matches!(
            self,
            Self::RequestFailed { .. } | Self::InvalidField(_) | Self::EmptyRecord
        )
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => codes::NOT_FOUND,
            Self::RequestFailed { code } => code,
            Self::InvalidField(_) => codes::INVALID_FIELD,
            Self::EmptyRecord => codes::EMPTY_RECORD,
            _ => codes::DATABASE_ERROR,
        }
    }
}

pub type Result<T> = std::result::Result<T, SqlxRecordError>;
