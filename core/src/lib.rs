pub mod db_pool;
pub mod error;
pub mod executor;
pub mod model;
pub mod query_builder;
pub mod record;
mod row;
pub mod schema;
pub mod transaction;

pub use db_pool::{DbConfig, DbDriver, DbPool};
pub use error::{codes, Result, SqlxRecordError};
pub use executor::{DbExecutor, DbTransaction};
pub use model::{Page, RecordModel};
pub use query_builder::{
    build_insert, build_update_set, build_where_filter, BindValue, InsertClause, ParamList,
};
pub use record::{Id, Record};
pub use schema::{Comparison, FieldKind, FieldMeta, JoinMeta, RelationMeta, Visibility};
pub use transaction::Transaction;
