//! Content
//!
//! 表名: `contents`
//! 主键: `id`
//! 关联表: `contract_signatures` (username, content_id)
//!
//! 期望的表结构（PostgreSQL）:
//!
//! ```sql
//! CREATE TABLE contents (
//!     id             BIGSERIAL PRIMARY KEY,
//!     title          TEXT NOT NULL UNIQUE,
//!     summary        TEXT,
//!     body           JSONB,
//!     publish_date   TIMESTAMPTZ,
//!     is_published   BOOLEAN NOT NULL DEFAULT FALSE,
//!     contract_terms TEXT,
//!     internal_notes TEXT
//! );
//!
//! CREATE TABLE contract_signatures (
//!     username   TEXT NOT NULL,
//!     content_id BIGINT NOT NULL REFERENCES contents (id),
//!     PRIMARY KEY (username, content_id)
//! );
//! ```

use sqlxrecord::{
    Comparison, DbExecutor, FieldKind, FieldMeta, JoinMeta, RecordModel, RelationMeta, Result,
};
use std::sync::Arc;

const FIELDS: &[FieldMeta] = &[
    // 主键 | id (bigint) | 自增
    FieldMeta::new("id", FieldKind::Integer).read_only(),
    // title (text) | 非空 | 唯一 | 模糊匹配
    FieldMeta::new("title", FieldKind::Text).compare(Comparison::ILike),
    FieldMeta::new("summary", FieldKind::Text),
    // body (jsonb) | 富文本块
    FieldMeta::new("body", FieldKind::Json),
    FieldMeta::new("publishDate", FieldKind::Timestamp).column("publish_date"),
    FieldMeta::new("isPublished", FieldKind::Bool).column("is_published"),
    // ========== 私有字段 ==========
    FieldMeta::new("contractTerms", FieldKind::Text)
        .column("contract_terms")
        .private(),
    FieldMeta::new("internalNotes", FieldKind::Text)
        .column("internal_notes")
        .private(),
];

/// 内容关系：按发布日期倒序列出，签约用户记录在 `contract_signatures`
pub static CONTENT: RelationMeta = RelationMeta {
    table: "contents",
    pk: "id",
    fields: FIELDS,
    order_by: &[("publishDate", false), ("id", false)],
    join: Some(JoinMeta {
        table: "contract_signatures",
        record_column: "content_id",
        record_field: "contentId",
        secondary_column: "username",
        secondary_field: "username",
        secondary_kind: FieldKind::Text,
        list_field: "contractSigned",
    }),
};

/// 基于给定数据库句柄创建内容模型
pub fn content_model(executor: Arc<dyn DbExecutor>) -> Result<RecordModel> {
    RecordModel::new(executor, &CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_meta_is_valid() {
        assert!(CONTENT.validate().is_ok());
        assert!(CONTENT.filter_field("contractTerms").is_err());
        assert!(CONTENT.writable_field("id").is_err());
    }
}
